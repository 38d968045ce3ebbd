// Symphonia
// Copyright (c) 2019-2022 The Project Symphonia Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use symphonia_core::errors::{decode_error, Result};
use symphonia_core::io::ReadBytes;

use log::debug;

use crate::attribute::{read_string, Attribute, AttributeType};
use crate::guid::{Guid, AUDIO_MEDIA, AUDIO_SPREAD, NO_ERROR_CORRECTION};

/// One second in the 100 nanosecond units used throughout the header.
pub const HNS_PER_SECOND: u64 = 10_000_000;

/// The number of slots in the stream table. Stream numbers are 7-bit.
pub const MAX_STREAMS: usize = 128;

/// The global fields of the file properties object.
#[derive(Copy, Clone, Debug, Default)]
pub struct FileProperties {
    pub packet_count: u64,
    /// The play duration in 100 ns units.
    pub play_duration: u64,
    /// The preroll in 100 ns units.
    pub preroll: u64,
    pub bytes_per_packet: u32,
}

impl FileProperties {
    pub fn read<B: ReadBytes>(reader: &mut B) -> Result<FileProperties> {
        // File ID, file size, and creation date.
        reader.ignore_bytes(16 + 8 + 8)?;

        let packet_count = reader.read_u64()?;
        let play_duration = reader.read_u64()?;

        // Send duration.
        reader.ignore_bytes(8)?;

        // Preroll is stored in milliseconds.
        let preroll = reader.read_u64()?.saturating_mul(HNS_PER_SECOND / 1000);

        // Flags and minimum packet size.
        reader.ignore_bytes(4 + 4)?;

        let bytes_per_packet = reader.read_u32()?;

        // Maximum bit rate.
        reader.ignore_bytes(4)?;

        Ok(FileProperties { packet_count, play_duration, preroll, bytes_per_packet })
    }
}

/// Everything known about one stream number, accumulated from the stream properties and extended
/// stream properties objects in whatever order they appear.
#[derive(Clone, Debug, Default)]
pub struct StreamRecord {
    /// Type-specific data. For audio streams, a `WAVEFORMATEX` structure.
    pub ts_data: Box<[u8]>,
    /// Error correction data.
    pub ec_data: Box<[u8]>,
    /// Start time in 100 ns units.
    pub start_time: u64,
    /// End time in 100 ns units.
    pub end_time: u64,
    pub bit_rate: u32,
    pub is_audio: bool,
    pub has_spread_ec: bool,
}

/// A table of stream records indexed directly by stream number.
pub struct StreamTable {
    streams: Vec<StreamRecord>,
}

impl Default for StreamTable {
    fn default() -> Self {
        StreamTable { streams: vec![Default::default(); MAX_STREAMS] }
    }
}

impl StreamTable {
    /// Get the record for a stream number. Stream number 0 is reserved.
    pub fn get_mut(&mut self, stream_number: u16) -> Result<&mut StreamRecord> {
        match usize::from(stream_number) {
            0 => decode_error("asf: invalid stream number"),
            n if n >= MAX_STREAMS => decode_error("asf: invalid stream number"),
            n => Ok(&mut self.streams[n]),
        }
    }

    /// Iterate over all valid stream numbers and their records, in ascending order.
    pub fn iter(&self) -> impl Iterator<Item = (u8, &StreamRecord)> {
        self.streams.iter().enumerate().skip(1).map(|(i, stream)| (i as u8, stream))
    }
}

/// Read a stream properties object into the stream table. Returns the stream number.
pub fn read_stream_properties<B: ReadBytes>(
    reader: &mut B,
    streams: &mut StreamTable,
) -> Result<u16> {
    let stream_type = Guid::read(reader)?;
    let ec_type = Guid::read(reader)?;

    // Time offset.
    reader.ignore_bytes(8)?;

    let ts_data_len = reader.read_u32()?;
    let ec_data_len = reader.read_u32()?;
    let flags = reader.read_u16()?;

    // Reserved.
    reader.ignore_bytes(4)?;

    let stream_number = flags & 0x7f;
    let stream = streams.get_mut(stream_number)?;

    stream.ts_data = reader.read_boxed_slice_exact(ts_data_len as usize)?;
    stream.ec_data = reader.read_boxed_slice_exact(ec_data_len as usize)?;
    stream.is_audio = stream_type == AUDIO_MEDIA;
    stream.has_spread_ec = ec_type == AUDIO_SPREAD;

    debug!(
        "stream properties: number={}, audio={}, ec={}",
        stream_number,
        stream.is_audio,
        if ec_type == NO_ERROR_CORRECTION {
            "none"
        }
        else if stream.has_spread_ec {
            "spread"
        }
        else {
            "other"
        }
    );

    Ok(stream_number)
}

/// Read the leading fixed-size portion of an extended stream properties object into the stream
/// table. Returns the stream number.
pub fn read_extended_stream_properties<B: ReadBytes>(
    reader: &mut B,
    streams: &mut StreamTable,
) -> Result<u16> {
    let start_time = reader.read_u64()?;
    let end_time = reader.read_u64()?;
    let bit_rate = reader.read_u32()?;

    // Buffer size, initial buffer fullness, alternate data bit rate, alternate buffer size,
    // alternate initial buffer fullness, maximum object size, and flags.
    reader.ignore_bytes(7 * 4)?;

    let stream_number = reader.read_u16()? & 0x7f;

    // Language ID index, average time per frame, stream name count, and payload extension system
    // count.
    reader.ignore_bytes(2 + 8 + 2 + 2)?;

    let stream = streams.get_mut(stream_number)?;
    stream.start_time = start_time;
    stream.end_time = end_time;
    stream.bit_rate = bit_rate;

    Ok(stream_number)
}

/// A marker, used as a chapter.
#[derive(Clone, Debug, Default)]
pub struct Marker {
    /// The presentation time in 100 ns units.
    pub pts: u64,
    pub title: String,
}

/// Read all markers from a marker object.
pub fn read_markers<B: ReadBytes>(reader: &mut B) -> Result<Vec<Marker>> {
    // Reserved.
    reader.ignore_bytes(16)?;

    let count = reader.read_u32()?;

    // Reserved.
    reader.ignore_bytes(2)?;

    let name_len = reader.read_u16()?;
    reader.ignore_bytes(u64::from(name_len))?;

    // Each entry is at least 30 bytes, don't trust the count for the allocation.
    let mut markers = Vec::with_capacity(count.min(1024) as usize);

    for _ in 0..count {
        // Offset.
        reader.ignore_bytes(8)?;

        let pts = reader.read_u64()?;

        // Entry length, send time, and flags.
        reader.ignore_bytes(2 + 4 + 4)?;

        // The title length is in WCHARs.
        let title_len = reader.read_u32()?;
        let title = read_string(reader, 2 * title_len as usize)?;

        markers.push(Marker { pts, title });
    }

    Ok(markers)
}

/// The fields of the content description object. Absent fields are empty.
#[derive(Clone, Debug, Default)]
pub struct ContentDescription {
    pub title: String,
    pub artist: String,
    pub copyright: String,
    pub description: String,
    pub rating: String,
}

impl ContentDescription {
    pub fn read<B: ReadBytes>(reader: &mut B) -> Result<ContentDescription> {
        let mut lens = [0usize; 5];

        for len in lens.iter_mut() {
            *len = usize::from(reader.read_u16()?);
        }

        Ok(ContentDescription {
            title: read_string(reader, lens[0])?,
            artist: read_string(reader, lens[1])?,
            copyright: read_string(reader, lens[2])?,
            description: read_string(reader, lens[3])?,
            rating: read_string(reader, lens[4])?,
        })
    }
}

/// The wire layouts used by the objects that carry attributes.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum AttributeLayout {
    /// The extended content description object. Attributes apply to the whole file.
    ExtendedContentDescription,
    /// The metadata and metadata library objects.
    Metadata,
}

/// Read the attributes of a metadata, metadata library, or extended content description object,
/// appending them to `attributes`.
pub fn read_attributes<B: ReadBytes>(
    reader: &mut B,
    layout: AttributeLayout,
    attributes: &mut Vec<Attribute>,
) -> Result<()> {
    let count = reader.read_u16()?;

    attributes.reserve(usize::from(count));

    for _ in 0..count {
        let attribute = match layout {
            AttributeLayout::ExtendedContentDescription => {
                let name_len = reader.read_u16()?;
                let name = read_string(reader, usize::from(name_len))?;
                let kind = AttributeType::from_u16(reader.read_u16()?)?;
                let data_len = reader.read_u16()?;
                let data = reader.read_boxed_slice_exact(usize::from(data_len))?;

                Attribute { name, data, kind, stream_number: 0 }
            }
            AttributeLayout::Metadata => {
                // Language list index.
                reader.ignore_bytes(2)?;

                let stream_number = reader.read_u16()?;
                let name_len = reader.read_u16()?;
                let kind = AttributeType::from_u16(reader.read_u16()?)?;
                let data_len = reader.read_u32()?;
                let name = read_string(reader, usize::from(name_len))?;
                let data = reader.read_boxed_slice_exact(data_len as usize)?;

                Attribute { name, data, kind, stream_number }
            }
        };

        attributes.push(attribute);
    }

    Ok(())
}
