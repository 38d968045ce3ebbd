// Symphonia
// Copyright (c) 2019-2022 The Project Symphonia Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::io::{Seek, SeekFrom};

use symphonia_core::codecs::CodecParameters;
use symphonia_core::errors::{decode_error, end_of_stream_error, limit_error, seek_error};
use symphonia_core::errors::{unsupported_error, Result, SeekErrorKind};
use symphonia_core::formats::{Cue, FormatOptions, FormatReader, Packet, SeekMode, SeekTo};
use symphonia_core::formats::{SeekedTo, Track};
use symphonia_core::io::{BufReader, MediaSource, MediaSourceStream, ReadBytes};
use symphonia_core::meta::{Metadata, MetadataBuilder, MetadataLog, StandardTagKey, Tag, Value};
use symphonia_core::meta::Visual;
use symphonia_core::probe::{Descriptor, Instantiate, QueryDescriptor};
use symphonia_core::support_format;
use symphonia_core::units::TimeBase;

use log::{debug, info, warn};

use crate::attribute::{Attribute, Picture};
use crate::descrambler::Descrambler;
use crate::format::WaveFormat;
use crate::guid::{Guid, ObjectHeader, ObjectKind, HEADER_OBJECT, OBJECT_HEADER_LEN};
use crate::objects::{read_attributes, read_extended_stream_properties, read_markers};
use crate::objects::{read_stream_properties, AttributeLayout, ContentDescription};
use crate::objects::{FileProperties, Marker, StreamRecord, StreamTable, HNS_PER_SECOND};
use crate::options::{AsfOptions, OpenMode};
use crate::packet::PacketDemuxer;
use crate::seek::{find_packet, PacketLayout};

/// The length of the header object fields preceding its child objects: the object header, the
/// number of child objects, and two reserved bytes.
const HEADER_OBJECT_LEN: u64 = 30;

/// The length of the header extension object fields preceding its child objects.
const HEADER_EXTENSION_OBJECT_LEN: u64 = 46;

/// The length of the data object fields preceding the first packet.
const DATA_OBJECT_LEN: u64 = 50;

/// The largest header object that will be read into memory.
const MAX_HEADER_OBJECT_SIZE: u64 = 64 * 1024 * 1024;

/// The name of the container reported in `StreamInfo`.
pub const CONTAINER_NAME: &str = "ASF";

/// Scale `value` by `num / den`, saturating on overflow.
fn muldiv(value: u64, num: u64, den: u64) -> u64 {
    if den == 0 {
        return 0;
    }
    let scaled = u128::from(value) * u128::from(num) / u128::from(den);
    scaled.min(u128::from(u64::MAX)) as u64
}

/// Describes the selected audio stream for the whole file or for one chapter.
#[derive(Clone, Debug)]
pub struct StreamInfo {
    pub codec_params: CodecParameters,
    pub format: WaveFormat,
    /// The name of the container, always "ASF".
    pub container: &'static str,
    /// The average bit rate in bits per second.
    pub average_bit_rate: u32,
    /// The first frame of the chapter.
    pub start_ts: u64,
    /// The number of frames in the chapter.
    pub n_frames: u64,
    pub tags: Vec<Tag>,
}

/// The audio stream selected for playback.
struct SelectedStream {
    number: u8,
    format: WaveFormat,
    total_frames: u64,
    average_bit_rate: u32,
}

/// Advanced Systems Format (ASF) format reader.
///
/// `AsfReader` implements a demuxer for the audio stream of ASF containers, the container used
/// by Windows Media Audio (WMA) files.
pub struct AsfReader {
    reader: MediaSourceStream,
    tracks: Vec<Track>,
    cues: Vec<Cue>,
    metadata: MetadataLog,
    mode: OpenMode,
    file: FileProperties,
    layout: PacketLayout,
    stream: Option<SelectedStream>,
    demuxer: PacketDemuxer,
    descrambler: Descrambler,
    /// The number of the next packet to read.
    packet_number: u64,
    attributes: Vec<Attribute>,
    markers: Vec<Marker>,
    description: ContentDescription,
}

impl AsfReader {
    /// Instantiate an `AsfReader`, reading only the parts of the file selected by `asf_opts`.
    pub fn try_new_with_options(
        mut source: MediaSourceStream,
        _options: &FormatOptions,
        asf_opts: &AsfOptions<'_>,
    ) -> Result<Self> {
        let mode = asf_opts.mode;

        // The header object must be first.
        let guid = Guid::read(&mut source)?;

        if guid != HEADER_OBJECT {
            return decode_error("asf: invalid header object");
        }

        // Header object size, number of child objects, and reserved.
        source.ignore_bytes(HEADER_OBJECT_LEN - 16)?;

        let mut reader = AsfReader {
            reader: source,
            tracks: Vec::new(),
            cues: Vec::new(),
            metadata: Default::default(),
            mode,
            file: Default::default(),
            layout: Default::default(),
            stream: None,
            demuxer: PacketDemuxer::new(0, 0, 0),
            descrambler: Default::default(),
            packet_number: 0,
            attributes: Vec::new(),
            markers: Vec::new(),
            description: Default::default(),
        };

        let streams = reader.read_objects()?;

        if mode.intersects(OpenMode::PLAYBACK | OpenMode::METADATA) {
            reader.select_stream(&streams, asf_opts)?;

            if mode.contains(OpenMode::PLAYBACK) {
                if reader.layout.data_offset == 0 {
                    return decode_error("asf: missing data object");
                }
                let data_offset = reader.layout.data_offset;
                reposition(&mut reader.reader, data_offset)?;
            }

            if mode.contains(OpenMode::METADATA) {
                let preroll = reader.file.preroll;
                for marker in reader.markers.iter_mut() {
                    marker.pts = marker.pts.saturating_sub(preroll);
                }
            }

            reader.publish_cues();
        }

        if mode.intersects(OpenMode::METADATA | OpenMode::PICTURES) {
            reader.publish_metadata();
        }

        Ok(reader)
    }

    /// Walk the top-level objects and the children of the header and header extension objects.
    fn read_objects(&mut self) -> Result<StreamTable> {
        let mut streams = StreamTable::default();

        let file_len = self.reader.byte_len();
        let is_seekable = self.reader.is_seekable();

        let mut offset = self.reader.pos();
        let mut has_data = false;

        loop {
            let header_end = offset.checked_add(OBJECT_HEADER_LEN);

            match file_len {
                Some(len) if header_end.map_or(true, |end| end >= len) => break,
                // Without a known length, or the ability to return to the data object, the walk
                // ends at the data object.
                Some(_) if has_data && !is_seekable => break,
                None if has_data => break,
                _ => (),
            }

            let header = ObjectHeader::read(&mut self.reader)?;
            let kind = header.kind();

            debug!(
                "object: kind={:?}, guid={:?}, offset={}, size={}",
                kind, header.guid, offset, header.size
            );

            match kind {
                ObjectKind::HeaderExtension => {
                    // The children of the header extension follow as siblings.
                    offset += HEADER_EXTENSION_OBJECT_LEN;
                    reposition(&mut self.reader, offset)?;
                    continue;
                }
                ObjectKind::FileProperties => {
                    let body = read_object_body(&mut self.reader, &header)?;
                    self.file = FileProperties::read(&mut BufReader::new(&body))?;
                }
                ObjectKind::StreamProperties => {
                    let body = read_object_body(&mut self.reader, &header)?;
                    read_stream_properties(&mut BufReader::new(&body), &mut streams)?;
                }
                ObjectKind::ExtendedStreamProperties => {
                    let body = read_object_body(&mut self.reader, &header)?;
                    read_extended_stream_properties(&mut BufReader::new(&body), &mut streams)?;
                }
                ObjectKind::Data => {
                    if header.size < DATA_OBJECT_LEN {
                        return decode_error("asf: invalid data object size");
                    }
                    self.layout.data_offset = offset + DATA_OBJECT_LEN;
                    self.layout.data_len = header.size - DATA_OBJECT_LEN;
                    has_data = true;
                }
                ObjectKind::Marker if self.mode.contains(OpenMode::METADATA) => {
                    let body = read_object_body(&mut self.reader, &header)?;
                    self.markers = read_markers(&mut BufReader::new(&body))?;
                }
                ObjectKind::ContentDescription if self.mode.contains(OpenMode::METADATA) => {
                    let body = read_object_body(&mut self.reader, &header)?;
                    self.description = ContentDescription::read(&mut BufReader::new(&body))?;
                }
                ObjectKind::Metadata
                | ObjectKind::MetadataLibrary
                | ObjectKind::ExtendedContentDescription
                    if self.mode.intersects(OpenMode::METADATA | OpenMode::PICTURES) =>
                {
                    let layout = match kind {
                        ObjectKind::ExtendedContentDescription => {
                            AttributeLayout::ExtendedContentDescription
                        }
                        _ => AttributeLayout::Metadata,
                    };

                    let body = read_object_body(&mut self.reader, &header)?;
                    read_attributes(&mut BufReader::new(&body), layout, &mut self.attributes)?;
                }
                ObjectKind::ContentEncryption => {
                    return unsupported_error("asf: file contains drm-protected content");
                }
                _ => info!("ignoring object: guid={:?}, size={}", header.guid, header.size),
            }

            offset = match offset.checked_add(header.size) {
                Some(next) => next,
                None => return decode_error("asf: object size overflow"),
            };

            // An object extending past the end of the file ends the walk.
            if matches!(file_len, Some(len) if offset >= len) {
                break;
            }

            if !has_data || is_seekable {
                reposition(&mut self.reader, offset)?;
            }
        }

        self.layout.packet_count = self.file.packet_count;
        self.layout.bytes_per_packet = self.file.bytes_per_packet;

        Ok(streams)
    }

    /// Select the first audio stream with a supported format.
    fn select_stream(&mut self, streams: &StreamTable, asf_opts: &AsfOptions<'_>) -> Result<()> {
        let mut selected: Option<(u8, &StreamRecord, WaveFormat)> = None;

        for (number, record) in streams.iter().filter(|(_, record)| record.is_audio) {
            let format = match WaveFormat::read(&record.ts_data) {
                Ok(format) => format,
                Err(err) => {
                    info!("skipping audio stream {}: {}", number, err);
                    continue;
                }
            };

            if let Some(codecs) = asf_opts.codecs {
                if codecs.get_codec(format.codec).is_none() {
                    info!("skipping audio stream {}: no decoder for {}", number, format.codec);
                    continue;
                }
            }

            selected = Some((number, record, format));
            break;
        }

        let (number, record, format) = match selected {
            Some(selected) => selected,
            None => return decode_error("asf: no audio stream found"),
        };

        info!("selected audio stream {}", number);
        debug!("{}", format);

        if record.has_spread_ec {
            self.descrambler = Descrambler::new(&record.ec_data).unwrap_or_else(|err| {
                warn!("asf: invalid spread error correction data ({}), descrambling disabled", err);
                Descrambler::default()
            });
        }

        let sample_rate = u64::from(format.sample_rate);

        let start_time = record.start_time;
        let end_time = match record.end_time {
            0 => self.file.play_duration.saturating_sub(self.file.preroll),
            end_time => end_time,
        };

        let delay = muldiv(start_time, sample_rate, HNS_PER_SECOND);
        let total_frames =
            muldiv(end_time.saturating_sub(start_time), sample_rate, HNS_PER_SECOND);

        let average_bit_rate = if record.bit_rate != 0 {
            record.bit_rate
        }
        else if format.bit_rate() != 0 {
            format.bit_rate()
        }
        else {
            muldiv(self.layout.data_len, sample_rate * 8, total_frames).min(u64::from(u32::MAX))
                as u32
        };

        let mut codec_params = format.codec_params();

        codec_params
            .with_n_frames(total_frames)
            .with_delay(delay.min(u64::from(u32::MAX)) as u32);

        self.tracks = vec![Track::new(u32::from(number), codec_params)];
        self.demuxer = PacketDemuxer::new(number, self.file.preroll / 10_000, average_bit_rate);
        self.stream = Some(SelectedStream { number, format, total_frames, average_bit_rate });

        Ok(())
    }

    fn publish_cues(&mut self) {
        let sample_rate = match &self.stream {
            Some(stream) => u64::from(stream.format.sample_rate),
            None => return,
        };

        self.cues = self
            .markers
            .iter()
            .enumerate()
            .map(|(index, marker)| {
                let mut tags = Vec::new();

                if !marker.title.is_empty() {
                    tags.push(Tag::new(
                        Some(StandardTagKey::TrackTitle),
                        "Title",
                        Value::String(marker.title.clone()),
                    ));
                }

                Cue {
                    index: index as u32,
                    start_ts: muldiv(marker.pts, sample_rate, HNS_PER_SECOND),
                    tags,
                    points: Vec::new(),
                }
            })
            .collect();
    }

    fn publish_metadata(&mut self) {
        let mut builder = MetadataBuilder::new();

        if self.mode.contains(OpenMode::METADATA) {
            for tag in self.tags() {
                builder.add_tag(tag);
            }
        }

        if self.mode.contains(OpenMode::PICTURES) {
            for visual in self.pictures().map(|picture| picture.to_visual()) {
                builder.add_visual(visual);
            }
        }

        self.metadata.push(builder.metadata());
    }

    /// The number of the selected stream, or 0 if no stream was selected.
    fn stream_number(&self) -> u16 {
        self.stream.as_ref().map_or(0, |stream| u16::from(stream.number))
    }

    /// Collect the tags of the file and the selected stream.
    fn tags(&self) -> Vec<Tag> {
        let mut tags = Vec::new();

        let desc = &self.description;

        let fields = [
            (StandardTagKey::TrackTitle, "Title", &desc.title),
            (StandardTagKey::Artist, "Author", &desc.artist),
            (StandardTagKey::Comment, "Description", &desc.description),
            (StandardTagKey::Copyright, "Copyright", &desc.copyright),
            (StandardTagKey::Rating, "Rating", &desc.rating),
        ];

        for (std_key, key, value) in fields.iter() {
            if !value.is_empty() {
                tags.push(Tag::new(Some(*std_key), key, Value::String(value.to_string())));
            }
        }

        let stream_number = self.stream_number();

        tags.extend(
            self.attributes
                .iter()
                .filter(|attr| attr.applies_to(stream_number))
                .filter_map(Attribute::to_tag),
        );

        tags
    }

    /// Iterate over the pictures of the file and the selected stream.
    fn pictures(&self) -> impl Iterator<Item = Picture> + '_ {
        let stream_number = self.stream_number();

        self.attributes
            .iter()
            .filter(move |attr| attr.applies_to(stream_number) && attr.is_picture())
            .filter_map(|attr| match Picture::read(&attr.data) {
                Ok(picture) => picture,
                Err(err) => {
                    warn!("asf: skipping malformed picture: {}", err);
                    None
                }
            })
    }

    /// Get the number of chapters (markers).
    pub fn chapter_count(&self) -> u32 {
        self.markers.len() as u32
    }

    /// Get information about the selected stream. Chapter 0 describes the whole file, chapters 1
    /// and up describe the span from marker `chapter - 1` to the next marker or the end of the
    /// stream.
    pub fn stream_info(&self, chapter: u32) -> Result<StreamInfo> {
        let stream = match &self.stream {
            Some(stream) => stream,
            None => return decode_error("asf: no audio stream selected"),
        };

        if chapter > self.chapter_count() {
            return decode_error("asf: invalid chapter number");
        }

        let sample_rate = u64::from(stream.format.sample_rate);

        let mut tags = self.tags();
        let mut start_ts = 0;
        let mut n_frames = stream.total_frames;

        if chapter != 0 {
            let chapter = chapter as usize;

            if chapter != self.markers.len() {
                n_frames = muldiv(self.markers[chapter].pts, sample_rate, HNS_PER_SECOND);
            }

            let marker = &self.markers[chapter - 1];

            start_ts = muldiv(marker.pts, sample_rate, HNS_PER_SECOND);
            n_frames = n_frames.saturating_sub(start_ts);

            if !marker.title.is_empty() {
                let title = Tag::new(
                    Some(StandardTagKey::TrackTitle),
                    "Title",
                    Value::String(marker.title.clone()),
                );

                match tags.iter_mut().find(|tag| tag.std_key == Some(StandardTagKey::TrackTitle)) {
                    Some(tag) => *tag = title,
                    None => tags.push(title),
                }
            }
        }

        let mut codec_params = self.tracks[0].codec_params.clone();
        codec_params.with_n_frames(n_frames);

        Ok(StreamInfo {
            codec_params,
            format: stream.format.clone(),
            container: CONTAINER_NAME,
            average_bit_rate: stream.average_bit_rate,
            start_ts,
            n_frames,
            tags,
        })
    }

    /// Get the first embedded picture of the given type. Picture types follow the ID3v2 APIC
    /// picture type enumeration.
    pub fn picture(&self, picture_type: u8) -> Option<Picture> {
        self.pictures().find(|picture| picture.picture_type == picture_type)
    }

    /// Get the first embedded picture of any type as a `Visual`.
    pub fn visual(&self) -> Option<Visual> {
        self.pictures().next().map(|picture| picture.to_visual())
    }

    /// The average bit rate of the selected stream in bits per second.
    pub fn average_bit_rate(&self) -> u32 {
        self.stream.as_ref().map_or(0, |stream| stream.average_bit_rate)
    }

    /// The bit rate of the most recently read media object in bits per second.
    pub fn instant_bit_rate(&self) -> u32 {
        self.demuxer.instant_bit_rate()
    }
}

impl QueryDescriptor for AsfReader {
    fn query() -> &'static [Descriptor] {
        &[support_format!(
            "asf",
            "Advanced Systems Format",
            &["asf", "wm", "wma", "wmv"],
            &["audio/x-ms-wma", "video/x-ms-asf", "video/x-ms-wmv"],
            &[&HEADER_OBJECT.0]
        )]
    }

    fn score(_context: &[u8]) -> u8 {
        255
    }
}

impl FormatReader for AsfReader {
    fn try_new(source: MediaSourceStream, options: &FormatOptions) -> Result<Self> {
        AsfReader::try_new_with_options(source, options, &Default::default())
    }

    fn next_packet(&mut self) -> Result<Packet> {
        let sample_rate = match &self.stream {
            Some(stream) if self.mode.contains(OpenMode::PLAYBACK) => stream.format.sample_rate,
            _ => return decode_error("asf: not opened for playback"),
        };

        let mut object = loop {
            if let Some(object) = self.demuxer.pop() {
                break object;
            }

            if self.packet_number >= self.layout.packet_count {
                return end_of_stream_error();
            }

            self.demuxer.read_packet(&mut self.reader, self.layout.bytes_per_packet)?;
            self.packet_number += 1;
        };

        self.descrambler.descramble(&mut object.data)?;

        let sample_rate = u64::from(sample_rate);
        let ts = muldiv(object.pts, sample_rate, 1000);
        let dur = muldiv(object.duration, sample_rate, 1000);

        Ok(Packet::new_from_boxed_slice(
            u32::from(self.demuxer.stream_number()),
            ts,
            dur,
            object.data.into_boxed_slice(),
        ))
    }

    fn metadata(&mut self) -> Metadata<'_> {
        self.metadata.metadata()
    }

    fn cues(&self) -> &[Cue] {
        &self.cues
    }

    fn tracks(&self) -> &[Track] {
        &self.tracks
    }

    fn seek(&mut self, _mode: SeekMode, to: SeekTo) -> Result<SeekedTo> {
        let (track_id, sample_rate, total_frames) = match &self.stream {
            Some(stream) if self.mode.contains(OpenMode::PLAYBACK) => {
                (u32::from(stream.number), stream.format.sample_rate, stream.total_frames)
            }
            _ => return seek_error(SeekErrorKind::Unseekable),
        };

        let ts = match to {
            SeekTo::TimeStamp { ts, track_id: id } if id == track_id => ts,
            SeekTo::Time { time, track_id: None } => {
                TimeBase::new(1, sample_rate).calc_timestamp(time)
            }
            SeekTo::Time { time, track_id: Some(id) } if id == track_id => {
                TimeBase::new(1, sample_rate).calc_timestamp(time)
            }
            _ => return seek_error(SeekErrorKind::InvalidTrack),
        };

        // Locating a packet requires reading packet headers out of order.
        if !self.reader.is_seekable() {
            return seek_error(SeekErrorKind::Unseekable);
        }

        debug!("seeking to frame_ts={}", ts);

        self.demuxer.reset();

        let layout = self.layout;
        let point =
            find_packet(&mut self.reader, &self.demuxer, &layout, total_frames, sample_rate, ts)?;

        self.reader.seek(SeekFrom::Start(point.offset))?;
        self.packet_number = point.packet_number;

        debug!("seeked to packet={} (priming={})", point.packet_number, point.priming);

        Ok(SeekedTo { track_id, required_ts: ts, actual_ts: ts - point.priming })
    }

    fn into_inner(self: Box<Self>) -> MediaSourceStream {
        self.reader
    }
}

/// Read the body of the object whose header was just read.
fn read_object_body(reader: &mut MediaSourceStream, header: &ObjectHeader) -> Result<Box<[u8]>> {
    let len = header.size - OBJECT_HEADER_LEN;

    if len > MAX_HEADER_OBJECT_SIZE {
        return limit_error("asf: header object exceeds size limit");
    }

    Ok(reader.read_boxed_slice_exact(len as usize)?)
}

/// Move the reader to the absolute position `pos`. If the reader is not seekable only forward
/// moves are possible.
fn reposition(reader: &mut MediaSourceStream, pos: u64) -> Result<()> {
    if reader.is_seekable() {
        reader.seek(SeekFrom::Start(pos))?;
    }
    else {
        let current_pos = reader.pos();
        if pos >= current_pos {
            reader.ignore_bytes(pos - current_pos)?;
        }
        else {
            return seek_error(SeekErrorKind::ForwardOnly);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::muldiv;

    #[test]
    fn verify_muldiv() {
        assert_eq!(muldiv(10_000_000, 44100, 10_000_000), 44100);
        assert_eq!(muldiv(u64::MAX, 2, 1), u64::MAX);
        assert_eq!(muldiv(5, 3, 0), 0);
        assert_eq!(muldiv(1500, 48000, 1000), 72000);
    }
}
