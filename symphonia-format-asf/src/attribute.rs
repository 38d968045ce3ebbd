// Symphonia
// Copyright (c) 2019-2022 The Project Symphonia Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::collections::HashMap;

use symphonia_core::errors::{decode_error, Result};
use symphonia_core::io::{BufReader, ReadBytes};
use symphonia_core::meta::{StandardTagKey, StandardVisualKey, Tag, Value, Visual};

use lazy_static::lazy_static;

/// The name of the attribute holding embedded pictures.
pub const PICTURE_ATTRIBUTE: &str = "WM/Picture";

lazy_static! {
    static ref ASF_TAG_MAP: HashMap<&'static str, StandardTagKey> = {
        let mut m = HashMap::new();
        m.insert("musicbrainz/album artist id", StandardTagKey::MusicBrainzAlbumArtistId);
        m.insert("musicbrainz/album id", StandardTagKey::MusicBrainzAlbumId);
        m.insert("musicbrainz/artist id", StandardTagKey::MusicBrainzArtistId);
        m.insert("musicbrainz/disc id", StandardTagKey::MusicBrainzDiscId);
        m.insert("musicbrainz/release country", StandardTagKey::ReleaseCountry);
        m.insert("musicbrainz/release group id", StandardTagKey::MusicBrainzReleaseGroupId);
        m.insert("musicbrainz/track id", StandardTagKey::MusicBrainzRecordingId);
        m.insert("wm/albumartist", StandardTagKey::AlbumArtist);
        m.insert("wm/albumartistsortorder", StandardTagKey::SortAlbumArtist);
        m.insert("wm/albumsortorder", StandardTagKey::SortAlbum);
        m.insert("wm/albumtitle", StandardTagKey::Album);
        m.insert("wm/artistsortorder", StandardTagKey::SortArtist);
        m.insert("wm/barcode", StandardTagKey::IdentBarcode);
        m.insert("wm/beatsperminute", StandardTagKey::Bpm);
        m.insert("wm/catalogno", StandardTagKey::IdentCatalogNumber);
        m.insert("wm/comments", StandardTagKey::Comment);
        m.insert("wm/compilation", StandardTagKey::Compilation);
        m.insert("wm/composer", StandardTagKey::Composer);
        m.insert("wm/composersortorder", StandardTagKey::SortComposer);
        m.insert("wm/conductor", StandardTagKey::Conductor);
        m.insert("wm/contentgroupdescription", StandardTagKey::ContentGroup);
        m.insert("wm/copyright", StandardTagKey::Copyright);
        m.insert("wm/encodedby", StandardTagKey::EncodedBy);
        m.insert("wm/encodingsettings", StandardTagKey::EncoderSettings);
        m.insert("wm/encodingtime", StandardTagKey::EncodingDate);
        m.insert("wm/genre", StandardTagKey::Genre);
        m.insert("wm/isrc", StandardTagKey::IdentIsrc);
        m.insert("wm/lyrics", StandardTagKey::Lyrics);
        m.insert("wm/mixer", StandardTagKey::MixEngineer);
        m.insert("wm/modifiedby", StandardTagKey::Remixer);
        m.insert("wm/mood", StandardTagKey::Mood);
        m.insert("wm/originalalbumtitle", StandardTagKey::OriginalAlbum);
        m.insert("wm/originalartist", StandardTagKey::OriginalArtist);
        m.insert("wm/originalfilename", StandardTagKey::OriginalFile);
        m.insert("wm/originallyricist", StandardTagKey::OriginalWriter);
        m.insert("wm/partofset", StandardTagKey::DiscNumber);
        m.insert("wm/producer", StandardTagKey::Producer);
        m.insert("wm/publisher", StandardTagKey::Label);
        m.insert("wm/sharedusersrating", StandardTagKey::Rating);
        m.insert("wm/shareduserrating", StandardTagKey::Rating);
        m.insert("wm/titlesortorder", StandardTagKey::SortTrackTitle);
        m.insert("wm/tracknumber", StandardTagKey::TrackNumber);
        m.insert("wm/writer", StandardTagKey::Lyricist);
        m.insert("wm/year", StandardTagKey::Date);
        m
    };
}

/// Get the standard tag key for an attribute name. Names are compared case-insensitively.
pub fn std_key_for(name: &str) -> Option<StandardTagKey> {
    ASF_TAG_MAP.get(name.to_ascii_lowercase().as_str()).copied()
}

/// Decode a UTF-16LE string. Decoding stops at the first NUL character and unpaired surrogates
/// are replaced.
pub fn decode_utf16le(buf: &[u8]) -> String {
    let units = buf.chunks_exact(2).map(|pair| u16::from_le_bytes([pair[0], pair[1]]));

    char::decode_utf16(units)
        .map(|c| c.unwrap_or(char::REPLACEMENT_CHARACTER))
        .take_while(|&c| c != '\0')
        .collect()
}

/// Read a UTF-16LE string of `len` bytes. Odd lengths are rounded up to whole code units.
pub fn read_string<B: ReadBytes>(reader: &mut B, len: usize) -> Result<String> {
    let len = len + (len & 1);

    if len == 0 {
        return Ok(String::new());
    }

    let buf = reader.read_boxed_slice_exact(len)?;
    Ok(decode_utf16le(&buf))
}

/// The type of an attribute's value.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum AttributeType {
    Unicode,
    Bytes,
    Boolean,
    Dword,
    Qword,
    Word,
    Guid,
}

impl AttributeType {
    pub fn from_u16(value: u16) -> Result<AttributeType> {
        let kind = match value {
            0 => AttributeType::Unicode,
            1 => AttributeType::Bytes,
            2 => AttributeType::Boolean,
            3 => AttributeType::Dword,
            4 => AttributeType::Qword,
            5 => AttributeType::Word,
            6 => AttributeType::Guid,
            _ => return decode_error("asf: invalid attribute data type"),
        };
        Ok(kind)
    }
}

/// A named, typed value attached to the file or one of its streams.
#[derive(Clone, Debug)]
pub struct Attribute {
    pub name: String,
    pub data: Box<[u8]>,
    pub kind: AttributeType,
    /// The stream the attribute applies to, or 0 for the whole file.
    pub stream_number: u16,
}

impl Attribute {
    /// Returns `true` if the attribute applies to the whole file or to `stream_number`.
    pub fn applies_to(&self, stream_number: u16) -> bool {
        self.stream_number == 0 || self.stream_number == stream_number
    }

    /// Convert the attribute's value into a display string. Byte and GUID values are not textual
    /// and yield an empty string.
    pub fn to_display_string(&self) -> String {
        match self.kind {
            AttributeType::Unicode => decode_utf16le(&self.data),
            AttributeType::Boolean => {
                let value = self.data.first().map_or(false, |&b| b != 0);
                String::from(if value { "Yes" } else { "No" })
            }
            AttributeType::Dword | AttributeType::Qword | AttributeType::Word => {
                let len = match self.kind {
                    AttributeType::Qword => 8,
                    AttributeType::Dword => 4,
                    _ => 2,
                };

                let mut bytes = [0u8; 8];
                let n = len.min(self.data.len());
                bytes[..n].copy_from_slice(&self.data[..n]);

                u64::from_le_bytes(bytes).to_string()
            }
            AttributeType::Bytes | AttributeType::Guid => String::new(),
        }
    }

    /// Convert the attribute into a `Tag`. Attributes without a name or a textual value produce
    /// no tag.
    pub fn to_tag(&self) -> Option<Tag> {
        let value = self.to_display_string();

        if self.name.is_empty() || value.is_empty() {
            return None;
        }

        Some(Tag::new(std_key_for(&self.name), &self.name, Value::String(value)))
    }

    /// Returns `true` if the attribute holds an embedded picture.
    pub fn is_picture(&self) -> bool {
        self.kind == AttributeType::Bytes && self.name.eq_ignore_ascii_case(PICTURE_ATTRIBUTE)
    }
}

/// An embedded picture read from a `WM/Picture` attribute.
#[derive(Clone, Debug)]
pub struct Picture {
    /// The picture type, using the same enumeration as ID3v2 APIC frames.
    pub picture_type: u8,
    pub mime_type: String,
    pub description: String,
    pub data: Box<[u8]>,
}

impl Picture {
    /// Parse a picture from the value of a `WM/Picture` attribute. Returns `None` if the picture
    /// contains no image data.
    pub fn read(buf: &[u8]) -> Result<Option<Picture>> {
        let mut reader = BufReader::new(buf);

        let picture_type = reader.read_u8()?;
        // The declared data size is not trusted, the image data is the remainder of the value.
        let _data_size = reader.read_u32()?;

        let mime_type = read_nul_terminated(&mut reader);
        let description = read_nul_terminated(&mut reader);

        let data = reader.read_buf_bytes_available_ref();

        if data.is_empty() {
            return Ok(None);
        }

        Ok(Some(Picture { picture_type, mime_type, description, data: Box::from(data) }))
    }

    pub fn to_visual(&self) -> Visual {
        let mut tags = Vec::new();

        if !self.description.is_empty() {
            tags.push(Tag::new(
                Some(StandardTagKey::Description),
                "Description",
                Value::String(self.description.clone()),
            ));
        }

        Visual {
            media_type: self.mime_type.clone(),
            dimensions: None,
            bits_per_pixel: None,
            color_mode: None,
            usage: visual_key_from_picture_type(self.picture_type),
            tags,
            data: self.data.clone(),
        }
    }
}

/// Read a NUL-terminated UTF-16LE string. If no terminator is found the rest of the buffer is
/// consumed and an empty string returned.
fn read_nul_terminated(reader: &mut BufReader<'_>) -> String {
    let rest = reader.read_buf_bytes_available_ref();

    match rest.chunks_exact(2).position(|pair| pair == [0, 0]) {
        Some(units) => {
            let len = 2 * (units + 1);
            let string = decode_utf16le(&rest[..len]);

            // Rewind to just after the terminator.
            *reader = BufReader::new(&rest[len..]);
            string
        }
        None => String::new(),
    }
}

/// Map a picture type to a standard visual key.
pub fn visual_key_from_picture_type(picture_type: u8) -> Option<StandardVisualKey> {
    match picture_type {
        0x01 => Some(StandardVisualKey::FileIcon),
        0x02 => Some(StandardVisualKey::OtherIcon),
        0x03 => Some(StandardVisualKey::FrontCover),
        0x04 => Some(StandardVisualKey::BackCover),
        0x05 => Some(StandardVisualKey::Leaflet),
        0x06 => Some(StandardVisualKey::Media),
        0x07 => Some(StandardVisualKey::LeadArtistPerformerSoloist),
        0x08 => Some(StandardVisualKey::ArtistPerformer),
        0x09 => Some(StandardVisualKey::Conductor),
        0x0a => Some(StandardVisualKey::BandOrchestra),
        0x0b => Some(StandardVisualKey::Composer),
        0x0c => Some(StandardVisualKey::Lyricist),
        0x0d => Some(StandardVisualKey::RecordingLocation),
        0x0e => Some(StandardVisualKey::RecordingSession),
        0x0f => Some(StandardVisualKey::Performance),
        0x10 => Some(StandardVisualKey::ScreenCapture),
        0x12 => Some(StandardVisualKey::Illustration),
        0x13 => Some(StandardVisualKey::BandArtistLogo),
        0x14 => Some(StandardVisualKey::PublisherStudioLogo),
        _ => None,
    }
}
