// Symphonia
// Copyright (c) 2019-2022 The Project Symphonia Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::fmt;

use symphonia_core::errors::{decode_error, Result};
use symphonia_core::io::ReadBytes;

/// The size of an object header: a 16-byte GUID followed by a 64-bit object size.
pub const OBJECT_HEADER_LEN: u64 = 24;

/// A 128-bit identifier as stored in the file (little-endian field order).
#[derive(Copy, Clone, Default, PartialEq, Eq, Hash)]
pub struct Guid(pub [u8; 16]);

impl Guid {
    pub fn read<B: ReadBytes>(reader: &mut B) -> Result<Guid> {
        let mut buf = [0u8; 16];
        reader.read_buf_exact(&mut buf)?;
        Ok(Guid(buf))
    }
}

impl fmt::Debug for Guid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let b = &self.0;
        // Print using the canonical textual form.
        write!(
            f,
            "{:02x}{:02x}{:02x}{:02x}-{:02x}{:02x}-{:02x}{:02x}-{:02x}{:02x}-",
            b[3], b[2], b[1], b[0], b[5], b[4], b[7], b[6], b[8], b[9]
        )?;
        for byte in &b[10..] {
            write!(f, "{:02x}", byte)?;
        }
        Ok(())
    }
}

// Top-level objects.
pub const HEADER_OBJECT: Guid = Guid([
    0x30, 0x26, 0xb2, 0x75, 0x8e, 0x66, 0xcf, 0x11, 0xa6, 0xd9, 0x00, 0xaa, 0x00, 0x62, 0xce, 0x6c,
]);
pub const DATA_OBJECT: Guid = Guid([
    0x36, 0x26, 0xb2, 0x75, 0x8e, 0x66, 0xcf, 0x11, 0xa6, 0xd9, 0x00, 0xaa, 0x00, 0x62, 0xce, 0x6c,
]);

// Header objects.
pub const FILE_PROPERTIES_OBJECT: Guid = Guid([
    0xa1, 0xdc, 0xab, 0x8c, 0x47, 0xa9, 0xcf, 0x11, 0x8e, 0xe4, 0x00, 0xc0, 0x0c, 0x20, 0x53, 0x65,
]);
pub const STREAM_PROPERTIES_OBJECT: Guid = Guid([
    0x91, 0x07, 0xdc, 0xb7, 0xb7, 0xa9, 0xcf, 0x11, 0x8e, 0xe6, 0x00, 0xc0, 0x0c, 0x20, 0x53, 0x65,
]);
pub const HEADER_EXTENSION_OBJECT: Guid = Guid([
    0xb5, 0x03, 0xbf, 0x5f, 0x2e, 0xa9, 0xcf, 0x11, 0x8e, 0xe3, 0x00, 0xc0, 0x0c, 0x20, 0x53, 0x65,
]);
pub const MARKER_OBJECT: Guid = Guid([
    0x01, 0xcd, 0x87, 0xf4, 0x51, 0xa9, 0xcf, 0x11, 0x8e, 0xe6, 0x00, 0xc0, 0x0c, 0x20, 0x53, 0x65,
]);
pub const CONTENT_DESCRIPTION_OBJECT: Guid = Guid([
    0x33, 0x26, 0xb2, 0x75, 0x8e, 0x66, 0xcf, 0x11, 0xa6, 0xd9, 0x00, 0xaa, 0x00, 0x62, 0xce, 0x6c,
]);
pub const EXTENDED_CONTENT_DESCRIPTION_OBJECT: Guid = Guid([
    0x40, 0xa4, 0xd0, 0xd2, 0x07, 0xe3, 0xd2, 0x11, 0x97, 0xf0, 0x00, 0xa0, 0xc9, 0x5e, 0xa8, 0x50,
]);
pub const CONTENT_ENCRYPTION_OBJECT: Guid = Guid([
    0xfb, 0xb3, 0x11, 0x22, 0x23, 0xbd, 0xd2, 0x11, 0xb4, 0xb7, 0x00, 0xa0, 0xc9, 0x55, 0xfc, 0x6e,
]);
pub const EXTENDED_CONTENT_ENCRYPTION_OBJECT: Guid = Guid([
    0x14, 0xe6, 0x8a, 0x29, 0x22, 0x26, 0x17, 0x4c, 0xb9, 0x35, 0xda, 0xe0, 0x7e, 0xe9, 0x28, 0x9c,
]);
pub const ADVANCED_CONTENT_ENCRYPTION_OBJECT: Guid = Guid([
    0xb6, 0x9b, 0x07, 0x7a, 0xa4, 0xda, 0x12, 0x4e, 0xa5, 0xca, 0x91, 0xd3, 0x8d, 0xc1, 0x1a, 0x8d,
]);

// Header extension objects.
pub const EXTENDED_STREAM_PROPERTIES_OBJECT: Guid = Guid([
    0xcb, 0xa5, 0xe6, 0x14, 0x72, 0xc6, 0x32, 0x43, 0x83, 0x99, 0xa9, 0x69, 0x52, 0x06, 0x5b, 0x5a,
]);
pub const METADATA_OBJECT: Guid = Guid([
    0xea, 0xcb, 0xf8, 0xc5, 0xaf, 0x5b, 0x77, 0x48, 0x84, 0x67, 0xaa, 0x8c, 0x44, 0xfa, 0x4c, 0xca,
]);
pub const METADATA_LIBRARY_OBJECT: Guid = Guid([
    0x94, 0x1c, 0x23, 0x44, 0x98, 0x94, 0xd1, 0x49, 0xa1, 0x41, 0x1d, 0x13, 0x4e, 0x45, 0x70, 0x54,
]);

// Stream types.
pub const AUDIO_MEDIA: Guid = Guid([
    0x40, 0x9e, 0x69, 0xf8, 0x4d, 0x5b, 0xcf, 0x11, 0xa8, 0xfd, 0x00, 0x80, 0x5f, 0x5c, 0x44, 0x2b,
]);

// Error correction types.
pub const NO_ERROR_CORRECTION: Guid = Guid([
    0x00, 0x57, 0xfb, 0x20, 0x55, 0x5b, 0xcf, 0x11, 0xa8, 0xfd, 0x00, 0x80, 0x5f, 0x5c, 0x44, 0x2b,
]);
pub const AUDIO_SPREAD: Guid = Guid([
    0x50, 0xcd, 0xc3, 0xbf, 0x8f, 0x61, 0xcf, 0x11, 0x8b, 0xb2, 0x00, 0xaa, 0x00, 0xb4, 0xe2, 0x20,
]);

/// The objects the header walk knows how to handle.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ObjectKind {
    Header,
    Data,
    FileProperties,
    StreamProperties,
    HeaderExtension,
    ExtendedStreamProperties,
    Marker,
    ContentDescription,
    ExtendedContentDescription,
    Metadata,
    MetadataLibrary,
    ContentEncryption,
    Unknown,
}

impl ObjectKind {
    pub fn from_guid(guid: &Guid) -> ObjectKind {
        match *guid {
            HEADER_OBJECT => ObjectKind::Header,
            DATA_OBJECT => ObjectKind::Data,
            FILE_PROPERTIES_OBJECT => ObjectKind::FileProperties,
            STREAM_PROPERTIES_OBJECT => ObjectKind::StreamProperties,
            HEADER_EXTENSION_OBJECT => ObjectKind::HeaderExtension,
            EXTENDED_STREAM_PROPERTIES_OBJECT => ObjectKind::ExtendedStreamProperties,
            MARKER_OBJECT => ObjectKind::Marker,
            CONTENT_DESCRIPTION_OBJECT => ObjectKind::ContentDescription,
            EXTENDED_CONTENT_DESCRIPTION_OBJECT => ObjectKind::ExtendedContentDescription,
            METADATA_OBJECT => ObjectKind::Metadata,
            METADATA_LIBRARY_OBJECT => ObjectKind::MetadataLibrary,
            CONTENT_ENCRYPTION_OBJECT
            | EXTENDED_CONTENT_ENCRYPTION_OBJECT
            | ADVANCED_CONTENT_ENCRYPTION_OBJECT => ObjectKind::ContentEncryption,
            _ => ObjectKind::Unknown,
        }
    }
}

/// The header common to every object: its type and total size, header included.
#[derive(Copy, Clone, Debug)]
pub struct ObjectHeader {
    pub guid: Guid,
    pub size: u64,
}

impl ObjectHeader {
    pub fn read<B: ReadBytes>(reader: &mut B) -> Result<ObjectHeader> {
        let guid = Guid::read(reader)?;
        let size = reader.read_u64()?;

        // An object can never be smaller than its own header.
        if size < OBJECT_HEADER_LEN {
            return decode_error("asf: object size smaller than object header");
        }

        Ok(ObjectHeader { guid, size })
    }

    pub fn kind(&self) -> ObjectKind {
        ObjectKind::from_guid(&self.guid)
    }
}

#[cfg(test)]
mod tests {
    use symphonia_core::io::BufReader;

    use super::*;

    #[test]
    fn verify_object_header() {
        let mut buf = HEADER_OBJECT.0.to_vec();
        buf.extend_from_slice(&30u64.to_le_bytes());

        let header = ObjectHeader::read(&mut BufReader::new(&buf)).unwrap();
        assert_eq!(header.kind(), ObjectKind::Header);
        assert_eq!(header.size, 30);
    }

    #[test]
    fn verify_undersized_object_is_rejected() {
        let mut buf = DATA_OBJECT.0.to_vec();
        buf.extend_from_slice(&23u64.to_le_bytes());

        assert!(ObjectHeader::read(&mut BufReader::new(&buf)).is_err());
    }

    #[test]
    fn verify_guid_catalog() {
        assert_eq!(ObjectKind::from_guid(&METADATA_LIBRARY_OBJECT), ObjectKind::MetadataLibrary);
        assert_eq!(
            ObjectKind::from_guid(&ADVANCED_CONTENT_ENCRYPTION_OBJECT),
            ObjectKind::ContentEncryption
        );
        assert_eq!(ObjectKind::from_guid(&AUDIO_MEDIA), ObjectKind::Unknown);
        assert_eq!(
            format!("{:?}", HEADER_OBJECT),
            "75b22630-668e-11cf-a6d9-00aa0062ce6c"
        );
    }
}
