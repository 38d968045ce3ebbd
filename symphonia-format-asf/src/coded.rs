// Symphonia
// Copyright (c) 2019-2022 The Project Symphonia Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Variable width integers selected by 2-bit length type fields.

use std::io;

use symphonia_core::io::ReadBytes;

/// Get the width in bytes of the integer selected by the 2-bit field at `shift` in `flags`.
///
/// The selector values 0, 1, 2, and 3 map to widths of 0, 1, 2, and 4 bytes respectively.
#[inline(always)]
pub fn coded_size(flags: u8, shift: u32) -> usize {
    (1usize << ((flags >> shift) & 0x3)) >> 1
}

/// Read an integer of `size` bytes, as returned by `coded_size`. A size of 0 reads nothing and
/// yields 0.
pub fn read_coded<B: ReadBytes>(reader: &mut B, size: usize) -> io::Result<u32> {
    match size {
        0 => Ok(0),
        1 => Ok(u32::from(reader.read_u8()?)),
        2 => Ok(u32::from(reader.read_u16()?)),
        4 => reader.read_u32(),
        _ => Err(io::Error::new(io::ErrorKind::InvalidData, "asf: invalid coded size")),
    }
}

#[cfg(test)]
mod tests {
    use symphonia_core::io::BufReader;

    use super::{coded_size, read_coded};

    #[test]
    fn verify_coded_size() {
        assert_eq!(coded_size(0b00, 0), 0);
        assert_eq!(coded_size(0b01, 0), 1);
        assert_eq!(coded_size(0b10, 0), 2);
        assert_eq!(coded_size(0b11, 0), 4);

        // Same selectors at the other field offsets used by packet headers.
        assert_eq!(coded_size(0b0100_0000, 5), 2);
        assert_eq!(coded_size(0b1100_0000, 6), 4);
        assert_eq!(coded_size(0b0001_1000, 3), 4);
        assert_eq!(coded_size(0b0000_0100, 1), 2);
    }

    #[test]
    fn verify_read_coded() {
        let buf = [0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07];
        let mut reader = BufReader::new(&buf);

        assert_eq!(read_coded(&mut reader, 0).unwrap(), 0);
        assert_eq!(read_coded(&mut reader, 1).unwrap(), 0x01);
        assert_eq!(read_coded(&mut reader, 2).unwrap(), 0x0302);
        assert_eq!(read_coded(&mut reader, 4).unwrap(), 0x0706_0504);
        assert!(read_coded(&mut reader, 1).is_err());
        assert!(read_coded(&mut BufReader::new(&buf), 3).is_err());
    }
}
