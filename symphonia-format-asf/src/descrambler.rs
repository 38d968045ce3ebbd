// Symphonia
// Copyright (c) 2019-2022 The Project Symphonia Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::mem;

use symphonia_core::errors::{decode_error, Result};
use symphonia_core::io::{BufReader, ReadBytes};

use log::warn;

/// `Descrambler` undoes the interleaving applied to audio streams using the spread error
/// correction scheme.
///
/// When spread, a media object is cut into chunks of `virtual_chunk_length` bytes which are laid
/// out column-wise across `span` virtual packets. Descrambling transposes the chunks back into
/// their original order.
#[derive(Default)]
pub struct Descrambler {
    span: u8,
    virtual_packet_length: u16,
    virtual_chunk_length: u16,
    scratch: Vec<u8>,
}

impl Descrambler {
    /// Instantiate a `Descrambler` from the error correction data of a stream.
    ///
    /// Inconsistent parameters disable descrambling rather than failing.
    pub fn new(ec_data: &[u8]) -> Result<Descrambler> {
        let mut reader = BufReader::new(ec_data);

        let span = reader.read_u8()?;
        let virtual_packet_length = reader.read_u16()?;
        let virtual_chunk_length = reader.read_u16()?;

        Ok(Descrambler::with_params(span, virtual_packet_length, virtual_chunk_length))
    }

    pub fn with_params(
        span: u8,
        virtual_packet_length: u16,
        virtual_chunk_length: u16,
    ) -> Descrambler {
        let mut descrambler = Descrambler {
            span,
            virtual_packet_length,
            virtual_chunk_length,
            scratch: Vec::new(),
        };

        if span > 1 {
            if virtual_chunk_length == 0
                || virtual_packet_length / virtual_chunk_length <= 1
                || virtual_packet_length % virtual_chunk_length != 0
            {
                warn!(
                    "asf: invalid spread parameters ({}, {}, {}), descrambling disabled",
                    span, virtual_packet_length, virtual_chunk_length
                );
                descrambler.span = 0;
            }
            else {
                descrambler.scratch =
                    vec![0; usize::from(virtual_packet_length) * usize::from(span)];
            }
        }

        descrambler
    }

    /// Returns `true` if descrambling is a pass-through.
    pub fn is_identity(&self) -> bool {
        self.span <= 1
    }

    /// Descramble the media object in `buf`, in-place.
    pub fn descramble(&mut self, buf: &mut Vec<u8>) -> Result<()> {
        if self.is_identity() {
            return Ok(());
        }

        if buf.len() != self.scratch.len() {
            return decode_error("asf: invalid packet size for descrambler");
        }

        let n = usize::from(self.virtual_chunk_length);
        let h = usize::from(self.virtual_packet_length) / n;
        let w = usize::from(self.span);

        for i in 0..h {
            for j in 0..w {
                let src = n * (i + j * h);
                let dst = n * (j + i * w);
                self.scratch[dst..dst + n].copy_from_slice(&buf[src..src + n]);
            }
        }

        mem::swap(&mut self.scratch, buf);

        // The caller's buffer is now scratch space, keep it sized for the next call.
        self.scratch.resize(buf.len(), 0);

        Ok(())
    }
}
