// Symphonia
// Copyright (c) 2019-2022 The Project Symphonia Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use bitflags::bitflags;

use symphonia_core::codecs::CodecRegistry;

bitflags! {
    /// Selects which parts of the file are read when the reader is instantiated.
    #[derive(Default)]
    pub struct OpenMode: u32 {
        /// Prepare the audio stream for packet reading and seeking.
        const PLAYBACK = 1 << 0;
        /// Read tags, markers, and the content description.
        const METADATA = 1 << 1;
        /// Read embedded pictures.
        const PICTURES = 1 << 2;
    }
}

/// Options specific to `AsfReader`.
#[derive(Copy, Clone)]
pub struct AsfOptions<'a> {
    /// The parts of the file to read.
    pub mode: OpenMode,
    /// If provided, an audio stream is only selected if the registry has a decoder for its codec.
    pub codecs: Option<&'a CodecRegistry>,
}

impl Default for AsfOptions<'_> {
    fn default() -> Self {
        AsfOptions { mode: OpenMode::all(), codecs: None }
    }
}
