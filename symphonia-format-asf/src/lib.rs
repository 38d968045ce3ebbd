// Symphonia
// Copyright (c) 2019-2022 The Project Symphonia Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

#![warn(rust_2018_idioms)]
#![forbid(unsafe_code)]
// The following lints are allowed in all Symphonia crates. Please see clippy.toml for their
// justification.
#![allow(clippy::comparison_chain)]
#![allow(clippy::excessive_precision)]
#![allow(clippy::identity_op)]
#![allow(clippy::manual_range_contains)]

mod attribute;
mod coded;
mod demuxer;
mod descrambler;
mod format;
mod guid;
mod objects;
mod options;
mod packet;
mod seek;

pub use attribute::Picture;
pub use demuxer::{AsfReader, StreamInfo, CONTAINER_NAME};
pub use format::WaveFormat;
pub use options::{AsfOptions, OpenMode};
pub use packet::MAX_MEDIA_OBJECT_SIZE;
