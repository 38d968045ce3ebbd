// Symphonia
// Copyright (c) 2019-2022 The Project Symphonia Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::io::{Seek, SeekFrom};

use symphonia_core::errors::{seek_error, Result, SeekErrorKind};
use symphonia_core::io::ReadBytes;

use log::debug;

use crate::packet::{PacketDemuxer, PayloadParsingInfo};

/// The location and layout of the packets in the data object.
#[derive(Copy, Clone, Debug, Default)]
pub struct PacketLayout {
    /// The absolute position of the first packet.
    pub data_offset: u64,
    /// The length of all packets.
    pub data_len: u64,
    pub packet_count: u64,
    pub bytes_per_packet: u32,
}

/// The outcome of a packet search.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct SeekPoint {
    /// The packet to resume reading from. Equal to the packet count if the target is past the
    /// end of the stream.
    pub packet_number: u64,
    /// The absolute position of the packet.
    pub offset: u64,
    /// The number of frames to discard from the decoded output of the packet to reach the target.
    pub priming: u64,
}

/// Find the packet containing the frame `target` by reading packet headers. No index is used,
/// the search estimates a packet from the average number of frames per packet and then steps
/// backward until it finds a packet starting at or before the target that begins a new media
/// object of the stream.
///
/// The reader position is undefined after the search.
pub fn find_packet<R: ReadBytes + Seek>(
    reader: &mut R,
    demuxer: &PacketDemuxer,
    layout: &PacketLayout,
    total_frames: u64,
    sample_rate: u32,
    target: u64,
) -> Result<SeekPoint> {
    let end = SeekPoint {
        packet_number: layout.packet_count,
        offset: layout.data_offset + layout.data_len,
        priming: 0,
    };

    if layout.packet_count == 0 {
        return Ok(end);
    }

    // Packets must be a constant size to be located.
    if layout.bytes_per_packet == 0 {
        return seek_error(SeekErrorKind::Unseekable);
    }

    let frames_per_packet = (total_frames / layout.packet_count).max(1);

    let mut packet_number = target / frames_per_packet;

    loop {
        if packet_number >= layout.packet_count {
            return Ok(end);
        }

        if packet_number == 0 {
            return Ok(SeekPoint { packet_number: 0, offset: layout.data_offset, priming: target });
        }

        let offset = layout.data_offset + packet_number * u64::from(layout.bytes_per_packet);
        reader.seek(SeekFrom::Start(offset))?;

        let info = PayloadParsingInfo::read(reader, layout.bytes_per_packet)?;
        let pts = u64::from(info.send_time) * u64::from(sample_rate) / 1000;

        debug!("seek: packet={}, pts={}, target={}", packet_number, pts, target);

        if target > pts {
            if demuxer.is_beginning_of_packet(reader, &info)? {
                return Ok(SeekPoint { packet_number, offset, priming: target - pts });
            }

            packet_number -= 1;
        }
        else {
            let step = (pts - target) / (2 * frames_per_packet);
            packet_number -= step.max(1).min(packet_number);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use symphonia_core::io::MediaSourceStream;

    use super::*;

    const PACKET_LEN: u32 = 32;

    /// A packet with a single payload for stream 1 and a 100 ms duration.
    fn packet(send_time: u32, offset: u8) -> Vec<u8> {
        // Packet length WORD, padding length WORD. Property flags: offset and replicated data
        // length BYTE.
        let mut buf = vec![0x50, 0x05];
        buf.extend_from_slice(&(PACKET_LEN as u16).to_le_bytes());
        buf.extend_from_slice(&0u16.to_le_bytes());
        buf.extend_from_slice(&send_time.to_le_bytes());
        buf.extend_from_slice(&100u16.to_le_bytes());
        buf.extend_from_slice(&[0x81, offset, 0]);
        buf.resize(PACKET_LEN as usize, 0);
        buf
    }

    fn stream(packets: &[(u32, u8)]) -> (MediaSourceStream, PacketLayout) {
        let data: Vec<u8> = packets.iter().flat_map(|&(t, o)| packet(t, o)).collect();

        let layout = PacketLayout {
            data_offset: 0,
            data_len: data.len() as u64,
            packet_count: packets.len() as u64,
            bytes_per_packet: PACKET_LEN,
        };

        (MediaSourceStream::new(Box::new(Cursor::new(data)), Default::default()), layout)
    }

    #[test]
    fn verify_seek_to_start() {
        let (mut mss, layout) = stream(&[(0, 0), (100, 0), (200, 0), (300, 0)]);
        let demuxer = PacketDemuxer::new(1, 0, 0);

        let point = find_packet(&mut mss, &demuxer, &layout, 400, 1000, 0).unwrap();
        assert_eq!(point, SeekPoint { packet_number: 0, offset: 0, priming: 0 });

        let point = find_packet(&mut mss, &demuxer, &layout, 400, 1000, 60).unwrap();
        assert_eq!(point, SeekPoint { packet_number: 0, offset: 0, priming: 60 });
    }

    #[test]
    fn verify_seek_within_single_packet() {
        let (mut mss, layout) = stream(&[(0, 0)]);
        let demuxer = PacketDemuxer::new(1, 0, 0);

        let point = find_packet(&mut mss, &demuxer, &layout, 1000, 1000, 437).unwrap();
        assert_eq!(point.packet_number, 0);
        assert_eq!(point.priming, 437);
    }

    #[test]
    fn verify_seek_past_end_clamps() {
        let (mut mss, layout) = stream(&[(0, 0), (100, 0), (200, 0), (300, 0)]);
        let demuxer = PacketDemuxer::new(1, 0, 0);

        for &target in &[400, 401, 10_000] {
            let point = find_packet(&mut mss, &demuxer, &layout, 400, 1000, target).unwrap();
            assert_eq!(point, SeekPoint { packet_number: 4, offset: 128, priming: 0 });
        }
    }

    #[test]
    fn verify_seek_mid_stream() {
        let (mut mss, layout) = stream(&[(0, 0), (100, 0), (200, 0), (300, 0)]);
        let demuxer = PacketDemuxer::new(1, 0, 0);

        let point = find_packet(&mut mss, &demuxer, &layout, 400, 1000, 250).unwrap();
        assert_eq!(point, SeekPoint { packet_number: 2, offset: 64, priming: 50 });
    }

    #[test]
    fn verify_seek_steps_back_over_continuations() {
        // Packet 2 continues the media object started in packet 1.
        let (mut mss, layout) = stream(&[(0, 0), (100, 0), (200, 25), (300, 0)]);
        let demuxer = PacketDemuxer::new(1, 0, 0);

        let point = find_packet(&mut mss, &demuxer, &layout, 400, 1000, 250).unwrap();
        assert_eq!(point, SeekPoint { packet_number: 1, offset: 32, priming: 150 });
    }

    #[test]
    fn verify_seek_steps_back_when_estimate_is_late() {
        // Uneven packet durations make the estimate overshoot the target.
        let (mut mss, layout) = stream(&[(0, 0), (50, 0), (100, 0), (900, 0)]);
        let demuxer = PacketDemuxer::new(1, 0, 0);

        let point = find_packet(&mut mss, &demuxer, &layout, 1000, 1000, 780).unwrap();
        assert_eq!(point, SeekPoint { packet_number: 2, offset: 64, priming: 680 });
    }

    #[test]
    fn verify_empty_stream_clamps() {
        let (mut mss, layout) = stream(&[]);
        let demuxer = PacketDemuxer::new(1, 0, 0);

        let point = find_packet(&mut mss, &demuxer, &layout, 0, 1000, 100).unwrap();
        assert_eq!(point, SeekPoint { packet_number: 0, offset: 0, priming: 0 });
    }
}
