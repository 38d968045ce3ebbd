// Symphonia
// Copyright (c) 2019-2022 The Project Symphonia Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::mem;

use symphonia_core::errors::{decode_error, limit_error, Result};
use symphonia_core::io::{BufReader, ReadBytes};

use log::debug;

use crate::coded::{coded_size, read_coded};

/// The largest media object that will be reassembled.
pub const MAX_MEDIA_OBJECT_SIZE: u32 = 16 * 1024 * 1024;

/// The packet header preceding the payloads of every data packet.
#[derive(Copy, Clone, Debug, Default)]
pub struct PayloadParsingInfo {
    pub length_type_flags: u8,
    pub property_flags: u8,
    pub packet_length: u32,
    pub sequence: u32,
    pub padding_length: u32,
    /// Send time in milliseconds.
    pub send_time: u32,
    /// Duration in milliseconds.
    pub duration: u16,
    pub payload_flags: u8,
}

impl PayloadParsingInfo {
    /// Read the packet header. A packet length of 0 is replaced by `bytes_per_packet`.
    pub fn read<B: ReadBytes>(
        reader: &mut B,
        bytes_per_packet: u32,
    ) -> Result<PayloadParsingInfo> {
        let mut length_type_flags = reader.read_u8()?;

        // Error correction data is present, skip it.
        if length_type_flags & 0x80 != 0 {
            reader.ignore_bytes(u64::from(length_type_flags & 0xf))?;
            length_type_flags = reader.read_u8()?;
        }

        let packet_length_size = coded_size(length_type_flags, 5);
        let sequence_size = coded_size(length_type_flags, 1);
        let padding_length_size = coded_size(length_type_flags, 3);
        let payload_flags_size = usize::from(length_type_flags & 0x1);

        // Read the whole header in one go.
        let mut buf = [0u8; 1 + 4 + 4 + 4 + 4 + 2 + 1];
        let len = 1 + packet_length_size + sequence_size + padding_length_size + 4 + 2;
        let len = len + payload_flags_size;

        reader.read_buf_exact(&mut buf[..len])?;

        let mut hdr = BufReader::new(&buf[..len]);

        let property_flags = hdr.read_u8()?;
        let mut packet_length = read_coded(&mut hdr, packet_length_size)?;
        let sequence = read_coded(&mut hdr, sequence_size)?;
        let padding_length = read_coded(&mut hdr, padding_length_size)?;
        let send_time = hdr.read_u32()?;
        let duration = hdr.read_u16()?;
        let payload_flags = if payload_flags_size != 0 { hdr.read_u8()? } else { 0 };

        if packet_length == 0 {
            packet_length = bytes_per_packet;
        }

        if packet_length < padding_length {
            return decode_error("asf: invalid packet length");
        }

        Ok(PayloadParsingInfo {
            length_type_flags,
            property_flags,
            packet_length,
            sequence,
            padding_length,
            send_time,
            duration,
            payload_flags,
        })
    }

    pub fn has_multiple_payloads(&self) -> bool {
        self.length_type_flags & 0x1 != 0
    }

    /// The number of payloads in the packet.
    pub fn payload_count(&self) -> u32 {
        if self.has_multiple_payloads() {
            u32::from(self.payload_flags & 0x3f)
        }
        else {
            1
        }
    }
}

/// The header preceding each payload.
#[derive(Copy, Clone, Debug, Default)]
pub struct PayloadDataHeader {
    pub stream_number: u8,
    pub media_object_number: u32,
    pub offset_into_media_object: u32,
    pub replicated_data_length: u32,
}

impl PayloadDataHeader {
    pub fn read<B: ReadBytes>(
        reader: &mut B,
        info: &PayloadParsingInfo,
    ) -> Result<PayloadDataHeader> {
        let media_object_number_size = coded_size(info.property_flags, 4);
        let offset_size = coded_size(info.property_flags, 2);
        let replicated_data_length_size = coded_size(info.property_flags, 0);

        let mut buf = [0u8; 1 + 4 + 4 + 4];
        let len = 1 + media_object_number_size + offset_size + replicated_data_length_size;

        reader.read_buf_exact(&mut buf[..len])?;

        let mut hdr = BufReader::new(&buf[..len]);

        Ok(PayloadDataHeader {
            stream_number: hdr.read_u8()? & 0x7f,
            media_object_number: read_coded(&mut hdr, media_object_number_size)?,
            offset_into_media_object: read_coded(&mut hdr, offset_size)?,
            replicated_data_length: read_coded(&mut hdr, replicated_data_length_size)?,
        })
    }
}

/// Read the length field of a payload in a packet with multiple payloads.
pub fn read_payload_length<B: ReadBytes>(
    reader: &mut B,
    info: &PayloadParsingInfo,
) -> Result<u32> {
    Ok(read_coded(reader, coded_size(info.payload_flags, 6))?)
}

/// A complete media object.
#[derive(Clone, Debug, Default)]
pub struct MediaObject {
    /// Presentation time in milliseconds, relative to the start of playback.
    pub pts: u64,
    /// Duration in milliseconds.
    pub duration: u64,
    pub data: Vec<u8>,
}

/// `PacketDemuxer` reads data packets and reassembles the media objects of one stream from the
/// payloads they carry.
pub struct PacketDemuxer {
    stream_number: u8,
    /// Preroll in milliseconds.
    preroll: u64,
    average_bit_rate: u32,
    instant_bit_rate: u32,
    /// The media object being reassembled.
    buffer: Vec<u8>,
    /// The number of bytes of `buffer` filled so far.
    cursor: usize,
    /// The presentation time of the media object being reassembled.
    pts: u64,
    /// Completed media objects, consumed from the back.
    queue: Vec<MediaObject>,
}

impl PacketDemuxer {
    pub fn new(stream_number: u8, preroll: u64, average_bit_rate: u32) -> Self {
        PacketDemuxer {
            stream_number,
            preroll,
            average_bit_rate,
            instant_bit_rate: average_bit_rate,
            buffer: Vec::new(),
            cursor: 0,
            pts: 0,
            queue: Vec::new(),
        }
    }

    pub fn stream_number(&self) -> u8 {
        self.stream_number
    }

    /// The bit rate of the most recently completed media object.
    pub fn instant_bit_rate(&self) -> u32 {
        self.instant_bit_rate
    }

    /// Take the next completed media object in play order, if any.
    pub fn pop(&mut self) -> Option<MediaObject> {
        self.queue.pop()
    }

    /// Discard all queued and partially reassembled media objects.
    pub fn reset(&mut self) {
        self.queue.clear();
        self.buffer.clear();
        self.cursor = 0;
    }

    /// Read one packet starting at the current position of `reader`, queueing all media objects
    /// it completes. The reader is left at the end of the packet.
    pub fn read_packet<B: ReadBytes>(
        &mut self,
        reader: &mut B,
        bytes_per_packet: u32,
    ) -> Result<()> {
        let packet_offset = reader.pos();
        let info = PayloadParsingInfo::read(reader, bytes_per_packet)?;
        self.demux_payloads(reader, &info, packet_offset)
    }

    /// Demultiplex the payloads of a packet whose header was read from `packet_offset`.
    pub fn demux_payloads<B: ReadBytes>(
        &mut self,
        reader: &mut B,
        info: &PayloadParsingInfo,
        packet_offset: u64,
    ) -> Result<()> {
        let packet_end = packet_offset + u64::from(info.packet_length);
        let multiple_payloads = info.has_multiple_payloads();

        for _ in 0..info.payload_count() {
            let head = PayloadDataHeader::read(reader, info)?;

            let mut media_object_size = 0;
            let mut presentation_time = None;

            match head.replicated_data_length {
                0 => (),
                1 => {
                    // Compressed payload, a presentation time delta.
                    let _delta = reader.read_u8()?;
                }
                len if len >= 8 => {
                    media_object_size = reader.read_u32()?;
                    presentation_time = Some(reader.read_u32()?);
                    reader.ignore_bytes(u64::from(len - 8))?;
                }
                _ => return decode_error("asf: invalid replicated data length"),
            }

            let payload_length = if multiple_payloads {
                read_payload_length(reader, info)?
            }
            else {
                // A single payload fills the rest of the packet, excluding padding.
                let remaining = packet_end.saturating_sub(reader.pos());

                match remaining.checked_sub(u64::from(info.padding_length)) {
                    Some(len) if len <= u64::from(u32::MAX) => len as u32,
                    _ => return decode_error("asf: invalid payload length"),
                }
            };

            if head.stream_number != self.stream_number {
                reader.ignore_bytes(u64::from(payload_length))?;
                continue;
            }

            if head.replicated_data_length < 8 {
                media_object_size = payload_length;
            }

            let offset = head.offset_into_media_object as usize;

            if self.cursor != offset
                || u64::from(payload_length) + self.cursor as u64 > u64::from(media_object_size)
            {
                return decode_error("asf: invalid packet payload");
            }

            // Continuations must agree with the size declared by the first fragment.
            if self.cursor != 0 && media_object_size as usize != self.buffer.len() {
                return decode_error("asf: media object size mismatch");
            }

            if payload_length == 0 {
                continue;
            }

            // First payload of a new media object.
            if self.cursor == 0 {
                if media_object_size > MAX_MEDIA_OBJECT_SIZE {
                    return limit_error("asf: media object exceeds size limit");
                }

                self.buffer = vec![0; media_object_size as usize];

                self.pts = match presentation_time {
                    Some(pts) => u64::from(pts).saturating_sub(self.preroll),
                    None => u64::from(info.send_time),
                };
            }

            let end = self.cursor + payload_length as usize;
            reader.read_buf_exact(&mut self.buffer[self.cursor..end])?;
            self.cursor = end;

            if self.cursor == self.buffer.len() {
                self.cursor = 0;

                self.instant_bit_rate = if info.duration != 0 {
                    let rate = u64::from(media_object_size) * 8000 / u64::from(info.duration);
                    rate.min(u64::from(u32::MAX)) as u32
                }
                else {
                    self.average_bit_rate
                };

                self.queue.push(MediaObject {
                    pts: self.pts,
                    duration: u64::from(info.duration),
                    data: mem::take(&mut self.buffer),
                });
            }
        }

        let pos = reader.pos();

        if pos > packet_end {
            return decode_error("asf: read outside of packet boundaries");
        }
        else if pos < packet_end {
            reader.ignore_bytes(packet_end - pos)?;
        }

        // Payloads of a packet with multiple payloads complete in reverse play order.
        if multiple_payloads {
            self.queue.reverse();
        }

        Ok(())
    }

    /// Returns `true` if the first payload of the selected stream in the packet starts a new media
    /// object. Only payload headers are read.
    pub fn is_beginning_of_packet<B: ReadBytes>(
        &self,
        reader: &mut B,
        info: &PayloadParsingInfo,
    ) -> Result<bool> {
        let multiple_payloads = info.has_multiple_payloads();

        for _ in 0..info.payload_count() {
            let head = PayloadDataHeader::read(reader, info)?;

            if head.stream_number == self.stream_number {
                return Ok(head.offset_into_media_object == 0);
            }

            if multiple_payloads {
                reader.ignore_bytes(u64::from(head.replicated_data_length))?;
                let payload_length = read_payload_length(reader, info)?;
                reader.ignore_bytes(u64::from(payload_length))?;
            }
        }

        debug!("no payload for stream {} in packet", self.stream_number);

        Ok(false)
    }
}

#[cfg(test)]
mod tests {
    use symphonia_core::errors::Error;
    use symphonia_core::io::BufReader;

    use super::*;

    /// Length type flags: packet length and padding length as WORDs.
    const SINGLE: u8 = 0b0101_0000;
    /// As `SINGLE`, with multiple payloads.
    const MULTIPLE: u8 = SINGLE | 0x1;
    /// Property flags: replicated data length BYTE, offset DWORD, media object number BYTE.
    const PROPS: u8 = 0x5d;

    fn parsing_info(flags: u8, packet_len: u16, padding: u16, send_time: u32) -> Vec<u8> {
        let mut buf = vec![flags, PROPS];
        buf.extend_from_slice(&packet_len.to_le_bytes());
        buf.extend_from_slice(&padding.to_le_bytes());
        buf.extend_from_slice(&send_time.to_le_bytes());
        buf.extend_from_slice(&100u16.to_le_bytes());
        buf
    }

    fn payload_header(stream: u8, object: u8, offset: u32, replicated: &[u8]) -> Vec<u8> {
        let mut buf = vec![0x80 | stream, object];
        buf.extend_from_slice(&offset.to_le_bytes());
        buf.push(replicated.len() as u8);
        buf.extend_from_slice(replicated);
        buf
    }

    fn replicated(size: u32, pts: u32) -> Vec<u8> {
        let mut buf = size.to_le_bytes().to_vec();
        buf.extend_from_slice(&pts.to_le_bytes());
        buf
    }

    /// A packet carrying a single payload, padded to `packet_len`.
    fn single_packet(
        stream: u8,
        offset: u32,
        rep: &[u8],
        data: &[u8],
        packet_len: u16,
    ) -> Vec<u8> {
        let header_len = 12 + 7 + rep.len();
        let padding = packet_len as usize - header_len - data.len();

        let mut buf = parsing_info(SINGLE, packet_len, padding as u16, 500);
        buf.extend_from_slice(&payload_header(stream, 0, offset, rep));
        buf.extend_from_slice(data);
        buf.resize(packet_len as usize, 0);
        buf
    }

    /// A packet carrying multiple whole media objects.
    fn multiple_packet(payloads: &[(u8, &[u8])], packet_len: u16) -> Vec<u8> {
        let mut buf = parsing_info(MULTIPLE, packet_len, 0, 0);
        // Payload flags: payload length WORD.
        buf.push(0x80 | payloads.len() as u8);

        for (i, (stream, data)) in payloads.iter().enumerate() {
            buf.extend_from_slice(&payload_header(*stream, i as u8, 0, &[]));
            buf.extend_from_slice(&(data.len() as u16).to_le_bytes());
            buf.extend_from_slice(data);
        }

        buf.resize(packet_len as usize, 0);
        buf
    }

    #[test]
    fn verify_parsing_info() {
        let buf = parsing_info(SINGLE, 0, 12, 1234);
        let info = PayloadParsingInfo::read(&mut BufReader::new(&buf), 512).unwrap();

        assert_eq!(info.packet_length, 512);
        assert_eq!(info.padding_length, 12);
        assert_eq!(info.send_time, 1234);
        assert_eq!(info.duration, 100);
        assert_eq!(info.payload_count(), 1);

        // Padding longer than the packet.
        let buf = parsing_info(SINGLE, 10, 12, 0);
        assert!(PayloadParsingInfo::read(&mut BufReader::new(&buf), 512).is_err());
    }

    #[test]
    fn verify_parsing_info_skips_error_correction() {
        let mut buf = vec![0x82, 0x00, 0x00];
        buf.extend_from_slice(&parsing_info(SINGLE, 64, 0, 7));

        let mut reader = BufReader::new(&buf);
        let info = PayloadParsingInfo::read(&mut reader, 512).unwrap();

        assert_eq!(info.length_type_flags, SINGLE);
        assert_eq!(info.packet_length, 64);
        assert_eq!(info.send_time, 7);
        assert_eq!(reader.pos(), buf.len() as u64);
    }

    #[test]
    fn verify_single_payloads() {
        let mut buf = Vec::new();
        for i in 0..3u8 {
            buf.extend_from_slice(&single_packet(1, 0, &[], &[i; 10], 64));
        }

        let mut reader = BufReader::new(&buf);
        let mut demuxer = PacketDemuxer::new(1, 0, 0);

        for i in 0..3u8 {
            demuxer.read_packet(&mut reader, 64).unwrap();
            assert_eq!(reader.pos(), 64 * (u64::from(i) + 1));

            let object = demuxer.pop().unwrap();
            assert_eq!(object.data, vec![i; 10]);
            assert_eq!(object.pts, 500);
            assert_eq!(object.duration, 100);
            assert!(demuxer.pop().is_none());
        }

        // 10 bytes over 100 ms.
        assert_eq!(demuxer.instant_bit_rate(), 800);
    }

    #[test]
    fn verify_fragmented_media_object() {
        let mut buf = single_packet(1, 0, &replicated(12, 3600), &[1; 5], 64);
        buf.extend_from_slice(&single_packet(1, 5, &replicated(12, 3600), &[2; 7], 64));

        let mut reader = BufReader::new(&buf);
        let mut demuxer = PacketDemuxer::new(1, 3100, 0);

        demuxer.read_packet(&mut reader, 64).unwrap();
        assert!(demuxer.pop().is_none());

        demuxer.read_packet(&mut reader, 64).unwrap();

        let object = demuxer.pop().unwrap();
        assert_eq!(object.data, [[1u8; 5].as_ref(), [2u8; 7].as_ref()].concat());
        assert_eq!(object.pts, 500);
    }

    #[test]
    fn verify_offset_mismatch_is_fatal() {
        let buf = single_packet(1, 4, &replicated(12, 0), &[1; 8], 64);

        let mut demuxer = PacketDemuxer::new(1, 0, 0);
        assert!(matches!(
            demuxer.read_packet(&mut BufReader::new(&buf), 64),
            Err(Error::DecodeError(_))
        ));
        assert!(demuxer.pop().is_none());
    }

    #[test]
    fn verify_continuation_size_mismatch_is_fatal() {
        // The continuation declares a larger media object than the first fragment.
        let mut buf = single_packet(1, 0, &replicated(10, 0), &[1; 4], 64);
        buf.extend_from_slice(&single_packet(1, 4, &replicated(100, 0), &[2; 30], 64));

        let mut reader = BufReader::new(&buf);
        let mut demuxer = PacketDemuxer::new(1, 0, 0);

        demuxer.read_packet(&mut reader, 64).unwrap();
        assert!(demuxer.pop().is_none());

        assert!(matches!(demuxer.read_packet(&mut reader, 64), Err(Error::DecodeError(_))));
        assert!(demuxer.pop().is_none());
    }

    #[test]
    fn verify_overflowing_payload_is_fatal() {
        let buf = single_packet(1, 0, &replicated(4, 0), &[1; 8], 64);

        let mut demuxer = PacketDemuxer::new(1, 0, 0);
        assert!(demuxer.read_packet(&mut BufReader::new(&buf), 64).is_err());
    }

    #[test]
    fn verify_invalid_replicated_length_is_fatal() {
        let buf = single_packet(1, 0, &[0, 0, 0], &[1; 8], 64);

        let mut demuxer = PacketDemuxer::new(1, 0, 0);
        assert!(demuxer.read_packet(&mut BufReader::new(&buf), 64).is_err());
    }

    #[test]
    fn verify_oversized_media_object_is_limited() {
        let buf = single_packet(1, 0, &replicated(MAX_MEDIA_OBJECT_SIZE + 1, 0), &[1; 8], 64);

        let mut demuxer = PacketDemuxer::new(1, 0, 0);
        assert!(matches!(
            demuxer.read_packet(&mut BufReader::new(&buf), 64),
            Err(Error::LimitError(_))
        ));
    }

    #[test]
    fn verify_multiple_payloads_restore_play_order() {
        let buf = multiple_packet(&[(1, &[1; 4]), (2, &[9; 6]), (1, &[2; 3]), (1, &[3; 5])], 128);

        let mut reader = BufReader::new(&buf);
        let mut demuxer = PacketDemuxer::new(1, 0, 0);

        demuxer.read_packet(&mut reader, 128).unwrap();
        assert_eq!(reader.pos(), 128);

        assert_eq!(demuxer.pop().unwrap().data, vec![1; 4]);
        assert_eq!(demuxer.pop().unwrap().data, vec![2; 3]);
        assert_eq!(demuxer.pop().unwrap().data, vec![3; 5]);
        assert!(demuxer.pop().is_none());
    }

    #[test]
    fn verify_read_past_packet_end_is_fatal() {
        // The payload claims more data than the packet holds.
        let mut buf = multiple_packet(&[(1, &[1; 40])], 64);
        buf[2..4].copy_from_slice(&32u16.to_le_bytes());

        let mut demuxer = PacketDemuxer::new(1, 0, 0);
        assert!(demuxer.read_packet(&mut BufReader::new(&buf), 32).is_err());
    }

    #[test]
    fn verify_reset_discards_state() {
        let buf = single_packet(1, 0, &replicated(12, 0), &[1; 5], 64);

        let mut demuxer = PacketDemuxer::new(1, 0, 0);
        demuxer.read_packet(&mut BufReader::new(&buf), 64).unwrap();
        demuxer.reset();

        // A new object can begin at offset 0 after the reset.
        let buf = single_packet(1, 0, &[], &[4; 6], 64);
        demuxer.read_packet(&mut BufReader::new(&buf), 64).unwrap();
        assert_eq!(demuxer.pop().unwrap().data, vec![4; 6]);
    }

    #[test]
    fn verify_is_beginning_of_packet() {
        let demuxer = PacketDemuxer::new(1, 0, 0);

        let buf = single_packet(1, 0, &[], &[1; 8], 64);
        let mut reader = BufReader::new(&buf);
        let info = PayloadParsingInfo::read(&mut reader, 64).unwrap();
        assert!(demuxer.is_beginning_of_packet(&mut reader, &info).unwrap());

        let buf = single_packet(1, 4, &replicated(12, 0), &[1; 8], 64);
        let mut reader = BufReader::new(&buf);
        let info = PayloadParsingInfo::read(&mut reader, 64).unwrap();
        assert!(!demuxer.is_beginning_of_packet(&mut reader, &info).unwrap());

        // The payload of another stream is skipped to reach ours.
        let buf = multiple_packet(&[(2, &[9; 6]), (1, &[1; 4])], 64);
        let mut reader = BufReader::new(&buf);
        let info = PayloadParsingInfo::read(&mut reader, 64).unwrap();
        assert!(demuxer.is_beginning_of_packet(&mut reader, &info).unwrap());

        // No payload for the stream at all.
        let buf = single_packet(2, 0, &[], &[1; 8], 64);
        let mut reader = BufReader::new(&buf);
        let info = PayloadParsingInfo::read(&mut reader, 64).unwrap();
        assert!(!demuxer.is_beginning_of_packet(&mut reader, &info).unwrap());
    }
}
