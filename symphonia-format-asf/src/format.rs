// Symphonia
// Copyright (c) 2019-2022 The Project Symphonia Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::fmt;

use symphonia_core::audio::Channels;
use symphonia_core::codecs::{CodecParameters, CodecType};
use symphonia_core::codecs::{
    CODEC_TYPE_AAC, CODEC_TYPE_ADPCM_IMA_WAV, CODEC_TYPE_ADPCM_MS, CODEC_TYPE_MP2, CODEC_TYPE_MP3,
    CODEC_TYPE_PCM_ALAW, CODEC_TYPE_PCM_F32LE, CODEC_TYPE_PCM_F64LE, CODEC_TYPE_PCM_MULAW,
    CODEC_TYPE_PCM_S16LE, CODEC_TYPE_PCM_S24LE, CODEC_TYPE_PCM_S32LE, CODEC_TYPE_PCM_U8,
    CODEC_TYPE_WMA,
};
use symphonia_core::errors::{decode_error, unsupported_error, Error, Result};
use symphonia_core::io::{BufReader, FiniteStream, ReadBytes};
use symphonia_core::units::TimeBase;

use log::info;

// The definition of these format identifiers can be found in mmreg.h of the Microsoft Windows
// Platform SDK.
const WAVE_FORMAT_PCM: u16 = 0x0001;
const WAVE_FORMAT_ADPCM: u16 = 0x0002;
const WAVE_FORMAT_IEEE_FLOAT: u16 = 0x0003;
const WAVE_FORMAT_ALAW: u16 = 0x0006;
const WAVE_FORMAT_MULAW: u16 = 0x0007;
const WAVE_FORMAT_ADPCM_IMA: u16 = 0x0011;
const WAVE_FORMAT_MPEG: u16 = 0x0050;
const WAVE_FORMAT_MPEGLAYER3: u16 = 0x0055;
const WAVE_FORMAT_RAW_AAC1: u16 = 0x00ff;
const WAVE_FORMAT_WMAUDIO1: u16 = 0x0160;
const WAVE_FORMAT_WMAUDIO2: u16 = 0x0161;
const WAVE_FORMAT_WMAUDIO3: u16 = 0x0162;
const WAVE_FORMAT_WMAUDIO_LOSSLESS: u16 = 0x0163;
const WAVE_FORMAT_MPEG_HEAAC: u16 = 0x1610;
const WAVE_FORMAT_EXTENSIBLE: u16 = 0xfffe;

/// The KSDATAFORMAT sub-format GUIDs share this tail, the leading 16-bit value is the format tag.
#[rustfmt::skip]
const KSDATAFORMAT_SUBTYPE_TAIL: [u8; 14] = [
    0x00, 0x00, 0x00, 0x00, 0x10, 0x00, 0x80, 0x00, 0x00, 0xaa, 0x00, 0x38, 0x9b, 0x71,
];

fn try_channel_count_to_mask(count: u16) -> Result<Channels> {
    (1..=32)
        .contains(&count)
        .then(|| Channels::from_bits(((1u64 << count) - 1) as u32))
        .flatten()
        .ok_or(Error::DecodeError("asf: invalid channel count"))
}

/// The audio format of a stream, read from the `WAVEFORMATEX` structure stored as the
/// type-specific data of an audio stream.
#[derive(Clone, Debug)]
pub struct WaveFormat {
    /// The format tag. For the extensible format this is the tag of the sub-format.
    pub format_tag: u16,
    pub codec: CodecType,
    pub n_channels: u16,
    pub channels: Channels,
    pub sample_rate: u32,
    pub avg_bytes_per_sec: u32,
    pub block_align: u16,
    pub bits_per_sample: u16,
    /// Codec specific data following the structure.
    pub extra_data: Box<[u8]>,
}

impl WaveFormat {
    /// Read the format from the type-specific data of a stream. Returns an unsupported error if
    /// the format cannot be mapped to a codec.
    pub fn read(ts_data: &[u8]) -> Result<WaveFormat> {
        if ts_data.len() < 16 {
            return decode_error("asf: malformed audio format");
        }

        let mut reader = BufReader::new(ts_data);

        let mut format_tag = reader.read_u16()?;
        let n_channels = reader.read_u16()?;
        let sample_rate = reader.read_u32()?;
        let avg_bytes_per_sec = reader.read_u32()?;
        let block_align = reader.read_u16()?;
        let bits_per_sample = reader.read_u16()?;

        if sample_rate == 0 {
            return decode_error("asf: audio format sample rate is 0");
        }

        // The extra data size field is optional for a plain WAVEFORMAT.
        let extra_data: Box<[u8]> = if reader.bytes_available() >= 2 {
            let extra_size = usize::from(reader.read_u16()?);
            let available = reader.bytes_available() as usize;

            if extra_size > available {
                info!("asf: audio format extra data truncated ({} > {})", extra_size, available);
            }

            Box::from(reader.read_buf_bytes_ref(extra_size.min(available))?)
        }
        else {
            Box::default()
        };

        let mut channels = try_channel_count_to_mask(n_channels)?;

        if format_tag == WAVE_FORMAT_EXTENSIBLE {
            if extra_data.len() < 22 {
                return decode_error("asf: malformed extensible audio format");
            }

            let mut ext = BufReader::new(&extra_data);

            let _valid_bits_per_sample = ext.read_u16()?;
            let channel_mask = ext.read_u32()?;
            let sub_format = ext.read_buf_bytes_ref(16)?;

            if sub_format[2..] != KSDATAFORMAT_SUBTYPE_TAIL {
                return unsupported_error("asf: unsupported extensible sub-format");
            }

            format_tag = u16::from_le_bytes([sub_format[0], sub_format[1]]);

            // Prefer the channel mask, if it is consistent with the channel count.
            if channel_mask.count_ones() == u32::from(n_channels) {
                if let Some(mask) = Channels::from_bits(channel_mask) {
                    channels = mask;
                }
            }
        }

        let codec = match format_tag {
            WAVE_FORMAT_PCM => match bits_per_sample {
                8 => CODEC_TYPE_PCM_U8,
                16 => CODEC_TYPE_PCM_S16LE,
                24 => CODEC_TYPE_PCM_S24LE,
                32 => CODEC_TYPE_PCM_S32LE,
                _ => return decode_error("asf: bits per sample for pcm must be 8, 16, 24 or 32"),
            },
            WAVE_FORMAT_IEEE_FLOAT => match bits_per_sample {
                32 => CODEC_TYPE_PCM_F32LE,
                64 => CODEC_TYPE_PCM_F64LE,
                _ => return decode_error("asf: bits per sample for float must be 32 or 64"),
            },
            WAVE_FORMAT_ALAW => CODEC_TYPE_PCM_ALAW,
            WAVE_FORMAT_MULAW => CODEC_TYPE_PCM_MULAW,
            WAVE_FORMAT_ADPCM => CODEC_TYPE_ADPCM_MS,
            WAVE_FORMAT_ADPCM_IMA => CODEC_TYPE_ADPCM_IMA_WAV,
            WAVE_FORMAT_MPEG => CODEC_TYPE_MP2,
            WAVE_FORMAT_MPEGLAYER3 => CODEC_TYPE_MP3,
            WAVE_FORMAT_RAW_AAC1 | WAVE_FORMAT_MPEG_HEAAC => CODEC_TYPE_AAC,
            WAVE_FORMAT_WMAUDIO1 | WAVE_FORMAT_WMAUDIO2 => CODEC_TYPE_WMA,
            WAVE_FORMAT_WMAUDIO3 => return unsupported_error("asf: wma pro is not supported"),
            WAVE_FORMAT_WMAUDIO_LOSSLESS => {
                return unsupported_error("asf: wma lossless is not supported")
            }
            _ => return unsupported_error("asf: unsupported audio format"),
        };

        Ok(WaveFormat {
            format_tag,
            codec,
            n_channels,
            channels,
            sample_rate,
            avg_bytes_per_sec,
            block_align,
            bits_per_sample,
            extra_data,
        })
    }

    /// The bit rate of the format in bits per second, or 0 if unknown.
    pub fn bit_rate(&self) -> u32 {
        self.avg_bytes_per_sec.saturating_mul(8)
    }

    fn frames_per_block(&self) -> Option<u64> {
        let block_align = u64::from(self.block_align);
        let n_channels = u64::from(self.n_channels);
        let bits = u64::from(self.bits_per_sample);

        if bits == 0 {
            return None;
        }

        match self.codec {
            CODEC_TYPE_ADPCM_MS if block_align > 7 * n_channels => {
                Some(((block_align - 7 * n_channels) * 8) / (bits * n_channels) + 2)
            }
            CODEC_TYPE_ADPCM_IMA_WAV if block_align > 4 * n_channels => {
                Some(((block_align - 4 * n_channels) * 8) / (bits * n_channels) + 1)
            }
            _ => None,
        }
    }

    /// Build the codec parameters describing this format.
    pub fn codec_params(&self) -> CodecParameters {
        let mut params = CodecParameters::new();

        params
            .for_codec(self.codec)
            .with_sample_rate(self.sample_rate)
            .with_time_base(TimeBase::new(1, self.sample_rate))
            .with_channels(self.channels);

        if self.bits_per_sample != 0 {
            params.with_bits_per_coded_sample(u32::from(self.bits_per_sample));
        }

        match self.codec {
            CODEC_TYPE_PCM_U8 | CODEC_TYPE_PCM_S16LE | CODEC_TYPE_PCM_S24LE
            | CODEC_TYPE_PCM_S32LE => {
                params.with_bits_per_sample(u32::from(self.bits_per_sample));
            }
            _ => (),
        }

        if let Some(frames_per_block) = self.frames_per_block() {
            params.with_frames_per_block(frames_per_block);
        }

        if !self.extra_data.is_empty() {
            params.with_extra_data(self.extra_data.clone());
        }

        params
    }
}

impl fmt::Display for WaveFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "WaveFormat {{")?;
        writeln!(f, "\tformat_tag: {:#06x},", self.format_tag)?;
        writeln!(f, "\tcodec: {},", self.codec)?;
        writeln!(f, "\tchannels: {},", self.channels)?;
        writeln!(f, "\tsample_rate: {} Hz,", self.sample_rate)?;
        writeln!(f, "\tavg_bytes_per_sec: {},", self.avg_bytes_per_sec)?;
        writeln!(f, "\tblock_align: {},", self.block_align)?;
        writeln!(f, "\tbits_per_sample: {},", self.bits_per_sample)?;
        writeln!(f, "\textra_data: {} bytes,", self.extra_data.len())?;
        writeln!(f, "}}")
    }
}

#[cfg(test)]
mod tests {
    use symphonia_core::audio::Channels;
    use symphonia_core::codecs::{CODEC_TYPE_PCM_S16LE, CODEC_TYPE_PCM_S24LE, CODEC_TYPE_WMA};

    use super::WaveFormat;

    fn wave_format_ex(tag: u16, channels: u16, rate: u32, bits: u16, extra: &[u8]) -> Vec<u8> {
        let block_align = channels * bits / 8;
        let mut buf = Vec::new();
        buf.extend_from_slice(&tag.to_le_bytes());
        buf.extend_from_slice(&channels.to_le_bytes());
        buf.extend_from_slice(&rate.to_le_bytes());
        buf.extend_from_slice(&(rate * u32::from(block_align)).to_le_bytes());
        buf.extend_from_slice(&block_align.to_le_bytes());
        buf.extend_from_slice(&bits.to_le_bytes());
        buf.extend_from_slice(&(extra.len() as u16).to_le_bytes());
        buf.extend_from_slice(extra);
        buf
    }

    #[test]
    fn verify_wma_format() {
        let extra = [0x00, 0x88, 0x00, 0x00, 0x1f, 0x00, 0x00, 0x00, 0x00, 0x00];
        let mut buf = wave_format_ex(0x0161, 2, 44100, 16, &extra);
        // Patch average bytes per second, 128 kbit/s.
        buf[8..12].copy_from_slice(&16000u32.to_le_bytes());

        let format = WaveFormat::read(&buf).unwrap();
        assert_eq!(format.codec, CODEC_TYPE_WMA);
        assert_eq!(format.bit_rate(), 128_000);
        assert_eq!(format.channels, Channels::FRONT_LEFT | Channels::FRONT_RIGHT);
        assert_eq!(&format.extra_data[..], &extra);

        let params = format.codec_params();
        assert_eq!(params.codec, CODEC_TYPE_WMA);
        assert_eq!(params.sample_rate, Some(44100));
        assert_eq!(params.extra_data.as_deref(), Some(&extra[..]));
    }

    #[test]
    fn verify_pcm_format() {
        let format = WaveFormat::read(&wave_format_ex(0x0001, 1, 8000, 16, &[])).unwrap();
        assert_eq!(format.codec, CODEC_TYPE_PCM_S16LE);
        assert_eq!(format.codec_params().bits_per_sample, Some(16));

        assert!(WaveFormat::read(&wave_format_ex(0x0001, 1, 8000, 12, &[])).is_err());
        assert!(WaveFormat::read(&wave_format_ex(0x0001, 0, 8000, 16, &[])).is_err());
        assert!(WaveFormat::read(&wave_format_ex(0x0001, 1, 0, 16, &[])).is_err());
    }

    #[test]
    fn verify_extensible_format() {
        let mut extra = Vec::new();
        extra.extend_from_slice(&24u16.to_le_bytes());
        extra.extend_from_slice(&0x3fu32.to_le_bytes());
        extra.extend_from_slice(&[
            0x01, 0x00, 0x00, 0x00, 0x00, 0x00, 0x10, 0x00, 0x80, 0x00, 0x00, 0xaa, 0x00, 0x38,
            0x9b, 0x71,
        ]);

        let format = WaveFormat::read(&wave_format_ex(0xfffe, 6, 48000, 24, &extra)).unwrap();
        assert_eq!(format.format_tag, 0x0001);
        assert_eq!(format.codec, CODEC_TYPE_PCM_S24LE);
        assert_eq!(format.channels.count(), 6);
    }

    #[test]
    fn verify_unsupported_formats() {
        assert!(WaveFormat::read(&wave_format_ex(0x0162, 2, 44100, 24, &[])).is_err());
        assert!(WaveFormat::read(&wave_format_ex(0x1234, 2, 44100, 16, &[])).is_err());
        assert!(WaveFormat::read(&[0x61, 0x01, 0x02, 0x00]).is_err());
    }
}
