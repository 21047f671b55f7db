//! Track descriptors and extraction results

use pcmp_common::time::frames_to_micros;
use serde::{Deserialize, Serialize};
use symphonia::core::codecs::CodecParameters;

/// Codec identifier of linear PCM
pub const RAW_AUDIO_CODEC_ID: &str = "audio/raw";

/// Linear PCM sample encoding (little-endian, interleaved)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PcmEncoding {
    /// 8-bit unsigned
    #[serde(rename = "pcm8")]
    Pcm8,
    /// 16-bit signed
    #[default]
    #[serde(rename = "pcm16")]
    Pcm16,
    /// 24-bit signed, packed in 3 bytes
    #[serde(rename = "pcm24")]
    Pcm24Packed,
    /// 32-bit signed
    #[serde(rename = "pcm32")]
    Pcm32,
    /// 32-bit IEEE float
    #[serde(rename = "float")]
    Float,
}

impl PcmEncoding {
    pub fn bytes_per_sample(self) -> usize {
        match self {
            PcmEncoding::Pcm8 => 1,
            PcmEncoding::Pcm16 => 2,
            PcmEncoding::Pcm24Packed => 3,
            PcmEncoding::Pcm32 | PcmEncoding::Float => 4,
        }
    }

    pub fn bit_depth(self) -> u32 {
        self.bytes_per_sample() as u32 * 8
    }

    pub fn is_float(self) -> bool {
        matches!(self, PcmEncoding::Float)
    }
}

impl std::fmt::Display for PcmEncoding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            PcmEncoding::Pcm8 => "pcm8",
            PcmEncoding::Pcm16 => "pcm16",
            PcmEncoding::Pcm24Packed => "pcm24",
            PcmEncoding::Pcm32 => "pcm32",
            PcmEncoding::Float => "float",
        };
        f.write_str(name)
    }
}

/// Immutable description of one track, produced by `Demuxer::configure`
/// and refined by `Decoder::configure`.
///
/// `codec_parameters` carries codec-private setup data from the container
/// (extra data, frame sizes); it is `None` for decoded PCM formats and for
/// formats built by hand.
#[derive(Debug, Clone)]
pub struct TrackFormat {
    pub codec_id: String,
    pub sample_rate_hz: u32,
    pub channel_count: u16,
    pub duration_micros: i64,
    pub pcm_encoding: PcmEncoding,
    pub codec_parameters: Option<CodecParameters>,
}

impl TrackFormat {
    /// Linear PCM format, as emitted by a decoder
    pub fn raw(sample_rate_hz: u32, channel_count: u16, encoding: PcmEncoding) -> Self {
        Self {
            codec_id: RAW_AUDIO_CODEC_ID.to_string(),
            sample_rate_hz,
            channel_count,
            duration_micros: 0,
            pcm_encoding: encoding,
            codec_parameters: None,
        }
    }

    pub fn with_duration(mut self, duration_micros: i64) -> Self {
        self.duration_micros = duration_micros;
        self
    }

    pub fn is_raw(&self) -> bool {
        self.codec_id == RAW_AUDIO_CODEC_ID
    }

    /// Bytes in one interleaved frame (one sample per channel)
    pub fn bytes_per_frame(&self) -> usize {
        self.pcm_encoding.bytes_per_sample() * self.channel_count.max(1) as usize
    }

    /// Playback duration of `bytes` of PCM in this format
    pub fn bytes_to_micros(&self, bytes: usize) -> i64 {
        frames_to_micros((bytes / self.bytes_per_frame()) as u64, self.sample_rate_hz)
    }

    /// True when rate, channels and encoding match (what a sink cares about)
    pub fn same_pcm_layout(&self, other: &TrackFormat) -> bool {
        self.sample_rate_hz == other.sample_rate_hz
            && self.channel_count == other.channel_count
            && self.pcm_encoding == other.pcm_encoding
    }
}

/// Outcome of one `Demuxer::extract` call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExtractionResult {
    /// Bytes written at offset 0; negative once the compressed stream is exhausted
    pub sample_size: i32,
    pub presentation_time_micros: i64,
}

impl ExtractionResult {
    pub fn sample(sample_size: usize, presentation_time_micros: i64) -> Self {
        Self {
            sample_size: i32::try_from(sample_size).unwrap_or(i32::MAX),
            presentation_time_micros,
        }
    }

    pub fn end_of_stream() -> Self {
        Self {
            sample_size: -1,
            presentation_time_micros: 0,
        }
    }

    pub fn is_end_of_stream(&self) -> bool {
        self.sample_size < 0
    }
}
