//! PCM byte handling shared by the sinks

use crate::media::{PcmEncoding, TrackFormat};
use pcmp_common::time::micros_to_frames;

/// Output buffer size for `format`: `buffer_ms` worth of frames, at least one frame
pub fn min_buffer_bytes(format: &TrackFormat, buffer_ms: u32) -> usize {
    let frames = micros_to_frames(buffer_ms as i64 * 1_000, format.sample_rate_hz).max(1);
    frames as usize * format.bytes_per_frame()
}

/// Append `bytes` as f32 samples in [-1.0, 1.0].
///
/// Only whole samples are converted; returns the number of bytes consumed.
pub fn decode_to_f32(bytes: &[u8], encoding: PcmEncoding, out: &mut Vec<f32>) -> usize {
    let width = encoding.bytes_per_sample();
    let whole = bytes.len() / width * width;
    out.reserve(whole / width);

    for chunk in bytes[..whole].chunks_exact(width) {
        let sample = match encoding {
            PcmEncoding::Pcm8 => (chunk[0] as f32 - 128.0) / 128.0,
            PcmEncoding::Pcm16 => i16::from_le_bytes([chunk[0], chunk[1]]) as f32 / 32768.0,
            PcmEncoding::Pcm24Packed => {
                // Sign-extend by placing the 24 bits in the top of an i32
                let value = i32::from_le_bytes([0, chunk[0], chunk[1], chunk[2]]) >> 8;
                value as f32 / 8_388_608.0
            }
            PcmEncoding::Pcm32 => {
                i32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]) as f32
                    / 2_147_483_648.0
            }
            PcmEncoding::Float => f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]),
        };
        out.push(sample);
    }
    whole
}

/// Append `input` (interleaved, `from` channels) re-laid out to `to` channels.
///
/// Mono is duplicated into every output channel, downmix to mono averages,
/// other mismatches keep the shared leading channels and zero the rest.
pub fn remap_channels(input: &[f32], from: u16, to: u16, out: &mut Vec<f32>) {
    let (from, to) = (from.max(1) as usize, to.max(1) as usize);
    if from == to {
        out.extend_from_slice(input);
        return;
    }

    out.reserve(input.len() / from * to);
    for frame in input.chunks_exact(from) {
        if from == 1 {
            out.extend(std::iter::repeat(frame[0]).take(to));
        } else if to == 1 {
            out.push(frame.iter().sum::<f32>() / from as f32);
        } else {
            for ch in 0..to {
                out.push(frame.get(ch).copied().unwrap_or(0.0));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_min_buffer_bytes() {
        let format = TrackFormat::raw(44_100, 2, PcmEncoding::Pcm16);
        // 100 ms = 4410 frames * 4 bytes
        assert_eq!(min_buffer_bytes(&format, 100), 17_640);

        let tiny = TrackFormat::raw(1, 1, PcmEncoding::Pcm8);
        assert_eq!(min_buffer_bytes(&tiny, 10), 1);
    }

    #[test]
    fn test_decode_pcm16() {
        let bytes = [0x00, 0x80, 0xFF, 0x7F, 0x00, 0x00, 0x01];
        let mut out = Vec::new();
        let consumed = decode_to_f32(&bytes, PcmEncoding::Pcm16, &mut out);
        assert_eq!(consumed, 6);
        assert_eq!(out[0], -1.0);
        assert!((out[1] - 0.99997).abs() < 1e-4);
        assert_eq!(out[2], 0.0);
    }

    #[test]
    fn test_decode_pcm24_sign_extension() {
        // -1 in 24-bit two's complement
        let mut out = Vec::new();
        decode_to_f32(&[0xFF, 0xFF, 0xFF], PcmEncoding::Pcm24Packed, &mut out);
        assert!((out[0] + 1.0 / 8_388_608.0).abs() < 1e-9);
    }

    #[test]
    fn test_decode_pcm8_and_float() {
        let mut out = Vec::new();
        decode_to_f32(&[128, 0], PcmEncoding::Pcm8, &mut out);
        assert_eq!(out, vec![0.0, -1.0]);

        out.clear();
        decode_to_f32(&0.25f32.to_le_bytes(), PcmEncoding::Float, &mut out);
        assert_eq!(out, vec![0.25]);
    }

    #[test]
    fn test_remap_mono_to_stereo() {
        let mut out = Vec::new();
        remap_channels(&[0.1, 0.2], 1, 2, &mut out);
        assert_eq!(out, vec![0.1, 0.1, 0.2, 0.2]);
    }

    #[test]
    fn test_remap_stereo_to_mono_and_surround() {
        let mut out = Vec::new();
        remap_channels(&[0.2, 0.4], 2, 1, &mut out);
        assert!((out[0] - 0.3).abs() < 1e-6);

        out.clear();
        remap_channels(&[0.1, 0.2, 0.3, 0.4, 0.5, 0.6], 6, 2, &mut out);
        assert_eq!(out, vec![0.1, 0.2]);

        out.clear();
        remap_channels(&[0.1, 0.2], 2, 4, &mut out);
        assert_eq!(out, vec![0.1, 0.2, 0.0, 0.0]);
    }
}
