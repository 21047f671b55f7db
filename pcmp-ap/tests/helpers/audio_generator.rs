//! Audio test file generation
//!
//! Writes deterministic WAV files so the symphonia-backed pipeline can be
//! exercised without shipping binary fixtures.

use hound::{WavSpec, WavWriter};
use std::f32::consts::PI;
use std::path::Path;

/// Standard test sample rate (44.1 kHz)
pub const TEST_SAMPLE_RATE: u32 = 44100;

/// Generate a stereo 16-bit sine WAV file
///
/// # Arguments
/// * `path` - Output file path
/// * `duration_ms` - Duration in milliseconds
/// * `frequency_hz` - Sine frequency (440.0 for A4)
/// * `amplitude` - 0.0-1.0
pub fn generate_sine_wav<P: AsRef<Path>>(
    path: P,
    duration_ms: u64,
    frequency_hz: f32,
    amplitude: f32,
) -> Result<(), hound::Error> {
    let spec = WavSpec {
        channels: 2,
        sample_rate: TEST_SAMPLE_RATE,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut writer = WavWriter::create(path, spec)?;
    let total_frames = frame_count(duration_ms);

    for n in 0..total_frames {
        let t = n as f32 / TEST_SAMPLE_RATE as f32;
        let value = (2.0 * PI * frequency_hz * t).sin() * amplitude;
        let sample = (value * i16::MAX as f32) as i16;
        writer.write_sample(sample)?;
        writer.write_sample(sample)?;
    }

    writer.finalize()?;
    Ok(())
}

/// Generate a mono 16-bit silent WAV file at `sample_rate`
pub fn generate_silent_mono_wav<P: AsRef<Path>>(
    path: P,
    duration_ms: u64,
    sample_rate: u32,
) -> Result<(), hound::Error> {
    let spec = WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut writer = WavWriter::create(path, spec)?;
    for _ in 0..(sample_rate as u64 * duration_ms) / 1000 {
        writer.write_sample(0i16)?;
    }
    writer.finalize()?;
    Ok(())
}

/// Stereo frames in `duration_ms` at the test rate
pub fn frame_count(duration_ms: u64) -> u64 {
    (TEST_SAMPLE_RATE as u64 * duration_ms) / 1000
}
