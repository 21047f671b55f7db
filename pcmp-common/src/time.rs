//! Timestamp and media-time utilities
//!
//! Media positions are carried as signed microseconds throughout pcmp, the
//! unit container timestamps are normalized to.

use chrono::{DateTime, Utc};

/// Microseconds per second
pub const MICROS_PER_SECOND: i64 = 1_000_000;

/// Get current UTC timestamp
pub fn now() -> DateTime<Utc> {
    Utc::now()
}

/// Convert milliseconds to microseconds, saturating on overflow
pub fn millis_to_micros(millis: i64) -> i64 {
    millis.saturating_mul(1_000)
}

/// Convert microseconds to whole milliseconds (truncating)
pub fn micros_to_millis(micros: i64) -> i64 {
    micros / 1_000
}

/// Duration of `frames` sample frames at `sample_rate` Hz, in microseconds
pub fn frames_to_micros(frames: u64, sample_rate: u32) -> i64 {
    if sample_rate == 0 {
        return 0;
    }
    ((frames as u128 * MICROS_PER_SECOND as u128) / sample_rate as u128) as i64
}

/// Number of whole sample frames covering `micros` at `sample_rate` Hz
pub fn micros_to_frames(micros: i64, sample_rate: u32) -> u64 {
    if micros <= 0 {
        return 0;
    }
    ((micros as u128 * sample_rate as u128) / MICROS_PER_SECOND as u128) as u64
}

/// Format a position as `M:SS.s` for logs and status lines
pub fn format_position(micros: i64) -> String {
    let sign = if micros < 0 { "-" } else { "" };
    let tenths = micros.unsigned_abs() / 100_000;
    let minutes = tenths / 600;
    let seconds = (tenths / 10) % 60;
    format!("{}{}:{:02}.{}", sign, minutes, seconds, tenths % 10)
}
