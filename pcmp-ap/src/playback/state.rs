//! Lock-free position and duration shared between the pump and readers

use pcmp_common::time::format_position;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

/// Shared playback clock.
///
/// The pump is the only writer of `position`; any thread may read it. The
/// controller writes `duration` when a track is prepared.
#[derive(Debug, Clone, Default)]
pub struct PlaybackClock {
    inner: Arc<ClockInner>,
}

#[derive(Debug, Default)]
struct ClockInner {
    position_micros: AtomicI64,
    duration_micros: AtomicI64,
}

impl PlaybackClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn position_micros(&self) -> i64 {
        self.inner.position_micros.load(Ordering::Acquire)
    }

    pub fn set_position_micros(&self, micros: i64) {
        self.inner.position_micros.store(micros, Ordering::Release);
    }

    pub fn duration_micros(&self) -> i64 {
        self.inner.duration_micros.load(Ordering::Acquire)
    }

    pub fn set_duration_micros(&self, micros: i64) {
        self.inner.duration_micros.store(micros, Ordering::Release);
    }
}

impl std::fmt::Display for PlaybackClock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} / {}",
            format_position(self.position_micros()),
            format_position(self.duration_micros())
        )
    }
}
