//! Demuxer role: sequential access to one track's compressed samples

use super::format::{ExtractionResult, TrackFormat};
use super::source::SourceDescriptor;
use crate::error::Result;

/// Reads compressed samples of one selected track from a container.
pub trait Demuxer: Send {
    /// Open `source` and select the first track whose codec identifier
    /// starts with `mime_prefix`.
    ///
    /// Fails with `Error::NoMatchingTrack` when no track matches.
    fn configure(&mut self, source: SourceDescriptor, mime_prefix: &str) -> Result<TrackFormat>;

    /// Copy the next compressed sample into `destination` at offset 0.
    ///
    /// Returns a negative sample size at end of stream without moving the
    /// read cursor; otherwise the cursor advances past the returned sample.
    fn extract(&mut self, destination: &mut [u8]) -> Result<ExtractionResult>;

    /// Move the read cursor to the closest sync point at or before
    /// `position_micros`. Out-of-range targets are clamped.
    fn seek_to(&mut self, position_micros: i64) -> Result<()>;

    /// Drop the container. Idempotent; the instance is unusable afterwards.
    fn release(&mut self);
}
