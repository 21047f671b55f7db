//! Decoder role: an index-based buffer exchange with a codec session

use super::buffer::{DequeuedOutput, InputBuffer, OutputBuffer};
use super::format::{PcmEncoding, TrackFormat};
use crate::config::PipelineSettings;
use crate::error::Result;

/// Stateful codec session.
///
/// Lifecycle: Configured → Running → (Flushed ↔ Running) → Released.
/// Buffer acquisition must not block longer than the pipeline's dequeue
/// timeout; running out of slots is reported as `None` / `TryAgainLater`.
pub trait Decoder: Send {
    /// Start a session for `format`; returns the decoded output format,
    /// which may differ from the container's nominal one.
    fn configure(&mut self, format: &TrackFormat) -> Result<TrackFormat>;

    /// Borrow an empty input slot, if one is free.
    fn acquire_input_buffer(&mut self) -> Result<Option<InputBuffer>>;

    /// Queue `size` bytes at `offset` of `buffer` for decoding.
    ///
    /// Compressed-stream exhaustion is signalled by `size == 0` with
    /// `end_of_stream == true`.
    fn submit_input_buffer(
        &mut self,
        buffer: InputBuffer,
        offset: usize,
        size: usize,
        presentation_time_micros: i64,
        end_of_stream: bool,
    ) -> Result<()>;

    /// Take the next decoded buffer, or learn why there is none.
    fn acquire_output_buffer(&mut self) -> Result<DequeuedOutput>;

    /// Return an output slot. `render` asks the codec to present the buffer
    /// itself; callers writing PCM to a sink pass `false`.
    fn release_output_buffer(&mut self, buffer: OutputBuffer, render: bool) -> Result<()>;

    /// Discard everything in flight. No acquired token may be outstanding.
    fn flush(&mut self) -> Result<()>;

    /// End the session. Idempotent.
    fn release(&mut self);
}

/// Slot pool and output settings for a decoder session
#[derive(Debug, Clone)]
pub struct DecoderSettings {
    pub input_buffer_count: usize,
    pub input_buffer_capacity: usize,
    pub output_buffer_count: usize,
    pub output_encoding: PcmEncoding,
}

impl From<&PipelineSettings> for DecoderSettings {
    fn from(settings: &PipelineSettings) -> Self {
        Self {
            input_buffer_count: settings.input_buffer_count,
            input_buffer_capacity: settings.input_buffer_capacity,
            output_buffer_count: settings.output_buffer_count,
            output_encoding: settings.output_encoding,
        }
    }
}

impl Default for DecoderSettings {
    fn default() -> Self {
        Self::from(&PipelineSettings::default())
    }
}
