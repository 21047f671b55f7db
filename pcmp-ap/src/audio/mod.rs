//! PCM output side of the pipeline
//!
//! The `Sink` role and its two implementations: a cpal-driven platform
//! device and a native backend reached over a C ABI.

pub mod native;
pub mod output;
pub mod pcm;
pub mod resampler;
pub mod ring_buffer;
pub mod sink;

pub use native::NativeSink;
pub use output::CpalSink;
pub use sink::{create_sink, Sink, SinkKind};
