//! Sink role and sink selection

use crate::config::SinkSettings;
use crate::error::{Error, Result};
use crate::media::TrackFormat;
use serde::{Deserialize, Serialize};

/// Renders PCM to an output device.
///
/// A sink may be configured again after `release()`; track changes reuse
/// the instance so a sink chosen at runtime survives them.
pub trait Sink: Send {
    /// Open the device for `format` (raw PCM) and start accepting writes.
    fn configure(&mut self, format: &TrackFormat) -> Result<()>;

    /// Write PCM bytes, blocking until the device accepted all of them.
    /// Returns the number of bytes written.
    fn write(&mut self, pcm: &[u8]) -> Result<usize>;

    /// Drop audio that was written but not yet played.
    fn flush(&mut self) -> Result<()>;

    /// Block until audio already written has been played out.
    ///
    /// Sinks that cannot observe their device queue return immediately.
    fn drain(&mut self) -> Result<()> {
        Ok(())
    }

    /// Stop and close the device. Idempotent.
    fn release(&mut self);

    /// Short name for logs and status reports
    fn name(&self) -> &str;
}

/// Available sink implementations
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum SinkKind {
    /// Platform PCM output through cpal
    #[default]
    Cpal,
    /// Native low-latency backend over the C ABI
    Native,
}

impl std::fmt::Display for SinkKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SinkKind::Cpal => write!(f, "cpal"),
            SinkKind::Native => write!(f, "native"),
        }
    }
}

impl std::str::FromStr for SinkKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "cpal" => Ok(SinkKind::Cpal),
            "native" => Ok(SinkKind::Native),
            other => Err(Error::BadRequest(format!("unknown sink kind '{}'", other))),
        }
    }
}

/// Build an unconfigured sink of `kind`
pub fn create_sink(kind: SinkKind, settings: &SinkSettings) -> Box<dyn Sink> {
    match kind {
        SinkKind::Cpal => Box::new(super::CpalSink::new(
            settings.device.clone(),
            settings.buffer_ms,
        )),
        SinkKind::Native => Box::new(super::NativeSink::with_default_backend(settings.buffer_ms)),
    }
}
