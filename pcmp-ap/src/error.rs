//! Error types for pcmp-ap
//!
//! Defines module-specific error types using thiserror for clear error propagation.

use thiserror::Error;

/// Main error type for pcmp-ap
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration file loading or validation errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// No container track matched the requested codec-family prefix
    #[error("No track matching codec prefix '{prefix}'")]
    NoMatchingTrack { prefix: String },

    /// Container tracks exist but none carries a codec identifier
    #[error("Missing codec identifier: {0}")]
    MissingCodecId(String),

    /// No decoder is registered for the selected codec
    #[error("Unsupported codec: {0}")]
    UnsupportedCodec(String),

    /// Container read or seek errors
    #[error("Demux error: {0}")]
    Demux(String),

    /// Audio decoding errors
    #[error("Audio decode error: {0}")]
    Decode(String),

    /// Audio output device errors
    #[error("Audio output error: {0}")]
    AudioOutput(String),

    /// Drain phase produced no output for too many consecutive iterations
    #[error("Decoder stalled: no output after {iterations} iterations")]
    DecoderStall { iterations: u32 },

    /// Invalid state for operation
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Malformed request from a control client
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// HTTP server errors
    #[error("HTTP server error: {0}")]
    Http(String),

    /// File I/O errors
    #[error("File I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Errors from shared pcmp-common helpers
    #[error(transparent)]
    Common(#[from] pcmp_common::Error),

    /// Internal errors (bugs, poisoned state)
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Convenience Result type using our Error
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// True for failures raised while opening or configuring a track
    pub fn is_configuration_failure(&self) -> bool {
        matches!(
            self,
            Error::Config(_)
                | Error::NoMatchingTrack { .. }
                | Error::MissingCodecId(_)
                | Error::UnsupportedCodec(_)
        )
    }
}
