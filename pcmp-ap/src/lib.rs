//! # pcmp Audio Player Library (pcmp-ap)
//!
//! Decode-and-playback pump with a play/pause/seek control surface.
//!
//! **Purpose:** Pull compressed samples from a container, decode them to
//! linear PCM and push the PCM to an output sink, on a background worker
//! driven by a thread-safe controller and an HTTP/SSE control interface.
//!
//! **Architecture:** symphonia (demux + decode) → pump worker → sink
//! (cpal, or a native backend over a C ABI)

pub mod api;
pub mod audio;
pub mod config;
pub mod error;
pub mod ffi;
pub mod media;
pub mod playback;

pub use error::{Error, Result};
pub use playback::PlaybackController;
