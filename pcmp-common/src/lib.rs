//! # pcmp Common Library
//!
//! Shared code for the pcmp player crates:
//! - Event types (PlayerEvent enum) and the EventBus
//! - Playback state enumeration
//! - Configuration file and media root resolution
//! - Microsecond time helpers

pub mod config;
pub mod error;
pub mod events;
pub mod time;

pub use error::{Error, Result};
pub use events::{EventBus, PlaybackState, PlayerEvent};
