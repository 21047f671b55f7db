//! Decode-and-playback pump and the controller that drives it

pub mod controller;
pub mod pipeline;
pub mod pump;
pub mod state;

pub use controller::{PlaybackController, TrackEndPolicy};
pub use pipeline::{DefaultPipelineFactory, NextTrack, Pipeline, PipelineFactory, RestartOutcome};
pub use pump::{Pump, RestartFn, Step};
pub use state::PlaybackClock;
