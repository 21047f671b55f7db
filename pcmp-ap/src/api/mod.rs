//! HTTP control API for the player
//!
//! Mirrors the controller's control surface over REST, plus an SSE stream
//! of player events.

pub mod handlers;
pub mod server;
pub mod sse;

pub use server::{build_router, run, spawn_progress_ticker, AppContext};
