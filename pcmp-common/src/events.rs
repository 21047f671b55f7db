//! Event types and the EventBus
//!
//! Provides the player's event definitions, shared with anything that
//! consumes the control API's SSE stream.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Playback state of a player instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlaybackState {
    /// Nothing playing; a prepared track (if any) starts from its current position
    Stopped,
    /// Worker running and writing to the sink
    Playing,
    /// Worker parked at its gate, sink receives no writes
    Paused,
}

impl std::fmt::Display for PlaybackState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PlaybackState::Stopped => write!(f, "stopped"),
            PlaybackState::Playing => write!(f, "playing"),
            PlaybackState::Paused => write!(f, "paused"),
        }
    }
}

/// Player event types
///
/// Events are broadcast via EventBus and serialized for SSE transmission.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum PlayerEvent {
    /// Playback state changed (Stopped/Playing/Paused)
    PlaybackStateChanged {
        old_state: PlaybackState,
        new_state: PlaybackState,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// A track was opened and its pipeline configured
    TrackPrepared {
        track: String,
        /// Codec identifier of the selected container track
        codec: String,
        sample_rate_hz: u32,
        channel_count: u16,
        duration_micros: i64,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Both end-of-stream flags were reached for a track
    TrackCompleted {
        track: String,
        /// Position reported by the last drained buffer
        position_micros: i64,
        /// Track prepared in its place (same name when looping)
        next_track: Option<String>,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// A seek was applied
    Seeked {
        position_micros: i64,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// The output sink was replaced at runtime
    SinkChanged {
        sink: String,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Periodic position report while playing
    PlaybackProgress {
        position_micros: i64,
        duration_micros: i64,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// The current track failed and was released
    PlaybackError {
        track: Option<String>,
        message: String,
        timestamp: chrono::DateTime<chrono::Utc>,
    },
}

impl PlayerEvent {
    /// Event name used for the SSE `event:` field
    pub fn event_type(&self) -> &'static str {
        match self {
            PlayerEvent::PlaybackStateChanged { .. } => "PlaybackStateChanged",
            PlayerEvent::TrackPrepared { .. } => "TrackPrepared",
            PlayerEvent::TrackCompleted { .. } => "TrackCompleted",
            PlayerEvent::Seeked { .. } => "Seeked",
            PlayerEvent::SinkChanged { .. } => "SinkChanged",
            PlayerEvent::PlaybackProgress { .. } => "PlaybackProgress",
            PlayerEvent::PlaybackError { .. } => "PlaybackError",
        }
    }
}

/// Central event distribution bus
///
/// Uses tokio::broadcast internally: publishing never blocks (slow
/// subscribers lag and skip), and it is callable from plain threads as well
/// as async tasks, which the playback worker relies on.
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<PlayerEvent>,
    capacity: usize,
}

impl EventBus {
    /// Creates a new EventBus with specified channel capacity
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx, capacity }
    }

    /// Subscribe to all future events
    pub fn subscribe(&self) -> broadcast::Receiver<PlayerEvent> {
        self.tx.subscribe()
    }

    /// Emit an event to all subscribers
    ///
    /// Returns `Ok(subscriber_count)` if at least one subscriber exists.
    pub fn emit(
        &self,
        event: PlayerEvent,
    ) -> Result<usize, broadcast::error::SendError<PlayerEvent>> {
        self.tx.send(event)
    }

    /// Emit an event, ignoring the no-subscriber case
    pub fn emit_lossy(&self, event: PlayerEvent) {
        let _ = self.tx.send(event);
    }

    /// Current number of subscribers
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Channel capacity given at construction
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_playback_state_display_and_serde() {
        assert_eq!(PlaybackState::Paused.to_string(), "paused");
        let json = serde_json::to_string(&PlaybackState::Stopped).unwrap();
        assert_eq!(json, "\"stopped\"");
    }

    #[test]
    fn test_event_serializes_with_type_tag() {
        let event = PlayerEvent::Seeked {
            position_micros: 42_000_000,
            timestamp: chrono::Utc::now(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "Seeked");
        assert_eq!(json["position_micros"], 42_000_000);
        assert_eq!(event.event_type(), "Seeked");
    }

    #[test]
    fn test_emit_without_subscribers_fails() {
        let bus = EventBus::new(10);
        let result = bus.emit(PlayerEvent::SinkChanged {
            sink: "cpal".to_string(),
            timestamp: chrono::Utc::now(),
        });
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_subscriber_receives_event() {
        let bus = EventBus::new(10);
        let mut rx = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 1);

        bus.emit_lossy(PlayerEvent::PlaybackStateChanged {
            old_state: PlaybackState::Stopped,
            new_state: PlaybackState::Playing,
            timestamp: chrono::Utc::now(),
        });

        match rx.recv().await.unwrap() {
            PlayerEvent::PlaybackStateChanged { new_state, .. } => {
                assert_eq!(new_state, PlaybackState::Playing)
            }
            other => panic!("unexpected event {:?}", other),
        }
    }
}
