//! Playback controller: Stopped / Playing / Paused over a pump worker thread
//!
//! All collaborators live in one `Session` behind a mutex. The worker runs
//! pump iterations while holding that mutex and parks on the paired condvar
//! (the gate) while paused. Commands announce themselves through
//! `control_waiters` before locking; the worker yields at the gate while a
//! command is waiting, so commands never starve behind a busy pump.
//!
//! Lock order is worker handle, then session. `prepare` and `release` hold
//! the handle lock from cancelling the worker until they are done, so a
//! concurrent `play` cannot revive a worker that is being stopped.

use super::pipeline::{NextTrack, Pipeline, PipelineFactory, RestartOutcome};
use super::pump::{Pump, Step};
use super::state::PlaybackClock;
use crate::audio::Sink;
use crate::config::PipelineSettings;
use crate::error::{Error, Result};
use pcmp_common::events::{EventBus, PlaybackState, PlayerEvent};
use pcmp_common::time::{format_position, now};
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

/// Decides what follows a finished track
pub type TrackEndPolicy = Box<dyn FnMut(&str) -> NextTrack + Send>;

struct Session {
    state: PlaybackState,
    cancelled: bool,
    worker_alive: bool,
    pump: Pump,
    pipeline: Option<Pipeline>,
    /// Sink chosen while nothing was prepared; used by the next prepare
    spare_sink: Option<Box<dyn Sink>>,
    on_track_end: TrackEndPolicy,
}

struct Shared {
    session: Mutex<Session>,
    gate: Condvar,
    control_waiters: AtomicUsize,
    clock: PlaybackClock,
    factory: Arc<dyn PipelineFactory>,
    settings: PipelineSettings,
    events: EventBus,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Session> {
        self.session.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Lock on behalf of a command, ahead of the worker
    fn lock_for_command(&self) -> ControlGuard<'_> {
        self.control_waiters.fetch_add(1, Ordering::SeqCst);
        ControlGuard {
            shared: self,
            guard: self.lock(),
        }
    }

    fn emit_state_change(&self, old_state: PlaybackState, new_state: PlaybackState) {
        if old_state != new_state {
            info!("Playback state: {} → {}", old_state, new_state);
            self.events.emit_lossy(PlayerEvent::PlaybackStateChanged {
                old_state,
                new_state,
                timestamp: now(),
            });
        }
    }

    fn emit_prepared(&self, pipeline: &Pipeline) {
        let format = pipeline.track_format();
        self.events.emit_lossy(PlayerEvent::TrackPrepared {
            track: pipeline.track().to_string(),
            codec: format.codec_id.clone(),
            sample_rate_hz: format.sample_rate_hz,
            channel_count: format.channel_count,
            duration_micros: format.duration_micros,
            timestamp: now(),
        });
    }
}

/// Session lock held by a command. Dropping it wakes the worker.
struct ControlGuard<'a> {
    shared: &'a Shared,
    guard: MutexGuard<'a, Session>,
}

impl Deref for ControlGuard<'_> {
    type Target = Session;

    fn deref(&self) -> &Session {
        &self.guard
    }
}

impl DerefMut for ControlGuard<'_> {
    fn deref_mut(&mut self) -> &mut Session {
        &mut self.guard
    }
}

impl Drop for ControlGuard<'_> {
    fn drop(&mut self) {
        // The mutex itself is released right after; woken waiters block on it
        self.shared.control_waiters.fetch_sub(1, Ordering::SeqCst);
        self.shared.gate.notify_all();
    }
}

/// Public control surface of the player.
///
/// Every method takes `&self`; the controller is shared behind an `Arc`
/// by the HTTP API and the CLI.
pub struct PlaybackController {
    shared: Arc<Shared>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl PlaybackController {
    pub fn new(
        factory: Arc<dyn PipelineFactory>,
        settings: PipelineSettings,
        events: EventBus,
    ) -> Self {
        let session = Session {
            state: PlaybackState::Stopped,
            cancelled: false,
            worker_alive: false,
            pump: Pump::new(settings.stall_threshold),
            pipeline: None,
            spare_sink: None,
            on_track_end: Box::new(|_| NextTrack::Repeat),
        };
        Self {
            shared: Arc::new(Shared {
                session: Mutex::new(session),
                gate: Condvar::new(),
                control_waiters: AtomicUsize::new(0),
                clock: PlaybackClock::new(),
                factory,
                settings,
                events,
            }),
            worker: Mutex::new(None),
        }
    }

    /// Open `track` and configure its pipeline, replacing any current one.
    ///
    /// Leaves the controller Stopped at position 0. On failure nothing is
    /// prepared.
    pub fn prepare(&self, track: &str) -> Result<()> {
        let _worker = self.stop_worker();
        let shared = &self.shared;
        let mut session = shared.lock_for_command();
        let old_state = session.state;

        let sink = match session.pipeline.take() {
            Some(pipeline) => Some(pipeline.into_sink()),
            None => session.spare_sink.take(),
        };
        session.state = PlaybackState::Stopped;
        session.cancelled = false;
        session.pump.reset();
        shared.clock.set_position_micros(0);
        shared.clock.set_duration_micros(0);

        let result = Pipeline::prepare(
            shared.factory.as_ref(),
            track,
            &shared.settings.mime_prefix,
            sink,
        );
        shared.emit_state_change(old_state, PlaybackState::Stopped);

        match result {
            Ok(pipeline) => {
                shared.clock.set_duration_micros(pipeline.duration_micros());
                shared.emit_prepared(&pipeline);
                session.pipeline = Some(pipeline);
                Ok(())
            }
            Err(e) => {
                warn!("Failed to prepare '{}': {}", track, e);
                shared.events.emit_lossy(PlayerEvent::PlaybackError {
                    track: Some(track.to_string()),
                    message: e.to_string(),
                    timestamp: now(),
                });
                Err(e)
            }
        }
    }

    /// Start or resume playback, spawning the worker if none is alive
    pub fn play(&self) -> Result<()> {
        let mut worker = self.worker.lock().unwrap_or_else(PoisonError::into_inner);
        let mut session = self.shared.lock_for_command();
        if session.pipeline.is_none() {
            return Err(Error::InvalidState("no track prepared".to_string()));
        }
        let old_state = session.state;
        if old_state == PlaybackState::Playing {
            return Ok(());
        }

        session.state = PlaybackState::Playing;
        session.cancelled = false;
        if !session.worker_alive {
            // A previous worker exited on its own; it no longer needs the lock
            if let Some(stale) = worker.take() {
                if stale.join().is_err() {
                    error!("Previous pump worker panicked");
                }
            }
            let shared = Arc::clone(&self.shared);
            let handle = thread::Builder::new()
                .name("pcmp-pump".to_string())
                .spawn(move || worker_loop(shared))
                .map_err(|e| {
                    Error::Internal(format!("failed to spawn pump worker: {}", e))
                });
            match handle {
                Ok(handle) => {
                    session.worker_alive = true;
                    *worker = Some(handle);
                    debug!("Pump worker spawned");
                }
                Err(e) => {
                    session.state = old_state;
                    return Err(e);
                }
            }
        }
        self.shared.emit_state_change(old_state, PlaybackState::Playing);
        Ok(())
    }

    /// Park the worker at its next iteration boundary
    pub fn pause(&self) -> Result<()> {
        let mut session = self.shared.lock_for_command();
        match session.state {
            PlaybackState::Playing => {
                session.state = PlaybackState::Paused;
                self.shared
                    .emit_state_change(PlaybackState::Playing, PlaybackState::Paused);
                Ok(())
            }
            PlaybackState::Paused => Ok(()),
            PlaybackState::Stopped => Err(Error::InvalidState("not playing".to_string())),
        }
    }

    /// Move playback to `position_micros`, clamped to the track.
    ///
    /// Flushes sink and decoder, seeks the demuxer and clears both
    /// end-of-stream flags. Playback state is unchanged.
    pub fn seek(&self, position_micros: i64) -> Result<()> {
        let mut session = self.shared.lock_for_command();
        let Session { pipeline, pump, .. } = &mut *session;
        let pipeline = pipeline
            .as_mut()
            .ok_or_else(|| Error::InvalidState("no track prepared".to_string()))?;

        let duration = pipeline.duration_micros();
        let target = if duration > 0 {
            position_micros.clamp(0, duration)
        } else {
            position_micros.max(0)
        };

        pipeline.seek(target)?;
        pump.reset();
        self.shared.clock.set_position_micros(target);
        info!("Seeked to {}", format_position(target));
        self.shared.events.emit_lossy(PlayerEvent::Seeked {
            position_micros: target,
            timestamp: now(),
        });
        Ok(())
    }

    /// Stop the worker and release decoder, sink and demuxer. Idempotent.
    pub fn release(&self) {
        let _worker = self.stop_worker();
        let mut session = self.shared.lock_for_command();
        let old_state = session.state;
        session.state = PlaybackState::Stopped;
        session.pump.reset();
        if let Some(mut pipeline) = session.pipeline.take() {
            pipeline.release();
            info!("Released '{}'", pipeline.track());
        }
        if let Some(mut sink) = session.spare_sink.take() {
            sink.release();
        }
        self.shared.clock.set_duration_micros(0);
        self.shared.emit_state_change(old_state, PlaybackState::Stopped);
    }

    /// Replace the output sink without interrupting state or position
    pub fn switch_sink(&self, sink: Box<dyn Sink>) -> Result<()> {
        let mut session = self.shared.lock_for_command();
        let name = sink.name().to_string();
        match session.pipeline.as_mut() {
            Some(pipeline) => pipeline.replace_sink(sink)?,
            None => {
                if let Some(mut old) = session.spare_sink.replace(sink) {
                    old.release();
                }
            }
        }
        self.shared.events.emit_lossy(PlayerEvent::SinkChanged {
            sink: name,
            timestamp: now(),
        });
        Ok(())
    }

    /// Install the policy consulted when a track finishes
    pub fn set_on_track_end(&self, policy: TrackEndPolicy) {
        self.shared.lock_for_command().on_track_end = policy;
    }

    pub fn state(&self) -> PlaybackState {
        self.shared.lock_for_command().state
    }

    pub fn is_playing(&self) -> bool {
        self.state() == PlaybackState::Playing
    }

    /// Presentation time of the last buffer handed to the sink
    pub fn position_micros(&self) -> i64 {
        self.shared.clock.position_micros()
    }

    /// Duration of the prepared track; 0 when nothing is prepared
    pub fn duration_micros(&self) -> i64 {
        self.shared.clock.duration_micros()
    }

    pub fn current_track(&self) -> Option<String> {
        self.shared
            .lock_for_command()
            .pipeline
            .as_ref()
            .map(|p| p.track().to_string())
    }

    pub fn sink_name(&self) -> Option<String> {
        let session = self.shared.lock_for_command();
        session
            .pipeline
            .as_ref()
            .map(|p| p.sink_name().to_string())
            .or_else(|| session.spare_sink.as_ref().map(|s| s.name().to_string()))
    }

    /// Clock shared with the pump (for progress reporting)
    pub fn clock(&self) -> PlaybackClock {
        self.shared.clock.clone()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PlayerEvent> {
        self.shared.events.subscribe()
    }

    /// Cancel the worker, wake it if parked, and wait for it to exit.
    ///
    /// The returned guard keeps `play()` from spawning or resuming a worker
    /// until the caller is done with the session.
    fn stop_worker(&self) -> MutexGuard<'_, Option<JoinHandle<()>>> {
        let mut worker = self.worker.lock().unwrap_or_else(PoisonError::into_inner);
        self.shared.lock_for_command().cancelled = true;
        if let Some(handle) = worker.take() {
            if handle.join().is_err() {
                error!("Pump worker panicked");
            }
            debug!("Pump worker joined");
        }
        worker
    }
}

impl Drop for PlaybackController {
    fn drop(&mut self) {
        self.release();
    }
}

fn worker_loop(shared: Arc<Shared>) {
    debug!("Pump worker started");
    let idle_backoff = shared.settings.dequeue_timeout();

    loop {
        let mut session = shared.lock();

        // Gate: park while paused or while a command wants the lock
        loop {
            if session.cancelled || session.state == PlaybackState::Stopped {
                debug!("Pump worker leaving (cancelled={})", session.cancelled);
                session.worker_alive = false;
                shared.gate.notify_all();
                return;
            }
            if session.state == PlaybackState::Paused
                || shared.control_waiters.load(Ordering::SeqCst) > 0
            {
                session = shared
                    .gate
                    .wait(session)
                    .unwrap_or_else(PoisonError::into_inner);
                continue;
            }
            break;
        }

        if session.pipeline.is_none() {
            session.state = PlaybackState::Stopped;
            continue;
        }
        let Session {
            pump,
            pipeline,
            on_track_end,
            ..
        } = &mut *session;
        let Some(pipeline) = pipeline.as_mut() else {
            continue;
        };

        let mut restart = |pipeline: &mut Pipeline| -> Result<RestartOutcome> {
            let finished_track = pipeline.track().to_string();
            let final_position_micros = shared.clock.position_micros();
            let (next_track, stop) = match on_track_end(&finished_track) {
                NextTrack::Repeat => (finished_track.clone(), false),
                NextTrack::Play(next) => (next, false),
                NextTrack::Stop => (finished_track.clone(), true),
            };
            pipeline.restart_with(
                shared.factory.as_ref(),
                &next_track,
                &shared.settings.mime_prefix,
            )?;
            Ok(RestartOutcome {
                finished_track,
                final_position_micros,
                next_track,
                stop,
            })
        };

        match pump.step(pipeline, &shared.clock, &mut restart) {
            Ok(Step::Continue) => {}
            Ok(Step::Idle) => {
                drop(session);
                thread::sleep(idle_backoff);
            }
            Ok(Step::TrackRestarted(outcome)) => {
                shared.clock.set_duration_micros(pipeline.duration_micros());
                shared.events.emit_lossy(PlayerEvent::TrackCompleted {
                    track: outcome.finished_track.clone(),
                    position_micros: outcome.final_position_micros,
                    next_track: (!outcome.stop).then(|| outcome.next_track.clone()),
                    timestamp: now(),
                });
                shared.emit_prepared(pipeline);
                if outcome.stop {
                    session.state = PlaybackState::Stopped;
                    shared.emit_state_change(PlaybackState::Playing, PlaybackState::Stopped);
                }
            }
            Err(e) => {
                let track = pipeline.track().to_string();
                error!("Playback of '{}' failed: {}", track, e);
                pipeline.release();
                session.pipeline = None;
                session.state = PlaybackState::Stopped;
                shared.clock.set_duration_micros(0);
                shared.events.emit_lossy(PlayerEvent::PlaybackError {
                    track: Some(track),
                    message: e.to_string(),
                    timestamp: now(),
                });
                shared.emit_state_change(PlaybackState::Playing, PlaybackState::Stopped);
            }
        }
    }
}
