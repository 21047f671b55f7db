//! End-to-end pipeline tests over real WAV files
//!
//! Files are generated into a temporary media root; decoding runs through
//! the symphonia demuxer and decoder.

mod helpers;

use helpers::audio_generator::{
    frame_count, generate_silent_mono_wav, generate_sine_wav, TEST_SAMPLE_RATE,
};
use helpers::{wait_for_event, wait_until, Probe, ScriptedSink, SinkLog};
use pcmp_ap::audio::SinkKind;
use pcmp_ap::config::{PipelineSettings, SinkSettings};
use pcmp_ap::media::{DecoderSettings, FileSourceProvider, PcmEncoding};
use pcmp_ap::playback::{
    DefaultPipelineFactory, NextTrack, Pipeline, PlaybackClock, PlaybackController, Pump,
    RestartOutcome, Step,
};
use pcmp_ap::Error;
use pcmp_common::events::{EventBus, PlaybackState, PlayerEvent};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

const PREFIX: &str = "audio/";

fn factory(root: &TempDir) -> DefaultPipelineFactory {
    DefaultPipelineFactory::new(
        Arc::new(FileSourceProvider::new(root.path())),
        DecoderSettings::default(),
        SinkSettings {
            kind: SinkKind::Native,
            ..SinkSettings::default()
        },
    )
}

fn capture_sink() -> (Box<dyn pcmp_ap::audio::Sink>, Arc<SinkLog>) {
    ScriptedSink::new("capture", Probe::new(), Duration::ZERO)
}

/// Pump a prepared pipeline to its first end of track
fn play_through(pipeline: &mut Pipeline) -> (i64, PlaybackClock) {
    let clock = PlaybackClock::new();
    let mut pump = Pump::new(50);
    let mut final_position = None;
    let mut restart = |_: &mut Pipeline| -> pcmp_ap::Result<RestartOutcome> {
        final_position = Some(clock.position_micros());
        Ok(RestartOutcome {
            finished_track: String::new(),
            final_position_micros: 0,
            next_track: String::new(),
            stop: true,
        })
    };
    for _ in 0..100_000 {
        if let Step::TrackRestarted(_) = pump.step(pipeline, &clock, &mut restart).unwrap() {
            break;
        }
    }
    (final_position.expect("track never ended"), clock)
}

#[test]
fn test_wav_decodes_every_frame() {
    let dir = TempDir::new().unwrap();
    generate_sine_wav(dir.path().join("tone.wav"), 500, 440.0, 0.5).unwrap();
    let factory = factory(&dir);
    let (sink, log) = capture_sink();

    let mut pipeline = Pipeline::prepare(&factory, "tone.wav", PREFIX, Some(sink)).unwrap();
    let format = pipeline.output_format().clone();
    assert_eq!(format.sample_rate_hz, TEST_SAMPLE_RATE);
    assert_eq!(format.channel_count, 2);
    assert_eq!(format.pcm_encoding, PcmEncoding::Pcm16);
    assert!(pipeline.track_format().codec_id.starts_with(PREFIX));
    assert!((pipeline.duration_micros() - 500_000).abs() < 1_000);

    let (final_position, clock) = play_through(&mut pipeline);

    assert_eq!(log.byte_count() as u64, frame_count(500) * 2 * 2);
    assert!(final_position > 250_000, "final position {}", final_position);
    assert!(final_position < 500_000, "final position {}", final_position);
    assert_eq!(clock.position_micros(), 0);
    assert_eq!(log.configured_rates(), vec![TEST_SAMPLE_RATE]);
}

#[test]
fn test_mono_wav_keeps_source_layout() {
    let dir = TempDir::new().unwrap();
    generate_silent_mono_wav(dir.path().join("quiet.wav"), 250, 8_000).unwrap();
    let factory = factory(&dir);
    let (sink, log) = capture_sink();

    let mut pipeline = Pipeline::prepare(&factory, "quiet.wav", PREFIX, Some(sink)).unwrap();
    assert_eq!(pipeline.output_format().sample_rate_hz, 8_000);
    assert_eq!(pipeline.output_format().channel_count, 1);

    play_through(&mut pipeline);
    assert_eq!(log.byte_count(), 2_000 * 2);
}

#[test]
fn test_seek_skips_earlier_audio() {
    let dir = TempDir::new().unwrap();
    generate_sine_wav(dir.path().join("tone.wav"), 1_000, 440.0, 0.5).unwrap();
    let factory = factory(&dir);
    let (sink, log) = capture_sink();

    let mut pipeline = Pipeline::prepare(&factory, "tone.wav", PREFIX, Some(sink)).unwrap();
    pipeline.seek(500_000).unwrap();
    play_through(&mut pipeline);

    let full = frame_count(1_000) as usize * 4;
    let written = log.byte_count();
    assert!(written > 0);
    assert!(written < full * 3 / 4, "wrote {} of {} bytes", written, full);
    assert_eq!(log.flushes.load(std::sync::atomic::Ordering::SeqCst), 1);
}

#[test]
fn test_missing_file_is_not_found() {
    let dir = TempDir::new().unwrap();
    let factory = factory(&dir);

    let result = Pipeline::prepare(&factory, "absent.wav", PREFIX, None);
    assert!(matches!(result, Err(Error::NotFound(_))));
}

#[test]
fn test_non_audio_file_fails_prepare() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("notes.txt"), b"definitely not audio").unwrap();
    let factory = factory(&dir);

    let result = Pipeline::prepare(&factory, "notes.txt", PREFIX, None);
    assert!(result.is_err());
}

#[test]
fn test_video_prefix_finds_no_track() {
    let dir = TempDir::new().unwrap();
    generate_sine_wav(dir.path().join("tone.wav"), 100, 440.0, 0.5).unwrap();
    let factory = factory(&dir);

    let result = Pipeline::prepare(&factory, "tone.wav", "video/", None);
    assert!(matches!(result, Err(Error::NoMatchingTrack { .. })));
}

#[test]
fn test_controller_plays_wav_on_native_sink() {
    let dir = TempDir::new().unwrap();
    generate_sine_wav(dir.path().join("tone.wav"), 300, 440.0, 0.5).unwrap();
    let controller = PlaybackController::new(
        Arc::new(factory(&dir)),
        PipelineSettings::default(),
        EventBus::new(256),
    );
    controller.set_on_track_end(Box::new(|_| NextTrack::Stop));
    let mut rx = controller.subscribe();

    controller.prepare("tone.wav").unwrap();
    assert_eq!(controller.sink_name().as_deref(), Some("native"));
    controller.play().unwrap();

    let completed = wait_for_event(&mut rx, Duration::from_secs(10), |e| {
        matches!(e, PlayerEvent::TrackCompleted { .. })
    })
    .expect("track never completed");
    if let PlayerEvent::TrackCompleted {
        track,
        position_micros,
        next_track,
        ..
    } = completed
    {
        assert_eq!(track, "tone.wav");
        assert!(position_micros > 100_000);
        assert_eq!(next_track, None);
    }

    assert!(wait_until(Duration::from_secs(5), || {
        controller.state() == PlaybackState::Stopped
    }));
    assert_eq!(controller.position_micros(), 0);
    controller.release();
}
