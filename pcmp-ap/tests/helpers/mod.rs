//! Test helper modules for pcmp-ap integration tests
//!
//! Provides scripted collaborators that record every call they receive:
//! - ScriptedDemuxer: fixed-size samples carrying their index as payload
//! - ScriptedDecoder: passthrough codec with configurable latency
//! - ScriptedSink: captures written bytes
//! - ScriptedFactory: wires them up per track name
//!
//! Each sample payload is its index as a little-endian u32, so a sink log
//! can be checked for loss and ordering.

#![allow(dead_code)]

pub mod audio_generator;

use pcmp_ap::audio::Sink;
use pcmp_ap::config::PipelineSettings;
use pcmp_ap::media::{
    Decoder, DequeuedOutput, Demuxer, ExtractionResult, InputBuffer, OutputBuffer, PcmEncoding,
    SourceDescriptor, TrackFormat,
};
use pcmp_ap::playback::{PipelineFactory, PlaybackController};
use pcmp_ap::{Error, Result};
use pcmp_common::events::{EventBus, PlayerEvent};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::ThreadId;
use std::time::{Duration, Instant};
use tokio::sync::broadcast;

pub const SCRIPTED_CODEC: &str = "audio/scripted";
pub const SAMPLE_RATE: u32 = 8_000;
pub const CHANNELS: u16 = 2;

// ============================================================================
// Call probe
// ============================================================================

/// Shared call log with overlap detection
#[derive(Default)]
pub struct Probe {
    calls: Mutex<Vec<String>>,
    threads: Mutex<Vec<(String, ThreadId)>>,
    active: AtomicUsize,
    overlaps: AtomicUsize,
}

pub struct ProbeGuard<'a> {
    probe: &'a Probe,
}

impl Drop for ProbeGuard<'_> {
    fn drop(&mut self) {
        self.probe.active.fetch_sub(1, Ordering::SeqCst);
    }
}

impl Probe {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Record a collaborator call; flags it if another call is in flight
    pub fn enter(&self, call: &str) -> ProbeGuard<'_> {
        if self.active.fetch_add(1, Ordering::SeqCst) > 0 {
            self.overlaps.fetch_add(1, Ordering::SeqCst);
        }
        self.note(call);
        self.threads
            .lock()
            .unwrap()
            .push((call.to_string(), std::thread::current().id()));
        ProbeGuard { probe: self }
    }

    pub fn note(&self, entry: &str) {
        self.calls.lock().unwrap().push(entry.to_string());
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn count(&self, call: &str) -> usize {
        self.calls.lock().unwrap().iter().filter(|c| *c == call).count()
    }

    /// Number of distinct threads that made `call`
    pub fn distinct_threads(&self, call: &str) -> usize {
        let threads = self.threads.lock().unwrap();
        let ids: HashSet<ThreadId> = threads
            .iter()
            .filter(|(c, _)| c == call)
            .map(|(_, id)| *id)
            .collect();
        ids.len()
    }

    pub fn clear(&self) {
        self.calls.lock().unwrap().clear();
        self.threads.lock().unwrap().clear();
    }

    pub fn overlaps(&self) -> usize {
        self.overlaps.load(Ordering::SeqCst)
    }
}

// ============================================================================
// Track scripts
// ============================================================================

#[derive(Debug, Clone)]
pub struct TrackScript {
    pub codec_id: String,
    pub sample_count: usize,
    pub sample_micros: i64,
    pub sample_rate_hz: u32,
    /// Extract fails when it reaches this sample index
    pub fail_at: Option<usize>,
}

impl TrackScript {
    pub fn new(sample_count: usize, sample_micros: i64) -> Self {
        Self {
            codec_id: SCRIPTED_CODEC.to_string(),
            sample_count,
            sample_micros,
            sample_rate_hz: SAMPLE_RATE,
            fail_at: None,
        }
    }

    pub fn with_rate(mut self, sample_rate_hz: u32) -> Self {
        self.sample_rate_hz = sample_rate_hz;
        self
    }

    pub fn failing_at(mut self, index: usize) -> Self {
        self.fail_at = Some(index);
        self
    }

    pub fn with_codec(mut self, codec_id: &str) -> Self {
        self.codec_id = codec_id.to_string();
        self
    }

    pub fn duration_micros(&self) -> i64 {
        self.sample_count as i64 * self.sample_micros
    }
}

// ============================================================================
// Demuxer
// ============================================================================

pub struct ScriptedDemuxer {
    scripts: Arc<HashMap<String, TrackScript>>,
    probe: Arc<Probe>,
    script: Option<TrackScript>,
    cursor: usize,
}

impl Demuxer for ScriptedDemuxer {
    fn configure(&mut self, source: SourceDescriptor, mime_prefix: &str) -> Result<TrackFormat> {
        let _g = self.probe.enter("demuxer.configure");
        let script = self
            .scripts
            .get(&source.name)
            .cloned()
            .ok_or_else(|| Error::NotFound(source.name.clone()))?;
        if !script.codec_id.starts_with(mime_prefix) {
            return Err(Error::NoMatchingTrack {
                prefix: mime_prefix.to_string(),
            });
        }
        let mut format = TrackFormat::raw(script.sample_rate_hz, CHANNELS, PcmEncoding::Pcm16)
            .with_duration(script.duration_micros());
        format.codec_id = script.codec_id.clone();
        self.script = Some(script);
        self.cursor = 0;
        Ok(format)
    }

    fn extract(&mut self, destination: &mut [u8]) -> Result<ExtractionResult> {
        let _g = self.probe.enter("demuxer.extract");
        let script = self
            .script
            .as_ref()
            .ok_or_else(|| Error::InvalidState("demuxer not configured".into()))?;
        if script.fail_at == Some(self.cursor) {
            return Err(Error::Demux(format!("corrupt sample {}", self.cursor)));
        }
        if self.cursor >= script.sample_count {
            return Ok(ExtractionResult::end_of_stream());
        }
        destination[..4].copy_from_slice(&(self.cursor as u32).to_le_bytes());
        let pts = self.cursor as i64 * script.sample_micros;
        self.cursor += 1;
        Ok(ExtractionResult::sample(4, pts))
    }

    fn seek_to(&mut self, position_micros: i64) -> Result<()> {
        let _g = self.probe.enter("demuxer.seek_to");
        if let Some(script) = &self.script {
            let index = (position_micros.max(0) / script.sample_micros) as usize;
            self.cursor = index.min(script.sample_count);
        }
        Ok(())
    }

    fn release(&mut self) {
        let _g = self.probe.enter("demuxer.release");
        self.script = None;
    }
}

// ============================================================================
// Decoder
// ============================================================================

#[derive(Debug, Clone, Default)]
pub struct DecoderScript {
    /// Outputs held back until more input arrives (or input ends)
    pub latency: usize,
    /// Never produce output
    pub stall: bool,
    /// After this many data outputs, switch to another sample rate
    pub rate_change: Option<(usize, u32)>,
}

struct Pending {
    data: Vec<u8>,
    pts: i64,
    eos: bool,
}

pub struct ScriptedDecoder {
    script: DecoderScript,
    probe: Arc<Probe>,
    free_inputs: usize,
    generation: u64,
    queue: VecDeque<Pending>,
    output_format: Option<TrackFormat>,
    announce_format: bool,
    outputs: usize,
}

const INPUT_SLOTS: usize = 2;

impl Decoder for ScriptedDecoder {
    fn configure(&mut self, format: &TrackFormat) -> Result<TrackFormat> {
        let _g = self.probe.enter("decoder.configure");
        let output = TrackFormat::raw(format.sample_rate_hz, format.channel_count, PcmEncoding::Pcm16)
            .with_duration(format.duration_micros);
        self.output_format = Some(output.clone());
        self.announce_format = true;
        Ok(output)
    }

    fn acquire_input_buffer(&mut self) -> Result<Option<InputBuffer>> {
        let _g = self.probe.enter("decoder.acquire_input");
        if self.free_inputs == 0 {
            return Ok(None);
        }
        self.free_inputs -= 1;
        self.probe.note("decoder.input_taken");
        Ok(Some(InputBuffer::new(0, self.generation, vec![0; 64])))
    }

    fn submit_input_buffer(
        &mut self,
        buffer: InputBuffer,
        offset: usize,
        size: usize,
        presentation_time_micros: i64,
        end_of_stream: bool,
    ) -> Result<()> {
        let _g = self.probe.enter("decoder.submit_input");
        let (_, generation, data) = buffer.into_parts();
        if generation != self.generation {
            return Ok(());
        }
        self.free_inputs += 1;

        if end_of_stream && size == 0 {
            // With latency the flag rides on the last held buffer
            match self.queue.back_mut() {
                Some(last) if self.script.latency > 0 => last.eos = true,
                _ => self.queue.push_back(Pending {
                    data: Vec::new(),
                    pts: presentation_time_micros,
                    eos: true,
                }),
            }
        } else {
            self.queue.push_back(Pending {
                data: data[offset..offset + size].to_vec(),
                pts: presentation_time_micros,
                eos: end_of_stream,
            });
        }
        Ok(())
    }

    fn acquire_output_buffer(&mut self) -> Result<DequeuedOutput> {
        let _g = self.probe.enter("decoder.acquire_output");
        if self.script.stall {
            return Ok(DequeuedOutput::TryAgainLater);
        }
        if self.announce_format {
            self.announce_format = false;
            if let Some(format) = &self.output_format {
                return Ok(DequeuedOutput::FormatChanged(format.clone()));
            }
        }
        if let Some((after, rate)) = self.script.rate_change {
            if self.outputs == after {
                self.outputs += 1;
                let changed = TrackFormat::raw(rate, CHANNELS, PcmEncoding::Pcm16);
                self.output_format = Some(changed.clone());
                return Ok(DequeuedOutput::FormatChanged(changed));
            }
        }

        let ready = self.queue.len() > self.script.latency
            || self.queue.back().map(|p| p.eos).unwrap_or(false);
        if !ready {
            return Ok(DequeuedOutput::TryAgainLater);
        }
        let Some(pending) = self.queue.pop_front() else {
            return Ok(DequeuedOutput::TryAgainLater);
        };
        if !pending.data.is_empty() {
            self.outputs += 1;
        }
        if pending.eos {
            self.probe.note(&format!("decoder.eos({})", pending.data.len()));
        }
        let size = pending.data.len();
        Ok(DequeuedOutput::Buffer(OutputBuffer::new(
            0,
            self.generation,
            pending.data,
            size,
            pending.pts,
            pending.eos,
        )))
    }

    fn release_output_buffer(&mut self, buffer: OutputBuffer, render: bool) -> Result<()> {
        let _g = self.probe.enter("decoder.release_output");
        if render {
            self.probe.note("decoder.rendered");
        }
        drop(buffer);
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        let _g = self.probe.enter("decoder.flush");
        self.queue.clear();
        self.generation += 1;
        self.free_inputs = INPUT_SLOTS;
        Ok(())
    }

    fn release(&mut self) {
        let _g = self.probe.enter("decoder.release");
        self.queue.clear();
    }
}

// ============================================================================
// Sink
// ============================================================================

/// What a scripted sink saw, shared with the test
#[derive(Default)]
pub struct SinkLog {
    bytes: Mutex<Vec<u8>>,
    configured_rates: Mutex<Vec<u32>>,
    pub flushes: AtomicUsize,
    pub releases: AtomicUsize,
}

impl SinkLog {
    /// Sample indices received, in order
    pub fn payloads(&self) -> Vec<u32> {
        self.bytes
            .lock()
            .unwrap()
            .chunks_exact(4)
            .map(|c| u32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect()
    }

    pub fn byte_count(&self) -> usize {
        self.bytes.lock().unwrap().len()
    }

    pub fn configured_rates(&self) -> Vec<u32> {
        self.configured_rates.lock().unwrap().clone()
    }

    pub fn clear(&self) {
        self.bytes.lock().unwrap().clear();
    }
}

pub struct ScriptedSink {
    name: String,
    probe: Arc<Probe>,
    log: Arc<SinkLog>,
    write_delay: Duration,
    fail_configure: bool,
}

impl ScriptedSink {
    pub fn new(name: &str, probe: Arc<Probe>, write_delay: Duration) -> (Box<dyn Sink>, Arc<SinkLog>) {
        let log = Arc::new(SinkLog::default());
        let sink = Self {
            name: name.to_string(),
            probe,
            log: Arc::clone(&log),
            write_delay,
            fail_configure: false,
        };
        (Box::new(sink), log)
    }

    /// A sink whose configure always fails
    pub fn broken(probe: Arc<Probe>) -> Box<dyn Sink> {
        Box::new(Self {
            name: "broken".to_string(),
            probe,
            log: Arc::new(SinkLog::default()),
            write_delay: Duration::ZERO,
            fail_configure: true,
        })
    }
}

impl Sink for ScriptedSink {
    fn configure(&mut self, format: &TrackFormat) -> Result<()> {
        let _g = self.probe.enter("sink.configure");
        if self.fail_configure {
            return Err(Error::AudioOutput("device unavailable".to_string()));
        }
        self.log
            .configured_rates
            .lock()
            .unwrap()
            .push(format.sample_rate_hz);
        Ok(())
    }

    fn write(&mut self, pcm: &[u8]) -> Result<usize> {
        let _g = self.probe.enter("sink.write");
        if !self.write_delay.is_zero() {
            std::thread::sleep(self.write_delay);
        }
        self.log.bytes.lock().unwrap().extend_from_slice(pcm);
        Ok(pcm.len())
    }

    fn flush(&mut self) -> Result<()> {
        let _g = self.probe.enter("sink.flush");
        self.log.flushes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn drain(&mut self) -> Result<()> {
        let _g = self.probe.enter("sink.drain");
        Ok(())
    }

    fn release(&mut self) {
        let _g = self.probe.enter("sink.release");
        self.log.releases.fetch_add(1, Ordering::SeqCst);
    }

    fn name(&self) -> &str {
        &self.name
    }
}

// ============================================================================
// Factory
// ============================================================================

pub struct ScriptedFactory {
    scripts: Arc<HashMap<String, TrackScript>>,
    pub probe: Arc<Probe>,
    pub sink_log: Arc<SinkLog>,
    decoder: DecoderScript,
    sink_delay: Duration,
    sinks_created: AtomicUsize,
}

pub struct ScriptedFactoryBuilder {
    scripts: HashMap<String, TrackScript>,
    decoder: DecoderScript,
    sink_delay: Duration,
}

impl ScriptedFactoryBuilder {
    pub fn track(mut self, name: &str, script: TrackScript) -> Self {
        self.scripts.insert(name.to_string(), script);
        self
    }

    pub fn decoder(mut self, decoder: DecoderScript) -> Self {
        self.decoder = decoder;
        self
    }

    pub fn sink_delay(mut self, delay: Duration) -> Self {
        self.sink_delay = delay;
        self
    }

    pub fn build(self) -> Arc<ScriptedFactory> {
        Arc::new(ScriptedFactory {
            scripts: Arc::new(self.scripts),
            probe: Probe::new(),
            sink_log: Arc::new(SinkLog::default()),
            decoder: self.decoder,
            sink_delay: self.sink_delay,
            sinks_created: AtomicUsize::new(0),
        })
    }
}

impl ScriptedFactory {
    pub fn builder() -> ScriptedFactoryBuilder {
        ScriptedFactoryBuilder {
            scripts: HashMap::new(),
            decoder: DecoderScript::default(),
            sink_delay: Duration::ZERO,
        }
    }

    pub fn sinks_created(&self) -> usize {
        self.sinks_created.load(Ordering::SeqCst)
    }
}

impl PipelineFactory for ScriptedFactory {
    fn open_source(&self, track: &str) -> Result<SourceDescriptor> {
        if !self.scripts.contains_key(track) {
            return Err(Error::NotFound(track.to_string()));
        }
        Ok(SourceDescriptor::from_bytes(track, Vec::new(), None))
    }

    fn create_demuxer(&self) -> Box<dyn Demuxer> {
        Box::new(ScriptedDemuxer {
            scripts: Arc::clone(&self.scripts),
            probe: Arc::clone(&self.probe),
            script: None,
            cursor: 0,
        })
    }

    fn create_decoder(&self, _format: &TrackFormat) -> Result<Box<dyn Decoder>> {
        Ok(Box::new(ScriptedDecoder {
            script: self.decoder.clone(),
            probe: Arc::clone(&self.probe),
            free_inputs: INPUT_SLOTS,
            generation: 0,
            queue: VecDeque::new(),
            output_format: None,
            announce_format: false,
            outputs: 0,
        }))
    }

    fn create_sink(&self) -> Box<dyn Sink> {
        self.sinks_created.fetch_add(1, Ordering::SeqCst);
        Box::new(ScriptedSink {
            name: "scripted".to_string(),
            probe: Arc::clone(&self.probe),
            log: Arc::clone(&self.sink_log),
            write_delay: self.sink_delay,
            fail_configure: false,
        })
    }
}

// ============================================================================
// Controller helpers
// ============================================================================

pub fn settings(stall_threshold: u32) -> PipelineSettings {
    PipelineSettings {
        stall_threshold,
        dequeue_timeout_ms: 1,
        ..PipelineSettings::default()
    }
}

pub fn controller(factory: &Arc<ScriptedFactory>, stall_threshold: u32) -> PlaybackController {
    PlaybackController::new(
        Arc::clone(factory) as Arc<dyn PipelineFactory>,
        settings(stall_threshold),
        EventBus::new(1024),
    )
}

/// Poll `condition` every millisecond until it holds or `timeout` passes
pub fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(1));
    }
    condition()
}

/// Wait for the first event matching `predicate`
pub fn wait_for_event(
    rx: &mut broadcast::Receiver<PlayerEvent>,
    timeout: Duration,
    mut predicate: impl FnMut(&PlayerEvent) -> bool,
) -> Option<PlayerEvent> {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        match rx.try_recv() {
            Ok(event) if predicate(&event) => return Some(event),
            Ok(_) => {}
            Err(broadcast::error::TryRecvError::Empty) => {
                std::thread::sleep(Duration::from_millis(1))
            }
            Err(broadcast::error::TryRecvError::Lagged(_)) => {}
            Err(broadcast::error::TryRecvError::Closed) => return None,
        }
    }
    None
}
