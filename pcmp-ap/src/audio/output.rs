//! Platform PCM sink using cpal
//!
//! cpal streams are not `Send` on every platform, so each configured sink
//! owns a device thread that builds and holds the stream. The sink itself
//! only keeps the writer half of a sample ring and talks to the thread
//! through channels, which keeps `CpalSink: Send`.

use super::pcm::{decode_to_f32, min_buffer_bytes, remap_channels};
use super::resampler::StreamResampler;
use super::ring_buffer::{sample_ring, SampleConsumer, SampleProducer};
use super::sink::Sink;
use crate::error::{Error, Result};
use crate::media::TrackFormat;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, Sample, SampleFormat, SizedSample, Stream, StreamConfig};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// Longest a write may go without the device taking any samples
const WRITE_STALL_TIMEOUT: Duration = Duration::from_secs(2);

/// Longest a flush waits for the callback to acknowledge
const FLUSH_ACK_TIMEOUT: Duration = Duration::from_millis(250);

/// What the device thread actually opened
#[derive(Debug, Clone)]
pub struct DeviceInfo {
    pub device_name: String,
    pub sample_rate: u32,
    pub channels: u16,
    pub sample_format: SampleFormat,
}

struct ActiveOutput {
    format: TrackFormat,
    info: DeviceInfo,
    producer: SampleProducer,
    error_flag: Arc<AtomicBool>,
    shutdown_tx: mpsc::Sender<()>,
    thread: Option<JoinHandle<()>>,
    resampler: Option<StreamResampler>,
    /// Bytes of an incomplete frame left over from the previous write
    carry: Vec<u8>,
}

/// Sink rendering to a cpal output device
pub struct CpalSink {
    device_name: Option<String>,
    buffer_ms: u32,
    active: Option<ActiveOutput>,
    decoded: Vec<f32>,
    mapped: Vec<f32>,
    resampled: Vec<f32>,
}

impl CpalSink {
    /// `device_name` of `None` selects the host's default output device
    pub fn new(device_name: Option<String>, buffer_ms: u32) -> Self {
        Self {
            device_name,
            buffer_ms,
            active: None,
            decoded: Vec::new(),
            mapped: Vec::new(),
            resampled: Vec::new(),
        }
    }

    /// Enumerate available output devices
    pub fn list_devices() -> Result<Vec<String>> {
        let host = cpal::default_host();
        let devices: Vec<String> = host
            .output_devices()
            .map_err(|e| Error::AudioOutput(format!("Failed to enumerate devices: {}", e)))?
            .filter_map(|device| device.name().ok())
            .collect();
        debug!("Found {} output devices", devices.len());
        Ok(devices)
    }

    /// Device parameters of the open stream, if configured
    pub fn device_info(&self) -> Option<&DeviceInfo> {
        self.active.as_ref().map(|a| &a.info)
    }

    fn push_blocking(active: &mut ActiveOutput, samples: &[f32], buffer_ms: u32) -> Result<()> {
        let backoff = Duration::from_millis((buffer_ms / 4).clamp(1, 20) as u64);
        let mut offset = 0;
        let mut last_progress = Instant::now();

        while offset < samples.len() {
            if active.error_flag.load(Ordering::SeqCst) {
                return Err(Error::AudioOutput("output stream reported an error".to_string()));
            }
            let pushed = active.producer.push(&samples[offset..]);
            if pushed > 0 {
                offset += pushed;
                last_progress = Instant::now();
                continue;
            }
            if last_progress.elapsed() > WRITE_STALL_TIMEOUT {
                return Err(Error::AudioOutput(format!(
                    "device '{}' stopped consuming audio",
                    active.info.device_name
                )));
            }
            std::thread::sleep(backoff);
        }
        Ok(())
    }
}

impl Sink for CpalSink {
    fn configure(&mut self, format: &TrackFormat) -> Result<()> {
        self.release();
        if !format.is_raw() {
            return Err(Error::Config(format!(
                "cpal sink needs raw PCM, got {}",
                format.codec_id
            )));
        }

        let error_flag = Arc::new(AtomicBool::new(false));
        let (ready_tx, ready_rx) = mpsc::sync_channel(1);
        let (shutdown_tx, shutdown_rx) = mpsc::channel();
        let request = DeviceRequest {
            device_name: self.device_name.clone(),
            format: format.clone(),
            buffer_ms: self.buffer_ms,
            error_flag: Arc::clone(&error_flag),
        };

        let thread = std::thread::Builder::new()
            .name("pcmp-cpal-output".to_string())
            .spawn(move || run_device_thread(request, ready_tx, shutdown_rx))
            .map_err(|e| Error::AudioOutput(format!("Failed to spawn device thread: {}", e)))?;

        let (producer, info) = match ready_rx.recv() {
            Ok(Ok(opened)) => opened,
            Ok(Err(e)) => {
                let _ = thread.join();
                return Err(e);
            }
            Err(_) => {
                let _ = thread.join();
                return Err(Error::AudioOutput("device thread exited during setup".to_string()));
            }
        };

        let resampler = if info.sample_rate != format.sample_rate_hz {
            Some(StreamResampler::new(
                format.sample_rate_hz,
                info.sample_rate,
                info.channels,
            )?)
        } else {
            None
        };

        info!(
            "cpal sink on '{}': {} Hz {} ch {:?} (track {} Hz {} ch {}, buffer {} bytes)",
            info.device_name,
            info.sample_rate,
            info.channels,
            info.sample_format,
            format.sample_rate_hz,
            format.channel_count,
            format.pcm_encoding,
            min_buffer_bytes(format, self.buffer_ms)
        );

        self.active = Some(ActiveOutput {
            format: format.clone(),
            info,
            producer,
            error_flag,
            shutdown_tx,
            thread: Some(thread),
            resampler,
            carry: Vec::new(),
        });
        Ok(())
    }

    fn write(&mut self, pcm: &[u8]) -> Result<usize> {
        let buffer_ms = self.buffer_ms;
        let active = self
            .active
            .as_mut()
            .ok_or_else(|| Error::InvalidState("cpal sink not configured".to_string()))?;

        let frame_bytes = active.format.bytes_per_frame();
        let input: &[u8] = if active.carry.is_empty() {
            pcm
        } else {
            active.carry.extend_from_slice(pcm);
            &active.carry
        };
        let whole = input.len() / frame_bytes * frame_bytes;

        self.decoded.clear();
        decode_to_f32(&input[..whole], active.format.pcm_encoding, &mut self.decoded);
        let remainder = input[whole..].to_vec();
        active.carry = remainder;

        self.mapped.clear();
        remap_channels(
            &self.decoded,
            active.format.channel_count,
            active.info.channels,
            &mut self.mapped,
        );

        let samples = match active.resampler.as_mut() {
            Some(resampler) => {
                self.resampled.clear();
                resampler.process(&self.mapped, &mut self.resampled)?;
                &self.resampled
            }
            None => &self.mapped,
        };

        Self::push_blocking(active, samples, buffer_ms)?;
        Ok(pcm.len())
    }

    fn flush(&mut self) -> Result<()> {
        let Some(active) = self.active.as_mut() else {
            return Ok(());
        };
        active.carry.clear();
        if let Some(resampler) = active.resampler.as_mut() {
            resampler.reset();
        }

        let request = active.producer.request_flush();
        let started = Instant::now();
        while !active.producer.flush_completed(request) {
            if started.elapsed() > FLUSH_ACK_TIMEOUT {
                warn!("Output callback did not acknowledge flush within {:?}", FLUSH_ACK_TIMEOUT);
                break;
            }
            std::thread::sleep(Duration::from_millis(1));
        }
        debug!("cpal sink flushed");
        Ok(())
    }

    fn drain(&mut self) -> Result<()> {
        let Some(active) = self.active.as_mut() else {
            return Ok(());
        };
        // The ring never holds more than buffer_ms of audio
        let limit = Duration::from_millis(self.buffer_ms as u64) + FLUSH_ACK_TIMEOUT;
        let started = Instant::now();
        while active.producer.stats().occupied > 0 {
            if active.error_flag.load(Ordering::SeqCst) {
                return Err(Error::AudioOutput("output stream reported an error".to_string()));
            }
            if started.elapsed() > limit {
                warn!("Output did not drain within {:?}", limit);
                break;
            }
            std::thread::sleep(Duration::from_millis(1));
        }
        debug!("cpal sink drained in {:?}", started.elapsed());
        Ok(())
    }

    fn release(&mut self) {
        let Some(mut active) = self.active.take() else {
            return;
        };
        let stats = active.producer.stats();
        let _ = active.shutdown_tx.send(());
        if let Some(thread) = active.thread.take() {
            if thread.join().is_err() {
                error!("cpal device thread panicked");
            }
        }
        info!(
            "cpal sink released ({} underruns)",
            stats.underruns
        );
    }

    fn name(&self) -> &str {
        "cpal"
    }
}

impl Drop for CpalSink {
    fn drop(&mut self) {
        self.release();
    }
}

struct DeviceRequest {
    device_name: Option<String>,
    format: TrackFormat,
    buffer_ms: u32,
    error_flag: Arc<AtomicBool>,
}

fn run_device_thread(
    request: DeviceRequest,
    ready: mpsc::SyncSender<Result<(SampleProducer, DeviceInfo)>>,
    shutdown: mpsc::Receiver<()>,
) {
    match open_stream(&request) {
        Ok((stream, producer, info)) => {
            if ready.send(Ok((producer, info))).is_err() {
                return;
            }
            // Returns on shutdown message or when the sink is dropped
            let _ = shutdown.recv();
            if let Err(e) = stream.pause() {
                debug!("Failed to pause stream on shutdown: {}", e);
            }
        }
        Err(e) => {
            let _ = ready.send(Err(e));
        }
    }
}

fn open_stream(request: &DeviceRequest) -> Result<(Stream, SampleProducer, DeviceInfo)> {
    let device = select_device(request.device_name.as_deref())?;
    let device_name = device.name().unwrap_or_else(|_| "Unknown".to_string());
    let (config, sample_format) = select_config(&device, &request.format)?;

    let frames = (config.sample_rate.0 as u64 * request.buffer_ms as u64 / 1000).max(256);
    let (producer, consumer) = sample_ring(frames as usize * config.channels as usize);

    let stream = match sample_format {
        SampleFormat::F32 => build_stream::<f32>(&device, &config, consumer, &request.error_flag)?,
        SampleFormat::I16 => build_stream::<i16>(&device, &config, consumer, &request.error_flag)?,
        SampleFormat::U16 => build_stream::<u16>(&device, &config, consumer, &request.error_flag)?,
        other => {
            return Err(Error::AudioOutput(format!(
                "Unsupported sample format: {:?}",
                other
            )))
        }
    };
    stream
        .play()
        .map_err(|e| Error::AudioOutput(format!("Failed to start stream: {}", e)))?;

    let info = DeviceInfo {
        device_name,
        sample_rate: config.sample_rate.0,
        channels: config.channels,
        sample_format,
    };
    Ok((stream, producer, info))
}

fn select_device(name: Option<&str>) -> Result<Device> {
    let host = cpal::default_host();

    if let Some(name) = name {
        let mut devices = host
            .output_devices()
            .map_err(|e| Error::AudioOutput(format!("Failed to enumerate devices: {}", e)))?;
        if let Some(device) = devices.find(|d| d.name().ok().as_deref() == Some(name)) {
            info!("Found requested audio device: {}", name);
            return Ok(device);
        }
        warn!("Requested device '{}' not found, falling back to default device", name);
    }

    host.default_output_device()
        .ok_or_else(|| Error::AudioOutput("No default output device found".to_string()))
}

/// Pick a stream config for `format`: same channels and rate if the device
/// supports it, else stereo at that rate, else the device default.
fn select_config(device: &Device, format: &TrackFormat) -> Result<(StreamConfig, SampleFormat)> {
    let rate = cpal::SampleRate(format.sample_rate_hz);
    let ranges: Vec<_> = device
        .supported_output_configs()
        .map_err(|e| Error::AudioOutput(format!("Failed to get device configs: {}", e)))?
        .filter(|c| {
            matches!(
                c.sample_format(),
                SampleFormat::F32 | SampleFormat::I16 | SampleFormat::U16
            )
        })
        .collect();

    let fits = |channels: u16, sample_format: SampleFormat| {
        ranges.iter().find(|c| {
            c.channels() == channels
                && c.sample_format() == sample_format
                && c.min_sample_rate() <= rate
                && c.max_sample_rate() >= rate
        })
    };

    for channels in [format.channel_count, 2] {
        for sample_format in [SampleFormat::F32, SampleFormat::I16, SampleFormat::U16] {
            if let Some(range) = fits(channels, sample_format) {
                let config = range.clone().with_sample_rate(rate);
                return Ok((config.config(), config.sample_format()));
            }
        }
    }

    let fallback = device
        .default_output_config()
        .map_err(|e| Error::AudioOutput(format!("Failed to get default config: {}", e)))?;
    debug!(
        "No native config for {} Hz {} ch, using device default {:?}",
        format.sample_rate_hz,
        format.channel_count,
        fallback
    );
    Ok((fallback.config(), fallback.sample_format()))
}

fn build_stream<T>(
    device: &Device,
    config: &StreamConfig,
    mut consumer: SampleConsumer,
    error_flag: &Arc<AtomicBool>,
) -> Result<Stream>
where
    T: SizedSample + cpal::FromSample<f32>,
{
    let error_flag = Arc::clone(error_flag);
    device
        .build_output_stream(
            config,
            move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
                consumer.fill(data, |s| T::from_sample(s.clamp(-1.0, 1.0)));
            },
            move |err| {
                error!("Audio stream error: {}", err);
                error_flag.store(true, Ordering::SeqCst);
            },
            None,
        )
        .map_err(|e| Error::AudioOutput(format!("Failed to build stream: {}", e)))
}
