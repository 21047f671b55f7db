//! Sink over the native audio backend C ABI

use super::pcm::min_buffer_bytes;
use super::sink::Sink;
use crate::error::{Error, Result};
use crate::ffi::{self, NativeAudioApi, NativeStream};
use crate::media::TrackFormat;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Longest a write may go without the backend accepting any bytes
const WRITE_STALL_TIMEOUT: Duration = Duration::from_secs(2);

/// PCM sink writing to a native backend stream
pub struct NativeSink {
    api: &'static NativeAudioApi,
    buffer_ms: u32,
    stream: Option<NativeStream>,
}

impl NativeSink {
    pub fn new(api: &'static NativeAudioApi, buffer_ms: u32) -> Self {
        Self {
            api,
            buffer_ms,
            stream: None,
        }
    }

    /// Sink on the linked backend, or the null device without one
    pub fn with_default_backend(buffer_ms: u32) -> Self {
        Self::new(ffi::default_api(), buffer_ms)
    }
}

impl Sink for NativeSink {
    fn configure(&mut self, format: &TrackFormat) -> Result<()> {
        self.release();
        if !format.is_raw() {
            return Err(Error::Config(format!(
                "native sink needs raw PCM, got {}",
                format.codec_id
            )));
        }

        let encoding = format.pcm_encoding;
        let mut stream = NativeStream::open(
            self.api,
            format.channel_count,
            format.sample_rate_hz,
            encoding.bit_depth(),
            encoding.is_float(),
        )
        .ok_or_else(|| {
            Error::AudioOutput(format!(
                "native backend refused {} Hz {} ch {}",
                format.sample_rate_hz, format.channel_count, encoding
            ))
        })?;
        stream
            .start()
            .map_err(|code| Error::AudioOutput(format!("start failed: {}", code)))?;

        info!(
            "native sink opened: {} Hz {} ch {} (buffer {} bytes)",
            format.sample_rate_hz,
            format.channel_count,
            encoding,
            min_buffer_bytes(format, self.buffer_ms)
        );
        self.stream = Some(stream);
        Ok(())
    }

    fn write(&mut self, pcm: &[u8]) -> Result<usize> {
        let stream = self
            .stream
            .as_mut()
            .ok_or_else(|| Error::InvalidState("native sink not configured".to_string()))?;
        let backoff = Duration::from_millis((self.buffer_ms / 4).clamp(1, 20) as u64);

        let mut offset = 0;
        let mut last_progress = Instant::now();
        while offset < pcm.len() {
            let written = stream
                .write(&pcm[offset..])
                .map_err(|code| Error::AudioOutput(format!("write failed: {}", code)))?;
            if written > 0 {
                offset += written;
                last_progress = Instant::now();
                continue;
            }
            if last_progress.elapsed() > WRITE_STALL_TIMEOUT {
                return Err(Error::AudioOutput(
                    "native backend stopped accepting audio".to_string(),
                ));
            }
            std::thread::sleep(backoff);
        }
        Ok(offset)
    }

    fn flush(&mut self) -> Result<()> {
        if let Some(stream) = self.stream.as_mut() {
            stream
                .flush()
                .map_err(|code| Error::AudioOutput(format!("flush failed: {}", code)))?;
            debug!("native sink flushed");
        }
        Ok(())
    }

    fn release(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            if let Err(code) = stream.pause() {
                warn!("native pause on release failed: {}", code);
            }
            drop(stream);
            info!("native sink released");
        }
    }

    fn name(&self) -> &str {
        "native"
    }
}

impl Drop for NativeSink {
    fn drop(&mut self) {
        self.release();
    }
}
