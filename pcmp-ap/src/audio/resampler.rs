//! Streaming sample-rate conversion using rubato
//!
//! Used by the platform sink when the output device cannot run at the
//! track's rate. Input arrives in arbitrary-sized writes; rubato wants fixed
//! chunks, so leftover frames are carried to the next call.

use crate::error::{Error, Result};
use rubato::{FastFixedIn, PolynomialDegree, Resampler as RubatoResampler};
use tracing::debug;

/// Input frames per rubato call
const CHUNK_FRAMES: usize = 1024;

/// Fixed-ratio resampler over interleaved f32 audio
pub struct StreamResampler {
    resampler: FastFixedIn<f32>,
    channels: usize,
    /// Planar input waiting for a full chunk
    pending: Vec<Vec<f32>>,
}

impl StreamResampler {
    pub fn new(input_rate: u32, output_rate: u32, channels: u16) -> Result<Self> {
        debug!(
            "Resampling from {}Hz to {}Hz ({} channels)",
            input_rate, output_rate, channels
        );
        let channels = channels.max(1) as usize;
        let resampler = FastFixedIn::<f32>::new(
            output_rate as f64 / input_rate as f64,
            1.0,
            PolynomialDegree::Septic,
            CHUNK_FRAMES,
            channels,
        )
        .map_err(|e| Error::AudioOutput(format!("Failed to create resampler: {}", e)))?;

        Ok(Self {
            resampler,
            channels,
            pending: vec![Vec::with_capacity(CHUNK_FRAMES * 2); channels],
        })
    }

    /// Resample `input` and append the converted frames to `out`.
    pub fn process(&mut self, input: &[f32], out: &mut Vec<f32>) -> Result<()> {
        for frame in input.chunks_exact(self.channels) {
            for (ch, sample) in frame.iter().enumerate() {
                self.pending[ch].push(*sample);
            }
        }

        loop {
            let needed = self.resampler.input_frames_next();
            if self.pending[0].len() < needed {
                return Ok(());
            }

            let chunk: Vec<&[f32]> = self.pending.iter().map(|c| &c[..needed]).collect();
            let planar = self
                .resampler
                .process(&chunk, None)
                .map_err(|e| Error::AudioOutput(format!("Resampling failed: {}", e)))?;
            for channel in self.pending.iter_mut() {
                channel.drain(..needed);
            }

            let frames = planar.first().map_or(0, Vec::len);
            out.reserve(frames * self.channels);
            for i in 0..frames {
                for channel in &planar {
                    out.push(channel[i]);
                }
            }
        }
    }

    /// Drop carried input and filter state (after a flush)
    pub fn reset(&mut self) {
        self.resampler.reset();
        for channel in self.pending.iter_mut() {
            channel.clear();
        }
    }
}
