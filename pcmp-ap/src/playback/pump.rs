//! The decode loop body: feed the decoder, drain it to the sink
//!
//! Two end-of-stream flags are tracked independently. `input_eos` is set
//! when the demuxer runs dry and the decoder has been told so; `output_eos`
//! is set when the decoder hands back its flagged last buffer. Only when
//! both are set has the track finished: everything the demuxer produced has
//! reached the sink.

use super::pipeline::{Pipeline, RestartOutcome};
use super::state::PlaybackClock;
use crate::error::{Error, Result};
use crate::media::DequeuedOutput;
use tracing::{debug, info, trace};

/// Callback invoked when a track finishes; prepares what plays next
pub type RestartFn<'a> = dyn FnMut(&mut Pipeline) -> Result<RestartOutcome> + 'a;

/// Outcome of one pump iteration
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    /// Data moved through at least one phase
    Continue,
    /// Neither phase had anything to do
    Idle,
    /// Both streams ended and the restart callback ran
    TrackRestarted(RestartOutcome),
}

/// Pump state for one controller
#[derive(Debug)]
pub struct Pump {
    input_eos: bool,
    output_eos: bool,
    stall_threshold: u32,
    empty_drains: u32,
}

impl Pump {
    /// `stall_threshold` consecutive output-less drains fail the track; 0 disables
    pub fn new(stall_threshold: u32) -> Self {
        Self {
            input_eos: false,
            output_eos: false,
            stall_threshold,
            empty_drains: 0,
        }
    }

    pub fn input_eos(&self) -> bool {
        self.input_eos
    }

    pub fn output_eos(&self) -> bool {
        self.output_eos
    }

    /// Forget both end-of-stream flags (track restart or seek)
    pub fn reset(&mut self) {
        self.input_eos = false;
        self.output_eos = false;
        self.empty_drains = 0;
    }

    /// Run one feed phase and one drain phase.
    ///
    /// When both streams have ended, `restart` is called with the pipeline,
    /// then the flags are cleared and the position set to 0.
    pub fn step(
        &mut self,
        pipeline: &mut Pipeline,
        clock: &PlaybackClock,
        restart: &mut RestartFn<'_>,
    ) -> Result<Step> {
        let fed = self.feed(pipeline)?;
        let drained = self.drain(pipeline, clock)?;

        if self.input_eos && self.output_eos {
            info!(
                "Track '{}' finished at {}",
                pipeline.track(),
                pcmp_common::time::format_position(clock.position_micros())
            );
            let outcome = restart(pipeline)?;
            self.reset();
            clock.set_position_micros(0);
            return Ok(Step::TrackRestarted(outcome));
        }

        Ok(if fed || drained { Step::Continue } else { Step::Idle })
    }

    fn feed(&mut self, pipeline: &mut Pipeline) -> Result<bool> {
        if self.input_eos {
            return Ok(false);
        }
        let Some(mut buffer) = pipeline.decoder.acquire_input_buffer()? else {
            return Ok(false);
        };

        let extracted = match pipeline.demuxer.extract(buffer.as_mut_slice()) {
            Ok(extracted) => extracted,
            Err(e) => {
                // Hand the slot back empty before failing the track
                let _ = pipeline.decoder.submit_input_buffer(buffer, 0, 0, 0, false);
                return Err(e);
            }
        };
        if extracted.is_end_of_stream() {
            self.input_eos = true;
            debug!("Input end of stream, signalling decoder");
            pipeline.decoder.submit_input_buffer(
                buffer,
                0,
                0,
                extracted.presentation_time_micros,
                true,
            )?;
        } else {
            trace!(
                "Feeding {} bytes at {} µs",
                extracted.sample_size,
                extracted.presentation_time_micros
            );
            pipeline.decoder.submit_input_buffer(
                buffer,
                0,
                extracted.sample_size as usize,
                extracted.presentation_time_micros,
                false,
            )?;
        }
        Ok(true)
    }

    fn drain(&mut self, pipeline: &mut Pipeline, clock: &PlaybackClock) -> Result<bool> {
        if self.output_eos {
            return Ok(false);
        }

        match pipeline.decoder.acquire_output_buffer()? {
            DequeuedOutput::Buffer(buffer) => {
                self.empty_drains = 0;
                let size = buffer.size();
                let pts = buffer.presentation_time_micros();
                let end_of_stream = buffer.is_end_of_stream();

                if size > 0 {
                    if let Err(e) = pipeline.sink.write(buffer.bytes()) {
                        // Hand the slot back before failing the track
                        let _ = pipeline.decoder.release_output_buffer(buffer, false);
                        return Err(e);
                    }
                }
                pipeline.decoder.release_output_buffer(buffer, false)?;

                if size > 0 {
                    clock.set_position_micros(pts);
                }
                if end_of_stream {
                    self.output_eos = true;
                    debug!("Output end of stream");
                }
                Ok(true)
            }
            DequeuedOutput::FormatChanged(format) => {
                self.count_empty_drain()?;
                if !format.same_pcm_layout(&pipeline.output_format) {
                    info!(
                        "Decoder output changed to {} Hz {} ch {}, reconfiguring sink",
                        format.sample_rate_hz, format.channel_count, format.pcm_encoding
                    );
                    pipeline.sink.configure(&format)?;
                }
                pipeline.output_format = format;
                Ok(true)
            }
            DequeuedOutput::TryAgainLater => {
                self.count_empty_drain()?;
                Ok(false)
            }
        }
    }

    fn count_empty_drain(&mut self) -> Result<()> {
        self.empty_drains += 1;
        if self.stall_threshold > 0 && self.empty_drains >= self.stall_threshold {
            return Err(Error::DecoderStall {
                iterations: self.empty_drains,
            });
        }
        Ok(())
    }
}
