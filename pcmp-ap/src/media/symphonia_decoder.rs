//! Decoder session backed by a symphonia codec
//!
//! Symphonia decodes synchronously, one packet per call. The session wraps
//! it in bounded input/output slot pools so callers see the same
//! acquire/submit/release exchange as with an asynchronous codec: input
//! slots are queued on submit and decoded lazily when an output slot is
//! requested. Acquisition therefore never waits.

use super::buffer::{DequeuedOutput, InputBuffer, OutputBuffer};
use super::codecs::codec_registry;
use super::decoder::{Decoder, DecoderSettings};
use super::format::{PcmEncoding, TrackFormat};
use crate::error::{Error, Result};
use std::collections::VecDeque;
use symphonia::core::audio::{SampleBuffer, SignalSpec};
use symphonia::core::codecs::{Decoder as CodecDecoder, DecoderOptions};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::Packet;
use symphonia::core::sample::Sample;
use tracing::{debug, trace, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SessionState {
    Unconfigured,
    Configured,
    Running,
    Released,
}

/// Fixed set of reusable byte slots addressed by index
struct SlotPool {
    storage: Vec<Option<Vec<u8>>>,
    free: VecDeque<usize>,
    slot_size: usize,
}

impl SlotPool {
    fn new(count: usize, slot_size: usize) -> Self {
        Self {
            storage: (0..count).map(|_| Some(vec![0u8; slot_size])).collect(),
            free: (0..count).collect(),
            slot_size,
        }
    }

    fn empty() -> Self {
        Self::new(0, 0)
    }

    fn take(&mut self) -> Option<(usize, Vec<u8>)> {
        let index = self.free.pop_front()?;
        let data = self.storage[index]
            .take()
            .unwrap_or_else(|| vec![0u8; self.slot_size]);
        Some((index, data))
    }

    fn put(&mut self, index: usize, data: Vec<u8>) {
        if let Some(slot) = self.storage.get_mut(index) {
            if slot.is_none() {
                *slot = Some(data);
                self.free.push_back(index);
            }
        }
    }

    /// Make every slot free again, replacing storage that is still lent out
    fn reset(&mut self) {
        for slot in self.storage.iter_mut().filter(|s| s.is_none()) {
            *slot = Some(vec![0u8; self.slot_size]);
        }
        self.free = (0..self.storage.len()).collect();
    }

    fn available(&self) -> usize {
        self.free.len()
    }
}

struct QueuedInput {
    index: usize,
    data: Vec<u8>,
    offset: usize,
    size: usize,
    presentation_time_micros: i64,
    end_of_stream: bool,
}

enum Decoded {
    Pcm {
        index: usize,
        data: Vec<u8>,
        rate: u32,
        channels: u16,
    },
    Nothing,
}

/// `Decoder` implementation over the symphonia codec registry
pub struct SymphoniaDecoder {
    settings: DecoderSettings,
    state: SessionState,
    codec: Option<Box<dyn CodecDecoder>>,
    generation: u64,
    inputs: SlotPool,
    outputs: SlotPool,
    queued: VecDeque<QueuedInput>,
    /// Decoded buffers held back behind a FormatChanged
    ready: VecDeque<OutputBuffer>,
    output_format: Option<TrackFormat>,
    format_change_pending: bool,
    input_eos_queued: bool,
    last_pts: i64,
    scratch_i16: Option<SampleBuffer<i16>>,
    scratch_f32: Option<SampleBuffer<f32>>,
    decode_errors: u64,
}

impl SymphoniaDecoder {
    pub fn new(settings: DecoderSettings) -> Self {
        Self {
            settings,
            state: SessionState::Unconfigured,
            codec: None,
            generation: 0,
            inputs: SlotPool::empty(),
            outputs: SlotPool::empty(),
            queued: VecDeque::new(),
            ready: VecDeque::new(),
            output_format: None,
            format_change_pending: false,
            input_eos_queued: false,
            last_pts: 0,
            scratch_i16: None,
            scratch_f32: None,
            decode_errors: 0,
        }
    }

    /// Packets skipped because the codec rejected them
    pub fn decode_errors(&self) -> u64 {
        self.decode_errors
    }

    pub fn available_input_buffers(&self) -> usize {
        self.inputs.available()
    }

    fn ensure_active(&self) -> Result<()> {
        match self.state {
            SessionState::Configured | SessionState::Running => Ok(()),
            SessionState::Unconfigured => {
                Err(Error::InvalidState("decoder not configured".to_string()))
            }
            SessionState::Released => {
                Err(Error::InvalidState("decoder already released".to_string()))
            }
        }
    }

    fn check_generation(&self, generation: u64, what: &str) -> Result<()> {
        if generation != self.generation {
            return Err(Error::InvalidState(format!(
                "{} buffer issued before the last flush (generation {} != {})",
                what, generation, self.generation
            )));
        }
        Ok(())
    }

    /// Run the codec over one queued input
    fn decode_input(&mut self, input: &QueuedInput) -> Result<Decoded> {
        if input.size == 0 {
            return Ok(Decoded::Nothing);
        }

        let codec = self
            .codec
            .as_mut()
            .ok_or_else(|| Error::InvalidState("decoder not configured".to_string()))?;

        let payload = &input.data[input.offset..input.offset + input.size];
        let ts = input.presentation_time_micros.max(0) as u64;
        let packet = Packet::new_from_slice(0, ts, 0, payload);

        let decoded = match codec.decode(&packet) {
            Ok(decoded) => decoded,
            Err(SymphoniaError::DecodeError(msg)) => {
                self.decode_errors += 1;
                warn!("Skipping undecodable packet at {} us: {}", input.presentation_time_micros, msg);
                return Ok(Decoded::Nothing);
            }
            Err(SymphoniaError::IoError(e)) => {
                self.decode_errors += 1;
                warn!("Skipping truncated packet at {} us: {}", input.presentation_time_micros, e);
                return Ok(Decoded::Nothing);
            }
            Err(SymphoniaError::ResetRequired) => {
                debug!("Codec requested reset");
                codec.reset();
                return Ok(Decoded::Nothing);
            }
            Err(e) => return Err(Error::Decode(e.to_string())),
        };

        let spec = *decoded.spec();
        let frames = decoded.frames();
        if frames == 0 {
            return Ok(Decoded::Nothing);
        }

        let (index, mut data) = self
            .outputs
            .take()
            .ok_or_else(|| Error::Internal("output slot vanished during decode".to_string()))?;
        data.clear();

        match self.settings.output_encoding {
            PcmEncoding::Float => {
                let scratch = scratch_for(&mut self.scratch_f32, decoded.capacity(), spec);
                scratch.copy_interleaved_ref(decoded);
                for sample in scratch.samples() {
                    data.extend_from_slice(&sample.to_le_bytes());
                }
            }
            PcmEncoding::Pcm16 => {
                let scratch = scratch_for(&mut self.scratch_i16, decoded.capacity(), spec);
                scratch.copy_interleaved_ref(decoded);
                for sample in scratch.samples() {
                    data.extend_from_slice(&sample.to_le_bytes());
                }
            }
            other => {
                self.outputs.put(index, data);
                return Err(Error::Config(format!("cannot decode to {}", other)));
            }
        }

        Ok(Decoded::Pcm {
            index,
            data,
            rate: spec.rate,
            channels: spec.channels.count() as u16,
        })
    }

    fn decode_next(&mut self) -> Result<DequeuedOutput> {
        if self.outputs.available() == 0 {
            return Ok(DequeuedOutput::TryAgainLater);
        }
        let Some(input) = self.queued.pop_front() else {
            return Ok(DequeuedOutput::TryAgainLater);
        };

        let decoded = self.decode_input(&input);
        let pts = input.presentation_time_micros;
        let end_of_stream = input.end_of_stream;
        self.inputs.put(input.index, input.data);

        match decoded? {
            Decoded::Pcm {
                index,
                data,
                rate,
                channels,
            } => {
                let size = data.len();
                let buffer = OutputBuffer::new(index, self.generation, data, size, pts, end_of_stream);
                self.last_pts = pts;

                if let Some(format) = self.output_format.as_mut() {
                    if format.sample_rate_hz != rate || format.channel_count != channels {
                        debug!(
                            "Decoded format changed: {} Hz {} ch -> {} Hz {} ch",
                            format.sample_rate_hz, format.channel_count, rate, channels
                        );
                        format.sample_rate_hz = rate;
                        format.channel_count = channels;
                        let announced = format.clone();
                        self.ready.push_back(buffer);
                        return Ok(DequeuedOutput::FormatChanged(announced));
                    }
                }
                Ok(DequeuedOutput::Buffer(buffer))
            }
            Decoded::Nothing if end_of_stream => {
                let (index, mut data) = self
                    .outputs
                    .take()
                    .ok_or_else(|| Error::Internal("no output slot for end of stream".to_string()))?;
                data.clear();
                Ok(DequeuedOutput::Buffer(OutputBuffer::new(
                    index,
                    self.generation,
                    data,
                    0,
                    self.last_pts,
                    true,
                )))
            }
            Decoded::Nothing => Ok(DequeuedOutput::TryAgainLater),
        }
    }
}

fn scratch_for<S: Sample>(
    slot: &mut Option<SampleBuffer<S>>,
    frames: usize,
    spec: SignalSpec,
) -> &mut SampleBuffer<S> {
    let needed = frames * spec.channels.count();
    if slot.as_ref().is_some_and(|b| b.capacity() < needed) {
        *slot = None;
    }
    slot.get_or_insert_with(|| SampleBuffer::new(frames as u64, spec))
}

impl Decoder for SymphoniaDecoder {
    fn configure(&mut self, format: &TrackFormat) -> Result<TrackFormat> {
        if self.state == SessionState::Released {
            return Err(Error::InvalidState("decoder already released".to_string()));
        }
        if !matches!(
            self.settings.output_encoding,
            PcmEncoding::Pcm16 | PcmEncoding::Float
        ) {
            return Err(Error::Config(format!(
                "decoder output must be pcm16 or float, got {}",
                self.settings.output_encoding
            )));
        }
        let params = format.codec_parameters.as_ref().ok_or_else(|| {
            Error::Config(format!("{} format carries no codec parameters", format.codec_id))
        })?;

        let codec = codec_registry()
            .make(params, &DecoderOptions::default())
            .map_err(|e| Error::UnsupportedCodec(format!("{}: {}", format.codec_id, e)))?;

        let output = TrackFormat::raw(
            format.sample_rate_hz,
            format.channel_count,
            self.settings.output_encoding,
        )
        .with_duration(format.duration_micros);

        self.codec = Some(codec);
        self.inputs = SlotPool::new(
            self.settings.input_buffer_count,
            self.settings.input_buffer_capacity,
        );
        self.outputs = SlotPool::new(self.settings.output_buffer_count, 0);
        self.queued.clear();
        self.ready.clear();
        self.generation = 0;
        self.input_eos_queued = false;
        self.last_pts = 0;
        self.output_format = Some(output.clone());
        self.format_change_pending = true;
        self.state = SessionState::Configured;

        debug!(
            "Decoder configured for {}: {} input x {} bytes, {} output, {}",
            format.codec_id,
            self.settings.input_buffer_count,
            self.settings.input_buffer_capacity,
            self.settings.output_buffer_count,
            self.settings.output_encoding
        );
        Ok(output)
    }

    fn acquire_input_buffer(&mut self) -> Result<Option<InputBuffer>> {
        self.ensure_active()?;
        if self.input_eos_queued {
            return Ok(None);
        }
        Ok(self
            .inputs
            .take()
            .map(|(index, data)| InputBuffer::new(index, self.generation, data)))
    }

    fn submit_input_buffer(
        &mut self,
        buffer: InputBuffer,
        offset: usize,
        size: usize,
        presentation_time_micros: i64,
        end_of_stream: bool,
    ) -> Result<()> {
        self.ensure_active()?;
        self.check_generation(buffer.generation(), "input")?;

        let (index, _, data) = buffer.into_parts();
        if offset.checked_add(size).map_or(true, |end| end > data.len()) {
            self.inputs.put(index, data);
            return Err(Error::Decode(format!(
                "input range {}+{} exceeds slot capacity",
                offset, size
            )));
        }

        trace!(
            "Queued input slot {} ({} bytes @ {} us{})",
            index,
            size,
            presentation_time_micros,
            if end_of_stream { ", EOS" } else { "" }
        );
        self.queued.push_back(QueuedInput {
            index,
            data,
            offset,
            size,
            presentation_time_micros,
            end_of_stream,
        });
        if end_of_stream {
            self.input_eos_queued = true;
        }
        self.state = SessionState::Running;
        Ok(())
    }

    fn acquire_output_buffer(&mut self) -> Result<DequeuedOutput> {
        self.ensure_active()?;
        if self.format_change_pending {
            self.format_change_pending = false;
            if let Some(format) = &self.output_format {
                return Ok(DequeuedOutput::FormatChanged(format.clone()));
            }
        }
        if let Some(buffer) = self.ready.pop_front() {
            return Ok(DequeuedOutput::Buffer(buffer));
        }
        self.decode_next()
    }

    fn release_output_buffer(&mut self, buffer: OutputBuffer, render: bool) -> Result<()> {
        self.ensure_active()?;
        self.check_generation(buffer.generation(), "output")?;
        if render {
            trace!("Render requested for output slot {}; PCM sessions have no surface", buffer.index());
        }
        let (index, _, data) = buffer.into_parts();
        self.outputs.put(index, data);
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        self.ensure_active()?;
        if let Some(codec) = self.codec.as_mut() {
            codec.reset();
        }
        self.generation += 1;
        for input in self.queued.drain(..) {
            self.inputs.put(input.index, input.data);
        }
        for buffer in self.ready.drain(..) {
            let (index, _, data) = buffer.into_parts();
            self.outputs.put(index, data);
        }
        self.inputs.reset();
        self.outputs.reset();
        self.input_eos_queued = false;
        self.state = SessionState::Running;
        debug!("Decoder flushed (generation {})", self.generation);
        Ok(())
    }

    fn release(&mut self) {
        if self.state == SessionState::Released {
            return;
        }
        self.state = SessionState::Released;
        self.codec = None;
        self.queued.clear();
        self.ready.clear();
        self.inputs = SlotPool::empty();
        self.outputs = SlotPool::empty();
        self.scratch_i16 = None;
        self.scratch_f32 = None;
        debug!("Decoder released ({} packets skipped)", self.decode_errors);
    }
}
