//! Decoder buffer tokens
//!
//! A decoder lends out its slots as move-only tokens. Handing a slot back
//! (`Decoder::submit_input_buffer`, `Decoder::release_output_buffer`)
//! consumes the token, so a slot cannot be returned twice, and the caller
//! cannot keep a view into a slot after giving it back.
//!
//! Each token records the decoder generation it was issued in. A flush
//! starts a new generation; tokens from an older one are discarded on
//! return instead of corrupting the refilled pool.

use super::format::TrackFormat;

/// An empty compressed-input slot, owned by the caller until submitted
#[derive(Debug)]
#[must_use = "input buffers must be submitted back to the decoder"]
pub struct InputBuffer {
    index: usize,
    generation: u64,
    data: Vec<u8>,
}

impl InputBuffer {
    pub fn new(index: usize, generation: u64, data: Vec<u8>) -> Self {
        Self {
            index,
            generation,
            data,
        }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    /// Writable view handed to `Demuxer::extract`
    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.data
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    /// Decompose into (index, generation, storage); used by decoders on submit
    pub fn into_parts(self) -> (usize, u64, Vec<u8>) {
        (self.index, self.generation, self.data)
    }
}

/// A filled PCM output slot, owned by the caller until released
#[derive(Debug)]
#[must_use = "output buffers must be released back to the decoder"]
pub struct OutputBuffer {
    index: usize,
    generation: u64,
    data: Vec<u8>,
    size: usize,
    presentation_time_micros: i64,
    end_of_stream: bool,
}

impl OutputBuffer {
    /// `size` is clamped to the storage length
    pub fn new(
        index: usize,
        generation: u64,
        data: Vec<u8>,
        size: usize,
        presentation_time_micros: i64,
        end_of_stream: bool,
    ) -> Self {
        let size = size.min(data.len());
        Self {
            index,
            generation,
            data,
            size,
            presentation_time_micros,
            end_of_stream,
        }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Valid PCM bytes
    pub fn bytes(&self) -> &[u8] {
        &self.data[..self.size]
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn presentation_time_micros(&self) -> i64 {
        self.presentation_time_micros
    }

    pub fn is_end_of_stream(&self) -> bool {
        self.end_of_stream
    }

    pub fn into_parts(self) -> (usize, u64, Vec<u8>) {
        (self.index, self.generation, self.data)
    }
}

/// One `Decoder::acquire_output_buffer` outcome
#[derive(Debug)]
pub enum DequeuedOutput {
    /// Decoded PCM (possibly empty when it only carries end-of-stream)
    Buffer(OutputBuffer),
    /// The output format changed; no data this time
    FormatChanged(TrackFormat),
    /// Nothing ready yet
    TryAgainLater,
}
