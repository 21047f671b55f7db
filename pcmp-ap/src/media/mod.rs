//! Compressed-media side of the pipeline
//!
//! Role traits for the two upstream collaborators (`Demuxer`, `Decoder`),
//! the value types exchanged between them, and their symphonia-backed
//! implementations.

pub mod buffer;
pub mod codecs;
pub mod decoder;
pub mod demuxer;
pub mod format;
pub mod source;
pub mod symphonia_decoder;
pub mod symphonia_demuxer;

pub use buffer::{DequeuedOutput, InputBuffer, OutputBuffer};
pub use decoder::{Decoder, DecoderSettings};
pub use demuxer::Demuxer;
pub use format::{ExtractionResult, PcmEncoding, TrackFormat, RAW_AUDIO_CODEC_ID};
pub use source::{FileSourceProvider, SourceDescriptor, SourceProvider};
pub use symphonia_decoder::SymphoniaDecoder;
pub use symphonia_demuxer::SymphoniaDemuxer;
