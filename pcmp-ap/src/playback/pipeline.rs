//! One prepared track: demuxer, decoder and sink wired for a single format

use crate::audio::{create_sink, Sink, SinkKind};
use crate::config::SinkSettings;
use crate::error::{Error, Result};
use crate::media::codecs::is_supported;
use crate::media::{
    Decoder, DecoderSettings, Demuxer, SourceDescriptor, SourceProvider, SymphoniaDecoder,
    SymphoniaDemuxer, TrackFormat,
};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Builds the collaborators of a pipeline.
///
/// The controller holds one factory for its lifetime; tests substitute
/// scripted collaborators here.
pub trait PipelineFactory: Send + Sync {
    /// Open the named track's byte stream
    fn open_source(&self, track: &str) -> Result<SourceDescriptor>;

    fn create_demuxer(&self) -> Box<dyn Demuxer>;

    /// Pick a decoder for the demuxer's track format
    fn create_decoder(&self, format: &TrackFormat) -> Result<Box<dyn Decoder>>;

    /// Fresh sink, used when no sink is carried over from a previous track
    fn create_sink(&self) -> Box<dyn Sink>;
}

/// Symphonia demuxer and decoder reading tracks through a source provider
pub struct DefaultPipelineFactory {
    sources: Arc<dyn SourceProvider>,
    decoder_settings: DecoderSettings,
    sink_kind: SinkKind,
    sink_settings: SinkSettings,
}

impl DefaultPipelineFactory {
    pub fn new(
        sources: Arc<dyn SourceProvider>,
        decoder_settings: DecoderSettings,
        sink_settings: SinkSettings,
    ) -> Self {
        Self {
            sources,
            decoder_settings,
            sink_kind: sink_settings.kind,
            sink_settings,
        }
    }
}

impl PipelineFactory for DefaultPipelineFactory {
    fn open_source(&self, track: &str) -> Result<SourceDescriptor> {
        self.sources.open(track)
    }

    fn create_demuxer(&self) -> Box<dyn Demuxer> {
        Box::new(SymphoniaDemuxer::new())
    }

    fn create_decoder(&self, format: &TrackFormat) -> Result<Box<dyn Decoder>> {
        if let Some(params) = &format.codec_parameters {
            if !is_supported(params.codec) {
                return Err(Error::UnsupportedCodec(format.codec_id.clone()));
            }
        }
        Ok(Box::new(SymphoniaDecoder::new(self.decoder_settings.clone())))
    }

    fn create_sink(&self) -> Box<dyn Sink> {
        create_sink(self.sink_kind, &self.sink_settings)
    }
}

/// What to do once a track has played to the end
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum NextTrack {
    /// Prepare the finished track again and keep playing
    #[default]
    Repeat,
    /// Prepare another track and keep playing
    Play(String),
    /// Prepare the finished track again, then stop
    Stop,
}

/// Result of a track-restart callback
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RestartOutcome {
    pub finished_track: String,
    /// Position of the last buffer handed to the sink
    pub final_position_micros: i64,
    pub next_track: String,
    /// Playback should stop instead of continuing with `next_track`
    pub stop: bool,
}

/// Configured collaborators for one track
pub struct Pipeline {
    track: String,
    pub(super) demuxer: Box<dyn Demuxer>,
    pub(super) decoder: Box<dyn Decoder>,
    pub(super) sink: Box<dyn Sink>,
    track_format: TrackFormat,
    pub(super) output_format: TrackFormat,
}

impl Pipeline {
    /// Open `track` and configure Demuxer → Decoder → Sink.
    ///
    /// `sink` is reused when given (it is configured again for the new
    /// format); otherwise the factory creates one. On failure everything
    /// opened so far is released.
    pub fn prepare(
        factory: &dyn PipelineFactory,
        track: &str,
        mime_prefix: &str,
        sink: Option<Box<dyn Sink>>,
    ) -> Result<Self> {
        let (mut demuxer, track_format, mut decoder, output_format) =
            open_chain(factory, track, mime_prefix)?;

        let mut sink = sink.unwrap_or_else(|| factory.create_sink());
        if let Err(e) = sink.configure(&output_format) {
            decoder.release();
            sink.release();
            demuxer.release();
            return Err(e);
        }

        info!(
            "Prepared '{}': {} {} Hz {} ch → {} sink ({})",
            track,
            track_format.codec_id,
            output_format.sample_rate_hz,
            output_format.channel_count,
            sink.name(),
            output_format.pcm_encoding
        );

        Ok(Self {
            track: track.to_string(),
            demuxer,
            decoder,
            sink,
            track_format,
            output_format,
        })
    }

    /// Replace the demuxer and decoder with ones for `track`, keeping the
    /// sink.
    ///
    /// The sink stays open when the new output has the same PCM layout, so
    /// the tail of the finished track keeps playing. Otherwise it is drained
    /// and reconfigured.
    pub fn restart_with(
        &mut self,
        factory: &dyn PipelineFactory,
        track: &str,
        mime_prefix: &str,
    ) -> Result<()> {
        self.decoder.release();
        self.demuxer.release();

        let (demuxer, track_format, decoder, output_format) =
            open_chain(factory, track, mime_prefix)?;
        self.demuxer = demuxer;
        self.decoder = decoder;
        if !output_format.same_pcm_layout(&self.output_format) {
            self.sink.drain()?;
            self.sink.configure(&output_format)?;
        }

        debug!("Restarted pipeline with '{}'", track);
        self.track = track.to_string();
        self.track_format = track_format;
        self.output_format = output_format;
        Ok(())
    }

    /// Flush sink and decoder, then move the demuxer to `position_micros`
    pub fn seek(&mut self, position_micros: i64) -> Result<()> {
        self.sink.flush()?;
        self.decoder.flush()?;
        self.demuxer.seek_to(position_micros)
    }

    /// Swap in `sink`, configured for the current output format.
    ///
    /// The old sink is released first. If the new one fails to configure,
    /// the old one is reopened and the error returned.
    pub fn replace_sink(&mut self, mut sink: Box<dyn Sink>) -> Result<()> {
        self.sink.release();
        if let Err(e) = sink.configure(&self.output_format) {
            sink.release();
            if let Err(reopen) = self.sink.configure(&self.output_format) {
                warn!("Failed to reopen {} sink: {}", self.sink.name(), reopen);
            }
            return Err(e);
        }
        info!("Sink switched from {} to {}", self.sink.name(), sink.name());
        self.sink = sink;
        Ok(())
    }

    /// Release decoder and demuxer, handing back the (released) sink
    pub fn into_sink(mut self) -> Box<dyn Sink> {
        self.decoder.release();
        self.demuxer.release();
        self.sink.release();
        self.sink
    }

    /// Release decoder, sink and demuxer, in that order. Idempotent.
    pub fn release(&mut self) {
        self.decoder.release();
        self.sink.release();
        self.demuxer.release();
    }

    pub fn track(&self) -> &str {
        &self.track
    }

    /// Format of the selected container track
    pub fn track_format(&self) -> &TrackFormat {
        &self.track_format
    }

    /// PCM format currently configured on the sink
    pub fn output_format(&self) -> &TrackFormat {
        &self.output_format
    }

    pub fn duration_micros(&self) -> i64 {
        self.track_format.duration_micros
    }

    pub fn sink_name(&self) -> &str {
        self.sink.name()
    }
}

type Chain = (Box<dyn Demuxer>, TrackFormat, Box<dyn Decoder>, TrackFormat);

fn open_chain(factory: &dyn PipelineFactory, track: &str, mime_prefix: &str) -> Result<Chain> {
    let source = factory.open_source(track)?;

    let mut demuxer = factory.create_demuxer();
    let track_format = match demuxer.configure(source, mime_prefix) {
        Ok(format) => format,
        Err(e) => {
            demuxer.release();
            return Err(e);
        }
    };

    let mut decoder = match factory.create_decoder(&track_format) {
        Ok(decoder) => decoder,
        Err(e) => {
            demuxer.release();
            return Err(e);
        }
    };
    let output_format = match decoder.configure(&track_format) {
        Ok(format) => format,
        Err(e) => {
            decoder.release();
            demuxer.release();
            return Err(e);
        }
    };

    Ok((demuxer, track_format, decoder, output_format))
}
