//! Demuxer backed by a symphonia `FormatReader`

use super::codecs::{codec_id_for, nominal_encoding};
use super::demuxer::Demuxer;
use super::format::{ExtractionResult, TrackFormat};
use super::source::SourceDescriptor;
use crate::error::{Error, Result};
use pcmp_common::time::{frames_to_micros, MICROS_PER_SECOND};
use symphonia::core::errors::{Error as SymphoniaError, SeekErrorKind};
use symphonia::core::formats::{FormatOptions, FormatReader, Packet, SeekMode, SeekTo};
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use symphonia::core::units::{Time, TimeBase};
use tracing::{debug, info, warn};

/// Container reader for the formats symphonia probes (WAV, FLAC, MP3, OGG, MP4/M4A, MKV)
pub struct SymphoniaDemuxer {
    reader: Option<Box<dyn FormatReader>>,
    track_id: u32,
    time_base: Option<TimeBase>,
    sample_rate: u32,
    duration_micros: i64,
    /// Packet read but not yet delivered (destination was too small)
    pending: Option<Packet>,
    /// Set when a seek landed past the last packet
    at_end: bool,
    released: bool,
}

impl SymphoniaDemuxer {
    pub fn new() -> Self {
        Self {
            reader: None,
            track_id: 0,
            time_base: None,
            sample_rate: 0,
            duration_micros: 0,
            pending: None,
            at_end: false,
            released: false,
        }
    }

    fn reader_mut(&mut self) -> Result<&mut Box<dyn FormatReader>> {
        if self.released {
            return Err(Error::InvalidState("demuxer already released".to_string()));
        }
        self.reader
            .as_mut()
            .ok_or_else(|| Error::InvalidState("demuxer not configured".to_string()))
    }

    fn ts_to_micros(&self, ts: u64) -> i64 {
        match self.time_base {
            Some(tb) => time_to_micros(tb.calc_time(ts)),
            None => frames_to_micros(ts, self.sample_rate),
        }
    }

    /// Next packet of the selected track, or `None` at end of stream
    fn next_track_packet(&mut self) -> Result<Option<Packet>> {
        let track_id = self.track_id;
        let reader = self.reader_mut()?;
        loop {
            match reader.next_packet() {
                Ok(packet) if packet.track_id() == track_id => return Ok(Some(packet)),
                Ok(_) => continue,
                Err(SymphoniaError::IoError(ref e))
                    if e.kind() == std::io::ErrorKind::UnexpectedEof =>
                {
                    return Ok(None);
                }
                Err(SymphoniaError::ResetRequired) => {
                    warn!("Container requested a decoder reset; treating as end of track");
                    return Ok(None);
                }
                Err(e) => return Err(Error::Demux(format!("Failed to read packet: {}", e))),
            }
        }
    }
}

impl Default for SymphoniaDemuxer {
    fn default() -> Self {
        Self::new()
    }
}

fn time_to_micros(time: Time) -> i64 {
    time.seconds as i64 * MICROS_PER_SECOND + (time.frac * MICROS_PER_SECOND as f64).round() as i64
}

fn micros_to_time(micros: i64) -> Time {
    let micros = micros.max(0);
    Time {
        seconds: (micros / MICROS_PER_SECOND) as u64,
        frac: (micros % MICROS_PER_SECOND) as f64 / MICROS_PER_SECOND as f64,
    }
}

impl Demuxer for SymphoniaDemuxer {
    fn configure(&mut self, source: SourceDescriptor, mime_prefix: &str) -> Result<TrackFormat> {
        if self.released {
            return Err(Error::InvalidState("demuxer already released".to_string()));
        }

        let mut hint = Hint::new();
        if let Some(extension) = &source.extension {
            hint.with_extension(extension);
        }

        let mss = MediaSourceStream::new(source.stream, Default::default());
        let probed = symphonia::default::get_probe()
            .format(
                &hint,
                mss,
                &FormatOptions::default(),
                &MetadataOptions::default(),
            )
            .map_err(|e| Error::Demux(format!("Failed to probe {}: {}", source.name, e)))?;
        let reader = probed.format;

        let mut any_codec = false;
        let mut selected = None;
        for track in reader.tracks() {
            let Some(codec_id) = codec_id_for(track.codec_params.codec) else {
                continue;
            };
            any_codec = true;
            if codec_id.starts_with(mime_prefix) {
                selected = Some((track.id, codec_id, track.codec_params.clone()));
                break;
            }
        }

        let Some((track_id, codec_id, params)) = selected else {
            return Err(if any_codec || reader.tracks().is_empty() {
                Error::NoMatchingTrack {
                    prefix: mime_prefix.to_string(),
                }
            } else {
                Error::MissingCodecId(source.name.clone())
            });
        };

        let sample_rate = params.sample_rate.ok_or_else(|| {
            Error::Config(format!("{}: track {} has no sample rate", source.name, track_id))
        })?;
        let channel_count = params.channels.map(|c| c.count() as u16).unwrap_or(0);
        if channel_count == 0 {
            return Err(Error::Config(format!(
                "{}: track {} has no channel layout",
                source.name, track_id
            )));
        }

        self.track_id = track_id;
        self.time_base = params.time_base;
        self.sample_rate = sample_rate;
        self.duration_micros = params
            .n_frames
            .map(|frames| match params.time_base {
                Some(tb) => time_to_micros(tb.calc_time(frames)),
                None => frames_to_micros(frames, sample_rate),
            })
            .unwrap_or(0);
        self.pending = None;
        self.at_end = false;
        self.reader = Some(reader);

        info!(
            "Selected track {} ({}) of {}: {} Hz, {} ch, {} us",
            track_id, codec_id, source.name, sample_rate, channel_count, self.duration_micros
        );

        Ok(TrackFormat {
            codec_id,
            sample_rate_hz: sample_rate,
            channel_count,
            duration_micros: self.duration_micros,
            pcm_encoding: nominal_encoding(params.codec),
            codec_parameters: Some(params),
        })
    }

    fn extract(&mut self, destination: &mut [u8]) -> Result<ExtractionResult> {
        if self.at_end {
            self.reader_mut()?;
            return Ok(ExtractionResult::end_of_stream());
        }

        let packet = match self.pending.take() {
            Some(packet) => packet,
            None => match self.next_track_packet()? {
                Some(packet) => packet,
                None => return Ok(ExtractionResult::end_of_stream()),
            },
        };

        let data = packet.buf();
        if data.len() > destination.len() {
            let len = data.len();
            self.pending = Some(packet);
            return Err(Error::Demux(format!(
                "sample of {} bytes exceeds input buffer capacity {}",
                len,
                destination.len()
            )));
        }

        destination[..data.len()].copy_from_slice(data);
        Ok(ExtractionResult::sample(data.len(), self.ts_to_micros(packet.ts())))
    }

    fn seek_to(&mut self, position_micros: i64) -> Result<()> {
        let mut target = position_micros.max(0);
        if self.duration_micros > 0 && target >= self.duration_micros {
            target = self.duration_micros - 1;
        }
        let track_id = self.track_id;
        let reader = self.reader_mut()?;

        let result = reader.seek(
            SeekMode::Coarse,
            SeekTo::Time {
                time: micros_to_time(target),
                track_id: Some(track_id),
            },
        );

        match result {
            Ok(seeked) => {
                let actual = seeked.actual_ts;
                self.pending = None;
                self.at_end = false;
                debug!(
                    "Seek to {} us landed at {} us",
                    position_micros,
                    self.ts_to_micros(actual)
                );
                Ok(())
            }
            Err(SymphoniaError::SeekError(SeekErrorKind::OutOfRange)) => {
                debug!("Seek to {} us is past the last sample", position_micros);
                self.pending = None;
                self.at_end = true;
                Ok(())
            }
            Err(e) => Err(Error::Demux(format!("Seek to {} us failed: {}", position_micros, e))),
        }
    }

    fn release(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        self.pending = None;
        self.reader = None;
        debug!("Demuxer released");
    }
}
