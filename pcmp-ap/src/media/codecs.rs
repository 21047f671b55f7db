//! Codec registry and codec identifier mapping
//!
//! Container tracks are matched by MIME-like codec identifiers
//! (`audio/mpeg`, `audio/flac`, ...), so selection by a family prefix such
//! as `audio/` works independently of the container.

use super::format::{PcmEncoding, RAW_AUDIO_CODEC_ID};
use std::sync::OnceLock;
use symphonia::core::codecs::{
    CodecRegistry, CodecType, CODEC_TYPE_AAC, CODEC_TYPE_ADPCM_IMA_WAV, CODEC_TYPE_ADPCM_MS,
    CODEC_TYPE_ALAC, CODEC_TYPE_FLAC, CODEC_TYPE_MP1, CODEC_TYPE_MP2, CODEC_TYPE_MP3,
    CODEC_TYPE_NULL, CODEC_TYPE_OPUS, CODEC_TYPE_PCM_ALAW, CODEC_TYPE_PCM_F32BE,
    CODEC_TYPE_PCM_F32LE, CODEC_TYPE_PCM_F64BE, CODEC_TYPE_PCM_F64LE, CODEC_TYPE_PCM_MULAW,
    CODEC_TYPE_PCM_S16BE, CODEC_TYPE_PCM_S16LE, CODEC_TYPE_PCM_S24BE, CODEC_TYPE_PCM_S24LE,
    CODEC_TYPE_PCM_S32BE, CODEC_TYPE_PCM_S32LE, CODEC_TYPE_PCM_S8, CODEC_TYPE_PCM_U8,
    CODEC_TYPE_VORBIS,
};

/// Process-wide codec registry
pub fn codec_registry() -> &'static CodecRegistry {
    static CODEC_REGISTRY: OnceLock<CodecRegistry> = OnceLock::new();
    CODEC_REGISTRY.get_or_init(|| {
        let mut registry = CodecRegistry::new();
        registry.register_all::<symphonia::default::codecs::MpaDecoder>();
        registry.register_all::<symphonia::default::codecs::PcmDecoder>();
        registry.register_all::<symphonia::default::codecs::VorbisDecoder>();
        registry.register_all::<symphonia::default::codecs::FlacDecoder>();
        registry.register_all::<symphonia::default::codecs::AdpcmDecoder>();
        registry.register_all::<symphonia::default::codecs::AacDecoder>();
        registry
    })
}

const PCM_CODECS: &[CodecType] = &[
    CODEC_TYPE_PCM_S16LE,
    CODEC_TYPE_PCM_S16BE,
    CODEC_TYPE_PCM_S24LE,
    CODEC_TYPE_PCM_S24BE,
    CODEC_TYPE_PCM_S32LE,
    CODEC_TYPE_PCM_S32BE,
    CODEC_TYPE_PCM_U8,
    CODEC_TYPE_PCM_S8,
    CODEC_TYPE_PCM_F32LE,
    CODEC_TYPE_PCM_F32BE,
    CODEC_TYPE_PCM_F64LE,
    CODEC_TYPE_PCM_F64BE,
    CODEC_TYPE_PCM_ALAW,
    CODEC_TYPE_PCM_MULAW,
];

/// Codec identifier for a container codec, or `None` when the track has none
pub fn codec_id_for(codec: CodecType) -> Option<String> {
    if codec == CODEC_TYPE_NULL {
        return None;
    }
    if PCM_CODECS.contains(&codec) {
        return Some(RAW_AUDIO_CODEC_ID.to_string());
    }

    let known = match codec {
        c if c == CODEC_TYPE_MP3 || c == CODEC_TYPE_MP2 || c == CODEC_TYPE_MP1 => "audio/mpeg",
        c if c == CODEC_TYPE_FLAC => "audio/flac",
        c if c == CODEC_TYPE_AAC => "audio/mp4a-latm",
        c if c == CODEC_TYPE_VORBIS => "audio/vorbis",
        c if c == CODEC_TYPE_OPUS => "audio/opus",
        c if c == CODEC_TYPE_ALAC => "audio/alac",
        c if c == CODEC_TYPE_ADPCM_IMA_WAV || c == CODEC_TYPE_ADPCM_MS => "audio/adpcm",
        _ => "",
    };
    if !known.is_empty() {
        return Some(known.to_string());
    }

    // Registered but unnamed above: derive from the decoder's short name.
    codec_registry()
        .get_codec(codec)
        .map(|descriptor| format!("audio/x-{}", descriptor.short_name))
}

/// Nominal PCM encoding a track decodes to before any output conversion
pub fn nominal_encoding(codec: CodecType) -> PcmEncoding {
    match codec {
        c if c == CODEC_TYPE_PCM_U8 || c == CODEC_TYPE_PCM_S8 => PcmEncoding::Pcm8,
        c if c == CODEC_TYPE_PCM_S24LE || c == CODEC_TYPE_PCM_S24BE => PcmEncoding::Pcm24Packed,
        c if c == CODEC_TYPE_PCM_S32LE || c == CODEC_TYPE_PCM_S32BE => PcmEncoding::Pcm32,
        c if c == CODEC_TYPE_PCM_F32LE
            || c == CODEC_TYPE_PCM_F32BE
            || c == CODEC_TYPE_PCM_F64LE
            || c == CODEC_TYPE_PCM_F64BE =>
        {
            PcmEncoding::Float
        }
        _ => PcmEncoding::Pcm16,
    }
}

/// True when a decoder is registered for `codec`
pub fn is_supported(codec: CodecType) -> bool {
    codec_registry().get_codec(codec).is_some()
}
