//! Configuration management for pcmp-ap
//!
//! # Settings Sources Priority
//!
//! 1. Command-line arguments (`--sink`, `--port`, ...)
//! 2. Environment variables (`PCMP_CONFIG`, `PCMP_MEDIA_ROOT`)
//! 3. TOML configuration file
//! 4. Built-in defaults (code constants)
//!
//! Every key is optional; an empty or absent file yields the defaults below.

use crate::audio::SinkKind;
use crate::error::{Error, Result};
use crate::media::PcmEncoding;
use pcmp_common::config::{load_toml, resolve_config_path};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

/// Environment variable naming the config file
pub const CONFIG_ENV_VAR: &str = "PCMP_CONFIG";

/// Environment variable naming the media root folder
pub const MEDIA_ROOT_ENV_VAR: &str = "PCMP_MEDIA_ROOT";

/// Config file name searched under the platform config directory
pub const CONFIG_FILE_NAME: &str = "pcmp-ap.toml";

/// Complete player configuration
#[derive(Debug, Clone, Deserialize, Default)]
pub struct PlayerConfig {
    /// Decode pipeline settings
    #[serde(default)]
    pub player: PipelineSettings,

    /// Output sink settings
    #[serde(default)]
    pub sink: SinkSettings,

    /// HTTP control API settings
    #[serde(default)]
    pub server: ServerSettings,

    /// Root folder relative track names resolve against
    #[serde(default)]
    pub media_root: Option<PathBuf>,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Decode pipeline settings (`[player]` table)
#[derive(Debug, Clone, Deserialize)]
pub struct PipelineSettings {
    /// Codec-family prefix a container track must match
    #[serde(default = "default_mime_prefix")]
    pub mime_prefix: String,

    /// Consecutive output-less drains before a track is failed; 0 disables
    #[serde(default = "default_stall_threshold")]
    pub stall_threshold: u32,

    /// Bounded wait for decoder buffer acquisition
    #[serde(default = "default_dequeue_timeout_ms")]
    pub dequeue_timeout_ms: u64,

    /// Decoder input slots
    #[serde(default = "default_input_buffer_count")]
    pub input_buffer_count: usize,

    /// Bytes per decoder input slot (largest compressed sample accepted)
    #[serde(default = "default_input_buffer_capacity")]
    pub input_buffer_capacity: usize,

    /// Decoder output slots
    #[serde(default = "default_output_buffer_count")]
    pub output_buffer_count: usize,

    /// PCM encoding the decoder emits
    #[serde(default)]
    pub output_encoding: PcmEncoding,
}

/// Output sink settings (`[sink]` table)
#[derive(Debug, Clone, Deserialize)]
pub struct SinkSettings {
    /// Which sink implementation to open
    #[serde(default)]
    pub kind: SinkKind,

    /// Output device name (platform sink only; default device if unset)
    #[serde(default)]
    pub device: Option<String>,

    /// Device buffer length in milliseconds
    #[serde(default = "default_buffer_ms")]
    pub buffer_ms: u32,
}

/// HTTP control API settings (`[server]` table)
#[derive(Debug, Clone, Deserialize)]
pub struct ServerSettings {
    /// Serve the control API at all
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Bind address
    #[serde(default = "default_bind")]
    pub bind: String,

    /// HTTP server port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Interval between PlaybackProgress events while playing
    #[serde(default = "default_progress_interval_ms")]
    pub progress_interval_ms: u64,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error), overridden by RUST_LOG
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_mime_prefix() -> String {
    "audio/".to_string()
}

fn default_stall_threshold() -> u32 {
    50
}

fn default_dequeue_timeout_ms() -> u64 {
    10
}

fn default_input_buffer_count() -> usize {
    4
}

fn default_input_buffer_capacity() -> usize {
    256 * 1024
}

fn default_output_buffer_count() -> usize {
    4
}

fn default_buffer_ms() -> u32 {
    100
}

fn default_true() -> bool {
    true
}

fn default_bind() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    5760
}

fn default_progress_interval_ms() -> u64 {
    1000
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            mime_prefix: default_mime_prefix(),
            stall_threshold: default_stall_threshold(),
            dequeue_timeout_ms: default_dequeue_timeout_ms(),
            input_buffer_count: default_input_buffer_count(),
            input_buffer_capacity: default_input_buffer_capacity(),
            output_buffer_count: default_output_buffer_count(),
            output_encoding: PcmEncoding::default(),
        }
    }
}

impl Default for SinkSettings {
    fn default() -> Self {
        Self {
            kind: SinkKind::default(),
            device: None,
            buffer_ms: default_buffer_ms(),
        }
    }
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            enabled: default_true(),
            bind: default_bind(),
            port: default_port(),
            progress_interval_ms: default_progress_interval_ms(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl PipelineSettings {
    /// Decoder dequeue timeout as a Duration
    pub fn dequeue_timeout(&self) -> Duration {
        Duration::from_millis(self.dequeue_timeout_ms)
    }
}

impl PlayerConfig {
    /// Locate and load the configuration file, then validate it.
    ///
    /// `cli_path` wins over `PCMP_CONFIG`, which wins over the platform
    /// config directory. No file anywhere means built-in defaults.
    pub fn load(cli_path: Option<&Path>) -> Result<Self> {
        let path = resolve_config_path(cli_path, CONFIG_ENV_VAR, CONFIG_FILE_NAME);
        if let Some(path) = &path {
            info!("Loading configuration from {}", path.display());
        }
        let config: PlayerConfig = load_toml(path.as_deref())?;
        config.validate()?;
        Ok(config)
    }

    /// Parse configuration from TOML text (used by tests and embedders)
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: PlayerConfig = toml::from_str(content)
            .map_err(|e| Error::Config(format!("Failed to parse configuration: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the pipeline cannot run with
    pub fn validate(&self) -> Result<()> {
        let p = &self.player;
        if p.mime_prefix.is_empty() {
            return Err(Error::Config("player.mime_prefix must not be empty".to_string()));
        }
        if p.input_buffer_count == 0 || p.output_buffer_count == 0 {
            return Err(Error::Config(
                "player.input_buffer_count and player.output_buffer_count must be at least 1"
                    .to_string(),
            ));
        }
        if p.input_buffer_capacity < 1024 {
            return Err(Error::Config(format!(
                "player.input_buffer_capacity {} is below the 1024 byte minimum",
                p.input_buffer_capacity
            )));
        }
        if p.dequeue_timeout_ms > 1000 {
            return Err(Error::Config(format!(
                "player.dequeue_timeout_ms {} exceeds 1000",
                p.dequeue_timeout_ms
            )));
        }
        if !matches!(p.output_encoding, PcmEncoding::Pcm16 | PcmEncoding::Float) {
            return Err(Error::Config(format!(
                "player.output_encoding must be pcm16 or float, got {}",
                p.output_encoding
            )));
        }
        if !(10..=2000).contains(&self.sink.buffer_ms) {
            return Err(Error::Config(format!(
                "sink.buffer_ms {} outside 10..=2000",
                self.sink.buffer_ms
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    fn test_defaults() {
        let config = PlayerConfig::default();
        assert_eq!(config.player.mime_prefix, "audio/");
        assert_eq!(config.player.stall_threshold, 50);
        assert_eq!(config.player.dequeue_timeout(), Duration::from_millis(10));
        assert_eq!(config.player.output_encoding, PcmEncoding::Pcm16);
        assert_eq!(config.sink.kind, SinkKind::Cpal);
        assert_eq!(config.server.port, 5760);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = PlayerConfig::from_toml_str(
            r#"
            media_root = "/srv/music"

            [player]
            stall_threshold = 5
            output_encoding = "float"

            [sink]
            kind = "native"
            "#,
        )
        .unwrap();

        assert_eq!(config.player.stall_threshold, 5);
        assert_eq!(config.player.output_encoding, PcmEncoding::Float);
        assert_eq!(config.player.input_buffer_count, 4);
        assert_eq!(config.sink.kind, SinkKind::Native);
        assert_eq!(config.sink.buffer_ms, 100);
        assert_eq!(config.media_root, Some(PathBuf::from("/srv/music")));
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_rejects_unsupported_decoder_encoding() {
        let result = PlayerConfig::from_toml_str("[player]\noutput_encoding = \"pcm24\"\n");
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_rejects_zero_slots() {
        let result = PlayerConfig::from_toml_str("[player]\ninput_buffer_count = 0\n");
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_rejects_unknown_sink_kind() {
        let result = PlayerConfig::from_toml_str("[sink]\nkind = \"pulse\"\n");
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    #[serial]
    fn test_load_from_env_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pcmp-ap.toml");
        std::fs::write(&path, "[server]\nport = 6001\n").unwrap();

        std::env::set_var(CONFIG_ENV_VAR, &path);
        let config = PlayerConfig::load(None);
        std::env::remove_var(CONFIG_ENV_VAR);

        assert_eq!(config.unwrap().server.port, 6001);
    }

    #[test]
    #[serial]
    fn test_load_missing_cli_path_fails() {
        let dir = tempfile::tempdir().unwrap();
        let result = PlayerConfig::load(Some(&dir.path().join("nope.toml")));
        assert!(matches!(result, Err(Error::Common(_))));
    }
}
