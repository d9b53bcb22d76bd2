//! Application configuration types.
//!
//! The top-level [`Config`] struct is deserialized from TOML and carries all
//! sub-configs for the HTTP server, the stream, the pipeline stages, the
//! archive and the external tools. Every field defaults sensibly so a
//! completely empty file is valid.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::error::Result;
use crate::Error;

// ---------------------------------------------------------------------------
// Top-level Config
// ---------------------------------------------------------------------------

/// Root application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub stream: StreamConfig,
    pub source: SourceConfig,
    pub sync: SyncConfig,
    pub queue: QueueConfig,
    pub archive: ArchiveConfig,
    pub tools: ToolsConfig,
}

impl Config {
    /// Deserialize a `Config` from a TOML string.
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        toml::from_str(toml_str)
            .map_err(|e| Error::Validation(format!("config parse error: {e}")))
    }

    /// Publish destination for the configured stream.
    pub fn publish_url(&self) -> String {
        format!(
            "{}/{}.flv",
            self.stream.publish_base.trim_end_matches('/'),
            self.stream.name
        )
    }

    /// Return a list of validation warnings (non-fatal issues).
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();

        if self.server.port == 0 {
            warnings.push("server.port is 0; a random port will be assigned".into());
        }

        if self.stream.name.trim().is_empty() {
            warnings.push("stream.name is empty".into());
        }

        if self.stream.relay_capacity == 0 || self.stream.sink_capacity == 0 {
            warnings.push(
                "stream.relay_capacity and stream.sink_capacity must be at least 1".into(),
            );
        }

        if self.stream.max_clip_bytes == 0 {
            warnings.push(
                "stream.max_clip_bytes is 0; every clip with a declared size will be skipped"
                    .into(),
            );
        }

        if !self.stream.publish_base.starts_with("rtmp://") {
            warnings.push(format!(
                "stream.publish_base '{}' is not an rtmp:// URL",
                self.stream.publish_base
            ));
        }

        let valid_formats = ["mp3", "adts", "ogg"];
        if !valid_formats.contains(&self.stream.format.as_str()) {
            warnings.push(format!(
                "stream.format '{}' is not a recognized container (valid: {})",
                self.stream.format,
                valid_formats.join(", ")
            ));
        }

        if self.sync.poll_interval_ms == 0 {
            warnings.push("sync.poll_interval_ms is 0; manifest polling will spin".into());
        }

        if self.source.stall_timeout_secs == 0 {
            warnings.push("source.stall_timeout_secs is 0; every fetch will stall out".into());
        }

        warnings
    }
}

// ---------------------------------------------------------------------------
// Sub-configs
// ---------------------------------------------------------------------------

/// HTTP server settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".into(),
            port: 8080,
        }
    }
}

/// The live stream and its shared broadcast wiring.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    /// Stream name, used for the publish path and the HLS directory.
    pub name: String,
    /// RTMP application URL the persistent encoder publishes under.
    pub publish_base: String,
    /// Directory the media server writes `<name>/index.m3u8` into.
    pub hls_root: PathBuf,
    /// Clips larger than this are skipped.
    pub max_clip_bytes: u64,
    /// Chunks buffered between a run's transcoder and the broadcast sink.
    pub relay_capacity: usize,
    /// Chunks buffered between the broadcast sink and the persistent encoder.
    pub sink_capacity: usize,
    /// Per-clip transcode bitrate.
    pub bitrate_kbps: u32,
    /// Per-clip transcode container.
    pub format: String,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            name: "main".into(),
            publish_base: "rtmp://localhost/live".into(),
            hls_root: PathBuf::from("./media/live"),
            max_clip_bytes: 400_000_000,
            relay_capacity: 400,
            sink_capacity: 64,
            bitrate_kbps: 128,
            format: "mp3".into(),
        }
    }
}

/// Source download settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    /// A fetch that yields no bytes for this long fails.
    pub stall_timeout_secs: u64,
    pub user_agent: String,
}

impl SourceConfig {
    pub fn stall_timeout(&self) -> Duration {
        Duration::from_secs(self.stall_timeout_secs)
    }
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            stall_timeout_secs: 30,
            user_agent: concat!("onair/", env!("CARGO_PKG_VERSION")).into(),
        }
    }
}

/// Manifest synchronization settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Manifests declaring a longer target duration are reported.
    pub target_duration_ceiling_secs: u32,
    /// Announce anyway once this much time has passed without roll-off.
    pub max_wait_secs: u64,
    /// Re-read the manifest this often even without filesystem events.
    pub poll_interval_ms: u64,
}

impl SyncConfig {
    pub fn max_wait(&self) -> Duration {
        Duration::from_secs(self.max_wait_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            target_duration_ceiling_secs: 3,
            max_wait_secs: 120,
            poll_interval_ms: 1000,
        }
    }
}

/// Queue pacing.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    /// Wait between polls of an empty archive.
    pub idle_backoff_secs: u64,
    /// Wait after a failed candidate or run.
    pub error_backoff_ms: u64,
}

impl QueueConfig {
    pub fn idle_backoff(&self) -> Duration {
        Duration::from_secs(self.idle_backoff_secs)
    }

    pub fn error_backoff(&self) -> Duration {
        Duration::from_millis(self.error_backoff_ms)
    }
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            idle_backoff_secs: 5,
            error_backoff_ms: 1000,
        }
    }
}

/// Archive database settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ArchiveConfig {
    pub db_path: PathBuf,
    /// Only posts from this link source are queued.
    pub link_source: String,
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from("./data/onair.db"),
            link_source: "youtube".into(),
        }
    }
}

/// Paths to external CLI tools.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolsConfig {
    pub ffmpeg_path: Option<PathBuf>,
    pub ytdlp_path: Option<PathBuf>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_values() {
        let cfg = Config::default();
        assert_eq!(cfg.server.port, 8080);
        assert_eq!(cfg.stream.name, "main");
        assert_eq!(cfg.stream.max_clip_bytes, 400_000_000);
        assert_eq!(cfg.stream.bitrate_kbps, 128);
        assert_eq!(cfg.sync.target_duration_ceiling_secs, 3);
        assert_eq!(cfg.archive.link_source, "youtube");
    }

    #[test]
    fn default_config_no_warnings() {
        let warnings = Config::default().validate();
        assert!(warnings.is_empty(), "unexpected warnings: {:?}", warnings);
    }

    #[test]
    fn parse_partial_toml() {
        let toml = r#"
            [stream]
            name = "late-night"
            max_clip_bytes = 1000

            [sync]
            poll_interval_ms = 250
        "#;
        let cfg = Config::from_toml(toml).unwrap();
        assert_eq!(cfg.stream.name, "late-night");
        assert_eq!(cfg.stream.max_clip_bytes, 1000);
        assert_eq!(cfg.stream.bitrate_kbps, 128);
        assert_eq!(cfg.sync.poll_interval(), Duration::from_millis(250));
    }

    #[test]
    fn parse_empty_toml_uses_defaults() {
        let cfg = Config::from_toml("").unwrap();
        assert_eq!(cfg.server.host, "0.0.0.0");
    }

    #[test]
    fn bad_toml_is_validation_error() {
        let err = Config::from_toml("[stream\nname=").unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[test]
    fn derived_paths() {
        let mut cfg = Config::default();
        cfg.stream.publish_base = "rtmp://media:1935/live/".into();
        cfg.stream.hls_root = PathBuf::from("/srv/hls");
        assert_eq!(cfg.publish_url(), "rtmp://media:1935/live/main.flv");
        assert_eq!(cfg.manifest_path(), PathBuf::from("/srv/hls/main/index.m3u8"));
    }

    #[test]
    fn unknown_format_warns() {
        let mut cfg = Config::default();
        cfg.stream.format = "wav".into();
        assert!(cfg.validate().iter().any(|w| w.contains("stream.format")));
    }
}
