//! Viewer configuration.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Top-level configuration loaded from a TOML file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewerConfig {
    pub network: NetworkConfig,
    pub stream: StreamConfig,
    pub logging: LoggingConfig,
}

/// Network settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Nested display endpoint (IP:port).
    pub address: String,
    /// Connection timeout in milliseconds.
    pub timeout_ms: u64,
    /// Pause before reconnecting after the stream ends.
    pub reconnect_delay_ms: u64,
}

/// Decoder settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    /// Frames advertising more records than this are treated as corrupt.
    pub max_buffers: usize,
}

/// Logging.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: "trace", "debug", "info", "warn", "error".
    pub level: String,
}

// ── Defaults ─────────────────────────────────────────────────────

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            address: "127.0.0.1:2345".into(),
            timeout_ms: 3000,
            reconnect_delay_ms: 1000,
        }
    }
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            max_buffers: vhwc_core::nested::codec::DEFAULT_MAX_RECORDS,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
        }
    }
}

// ── Loading ──────────────────────────────────────────────────────

impl ViewerConfig {
    /// Load configuration from a TOML file, falling back to defaults.
    pub fn load(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(contents) => toml::from_str(&contents).unwrap_or_else(|e| {
                tracing::warn!("invalid config {}: {e}; using defaults", path.display());
                Self::default()
            }),
            Err(_) => {
                tracing::info!("no config at {}; using defaults", path.display());
                Self::default()
            }
        }
    }

    /// Write the default configuration to a file.
    pub fn write_default(path: &Path) -> std::io::Result<()> {
        let text = toml::to_string_pretty(&Self::default()).map_err(std::io::Error::other)?;
        std::fs::write(path, text)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.network.timeout_ms)
    }

    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.network.reconnect_delay_ms)
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_serializes() {
        let text = toml::to_string_pretty(&ViewerConfig::default()).unwrap();
        assert!(text.contains("address"));
        assert!(text.contains("max_buffers"));
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let parsed: ViewerConfig = toml::from_str("[network]\naddress = \"10.0.0.2:2345\"\n").unwrap();
        assert_eq!(parsed.network.address, "10.0.0.2:2345");
        assert_eq!(parsed.network.timeout_ms, 3000);
        assert_eq!(parsed.stream.max_buffers, 64);
        assert_eq!(parsed.logging.level, "info");
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let cfg = ViewerConfig::load(Path::new("/nonexistent/vhwc-viewer.toml"));
        assert_eq!(cfg.network.address, "127.0.0.1:2345");
    }

    #[test]
    fn written_defaults_load_back() {
        let path = std::env::temp_dir().join(format!("vhwc-viewer-{}.toml", std::process::id()));
        ViewerConfig::write_default(&path).unwrap();
        let cfg = ViewerConfig::load(&path);
        std::fs::remove_file(&path).unwrap();
        assert_eq!(cfg.reconnect_delay(), Duration::from_secs(1));
    }
}
