use config::{Config as ConfigBuilder, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Default receiver application id for the custom cast receiver.
pub const DEFAULT_RECEIVER_APP_ID: &str = "4F8B3483";

/// Application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub cache: CacheConfig,
    pub transcoder: TranscoderConfig,
    pub cast: CastConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Per-request read timeout in seconds. Write timeouts are intentionally
    /// absent: segment responses stream for as long as they need.
    pub read_timeout_seconds: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8573,
            read_timeout_seconds: 60,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Root of the segment cache tree.
    pub root: PathBuf,
    /// Directory for the settings and history JSON files.
    pub state_dir: PathBuf,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("cache"),
            state_dir: PathBuf::from("."),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TranscoderConfig {
    /// Ordered binary candidates; empty means the platform defaults.
    pub candidates: Vec<String>,
    /// Length of synthesized local segments in seconds.
    pub segment_seconds: u32,
}

impl Default for TranscoderConfig {
    fn default() -> Self {
        Self {
            candidates: Vec::new(),
            segment_seconds: 8,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CastConfig {
    pub receiver_app_id: String,
}

impl Default for CastConfig {
    fn default() -> Self {
        Self {
            receiver_app_id: DEFAULT_RECEIVER_APP_ID.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    /// "pretty" for development, "json" for structured output.
    pub format: String,
    pub file_path: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
            file_path: None,
        }
    }
}

impl Config {
    /// Load configuration with priority: environment variables over config
    /// file over defaults.
    pub fn load(config_file: Option<&str>) -> Result<Self, ConfigError> {
        let mut builder = ConfigBuilder::builder();

        if let Some(path) = config_file {
            if Path::new(path).exists() {
                builder = builder.add_source(File::new(path, config::FileFormat::Yaml));
            }
        }

        builder = builder.add_source(
            Environment::with_prefix("CASTBRIDGE")
                .separator("_")
                .try_parsing(true),
        );

        let config = builder.build()?;
        config.try_deserialize()
    }

    pub fn from_env() -> Result<Self, ConfigError> {
        Self::load(None)
    }

    pub fn from_file(path: &str) -> Result<Self, ConfigError> {
        Self::load(Some(path))
    }

    #[must_use]
    pub fn http_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }

    #[must_use]
    pub fn settings_path(&self) -> PathBuf {
        self.cache.state_dir.join("settings.json")
    }

    #[must_use]
    pub fn history_path(&self) -> PathBuf {
        self.cache.state_dir.join("cast_history.json")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.server.port, 8573);
        assert_eq!(config.server.read_timeout_seconds, 60);
        assert_eq!(config.transcoder.segment_seconds, 8);
        assert_eq!(config.cast.receiver_app_id, DEFAULT_RECEIVER_APP_ID);
    }

    #[test]
    fn test_state_paths() {
        let mut config = Config::default();
        config.cache.state_dir = PathBuf::from("/state");
        assert_eq!(config.settings_path(), PathBuf::from("/state/settings.json"));
        assert_eq!(
            config.history_path(),
            PathBuf::from("/state/cast_history.json")
        );
    }

    #[test]
    fn test_load_without_file_uses_defaults() {
        let config = Config::load(None).unwrap();
        assert_eq!(config.server.read_timeout_seconds, 60);
    }
}
