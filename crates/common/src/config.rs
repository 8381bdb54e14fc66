//! Application configuration.
//!
//! Persisted user defaults. Values are stored as opaque strings and paths;
//! callers decide how to interpret them (for example, a frame policy name is
//! only parsed by the project model).

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Global application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Defaults restored at startup for new projects and exports.
    #[serde(default)]
    pub session: SessionDefaults,

    /// Sequence discovery settings.
    #[serde(default)]
    pub discovery: DiscoveryDefaults,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Values remembered between runs.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SessionDefaults {
    /// Last directory sequences were loaded from.
    pub last_input_dir: Option<PathBuf>,

    /// Last directory an export was written to.
    pub last_output_dir: Option<PathBuf>,

    /// Last compression selector (opaque, validated against the image store).
    pub compression: Option<String>,

    /// Last frame policy name (e.g. "STOP_AT_SHORTEST").
    pub frame_policy: Option<String>,
}

/// Sequence discovery settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscoveryDefaults {
    /// File extensions (without dot, case-insensitive) considered during
    /// discovery. Empty means every file is considered.
    pub extensions: Vec<String>,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level filter (e.g., "info", "debug", "seqmix=debug,warn").
    pub level: String,

    /// Whether to output structured JSON logs.
    pub json: bool,
}

impl Default for DiscoveryDefaults {
    fn default() -> Self {
        Self {
            extensions: ["exr", "tif", "tiff", "png", "jpg", "jpeg", "dpx"]
                .iter()
                .map(|ext| ext.to_string())
                .collect(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

impl AppConfig {
    /// Load config from the standard location, falling back to defaults.
    pub fn load() -> Self {
        Self::load_from(&config_file_path())
    }

    /// Load config from an explicit path, falling back to defaults.
    pub fn load_from(config_path: &Path) -> Self {
        if config_path.exists() {
            match std::fs::read_to_string(config_path) {
                Ok(content) => match serde_json::from_str(&content) {
                    Ok(config) => return config,
                    Err(e) => {
                        tracing::warn!("Failed to parse config at {:?}: {}", config_path, e);
                    }
                },
                Err(e) => {
                    tracing::warn!("Failed to read config at {:?}: {}", config_path, e);
                }
            }
        }
        Self::default()
    }

    /// Save config to the standard location.
    pub fn save(&self) -> Result<(), std::io::Error> {
        self.save_to(&config_file_path())
    }

    /// Save config to an explicit path.
    pub fn save_to(&self, config_path: &Path) -> Result<(), std::io::Error> {
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self).map_err(std::io::Error::other)?;
        std::fs::write(config_path, json)
    }
}

/// Standard config file location.
pub fn config_file_path() -> PathBuf {
    let base = std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            PathBuf::from(home).join(".config")
        });
    base.join("seqmix").join("config.json")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = AppConfig::load_from(&dir.path().join("absent.json"));
        assert_eq!(config.logging.level, "info");
        assert!(config.session.compression.is_none());
        assert!(config.discovery.extensions.iter().any(|e| e == "exr"));
    }

    #[test]
    fn test_round_trip_preserves_session_values() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.json");

        let mut config = AppConfig::default();
        config.session.last_output_dir = Some(PathBuf::from("/renders/out"));
        config.session.compression = Some("piz".to_string());
        config.session.frame_policy = Some("HOLD_LAST".to_string());
        config.save_to(&path).unwrap();

        let loaded = AppConfig::load_from(&path);
        assert_eq!(
            loaded.session.last_output_dir,
            Some(PathBuf::from("/renders/out"))
        );
        assert_eq!(loaded.session.compression.as_deref(), Some("piz"));
        assert_eq!(loaded.session.frame_policy.as_deref(), Some("HOLD_LAST"));
    }

    #[test]
    fn test_corrupt_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "{ not json").unwrap();

        let config = AppConfig::load_from(&path);
        assert!(config.session.last_input_dir.is_none());
    }

    #[test]
    fn test_partial_file_fills_missing_sections() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"logging":{"level":"debug","json":true}}"#).unwrap();

        let config = AppConfig::load_from(&path);
        assert_eq!(config.logging.level, "debug");
        assert!(config.logging.json);
        assert!(!config.discovery.extensions.is_empty());
    }
}
