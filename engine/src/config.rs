//! Engine configuration loaded from `quill.toml`.

use std::path::{Path, PathBuf};
use std::time::Duration;
use std::{env, fs, io};

use serde::Deserialize;
use thiserror::Error;

use quill_gateway::DEFAULT_BASE_URL;
use quill_types::DEFAULT_TEMPLATE;

const CONFIG_FILE: &str = "quill.toml";
const CONFIG_ENV: &str = "QUILL_CONFIG";

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_owned()
}

const fn default_debounce_ms() -> u64 {
    750
}

fn default_template() -> String {
    DEFAULT_TEMPLATE.to_owned()
}

/// Engine settings.
///
/// ```toml
/// base_url = "http://127.0.0.1:8765"
/// debounce_ms = 750
/// template = "default"
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct EngineConfig {
    /// Address of the backend process.
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Quiescence window for debounced saves, in milliseconds.
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
    /// Scaffold template used when a directory has no entry point yet.
    #[serde(default = "default_template")]
    pub template: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            debounce_ms: default_debounce_ms(),
            template: default_template(),
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        source: io::Error,
    },
    #[error("failed to parse {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
}

impl EngineConfig {
    /// Location of the config file: `$QUILL_CONFIG`, or `quill.toml` in the
    /// working directory.
    #[must_use]
    pub fn path() -> PathBuf {
        env::var_os(CONFIG_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(CONFIG_FILE))
    }

    /// Load the config file if present; `Ok(None)` when it does not exist.
    pub fn load() -> Result<Option<Self>, ConfigError> {
        Self::load_from(&Self::path())
    }

    pub fn load_from(path: &Path) -> Result<Option<Self>, ConfigError> {
        let raw = match fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(source) => {
                return Err(ConfigError::Read {
                    path: path.to_owned(),
                    source,
                });
            }
        };
        let config = toml::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_owned(),
            source,
        })?;
        Ok(Some(config))
    }

    #[must_use]
    pub const fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_backend_conventions() {
        let config = EngineConfig::default();
        assert_eq!(config.base_url, "http://127.0.0.1:8765");
        assert_eq!(config.debounce(), Duration::from_millis(750));
        assert_eq!(config.template, "default");
    }

    #[test]
    fn partial_file_fills_in_defaults() {
        let config: EngineConfig = toml::from_str("debounce_ms = 500").unwrap();
        assert_eq!(config.debounce_ms, 500);
        assert_eq!(config.base_url, "http://127.0.0.1:8765");
    }

    #[test]
    fn full_file_parses() {
        let raw = r#"
            base_url = "http://127.0.0.1:9000"
            debounce_ms = 1000
            template = "report"
        "#;
        let config: EngineConfig = toml::from_str(raw).unwrap();
        assert_eq!(config.base_url, "http://127.0.0.1:9000");
        assert_eq!(config.debounce(), Duration::from_millis(1000));
        assert_eq!(config.template, "report");
    }

    #[test]
    fn missing_file_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let loaded = EngineConfig::load_from(&dir.path().join("quill.toml")).unwrap();
        assert!(loaded.is_none());
    }

    #[test]
    fn malformed_file_is_a_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("quill.toml");
        fs::write(&path, "debounce_ms = \"soon\"").unwrap();
        let err = EngineConfig::load_from(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }
}
