use std::path::{Path, PathBuf};

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};

pub const DEFAULT_API_URL: &str = "http://localhost:8000/api";
pub const DEFAULT_PAGE_SIZE: usize = 20;
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 10;

/// Environment variable overriding `api_url`.
pub const API_URL_ENV: &str = "ENGDASH_API_URL";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("invalid config: {0}")]
    Validation(String),

    #[error("could not determine the config directory")]
    NoConfigDir,
}

/// `[log]` table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Filter directive used when `ENGDASH_LOG` is unset.
    pub level: String,
    /// Log file; defaults to `engdash.log` in the data directory.
    pub file: Option<PathBuf>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
            file: None,
        }
    }
}

/// Dashboard configuration, read from `<config_dir>/engdash/config.toml`.
///
/// Every key is optional:
///
/// ```toml
/// api_url = "http://localhost:8000/api"
/// page_size = 20
/// expand_all = false
/// request_timeout_secs = 10
///
/// [log]
/// level = "engdash=debug"
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub api_url: String,
    pub page_size: usize,
    /// Open every branch of tree pickers on first load.
    pub expand_all: bool,
    pub request_timeout_secs: u64,
    pub log: LogConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.into(),
            page_size: DEFAULT_PAGE_SIZE,
            expand_all: false,
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            log: LogConfig::default(),
        }
    }
}

impl Config {
    /// Default location of the config file.
    pub fn default_path() -> Result<PathBuf, ConfigError> {
        let dirs = ProjectDirs::from("", "", "engdash").ok_or(ConfigError::NoConfigDir)?;
        Ok(dirs.config_dir().join("config.toml"))
    }

    /// Load `path`, falling back to defaults when the file does not exist.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        match std::fs::read_to_string(path) {
            Ok(content) => Self::from_toml(&content),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "no config file, using defaults");
                Ok(Self::default())
            }
            Err(e) => Err(ConfigError::Io(e)),
        }
    }

    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.page_size == 0 {
            return Err(ConfigError::Validation("page_size must be at least 1".into()));
        }
        if self.request_timeout_secs == 0 {
            return Err(ConfigError::Validation(
                "request_timeout_secs must be at least 1".into(),
            ));
        }
        if !(self.api_url.starts_with("http://") || self.api_url.starts_with("https://")) {
            return Err(ConfigError::Validation(format!(
                "api_url must be an http(s) URL, got `{}`",
                self.api_url
            )));
        }
        Ok(())
    }

    /// Apply the env override and then the command-line override, in
    /// increasing precedence.
    pub fn with_overrides(mut self, env_api_url: Option<String>, cli_api_url: Option<String>) -> Self {
        if let Some(url) = cli_api_url.or(env_api_url).filter(|u| !u.trim().is_empty()) {
            self.api_url = url;
        }
        self.api_url = self.api_url.trim_end_matches('/').to_string();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_file_gives_defaults() {
        let config = Config::from_toml("").unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.api_url, DEFAULT_API_URL);
        assert_eq!(config.page_size, 20);
    }

    #[test]
    fn test_partial_file() {
        let toml = r#"
            page_size = 50
            expand_all = true

            [log]
            level = "engdash=debug"
        "#;
        let config = Config::from_toml(toml).unwrap();
        assert_eq!(config.page_size, 50);
        assert!(config.expand_all);
        assert_eq!(config.log.level, "engdash=debug");
        assert_eq!(config.api_url, DEFAULT_API_URL);
        assert!(config.log.file.is_none());
    }

    #[test]
    fn test_validation() {
        let err = Config::from_toml("page_size = 0").unwrap_err();
        assert!(matches!(err, ConfigError::Validation(_)));

        let err = Config::from_toml("api_url = \"localhost:8000\"").unwrap_err();
        match err {
            ConfigError::Validation(msg) => assert!(msg.contains("localhost:8000")),
            other => panic!("expected validation error, got {other:?}"),
        }

        assert!(matches!(
            Config::from_toml("page_size = \"many\""),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_override_precedence() {
        let base = Config::default();
        let config = base
            .clone()
            .with_overrides(Some("http://env/api".into()), Some("http://cli/api/".into()));
        assert_eq!(config.api_url, "http://cli/api");

        let config = base.clone().with_overrides(Some("http://env/api".into()), None);
        assert_eq!(config.api_url, "http://env/api");

        let config = base.with_overrides(Some("  ".into()), None);
        assert_eq!(config.api_url, DEFAULT_API_URL);
    }

    #[test]
    fn test_missing_file_is_default() {
        let path = std::env::temp_dir().join("engdash-no-such-dir/config.toml");
        assert_eq!(Config::load(&path).unwrap(), Config::default());
    }

    #[test]
    fn test_to_toml_parses_back() {
        let config = Config {
            page_size: 7,
            ..Config::default()
        };
        let text = config.to_toml().unwrap();
        assert_eq!(Config::from_toml(&text).unwrap(), config);
    }
}
