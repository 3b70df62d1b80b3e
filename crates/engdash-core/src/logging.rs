use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{Context, Result};
use directories::ProjectDirs;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use crate::config::LogConfig;

/// Environment variable holding a filter directive; wins over the config.
pub const LOG_ENV: &str = "ENGDASH_LOG";

/// Default log file: `~/.local/share/engdash/engdash.log`.
pub fn default_log_path() -> Result<PathBuf> {
    let dirs = ProjectDirs::from("", "", "engdash").context("Could not determine data directory")?;
    Ok(dirs.data_dir().join("engdash.log"))
}

/// Pick the filter directive: env first, then config, then `info`.
pub fn filter_directive(env_value: Option<String>, config: &LogConfig) -> String {
    env_value
        .filter(|v| !v.trim().is_empty())
        .unwrap_or_else(|| config.level.clone())
}

/// Install the global subscriber writing to a file.
///
/// The terminal belongs to the TUI, so nothing is ever written to stdout.
pub fn init(config: &LogConfig) -> Result<PathBuf> {
    let path = match &config.file {
        Some(path) => path.clone(),
        None => default_log_path()?,
    };
    init_at(&path, &filter_directive(std::env::var(LOG_ENV).ok(), config))?;
    Ok(path)
}

fn init_at(path: &Path, directive: &str) -> Result<()> {
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create log directory: {}", dir.display()))?;
    }
    let file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("Failed to open log file {}", path.display()))?;

    let filter = EnvFilter::try_new(directive).unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(Mutex::new(file))
                .with_ansi(false)
                .with_target(true),
        )
        .try_init()
        .context("A global tracing subscriber is already installed")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_directive_precedence() {
        let config = LogConfig {
            level: "warn".into(),
            file: None,
        };
        assert_eq!(filter_directive(Some("debug".into()), &config), "debug");
        assert_eq!(filter_directive(Some(" ".into()), &config), "warn");
        assert_eq!(filter_directive(None, &config), "warn");
        assert_eq!(filter_directive(None, &LogConfig::default()), "info");
    }
}
