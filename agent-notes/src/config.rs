//! User configuration read from `~/.config/agent-notes/config.toml`.
//!
//! Every key is optional. A missing file yields defaults; a malformed file is
//! a soft failure: a warning is logged and defaults are used.

use std::path::PathBuf;
use std::time::Duration;

use agent_notes_core::tracker::TrackerConfig;
use agent_notes_core::workspace::WorkspaceOptions;
use serde::Deserialize;
use tracing::warn;

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Author recorded on new threads and replies.
    pub author: String,
    /// Quiet period before a scheduled store write, in milliseconds.
    pub debounce_ms: u64,
    /// How often `watch` polls the store and annotated files, in milliseconds.
    pub poll_ms: u64,
    pub tracking: TrackerConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            author: default_author(),
            debounce_ms: 300,
            poll_ms: 500,
            tracking: TrackerConfig::default(),
        }
    }
}

impl Config {
    pub fn workspace_options(&self) -> WorkspaceOptions {
        WorkspaceOptions {
            debounce: Duration::from_millis(self.debounce_ms),
            tracker: self.tracking,
        }
    }

    pub fn poll_interval(&self) -> Duration {
        // tokio intervals panic on a zero period
        Duration::from_millis(self.poll_ms.max(10))
    }
}

fn default_author() -> String {
    std::env::var("USER")
        .ok()
        .filter(|user| !user.trim().is_empty())
        .unwrap_or_else(|| "reviewer".to_owned())
}

/// Returns the path to the agent-notes config file.
///
/// Prefers `$XDG_CONFIG_HOME/agent-notes/config.toml`; falls back to
/// `~/.config/agent-notes/config.toml` when the env var is absent.
pub fn config_path() -> PathBuf {
    let base = std::env::var("XDG_CONFIG_HOME")
        .ok()
        .map(PathBuf::from)
        .or_else(|| {
            std::env::var("HOME")
                .ok()
                .map(|h| PathBuf::from(h).join(".config"))
        })
        .unwrap_or_else(|| PathBuf::from(".config"));
    base.join("agent-notes").join("config.toml")
}

/// Parses a config document. Absent keys take their defaults.
///
/// # Errors
///
/// Returns the TOML error for malformed input or mistyped keys.
pub fn parse(raw: &str) -> Result<Config, toml::de::Error> {
    toml::from_str(raw)
}

/// Loads the config file. Never fails.
pub fn load() -> Config {
    let path = config_path();
    let raw = match std::fs::read_to_string(&path) {
        Ok(s) => s,
        Err(_) => return Config::default(),
    };
    match parse(&raw) {
        Ok(config) => config,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "config parse error, using defaults");
            Config::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_gives_defaults() {
        let config = parse("").unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.debounce_ms, 300);
        assert_eq!(config.tracking.acceptance_threshold, 0.5);
    }

    #[test]
    fn partial_tracking_table_keeps_other_defaults() {
        let config = parse(
            r#"
            author = "ana"
            poll_ms = 1000

            [tracking]
            acceptance_threshold = 0.8
            "#,
        )
        .unwrap();
        assert_eq!(config.author, "ana");
        assert_eq!(config.poll_interval(), Duration::from_millis(1000));
        assert_eq!(config.tracking.acceptance_threshold, 0.8);
        assert_eq!(config.tracking.match_distance, 1000);
        assert_eq!(config.workspace_options().debounce, Duration::from_millis(300));
    }

    #[test]
    fn mistyped_key_is_an_error() {
        assert!(parse("debounce_ms = \"fast\"").is_err());
    }
}
