//! Player configuration loading for the binary.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use cadence_audio::PlayerConfig;
use directories::ProjectDirs;
use tracing::debug;

/// Flag overrides applied on top of the file configuration.
#[derive(Debug, Default, Clone, Copy)]
pub struct Overrides {
    pub look_ahead_secs: Option<u32>,
    pub throttle_secs: Option<u32>,
    pub backoff_ms: Option<u64>,
}

/// Default location of the configuration file.
pub fn default_config_path() -> Option<PathBuf> {
    ProjectDirs::from("com", "cadence", "Cadence").map(|dirs| dirs.config_dir().join("player.json"))
}

/// Resolve the player configuration.
///
/// An explicit `path` must exist; the default location is optional. Overrides win
/// over the file, and the result is validated.
pub fn load(path: Option<&Path>, overrides: Overrides) -> Result<PlayerConfig> {
    let mut config = match path {
        Some(path) => read(path)?,
        None => match default_config_path().filter(|p| p.exists()) {
            Some(path) => read(&path)?,
            None => PlayerConfig::default(),
        },
    };

    if let Some(secs) = overrides.look_ahead_secs {
        config.look_ahead_secs = secs;
    }
    if let Some(secs) = overrides.throttle_secs {
        config.throttle_secs = secs;
    }
    if let Some(ms) = overrides.backoff_ms {
        config.backoff_ms = ms;
    }

    config.validate().context("Invalid player configuration")?;
    Ok(config)
}

fn read(path: &Path) -> Result<PlayerConfig> {
    debug!("Loading config from {}", path.display());

    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config {}", path.display()))?;
    serde_json::from_str(&contents)
        .with_context(|| format!("Failed to parse config {}", path.display()))
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    #[test]
    fn test_partial_file_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("player.json");
        std::fs::write(&path, r#"{"backoff_ms": 500}"#).unwrap();

        let config = load(Some(&path), Overrides::default()).unwrap();
        assert_eq!(config.backoff_ms, 500);
        assert_eq!(config.look_ahead_secs, 30);
        assert_eq!(config.throttle_secs, 25);
    }

    #[test]
    fn test_overrides_win() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("player.json");
        std::fs::write(&path, r#"{"look_ahead_secs": 60, "throttle_secs": 50}"#).unwrap();

        let overrides = Overrides {
            throttle_secs: Some(40),
            ..Overrides::default()
        };
        let config = load(Some(&path), overrides).unwrap();
        assert_eq!(config.look_ahead_secs, 60);
        assert_eq!(config.throttle_secs, 40);
    }

    #[test]
    fn test_invalid_values_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("player.json");
        std::fs::write(&path, r#"{"throttle_secs": 30}"#).unwrap();

        assert!(load(Some(&path), Overrides::default()).is_err());
    }

    #[test]
    fn test_missing_explicit_file_is_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load(Some(&dir.path().join("nope.json")), Overrides::default()).is_err());
    }
}
