//! Tuning settings loaded from a TOML file.
//!
//! The file is optional: when it does not exist every value falls back to its
//! default, so a fresh checkout runs without any settings file at all.
//!
//! ```toml
//! [cache]
//! stale_time_secs = 30
//!
//! [realtime]
//! heartbeat_secs = 25
//! channel_capacity = 64
//! ```

use crate::errors::{Error, Result};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

/// Environment variable overriding the settings file location
pub const SETTINGS_PATH_VAR: &str = "FAMILY_OFFICE_CONFIG";
/// Settings file used when the variable is unset
pub const DEFAULT_SETTINGS_PATH: &str = "family_office.toml";

/// The whole settings file
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Settings {
    /// Query cache behaviour
    pub cache: CacheSettings,
    /// Realtime channel behaviour
    pub realtime: RealtimeSettings,
}

/// Query cache settings
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct CacheSettings {
    /// Seconds after which a cached result is served stale and refreshed in the background
    pub stale_time_secs: u64,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            stale_time_secs: 30,
        }
    }
}

impl CacheSettings {
    /// Stale interval as a [`Duration`].
    #[must_use]
    pub const fn stale_time(&self) -> Duration {
        Duration::from_secs(self.stale_time_secs)
    }
}

/// Realtime settings
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct RealtimeSettings {
    /// Seconds between heartbeats on an open realtime socket
    pub heartbeat_secs: u64,
    /// Buffered events per topic before slow consumers start lagging
    pub channel_capacity: usize,
}

impl Default for RealtimeSettings {
    fn default() -> Self {
        Self {
            heartbeat_secs: 25,
            channel_capacity: 64,
        }
    }
}

impl RealtimeSettings {
    /// Heartbeat interval as a [`Duration`].
    #[must_use]
    pub const fn heartbeat(&self) -> Duration {
        Duration::from_secs(self.heartbeat_secs)
    }
}

/// Parses settings from a TOML file, falling back to defaults when the file is absent.
///
/// # Errors
/// Returns [`Error::Config`] if the file exists but cannot be read or parsed.
pub fn load_settings<P: AsRef<Path>>(path: P) -> Result<Settings> {
    let path_ref = path.as_ref();
    if !path_ref.exists() {
        tracing::debug!("No settings file at {:?}, using defaults", path_ref);
        return Ok(Settings::default());
    }

    tracing::debug!("Loading settings from {:?}", path_ref);
    let contents = std::fs::read_to_string(path_ref).map_err(|e| {
        Error::config(format!("Failed to read settings file {path_ref:?}: {e}"))
    })?;
    parse_settings(&contents)
        .map_err(|e| Error::config(format!("Failed to parse {path_ref:?}: {e}")))
}

/// Loads settings from `FAMILY_OFFICE_CONFIG` or `./family_office.toml`.
pub fn load_default_settings() -> Result<Settings> {
    let path =
        std::env::var(SETTINGS_PATH_VAR).unwrap_or_else(|_| DEFAULT_SETTINGS_PATH.to_string());
    load_settings(path)
}

fn parse_settings(contents: &str) -> std::result::Result<Settings, toml::de::Error> {
    let settings: Settings = toml::from_str(contents)?;
    Ok(settings)
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;

    #[test]
    fn test_parse_full_settings() {
        let toml_str = r"
            [cache]
            stale_time_secs = 5

            [realtime]
            heartbeat_secs = 10
            channel_capacity = 8
        ";

        let settings = parse_settings(toml_str).unwrap();
        assert_eq!(settings.cache.stale_time(), Duration::from_secs(5));
        assert_eq!(settings.realtime.heartbeat(), Duration::from_secs(10));
        assert_eq!(settings.realtime.channel_capacity, 8);
    }

    #[test]
    fn test_partial_settings_keep_defaults() {
        let settings = parse_settings("[cache]\nstale_time_secs = 1\n").unwrap();
        assert_eq!(settings.cache.stale_time_secs, 1);
        assert_eq!(settings.realtime, RealtimeSettings::default());
    }

    #[test]
    fn test_missing_file_uses_defaults() -> Result<()> {
        let settings = load_settings("definitely/not/here/family_office.toml")?;
        assert_eq!(settings, Settings::default());
        Ok(())
    }

    #[test]
    fn test_invalid_toml_is_rejected() {
        assert!(parse_settings("[cache\nstale_time_secs = ").is_err());
    }
}
