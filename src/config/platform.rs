//! Platform configuration from environment variables.
//!
//! The hosted platform is addressed by two values: its endpoint URL and the public
//! (anonymous) API key. Both are read from the environment, usually populated from
//! a `.env` file by `dotenvy` at startup.

use crate::errors::{Error, Result};

/// Environment variable holding the platform endpoint URL
pub const URL_VAR: &str = "FAMILY_OFFICE_API_URL";
/// Environment variable holding the public API key
pub const ANON_KEY_VAR: &str = "FAMILY_OFFICE_ANON_KEY";

/// Endpoint and key identifying one platform project.
#[derive(Clone, PartialEq, Eq)]
pub struct PlatformConfig {
    /// Base URL without trailing slash, e.g. `https://abc.example.co`
    pub url: String,
    /// Public API key sent as `apikey` on every request
    pub anon_key: String,
}

impl std::fmt::Debug for PlatformConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlatformConfig")
            .field("url", &self.url)
            .field("anon_key", &"<redacted>")
            .finish()
    }
}

impl PlatformConfig {
    /// Builds a configuration, normalizing the URL and rejecting empty values.
    pub fn new(url: impl Into<String>, anon_key: impl Into<String>) -> Result<Self> {
        let url = url.into().trim().trim_end_matches('/').to_string();
        let anon_key = anon_key.into().trim().to_string();

        if url.is_empty() {
            return Err(Error::config(format!("{URL_VAR} is empty")));
        }
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(Error::config(format!(
                "{URL_VAR} must be an http(s) URL, got {url}"
            )));
        }
        if anon_key.is_empty() {
            return Err(Error::config(format!("{ANON_KEY_VAR} is empty")));
        }

        Ok(Self { url, anon_key })
    }

    /// Reads both values from the environment.
    ///
    /// # Errors
    /// Returns [`Error::Config`] naming the first missing or invalid variable.
    pub fn from_env() -> Result<Self> {
        let url = std::env::var(URL_VAR)
            .map_err(|e| Error::config(format!("{URL_VAR} not set: {e}")))?;
        let anon_key = std::env::var(ANON_KEY_VAR)
            .map_err(|e| Error::config(format!("{ANON_KEY_VAR} not set: {e}")))?;
        Self::new(url, anon_key)
    }

    /// Websocket base URL derived from the HTTP endpoint.
    #[must_use]
    pub fn websocket_url(&self) -> String {
        if let Some(rest) = self.url.strip_prefix("https://") {
            format!("wss://{rest}")
        } else if let Some(rest) = self.url.strip_prefix("http://") {
            format!("ws://{rest}")
        } else {
            self.url.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ErrorKind;

    #[test]
    fn test_new_trims_trailing_slash() -> Result<()> {
        let config = PlatformConfig::new("https://demo.example.co/", " key ")?;
        assert_eq!(config.url, "https://demo.example.co");
        assert_eq!(config.anon_key, "key");
        Ok(())
    }

    #[test]
    fn test_new_rejects_missing_values() {
        let empty_url = PlatformConfig::new("", "key");
        assert!(matches!(empty_url, Err(Error::Config { .. })));

        let empty_key = PlatformConfig::new("https://demo.example.co", "  ");
        assert!(matches!(empty_key, Err(Error::Config { .. })));

        let bad_scheme = PlatformConfig::new("ftp://demo.example.co", "key");
        assert_eq!(
            bad_scheme.map_err(|e| e.kind()).err(),
            Some(ErrorKind::Config)
        );
    }

    #[test]
    fn test_websocket_url_swaps_scheme() -> Result<()> {
        let secure = PlatformConfig::new("https://demo.example.co", "key")?;
        assert_eq!(secure.websocket_url(), "wss://demo.example.co");

        let local = PlatformConfig::new("http://localhost:54321", "key")?;
        assert_eq!(local.websocket_url(), "ws://localhost:54321");
        Ok(())
    }

    #[test]
    fn test_debug_redacts_key() -> Result<()> {
        let config = PlatformConfig::new("https://demo.example.co", "secret-key")?;
        let rendered = format!("{config:?}");
        assert!(!rendered.contains("secret-key"));
        Ok(())
    }
}
