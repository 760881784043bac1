//! Remote API configuration.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::util::{is_http_url, normalize_text_option};

/// Configuration for the remote authoritative store.
///
/// These are safe-to-ship endpoint values; the token is the signed-in
/// account's API credential and must never be logged.
#[derive(Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct RemoteConfig {
    /// API base URL (e.g. `https://api.liftlog.app`)
    pub base_url: String,
    /// Bearer token for authenticated calls
    pub api_token: String,
}

impl RemoteConfig {
    /// Create a validated configuration.
    ///
    /// The base URL must include an `http://` or `https://` scheme;
    /// trailing slashes are stripped. Missing required values abort
    /// engine initialization — they never corrupt durable local data.
    pub fn new(base_url: impl Into<String>, api_token: impl Into<String>) -> Result<Self> {
        let base_url = normalize_text_option(Some(base_url.into()))
            .ok_or_else(|| Error::InvalidInput("remote base URL must not be empty".to_string()))?;
        if !is_http_url(&base_url) {
            return Err(Error::InvalidInput(
                "remote base URL must include http:// or https://".to_string(),
            ));
        }

        let api_token = normalize_text_option(Some(api_token.into()))
            .ok_or_else(|| Error::InvalidInput("API token must not be empty".to_string()))?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_token,
        })
    }
}

impl std::fmt::Debug for RemoteConfig {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("RemoteConfig")
            .field("base_url", &self.base_url)
            .field("api_token", &"[REDACTED]")
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_invalid_values() {
        assert!(RemoteConfig::new("", "token").is_err());
        assert!(RemoteConfig::new("api.example.com", "token").is_err());
        assert!(RemoteConfig::new("https://api.example.com", "  ").is_err());
    }

    #[test]
    fn normalizes_base_url() {
        let config = RemoteConfig::new(" https://api.example.com/ ", "token").unwrap();
        assert_eq!(config.base_url, "https://api.example.com");
    }

    #[test]
    fn debug_redacts_token() {
        let config = RemoteConfig::new("https://api.example.com", "secret").unwrap();
        let debug = format!("{config:?}");
        assert!(!debug.contains("secret"));
        assert!(debug.contains("[REDACTED]"));
    }
}
