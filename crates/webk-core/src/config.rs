//! Environment-driven configuration.

use serde::{Deserialize, Serialize};
use tracing::warn;

/// Hosted relay used when `WEBK_API_URL` is not set.
pub const DEFAULT_API_URL: &str = "https://web-k-backend.vercel.app/api/ask";

/// Default port for the relay backend.
pub const DEFAULT_PORT: u16 = 3001;

/// Top-level Web-K configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebKConfig {
    /// Endpoint the chat relay posts conversations to.
    pub api_url: String,
    /// HTTP server port for the relay backend.
    pub port: u16,
}

impl Default for WebKConfig {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.into(),
            port: DEFAULT_PORT,
        }
    }
}

impl WebKConfig {
    /// Create configuration from environment and defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build configuration from an arbitrary variable lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let api_url = lookup("WEBK_API_URL")
            .map(|u| u.trim().to_string())
            .filter(|u| !u.is_empty())
            .unwrap_or_else(|| DEFAULT_API_URL.into());

        let port = match lookup("PORT") {
            Some(p) => p.trim().parse().unwrap_or_else(|_| {
                warn!("Invalid PORT {:?}, using {}", p, DEFAULT_PORT);
                DEFAULT_PORT
            }),
            None => DEFAULT_PORT,
        };

        Self { api_url, port }
    }
}
