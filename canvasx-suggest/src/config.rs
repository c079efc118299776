//! Suggestion provider configuration.
//!
//! ```ignore
//! let config = SuggestConfig::new(api_key)
//!     .with_model("gemini-2.0-flash")
//!     .with_timeout(Duration::from_secs(10));
//! ```

use std::time::Duration;

use secrecy::{ExposeSecret, Secret};

pub const DEFAULT_MODEL: &str = "gemini-2.0-flash";
pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";
pub const DEFAULT_MAX_SUGGESTIONS: usize = 4;

/// Configuration for the Gemini-backed provider.
#[derive(Debug, Clone)]
pub struct SuggestConfig {
    /// API key. Never logged.
    api_key: Secret<String>,
    /// Model name, e.g. "gemini-2.0-flash".
    pub model: String,
    /// API root without a trailing slash.
    pub base_url: String,
    /// Request timeout.
    pub timeout: Duration,
    /// Upper bound on suggestions returned per request.
    pub max_suggestions: usize,
}

impl SuggestConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: Secret::new(api_key.into()),
            model: DEFAULT_MODEL.to_string(),
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout: Duration::from_secs(30),
            max_suggestions: DEFAULT_MAX_SUGGESTIONS,
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_max_suggestions(mut self, max: usize) -> Self {
        self.max_suggestions = max;
        self
    }

    pub(crate) fn api_key(&self) -> &str {
        self.api_key.expose_secret()
    }
}

impl Default for SuggestConfig {
    /// A config with an empty key; only useful with a mock upstream.
    fn default() -> Self {
        Self::new(String::new())
    }
}
