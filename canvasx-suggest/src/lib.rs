//! # canvasx-suggest - AI text suggestions for CanvasX
//!
//! Rewrites for a selected text box, served over HTTP by the relay and
//! fetched by editors. Suggestions are an optional enhancement: every
//! failure path ends in an empty list rather than an error for the caller.
//!
//! ## Modules
//!
//! - [`config`] - Provider configuration (API key, model, timeout)
//! - [`provider`] - Provider port, reply parsing, the [`Suggester`] service
//! - [`gemini`] - Gemini `generateContent` provider
//! - [`routes`] - `POST /api/ai-suggestions`
//! - [`client`] - Editor-side [`SuggestionClient`]

use thiserror::Error;

pub mod config;
pub mod provider;
pub mod gemini;
pub mod routes;
pub mod client;

pub use config::SuggestConfig;
pub use provider::{parse_suggestions, DisabledProvider, Suggester, SuggestionProvider};
pub use gemini::GeminiProvider;
pub use routes::{router, suggestion_routes, SuggestRequest, SuggestResponse, SuggestState};
pub use client::SuggestionClient;

#[derive(Error, Debug)]
pub enum SuggestError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Upstream returned {status}: {body}")]
    Upstream { status: u16, body: String },

    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    #[error("No suggestion provider configured")]
    Disabled,

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Suggester for an optional config: Gemini when a key is present,
/// disabled otherwise.
pub fn suggester_from_config(config: Option<SuggestConfig>) -> Result<Suggester, SuggestError> {
    match config {
        Some(config) => {
            let max = config.max_suggestions;
            let provider = GeminiProvider::new(config)?;
            Ok(Suggester::new(std::sync::Arc::new(provider)).with_max_suggestions(max))
        }
        None => Ok(Suggester::disabled()),
    }
}
