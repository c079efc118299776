//! HTTP endpoint for text suggestions.
//!
//! # Routes
//!
//! - `POST /api/ai-suggestions` - body `{ "text": "..." }` (or the older
//!   `{ "selectedText": "..." }`), reply `{ "suggestions": [...] }`
//!
//! A missing, non-JSON or unreadable body counts as no input and gets an
//! empty list, never a rejection.

use std::sync::Arc;

use axum::body::Bytes;
use axum::{extract::State, http::StatusCode, response::IntoResponse, routing::post, Json, Router};
use serde::{Deserialize, Serialize};

use crate::provider::Suggester;
use crate::SuggestError;

pub const SUGGESTIONS_PATH: &str = "/api/ai-suggestions";

#[derive(Clone)]
pub struct SuggestState {
    pub suggester: Arc<Suggester>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SuggestRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    /// Older field name; used only when `text` is absent or blank.
    #[serde(default, rename = "selectedText", skip_serializing_if = "Option::is_none")]
    pub selected_text: Option<String>,
}

impl SuggestRequest {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            selected_text: None,
        }
    }

    /// The text to rewrite, if any non-blank one was sent.
    pub fn input(&self) -> Option<&str> {
        [&self.text, &self.selected_text]
            .into_iter()
            .flatten()
            .map(String::as_str)
            .find(|text| !text.trim().is_empty())
    }

    /// Lenient parse: anything unreadable is an empty request.
    pub fn from_body(body: &[u8]) -> Self {
        if body.iter().all(u8::is_ascii_whitespace) {
            return Self::default();
        }
        serde_json::from_slice(body).unwrap_or_else(|e| {
            log::debug!("Unreadable suggestion request, treating as empty: {e}");
            Self::default()
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SuggestResponse {
    pub suggestions: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

impl IntoResponse for SuggestError {
    fn into_response(self) -> axum::response::Response {
        log::error!("Suggestion endpoint failed: {self}");
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ErrorResponse {
                error: "Failed to generate suggestions".to_string(),
            }),
        )
            .into_response()
    }
}

/// POST /api/ai-suggestions
pub async fn suggest(
    State(state): State<SuggestState>,
    body: Bytes,
) -> Result<Json<SuggestResponse>, SuggestError> {
    let request = SuggestRequest::from_body(&body);
    let Some(text) = request.input().map(str::to_string) else {
        return Ok(Json(SuggestResponse::default()));
    };

    // The provider runs on its own task so a panic in it becomes a 500
    // instead of tearing down the connection.
    let suggester = state.suggester.clone();
    let suggestions = tokio::spawn(async move { suggester.suggest(&text).await })
        .await
        .map_err(|e| SuggestError::Internal(e.to_string()))?;

    Ok(Json(SuggestResponse { suggestions }))
}

pub fn suggestion_routes() -> Router<SuggestState> {
    Router::new().route(SUGGESTIONS_PATH, post(suggest))
}

/// Ready-to-serve router for `suggester`.
pub fn router(suggester: Arc<Suggester>) -> Router {
    suggestion_routes().with_state(SuggestState { suggester })
}
