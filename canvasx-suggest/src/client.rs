//! Editor-side caller of the suggestion endpoint.

use std::time::Duration;

use canvasx_core::PLACEHOLDER_TEXT;
use reqwest::Client;

use crate::routes::{SuggestRequest, SuggestResponse, SUGGESTIONS_PATH};
use crate::SuggestError;

pub struct SuggestionClient {
    endpoint: String,
    client: Client,
}

impl SuggestionClient {
    /// `base_url` is the relay's HTTP root, e.g. `http://127.0.0.1:3080`.
    pub fn new(base_url: &str) -> Result<Self, SuggestError> {
        Self::with_timeout(base_url, Duration::from_secs(30))
    }

    pub fn with_timeout(base_url: &str, timeout: Duration) -> Result<Self, SuggestError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            endpoint: format!("{}{SUGGESTIONS_PATH}", base_url.trim_end_matches('/')),
            client,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Suggestions for the selected element's text.
    ///
    /// Blank text and the untouched placeholder never leave the process.
    /// Any failure is logged and yields an empty list.
    pub async fn fetch(&self, text: &str) -> Vec<String> {
        let trimmed = text.trim();
        if trimmed.is_empty() || trimmed == PLACEHOLDER_TEXT {
            return Vec::new();
        }

        match self.request(text).await {
            Ok(suggestions) => suggestions,
            Err(e) => {
                log::warn!("Fetching suggestions failed: {e}");
                Vec::new()
            }
        }
    }

    async fn request(&self, text: &str) -> Result<Vec<String>, SuggestError> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(&SuggestRequest::new(text))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SuggestError::Upstream {
                status: status.as_u16(),
                body,
            });
        }

        let body: SuggestResponse = response.json().await?;
        Ok(body.suggestions)
    }
}
