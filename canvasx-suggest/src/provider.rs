//! Provider port and the suggestion service built on it.
//!
//! A [`SuggestionProvider`] turns a prompt into raw completion text. The
//! [`Suggester`] owns everything around that call: the prompt wording,
//! splitting the reply into lines, and collapsing any provider failure into
//! an empty list. Suggestions are optional, so nothing here is fatal.

use std::sync::Arc;

use async_trait::async_trait;

use crate::config::DEFAULT_MAX_SUGGESTIONS;
use crate::SuggestError;

/// Anything that can complete a prompt.
#[async_trait]
pub trait SuggestionProvider: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<String, SuggestError>;

    /// Short name for logs.
    fn name(&self) -> &str;
}

/// Stand-in used when no API key is configured.
#[derive(Debug, Default, Clone, Copy)]
pub struct DisabledProvider;

#[async_trait]
impl SuggestionProvider for DisabledProvider {
    async fn generate(&self, _prompt: &str) -> Result<String, SuggestError> {
        Err(SuggestError::Disabled)
    }

    fn name(&self) -> &str {
        "disabled"
    }
}

pub fn build_prompt(text: &str) -> String {
    format!(
        "Provide 3-4 concise and relevant suggestions for a slogan or caption to improve \
         the following text from a canvas textbox. Do not include any explanatory text, \
         descriptions, or information in brackets or parentheses. Just provide the \
         slogan/caption itself. Format each suggestion on a new line: \"{text}\""
    )
}

/// One suggestion per non-blank line, trimmed, in order, at most `max`.
pub fn parse_suggestions(raw: &str, max: usize) -> Vec<String> {
    raw.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .take(max)
        .map(str::to_string)
        .collect()
}

/// Suggestion service shared by the HTTP route.
#[derive(Clone)]
pub struct Suggester {
    provider: Arc<dyn SuggestionProvider>,
    max_suggestions: usize,
}

impl Suggester {
    pub fn new(provider: Arc<dyn SuggestionProvider>) -> Self {
        Self {
            provider,
            max_suggestions: DEFAULT_MAX_SUGGESTIONS,
        }
    }

    pub fn disabled() -> Self {
        Self::new(Arc::new(DisabledProvider))
    }

    pub fn with_max_suggestions(mut self, max: usize) -> Self {
        self.max_suggestions = max;
        self
    }

    pub fn provider_name(&self) -> &str {
        self.provider.name()
    }

    /// Suggestions for `text`; empty for blank input or any provider failure.
    pub async fn suggest(&self, text: &str) -> Vec<String> {
        let text = text.trim();
        if text.is_empty() {
            return Vec::new();
        }

        match self.provider.generate(&build_prompt(text)).await {
            Ok(raw) => {
                let suggestions = parse_suggestions(&raw, self.max_suggestions);
                log::debug!(
                    "{} returned {} suggestion(s)",
                    self.provider.name(),
                    suggestions.len()
                );
                suggestions
            }
            Err(SuggestError::Disabled) => {
                log::debug!("Suggestions disabled, returning none");
                Vec::new()
            }
            Err(e) => {
                log::warn!("Suggestion provider {} failed: {e}", self.provider.name());
                Vec::new()
            }
        }
    }
}
