pub mod gemini;
pub mod openai;

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_MODEL_TIMEOUT: Duration = Duration::from_secs(30);

/// A prompt handed to a completion backend. Backends without a system role fold
/// `system` into the user text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prompt {
    pub system: Option<String>,
    pub user: String,
}

/// Uniform outcome of one backend call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendReply {
    Success(String),
    Empty,
    Failure(String),
}

impl BackendReply {
    /// Maps decoded text to `Success`, or `Empty` when it is missing or blank.
    pub fn from_text(text: Option<String>) -> Self {
        match text {
            Some(t) if !t.trim().is_empty() => BackendReply::Success(t.trim().to_string()),
            _ => BackendReply::Empty,
        }
    }
}

#[derive(Error, Debug)]
pub enum BackendError {
    #[error("HTTP request error: {0}")]
    Request(#[from] reqwest::Error),

    #[error("API error: {0}")]
    Api(String),

    #[error("Malformed response: {0}")]
    Decode(#[from] serde_json::Error),
}

impl From<BackendError> for BackendReply {
    fn from(err: BackendError) -> Self {
        BackendReply::Failure(err.to_string())
    }
}

#[async_trait]
pub trait LlmBackend: Send + Sync {
    /// Provider name used in logs and diagnostics
    fn name(&self) -> &str;

    fn model(&self) -> &str;

    /// Performs exactly one completion call. Never retries.
    async fn generate(&self, prompt: &Prompt) -> BackendReply;
}

/// Reads an error response body into a short `Api` error.
pub(crate) async fn api_error(response: reqwest::Response) -> BackendError {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    let detail = crate::utils::text::truncate_chars(body.trim(), 300, "...");
    if detail.is_empty() {
        BackendError::Api(format!("HTTP Status: {}", status))
    } else {
        BackendError::Api(format!("HTTP Status: {} - {}", status, detail))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_text_is_empty() {
        assert_eq!(BackendReply::from_text(None), BackendReply::Empty);
        assert_eq!(
            BackendReply::from_text(Some("  \n".to_string())),
            BackendReply::Empty
        );
        assert_eq!(
            BackendReply::from_text(Some(" 30 days \n".to_string())),
            BackendReply::Success("30 days".to_string())
        );
    }

    #[test]
    fn errors_become_failures() {
        let reply: BackendReply = BackendError::Api("HTTP Status: 500".to_string()).into();
        assert_eq!(
            reply,
            BackendReply::Failure("API error: HTTP Status: 500".to_string())
        );
    }
}
