use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use super::{api_error, BackendError, BackendReply, LlmBackend, Prompt};

pub const DEFAULT_MODEL: &str = "gemini-2.0-flash";
const BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta/models";

const SAFETY_CATEGORIES: &[&str] = &[
    "HARM_CATEGORY_HARASSMENT",
    "HARM_CATEGORY_HATE_SPEECH",
    "HARM_CATEGORY_SEXUALLY_EXPLICIT",
    "HARM_CATEGORY_DANGEROUS_CONTENT",
];
const SAFETY_THRESHOLD: &str = "BLOCK_MEDIUM_AND_ABOVE";

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest<'a> {
    contents: Vec<Content<'a>>,
    safety_settings: Vec<SafetySetting<'a>>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
struct Content<'a> {
    role: &'a str,
    parts: Vec<Part<'a>>,
}

#[derive(Debug, Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Debug, Serialize)]
struct SafetySetting<'a> {
    category: &'a str,
    threshold: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f64,
    max_output_tokens: u32,
    top_p: f64,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            temperature: 0.1,
            max_output_tokens: 1000,
            top_p: 0.8,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateResponse {
    candidates: Option<Vec<Candidate>>,
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    content: Option<CandidateContent>,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Debug, Deserialize)]
struct CandidatePart {
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    block_reason: Option<String>,
}

/// Google Gemini `generateContent` backend.
pub struct GeminiBackend {
    client: Client,
    api_key: String,
    model: String,
    base_url: String,
}

impl GeminiBackend {
    pub fn new(api_key: String, model: String, timeout: Duration) -> Result<Self, BackendError> {
        Self::with_base_url(api_key, model, timeout, BASE_URL.to_string())
    }

    pub fn with_base_url(
        api_key: String,
        model: String,
        timeout: Duration,
        base_url: String,
    ) -> Result<Self, BackendError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            api_key,
            model,
            base_url,
        })
    }

    async fn call(&self, prompt: &Prompt) -> Result<BackendReply, BackendError> {
        // generateContent has no system role here; the system text leads the single prompt.
        let text = match prompt.system.as_deref() {
            Some(system) => format!("{}\n\n{}", system, prompt.user),
            None => prompt.user.clone(),
        };

        let body = GenerateRequest {
            contents: vec![Content {
                role: "user",
                parts: vec![Part { text: &text }],
            }],
            safety_settings: SAFETY_CATEGORIES
                .iter()
                .map(|&category| SafetySetting {
                    category,
                    threshold: SAFETY_THRESHOLD,
                })
                .collect(),
            generation_config: GenerationConfig::default(),
        };

        let url = format!("{}/{}:generateContent", self.base_url, self.model);
        debug!(target: "backend", model = %self.model, "Sending generateContent request");

        let response = self
            .client
            .post(&url)
            .query(&[("key", self.api_key.as_str())])
            .json(&body)
            .send()
            .await
            .map_err(|e| BackendError::Request(e.without_url()))?;

        if !response.status().is_success() {
            return Err(api_error(response).await);
        }

        // the request URL carries the key; keep it out of error text
        let text = response
            .text()
            .await
            .map_err(|e| BackendError::Request(e.without_url()))?;
        decode_generate_response(&text)
    }
}

/// Decodes a generateContent body. Blocked prompts and missing candidates are failures;
/// a candidate whose parts carry no text is an empty reply.
fn decode_generate_response(body: &str) -> Result<BackendReply, BackendError> {
    let parsed: GenerateResponse = serde_json::from_str(body)?;

    if let Some(reason) = parsed.prompt_feedback.and_then(|f| f.block_reason) {
        return Err(BackendError::Api(format!("prompt blocked: {}", reason)));
    }

    let candidate = parsed
        .candidates
        .and_then(|c| c.into_iter().next())
        .ok_or_else(|| BackendError::Api("response contained no candidates".to_string()))?;

    if candidate.finish_reason.as_deref() == Some("SAFETY") {
        return Err(BackendError::Api("candidate blocked by safety filters".to_string()));
    }

    let text = candidate.content.map(|c| {
        c.parts
            .into_iter()
            .filter_map(|p| p.text)
            .collect::<Vec<_>>()
            .join("")
    });
    Ok(BackendReply::from_text(text))
}

#[async_trait]
impl LlmBackend for GeminiBackend {
    fn name(&self) -> &str {
        "gemini"
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn generate(&self, prompt: &Prompt) -> BackendReply {
        let started = Instant::now();
        let reply = self.call(prompt).await.unwrap_or_else(BackendReply::from);
        let elapsed_ms = started.elapsed().as_millis() as u64;

        match &reply {
            BackendReply::Success(text) => {
                info!(target: "backend", backend = "gemini", model = %self.model, len = text.len(), elapsed_ms, "Completion succeeded")
            }
            BackendReply::Empty => {
                warn!(target: "backend", backend = "gemini", model = %self.model, elapsed_ms, "Completion was empty")
            }
            BackendReply::Failure(reason) => {
                warn!(target: "backend", backend = "gemini", model = %self.model, elapsed_ms, "Completion failed: {}", reason)
            }
        }
        reply
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn joins_candidate_parts() {
        let body = json!({
            "candidates": [{
                "content": {"parts": [{"text": "Thirty "}, {"text": "days."}], "role": "model"},
                "finishReason": "STOP"
            }]
        })
        .to_string();
        assert_eq!(
            decode_generate_response(&body).unwrap(),
            BackendReply::Success("Thirty days.".to_string())
        );
    }

    #[test]
    fn candidate_without_text_is_empty() {
        let body = json!({"candidates": [{"content": {"parts": []}, "finishReason": "STOP"}]})
            .to_string();
        assert_eq!(decode_generate_response(&body).unwrap(), BackendReply::Empty);
    }

    #[test]
    fn blocked_or_missing_candidates_are_errors() {
        let blocked = json!({"promptFeedback": {"blockReason": "SAFETY"}}).to_string();
        assert!(decode_generate_response(&blocked).is_err());

        let safety_stop = json!({"candidates": [{"finishReason": "SAFETY"}]}).to_string();
        assert!(decode_generate_response(&safety_stop).is_err());

        assert!(decode_generate_response(r#"{"candidates": []}"#).is_err());
    }

    #[tokio::test]
    async fn sends_safety_settings_and_generation_config() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/gemini-2.0-flash:generateContent")
            .match_query(mockito::Matcher::UrlEncoded(
                "key".to_string(),
                "g-test".to_string(),
            ))
            .match_body(mockito::Matcher::PartialJson(json!({
                "contents": [{"role": "user", "parts": [{"text": "Single prompt"}]}],
                "generationConfig": {"maxOutputTokens": 1000}
            })))
            .with_status(200)
            .with_body(
                json!({"candidates": [{"content": {"parts": [{"text": "Covered"}]}}]}).to_string(),
            )
            .create_async()
            .await;

        let backend = GeminiBackend::with_base_url(
            "g-test".to_string(),
            DEFAULT_MODEL.to_string(),
            Duration::from_secs(5),
            server.url(),
        )
        .expect("backend");

        let reply = backend
            .generate(&Prompt {
                system: None,
                user: "Single prompt".to_string(),
            })
            .await;
        assert_eq!(reply, BackendReply::Success("Covered".to_string()));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn server_error_is_a_failure() {
        let mut server = mockito::Server::new_async().await;
        let _m = server
            .mock("POST", "/gemini-2.0-flash:generateContent")
            .match_query(mockito::Matcher::Any)
            .with_status(503)
            .create_async()
            .await;

        let backend = GeminiBackend::with_base_url(
            "g-test".to_string(),
            DEFAULT_MODEL.to_string(),
            Duration::from_secs(5),
            server.url(),
        )
        .expect("backend");

        let reply = backend
            .generate(&Prompt {
                system: None,
                user: "q".to_string(),
            })
            .await;
        assert!(matches!(reply, BackendReply::Failure(ref r) if r.contains("503")));
    }
}
