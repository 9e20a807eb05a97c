use async_trait::async_trait;
use reqwest::{header, Client};
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use super::{api_error, BackendError, BackendReply, LlmBackend, Prompt};

pub const DEFAULT_MODEL: &str = "gpt-4-turbo-preview";
const ENDPOINT: &str = "https://api.openai.com/v1/chat/completions";
const TEMPERATURE: f64 = 0.1;
const MAX_TOKENS: u32 = 1000;

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f64,
    max_tokens: u32,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Option<Vec<ChatChoice>>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: Option<ChatReplyMessage>,
}

#[derive(Debug, Deserialize)]
struct ChatReplyMessage {
    content: Option<String>,
}

/// OpenAI chat-completions backend.
pub struct OpenAiBackend {
    client: Client,
    api_key: String,
    model: String,
    endpoint: String,
}

impl OpenAiBackend {
    pub fn new(api_key: String, model: String, timeout: Duration) -> Result<Self, BackendError> {
        Self::with_endpoint(api_key, model, timeout, ENDPOINT.to_string())
    }

    pub fn with_endpoint(
        api_key: String,
        model: String,
        timeout: Duration,
        endpoint: String,
    ) -> Result<Self, BackendError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            api_key,
            model,
            endpoint,
        })
    }

    async fn call(&self, prompt: &Prompt) -> Result<BackendReply, BackendError> {
        let mut messages = Vec::with_capacity(2);
        if let Some(system) = prompt.system.as_deref() {
            messages.push(ChatMessage {
                role: "system",
                content: system,
            });
        }
        messages.push(ChatMessage {
            role: "user",
            content: &prompt.user,
        });

        let body = ChatRequest {
            model: &self.model,
            messages,
            temperature: TEMPERATURE,
            max_tokens: MAX_TOKENS,
        };

        debug!(target: "backend", model = %self.model, "Sending chat completion request");

        let response = self
            .client
            .post(&self.endpoint)
            .header(header::AUTHORIZATION, format!("Bearer {}", self.api_key))
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(api_error(response).await);
        }

        let text = response.text().await?;
        decode_chat_response(&text)
    }
}

/// Decodes a chat-completions body. A missing or empty `choices` list is a failure;
/// a present choice without usable content is an empty reply.
fn decode_chat_response(body: &str) -> Result<BackendReply, BackendError> {
    let parsed: ChatResponse = serde_json::from_str(body)?;
    let first = parsed
        .choices
        .and_then(|choices| choices.into_iter().next())
        .ok_or_else(|| BackendError::Api("response contained no choices".to_string()))?;

    Ok(BackendReply::from_text(
        first.message.and_then(|m| m.content),
    ))
}

#[async_trait]
impl LlmBackend for OpenAiBackend {
    fn name(&self) -> &str {
        "openai"
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
                info!(target: "backend", backend = "openai", model = %self.model, len = text.len(), elapsed_ms, "Completion succeeded")
            }
            BackendReply::Empty => {
                warn!(target: "backend", backend = "openai", model = %self.model, elapsed_ms, "Completion was empty")
            }
            BackendReply::Failure(reason) => {
                warn!(target: "backend", backend = "openai", model = %self.model, elapsed_ms, "Completion failed: {}", reason)
            }
        }
        reply
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn prompt() -> Prompt {
        Prompt {
            system: Some("You answer from the policy.".to_string()),
            user: "What is the grace period?".to_string(),
        }
    }

    async fn backend_for(server: &mockito::ServerGuard) -> OpenAiBackend {
        OpenAiBackend::with_endpoint(
            "sk-test".to_string(),
            DEFAULT_MODEL.to_string(),
            Duration::from_secs(5),
            format!("{}/v1/chat/completions", server.url()),
        )
        .expect("backend")
    }

    #[test]
    fn decodes_first_choice() {
        let body = json!({
            "choices": [{"message": {"role": "assistant", "content": " Thirty days. "}, "finish_reason": "stop"}]
        })
        .to_string();
        assert_eq!(
            decode_chat_response(&body).unwrap(),
            BackendReply::Success("Thirty days.".to_string())
        );
    }

    #[test]
    fn null_content_is_empty() {
        let body = json!({"choices": [{"message": {"content": null}}]}).to_string();
        assert_eq!(decode_chat_response(&body).unwrap(), BackendReply::Empty);
    }

    #[test]
    fn missing_choices_is_an_error() {
        assert!(decode_chat_response(r#"{"choices": []}"#).is_err());
        assert!(decode_chat_response(r#"{"id": "x"}"#).is_err());
        assert!(decode_chat_response("not json").is_err());
    }

    #[tokio::test]
    async fn sends_system_and_user_messages() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/v1/chat/completions")
            .match_header("authorization", "Bearer sk-test")
            .match_body(mockito::Matcher::PartialJson(json!({
                "model": DEFAULT_MODEL,
                "messages": [
                    {"role": "system", "content": "You answer from the policy."},
                    {"role": "user", "content": "What is the grace period?"}
                ],
                "max_tokens": 1000
            })))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(json!({"choices": [{"message": {"content": "30 days"}}]}).to_string())
            .create_async()
            .await;

        let reply = backend_for(&server).await.generate(&prompt()).await;
        assert_eq!(reply, BackendReply::Success("30 days".to_string()));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn non_success_status_is_a_failure() {
        let mut server = mockito::Server::new_async().await;
        let _m = server
            .mock("POST", "/v1/chat/completions")
            .with_status(429)
            .with_body(r#"{"error": {"message": "rate limited"}}"#)
            .create_async()
            .await;

        match backend_for(&server).await.generate(&prompt()).await {
            BackendReply::Failure(reason) => {
                assert!(reason.contains("429"));
                assert!(reason.contains("rate limited"));
            }
            other => panic!("expected failure, got {:?}", other),
        }
    }
}
