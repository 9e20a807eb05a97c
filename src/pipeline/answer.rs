use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

use super::prompts::{fallback_prompt, primary_prompt};
use crate::backends::{BackendReply, LlmBackend};
use crate::utils::text::truncate_chars;

pub const DEFAULT_MAX_CONTEXT_CHARS: usize = 100_000;
const TRUNCATION_MARKER: &str = "\n... [Policy text truncated due to length]";

/// Providers named in diagnostics when a role has no backend.
const PRIMARY_PROVIDER: &str = "openai";
const FALLBACK_PROVIDER: &str = "gemini";

/// Primary-then-fallback question answering over one policy text.
pub struct AnswerPipeline {
    primary: Option<Arc<dyn LlmBackend>>,
    fallback: Option<Arc<dyn LlmBackend>>,
    max_context_chars: usize,
}

impl AnswerPipeline {
    pub fn new(
        primary: Option<Arc<dyn LlmBackend>>,
        fallback: Option<Arc<dyn LlmBackend>>,
    ) -> Self {
        Self {
            primary,
            fallback,
            max_context_chars: DEFAULT_MAX_CONTEXT_CHARS,
        }
    }

    pub fn with_max_context_chars(mut self, max_context_chars: usize) -> Self {
        self.max_context_chars = max_context_chars;
        self
    }

    pub fn primary(&self) -> Option<&dyn LlmBackend> {
        self.primary.as_deref()
    }

    pub fn fallback(&self) -> Option<&dyn LlmBackend> {
        self.fallback.as_deref()
    }

    /// Answers one question. Never fails: when both backends fail the returned
    /// string is a diagnostic naming both reasons.
    pub async fn answer(&self, question: &str, policy_text: &str) -> String {
        let started = Instant::now();
        let context = truncate_chars(policy_text, self.max_context_chars, TRUNCATION_MARKER);

        let primary_reason = match call(self.primary.as_deref(), "primary", PRIMARY_PROVIDER, || {
            primary_prompt(question, &context)
        })
        .await
        {
            Ok(text) => {
                info!(target: "pipeline", backend = "primary", len = text.len(), elapsed_ms = started.elapsed().as_millis() as u64, "Answer produced");
                return text;
            }
            Err(reason) => reason,
        };

        warn!(target: "pipeline", reason = %primary_reason, "Primary backend unusable; trying fallback");

        let fallback_reason = match call(self.fallback.as_deref(), "fallback", FALLBACK_PROVIDER, || {
            fallback_prompt(question, &context)
        })
        .await
        {
            Ok(text) => {
                info!(target: "pipeline", backend = "fallback", len = text.len(), elapsed_ms = started.elapsed().as_millis() as u64, "Answer produced");
                return text;
            }
            Err(reason) => reason,
        };

        warn!(target: "pipeline", reason = %fallback_reason, elapsed_ms = started.elapsed().as_millis() as u64, "Both backends failed");
        format!(
            "AI model error: primary {}; fallback {}",
            primary_reason, fallback_reason
        )
    }
}

/// One attempt against an optional backend. `Err` carries a reason naming the backend.
async fn call<F>(
    backend: Option<&dyn LlmBackend>,
    role: &str,
    provider: &str,
    build_prompt: F,
) -> Result<String, String>
where
    F: FnOnce() -> crate::backends::Prompt,
{
    let Some(backend) = backend else {
        return Err(format!("({}): {} backend is not configured", provider, provider));
    };

    info!(target: "pipeline", role, backend = backend.name(), model = backend.model(), "Selected model");
    match backend.generate(&build_prompt()).await {
        BackendReply::Success(text) => Ok(text),
        BackendReply::Empty => Err(format!("({}): empty response", backend.name())),
        BackendReply::Failure(reason) => Err(format!("({}): {}", backend.name(), reason)),
    }
}
