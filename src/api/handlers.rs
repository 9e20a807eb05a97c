use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::Utc;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, warn};
use uuid::Uuid;

use super::auth::{authorize, TokenVerifier};
use super::types::*;
use crate::backends::LlmBackend;
use crate::pipeline::AnswerPipeline;
use crate::utils::document_fetch::DocumentSource;
use crate::utils::relevance::{select_window, KeywordTable, RelevanceConfig};

pub const SERVICE_NAME: &str = "policy-qa";
pub const SERVICE_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Read-only state shared by every request.
pub struct AppState {
    pub source: Arc<dyn DocumentSource>,
    pub pipeline: Arc<AnswerPipeline>,
    pub verifier: Arc<dyn TokenVerifier>,
    pub keywords: Arc<KeywordTable>,
    pub relevance: RelevanceConfig,
}

pub async fn run_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    payload: Result<Json<RunRequest>, JsonRejection>,
) -> Response {
    let request_id = Uuid::new_v4();

    if let Err(e) = authorize(&headers, state.verifier.as_ref()) {
        warn!(target: "api", %request_id, "Rejected request: {}", e);
        return e.into_response();
    }

    let Json(request) = match payload {
        Ok(json) => json,
        Err(rejection) => {
            warn!(target: "api", %request_id, "Invalid request body: {}", rejection.body_text());
            return (
                StatusCode::UNPROCESSABLE_ENTITY,
                Json(ErrorDetail {
                    detail: rejection.body_text(),
                }),
            )
                .into_response();
        }
    };

    let started = Instant::now();
    info!(
        target: "api",
        %request_id,
        document = %request.documents,
        questions = request.questions.len(),
        "Processing policy questions"
    );

    let extracted = match state.source.extract(&request.documents).await {
        Ok(extracted) => extracted,
        Err(e) => {
            warn!(target: "api", %request_id, "Document extraction failed: {}", e);
            let message = format!("Error: {}", e);
            let answers = vec![message; request.questions.len()];
            return (StatusCode::BAD_REQUEST, Json(RunResponse { answers })).into_response();
        }
    };

    let policy_text: Arc<str> = Arc::from(extracted.render());
    let answers = answer_all(&state, &request.questions, policy_text).await;

    info!(
        target: "api",
        %request_id,
        answers = answers.len(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "Request completed"
    );
    (StatusCode::OK, Json(RunResponse { answers })).into_response()
}

/// Answers questions one at a time, each in its own task so a panic stays local
/// to its index. The result always has one entry per question, in order.
async fn answer_all(state: &Arc<AppState>, questions: &[String], policy_text: Arc<str>) -> Vec<String> {
    let mut answers = Vec::with_capacity(questions.len());

    for (index, question) in questions.iter().enumerate() {
        let state = Arc::clone(state);
        let text = Arc::clone(&policy_text);
        let question = question.clone();

        let task = tokio::spawn(async move {
            let window = select_window(&question, &text, &state.keywords, &state.relevance);
            info!(target: "api", index, window_chars = window.chars().count(), "Relevance window ready");
            state.pipeline.answer(&question, &window).await
        });

        let answer = match task.await {
            Ok(answer) => answer,
            Err(e) => {
                error!(target: "api", index, "Question task failed: {}", e);
                format!("Error: failed to answer question: {}", e)
            }
        };
        answers.push(answer);
    }

    answers
}

fn backend_status(role_name: &str, backend: Option<&dyn LlmBackend>) -> BackendStatus {
    match backend {
        Some(b) => BackendStatus {
            name: b.name().to_string(),
            model: Some(b.model().to_string()),
            configured: true,
        },
        None => BackendStatus {
            name: role_name.to_string(),
            model: None,
            configured: false,
        },
    }
}

pub async fn health_handler(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let primary = backend_status("openai", state.pipeline.primary());
    let fallback = backend_status("gemini", state.pipeline.fallback());

    let configured = |name: &str| {
        [&primary, &fallback]
            .iter()
            .any(|b| b.configured && b.name == name)
    };

    Json(HealthResponse {
        status: "healthy".to_string(),
        service: SERVICE_NAME.to_string(),
        version: SERVICE_VERSION.to_string(),
        openai_configured: configured("openai"),
        gemini_configured: configured("gemini"),
        backends: BackendsStatus { primary, fallback },
    })
}

pub async fn root_handler() -> Json<EndpointDirectory> {
    let endpoints = [
        ("GET /", "This endpoint directory"),
        ("GET /health", "Service status and configured model backends"),
        (
            "POST /hackrx/run",
            "Answer questions about a policy PDF (Bearer token required)",
        ),
        ("POST /webhook/railway", "Railway deployment events"),
        ("POST /webhook/generic", "Generic event acknowledgement"),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect::<BTreeMap<_, _>>();

    Json(EndpointDirectory {
        service: SERVICE_NAME.to_string(),
        version: SERVICE_VERSION.to_string(),
        endpoints,
    })
}

pub async fn railway_webhook_handler(Json(payload): Json<Value>) -> Json<WebhookAck> {
    let event = payload
        .get("type")
        .and_then(Value::as_str)
        .map(str::to_string);
    let status = payload.get("status").and_then(Value::as_str).unwrap_or("unknown");
    let deployment_id = payload
        .pointer("/deployment/id")
        .and_then(Value::as_str)
        .unwrap_or("unknown");

    info!(
        target: "webhook",
        source = "railway",
        event = event.as_deref().unwrap_or("unknown"),
        status,
        deployment_id,
        "Received deployment webhook"
    );

    Json(WebhookAck {
        status: "received".to_string(),
        source: "railway".to_string(),
        event,
        received_at: Utc::now().to_rfc3339(),
        payload: None,
    })
}

pub async fn generic_webhook_handler(Json(payload): Json<Value>) -> Json<WebhookAck> {
    let keys = payload
        .as_object()
        .map(|o| o.keys().cloned().collect::<Vec<_>>().join(","))
        .unwrap_or_default();
    info!(target: "webhook", source = "generic", keys = %keys, "Received webhook");

    Json(WebhookAck {
        status: "received".to_string(),
        source: "generic".to_string(),
        event: None,
        received_at: Utc::now().to_rfc3339(),
        payload: Some(payload),
    })
}
