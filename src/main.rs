use std::process;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

mod api;
mod backends;
mod config;
mod pipeline;
mod utils;

use api::auth::{AcceptAnyToken, StaticToken, TokenVerifier};
use api::{ApiServer, AppState};
use backends::gemini::GeminiBackend;
use backends::openai::OpenAiBackend;
use backends::LlmBackend;
use config::Settings;
use pipeline::AnswerPipeline;
use utils::document_fetch::HttpDocumentSource;
use utils::relevance::RelevanceConfig;

/// Prints the startup banner to stderr, one centered line per entry.
fn print_banner(lines: &[String]) {
    const BOX_WIDTH: usize = 60;
    const CONTENT_WIDTH: usize = BOX_WIDTH - 4;

    eprintln!("\n\x1b[36m╔{}╗", "═".repeat(BOX_WIDTH - 2));
    for line in lines {
        let visible = line.chars().count();
        if visible < CONTENT_WIDTH {
            let left = (CONTENT_WIDTH - visible) / 2;
            let right = CONTENT_WIDTH - visible - left;
            eprintln!("║  {}{}{}  ║", " ".repeat(left), line, " ".repeat(right));
        } else {
            eprintln!("║  {}  ║", line);
        }
    }
    eprintln!("╚{}╝\x1b[0m\n", "═".repeat(BOX_WIDTH - 2));
}

fn init_logging(quiet: bool) {
    // RUST_LOG wins over the quiet flag
    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else if quiet {
        EnvFilter::new("error")
    } else {
        EnvFilter::new("info")
    };

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(filter)
        .init();
}

fn build_backends(settings: &Settings) -> (Option<Arc<dyn LlmBackend>>, Option<Arc<dyn LlmBackend>>) {
    let primary = match &settings.openai_api_key {
        Some(key) => match OpenAiBackend::new(
            key.clone(),
            settings.openai_model.clone(),
            settings.model_timeout,
        ) {
            Ok(backend) => {
                info!("OpenAI backend enabled (model {})", settings.openai_model);
                Some(Arc::new(backend) as Arc<dyn LlmBackend>)
            }
            Err(e) => {
                error!("Failed to initialise OpenAI backend: {}", e);
                None
            }
        },
        None => {
            warn!("OPENAI_API_KEY not set - primary backend disabled");
            None
        }
    };

    let fallback = match &settings.gemini_api_key {
        Some(key) => match GeminiBackend::new(
            key.clone(),
            settings.gemini_model.clone(),
            settings.model_timeout,
        ) {
            Ok(backend) => {
                info!("Gemini backend enabled (model {})", settings.gemini_model);
                Some(Arc::new(backend) as Arc<dyn LlmBackend>)
            }
            Err(e) => {
                error!("Failed to initialise Gemini backend: {}", e);
                None
            }
        },
        None => {
            warn!("GEMINI_API_KEY not set - fallback backend disabled");
            None
        }
    };

    (primary, fallback)
}

fn build_state(settings: &Settings) -> anyhow::Result<AppState> {
    let keywords = settings.keyword_table()?;
    info!("Keyword table loaded with {} clusters", keywords.clusters().len());

    let verifier: Arc<dyn TokenVerifier> = match &settings.api_token {
        Some(token) => {
            info!("Bearer token verification enabled");
            Arc::new(StaticToken::new(token.clone()))
        }
        None => {
            info!("No API token configured - any Bearer token is accepted");
            Arc::new(AcceptAnyToken)
        }
    };

    let (primary, fallback) = build_backends(settings);
    if primary.is_none() && fallback.is_none() {
        warn!("No model backend configured - every answer will be an error message");
    }

    Ok(AppState {
        source: Arc::new(HttpDocumentSource::new(settings.fetch_timeout)?),
        pipeline: Arc::new(
            AnswerPipeline::new(primary, fallback).with_max_context_chars(settings.max_context_chars),
        ),
        verifier,
        keywords: Arc::new(keywords),
        relevance: RelevanceConfig::default(),
    })
}

#[tokio::main]
async fn main() {
    // .env must be loaded before clap reads its env fallbacks
    dotenv::dotenv().ok();

    let matches = config::command().get_matches();
    let settings = Settings::from_matches(&matches);
    init_logging(settings.quiet);

    let addr = match settings.bind_addr() {
        Ok(addr) => addr,
        Err(e) => {
            error!("{:#}", e);
            process::exit(1);
        }
    };

    let state = match build_state(&settings) {
        Ok(state) => state,
        Err(e) => {
            error!("Failed to initialise service: {:#}", e);
            process::exit(1);
        }
    };

    if !settings.quiet {
        print_banner(&[
            String::new(),
            "policy-qa: Insurance Policy Q&A".to_string(),
            String::new(),
            format!("POST http://{}/hackrx/run", addr),
            String::new(),
        ]);
    }

    info!("Starting HTTP server...");
    if let Err(e) = ApiServer::new(addr, state).start().await {
        error!("Failed to start server: {:#}", e);
        process::exit(1);
    }
}
