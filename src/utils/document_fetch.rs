use async_trait::async_trait;
use reqwest::Client;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{info, warn};

use super::pdf::{extract_pages_from_mem, is_pdf, ExtractedText};

// Firefox ESR User-Agent string to reduce server-side variance
pub const FIREFOX_UA: &str =
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10.15; rv:115.0) Gecko/20100101 Firefox/115.0";

pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(15);

const PDF_LIMIT_BYTES: usize = 50 * 1024 * 1024; // 50 MiB

#[derive(Error, Debug)]
pub enum DocumentError {
    #[error("PDF extraction failed: could not fetch document: {0}")]
    Fetch(String),

    #[error("PDF extraction failed: could not parse document: {0}")]
    Parse(String),

    #[error("PDF extraction failed: no text extracted from PDF")]
    EmptyContent,
}

/// Anything that can turn a document URL into extracted policy text.
#[async_trait]
pub trait DocumentSource: Send + Sync {
    async fn extract(&self, url: &str) -> Result<ExtractedText, DocumentError>;
}

/// Fetches PDFs over HTTP and extracts their text.
pub struct HttpDocumentSource {
    client: Client,
}

impl HttpDocumentSource {
    pub fn new(timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(FIREFOX_UA)
            .build()?;
        Ok(Self { client })
    }

    async fn fetch_bytes(&self, url: &url::Url) -> Result<(Vec<u8>, Option<String>), DocumentError> {
        info!(target: "document_fetch", url = %url, "Starting HTTP fetch");

        let response = self.client.get(url.as_str()).send().await.map_err(|e| {
            warn!(target: "document_fetch", url = %url, "HTTP transport error: {}", e);
            DocumentError::Fetch(e.to_string())
        })?;

        if !response.status().is_success() {
            let status = response.status();
            let reason = status.canonical_reason().unwrap_or("Unknown error");
            warn!(target: "document_fetch", url = %url, status = status.as_u16(), "HTTP non-success status");
            return Err(DocumentError::Fetch(format!(
                "HTTP error {}: {}",
                status.as_u16(),
                reason
            )));
        }

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|ct| ct.to_str().ok())
            .map(|s| s.to_string());

        let body = response.bytes().await.map_err(|e| {
            warn!(target: "document_fetch", url = %url, "Body read failed: {}", e);
            DocumentError::Fetch(format!("failed to read response body: {}", e))
        })?;

        info!(target: "document_fetch", url = %url, size = body.len(), ct = ?content_type, "HTTP fetch completed");
        Ok((body.to_vec(), content_type))
    }
}

#[async_trait]
impl DocumentSource for HttpDocumentSource {
    async fn extract(&self, url: &str) -> Result<ExtractedText, DocumentError> {
        let parsed = url::Url::parse(url)
            .map_err(|e| DocumentError::Fetch(format!("invalid document URL: {}", e)))?;

        let (bytes, content_type) = self.fetch_bytes(&parsed).await?;

        if bytes.len() > PDF_LIMIT_BYTES {
            info!(target: "document_fetch", url = %parsed, size = bytes.len(), limit = PDF_LIMIT_BYTES, "PDF too large; refusing");
            return Err(DocumentError::Fetch(format!(
                "document exceeds the {} byte limit",
                PDF_LIMIT_BYTES
            )));
        }

        let head = &bytes[..bytes.len().min(512)];
        if !is_pdf(content_type.as_deref(), head) {
            warn!(target: "document_fetch", url = %parsed, ct = ?content_type, "Response is not a PDF");
            return Err(DocumentError::Parse(
                "response is not a PDF document".to_string(),
            ));
        }

        info!(target: "document_fetch", url = %parsed, size = bytes.len(), "Starting PDF text extraction");
        let started = Instant::now();
        let extracted = tokio::task::spawn_blocking(move || {
            let pages = extract_pages_from_mem(&bytes)?;
            ExtractedText::from_pages(pages)
        })
        .await
        .map_err(|e| DocumentError::Parse(format!("extraction task failed: {}", e)))??;

        info!(
            target: "document_fetch",
            url = %parsed,
            pages = extracted.page_count(),
            tables = extracted.table_count(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "PDF extraction succeeded"
        );
        Ok(extracted)
    }
}
