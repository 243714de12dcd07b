//! Crawl stage
//!
//! Consumes crawl-request IDs, fetches the URL, extracts plain text by MIME
//! type, dedups on the text's SHA-256, stores the blob, and creates the
//! document directly in stage `chunking`. Discovered same-host links become
//! new crawl requests while `depth < max_depth`.

use async_trait::async_trait;
use url::Url;
use uuid::Uuid;

use crate::core::constants::{QUEUE_CHUNK, QUEUE_CRAWL};
use crate::data::blobs::blob_key;
use crate::data::postgres::repositories::{crawl_requests, documents};
use crate::domain::document::{CrawlRequest, CrawlStatus, ProcessingStage};
use crate::utils::{hash, html};

use super::{PipelineStage, StageFailure, StageOutcome, StageServices};

/// How many fetch attempts a response class allows.
const SERVER_ERROR_ATTEMPTS: u32 = 3;
const CLIENT_ERROR_ATTEMPTS: u32 = 2;

pub struct CrawlStage {
    client: reqwest::Client,
}

impl CrawlStage {
    pub fn new(http_timeout_s: u64) -> Result<Self, StageFailure> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(http_timeout_s))
            .user_agent("dtcgraph-crawler/0.3")
            .build()
            .map_err(|e| StageFailure::new(format!("failed to build crawl client: {}", e)))?;
        Ok(Self { client })
    }

    /// Fetch with class-based retries: 5xx and transport errors retry up to
    /// three times with backoff, 4xx retries once, 2xx returns.
    async fn fetch(&self, url: &str) -> Result<(String, Vec<u8>), StageFailure> {
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            let outcome = self.client.get(url).send().await;
            match outcome {
                Ok(resp) => {
                    let status = resp.status();
                    if status.is_success() {
                        let mime = resp
                            .headers()
                            .get(reqwest::header::CONTENT_TYPE)
                            .and_then(|v| v.to_str().ok())
                            .map(normalize_mime)
                            .unwrap_or_else(|| "text/html".to_string());
                        let body = resp
                            .bytes()
                            .await
                            .map_err(|e| StageFailure::new(format!("body read failed: {}", e)))?;
                        return Ok((mime, body.to_vec()));
                    }

                    let allowed = if status.is_server_error() {
                        SERVER_ERROR_ATTEMPTS
                    } else {
                        CLIENT_ERROR_ATTEMPTS
                    };
                    if attempt >= allowed {
                        return Err(StageFailure::new(format!(
                            "fetch failed with status {} after {} attempts",
                            status, attempt
                        )));
                    }
                    tracing::warn!(url, status = status.as_u16(), attempt, "Retrying fetch");
                }
                Err(e) => {
                    if attempt >= SERVER_ERROR_ATTEMPTS {
                        return Err(StageFailure::new(format!(
                            "fetch failed after {} attempts: {}",
                            attempt, e
                        )));
                    }
                    tracing::warn!(url, error = %e, attempt, "Retrying fetch after transport error");
                }
            }
            tokio::time::sleep(std::time::Duration::from_millis(500 * u64::from(attempt))).await;
        }
    }

    /// Queue discovered links as new crawl requests, one depth deeper.
    async fn discover_links(
        &self,
        services: &StageServices,
        request: &CrawlRequest,
        page_html: &str,
        base: &Url,
    ) {
        let links = html::extract_links(page_html, base);
        let mut queued = 0usize;
        for link in links {
            let inserted = services
                .db
                .with_retry(|| async {
                    crawl_requests::insert_request(
                        services.db.pool(),
                        link.as_str(),
                        request.depth + 1,
                        request.max_depth,
                        Some(&request.url),
                    )
                    .await
                })
                .await;
            match inserted {
                Ok(Some(new_id)) => {
                    queued += 1;
                    if let Err(e) = services.queue.push(QUEUE_CRAWL, &new_id.to_string()).await {
                        tracing::warn!(url = %link, error = %e, "Failed to enqueue discovered link");
                    }
                }
                Ok(None) => {} // URL already known
                Err(e) => {
                    tracing::warn!(url = %link, error = %e, "Failed to record discovered link");
                }
            }
        }
        if queued > 0 {
            tracing::debug!(
                parent = %request.url,
                depth = request.depth + 1,
                count = queued,
                "Discovered links queued"
            );
        }
    }
}

fn normalize_mime(content_type: &str) -> String {
    content_type
        .split(';')
        .next()
        .unwrap_or(content_type)
        .trim()
        .to_ascii_lowercase()
}

/// Extract plain text from a fetched body by MIME type.
fn extract_text(mime: &str, body: &[u8]) -> Result<String, StageFailure> {
    match mime {
        "text/html" | "application/xhtml+xml" => {
            Ok(html::extract_text(&String::from_utf8_lossy(body)))
        }
        "application/pdf" => pdf_extract::extract_text_from_mem(body)
            .map_err(|e| StageFailure::new(format!("PDF extraction failed: {}", e))),
        m if m.starts_with("text/") => Ok(String::from_utf8_lossy(body).into_owned()),
        other => Err(StageFailure::new(format!("unsupported MIME type: {}", other))),
    }
}

/// Title from the HTML `<title>`, else the first non-empty text line.
fn derive_title(mime: &str, body: &[u8], text: &str, fallback: &str) -> String {
    if mime == "text/html"
        && let Some(title) = html::extract_title(&String::from_utf8_lossy(body))
    {
        return title;
    }
    text.lines()
        .map(str::trim)
        .find(|l| !l.is_empty())
        .map(|l| l.chars().take(200).collect())
        .unwrap_or_else(|| fallback.to_string())
}

#[async_trait]
impl PipelineStage for CrawlStage {
    fn name(&self) -> &'static str {
        "crawl"
    }

    fn input_queue(&self) -> &'static str {
        QUEUE_CRAWL
    }

    fn expected_stage(&self) -> Option<ProcessingStage> {
        None
    }

    async fn run(
        &self,
        services: &StageServices,
        job_id: Uuid,
    ) -> Result<StageOutcome, StageFailure> {
        let request = services
            .db
            .with_retry(|| async { crawl_requests::get_request(services.db.pool(), job_id).await })
            .await
            .map_err(|e| StageFailure::new(e.to_string()))?;

        let Some(request) = request else {
            return Ok(StageOutcome::Discard(format!(
                "crawl request {} not found",
                job_id
            )));
        };
        if matches!(request.status, CrawlStatus::Completed | CrawlStatus::Failed) {
            return Ok(StageOutcome::Discard(format!(
                "crawl request {} already {}",
                job_id, request.status
            )));
        }

        crawl_requests::set_status(services.db.pool(), job_id, CrawlStatus::Active, None)
            .await
            .map_err(|e| StageFailure::new(e.to_string()))?;

        let base = Url::parse(&request.url)
            .map_err(|e| StageFailure::new(format!("invalid URL {}: {}", request.url, e)))?;

        let (mime, body) = self.fetch(&request.url).await?;
        let text = extract_text(&mime, &body)?;
        if text.trim().is_empty() {
            return Err(StageFailure::new("extracted text is empty"));
        }

        // Hash the extracted text, not the raw body, so formatting-only
        // differences between mirrors still dedup.
        let content_hash = hash::sha256_hex(text.as_bytes());
        let existing = services
            .db
            .with_retry(|| async { documents::find_by_hash(services.db.pool(), &content_hash).await })
            .await
            .map_err(|e| StageFailure::new(e.to_string()))?;

        if let Some(existing_id) = existing {
            tracing::debug!(
                url = %request.url,
                document_id = %existing_id,
                "Content hash already ingested; skipping"
            );
            crawl_requests::set_status(services.db.pool(), job_id, CrawlStatus::Completed, None)
                .await
                .map_err(|e| StageFailure::new(e.to_string()))?;
            return Ok(StageOutcome::Done);
        }

        let document_id = Uuid::new_v4();
        let key = blob_key(&document_id, "text/plain");
        let location = services
            .blobs
            .put(&key, text.as_bytes(), "text/plain; charset=utf-8")
            .await
            .map_err(|e| StageFailure::new(format!("blob store failed: {}", e)))?;

        let title = derive_title(&mime, &body, &text, &request.url);
        services
            .db
            .with_retry(|| async {
                documents::insert_document(
                    services.db.pool(),
                    document_id,
                    &title,
                    Some(&request.url),
                    &content_hash,
                    &mime,
                    &location,
                    ProcessingStage::Chunking,
                )
                .await
            })
            .await
            .map_err(|e| StageFailure::new(e.to_string()))?;

        if request.depth < request.max_depth && mime == "text/html" {
            self.discover_links(services, &request, &String::from_utf8_lossy(&body), &base)
                .await;
        }

        if let Err(e) = services
            .queue
            .push(QUEUE_CHUNK, &document_id.to_string())
            .await
        {
            // Document row is committed; the reaper recovers the lost push.
            tracing::warn!(document_id = %document_id, error = %e, "Chunk queue push failed");
        }

        crawl_requests::set_status(services.db.pool(), job_id, CrawlStatus::Completed, None)
            .await
            .map_err(|e| StageFailure::new(e.to_string()))?;

        tracing::info!(
            url = %request.url,
            document_id = %document_id,
            title = %title,
            mime = %mime,
            "Document ingested"
        );
        Ok(StageOutcome::Done)
    }

    async fn on_fatal(&self, services: &StageServices, job_id: Uuid, message: &str) {
        let result = crawl_requests::set_status(
            services.db.pool(),
            job_id,
            CrawlStatus::Failed,
            Some(message),
        )
        .await;
        if let Err(e) = result {
            tracing::error!(
                crawl_request_id = %job_id,
                error = %e,
                "Failed to record crawl request failure"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_mime_strips_charset() {
        assert_eq!(normalize_mime("text/html; charset=utf-8"), "text/html");
        assert_eq!(normalize_mime("Application/PDF"), "application/pdf");
    }

    #[test]
    fn test_extract_text_plain_passthrough() {
        let text = extract_text("text/plain", b"P0301 cylinder 1 misfire").unwrap();
        assert_eq!(text, "P0301 cylinder 1 misfire");
    }

    #[test]
    fn test_extract_text_html() {
        let text = extract_text(
            "text/html",
            b"<html><body><p>Check the coil.</p></body></html>",
        )
        .unwrap();
        assert_eq!(text, "Check the coil.");
    }

    #[test]
    fn test_extract_text_unsupported_mime() {
        assert!(extract_text("image/png", b"\x89PNG").is_err());
    }

    #[test]
    fn test_derive_title_prefers_html_title() {
        let body = b"<html><head><title>Misfire Guide</title></head><body>x</body></html>";
        assert_eq!(
            derive_title("text/html", body, "ignored", "http://example.com"),
            "Misfire Guide"
        );
    }

    #[test]
    fn test_derive_title_first_line_fallback() {
        assert_eq!(
            derive_title("text/plain", b"", "\n  P0420 catalyst guide\nmore", "url"),
            "P0420 catalyst guide"
        );
    }

    #[test]
    fn test_derive_title_url_fallback() {
        assert_eq!(
            derive_title("text/plain", b"", "   \n  ", "http://example.com/x"),
            "http://example.com/x"
        );
    }
}
