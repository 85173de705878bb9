
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, error, info, warn};

use crate::chunker::Chunk;

const DEFAULT_TIMEOUT_SECONDS: u64 = 60;
const DEFAULT_RETRY_ATTEMPTS: u32 = 3;
const EXPONENTIAL_BACKOFF_BASE: u64 = 2;
const MULTIPART_BOUNDARY: &str = "----helpsync-form-boundary-7a3f19c2";

/// Remote vector index operations needed by the reconciler.
///
/// Implemented by [`OpenAiVectorStore`] for the real service and by fakes
/// in tests, so reconciliation logic never talks to the network directly.
pub trait VectorIndex: Send + Sync {
    /// Upload chunk bytes as a named file artifact, returning its id.
    fn create_file(&self, filename: &str, bytes: &[u8]) -> Result<String>;
    /// Register an uploaded file with the vector store.
    fn attach_file(&self, file_id: &str) -> Result<()>;
    /// Remove a file from the vector store.
    fn detach_file(&self, file_id: &str) -> Result<()>;
    /// Delete the file object itself.
    fn delete_file(&self, file_id: &str) -> Result<()>;
}

/// Result of reconciling one document's chunk set against the remote index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconcileOutcome {
    /// Ids of the newly indexed chunks, in chunk order
    pub file_ids: Vec<String>,
    /// Non-fatal cleanup failures, surfaced to the caller for logging
    pub warnings: Vec<String>,
}

/// Replace a document's previously indexed chunks with a new chunk set.
///
/// Stale ids are deleted best-effort first (a stale orphan is preferable to
/// aborting the resync), then each chunk is uploaded and attached in order.
/// An upload failure propagates immediately; the caller must not commit a
/// sync record in that case, so the next run retries against the old ids.
/// The operation is not atomic and a partial failure can leave orphaned
/// artifacts behind; see DESIGN.md.
#[inline]
pub fn reconcile(
    index: &dyn VectorIndex,
    chunks: &[Chunk],
    document_key: &str,
    prior_file_ids: &[String],
) -> Result<ReconcileOutcome> {
    let mut warnings = Vec::new();

    for file_id in prior_file_ids {
        debug!("Deleting stale chunk {file_id} for {document_key}");
        if let Err(e) = index.detach_file(file_id) {
            warnings.push(format!("Failed to detach {file_id}: {e}"));
        }
        if let Err(e) = index.delete_file(file_id) {
            warnings.push(format!("Failed to delete {file_id}: {e}"));
        }
    }

    let mut file_ids = Vec::with_capacity(chunks.len());
    for chunk in chunks {
        let filename = format!("{document_key}_chunk_{}.md", chunk.index);
        let file_id = index
            .create_file(&filename, chunk.text.as_bytes())
            .with_context(|| format!("Failed to upload chunk artifact {filename}"))?;
        index
            .attach_file(&file_id)
            .with_context(|| format!("Failed to attach {file_id} ({filename})"))?;
        file_ids.push(file_id);
    }

    info!(
        "Reconciled {document_key}: {} stale ids removed, {} chunks indexed",
        prior_file_ids.len(),
        file_ids.len()
    );

    Ok(ReconcileOutcome { file_ids, warnings })
}

#[derive(Debug, Deserialize)]
struct FileResponse {
    id: String,
}

/// Client for an OpenAI-style files + vector store HTTP API.
#[derive(Debug, Clone)]
pub struct OpenAiVectorStore {
    base_url: String,
    vector_store_id: String,
    api_key: String,
    agent: ureq::Agent,
    retry_attempts: u32,
}

impl OpenAiVectorStore {
    #[inline]
    pub fn new(base_url: &str, vector_store_id: &str, api_key: &str) -> Self {
        let agent = ureq::Agent::config_builder()
            .timeout_global(Some(Duration::from_secs(DEFAULT_TIMEOUT_SECONDS)))
            .build()
            .into();

        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            vector_store_id: vector_store_id.to_string(),
            api_key: api_key.to_string(),
            agent,
            retry_attempts: DEFAULT_RETRY_ATTEMPTS,
        }
    }

    #[inline]
    pub fn with_retry_attempts(mut self, attempts: u32) -> Self {
        self.retry_attempts = attempts;
        self
    }

    fn auth_header(&self) -> String {
        format!("Bearer {}", self.api_key)
    }

    fn make_request_with_retry<F>(&self, mut request_fn: F) -> Result<String>
    where
        F: FnMut() -> Result<String, ureq::Error>,
    {
        let mut last_error = None;

        for attempt in 1..=self.retry_attempts {
            debug!("HTTP request attempt {}/{}", attempt, self.retry_attempts);

            match request_fn() {
                Ok(response_text) => return Ok(response_text),
                Err(error) => {
                    let should_retry = match &error {
                        ureq::Error::StatusCode(status) => {
                            if *status >= 500 {
                                warn!(
                                    "Server error (status {}), attempt {}/{}",
                                    status, attempt, self.retry_attempts
                                );
                                true
                            } else {
                                return Err(anyhow!("Client error: HTTP {}", status));
                            }
                        }
                        ureq::Error::ConnectionFailed
                        | ureq::Error::HostNotFound
                        | ureq::Error::Timeout(_)
                        | ureq::Error::Io(_) => {
                            warn!(
                                "Transport error: {}, attempt {}/{}",
                                error, attempt, self.retry_attempts
                            );
                            true
                        }
                        _ => return Err(anyhow!("Non-retryable error: {}", error)),
                    };

                    if should_retry {
                        last_error = Some(anyhow!("Request error: {}", error));
                        if attempt < self.retry_attempts {
                            let delay_ms = EXPONENTIAL_BACKOFF_BASE.pow(attempt - 1) * 1000;
                            std::thread::sleep(Duration::from_millis(delay_ms));
                        }
                    }
                }
            }
        }

        error!("All retry attempts failed for request to {}", self.base_url);

        Err(last_error.unwrap_or_else(|| anyhow!("Request failed after retries")))
    }
}

impl VectorIndex for OpenAiVectorStore {
    #[inline]
    fn create_file(&self, filename: &str, bytes: &[u8]) -> Result<String> {
        let url = format!("{}/files", self.base_url);
        let auth = self.auth_header();
        let (content_type, body) = multipart_file_body(filename, bytes);

        let response_text = self
            .make_request_with_retry(|| {
                self.agent
                    .post(url.as_str())
                    .header("Authorization", auth.as_str())
                    .header("Content-Type", content_type.as_str())
                    .send(&body[..])
                    .and_then(|mut resp| resp.body_mut().read_to_string())
            })
            .with_context(|| format!("Failed to create file {filename}"))?;

        let file: FileResponse = serde_json::from_str(&response_text)
            .context("Failed to parse file creation response")?;

        debug!("Created file {} as {}", filename, file.id);
        Ok(file.id)
    }

    #[inline]
    fn attach_file(&self, file_id: &str) -> Result<()> {
        let url = format!(
            "{}/vector_stores/{}/files",
            self.base_url, self.vector_store_id
        );
        let auth = self.auth_header();
        let payload = json!({ "file_id": file_id }).to_string();

        self.make_request_with_retry(|| {
            self.agent
                .post(url.as_str())
                .header("Authorization", auth.as_str())
                .header("Content-Type", "application/json")
                .send(&payload)
                .and_then(|mut resp| resp.body_mut().read_to_string())
        })
        .with_context(|| format!("Failed to attach file {file_id} to vector store"))?;

        Ok(())
    }

    #[inline]
    fn detach_file(&self, file_id: &str) -> Result<()> {
        let url = format!(
            "{}/vector_stores/{}/files/{}",
            self.base_url, self.vector_store_id, file_id
        );

        let auth = self.auth_header();
        self.make_request_with_retry(|| {
            self.agent
                .delete(url.as_str())
                .header("Authorization", auth.as_str())
                .call()
                .and_then(|mut resp| resp.body_mut().read_to_string())
        })
        .with_context(|| format!("Failed to detach file {file_id} from vector store"))?;

        Ok(())
    }

    #[inline]
    fn delete_file(&self, file_id: &str) -> Result<()> {
        let url = format!("{}/files/{}", self.base_url, file_id);

        let auth = self.auth_header();
        self.make_request_with_retry(|| {
            self.agent
                .delete(url.as_str())
                .header("Authorization", auth.as_str())
                .call()
                .and_then(|mut resp| resp.body_mut().read_to_string())
        })
        .with_context(|| format!("Failed to delete file {file_id}"))?;

        Ok(())
    }
}

/// Assemble a `multipart/form-data` body for the files endpoint.
///
/// Two parts: a `purpose` field and the chunk artifact itself.
fn multipart_file_body(filename: &str, bytes: &[u8]) -> (String, Vec<u8>) {
    let content_type = format!("multipart/form-data; boundary={MULTIPART_BOUNDARY}");

    let mut body = Vec::with_capacity(bytes.len() + 512);
    body.extend_from_slice(format!("--{MULTIPART_BOUNDARY}\r\n").as_bytes());
    body.extend_from_slice(b"Content-Disposition: form-data; name=\"purpose\"\r\n\r\n");
    body.extend_from_slice(b"assistants\r\n");
    body.extend_from_slice(format!("--{MULTIPART_BOUNDARY}\r\n").as_bytes());
    body.extend_from_slice(
        format!("Content-Disposition: form-data; name=\"file\"; filename=\"{filename}\"\r\n")
            .as_bytes(),
    );
    body.extend_from_slice(b"Content-Type: text/markdown\r\n\r\n");
    body.extend_from_slice(bytes);
    body.extend_from_slice(format!("\r\n--{MULTIPART_BOUNDARY}--\r\n").as_bytes());

    (content_type, body)
}
