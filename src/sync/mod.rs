#[cfg(test)]
mod tests;

use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{debug, info, warn};

use crate::chunker::{self, ChunkingConfig};
use crate::index::{self, VectorIndex};
use crate::normalize::NormalizedDocument;
use crate::state::{self, Change, SyncRecord, SyncState};
use crate::storage::CacheStorage;
use crate::tokenizer::Bpe;
use crate::zendesk::Article;

/// Counters reported at the end of a run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncSummary {
    pub added: usize,
    pub updated: usize,
    pub skipped: usize,
    pub chunks_uploaded: usize,
    /// Non-fatal problems encountered along the way (best-effort deletions,
    /// state persistence hiccups)
    pub warnings: Vec<String>,
}

enum Outcome {
    Skipped,
    Synced {
        change: Change,
        chunk_count: usize,
        warnings: Vec<String>,
    },
}

/// Drives the per-document pipeline: normalize, fingerprint, classify,
/// chunk, reconcile, commit.
///
/// Documents are processed strictly one at a time. A sync record is only
/// overwritten after its document's reconcile completed, so a crash or an
/// upload failure leaves the previous record intact and the document is
/// simply picked up as changed on the next run.
pub struct SyncRunner<'a> {
    bpe: &'a Bpe,
    index: &'a dyn VectorIndex,
    storage: &'a CacheStorage,
    chunking: ChunkingConfig,
}

impl<'a> SyncRunner<'a> {
    #[inline]
    pub fn new(
        bpe: &'a Bpe,
        index: &'a dyn VectorIndex,
        storage: &'a CacheStorage,
        chunking: ChunkingConfig,
    ) -> Self {
        Self {
            bpe,
            index,
            storage,
            chunking,
        }
    }

    /// Process every article and return the run summary.
    ///
    /// Fatal errors (chunking misconfiguration, upload failures) abort the
    /// whole run; everything already committed stays committed.
    #[inline]
    pub async fn run(&self, articles: &[Article]) -> Result<SyncSummary> {
        let mut sync_state = self.storage.load_state().await;
        let mut summary = SyncSummary::default();

        let bar = if console::user_attended_stderr() {
            ProgressBar::new(articles.len() as u64).with_style(
                ProgressStyle::with_template("[{pos}/{len}] Syncing {msg}")
                    .expect("style template is valid"),
            )
        } else {
            ProgressBar::hidden()
        };

        for article in articles {
            bar.set_message(article.title.clone());

            let outcome = self
                .process_article(article, &mut sync_state)
                .await
                .with_context(|| format!("Failed to sync article {}", article.id))?;

            match outcome {
                Outcome::Skipped => summary.skipped += 1,
                Outcome::Synced {
                    change,
                    chunk_count,
                    warnings,
                } => {
                    match change {
                        Change::New => summary.added += 1,
                        Change::Changed => summary.updated += 1,
                        Change::Unchanged => {}
                    }
                    summary.chunks_uploaded += chunk_count;
                    summary.warnings.extend(warnings);
                }
            }

            bar.inc(1);
        }

        bar.finish_and_clear();

        if let Err(e) = self.storage.save_state(&sync_state).await {
            warn!("Sync state could not be persisted: {e}");
            summary
                .warnings
                .push(format!("Sync state could not be persisted: {e}"));
        }

        info!(
            "Sync complete: {} added, {} updated, {} skipped, {} chunks uploaded",
            summary.added, summary.updated, summary.skipped, summary.chunks_uploaded
        );

        Ok(summary)
    }

    async fn process_article(
        &self,
        article: &Article,
        sync_state: &mut SyncState,
    ) -> Result<Outcome> {
        let document_id = article.document_id();
        let doc = NormalizedDocument::new(&article.title, &article.html_url, &article.body);
        let rendered = doc.to_markdown();
        let content_hash = state::fingerprint(&rendered);

        let change = state::classify(sync_state.get(&document_id), &content_hash);
        if change == Change::Unchanged {
            debug!("Article {document_id} unchanged, skipping");
            return Ok(Outcome::Skipped);
        }

        debug!("Article {document_id} classified as {change:?}");

        let chunks = chunker::chunk_document(self.bpe, &rendered, &self.chunking)?;

        self.storage.save_markdown(&doc.slug(), &rendered).await;

        let prior_file_ids = sync_state
            .get(&document_id)
            .map(|record| record.file_ids.clone())
            .unwrap_or_default();

        let index::ReconcileOutcome { file_ids, warnings } =
            index::reconcile(self.index, &chunks, &doc.slug(), &prior_file_ids)?;
        for warning in &warnings {
            warn!("{warning}");
        }

        let chunk_count = file_ids.len();
        sync_state.insert(
            document_id,
            SyncRecord {
                hash: content_hash,
                updated_at: article.updated_at,
                file_ids,
            },
        );

        // Durability per document: a crash later in the run must not leave
        // this record disagreeing with what reconcile just did.
        if let Err(e) = self.storage.save_state(sync_state).await {
            warn!("Per-document state save failed: {e}");
        }

        Ok(Outcome::Synced {
            change,
            chunk_count,
            warnings,
        })
    }
}
