use anyhow::{Context, Result};
use itertools::Itertools;
use tracing::info;

use crate::config::{API_KEY_ENV, Config};
use crate::index::OpenAiVectorStore;
use crate::storage::{CacheStorage, S3ObjectStore};
use crate::sync::SyncRunner;
use crate::tokenizer::Bpe;
use crate::zendesk::ZendeskClient;

async fn open_storage(config: &Config) -> CacheStorage {
    let remote = S3ObjectStore::from_env(&config.storage.bucket, &config.storage.region).await;
    CacheStorage::new(
        Box::new(remote),
        &config.storage.local_dir,
        &config.storage.state_key,
        &config.storage.markdown_prefix,
    )
}

/// Fetch articles and reconcile the vector store against them.
#[inline]
pub async fn run_sync(config: Config) -> Result<()> {
    // Fail on missing secrets before any network call
    let api_key = Config::api_key()?;

    let zendesk = ZendeskClient::new(config.articles_url()?, config.zendesk.min_articles);
    let index = OpenAiVectorStore::new(
        &config.openai.api_base,
        &config.openai.vector_store_id,
        &api_key,
    );
    let storage = open_storage(&config).await;
    let bpe = Bpe::new().context("Failed to initialize tokenizer")?;

    info!(
        "Starting sync from {} into vector store {}",
        config.zendesk.articles_url, config.openai.vector_store_id
    );

    let articles = zendesk
        .fetch_articles()
        .context("Article fetch failed, aborting run")?;

    let runner = SyncRunner::new(&bpe, &index, &storage, config.chunking.clone());
    let summary = runner.run(&articles).await?;

    println!(
        "Added: {}, Updated: {}, Skipped: {}",
        summary.added, summary.updated, summary.skipped
    );
    println!("Embedded chunks: {}", summary.chunks_uploaded);
    if !summary.warnings.is_empty() {
        println!("Warnings ({}):", summary.warnings.len());
        for warning in &summary.warnings {
            println!("  - {warning}");
        }
    }

    Ok(())
}

/// Print the tracked documents from the persisted sync state.
#[inline]
pub async fn show_status(config: Config) -> Result<()> {
    let storage = open_storage(&config).await;
    let state = storage.load_state().await;

    if state.is_empty() {
        println!("No documents have been synced yet.");
        println!("Run 'helpsync sync' to index the help center.");
        return Ok(());
    }

    println!("Tracked documents ({} total):", state.len());
    println!();

    for (document_id, record) in &state {
        println!("Document {document_id}");
        println!("   Updated: {}", record.updated_at.format("%Y-%m-%d %H:%M:%S"));
        println!("   Hash: {}", record.hash);
        println!(
            "   Chunks ({}): {}",
            record.file_ids.len(),
            record.file_ids.iter().format(", ")
        );
    }

    let total_chunks: usize = state.values().map(|r| r.file_ids.len()).sum();
    println!();
    println!("{} chunks indexed in total", total_chunks);

    Ok(())
}

/// Print the active configuration with secrets masked.
#[inline]
pub fn show_config(config: &Config) -> Result<()> {
    println!("Current configuration:");
    println!("  articles_url: {}", config.zendesk.articles_url);
    println!("  min_articles: {}", config.zendesk.min_articles);
    println!("  vector_store_id: {}", config.openai.vector_store_id);
    println!("  api_base: {}", config.openai.api_base);
    println!(
        "  {}: {}",
        API_KEY_ENV,
        if Config::api_key().is_ok() {
            "set"
        } else {
            "NOT SET"
        }
    );
    println!("  bucket: {}", config.storage.bucket);
    println!("  region: {}", config.storage.region);
    println!("  state_key: {}", config.storage.state_key);
    println!("  markdown_prefix: {}", config.storage.markdown_prefix);
    println!("  local_dir: {}", config.storage.local_dir.display());
    println!("  max_tokens: {}", config.chunking.max_tokens);
    println!("  overlap_tokens: {}", config.chunking.overlap_tokens);

    Ok(())
}
