#![expect(
    clippy::tests_outside_test_module,
    reason = "integration tests are only compiled in test mode"
)]

//! End-to-end pipeline tests over in-memory fakes: fetch results go in,
//! chunk uploads and sync records come out. Covers the new / unchanged /
//! changed lifecycle of a document across three runs.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use tempfile::TempDir;

use helpsync::chunker::ChunkingConfig;
use helpsync::index::VectorIndex;
use helpsync::storage::{CacheStorage, ObjectStore};
use helpsync::sync::SyncRunner;
use helpsync::tokenizer::Bpe;
use helpsync::zendesk::Article;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Op {
    Create(String),
    Attach(String),
    Detach(String),
    Delete(String),
}

#[derive(Default)]
struct RecordingIndex {
    ops: Mutex<Vec<Op>>,
    counter: Mutex<usize>,
}

impl RecordingIndex {
    fn ops(&self) -> Vec<Op> {
        self.ops.lock().expect("lock is not poisoned").clone()
    }

    fn op_count(&self) -> usize {
        self.ops.lock().expect("lock is not poisoned").len()
    }
}

impl VectorIndex for RecordingIndex {
    fn create_file(&self, filename: &str, _bytes: &[u8]) -> anyhow::Result<String> {
        let mut counter = self.counter.lock().expect("lock is not poisoned");
        let id = format!("file-{}", *counter);
        *counter += 1;
        self.ops
            .lock()
            .expect("lock is not poisoned")
            .push(Op::Create(filename.to_string()));
        Ok(id)
    }

    fn attach_file(&self, file_id: &str) -> anyhow::Result<()> {
        self.ops
            .lock()
            .expect("lock is not poisoned")
            .push(Op::Attach(file_id.to_string()));
        Ok(())
    }

    fn detach_file(&self, file_id: &str) -> anyhow::Result<()> {
        self.ops
            .lock()
            .expect("lock is not poisoned")
            .push(Op::Detach(file_id.to_string()));
        Ok(())
    }

    fn delete_file(&self, file_id: &str) -> anyhow::Result<()> {
        self.ops
            .lock()
            .expect("lock is not poisoned")
            .push(Op::Delete(file_id.to_string()));
        Ok(())
    }
}

#[derive(Default)]
struct MemoryStore {
    objects: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemoryStore {
    fn keys(&self) -> Vec<String> {
        self.objects
            .lock()
            .expect("lock is not poisoned")
            .keys()
            .cloned()
            .collect()
    }
}

/// Shareable `ObjectStore` handle. A local newtype is required because this
/// integration crate cannot implement the foreign `ObjectStore` trait for
/// `Arc<MemoryStore>` directly (orphan rules: `Arc` is not a fundamental
/// type). It delegates to the same shared `MemoryStore`.
struct SharedStore(Arc<MemoryStore>);

#[async_trait]
impl ObjectStore for SharedStore {
    async fn put(&self, key: &str, bytes: Vec<u8>, _content_type: &str) -> anyhow::Result<()> {
        self.0
            .objects
            .lock()
            .expect("lock is not poisoned")
            .insert(key.to_string(), bytes);
        Ok(())
    }

    async fn get(&self, key: &str) -> anyhow::Result<Option<Vec<u8>>> {
        Ok(self
            .0
            .objects
            .lock()
            .expect("lock is not poisoned")
            .get(key)
            .cloned())
    }
}

fn reset_password_article(body_html: &str) -> Article {
    Article {
        id: 42,
        title: "Reset Password".to_string(),
        body: body_html.to_string(),
        html_url: "https://support.example.com/articles/42".to_string(),
        updated_at: Utc
            .with_ymd_and_hms(2025, 6, 1, 12, 0, 0)
            .single()
            .expect("valid date"),
    }
}

struct Pipeline {
    bpe: Bpe,
    index: RecordingIndex,
    remote: Arc<MemoryStore>,
    storage: CacheStorage,
    _dir: TempDir,
}

impl Pipeline {
    fn new() -> Self {
        let dir = TempDir::new().expect("tempdir");
        let remote = Arc::new(MemoryStore::default());
        let storage = CacheStorage::new(
            Box::new(SharedStore(Arc::clone(&remote))),
            dir.path(),
            "cache/articles.json",
            "markdown/",
        );

        Self {
            bpe: Bpe::new().expect("encoding loads"),
            index: RecordingIndex::default(),
            remote,
            storage,
            _dir: dir,
        }
    }

    fn runner(&self) -> SyncRunner<'_> {
        SyncRunner::new(
            &self.bpe,
            &self.index,
            &self.storage,
            ChunkingConfig::default(),
        )
    }
}

#[tokio::test]
async fn document_lifecycle_across_three_runs() {
    let pipeline = Pipeline::new();

    // First run: the document is new
    let articles = vec![reset_password_article(
        "<p>Step 1</p><h2>Step 2</h2><p>Open the settings page.</p>",
    )];
    let first = pipeline.runner().run(&articles).await.expect("first run");

    assert_eq!((first.added, first.updated, first.skipped), (1, 0, 0));
    assert!(first.chunks_uploaded >= 1);

    let state = pipeline.storage.load_state().await;
    let record = state.get("42").expect("record created");
    assert_eq!(record.file_ids.len(), first.chunks_uploaded);
    assert!(!record.hash.is_empty());
    let first_hash = record.hash.clone();
    let first_ids = record.file_ids.clone();

    // Second run: identical content is skipped without touching the index
    let ops_before = pipeline.index.op_count();
    let second = pipeline.runner().run(&articles).await.expect("second run");

    assert_eq!((second.added, second.updated, second.skipped), (0, 0, 1));
    assert_eq!(second.chunks_uploaded, 0);
    assert_eq!(pipeline.index.op_count(), ops_before);

    let state = pipeline.storage.load_state().await;
    assert_eq!(state["42"].hash, first_hash, "record untouched");
    assert_eq!(state["42"].file_ids, first_ids);

    // Third run: edited content replaces every indexed chunk
    let edited = vec![reset_password_article(
        "<p>Step 1 has changed</p><h2>Step 2</h2><p>Open the settings page.</p>",
    )];
    let third = pipeline.runner().run(&edited).await.expect("third run");

    assert_eq!((third.added, third.updated, third.skipped), (0, 1, 0));

    let ops = pipeline.index.ops();
    for stale in &first_ids {
        assert!(ops.contains(&Op::Detach(stale.clone())));
        assert!(ops.contains(&Op::Delete(stale.clone())));
    }

    let state = pipeline.storage.load_state().await;
    let record = &state["42"];
    assert_ne!(record.hash, first_hash);
    assert_eq!(record.file_ids.len(), third.chunks_uploaded);
    assert!(
        record.file_ids.iter().all(|id| !first_ids.contains(id)),
        "chunk ids are replaced, not appended"
    );
}

#[tokio::test]
async fn chunk_artifacts_are_named_after_the_document_slug() {
    let pipeline = Pipeline::new();

    pipeline
        .runner()
        .run(&[reset_password_article("<p>Short body.</p>")])
        .await
        .expect("run succeeds");

    let ops = pipeline.index.ops();
    assert!(ops.contains(&Op::Create("reset-password_chunk_0.md".to_string())));
}

#[tokio::test]
async fn markdown_backup_and_state_reach_the_remote_store() {
    let pipeline = Pipeline::new();

    pipeline
        .runner()
        .run(&[reset_password_article("<p>Short body.</p>")])
        .await
        .expect("run succeeds");

    let keys = pipeline.remote.keys();
    assert!(keys.contains(&"cache/articles.json".to_string()));
    assert!(keys.contains(&"markdown/reset-password.md".to_string()));
}

#[tokio::test]
async fn rerun_after_state_loss_is_idempotent_for_content() {
    let pipeline = Pipeline::new();
    let articles = vec![reset_password_article("<p>Step 1</p>")];

    pipeline.runner().run(&articles).await.expect("first run");
    let first_uploads = pipeline
        .index
        .ops()
        .iter()
        .filter(|op| matches!(op, Op::Create(_)))
        .count();

    // simulate a fresh environment that lost its state blob but kept the
    // remote index contents
    let dir = TempDir::new().expect("tempdir");
    let fresh_remote = Arc::new(MemoryStore::default());
    let fresh_storage = CacheStorage::new(
        Box::new(SharedStore(Arc::clone(&fresh_remote))),
        dir.path(),
        "cache/articles.json",
        "markdown/",
    );
    let runner = SyncRunner::new(
        &pipeline.bpe,
        &pipeline.index,
        &fresh_storage,
        ChunkingConfig::default(),
    );

    let summary = runner.run(&articles).await.expect("rerun succeeds");

    // without a record the document is re-added; content produces the same
    // number of chunks as before
    assert_eq!(summary.added, 1);
    assert_eq!(summary.chunks_uploaded, first_uploads);
}
