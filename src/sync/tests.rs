use super::*;

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use anyhow::bail;
use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use tempfile::TempDir;

use crate::storage::ObjectStore;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Op {
    Create(String),
    Attach(String),
    Detach(String),
    Delete(String),
}

#[derive(Default)]
struct FakeIndex {
    ops: Mutex<Vec<Op>>,
    counter: Mutex<usize>,
    fail_uploads: Mutex<bool>,
}

impl FakeIndex {
    fn ops(&self) -> Vec<Op> {
        self.ops.lock().expect("lock is not poisoned").clone()
    }

    fn set_fail_uploads(&self, fail: bool) {
        *self.fail_uploads.lock().expect("lock is not poisoned") = fail;
    }
}

impl VectorIndex for FakeIndex {
    fn create_file(&self, filename: &str, _bytes: &[u8]) -> anyhow::Result<String> {
        if *self.fail_uploads.lock().expect("lock is not poisoned") {
            bail!("simulated upload outage");
        }
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

#[async_trait]
impl ObjectStore for Arc<MemoryStore> {
    async fn put(&self, key: &str, bytes: Vec<u8>, _content_type: &str) -> anyhow::Result<()> {
        self.objects
            .lock()
            .expect("lock is not poisoned")
            .insert(key.to_string(), bytes);
        Ok(())
    }

    async fn get(&self, key: &str) -> anyhow::Result<Option<Vec<u8>>> {
        Ok(self
            .objects
            .lock()
            .expect("lock is not poisoned")
            .get(key)
            .cloned())
    }
}

fn article(id: u64, body_html: &str) -> Article {
    Article {
        id,
        title: format!("Article {id}"),
        body: body_html.to_string(),
        html_url: format!("https://support.example.com/articles/{id}"),
        updated_at: Utc
            .with_ymd_and_hms(2025, 6, 1, 12, 0, 0)
            .single()
            .expect("valid date"),
    }
}

struct Harness {
    bpe: Bpe,
    index: FakeIndex,
    storage: CacheStorage,
    _dir: TempDir,
}

impl Harness {
    fn new() -> Self {
        let dir = TempDir::new().expect("tempdir");
        let remote = Arc::new(MemoryStore::default());
        let storage = CacheStorage::new(
            Box::new(Arc::clone(&remote)),
            dir.path(),
            "cache/articles.json",
            "markdown/",
        );

        Self {
            bpe: Bpe::new().expect("encoding loads"),
            index: FakeIndex::default(),
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
async fn first_sync_adds_and_second_skips() {
    let harness = Harness::new();
    let articles = vec![article(42, "<p>Step 1</p><h2>Step 2</h2><p>More.</p>")];

    let first = harness.runner().run(&articles).await.expect("first run");
    assert_eq!(first.added, 1);
    assert_eq!(first.skipped, 0);
    assert!(first.chunks_uploaded >= 1);

    let ops_after_first = harness.index.ops().len();

    let second = harness.runner().run(&articles).await.expect("second run");
    assert_eq!(second.added, 0);
    assert_eq!(second.skipped, 1);
    assert_eq!(second.chunks_uploaded, 0);
    assert_eq!(
        harness.index.ops().len(),
        ops_after_first,
        "an unchanged document touches the index not at all"
    );
}

#[tokio::test]
async fn changed_article_replaces_its_chunks() {
    let harness = Harness::new();

    harness
        .runner()
        .run(&[article(42, "<p>Original body</p>")])
        .await
        .expect("first run");

    let state = harness.storage.load_state().await;
    let old_ids = state["42"].file_ids.clone();
    assert!(!old_ids.is_empty());

    let summary = harness
        .runner()
        .run(&[article(42, "<p>Edited body</p>")])
        .await
        .expect("second run");
    assert_eq!(summary.updated, 1);

    let ops = harness.index.ops();
    for id in &old_ids {
        assert!(ops.contains(&Op::Detach(id.clone())));
        assert!(ops.contains(&Op::Delete(id.clone())));
    }

    let state = harness.storage.load_state().await;
    assert_ne!(state["42"].file_ids, old_ids, "ids fully replaced");
}

#[tokio::test]
async fn upload_failure_leaves_previous_record_intact() {
    let harness = Harness::new();

    harness
        .runner()
        .run(&[article(42, "<p>Original body</p>")])
        .await
        .expect("first run");

    let before = harness.storage.load_state().await;

    harness.index.set_fail_uploads(true);
    let result = harness
        .runner()
        .run(&[article(42, "<p>Edited body</p>")])
        .await;
    assert!(result.is_err(), "upload failures abort the run");

    let after = harness.storage.load_state().await;
    assert_eq!(
        after["42"], before["42"],
        "no partial record is committed for a failed document"
    );
}

#[tokio::test]
async fn empty_article_list_is_a_clean_run() {
    let harness = Harness::new();
    let summary = harness.runner().run(&[]).await.expect("empty run");
    assert_eq!(summary, SyncSummary::default());
}
