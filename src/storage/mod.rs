
use std::path::{Path, PathBuf};

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use aws_sdk_s3::primitives::ByteStream;
use tokio::fs;
use tracing::{debug, info, warn};

use crate::state::SyncState;

/// Remote blob store interface used for markdown backups and the persisted
/// sync state.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn put(&self, key: &str, bytes: Vec<u8>, content_type: &str) -> Result<()>;
    /// Fetch an object; `None` when the key does not exist.
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;
}

/// S3-backed object store.
pub struct S3ObjectStore {
    client: aws_sdk_s3::Client,
    bucket: String,
}

impl S3ObjectStore {
    /// Build a client from the ambient AWS environment (env vars, profile).
    #[inline]
    pub async fn from_env(bucket: &str, region: &str) -> Self {
        let config = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .region(aws_config::Region::new(region.to_string()))
            .load()
            .await;

        Self {
            client: aws_sdk_s3::Client::new(&config),
            bucket: bucket.to_string(),
        }
    }
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    #[inline]
    async fn put(&self, key: &str, bytes: Vec<u8>, content_type: &str) -> Result<()> {
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(ByteStream::from(bytes))
            .content_type(content_type)
            .send()
            .await
            .map_err(|e| anyhow!("Failed to store {key} in s3://{}: {e}", self.bucket))?;

        debug!("Stored s3://{}/{}", self.bucket, key);
        Ok(())
    }

    #[inline]
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        match self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
        {
            Ok(resp) => {
                let data = resp
                    .body
                    .collect()
                    .await
                    .map_err(|e| anyhow!("Failed to read s3://{}/{key}: {e}", self.bucket))?;
                Ok(Some(data.into_bytes().to_vec()))
            }
            Err(err) if err.as_service_error().is_some_and(|e| e.is_no_such_key()) => Ok(None),
            Err(err) => Err(anyhow!(
                "Failed to fetch s3://{}/{key}: {err}",
                self.bucket
            )),
        }
    }
}

/// Dual-location persistence: remote object store plus a local filesystem
/// mirror.
///
/// The mirror is consulted as a fallback on load and written unconditionally
/// on save, so a developer run without cloud access still round-trips state.
pub struct CacheStorage {
    remote: Box<dyn ObjectStore>,
    local_base: PathBuf,
    state_key: String,
    markdown_prefix: String,
}

impl CacheStorage {
    #[inline]
    pub fn new(
        remote: Box<dyn ObjectStore>,
        local_base: &Path,
        state_key: &str,
        markdown_prefix: &str,
    ) -> Self {
        Self {
            remote,
            local_base: local_base.to_path_buf(),
            state_key: state_key.to_string(),
            markdown_prefix: markdown_prefix.to_string(),
        }
    }

    fn local_state_path(&self) -> PathBuf {
        self.local_base.join("cache").join("articles.json")
    }

    fn local_markdown_path(&self, slug: &str) -> PathBuf {
        self.local_base.join("markdown").join(format!("{slug}.md"))
    }

    /// Load the sync state: remote store first, local mirror second, empty
    /// otherwise. Load failures fall through to the next source.
    #[inline]
    pub async fn load_state(&self) -> SyncState {
        match self.remote.get(&self.state_key).await {
            Ok(Some(bytes)) => match serde_json::from_slice::<SyncState>(&bytes) {
                Ok(state) => {
                    info!("Loaded sync state with {} documents from remote", state.len());
                    return state;
                }
                Err(e) => warn!("Remote sync state is unreadable: {e}. Trying local mirror"),
            },
            Ok(None) => info!("No sync state in remote store. Trying local mirror"),
            Err(e) => warn!("Failed to load sync state from remote: {e}. Trying local mirror"),
        }

        let path = self.local_state_path();
        match fs::read(&path).await {
            Ok(bytes) => match serde_json::from_slice::<SyncState>(&bytes) {
                Ok(state) => {
                    info!(
                        "Loaded sync state with {} documents from {}",
                        state.len(),
                        path.display()
                    );
                    return state;
                }
                Err(e) => warn!("Local sync state is unreadable: {e}"),
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!("Failed to read {}: {e}", path.display()),
        }

        info!("Starting with empty sync state");
        SyncState::default()
    }

    /// Persist the sync state to both locations independently.
    ///
    /// Fails only when neither location accepted the write; a single-side
    /// failure is logged and tolerated (the state is re-derivable at the
    /// cost of re-chunking on the next run).
    #[inline]
    pub async fn save_state(&self, state: &SyncState) -> Result<()> {
        let json = serde_json::to_string_pretty(state)
            .map_err(|e| anyhow!("Failed to serialize sync state: {e}"))?;

        let path = self.local_state_path();
        let local_result = async {
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent).await?;
            }
            fs::write(&path, &json).await
        }
        .await;

        match &local_result {
            Ok(()) => debug!("Saved sync state to {}", path.display()),
            Err(e) => warn!("Failed to save sync state locally: {e}"),
        }

        let remote_result = self
            .remote
            .put(&self.state_key, json.into_bytes(), "application/json")
            .await;

        match &remote_result {
            Ok(()) => debug!("Saved sync state to remote key {}", self.state_key),
            Err(e) => warn!("Failed to save sync state to remote: {e}"),
        }

        if local_result.is_err() && remote_result.is_err() {
            return Err(anyhow!(
                "Sync state could not be persisted to any location"
            ));
        }

        Ok(())
    }

    /// Back up a rendered markdown document to both locations, best-effort.
    #[inline]
    pub async fn save_markdown(&self, slug: &str, content: &str) {
        let path = self.local_markdown_path(slug);
        let local_result = async {
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent).await?;
            }
            fs::write(&path, content).await
        }
        .await;

        if let Err(e) = local_result {
            warn!("Failed to save markdown {slug} locally: {e}");
        }

        let key = format!("{}{slug}.md", self.markdown_prefix);
        if let Err(e) = self
            .remote
            .put(&key, content.as_bytes().to_vec(), "text/markdown")
            .await
        {
            warn!("Failed to save markdown {slug} to remote: {e}");
        }
    }
}
