
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

use crate::chunker::ChunkingConfig;

/// Environment variable holding the OpenAI API key. Secrets never live in
/// the config file.
pub const API_KEY_ENV: &str = "OPENAI_API_KEY";

const CONFIG_FILE: &str = "config.toml";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    pub zendesk: ZendeskConfig,
    pub openai: OpenAiConfig,
    pub storage: StorageConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ZendeskConfig {
    /// Help center articles endpoint, e.g.
    /// `https://yourco.zendesk.com/api/v2/help_center/en-us/articles.json`
    pub articles_url: String,
    /// Keep fetching pages until at least this many articles are collected
    #[serde(default = "default_min_articles")]
    pub min_articles: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpenAiConfig {
    /// Target vector store id
    pub vector_store_id: String,
    #[serde(default = "default_api_base")]
    pub api_base: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageConfig {
    /// S3 bucket for markdown backups and the sync state blob
    pub bucket: String,
    #[serde(default = "default_region")]
    pub region: String,
    #[serde(default = "default_state_key")]
    pub state_key: String,
    #[serde(default = "default_markdown_prefix")]
    pub markdown_prefix: String,
    /// Local mirror directory
    #[serde(default = "default_local_dir")]
    pub local_dir: PathBuf,
}

fn default_min_articles() -> usize {
    30
}

fn default_api_base() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_region() -> String {
    "us-east-1".to_string()
}

fn default_state_key() -> String {
    "cache/articles.json".to_string()
}

fn default_markdown_prefix() -> String {
    "markdown/".to_string()
}

fn default_local_dir() -> PathBuf {
    PathBuf::from("storage")
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration file not found: {0}")]
    NotFound(PathBuf),
    #[error("Configuration directory could not be determined")]
    DirectoryError,
    #[error("Invalid articles URL: {0}")]
    InvalidArticlesUrl(String),
    #[error("Invalid API base URL: {0}")]
    InvalidApiBase(String),
    #[error("vector_store_id cannot be empty")]
    EmptyVectorStoreId,
    #[error("storage bucket cannot be empty")]
    EmptyBucket,
    #[error("min_articles must be at least 1")]
    ZeroMinArticles,
    #[error("max_tokens must be at least 1")]
    ZeroMaxTokens,
    #[error("overlap_tokens ({0}) must be smaller than max_tokens ({1})")]
    OverlapTooLarge(usize, usize),
    #[error("Missing {0} environment variable")]
    MissingApiKey(&'static str),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parsing error: {0}")]
    TomlParse(#[from] toml::de::Error),
}

impl Config {
    /// Default configuration directory, e.g. `~/.config/helpsync`.
    #[inline]
    pub fn config_dir() -> Result<PathBuf, ConfigError> {
        dirs::config_dir()
            .map(|dir| dir.join("helpsync"))
            .ok_or(ConfigError::DirectoryError)
    }

    /// Load and validate the config file from the default location.
    #[inline]
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(&Self::config_dir()?.join(CONFIG_FILE))
    }

    /// Load and validate a config file from an explicit path.
    #[inline]
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::NotFound(path.to_path_buf()));
        }

        let content = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    #[inline]
    pub fn validate(&self) -> Result<(), ConfigError> {
        if Url::parse(&self.zendesk.articles_url).is_err() {
            return Err(ConfigError::InvalidArticlesUrl(
                self.zendesk.articles_url.clone(),
            ));
        }
        if self.zendesk.min_articles == 0 {
            return Err(ConfigError::ZeroMinArticles);
        }
        if self.openai.vector_store_id.trim().is_empty() {
            return Err(ConfigError::EmptyVectorStoreId);
        }
        if Url::parse(&self.openai.api_base).is_err() {
            return Err(ConfigError::InvalidApiBase(self.openai.api_base.clone()));
        }
        if self.storage.bucket.trim().is_empty() {
            return Err(ConfigError::EmptyBucket);
        }
        if self.chunking.max_tokens == 0 {
            return Err(ConfigError::ZeroMaxTokens);
        }
        if self.chunking.overlap_tokens >= self.chunking.max_tokens {
            return Err(ConfigError::OverlapTooLarge(
                self.chunking.overlap_tokens,
                self.chunking.max_tokens,
            ));
        }
        Ok(())
    }

    /// Parsed articles endpoint. Only valid after [`Config::validate`].
    #[inline]
    pub fn articles_url(&self) -> Result<Url, ConfigError> {
        Url::parse(&self.zendesk.articles_url)
            .map_err(|_| ConfigError::InvalidArticlesUrl(self.zendesk.articles_url.clone()))
    }

    /// OpenAI API key from the environment; checked before any network call.
    #[inline]
    pub fn api_key() -> Result<String, ConfigError> {
        std::env::var(API_KEY_ENV)
            .ok()
            .filter(|key| !key.trim().is_empty())
            .ok_or(ConfigError::MissingApiKey(API_KEY_ENV))
    }
}
