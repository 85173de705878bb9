
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::{debug, info};
use url::Url;

const DEFAULT_TIMEOUT_SECONDS: u64 = 30;

/// One help center article as returned by the Zendesk REST API.
///
/// All fields are required; an article missing any of them fails the fetch
/// with a descriptive error instead of surfacing as a missing-key failure
/// somewhere deep in the pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Article {
    pub id: u64,
    pub title: String,
    /// Raw HTML body
    pub body: String,
    pub html_url: String,
    pub updated_at: DateTime<Utc>,
}

impl Article {
    /// Key under which this article is tracked in the sync state.
    #[inline]
    pub fn document_id(&self) -> String {
        self.id.to_string()
    }
}

#[derive(Debug, Deserialize)]
struct ArticlesPage {
    articles: Vec<Article>,
    next_page: Option<String>,
}

/// Client for the paged help center articles endpoint.
#[derive(Debug, Clone)]
pub struct ZendeskClient {
    articles_url: Url,
    min_articles: usize,
    agent: ureq::Agent,
}

impl ZendeskClient {
    #[inline]
    pub fn new(articles_url: Url, min_articles: usize) -> Self {
        let agent = ureq::Agent::config_builder()
            .timeout_global(Some(Duration::from_secs(DEFAULT_TIMEOUT_SECONDS)))
            .build()
            .into();

        Self {
            articles_url,
            min_articles,
            agent,
        }
    }

    /// Pull article pages until the configured minimum count is collected
    /// or the cursor runs out, then truncate to that minimum.
    ///
    /// Fetch failures are not retried here; they propagate and abort the
    /// run, which is safe because change detection is idempotent.
    #[inline]
    pub fn fetch_articles(&self) -> Result<Vec<Article>> {
        let mut articles = Vec::new();
        let mut next = Some(self.articles_url.to_string());

        while let Some(url) = next {
            if articles.len() >= self.min_articles {
                break;
            }

            debug!("Fetching articles page: {}", url);

            let body = self
                .agent
                .get(url.as_str())
                .call()
                .with_context(|| format!("Failed to fetch articles page {url}"))?
                .body_mut()
                .read_to_string()
                .context("Failed to read articles response body")?;

            let page: ArticlesPage = serde_json::from_str(&body)
                .with_context(|| format!("Malformed articles payload from {url}"))?;

            debug!("Page contained {} articles", page.articles.len());
            articles.extend(page.articles);
            next = page.next_page;
        }

        articles.truncate(self.min_articles);
        info!("Fetched {} articles from help center", articles.len());
        Ok(articles)
    }
}
