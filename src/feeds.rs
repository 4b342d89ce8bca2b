//! External data capabilities: regulatory shortage feed and news search
//!
//! ## Table of Contents
//! - **RawShortageRecord / RawArticle**: Wire shapes the agents consume
//! - **ShortageFeed / NewsSearch**: Capability traits
//! - **OpenFdaFeed / NewsApiSearch**: reqwest-backed clients
//!
//! Both capabilities may fail transiently (network, rate limit); the
//! calling agent catches that and records a failed log entry for the run
//! instead of propagating.

use crate::error::{Result, SentinelError};
use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

/// One raw record from the regulatory shortage feed
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawShortageRecord {
    /// Drug name as the feed reports it (brand/salt/packaging noise)
    pub reported_name: String,
    /// Shortage status text if the feed provides one
    pub status: Option<String>,
    /// Structured severity if the feed provides one (most don't)
    pub severity: Option<String>,
    /// Reason/description text
    pub reason: String,
    /// Link to the source record
    pub source_url: Option<String>,
}

/// One raw article from the news search capability
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawArticle {
    /// Headline
    pub title: String,
    /// Teaser/description text
    pub description: String,
    /// Publishing outlet
    pub source: String,
    /// Canonical article URL
    pub url: String,
}

/// Capability trait for the regulatory shortage feed
#[async_trait]
pub trait ShortageFeed: Send + Sync {
    /// Fetch shortage-relevant records for the given drug names
    async fn fetch_shortages(&self, drug_names: &[&str]) -> Result<Vec<RawShortageRecord>>;

    /// Feed name for logging
    fn name(&self) -> &str;
}

/// Capability trait for the news search
#[async_trait]
pub trait NewsSearch: Send + Sync {
    /// Search recent articles for the given query
    async fn search(&self, query: &str) -> Result<Vec<RawArticle>>;

    /// Capability name for logging
    fn name(&self) -> &str;
}

/// Boxed shortage feed handle
pub type BoxedShortageFeed = Arc<dyn ShortageFeed>;
/// Boxed news search handle
pub type BoxedNewsSearch = Arc<dyn NewsSearch>;

/// openFDA enforcement-API backed shortage feed.
///
/// openFDA has no direct shortage endpoint; recalls and enforcement
/// actions are used as shortage indicators, the same way the upstream
/// monitoring flow does.
#[derive(Clone)]
pub struct OpenFdaFeed {
    client: Client,
    base_url: String,
}

impl OpenFdaFeed {
    /// Create a feed client for the given API base (e.g. `https://api.fda.gov`)
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(15))
            .build()
            .map_err(|e| SentinelError::config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }
}

#[derive(Debug, Deserialize)]
struct FdaEnforcementResponse {
    #[serde(default)]
    results: Vec<FdaEnforcementRecord>,
}

#[derive(Debug, Deserialize)]
struct FdaEnforcementRecord {
    #[serde(default)]
    product_description: String,
    #[serde(default)]
    reason_for_recall: String,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    classification: Option<String>,
}

#[async_trait]
impl ShortageFeed for OpenFdaFeed {
    async fn fetch_shortages(&self, drug_names: &[&str]) -> Result<Vec<RawShortageRecord>> {
        let url = format!("{}/drug/enforcement.json", self.base_url);
        let mut records = Vec::new();

        for name in drug_names {
            let search = format!(
                "reason_for_recall:\"{0}\" OR product_description:\"{0}\"",
                name
            );
            let resp = self
                .client
                .get(&url)
                .query(&[("search", search.as_str()), ("limit", "5")])
                .send()
                .await?;

            // 404 from openFDA means "no matches", not an outage
            if resp.status() == reqwest::StatusCode::NOT_FOUND {
                continue;
            }
            let resp = resp
                .error_for_status()
                .map_err(|e| SentinelError::external(e.to_string()))?;

            let body: FdaEnforcementResponse = resp
                .json()
                .await
                .map_err(|e| SentinelError::external(e.to_string()))?;

            for item in body.results {
                records.push(RawShortageRecord {
                    reported_name: item.product_description,
                    status: item.status,
                    severity: item.classification,
                    reason: item.reason_for_recall,
                    source_url: Some(format!("{}/drug/enforcement.json", self.base_url)),
                });
            }
        }

        Ok(records)
    }

    fn name(&self) -> &str {
        "openfda"
    }
}

/// NewsAPI-backed article search
#[derive(Clone)]
pub struct NewsApiSearch {
    client: Client,
    base_url: String,
    api_key: String,
    lookback_days: i64,
}

impl NewsApiSearch {
    /// Create a search client for the given API base (e.g. `https://newsapi.org`)
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(15))
            .build()
            .map_err(|e| SentinelError::config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            lookback_days: 7,
        })
    }

    /// Set how many days back to search
    pub fn with_lookback_days(mut self, days: i64) -> Self {
        self.lookback_days = days;
        self
    }
}

#[derive(Debug, Deserialize)]
struct NewsApiResponse {
    #[serde(default)]
    articles: Vec<NewsApiArticle>,
}

#[derive(Debug, Deserialize)]
struct NewsApiArticle {
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    source: NewsApiSource,
}

#[derive(Debug, Default, Deserialize)]
struct NewsApiSource {
    #[serde(default)]
    name: Option<String>,
}

#[async_trait]
impl NewsSearch for NewsApiSearch {
    async fn search(&self, query: &str) -> Result<Vec<RawArticle>> {
        let from = (Utc::now() - ChronoDuration::days(self.lookback_days))
            .date_naive()
            .to_string();
        let url = format!("{}/v2/everything", self.base_url);

        let resp = self
            .client
            .get(&url)
            .query(&[
                ("q", query),
                ("apiKey", self.api_key.as_str()),
                ("language", "en"),
                ("sortBy", "relevancy"),
                ("pageSize", "5"),
                ("from", from.as_str()),
            ])
            .send()
            .await?
            .error_for_status()
            .map_err(|e| SentinelError::external(e.to_string()))?;

        let body: NewsApiResponse = resp
            .json()
            .await
            .map_err(|e| SentinelError::external(e.to_string()))?;

        let mut articles = Vec::new();
        for item in body.articles {
            let Some(url) = item.url else {
                warn!("Dropping article without URL");
                continue;
            };
            articles.push(RawArticle {
                title: item.title.unwrap_or_default(),
                description: item.description.unwrap_or_default(),
                source: item.source.name.unwrap_or_else(|| "unknown".to_string()),
                url,
            });
        }

        Ok(articles)
    }

    fn name(&self) -> &str {
        "newsapi"
    }
}
