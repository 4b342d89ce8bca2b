//! News Agent: supply-disruption monitoring from news coverage
//!
//! Runs one query per monitored drug plus a general sweep, deduplicates
//! the articles, maps each to a catalog drug, and scores shortage
//! relevance. Model scoring is preferred; a keyword heuristic stands in
//! when the model is unavailable or malformed. Only articles at or above
//! the confidence threshold become signals, the rest are dropped as noise.

use crate::agents::{AgentContext, AgentFindings, SignalAgent};
use crate::error::Result;
use crate::feeds::{BoxedNewsSearch, RawArticle};
use crate::llm::BoxedLlmClient;
use crate::matching::DrugMatcher;
use crate::resilience::{retry_transient, RetryConfig};
use crate::store::SignalUpsert;
use crate::types::{ShortageSignal, SourceType};
use async_trait::async_trait;
use serde_json::json;
use std::collections::HashSet;
use tracing::{debug, warn};

/// Terms that make an article shortage-relevant at all
const RELEVANCE_TERMS: [&str; 6] = [
    "shortage",
    "recall",
    "supply",
    "disruption",
    "discontinu",
    "halt",
];

/// Terms that raise the heuristic score beyond the baseline
const ESCALATION_TERMS: [&str; 4] = ["critical", "nationwide", "emergency", "halt"];

/// News/sentiment monitor
pub struct NewsAgent {
    search: BoxedNewsSearch,
    retry: RetryConfig,
}

impl NewsAgent {
    /// Create a news agent over the given search capability
    pub fn new(search: BoxedNewsSearch) -> Self {
        Self {
            search,
            retry: RetryConfig::default(),
        }
    }

    /// Keyword heuristic: 0.5 baseline for relevant coverage, raised for
    /// escalating language, zero when nothing shortage-related appears.
    fn heuristic_confidence(article: &RawArticle) -> f64 {
        let text = format!("{} {}", article.title, article.description).to_lowercase();
        if !RELEVANCE_TERMS.iter().any(|t| text.contains(t)) {
            return 0.0;
        }
        let boosts = ESCALATION_TERMS.iter().filter(|t| text.contains(*t)).count();
        (0.5 + 0.15 * boosts as f64).min(0.9)
    }

    async fn score_article(
        llm: Option<&BoxedLlmClient>,
        article: &RawArticle,
        drug: &str,
    ) -> f64 {
        let Some(llm) = llm else {
            return Self::heuristic_confidence(article);
        };
        let prompt = format!(
            "Does this article indicate a supply risk for {}?\n\
             Title: {}\nDescription: {}\nSource: {}\n\
             Respond as JSON: {{\"confidence\": 0.0-1.0}}",
            drug, article.title, article.description, article.source,
        );
        match llm
            .complete("You score pharmaceutical supply-risk news coverage.", &prompt)
            .await
        {
            Ok(value) => value
                .get("confidence")
                .and_then(|v| v.as_f64())
                .filter(|c| (0.0..=1.0).contains(c))
                .unwrap_or_else(|| Self::heuristic_confidence(article)),
            Err(e) => {
                warn!(error = %e, "Article scoring unavailable, using keyword heuristic");
                Self::heuristic_confidence(article)
            }
        }
    }
}

#[async_trait]
impl SignalAgent for NewsAgent {
    fn name(&self) -> &'static str {
        "news"
    }

    async fn execute(&self, ctx: &AgentContext) -> Result<AgentFindings> {
        let mut queries: Vec<String> = ctx
            .catalog
            .names()
            .iter()
            .map(|name| format!("{} shortage", name))
            .collect();
        queries.push("hospital drug shortage".to_string());

        // Overlapping queries return the same story; dedup by URL, then
        // by title for syndicated copies on different URLs.
        let mut seen_urls = HashSet::new();
        let mut seen_titles = HashSet::new();
        let mut articles: Vec<RawArticle> = Vec::new();
        for query in &queries {
            let batch = retry_transient(&self.retry, || self.search.search(query)).await?;
            for article in batch {
                if !seen_urls.insert(article.url.clone()) {
                    continue;
                }
                if !article.title.is_empty() && !seen_titles.insert(article.title.clone()) {
                    continue;
                }
                articles.push(article);
            }
        }

        let matcher = DrugMatcher::new(&ctx.catalog);
        let mut recorded = 0usize;
        let mut below_threshold = 0usize;
        let mut hits = Vec::new();

        for article in &articles {
            let canonical = matcher
                .resolve(&article.title)
                .or_else(|| matcher.resolve(&article.description));
            let Some(canonical) = canonical else {
                debug!(title = %article.title, "Article names no monitored drug");
                continue;
            };
            let Some(drug) = ctx.store.get_drug_by_name(canonical).await? else {
                warn!(drug = %canonical, "Monitored drug has no inventory row");
                continue;
            };

            let confidence = Self::score_article(ctx.llm.as_ref(), article, canonical).await;
            if confidence < ctx.config.news_confidence_threshold {
                below_threshold += 1;
                continue;
            }

            let signal = ShortageSignal::new(
                drug.id,
                SourceType::News,
                confidence,
                format!("News ({}): {}", article.source, article.title),
            )
            .with_url(article.url.clone());

            match ctx.store.upsert_signal(signal).await? {
                SignalUpsert::Inserted(_) | SignalUpsert::Merged(_) => recorded += 1,
                SignalUpsert::Unchanged(_) => {}
            }
            hits.push(json!({ "drug": canonical, "title": article.title, "confidence": confidence }));
        }

        let summary = format!(
            "{} unique articles: {} signals recorded, {} below threshold",
            articles.len(),
            recorded,
            below_threshold
        );
        Ok(AgentFindings::new(
            json!({ "articles": articles.len(), "hits": hits, "below_threshold": below_threshold }),
            summary,
            recorded,
        ))
    }
}
