//! Regulatory Agent: FDA enforcement/recall monitoring
//!
//! Pulls enforcement records for every monitored drug, resolves the noisy
//! reported names against the catalog, and upserts FDA signals. Severity
//! assessment asks the model first and falls back to a criticality-rank
//! rule, so a model outage degrades confidence precision but never drops
//! a detection.

use crate::agents::{AgentContext, AgentFindings, SignalAgent};
use crate::error::Result;
use crate::feeds::{BoxedShortageFeed, RawShortageRecord};
use crate::llm::BoxedLlmClient;
use crate::matching::DrugMatcher;
use crate::resilience::{retry_transient, RetryConfig};
use crate::store::SignalUpsert;
use crate::types::{ShortageSignal, SourceType};
use async_trait::async_trait;
use serde_json::json;
use tracing::{debug, warn};

/// FDA-source monitor
pub struct RegulatoryAgent {
    feed: BoxedShortageFeed,
    retry: RetryConfig,
}

impl RegulatoryAgent {
    /// Create a regulatory agent over the given feed
    pub fn new(feed: BoxedShortageFeed) -> Self {
        Self {
            feed,
            retry: RetryConfig::default(),
        }
    }

    /// Deterministic confidence by criticality rank: the more critical the
    /// drug, the more seriously an enforcement record is taken.
    fn rank_confidence(rank: u8) -> f64 {
        match rank {
            1..=3 => 0.9,
            4..=6 => 0.7,
            _ => 0.5,
        }
    }

    /// Model-assessed confidence for one record, if the model cooperates
    async fn assess_confidence(
        llm: &BoxedLlmClient,
        record: &RawShortageRecord,
        canonical: &str,
    ) -> Option<f64> {
        let prompt = format!(
            "An FDA enforcement record may indicate a shortage of {}.\n\
             Reported product: {}\nReason: {}\nStatus: {}\n\
             How confident are you this threatens hospital supply? \
             Respond as JSON: {{\"confidence\": 0.0-1.0}}",
            canonical,
            record.reported_name,
            record.reason,
            record.status.as_deref().unwrap_or("unknown"),
        );
        match llm
            .complete("You are a pharmaceutical supply-chain analyst.", &prompt)
            .await
        {
            Ok(value) => value
                .get("confidence")
                .and_then(|v| v.as_f64())
                .filter(|c| (0.0..=1.0).contains(c)),
            Err(e) => {
                warn!(error = %e, "Confidence assessment unavailable, using rank rule");
                None
            }
        }
    }
}

#[async_trait]
impl SignalAgent for RegulatoryAgent {
    fn name(&self) -> &'static str {
        "regulatory"
    }

    async fn execute(&self, ctx: &AgentContext) -> Result<AgentFindings> {
        let names = ctx.catalog.names();
        let records = retry_transient(&self.retry, || self.feed.fetch_shortages(&names)).await?;
        let matcher = DrugMatcher::new(&ctx.catalog);

        let mut inserted = 0usize;
        let mut merged = 0usize;
        let mut unmatched = 0usize;
        let mut hits = Vec::new();

        for record in &records {
            let Some(canonical) = matcher.resolve(&record.reported_name) else {
                debug!(reported = %record.reported_name, "Record matched no monitored drug");
                unmatched += 1;
                continue;
            };
            // A monitored name without a store row means seeding drifted;
            // skip the record rather than fail the run.
            let Some(drug) = ctx.store.get_drug_by_name(canonical).await? else {
                warn!(drug = %canonical, "Monitored drug has no inventory row");
                unmatched += 1;
                continue;
            };

            let rank = ctx.catalog.rank_of(canonical).unwrap_or(10);
            let confidence = match &ctx.llm {
                Some(llm) => Self::assess_confidence(llm, record, canonical)
                    .await
                    .unwrap_or_else(|| Self::rank_confidence(rank)),
                None => Self::rank_confidence(rank),
            };

            let mut signal = ShortageSignal::new(
                drug.id,
                SourceType::Fda,
                confidence,
                format!("FDA enforcement: {}", record.reason),
            );
            if let Some(url) = &record.source_url {
                signal = signal.with_url(url.clone());
            }

            match ctx.store.upsert_signal(signal).await? {
                SignalUpsert::Inserted(_) => inserted += 1,
                SignalUpsert::Merged(_) => merged += 1,
                SignalUpsert::Unchanged(_) => {}
            }
            hits.push(json!({ "drug": canonical, "reason": record.reason, "confidence": confidence }));
        }

        let summary = format!(
            "{} enforcement records: {} new signals, {} merged, {} unmatched",
            records.len(),
            inserted,
            merged,
            unmatched
        );
        Ok(AgentFindings::new(
            json!({ "records": records.len(), "hits": hits, "unmatched": unmatched }),
            summary,
            inserted + merged,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::DrugCatalog;
    use crate::config::SentinelConfig;
    use crate::store::{EvidenceStore, MemoryStore};
    use crate::types::{Drug, RunId};
    use std::sync::Arc;

    struct StaticFeed(Vec<RawShortageRecord>);

    #[async_trait]
    impl crate::feeds::ShortageFeed for StaticFeed {
        async fn fetch_shortages(&self, _names: &[&str]) -> Result<Vec<RawShortageRecord>> {
            Ok(self.0.clone())
        }

        fn name(&self) -> &str {
            "static"
        }
    }

    fn record(name: &str, reason: &str) -> RawShortageRecord {
        RawShortageRecord {
            reported_name: name.to_string(),
            status: Some("Ongoing".to_string()),
            severity: None,
            reason: reason.to_string(),
            source_url: Some("https://api.fda.gov/drug/enforcement.json".to_string()),
        }
    }

    async fn seeded_context(store: Arc<MemoryStore>) -> AgentContext {
        store
            .insert_drug(Drug::new("Epinephrine", "Vasopressor", 1).with_stock(50.0))
            .await
            .unwrap();
        store
            .insert_drug(Drug::new("Morphine", "Opioid analgesic", 7).with_stock(50.0))
            .await
            .unwrap();
        AgentContext {
            run_id: RunId::new(),
            store,
            llm: None,
            config: Arc::new(SentinelConfig::default()),
            catalog: Arc::new(DrugCatalog::standard()),
        }
    }

    #[test]
    fn test_rank_confidence_tiers() {
        assert_eq!(RegulatoryAgent::rank_confidence(1), 0.9);
        assert_eq!(RegulatoryAgent::rank_confidence(5), 0.7);
        assert_eq!(RegulatoryAgent::rank_confidence(9), 0.5);
    }

    #[tokio::test]
    async fn test_noisy_feed_name_resolves_and_signals() {
        let store = Arc::new(MemoryStore::new());
        let ctx = seeded_context(store.clone()).await;
        let agent = RegulatoryAgent::new(Arc::new(StaticFeed(vec![record(
            "EPINEPHrine HCl 1mg/mL Injection",
            "Sterility assurance failure",
        )])));

        let findings = agent.execute(&ctx).await.unwrap();
        assert_eq!(findings.signals_recorded, 1);

        let signals = store.unresolved_signals().await.unwrap();
        assert_eq!(signals.len(), 1);
        assert_eq!(signals[0].source_type, SourceType::Fda);
        // Rank 1 drug gets the top deterministic confidence
        assert_eq!(signals[0].confidence, 0.9);
        assert!(signals[0].source_url.is_some());
    }

    #[tokio::test]
    async fn test_rerun_is_idempotent() {
        let store = Arc::new(MemoryStore::new());
        let ctx = seeded_context(store.clone()).await;
        let agent = RegulatoryAgent::new(Arc::new(StaticFeed(vec![record(
            "Morphine Sulfate 10mg",
            "Labeling mix-up",
        )])));

        agent.execute(&ctx).await.unwrap();
        agent.execute(&ctx).await.unwrap();

        // Same record on back-to-back runs lands on one unresolved row
        assert_eq!(store.unresolved_signals().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_unmatched_record_skipped() {
        let store = Arc::new(MemoryStore::new());
        let ctx = seeded_context(store.clone()).await;
        let agent = RegulatoryAgent::new(Arc::new(StaticFeed(vec![record(
            "Acetaminophen 500mg tablets",
            "Foreign material",
        )])));

        let findings = agent.execute(&ctx).await.unwrap();
        assert_eq!(findings.signals_recorded, 0);
        assert!(store.unresolved_signals().await.unwrap().is_empty());
    }
}
