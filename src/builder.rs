//! Builder for assembling a configured Sentinel instance
//!
//! Wires the store, capabilities, catalog, and agents together and seeds
//! the store with any catalog drugs or suppliers it is missing, so a
//! fresh in-memory deployment is immediately runnable.

use crate::agents::{BoxedSignalAgent, InventoryAgent, NewsAgent, RegulatoryAgent};
use crate::catalog::{default_suppliers, DrugCatalog, SubstitutionTable};
use crate::config::SentinelConfig;
use crate::error::{Result, SentinelError};
use crate::feeds::{BoxedNewsSearch, BoxedShortageFeed};
use crate::llm::BoxedLlmClient;
use crate::pipeline::Orchestrator;
use crate::runtime::Sentinel;
use crate::store::{BoxedEvidenceStore, MemoryStore};
use crate::types::Drug;
use std::sync::Arc;
use tracing::info;

/// Builder for a Sentinel instance
pub struct SentinelBuilder {
    store: Option<BoxedEvidenceStore>,
    llm: Option<BoxedLlmClient>,
    shortage_feed: Option<BoxedShortageFeed>,
    news_search: Option<BoxedNewsSearch>,
    config: SentinelConfig,
    catalog: DrugCatalog,
    table: SubstitutionTable,
}

impl Default for SentinelBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl SentinelBuilder {
    /// Start a builder with the standard catalog and substitution table
    pub fn new() -> Self {
        Self {
            store: None,
            llm: None,
            shortage_feed: None,
            news_search: None,
            config: SentinelConfig::default(),
            catalog: DrugCatalog::standard(),
            table: SubstitutionTable::standard(),
        }
    }

    /// Use the given evidence store (defaults to an in-memory store)
    pub fn store(mut self, store: BoxedEvidenceStore) -> Self {
        self.store = Some(store);
        self
    }

    /// Attach an advisory language model
    pub fn llm(mut self, llm: BoxedLlmClient) -> Self {
        self.llm = Some(llm);
        self
    }

    /// Set the regulatory shortage feed (required)
    pub fn shortage_feed(mut self, feed: BoxedShortageFeed) -> Self {
        self.shortage_feed = Some(feed);
        self
    }

    /// Set the news search capability (required)
    pub fn news_search(mut self, search: BoxedNewsSearch) -> Self {
        self.news_search = Some(search);
        self
    }

    /// Set the pipeline configuration
    pub fn config(mut self, config: SentinelConfig) -> Self {
        self.config = config;
        self
    }

    /// Replace the monitored-drug catalog
    pub fn catalog(mut self, catalog: DrugCatalog) -> Self {
        self.catalog = catalog;
        self
    }

    /// Replace the substitution table
    pub fn substitution_table(mut self, table: SubstitutionTable) -> Self {
        self.table = table;
        self
    }

    /// Assemble the Sentinel, seeding missing catalog rows in the store
    pub async fn build(self) -> Result<Sentinel> {
        let shortage_feed = self
            .shortage_feed
            .ok_or_else(|| SentinelError::config("a shortage feed is required"))?;
        let news_search = self
            .news_search
            .ok_or_else(|| SentinelError::config("a news search capability is required"))?;
        let store = self
            .store
            .unwrap_or_else(|| Arc::new(MemoryStore::new()) as BoxedEvidenceStore);

        // Every catalog drug needs an inventory row before the agents run
        let mut seeded = 0usize;
        for entry in self.catalog.entries() {
            if store.get_drug_by_name(&entry.name).await?.is_none() {
                store
                    .insert_drug(Drug::new(&entry.name, &entry.category, entry.rank))
                    .await?;
                seeded += 1;
            }
        }
        if store.active_suppliers().await?.is_empty() {
            for supplier in default_suppliers() {
                store.insert_supplier(supplier).await?;
            }
        }
        if seeded > 0 {
            info!(seeded, "Seeded catalog drugs into the store");
        }

        let config = Arc::new(self.config);
        let catalog = Arc::new(self.catalog);
        let signal_agents: Vec<BoxedSignalAgent> = vec![
            Arc::new(InventoryAgent::new()),
            Arc::new(RegulatoryAgent::new(shortage_feed)),
            Arc::new(NewsAgent::new(news_search)),
        ];

        let orchestrator = Orchestrator::new(
            store,
            self.llm,
            config.clone(),
            catalog,
            Arc::new(self.table),
            signal_agents,
        );
        Ok(Sentinel::new(Arc::new(orchestrator), config))
    }
}
