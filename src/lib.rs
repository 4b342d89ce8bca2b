//! # PharmaSentinel
//!
//! Multi-agent supply-chain intelligence for critical hospital drugs.
//!
//! Three signal agents run concurrently on a schedule: the Inventory
//! Agent projects burn rates and depletion, the Regulatory Agent watches
//! FDA enforcement actions, and the News Agent scores shortage coverage.
//! Their signals land in a shared evidence store, a deterministic
//! synthesizer turns them into severity-ranked, evidence-backed alerts,
//! and second-order agents follow up: the Substitute Agent ranks
//! clinically validated replacements and the Order Agent walks purchase
//! orders through a guarded state machine to a supplier suggestion.
//!
//! Language models are advisory everywhere they appear. Every agent has
//! a deterministic fallback, and synthesis never consults a model at
//! all, so the same inputs always produce the same alerts.
//!
//! ## Quick start
//!
//! ```no_run
//! use pharma_sentinel::prelude::*;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let sentinel = SentinelBuilder::new()
//!         .shortage_feed(Arc::new(OpenFdaFeed::new("https://api.fda.gov")?))
//!         .news_search(Arc::new(NewsApiSearch::new("https://newsapi.org", "api-key")?))
//!         .build()
//!         .await?;
//!
//!     let report = sentinel.run_once().await?;
//!     println!("{} alerts created", report.alerts_created);
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]

pub mod agents;
pub mod builder;
pub mod catalog;
pub mod config;
pub mod error;
pub mod feeds;
pub mod llm;
pub mod matching;
pub mod order;
pub mod pipeline;
pub mod resilience;
pub mod runtime;
pub mod store;
pub mod synthesis;
pub mod types;

pub use builder::SentinelBuilder;
pub use config::SentinelConfig;
pub use error::{Result, SentinelError};
pub use pipeline::{Orchestrator, RunReport};
pub use runtime::Sentinel;

/// Commonly used types for working with PharmaSentinel
pub mod prelude {
    pub use crate::agents::{
        AgentContext, AgentFindings, InventoryAgent, NewsAgent, OrderAgent, RegulatoryAgent,
        SignalAgent, SubstituteAgent,
    };
    pub use crate::builder::SentinelBuilder;
    pub use crate::catalog::{DrugCatalog, SubstitutionTable};
    pub use crate::config::SentinelConfig;
    pub use crate::error::{Result, SentinelError};
    pub use crate::feeds::{NewsApiSearch, NewsSearch, OpenFdaFeed, ShortageFeed};
    pub use crate::llm::{HttpLlmClient, LlmClient};
    pub use crate::order::{Order, OrderId, OrderStatus, OrderUrgency};
    pub use crate::pipeline::{Orchestrator, RunReport};
    pub use crate::runtime::Sentinel;
    pub use crate::store::{EvidenceStore, MemoryStore};
    pub use crate::types::{
        Alert, AlertId, AlertType, Drug, DrugId, RunId, Severity, ShortageSignal, SourceType,
        Substitute, Supplier,
    };
}
