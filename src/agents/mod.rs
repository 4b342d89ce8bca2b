//! Specialized agents: three concurrent signal collectors plus the
//! second-order substitute and order agents
//!
//! ## Table of Contents
//! - **AgentContext**: Shared per-run handles passed to every agent
//! - **AgentFindings**: What a signal agent reports back for the run log
//! - **SignalAgent**: Trait for the concurrently scheduled collectors
//!
//! Signal agents are isolated failure domains: each one catches its own
//! errors and the scheduler records a failed log entry for it while the
//! other agents' findings stand. Agents never call each other; all
//! coordination goes through the evidence store.

pub mod inventory;
pub mod news;
pub mod orders;
pub mod regulatory;
pub mod substitutes;

pub use inventory::InventoryAgent;
pub use news::NewsAgent;
pub use orders::OrderAgent;
pub use regulatory::RegulatoryAgent;
pub use substitutes::SubstituteAgent;

use crate::catalog::DrugCatalog;
use crate::config::SentinelConfig;
use crate::error::Result;
use crate::llm::BoxedLlmClient;
use crate::store::BoxedEvidenceStore;
use crate::types::RunId;
use async_trait::async_trait;
use std::sync::Arc;

/// Shared handles every agent needs for one run
#[derive(Clone)]
pub struct AgentContext {
    /// The run this execution belongs to
    pub run_id: RunId,
    /// Evidence store handle
    pub store: BoxedEvidenceStore,
    /// Advisory language model; `None` forces the deterministic paths
    pub llm: Option<BoxedLlmClient>,
    /// Pipeline configuration
    pub config: Arc<SentinelConfig>,
    /// Monitored-drug catalog
    pub catalog: Arc<DrugCatalog>,
}

/// What a signal agent reports back on success
#[derive(Debug, Clone)]
pub struct AgentFindings {
    /// Structured findings for the run log
    pub findings: serde_json::Value,
    /// Human-readable summary for the run log
    pub summary: String,
    /// Signals this execution inserted or merged
    pub signals_recorded: usize,
}

impl AgentFindings {
    /// Build a findings record
    pub fn new(
        findings: serde_json::Value,
        summary: impl Into<String>,
        signals_recorded: usize,
    ) -> Self {
        Self {
            findings,
            summary: summary.into(),
            signals_recorded,
        }
    }
}

/// A signal collector scheduled concurrently on every pipeline run
#[async_trait]
pub trait SignalAgent: Send + Sync {
    /// Agent name as it appears in run logs
    fn name(&self) -> &'static str;

    /// Execute one collection pass, recording signals through the store
    async fn execute(&self, ctx: &AgentContext) -> Result<AgentFindings>;
}

/// Boxed signal agent handle
pub type BoxedSignalAgent = Arc<dyn SignalAgent>;
