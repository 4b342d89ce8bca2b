//! The pipeline orchestrator: scheduled runs, fan-out, and order triggers
//!
//! ## Table of Contents
//! - **RunReport**: Outcome summary of one pipeline run
//! - **Orchestrator**: Owns the agents and drives the run sequence
//!
//! One run executes the three signal agents concurrently under a shared
//! timeout, writes exactly one log entry per agent regardless of outcome,
//! synthesizes alerts, fans the substitute agent out per flagged drug,
//! and places automatic orders for critical restock alerts. Runs never
//! overlap: a run that is still in flight when the next tick arrives
//! makes the new attempt fail fast with a conflict.

use crate::agents::{AgentContext, BoxedSignalAgent, OrderAgent, SubstituteAgent};
use crate::catalog::{DrugCatalog, SubstitutionTable};
use crate::config::SentinelConfig;
use crate::error::{Result, SentinelError};
use crate::llm::BoxedLlmClient;
use crate::order::{Order, OrderId};
use crate::store::BoxedEvidenceStore;
use crate::synthesis::Synthesizer;
use crate::types::{AgentLogEntry, RunId};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use futures::future::join_all;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::broadcast;
use tokio::time::{interval, timeout, MissedTickBehavior};
use tracing::{error, info, warn};

/// Outcome summary of one pipeline run
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    /// The run identifier
    pub run_id: RunId,
    /// When the run started
    pub started_at: DateTime<Utc>,
    /// Wall-clock duration in milliseconds
    pub duration_ms: u64,
    /// Signal agents that completed
    pub agents_succeeded: usize,
    /// Signal agents that failed
    pub agents_failed: usize,
    /// Signal agents that hit the timeout
    pub agents_timed_out: usize,
    /// Alerts created by synthesis
    pub alerts_created: usize,
    /// Open alerts escalated in place
    pub alerts_escalated: usize,
    /// Signals resolved because their condition cleared
    pub signals_resolved: usize,
    /// Substitute rows refreshed by the fan-out
    pub substitutes_refreshed: usize,
    /// Automatic orders that reached a suggestion
    pub orders_suggested: usize,
}

/// Clears the busy flag when a run exits by any path
struct RunGuard<'a>(&'a AtomicBool);

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Owns the agents and drives the run sequence
pub struct Orchestrator {
    store: BoxedEvidenceStore,
    llm: Option<BoxedLlmClient>,
    config: Arc<SentinelConfig>,
    catalog: Arc<DrugCatalog>,
    signal_agents: Vec<BoxedSignalAgent>,
    substitute_agent: SubstituteAgent,
    order_agent: OrderAgent,
    synthesizer: Synthesizer,
    running: AtomicBool,
    order_leases: DashMap<OrderId, Instant>,
}

impl Orchestrator {
    /// Assemble an orchestrator from its parts
    pub fn new(
        store: BoxedEvidenceStore,
        llm: Option<BoxedLlmClient>,
        config: Arc<SentinelConfig>,
        catalog: Arc<DrugCatalog>,
        table: Arc<SubstitutionTable>,
        signal_agents: Vec<BoxedSignalAgent>,
    ) -> Self {
        Self {
            store,
            llm,
            synthesizer: Synthesizer::new(config.clone()),
            substitute_agent: SubstituteAgent::new(table),
            order_agent: OrderAgent::new(),
            config,
            catalog,
            signal_agents,
            running: AtomicBool::new(false),
            order_leases: DashMap::new(),
        }
    }

    /// Evidence store handle, for read surfaces layered on top
    pub fn store(&self) -> &BoxedEvidenceStore {
        &self.store
    }

    fn context(&self, run_id: RunId) -> AgentContext {
        AgentContext {
            run_id,
            store: self.store.clone(),
            llm: self.llm.clone(),
            config: self.config.clone(),
            catalog: self.catalog.clone(),
        }
    }

    fn reserve(&self) -> Result<()> {
        if self
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(SentinelError::conflict("a pipeline run is already in progress"));
        }
        Ok(())
    }

    /// Execute one full pipeline run.
    ///
    /// Fails fast with `SentinelError::Conflict` if a run is already in
    /// flight; the caller decides whether that is a skip or an error.
    pub async fn run_once(&self) -> Result<RunReport> {
        self.reserve()?;
        let _guard = RunGuard(&self.running);
        self.execute_run(RunId::new()).await
    }

    /// Start a pipeline run in the background and return its identifier
    /// immediately; progress is observable through the run's log entries.
    pub fn spawn_run(self: &Arc<Self>) -> Result<RunId> {
        self.reserve()?;
        let run_id = RunId::new();
        let orch = Arc::clone(self);
        tokio::spawn(async move {
            let _guard = RunGuard(&orch.running);
            if let Err(e) = orch.execute_run(run_id).await {
                error!(run_id = %run_id, error = %e, "Background pipeline run failed");
            }
        });
        Ok(run_id)
    }

    async fn execute_run(&self, run_id: RunId) -> Result<RunReport> {
        let started = Instant::now();
        let started_at = Utc::now();
        let ctx = self.context(run_id);
        info!(run_id = %run_id, agents = self.signal_agents.len(), "Pipeline run started");

        // Phase 1: signal collection, concurrent, one log entry per agent
        let executions = join_all(self.signal_agents.iter().map(|agent| {
            let ctx = ctx.clone();
            async move {
                let outcome = timeout(ctx.config.agent_timeout, agent.execute(&ctx)).await;
                (agent.name(), outcome)
            }
        }))
        .await;

        let mut succeeded = 0usize;
        let mut failed = 0usize;
        let mut timed_out = 0usize;
        for (name, outcome) in executions {
            let entry = match outcome {
                Ok(Ok(findings)) => {
                    succeeded += 1;
                    info!(run_id = %run_id, agent = name, summary = %findings.summary, "Agent succeeded");
                    AgentLogEntry::succeeded(run_id, name, findings.findings, findings.summary)
                }
                Ok(Err(e)) => {
                    failed += 1;
                    warn!(run_id = %run_id, agent = name, error = %e, "Agent failed");
                    AgentLogEntry::failed(run_id, name, e.to_string())
                }
                Err(_) => {
                    timed_out += 1;
                    warn!(run_id = %run_id, agent = name, "Agent timed out");
                    AgentLogEntry::timed_out(run_id, name)
                }
            };
            self.store.insert_log(entry).await?;
        }

        // Phase 2: deterministic synthesis
        let synthesis = self.synthesizer.synthesize(&self.store, run_id).await?;

        // Phase 3: substitute fan-out, one task per flagged drug,
        // failures contained per drug
        let substitute_runs = join_all(synthesis.needs_substitute.iter().map(|drug_id| {
            let ctx = ctx.clone();
            let agent = &self.substitute_agent;
            async move {
                let Some(drug) = ctx.store.get_drug(*drug_id).await? else {
                    return Ok(0);
                };
                agent.run_for_drug(&ctx, &drug).await.map(|f| f.signals_recorded)
            }
        }))
        .await;
        let mut substitutes_refreshed = 0usize;
        for outcome in substitute_runs {
            match outcome {
                Ok(count) => substitutes_refreshed += count,
                Err(e) => warn!(run_id = %run_id, error = %e, "Substitute analysis failed"),
            }
        }

        // Phase 4: automatic orders for critical restock alerts
        let mut orders_suggested = 0usize;
        for auto in &synthesis.auto_orders {
            match self.place_auto_order(&ctx, auto).await {
                Ok(order) => {
                    orders_suggested += 1;
                    info!(run_id = %run_id, order = %order.id, "Automatic order suggested");
                }
                Err(e) => warn!(run_id = %run_id, drug = %auto.drug_id, error = %e, "Automatic order failed"),
            }
        }

        let report = RunReport {
            run_id,
            started_at,
            duration_ms: started.elapsed().as_millis() as u64,
            agents_succeeded: succeeded,
            agents_failed: failed,
            agents_timed_out: timed_out,
            alerts_created: synthesis.created.len(),
            alerts_escalated: synthesis.escalated,
            signals_resolved: synthesis.signals_resolved,
            substitutes_refreshed,
            orders_suggested,
        };
        info!(
            run_id = %run_id,
            duration_ms = report.duration_ms,
            alerts = report.alerts_created,
            escalated = report.alerts_escalated,
            orders = report.orders_suggested,
            "Pipeline run complete"
        );
        Ok(report)
    }

    /// Create and analyze an automatic order for a critical restock alert
    async fn place_auto_order(
        &self,
        ctx: &AgentContext,
        auto: &crate::synthesis::AutoOrder,
    ) -> Result<Order> {
        let drug = self
            .store
            .get_drug(auto.drug_id)
            .await?
            .ok_or_else(|| SentinelError::data_integrity(format!("unknown drug {}", auto.drug_id)))?;

        // Restock to a full depletion-horizon supply
        let target = drug.predicted_burn_rate * self.config.depletion_horizon_days;
        let quantity = (target - drug.stock_level).max(1.0).ceil();

        let order = Order::new(drug.id, quantity)
            .from_alert(auto.alert_id)
            .with_urgency(auto.urgency);
        let order_id = self.store.insert_order(order).await?;
        self.order_agent.analyze(ctx, order_id).await
    }

    /// Trigger order analysis on demand (the operator-facing path).
    ///
    /// A per-order lease rejects duplicate triggers while one is in
    /// flight; leases expire after the configured TTL so a crashed
    /// analysis cannot wedge the order forever.
    pub async fn trigger_order(&self, order_id: OrderId) -> Result<Order> {
        if self.store.get_order(order_id).await?.is_none() {
            return Err(SentinelError::data_integrity(format!("unknown order {}", order_id)));
        }

        use dashmap::mapref::entry::Entry;
        match self.order_leases.entry(order_id) {
            Entry::Occupied(mut occupied) => {
                if occupied.get().elapsed() < self.config.order_lease_ttl {
                    return Err(SentinelError::conflict(format!(
                        "analysis for {} is already in flight",
                        order_id
                    )));
                }
                occupied.insert(Instant::now());
            }
            Entry::Vacant(vacant) => {
                vacant.insert(Instant::now());
            }
        }

        let ctx = self.context(RunId::new());
        let result = self.order_agent.analyze(&ctx, order_id).await;
        self.order_leases.remove(&order_id);
        result
    }

    /// Run on the configured interval until shutdown.
    ///
    /// A tick that lands while the previous run is still in flight is
    /// skipped, not queued.
    pub async fn run_scheduled(self: Arc<Self>, mut shutdown: broadcast::Receiver<()>) {
        let mut ticker = interval(self.config.run_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(
            interval_secs = self.config.run_interval.as_secs(),
            "Scheduled pipeline loop started"
        );

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    match self.run_once().await {
                        Ok(_) => {}
                        Err(SentinelError::Conflict(_)) => {
                            warn!("Previous run still in progress, skipping tick");
                        }
                        Err(e) => {
                            error!(error = %e, "Pipeline run failed");
                        }
                    }
                }
                _ = shutdown.recv() => {
                    info!("Scheduled pipeline loop stopping");
                    break;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::{AgentFindings, InventoryAgent, NewsAgent, RegulatoryAgent, SignalAgent};
    use crate::catalog::default_suppliers;
    use crate::feeds::{NewsSearch, RawArticle, RawShortageRecord, ShortageFeed};
    use crate::store::{EvidenceStore, MemoryStore};
    use crate::types::{AgentStatus, AlertType, Drug, Severity};
    use async_trait::async_trait;
    use std::time::Duration;

    struct EmptyFeed;

    #[async_trait]
    impl ShortageFeed for EmptyFeed {
        async fn fetch_shortages(&self, _names: &[&str]) -> Result<Vec<RawShortageRecord>> {
            Ok(Vec::new())
        }
        fn name(&self) -> &str {
            "empty"
        }
    }

    struct EmptySearch;

    #[async_trait]
    impl NewsSearch for EmptySearch {
        async fn search(&self, _query: &str) -> Result<Vec<RawArticle>> {
            Ok(Vec::new())
        }
        fn name(&self) -> &str {
            "empty"
        }
    }

    struct SleepyAgent(Duration);

    #[async_trait]
    impl SignalAgent for SleepyAgent {
        fn name(&self) -> &'static str {
            "sleepy"
        }
        async fn execute(&self, _ctx: &AgentContext) -> Result<AgentFindings> {
            tokio::time::sleep(self.0).await;
            Ok(AgentFindings::new(serde_json::json!({}), "slept", 0))
        }
    }

    struct BrokenAgent;

    #[async_trait]
    impl SignalAgent for BrokenAgent {
        fn name(&self) -> &'static str {
            "broken"
        }
        async fn execute(&self, _ctx: &AgentContext) -> Result<AgentFindings> {
            Err(SentinelError::agent("collector exploded"))
        }
    }

    fn standard_agents() -> Vec<BoxedSignalAgent> {
        vec![
            Arc::new(InventoryAgent::new()),
            Arc::new(RegulatoryAgent::new(Arc::new(EmptyFeed))),
            Arc::new(NewsAgent::new(Arc::new(EmptySearch))),
        ]
    }

    fn orchestrator(
        store: Arc<MemoryStore>,
        config: SentinelConfig,
        agents: Vec<BoxedSignalAgent>,
    ) -> Orchestrator {
        Orchestrator::new(
            store,
            None,
            Arc::new(config),
            Arc::new(DrugCatalog::standard()),
            Arc::new(SubstitutionTable::standard()),
            agents,
        )
    }

    async fn seed_shortage(store: &MemoryStore) -> Drug {
        // 2.5 days of supply against a 3-day threshold on the rank-1 drug
        let drug = Drug::new("Epinephrine", "Vasopressor", 1)
            .with_stock(5.0)
            .with_usage_rate(2.0)
            .with_reorder_threshold(3.0);
        store.insert_drug(drug.clone()).await.unwrap();
        for supplier in default_suppliers() {
            store.insert_supplier(supplier).await.unwrap();
        }
        drug
    }

    #[tokio::test]
    async fn test_full_run_on_critical_shortage() {
        let store = Arc::new(MemoryStore::new());
        let drug = seed_shortage(&store).await;
        let orch = orchestrator(store.clone(), SentinelConfig::default(), standard_agents());

        let report = orch.run_once().await.unwrap();
        assert_eq!(report.agents_succeeded, 3);
        assert_eq!(report.alerts_created, 1);
        assert_eq!(report.orders_suggested, 1);
        assert!(report.substitutes_refreshed >= 2);

        // Exactly one log entry per signal agent
        let logs = store.logs_for_run(report.run_id).await.unwrap();
        assert_eq!(logs.len(), 3);
        assert!(logs.iter().all(|l| l.status == AgentStatus::Succeeded));

        // The critical restock alert plus the order suggestion
        let alerts = store.open_alerts().await.unwrap();
        let restock = alerts
            .iter()
            .find(|a| a.alert_type == AlertType::RestockNow)
            .unwrap();
        assert_eq!(restock.severity, Severity::Critical);
        assert_eq!(restock.drug_id, Some(drug.id));
        assert!(alerts.iter().any(|a| a.alert_type == AlertType::OrderSuggested));

        let substitutes = store.substitutes_for(drug.id).await.unwrap();
        assert_eq!(substitutes.len(), 2);
    }

    #[tokio::test]
    async fn test_failed_agent_contained() {
        let store = Arc::new(MemoryStore::new());
        seed_shortage(&store).await;
        let agents: Vec<BoxedSignalAgent> = vec![
            Arc::new(InventoryAgent::new()),
            Arc::new(BrokenAgent),
            Arc::new(NewsAgent::new(Arc::new(EmptySearch))),
        ];
        let orch = orchestrator(store.clone(), SentinelConfig::default(), agents);

        let report = orch.run_once().await.unwrap();
        assert_eq!(report.agents_succeeded, 2);
        assert_eq!(report.agents_failed, 1);
        // Inventory findings still produced an alert
        assert_eq!(report.alerts_created, 1);

        let logs = store.logs_for_run(report.run_id).await.unwrap();
        assert_eq!(logs.len(), 3);
        let broken = logs.iter().find(|l| l.agent_name == "broken").unwrap();
        assert_eq!(broken.status, AgentStatus::Failed);
        assert!(broken.summary.contains("exploded"));
    }

    #[tokio::test]
    async fn test_slow_agent_times_out() {
        let store = Arc::new(MemoryStore::new());
        let agents: Vec<BoxedSignalAgent> = vec![
            Arc::new(InventoryAgent::new()),
            Arc::new(SleepyAgent(Duration::from_secs(5))),
        ];
        let config = SentinelConfig::default().agent_timeout(Duration::from_millis(20));
        let orch = orchestrator(store.clone(), config, agents);

        let report = orch.run_once().await.unwrap();
        assert_eq!(report.agents_timed_out, 1);

        let logs = store.logs_for_run(report.run_id).await.unwrap();
        assert_eq!(logs.len(), 2);
        assert!(logs.iter().any(|l| l.status == AgentStatus::TimedOut));
    }

    #[tokio::test]
    async fn test_overlapping_runs_conflict() {
        let store = Arc::new(MemoryStore::new());
        let agents: Vec<BoxedSignalAgent> = vec![Arc::new(SleepyAgent(Duration::from_millis(200)))];
        let orch = Arc::new(orchestrator(store, SentinelConfig::default(), agents));

        let background = {
            let orch = orch.clone();
            tokio::spawn(async move { orch.run_once().await })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;

        let err = orch.run_once().await.unwrap_err();
        assert!(matches!(err, SentinelError::Conflict(_)));

        // The first run still completes normally
        assert!(background.await.unwrap().is_ok());
        // And the flag is released for the next run
        assert!(orch.run_once().await.is_ok());
    }

    #[tokio::test]
    async fn test_spawned_run_observable_through_logs() {
        let store = Arc::new(MemoryStore::new());
        let agents: Vec<BoxedSignalAgent> = vec![Arc::new(SleepyAgent(Duration::from_millis(50)))];
        let orch = Arc::new(orchestrator(store.clone(), SentinelConfig::default(), agents));

        let run_id = orch.spawn_run().unwrap();
        // Still in flight: a second start is rejected
        let err = orch.run_once().await.unwrap_err();
        assert!(matches!(err, SentinelError::Conflict(_)));

        tokio::time::sleep(Duration::from_millis(250)).await;
        let logs = store.logs_for_run(run_id).await.unwrap();
        assert_eq!(logs.len(), 1);
        // Flag released once the background run finishes
        assert!(orch.run_once().await.is_ok());
    }

    #[tokio::test]
    async fn test_trigger_order_unknown_and_duplicate() {
        let store = Arc::new(MemoryStore::new());
        let drug = seed_shortage(&store).await;
        let orch = orchestrator(store.clone(), SentinelConfig::default(), standard_agents());

        let err = orch.trigger_order(OrderId::new()).await.unwrap_err();
        assert!(matches!(err, SentinelError::DataIntegrity(_)));

        let order = Order::new(drug.id, 10.0);
        let id = store.insert_order(order).await.unwrap();
        let suggested = orch.trigger_order(id).await.unwrap();
        assert_eq!(suggested.status, crate::order::OrderStatus::Suggested);

        // The order left PENDING, so a re-trigger loses the compare-and-set
        let err = orch.trigger_order(id).await.unwrap_err();
        assert!(matches!(err, SentinelError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_concurrent_triggers_yield_one_analysis() {
        let store = Arc::new(MemoryStore::new());
        let drug = seed_shortage(&store).await;
        let orch = Arc::new(orchestrator(
            store.clone(),
            SentinelConfig::default(),
            standard_agents(),
        ));

        let order = Order::new(drug.id, 10.0);
        let id = store.insert_order(order).await.unwrap();

        let a = {
            let orch = orch.clone();
            tokio::spawn(async move { orch.trigger_order(id).await })
        };
        let b = {
            let orch = orch.clone();
            tokio::spawn(async move { orch.trigger_order(id).await })
        };
        let outcomes = [a.await.unwrap(), b.await.unwrap()];

        let suggested = outcomes.iter().filter(|o| o.is_ok()).count();
        assert_eq!(suggested, 1);
        assert!(outcomes
            .iter()
            .any(|o| matches!(o, Err(SentinelError::Conflict(_)))));
        assert_eq!(
            store.get_order(id).await.unwrap().unwrap().status,
            crate::order::OrderStatus::Suggested
        );
    }

    #[tokio::test]
    async fn test_second_run_escalates_not_duplicates() {
        let store = Arc::new(MemoryStore::new());
        seed_shortage(&store).await;
        let orch = orchestrator(store.clone(), SentinelConfig::default(), standard_agents());

        let first = orch.run_once().await.unwrap();
        assert_eq!(first.alerts_created, 1);

        let second = orch.run_once().await.unwrap();
        assert_eq!(second.alerts_created, 0);
        // One RESTOCK_NOW alert total, not one per run
        let restocks = store
            .open_alerts()
            .await
            .unwrap()
            .into_iter()
            .filter(|a| a.alert_type == AlertType::RestockNow)
            .count();
        assert_eq!(restocks, 1);
    }
}
