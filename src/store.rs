//! Evidence store: the only shared mutable state in the system
//!
//! ## Table of Contents
//! - **SignalUpsert**: Outcome of a natural-key signal upsert
//! - **EvidenceStore**: Trait for durable keyed storage backends
//! - **MemoryStore**: In-memory reference backend (tests, development)
//!
//! All cross-component communication goes through this trait; agents
//! never call each other directly. Burn-rate writes and order status
//! transitions use conditional semantics instead of blind overwrite so a
//! stale retry cannot clobber fresher state.

use crate::error::{Result, SentinelError};
use crate::order::{Order, OrderId, OrderStatus, OrderUpdate};
use crate::types::{
    AgentLogEntry, Alert, AlertId, Drug, DrugId, RunId, Severity, ShortageSignal, SignalId,
    Substitute, Supplier, SurgeryEntry,
};
use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

/// Outcome of upserting a shortage signal by its natural key
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalUpsert {
    /// No unresolved row matched the key; a new row was inserted
    Inserted(SignalId),
    /// An unresolved row matched; confidence/description were merged
    Merged(SignalId),
    /// An unresolved row matched and nothing materially changed
    Unchanged(SignalId),
}

impl SignalUpsert {
    /// The id of the affected row
    pub fn signal_id(&self) -> SignalId {
        match self {
            Self::Inserted(id) | Self::Merged(id) | Self::Unchanged(id) => *id,
        }
    }
}

/// Trait for evidence storage backends.
///
/// The core never assumes a query language; it relies only on inserts,
/// natural-key upserts, conditional updates, and filtered queries.
#[async_trait]
pub trait EvidenceStore: Send + Sync {
    // Drugs

    /// All monitored drug rows
    async fn drugs(&self) -> Result<Vec<Drug>>;

    /// Fetch one drug by id
    async fn get_drug(&self, id: DrugId) -> Result<Option<Drug>>;

    /// Fetch one drug by canonical name
    async fn get_drug_by_name(&self, name: &str) -> Result<Option<Drug>>;

    /// Insert a drug row (seeding)
    async fn insert_drug(&self, drug: Drug) -> Result<()>;

    /// Conditionally write a predicted burn rate.
    ///
    /// The write applies only if the row has not been updated after
    /// `as_of`, so a stale retry cannot overwrite a fresher projection.
    /// Returns whether the write applied.
    async fn update_burn_rate(&self, id: DrugId, rate: f64, as_of: DateTime<Utc>) -> Result<bool>;

    // Surgery schedule

    /// Schedule entries within the next `within_days` days
    async fn surgery_schedule(&self, within_days: u32) -> Result<Vec<SurgeryEntry>>;

    /// Insert a schedule entry (seeding)
    async fn insert_surgery(&self, entry: SurgeryEntry) -> Result<()>;

    // Shortage signals

    /// Upsert a signal by `(drug_id, source_type, window)` among
    /// unresolved rows: insert if new, merge (max confidence, refreshed
    /// description) if materially changed, leave untouched otherwise.
    async fn upsert_signal(&self, signal: ShortageSignal) -> Result<SignalUpsert>;

    /// All unresolved signals
    async fn unresolved_signals(&self) -> Result<Vec<ShortageSignal>>;

    /// Flip a signal's resolved flag
    async fn resolve_signal(&self, id: SignalId) -> Result<()>;

    // Agent logs (append-only)

    /// Append an agent log entry; entries are never overwritten
    async fn insert_log(&self, entry: AgentLogEntry) -> Result<()>;

    /// Log entries for one run
    async fn logs_for_run(&self, run_id: RunId) -> Result<Vec<AgentLogEntry>>;

    // Alerts

    /// Insert a synthesized alert
    async fn insert_alert(&self, alert: Alert) -> Result<AlertId>;

    /// All unacknowledged alerts
    async fn open_alerts(&self) -> Result<Vec<Alert>>;

    /// Raise the severity of an unacknowledged alert in place
    async fn escalate_alert(&self, id: AlertId, severity: Severity) -> Result<()>;

    /// Mark an alert acknowledged (alerts are never deleted)
    async fn acknowledge_alert(&self, id: AlertId) -> Result<()>;

    // Substitutes

    /// Upsert a substitute by `(drug_id, substitute_name)`
    async fn upsert_substitute(&self, substitute: Substitute) -> Result<()>;

    /// Substitute rows for a drug, active and inactive
    async fn substitutes_for(&self, drug_id: DrugId) -> Result<Vec<Substitute>>;

    /// Deactivate a previously suggested substitute that is no longer valid
    async fn deactivate_substitute(&self, drug_id: DrugId, substitute_name: &str) -> Result<()>;

    // Suppliers (read-mostly; managed externally)

    /// All active supplier rows
    async fn active_suppliers(&self) -> Result<Vec<Supplier>>;

    /// Insert a supplier row (seeding)
    async fn insert_supplier(&self, supplier: Supplier) -> Result<()>;

    // Orders

    /// Insert a new order
    async fn insert_order(&self, order: Order) -> Result<OrderId>;

    /// Fetch one order
    async fn get_order(&self, id: OrderId) -> Result<Option<Order>>;

    /// Compare-and-set order transition: applies `update` only if the
    /// order's current status equals `expected` and the target status is
    /// an edge of the transition graph. Returns the updated order, or
    /// `SentinelError::Conflict` when the CAS loses.
    async fn update_order_if(
        &self,
        id: OrderId,
        expected: OrderStatus,
        update: OrderUpdate,
    ) -> Result<Order>;

    /// Store name for logging
    fn name(&self) -> &str;
}

/// Boxed store handle
pub type BoxedEvidenceStore = Arc<dyn EvidenceStore>;

/// In-memory evidence store for tests and development
#[derive(Debug, Default)]
pub struct MemoryStore {
    drugs: RwLock<HashMap<DrugId, Drug>>,
    surgeries: RwLock<Vec<SurgeryEntry>>,
    signals: RwLock<HashMap<SignalId, ShortageSignal>>,
    logs: RwLock<Vec<AgentLogEntry>>,
    alerts: RwLock<HashMap<AlertId, Alert>>,
    substitutes: RwLock<HashMap<(DrugId, String), Substitute>>,
    suppliers: RwLock<Vec<Supplier>>,
    orders: RwLock<HashMap<OrderId, Order>>,
}

impl MemoryStore {
    /// Create an empty memory store
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl EvidenceStore for MemoryStore {
    async fn drugs(&self) -> Result<Vec<Drug>> {
        let drugs = self.drugs.read().await;
        let mut rows: Vec<Drug> = drugs.values().cloned().collect();
        rows.sort_by_key(|d| d.criticality);
        Ok(rows)
    }

    async fn get_drug(&self, id: DrugId) -> Result<Option<Drug>> {
        Ok(self.drugs.read().await.get(&id).cloned())
    }

    async fn get_drug_by_name(&self, name: &str) -> Result<Option<Drug>> {
        Ok(self
            .drugs
            .read()
            .await
            .values()
            .find(|d| d.name == name)
            .cloned())
    }

    async fn insert_drug(&self, drug: Drug) -> Result<()> {
        self.drugs.write().await.insert(drug.id, drug);
        Ok(())
    }

    async fn update_burn_rate(&self, id: DrugId, rate: f64, as_of: DateTime<Utc>) -> Result<bool> {
        let mut drugs = self.drugs.write().await;
        let drug = drugs
            .get_mut(&id)
            .ok_or_else(|| SentinelError::data_integrity(format!("unknown drug {}", id)))?;

        if drug.updated_at > as_of {
            debug!(drug = %id, "Skipping stale burn-rate write");
            return Ok(false);
        }
        drug.predicted_burn_rate = rate;
        drug.updated_at = Utc::now();
        Ok(true)
    }

    async fn surgery_schedule(&self, within_days: u32) -> Result<Vec<SurgeryEntry>> {
        let today = Utc::now().date_naive();
        let horizon = today + ChronoDuration::days(within_days as i64);
        Ok(self
            .surgeries
            .read()
            .await
            .iter()
            .filter(|s| s.date >= today && s.date <= horizon)
            .cloned()
            .collect())
    }

    async fn insert_surgery(&self, entry: SurgeryEntry) -> Result<()> {
        self.surgeries.write().await.push(entry);
        Ok(())
    }

    async fn upsert_signal(&self, signal: ShortageSignal) -> Result<SignalUpsert> {
        let mut signals = self.signals.write().await;

        let existing_id = signals
            .values()
            .find(|s| !s.resolved && s.dedup_key() == signal.dedup_key())
            .map(|s| s.id);

        let Some(id) = existing_id else {
            let id = signal.id;
            signals.insert(id, signal);
            return Ok(SignalUpsert::Inserted(id));
        };

        let row = signals
            .get_mut(&id)
            .ok_or_else(|| SentinelError::store("signal row vanished during upsert"))?;
        let materially_changed =
            signal.confidence > row.confidence || signal.description != row.description;
        if materially_changed {
            row.confidence = row.confidence.max(signal.confidence);
            row.description = signal.description;
            if signal.source_url.is_some() {
                row.source_url = signal.source_url;
            }
            Ok(SignalUpsert::Merged(id))
        } else {
            Ok(SignalUpsert::Unchanged(id))
        }
    }

    async fn unresolved_signals(&self) -> Result<Vec<ShortageSignal>> {
        Ok(self
            .signals
            .read()
            .await
            .values()
            .filter(|s| !s.resolved)
            .cloned()
            .collect())
    }

    async fn resolve_signal(&self, id: SignalId) -> Result<()> {
        let mut signals = self.signals.write().await;
        let signal = signals
            .get_mut(&id)
            .ok_or_else(|| SentinelError::data_integrity(format!("unknown signal {}", id)))?;
        signal.resolved = true;
        Ok(())
    }

    async fn insert_log(&self, entry: AgentLogEntry) -> Result<()> {
        self.logs.write().await.push(entry);
        Ok(())
    }

    async fn logs_for_run(&self, run_id: RunId) -> Result<Vec<AgentLogEntry>> {
        Ok(self
            .logs
            .read()
            .await
            .iter()
            .filter(|l| l.run_id == run_id)
            .cloned()
            .collect())
    }

    async fn insert_alert(&self, alert: Alert) -> Result<AlertId> {
        let id = alert.id;
        self.alerts.write().await.insert(id, alert);
        Ok(id)
    }

    async fn open_alerts(&self) -> Result<Vec<Alert>> {
        Ok(self
            .alerts
            .read()
            .await
            .values()
            .filter(|a| !a.acknowledged)
            .cloned()
            .collect())
    }

    async fn escalate_alert(&self, id: AlertId, severity: Severity) -> Result<()> {
        let mut alerts = self.alerts.write().await;
        let alert = alerts
            .get_mut(&id)
            .ok_or_else(|| SentinelError::data_integrity(format!("unknown alert {}", id)))?;
        if alert.acknowledged {
            return Err(SentinelError::conflict("cannot escalate acknowledged alert"));
        }
        if severity > alert.severity {
            alert.severity = severity;
        }
        Ok(())
    }

    async fn acknowledge_alert(&self, id: AlertId) -> Result<()> {
        let mut alerts = self.alerts.write().await;
        let alert = alerts
            .get_mut(&id)
            .ok_or_else(|| SentinelError::data_integrity(format!("unknown alert {}", id)))?;
        alert.acknowledged = true;
        Ok(())
    }

    async fn upsert_substitute(&self, substitute: Substitute) -> Result<()> {
        let key = (substitute.drug_id, substitute.substitute_name.clone());
        self.substitutes.write().await.insert(key, substitute);
        Ok(())
    }

    async fn substitutes_for(&self, drug_id: DrugId) -> Result<Vec<Substitute>> {
        let mut rows: Vec<Substitute> = self
            .substitutes
            .read()
            .await
            .values()
            .filter(|s| s.drug_id == drug_id)
            .cloned()
            .collect();
        rows.sort_by_key(|s| s.rank);
        Ok(rows)
    }

    async fn deactivate_substitute(&self, drug_id: DrugId, substitute_name: &str) -> Result<()> {
        let mut substitutes = self.substitutes.write().await;
        if let Some(row) = substitutes.get_mut(&(drug_id, substitute_name.to_string())) {
            row.active = false;
            row.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn active_suppliers(&self) -> Result<Vec<Supplier>> {
        Ok(self
            .suppliers
            .read()
            .await
            .iter()
            .filter(|s| s.active)
            .cloned()
            .collect())
    }

    async fn insert_supplier(&self, supplier: Supplier) -> Result<()> {
        self.suppliers.write().await.push(supplier);
        Ok(())
    }

    async fn insert_order(&self, order: Order) -> Result<OrderId> {
        let id = order.id;
        self.orders.write().await.insert(id, order);
        Ok(id)
    }

    async fn get_order(&self, id: OrderId) -> Result<Option<Order>> {
        Ok(self.orders.read().await.get(&id).cloned())
    }

    async fn update_order_if(
        &self,
        id: OrderId,
        expected: OrderStatus,
        update: OrderUpdate,
    ) -> Result<Order> {
        let mut orders = self.orders.write().await;
        let order = orders
            .get_mut(&id)
            .ok_or_else(|| SentinelError::data_integrity(format!("unknown order {}", id)))?;

        if order.status != expected {
            return Err(SentinelError::conflict(format!(
                "order {} is {}, expected {}",
                id, order.status, expected
            )));
        }
        if let Some(next) = update.status {
            if !order.status.can_transition_to(next) {
                return Err(SentinelError::conflict(format!(
                    "transition {} -> {} is not allowed",
                    order.status, next
                )));
            }
            order.status = next;
        }
        if let Some(supplier_id) = update.supplier_id {
            order.supplier_id = Some(supplier_id);
        }
        if let Some(unit_price) = update.unit_price {
            order.unit_price = Some(unit_price);
        }
        if let Some(total_price) = update.total_price {
            order.total_price = Some(total_price);
        }
        if let Some(notes) = update.notes {
            order.notes = notes;
        }
        order.updated_at = Utc::now();
        Ok(order.clone())
    }

    fn name(&self) -> &str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::SourceType;

    #[tokio::test]
    async fn test_signal_dedup_merges_not_duplicates() {
        let store = MemoryStore::new();
        let drug_id = DrugId::new();

        let first = ShortageSignal::new(drug_id, SourceType::Fda, 0.6, "recall reported");
        let result = store.upsert_signal(first).await.unwrap();
        assert!(matches!(result, SignalUpsert::Inserted(_)));

        // Near-simultaneous duplicate detection: same key, higher confidence
        let second = ShortageSignal::new(drug_id, SourceType::Fda, 0.9, "recall confirmed");
        let result = store.upsert_signal(second).await.unwrap();
        assert!(matches!(result, SignalUpsert::Merged(_)));

        let signals = store.unresolved_signals().await.unwrap();
        assert_eq!(signals.len(), 1);
        assert_eq!(signals[0].confidence, 0.9);
        assert_eq!(signals[0].description, "recall confirmed");
    }

    #[tokio::test]
    async fn test_signal_upsert_unchanged_when_not_material() {
        let store = MemoryStore::new();
        let drug_id = DrugId::new();

        store
            .upsert_signal(ShortageSignal::new(drug_id, SourceType::News, 0.8, "plant down"))
            .await
            .unwrap();
        let result = store
            .upsert_signal(ShortageSignal::new(drug_id, SourceType::News, 0.5, "plant down"))
            .await
            .unwrap();
        assert!(matches!(result, SignalUpsert::Unchanged(_)));

        // Confidence never decreases on merge
        let signals = store.unresolved_signals().await.unwrap();
        assert_eq!(signals[0].confidence, 0.8);
    }

    #[tokio::test]
    async fn test_resolved_signal_frees_dedup_key() {
        let store = MemoryStore::new();
        let drug_id = DrugId::new();

        let result = store
            .upsert_signal(ShortageSignal::new(drug_id, SourceType::Fda, 0.7, "first"))
            .await
            .unwrap();
        store.resolve_signal(result.signal_id()).await.unwrap();

        let result = store
            .upsert_signal(ShortageSignal::new(drug_id, SourceType::Fda, 0.7, "second"))
            .await
            .unwrap();
        assert!(matches!(result, SignalUpsert::Inserted(_)));
    }

    #[tokio::test]
    async fn test_stale_burn_rate_write_skipped() {
        let store = MemoryStore::new();
        let drug = Drug::new("Heparin", "Anticoagulant", 5).with_usage_rate(4.0);
        let id = drug.id;
        store.insert_drug(drug).await.unwrap();

        let fresh = Utc::now();
        assert!(store.update_burn_rate(id, 6.0, fresh).await.unwrap());

        // A retry carrying a timestamp older than the row's update loses
        let stale = fresh - ChronoDuration::minutes(10);
        assert!(!store.update_burn_rate(id, 2.0, stale).await.unwrap());

        let drug = store.get_drug(id).await.unwrap().unwrap();
        assert_eq!(drug.predicted_burn_rate, 6.0);
    }

    #[tokio::test]
    async fn test_order_cas_rejects_wrong_expected_status() {
        let store = MemoryStore::new();
        let order = Order::new(DrugId::new(), 50.0);
        let id = store.insert_order(order).await.unwrap();

        store
            .update_order_if(id, OrderStatus::Pending, OrderUpdate::status(OrderStatus::Analyzing))
            .await
            .unwrap();

        let err = store
            .update_order_if(id, OrderStatus::Pending, OrderUpdate::status(OrderStatus::Analyzing))
            .await
            .unwrap_err();
        assert!(matches!(err, SentinelError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_order_cas_rejects_graph_violation() {
        let store = MemoryStore::new();
        let order = Order::new(DrugId::new(), 10.0);
        let id = store.insert_order(order).await.unwrap();

        let err = store
            .update_order_if(id, OrderStatus::Pending, OrderUpdate::status(OrderStatus::Placed))
            .await
            .unwrap_err();
        assert!(matches!(err, SentinelError::Conflict(_)));

        let order = store.get_order(id).await.unwrap().unwrap();
        assert_eq!(order.status, OrderStatus::Pending);
    }

    #[tokio::test]
    async fn test_escalate_acknowledged_alert_rejected() {
        let store = MemoryStore::new();
        let alert = Alert::new(
            RunId::new(),
            Severity::Warning,
            crate::types::AlertType::Watch,
            None,
            "watch",
        );
        let id = store.insert_alert(alert).await.unwrap();
        store.acknowledge_alert(id).await.unwrap();

        let err = store.escalate_alert(id, Severity::Critical).await.unwrap_err();
        assert!(matches!(err, SentinelError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_substitute_upsert_refreshes_not_duplicates() {
        let store = MemoryStore::new();
        let drug_id = DrugId::new();
        let make = |rank| Substitute {
            drug_id,
            substitute_name: "Etomidate".to_string(),
            rank,
            conversion_note: "Shorter duration".to_string(),
            contraindications: String::new(),
            in_stock: true,
            active: true,
            updated_at: Utc::now(),
        };

        store.upsert_substitute(make(2)).await.unwrap();
        store.upsert_substitute(make(1)).await.unwrap();

        let rows = store.substitutes_for(drug_id).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].rank, 1);
    }
}
