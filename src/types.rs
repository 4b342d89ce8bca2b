//! Core domain types for PharmaSentinel
//!
//! ## Table of Contents
//! - **RunId / DrugId / AlertId / SignalId**: Unique identifiers
//! - **SourceType / Severity / AlertType / AgentStatus**: Domain enums
//! - **Drug / SurgeryEntry / ShortageSignal**: Monitored inventory state
//! - **AgentLogEntry / Alert / Evidence**: Audit trail and synthesized output
//! - **Substitute / Supplier**: Second-order agent records

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Unique identifier for one pipeline run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RunId(Uuid);

impl RunId {
    /// Allocate a fresh run identifier
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Create a RunId from a UUID
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Get the inner UUID
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "run-{}", &self.0.to_string()[..8])
    }
}

/// Unique identifier for a monitored drug
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct DrugId(Uuid);

impl DrugId {
    /// Create a new random DrugId
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Create a DrugId from a UUID
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Get the inner UUID
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for DrugId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for DrugId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "drug-{}", &self.0.to_string()[..8])
    }
}

/// Unique identifier for a synthesized alert
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AlertId(Uuid);

impl AlertId {
    /// Create a new random AlertId
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Create an AlertId from a UUID
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Get the inner UUID
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for AlertId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for AlertId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "alert-{}", &self.0.to_string()[..8])
    }
}

/// Unique identifier for a shortage signal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SignalId(Uuid);

impl SignalId {
    /// Create a new random SignalId
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Get the inner UUID
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for SignalId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SignalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "signal-{}", &self.0.to_string()[..8])
    }
}

/// Origin of a shortage signal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SourceType {
    /// Burn-rate projection from local inventory
    Inventory,
    /// Regulatory shortage feed
    Fda,
    /// News/sentiment scraping
    News,
    /// Scheduled-procedure demand
    SurgerySchedule,
}

impl fmt::Display for SourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Inventory => "INVENTORY",
            Self::Fda => "FDA",
            Self::News => "NEWS",
            Self::SurgerySchedule => "SURGERY_SCHEDULE",
        };
        write!(f, "{}", s)
    }
}

/// Alert severity, totally ordered with `Critical` highest
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Severity {
    /// Informational, no action expected
    Info,
    /// Corroborated risk worth watching
    Warning,
    /// Action needed soon
    Urgent,
    /// Immediate action required
    Critical,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Info => "INFO",
            Self::Warning => "WARNING",
            Self::Urgent => "URGENT",
            Self::Critical => "CRITICAL",
        };
        write!(f, "{}", s)
    }
}

/// Category of synthesized alert
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AlertType {
    /// Days-to-depletion is inside the reorder lead time
    RestockNow,
    /// Depletion is imminent or stock already zero
    SubstituteNeeded,
    /// Corroborated but non-urgent risk
    Watch,
    /// Order Agent produced a supplier recommendation
    OrderSuggested,
}

impl fmt::Display for AlertType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::RestockNow => "RESTOCK_NOW",
            Self::SubstituteNeeded => "SUBSTITUTE_NEEDED",
            Self::Watch => "WATCH",
            Self::OrderSuggested => "ORDER_SUGGESTED",
        };
        write!(f, "{}", s)
    }
}

/// Terminal state of one agent execution within a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AgentStatus {
    /// Agent completed and produced findings
    Succeeded,
    /// Agent hit an error; the log entry carries the reason
    Failed,
    /// Agent exceeded its per-run timeout
    TimedOut,
}

/// A monitored drug and its live inventory state
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Drug {
    /// Unique drug identifier
    pub id: DrugId,
    /// Canonical drug name
    pub name: String,
    /// Clinical category (e.g. "Vasopressor", "Anesthetic")
    pub category: String,
    /// Fixed criticality rank, 1 (most critical) to 10
    pub criticality: u8,
    /// Current stock in units
    pub stock_level: f64,
    /// Observed baseline consumption, units/day
    pub daily_usage_rate: f64,
    /// Recent daily consumption samples, newest last (may be empty)
    pub usage_history: Vec<f64>,
    /// Projected consumption, units/day; written only by the Inventory Agent
    pub predicted_burn_rate: f64,
    /// Days-of-supply reorder point (also the assumed reorder lead time)
    pub reorder_threshold_days: f64,
    /// Last modification timestamp
    pub updated_at: DateTime<Utc>,
}

impl Drug {
    /// Create a new drug record with empty history
    pub fn new(name: impl Into<String>, category: impl Into<String>, criticality: u8) -> Self {
        Self {
            id: DrugId::new(),
            name: name.into(),
            category: category.into(),
            criticality: criticality.clamp(1, 10),
            stock_level: 0.0,
            daily_usage_rate: 0.0,
            usage_history: Vec::new(),
            predicted_burn_rate: 0.0,
            reorder_threshold_days: 3.0,
            updated_at: Utc::now(),
        }
    }

    /// Set current stock
    pub fn with_stock(mut self, stock: f64) -> Self {
        self.stock_level = stock;
        self
    }

    /// Set baseline daily usage
    pub fn with_usage_rate(mut self, rate: f64) -> Self {
        self.daily_usage_rate = rate;
        self.predicted_burn_rate = rate;
        self
    }

    /// Set the reorder threshold in days of supply
    pub fn with_reorder_threshold(mut self, days: f64) -> Self {
        self.reorder_threshold_days = days;
        self
    }

    /// Append usage history samples
    pub fn with_history(mut self, samples: Vec<f64>) -> Self {
        self.usage_history = samples;
        self
    }

    /// Days until projected depletion at the given burn rate.
    ///
    /// Returns `None` when the burn rate is non-positive (no depletion).
    pub fn days_to_depletion(&self, burn_rate: f64) -> Option<f64> {
        if burn_rate > 0.0 {
            Some(self.stock_level / burn_rate)
        } else {
            None
        }
    }
}

/// One drug requirement of a scheduled procedure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DrugRequirement {
    /// Drug name as scheduled
    pub drug_name: String,
    /// Units the procedure will consume
    pub quantity: f64,
}

/// A planned procedure consuming drugs on a known date
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SurgeryEntry {
    /// Unique entry identifier
    pub id: Uuid,
    /// Procedure name
    pub procedure: String,
    /// Scheduled date
    pub date: NaiveDate,
    /// Drugs this procedure will consume
    pub drugs_required: Vec<DrugRequirement>,
}

impl SurgeryEntry {
    /// Create a new schedule entry
    pub fn new(procedure: impl Into<String>, date: NaiveDate) -> Self {
        Self {
            id: Uuid::new_v4(),
            procedure: procedure.into(),
            date,
            drugs_required: Vec::new(),
        }
    }

    /// Add a drug requirement
    pub fn requires(mut self, drug_name: impl Into<String>, quantity: f64) -> Self {
        self.drugs_required.push(DrugRequirement {
            drug_name: drug_name.into(),
            quantity,
        });
        self
    }
}

/// One observed or predicted shortage/risk event for a drug.
///
/// Deduplicated by `(drug_id, source_type, window)` among unresolved rows:
/// a near-simultaneous duplicate detection merges into the existing row
/// instead of inserting a new one.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShortageSignal {
    /// Unique signal identifier
    pub id: SignalId,
    /// Drug this signal concerns
    pub drug_id: DrugId,
    /// Signal origin
    pub source_type: SourceType,
    /// Confidence in the signal, 0.0 to 1.0
    pub confidence: f64,
    /// Free-text description of the observation
    pub description: String,
    /// Link to the originating source, if any
    pub source_url: Option<String>,
    /// Whether the condition has been resolved
    pub resolved: bool,
    /// Day bucket (UTC) of first detection; part of the dedup key
    pub window: NaiveDate,
    /// Detection timestamp
    pub detected_at: DateTime<Utc>,
}

impl ShortageSignal {
    /// Create a new unresolved signal detected now
    pub fn new(
        drug_id: DrugId,
        source_type: SourceType,
        confidence: f64,
        description: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: SignalId::new(),
            drug_id,
            source_type,
            confidence: confidence.clamp(0.0, 1.0),
            description: description.into(),
            source_url: None,
            resolved: false,
            window: now.date_naive(),
            detected_at: now,
        }
    }

    /// Attach a source URL
    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.source_url = Some(url.into());
        self
    }

    /// The natural dedup key for unresolved signals
    pub fn dedup_key(&self) -> (DrugId, SourceType, NaiveDate) {
        (self.drug_id, self.source_type, self.window)
    }
}

/// Append-only record of one agent's execution for one run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentLogEntry {
    /// Run this entry belongs to
    pub run_id: RunId,
    /// Agent that produced it ("inventory", "regulatory", "news", ...)
    pub agent_name: String,
    /// When the entry was written
    pub timestamp: DateTime<Utc>,
    /// Terminal status of the execution
    pub status: AgentStatus,
    /// Structured findings; failure entries carry an error reason instead
    pub findings: serde_json::Value,
    /// Human-readable summary
    pub summary: String,
}

impl AgentLogEntry {
    /// Build a success entry
    pub fn succeeded(
        run_id: RunId,
        agent_name: impl Into<String>,
        findings: serde_json::Value,
        summary: impl Into<String>,
    ) -> Self {
        Self {
            run_id,
            agent_name: agent_name.into(),
            timestamp: Utc::now(),
            status: AgentStatus::Succeeded,
            findings,
            summary: summary.into(),
        }
    }

    /// Build a failure entry carrying the error reason, not findings
    pub fn failed(run_id: RunId, agent_name: impl Into<String>, reason: impl Into<String>) -> Self {
        let reason = reason.into();
        Self {
            run_id,
            agent_name: agent_name.into(),
            timestamp: Utc::now(),
            status: AgentStatus::Failed,
            findings: serde_json::json!({ "error": reason }),
            summary: reason,
        }
    }

    /// Build a timeout entry
    pub fn timed_out(run_id: RunId, agent_name: impl Into<String>) -> Self {
        let agent_name = agent_name.into();
        Self {
            run_id,
            agent_name: agent_name.clone(),
            timestamp: Utc::now(),
            status: AgentStatus::TimedOut,
            findings: serde_json::json!({ "error": "agent timed out" }),
            summary: format!("{} agent exceeded its timeout", agent_name),
        }
    }
}

/// A value-copied evidence snapshot attached to an alert.
///
/// Snapshots are copied from the triggering signals/log entries at
/// synthesis time and stay valid even if the source row later changes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Evidence {
    /// Source that contributed this evidence
    pub source_type: SourceType,
    /// The numeric value backing the evidence (e.g. confidence, days left)
    pub data_value: f64,
    /// Description copied from the source
    pub description: String,
    /// Source link copied from the source, if any
    pub source_url: Option<String>,
}

/// Synthesized, evidence-backed alert.
///
/// Created only by the synthesizer; acknowledged by an operator; never
/// deleted. Severity may be escalated in place while unacknowledged.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Alert {
    /// Unique alert identifier
    pub id: AlertId,
    /// Run that synthesized it
    pub run_id: RunId,
    /// Alert severity
    pub severity: Severity,
    /// Alert category
    pub alert_type: AlertType,
    /// Drug this alert concerns, if drug-specific
    pub drug_id: Option<DrugId>,
    /// Short title
    pub title: String,
    /// Narrative description
    pub description: String,
    /// Value-copied evidence snapshots
    pub evidence: Vec<Evidence>,
    /// Whether an operator has acknowledged the alert
    pub acknowledged: bool,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
}

impl Alert {
    /// Create a new unacknowledged alert
    pub fn new(
        run_id: RunId,
        severity: Severity,
        alert_type: AlertType,
        drug_id: Option<DrugId>,
        title: impl Into<String>,
    ) -> Self {
        Self {
            id: AlertId::new(),
            run_id,
            severity,
            alert_type,
            drug_id,
            title: title.into(),
            description: String::new(),
            evidence: Vec::new(),
            acknowledged: false,
            created_at: Utc::now(),
        }
    }

    /// Set the narrative description
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Attach evidence snapshots
    pub fn with_evidence(mut self, evidence: Vec<Evidence>) -> Self {
        self.evidence = evidence;
        self
    }
}

/// Candidate replacement for a drug, keyed by `(drug_id, substitute_name)`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Substitute {
    /// Drug being replaced
    pub drug_id: DrugId,
    /// Name of the candidate substitute
    pub substitute_name: String,
    /// Clinical preference rank, 1 is best
    pub rank: u32,
    /// Dosing/equivalence conversion note
    pub conversion_note: String,
    /// Known contraindications
    pub contraindications: String,
    /// Whether the substitute is currently in local stock
    pub in_stock: bool,
    /// False once the suggestion is no longer valid
    pub active: bool,
    /// Last refresh timestamp
    pub updated_at: DateTime<Utc>,
}

/// A supplier the Order Agent can recommend.
///
/// Managed externally; the core only reads these rows.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Supplier {
    /// Unique supplier identifier
    pub id: Uuid,
    /// Supplier name
    pub name: String,
    /// Drug the supplier carries; `None` means a general distributor
    pub drug_name: Option<String>,
    /// Unit price offered
    pub price_per_unit: f64,
    /// Delivery lead time in days
    pub lead_time_days: u32,
    /// Historical reliability, 0.0 to 1.0
    pub reliability_score: f64,
    /// Whether this is a nearby hospital (preferred for emergencies)
    pub is_nearby_hospital: bool,
    /// Whether the supplier is currently usable
    pub active: bool,
}

impl Supplier {
    /// Create a new active supplier
    pub fn new(name: impl Into<String>, price_per_unit: f64, lead_time_days: u32) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            drug_name: None,
            price_per_unit,
            lead_time_days,
            reliability_score: 0.9,
            is_nearby_hospital: false,
            active: true,
        }
    }

    /// Restrict the supplier to a single drug
    pub fn for_drug(mut self, drug_name: impl Into<String>) -> Self {
        self.drug_name = Some(drug_name.into());
        self
    }

    /// Set the reliability score
    pub fn with_reliability(mut self, score: f64) -> Self {
        self.reliability_score = score.clamp(0.0, 1.0);
        self
    }

    /// Mark as a nearby hospital
    pub fn nearby_hospital(mut self) -> Self {
        self.is_nearby_hospital = true;
        self
    }

    /// Whether this supplier can serve the named drug
    pub fn carries(&self, drug_name: &str) -> bool {
        match &self.drug_name {
            Some(name) => name == drug_name,
            None => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_severity_total_order() {
        assert!(Severity::Critical > Severity::Urgent);
        assert!(Severity::Urgent > Severity::Warning);
        assert!(Severity::Warning > Severity::Info);
    }

    #[test]
    fn test_run_id_display() {
        let id = RunId::new();
        assert!(format!("{}", id).starts_with("run-"));
    }

    #[test]
    fn test_days_to_depletion() {
        let drug = Drug::new("Epinephrine", "Vasopressor", 1).with_stock(5.0);
        assert_eq!(drug.days_to_depletion(2.0), Some(2.5));
        assert_eq!(drug.days_to_depletion(0.0), None);
    }

    #[test]
    fn test_signal_dedup_key_ignores_confidence() {
        let drug_id = DrugId::new();
        let a = ShortageSignal::new(drug_id, SourceType::Fda, 0.5, "first");
        let b = ShortageSignal::new(drug_id, SourceType::Fda, 0.9, "second");
        assert_eq!(a.dedup_key(), b.dedup_key());

        let c = ShortageSignal::new(drug_id, SourceType::News, 0.5, "other source");
        assert_ne!(a.dedup_key(), c.dedup_key());
    }

    #[test]
    fn test_supplier_carries() {
        let general = Supplier::new("McKesson Corporation", 20.0, 1);
        let specific = Supplier::new("Baxter International", 12.0, 3).for_drug("Propofol");

        assert!(general.carries("Propofol"));
        assert!(general.carries("Insulin"));
        assert!(specific.carries("Propofol"));
        assert!(!specific.carries("Insulin"));
    }
}
