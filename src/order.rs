//! Purchase orders and their status lifecycle
//!
//! ## Table of Contents
//! - **OrderStatus**: Explicit transition graph
//! - **OrderUrgency**: Procurement urgency tier
//! - **Order**: Long-lived purchase-order entity
//!
//! An order only advances forward through the graph below; it never skips
//! a required transition and never reverses except via the explicit
//! CANCELLED/FAILED branches:
//!
//! ```text
//! PENDING -> ANALYZING -> SUGGESTED -> PLACED
//!               |             |
//!               +-> FAILED <--+
//! any pre-PLACED non-terminal -> CANCELLED
//! ```

use crate::types::{AlertId, DrugId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Unique identifier for a purchase order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OrderId(Uuid);

impl OrderId {
    /// Create a new random OrderId
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Create an OrderId from a UUID
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Get the inner UUID
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for OrderId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for OrderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "order-{}", &self.0.to_string()[..8])
    }
}

/// Order status state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    /// Created, waiting for analysis
    Pending,
    /// Order Agent is selecting a supplier
    Analyzing,
    /// Supplier and pricing written; awaiting operator confirmation
    Suggested,
    /// Operator confirmed the suggestion (terminal)
    Placed,
    /// Unrecoverable analysis error (terminal)
    Failed,
    /// Operator cancelled before placement (terminal)
    Cancelled,
}

impl OrderStatus {
    /// Whether this state admits no further transitions
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Placed | Self::Failed | Self::Cancelled)
    }

    /// Whether `self -> next` is an edge of the transition graph
    pub fn can_transition_to(&self, next: OrderStatus) -> bool {
        use OrderStatus::*;
        matches!(
            (self, next),
            (Pending, Analyzing)
                | (Analyzing, Suggested)
                | (Analyzing, Failed)
                | (Suggested, Placed)
                | (Suggested, Failed)
                | (Pending, Cancelled)
                | (Analyzing, Cancelled)
                | (Suggested, Cancelled)
        )
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Pending => "PENDING",
            Self::Analyzing => "ANALYZING",
            Self::Suggested => "SUGGESTED",
            Self::Placed => "PLACED",
            Self::Failed => "FAILED",
            Self::Cancelled => "CANCELLED",
        };
        write!(f, "{}", s)
    }
}

/// Procurement urgency tier; feeds the supplier scoring weights
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderUrgency {
    /// Needed within 24 hours; nearby hospitals preferred, cost ignored
    Emergency,
    /// Needed within 3 days; balance speed and cost
    Expedited,
    /// Standard restock; optimize price among reliable suppliers
    Routine,
}

impl Default for OrderUrgency {
    fn default() -> Self {
        Self::Routine
    }
}

impl fmt::Display for OrderUrgency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Emergency => "EMERGENCY",
            Self::Expedited => "EXPEDITED",
            Self::Routine => "ROUTINE",
        };
        write!(f, "{}", s)
    }
}

/// A purchase order advancing through the status lifecycle.
///
/// Mutated exclusively through guarded status transitions; never deleted
/// (cancellation is a terminal status, not removal).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    /// Unique order identifier
    pub id: OrderId,
    /// Drug being ordered
    pub drug_id: DrugId,
    /// Alert that prompted the order, if any (provenance)
    pub alert_id: Option<AlertId>,
    /// Units requested
    pub quantity: f64,
    /// Procurement urgency
    pub urgency: OrderUrgency,
    /// Current lifecycle status
    pub status: OrderStatus,
    /// Selected supplier; set on ANALYZING -> SUGGESTED
    pub supplier_id: Option<Uuid>,
    /// Unit price from the selected supplier
    pub unit_price: Option<f64>,
    /// Total price for the requested quantity
    pub total_price: Option<f64>,
    /// Analysis notes or failure reason
    pub notes: String,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
    /// Last status-change timestamp
    pub updated_at: DateTime<Utc>,
}

impl Order {
    /// Create a new PENDING order
    pub fn new(drug_id: DrugId, quantity: f64) -> Self {
        let now = Utc::now();
        Self {
            id: OrderId::new(),
            drug_id,
            alert_id: None,
            quantity,
            urgency: OrderUrgency::default(),
            status: OrderStatus::Pending,
            supplier_id: None,
            unit_price: None,
            total_price: None,
            notes: String::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Record the alert that prompted this order
    pub fn from_alert(mut self, alert_id: AlertId) -> Self {
        self.alert_id = Some(alert_id);
        self
    }

    /// Set the urgency tier
    pub fn with_urgency(mut self, urgency: OrderUrgency) -> Self {
        self.urgency = urgency;
        self
    }
}

/// Field updates applied atomically with a status transition.
///
/// Used by `EvidenceStore::update_order_if` so supplier selection and the
/// SUGGESTED transition land in one compare-and-set.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OrderUpdate {
    /// New status (the transition target)
    pub status: Option<OrderStatus>,
    /// Selected supplier
    pub supplier_id: Option<Uuid>,
    /// Unit price
    pub unit_price: Option<f64>,
    /// Total price
    pub total_price: Option<f64>,
    /// Replacement notes
    pub notes: Option<String>,
}

impl OrderUpdate {
    /// Update that only moves the status
    pub fn status(status: OrderStatus) -> Self {
        Self {
            status: Some(status),
            ..Default::default()
        }
    }

    /// Attach replacement notes
    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = Some(notes.into());
        self
    }

    /// Attach the supplier selection and pricing
    pub fn with_selection(mut self, supplier_id: Uuid, unit_price: f64, total_price: f64) -> Self {
        self.supplier_id = Some(supplier_id);
        self.unit_price = Some(unit_price);
        self.total_price = Some(total_price);
        self
    }
}
