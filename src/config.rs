//! Configuration for the PharmaSentinel pipeline
//!
//! ## Table of Contents
//! - **RiskWeights / SeverityThresholds**: The deterministic scoring knobs
//! - **SentinelConfig**: Complete pipeline configuration
//!
//! Every constant the synthesizer and agents rely on lives here so that
//! the decision framework stays reproducible and per-deployment tunable.

use std::net::SocketAddr;
use std::time::Duration;

/// Weights of the composite risk score. Must sum to 1.0 for the severity
/// thresholds to keep their meaning.
#[derive(Debug, Clone, Copy)]
pub struct RiskWeights {
    /// Weight of the criticality rank factor
    pub criticality: f64,
    /// Weight of the days-to-depletion factor
    pub depletion: f64,
    /// Weight of the signal-corroboration factor
    pub corroboration: f64,
}

impl Default for RiskWeights {
    fn default() -> Self {
        Self {
            criticality: 0.30,
            depletion: 0.45,
            corroboration: 0.25,
        }
    }
}

/// Fixed cut points mapping a composite risk score to a severity
#[derive(Debug, Clone, Copy)]
pub struct SeverityThresholds {
    /// Scores at or above this are CRITICAL
    pub critical: f64,
    /// Scores at or above this are URGENT
    pub urgent: f64,
    /// Scores at or above this are WARNING; below is INFO
    pub warning: f64,
}

impl Default for SeverityThresholds {
    fn default() -> Self {
        Self {
            critical: 0.75,
            urgent: 0.55,
            warning: 0.35,
        }
    }
}

/// Supplier scoring weights for one urgency tier
#[derive(Debug, Clone, Copy)]
pub struct SupplierWeights {
    /// Weight of (inverse, normalized) price
    pub price: f64,
    /// Weight of (inverse, normalized) lead time
    pub lead_time: f64,
    /// Weight of the reliability score
    pub reliability: f64,
    /// Additive bonus for nearby hospitals
    pub nearby_bonus: f64,
}

/// Complete PharmaSentinel configuration
#[derive(Debug, Clone)]
pub struct SentinelConfig {
    /// Interval between scheduled pipeline runs
    pub run_interval: Duration,
    /// Per-agent timeout within one run
    pub agent_timeout: Duration,
    /// How far ahead the Inventory Agent reads the surgery schedule
    pub surgery_lookahead_days: u32,
    /// Horizon used to normalize days-to-depletion into a 0..1 factor
    pub depletion_horizon_days: f64,
    /// EWMA smoothing factor for burn-rate history
    pub ewma_alpha: f64,
    /// Minimum usage-history samples before EWMA is preferred
    pub ewma_min_samples: usize,
    /// Minimum confidence for a news signal to be recorded
    pub news_confidence_threshold: f64,
    /// Risk-score weights
    pub risk_weights: RiskWeights,
    /// Severity cut points
    pub severity_thresholds: SeverityThresholds,
    /// Stock units a substitute must exceed to count as available
    pub substitute_safety_margin: f64,
    /// TTL of the per-order in-flight lease
    pub order_lease_ttl: Duration,
    /// Bind address of the trigger surface
    pub http_addr: SocketAddr,
}

impl Default for SentinelConfig {
    fn default() -> Self {
        Self {
            run_interval: Duration::from_secs(60 * 60),
            agent_timeout: Duration::from_secs(90),
            surgery_lookahead_days: 14,
            depletion_horizon_days: 30.0,
            ewma_alpha: 0.3,
            ewma_min_samples: 3,
            news_confidence_threshold: 0.6,
            risk_weights: RiskWeights::default(),
            severity_thresholds: SeverityThresholds::default(),
            substitute_safety_margin: 5.0,
            order_lease_ttl: Duration::from_secs(10 * 60),
            http_addr: ([127, 0, 0, 1], 8080).into(),
        }
    }
}

impl SentinelConfig {
    /// Create a config with defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the scheduled-run interval
    pub fn run_interval(mut self, interval: Duration) -> Self {
        self.run_interval = interval;
        self
    }

    /// Set the per-agent timeout
    pub fn agent_timeout(mut self, timeout: Duration) -> Self {
        self.agent_timeout = timeout;
        self
    }

    /// Set the surgery-schedule lookahead window
    pub fn surgery_lookahead_days(mut self, days: u32) -> Self {
        self.surgery_lookahead_days = days;
        self
    }

    /// Set the news confidence threshold (clamped to 0..1)
    pub fn news_confidence_threshold(mut self, threshold: f64) -> Self {
        self.news_confidence_threshold = threshold.clamp(0.0, 1.0);
        self
    }

    /// Set the risk-score weights
    pub fn risk_weights(mut self, weights: RiskWeights) -> Self {
        self.risk_weights = weights;
        self
    }

    /// Set the severity cut points
    pub fn severity_thresholds(mut self, thresholds: SeverityThresholds) -> Self {
        self.severity_thresholds = thresholds;
        self
    }

    /// Set the trigger-surface bind address
    pub fn http_addr(mut self, addr: SocketAddr) -> Self {
        self.http_addr = addr;
        self
    }

    /// Supplier scoring weights for an urgency tier.
    ///
    /// EMERGENCY ignores price and rewards proximity; ROUTINE optimizes
    /// price among reliable suppliers; EXPEDITED balances the two.
    pub fn supplier_weights(&self, urgency: crate::order::OrderUrgency) -> SupplierWeights {
        use crate::order::OrderUrgency::*;
        match urgency {
            Emergency => SupplierWeights {
                price: 0.0,
                lead_time: 0.6,
                reliability: 0.4,
                nearby_bonus: 0.3,
            },
            Expedited => SupplierWeights {
                price: 0.25,
                lead_time: 0.45,
                reliability: 0.3,
                nearby_bonus: 0.1,
            },
            Routine => SupplierWeights {
                price: 0.5,
                lead_time: 0.2,
                reliability: 0.3,
                nearby_bonus: 0.0,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::order::OrderUrgency;

    #[test]
    fn test_default_weights_sum_to_one() {
        let w = RiskWeights::default();
        assert!((w.criticality + w.depletion + w.corroboration - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_thresholds_strictly_ordered() {
        let t = SeverityThresholds::default();
        assert!(t.critical > t.urgent);
        assert!(t.urgent > t.warning);
    }

    #[test]
    fn test_emergency_ignores_price() {
        let config = SentinelConfig::default();
        let w = config.supplier_weights(OrderUrgency::Emergency);
        assert_eq!(w.price, 0.0);
        assert!(w.nearby_bonus > 0.0);
    }

    #[test]
    fn test_builder_clamps_threshold() {
        let config = SentinelConfig::new().news_confidence_threshold(1.7);
        assert_eq!(config.news_confidence_threshold, 1.0);
    }
}
