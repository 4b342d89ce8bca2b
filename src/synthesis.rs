//! Deterministic signal synthesis into evidence-backed alerts
//!
//! ## Table of Contents
//! - **RiskAssessment**: Composite score and its factors for one drug
//! - **SynthesisReport**: What one synthesis pass produced
//! - **Synthesizer**: The scoring and alerting engine
//!
//! Synthesis is the one stage that is never delegated to a model: given
//! the same signals and inventory it always produces the same alerts.
//! The composite score combines criticality rank, projected depletion,
//! and cross-source corroboration; fixed cut points map it to severity.

use crate::config::SentinelConfig;
use crate::error::Result;
use crate::order::OrderUrgency;
use crate::store::BoxedEvidenceStore;
use crate::types::{
    Alert, AlertType, Drug, DrugId, Evidence, RunId, Severity, ShortageSignal, SourceType,
};
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Composite risk score and the factors behind it
#[derive(Debug, Clone)]
pub struct RiskAssessment {
    /// Composite score, 0.0 to 1.0
    pub score: f64,
    /// Criticality factor (rank 1 scores highest)
    pub criticality_factor: f64,
    /// Depletion factor (closer depletion scores higher)
    pub depletion_factor: f64,
    /// Corroboration factor (confidence scaled by source diversity)
    pub corroboration_factor: f64,
    /// Projected days to depletion, if stock is being consumed
    pub days_to_depletion: Option<f64>,
}

/// What one synthesis pass produced
#[derive(Debug, Default)]
pub struct SynthesisReport {
    /// Alerts created this pass
    pub created: Vec<Alert>,
    /// Open alerts whose severity was escalated in place
    pub escalated: usize,
    /// Signals resolved because the condition cleared
    pub signals_resolved: usize,
    /// Drugs whose alerts call for substitute analysis
    pub needs_substitute: Vec<DrugId>,
    /// Critical restock alerts that warrant an automatic order
    pub auto_orders: Vec<AutoOrder>,
}

/// An automatic order synthesis asked for
#[derive(Debug, Clone)]
pub struct AutoOrder {
    /// Drug to restock
    pub drug_id: DrugId,
    /// Alert that prompted the order
    pub alert_id: crate::types::AlertId,
    /// Urgency derived from the alert severity
    pub urgency: OrderUrgency,
}

/// The deterministic scoring and alerting engine
pub struct Synthesizer {
    config: Arc<SentinelConfig>,
}

impl Synthesizer {
    /// Create a synthesizer with the given configuration
    pub fn new(config: Arc<SentinelConfig>) -> Self {
        Self { config }
    }

    /// Score one drug from its unresolved signals
    pub fn assess(&self, drug: &Drug, signals: &[ShortageSignal]) -> RiskAssessment {
        let weights = self.config.risk_weights;

        let criticality_factor = (11.0 - drug.criticality as f64) / 10.0;

        let days = drug.days_to_depletion(drug.predicted_burn_rate);
        // Already-empty stock is maximal depletion even with no usage
        let depletion_factor = if drug.stock_level <= 0.0 {
            1.0
        } else {
            days.map(|d| (1.0 - d / self.config.depletion_horizon_days).clamp(0.0, 1.0))
                .unwrap_or(0.0)
        };

        // One source is a hint, two are corroboration, three are consensus
        let sources: HashSet<SourceType> = signals.iter().map(|s| s.source_type).collect();
        let diversity = match sources.len() {
            0 | 1 => 0.6,
            2 => 0.85,
            _ => 1.0,
        };
        let avg_confidence = if signals.is_empty() {
            0.0
        } else {
            signals.iter().map(|s| s.confidence).sum::<f64>() / signals.len() as f64
        };
        let corroboration_factor = avg_confidence * diversity;

        let score = weights.criticality * criticality_factor
            + weights.depletion * depletion_factor
            + weights.corroboration * corroboration_factor;

        RiskAssessment {
            score: score.clamp(0.0, 1.0),
            criticality_factor,
            depletion_factor,
            corroboration_factor,
            days_to_depletion: days,
        }
    }

    /// Map a composite score to a severity; below WARNING means no alert
    fn severity_for(&self, score: f64) -> Option<Severity> {
        let t = self.config.severity_thresholds;
        if score >= t.critical {
            Some(Severity::Critical)
        } else if score >= t.urgent {
            Some(Severity::Urgent)
        } else if score >= t.warning {
            Some(Severity::Warning)
        } else {
            None
        }
    }

    /// Alert category from the inventory situation
    fn alert_type_for(drug: &Drug, assessment: &RiskAssessment) -> AlertType {
        let days = assessment.days_to_depletion;
        if drug.stock_level <= 0.0 || days.map(|d| d < 1.0).unwrap_or(false) {
            AlertType::SubstituteNeeded
        } else if days.map(|d| d < drug.reorder_threshold_days).unwrap_or(false) {
            AlertType::RestockNow
        } else {
            AlertType::Watch
        }
    }

    fn title_for(drug: &Drug, alert_type: AlertType, assessment: &RiskAssessment) -> String {
        match alert_type {
            AlertType::SubstituteNeeded => format!("{} effectively depleted", drug.name),
            AlertType::RestockNow => format!(
                "{} projected to deplete in {:.1} days",
                drug.name,
                assessment.days_to_depletion.unwrap_or(0.0)
            ),
            AlertType::Watch => format!("{} shortage risk corroborated", drug.name),
            AlertType::OrderSuggested => format!("Order suggestion for {}", drug.name),
        }
    }

    /// Run one synthesis pass over all unresolved signals.
    ///
    /// Evidence is value-copied from the signals at this moment, so the
    /// alert keeps its audit trail even if the signals later change. At
    /// most one open alert exists per (drug, alert type); a higher-severity
    /// recurrence escalates the existing alert in place.
    pub async fn synthesize(
        &self,
        store: &BoxedEvidenceStore,
        run_id: RunId,
    ) -> Result<SynthesisReport> {
        let signals = store.unresolved_signals().await?;
        let mut by_drug: BTreeMap<DrugId, Vec<ShortageSignal>> = BTreeMap::new();
        for signal in signals {
            by_drug.entry(signal.drug_id).or_default().push(signal);
        }

        // This run's agent reports ride along on every alert it creates,
        // so the alert records what each collector saw (or that it was
        // down) at synthesis time.
        let run_logs = store.logs_for_run(run_id).await?;
        let agent_reports: Vec<String> = run_logs
            .iter()
            .map(|entry| format!("{}: {}", entry.agent_name, entry.summary))
            .collect();

        let open = store.open_alerts().await?;
        let mut report = SynthesisReport::default();

        for (drug_id, signals) in by_drug {
            let Some(drug) = store.get_drug(drug_id).await? else {
                warn!(drug = %drug_id, "Signals reference an unknown drug, skipping");
                continue;
            };

            let assessment = self.assess(&drug, &signals);
            let Some(severity) = self.severity_for(assessment.score) else {
                // Condition cleared: retire signals for drugs that are
                // healthy again so the dedup window can reopen
                let healthy = assessment
                    .days_to_depletion
                    .map(|d| d > drug.reorder_threshold_days)
                    .unwrap_or(true);
                if healthy {
                    for signal in &signals {
                        store.resolve_signal(signal.id).await?;
                        report.signals_resolved += 1;
                    }
                    debug!(drug = %drug.name, "Signals resolved, risk cleared");
                }
                continue;
            };

            let alert_type = Self::alert_type_for(&drug, &assessment);

            if let Some(existing) = open
                .iter()
                .find(|a| a.drug_id == Some(drug_id) && a.alert_type == alert_type)
            {
                if severity > existing.severity {
                    store.escalate_alert(existing.id, severity).await?;
                    report.escalated += 1;
                    info!(
                        drug = %drug.name,
                        alert = %existing.id,
                        severity = %severity,
                        "Escalated open alert"
                    );
                }
                continue;
            }

            let evidence: Vec<Evidence> = signals
                .iter()
                .map(|s| Evidence {
                    source_type: s.source_type,
                    data_value: s.confidence,
                    description: s.description.clone(),
                    source_url: s.source_url.clone(),
                })
                .collect();

            let alert = Alert::new(
                run_id,
                severity,
                alert_type,
                Some(drug_id),
                Self::title_for(&drug, alert_type, &assessment),
            )
            .with_description({
                let mut description = format!(
                    "Composite risk {:.2} (criticality {:.2}, depletion {:.2}, corroboration {:.2}) from {} signal(s)",
                    assessment.score,
                    assessment.criticality_factor,
                    assessment.depletion_factor,
                    assessment.corroboration_factor,
                    signals.len(),
                );
                if !agent_reports.is_empty() {
                    description.push_str(". Agent reports: ");
                    description.push_str(&agent_reports.join("; "));
                }
                description
            })
            .with_evidence(evidence);

            let alert_id = store.insert_alert(alert.clone()).await?;
            info!(
                drug = %drug.name,
                severity = %severity,
                alert_type = %alert_type,
                score = format!("{:.2}", assessment.score),
                "Alert created"
            );

            if alert_type == AlertType::SubstituteNeeded || severity == Severity::Critical {
                report.needs_substitute.push(drug_id);
            }
            if severity == Severity::Critical && alert_type != AlertType::Watch {
                report.auto_orders.push(AutoOrder {
                    drug_id,
                    alert_id,
                    urgency: OrderUrgency::Emergency,
                });
            }
            report.created.push(alert);
        }

        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{EvidenceStore, MemoryStore};

    fn synthesizer() -> Synthesizer {
        Synthesizer::new(Arc::new(SentinelConfig::default()))
    }

    fn boxed(store: Arc<MemoryStore>) -> BoxedEvidenceStore {
        store
    }

    fn shortage_drug() -> Drug {
        // Rank 1, 2.5 days of supply against a 3-day threshold
        let mut drug = Drug::new("Epinephrine", "Vasopressor", 1)
            .with_stock(5.0)
            .with_reorder_threshold(3.0);
        drug.predicted_burn_rate = 2.0;
        drug
    }

    #[test]
    fn test_critical_shortage_scenario_scores_critical() {
        let s = synthesizer();
        let drug = shortage_drug();
        let signal = ShortageSignal::new(drug.id, SourceType::Inventory, 0.9, "depleting");

        let assessment = s.assess(&drug, &[signal]);
        assert_eq!(assessment.days_to_depletion, Some(2.5));
        assert!(assessment.score >= 0.75, "score was {}", assessment.score);
        assert_eq!(s.severity_for(assessment.score), Some(Severity::Critical));
    }

    #[test]
    fn test_source_diversity_raises_corroboration() {
        let s = synthesizer();
        let drug = shortage_drug();
        let one = [ShortageSignal::new(drug.id, SourceType::Fda, 0.8, "a")];
        let two = [
            ShortageSignal::new(drug.id, SourceType::Fda, 0.8, "a"),
            ShortageSignal::new(drug.id, SourceType::News, 0.8, "b"),
        ];

        let single = s.assess(&drug, &one);
        let corroborated = s.assess(&drug, &two);
        assert!(corroborated.corroboration_factor > single.corroboration_factor);
    }

    #[test]
    fn test_low_rank_healthy_drug_scores_low() {
        let s = synthesizer();
        // Rank 10, plenty of stock, one weak signal
        let mut drug = Drug::new("Polio Vaccine", "Vaccine", 10).with_stock(500.0);
        drug.predicted_burn_rate = 1.0;
        let signal = ShortageSignal::new(drug.id, SourceType::News, 0.6, "minor coverage");

        let assessment = s.assess(&drug, &[signal]);
        assert!(s.severity_for(assessment.score).is_none());
    }

    #[test]
    fn test_alert_type_boundaries() {
        let s = synthesizer();
        let mut depleted = shortage_drug();
        depleted.stock_level = 0.0;
        let a = s.assess(&depleted, &[]);
        assert_eq!(
            Synthesizer::alert_type_for(&depleted, &a),
            AlertType::SubstituteNeeded
        );

        let restock = shortage_drug();
        let a = s.assess(&restock, &[]);
        assert_eq!(Synthesizer::alert_type_for(&restock, &a), AlertType::RestockNow);

        let mut watched = shortage_drug();
        watched.stock_level = 20.0; // 10 days of supply
        let a = s.assess(&watched, &[]);
        assert_eq!(Synthesizer::alert_type_for(&watched, &a), AlertType::Watch);
    }

    #[tokio::test]
    async fn test_synthesis_creates_alert_with_copied_evidence() {
        let store = Arc::new(MemoryStore::new());
        let drug = shortage_drug();
        let drug_id = drug.id;
        store.insert_drug(drug).await.unwrap();
        store
            .upsert_signal(
                ShortageSignal::new(drug_id, SourceType::Inventory, 0.9, "projected depletion")
                    .with_url("https://inventory.internal/epi"),
            )
            .await
            .unwrap();

        let boxed = boxed(store.clone());
        let report = synthesizer().synthesize(&boxed, RunId::new()).await.unwrap();

        assert_eq!(report.created.len(), 1);
        let alert = &report.created[0];
        assert_eq!(alert.severity, Severity::Critical);
        assert_eq!(alert.alert_type, AlertType::RestockNow);
        assert_eq!(alert.evidence.len(), 1);
        assert_eq!(alert.evidence[0].description, "projected depletion");
        assert_eq!(alert.evidence[0].data_value, 0.9);

        // Critical restock asks for both a substitute pass and an order
        assert_eq!(report.needs_substitute, vec![drug_id]);
        assert_eq!(report.auto_orders.len(), 1);
        assert_eq!(report.auto_orders[0].urgency, OrderUrgency::Emergency);
    }

    #[tokio::test]
    async fn test_alert_description_carries_agent_reports() {
        use crate::types::AgentLogEntry;

        let store = Arc::new(MemoryStore::new());
        let drug = shortage_drug();
        let drug_id = drug.id;
        store.insert_drug(drug).await.unwrap();
        store
            .upsert_signal(ShortageSignal::new(drug_id, SourceType::Inventory, 0.9, "depleting"))
            .await
            .unwrap();

        let run_id = RunId::new();
        store
            .insert_log(AgentLogEntry::succeeded(
                run_id,
                "inventory",
                serde_json::json!({}),
                "1 drug inside reorder threshold",
            ))
            .await
            .unwrap();
        store
            .insert_log(AgentLogEntry::failed(run_id, "news", "search provider unreachable"))
            .await
            .unwrap();

        let boxed = boxed(store.clone());
        let report = synthesizer().synthesize(&boxed, run_id).await.unwrap();

        assert_eq!(report.created.len(), 1);
        let description = &report.created[0].description;
        assert!(description.contains("inventory: 1 drug inside reorder threshold"));
        assert!(description.contains("news: search provider unreachable"));
    }

    #[tokio::test]
    async fn test_recurrence_escalates_instead_of_duplicating() {
        let store = Arc::new(MemoryStore::new());
        let mut drug = shortage_drug();
        drug.criticality = 6; // scores URGENT first
        let drug_id = drug.id;
        store.insert_drug(drug).await.unwrap();
        store
            .upsert_signal(ShortageSignal::new(drug_id, SourceType::Inventory, 0.9, "depleting"))
            .await
            .unwrap();

        let boxed = boxed(store.clone());
        let s = synthesizer();
        let first = s.synthesize(&boxed, RunId::new()).await.unwrap();
        assert_eq!(first.created.len(), 1);
        let first_severity = first.created[0].severity;
        assert!(first_severity < Severity::Critical);

        // Corroboration from a second source pushes the score up
        store
            .upsert_signal(ShortageSignal::new(drug_id, SourceType::Fda, 0.95, "recall"))
            .await
            .unwrap();
        let second = s.synthesize(&boxed, RunId::new()).await.unwrap();
        assert!(second.created.is_empty());

        let open = store.open_alerts().await.unwrap();
        assert_eq!(open.len(), 1);
        assert!(open[0].severity >= first_severity);
    }

    #[tokio::test]
    async fn test_cleared_condition_resolves_signals() {
        let store = Arc::new(MemoryStore::new());
        // Healthy drug with a leftover weak signal
        let mut drug = Drug::new("Insulin", "Hormone", 6).with_stock(900.0);
        drug.predicted_burn_rate = 3.0;
        let drug_id = drug.id;
        store.insert_drug(drug).await.unwrap();
        store
            .upsert_signal(ShortageSignal::new(drug_id, SourceType::News, 0.6, "old coverage"))
            .await
            .unwrap();

        let boxed = boxed(store.clone());
        let report = synthesizer().synthesize(&boxed, RunId::new()).await.unwrap();

        assert!(report.created.is_empty());
        assert_eq!(report.signals_resolved, 1);
        assert!(store.unresolved_signals().await.unwrap().is_empty());
    }
}
