//! Order Agent: supplier selection through the order state machine
//!
//! Advances one PENDING order through ANALYZING to SUGGESTED (or FAILED)
//! using guarded compare-and-set transitions, so two concurrent triggers
//! on the same order cannot both analyze it. Supplier selection is a
//! deterministic weighted score driven by the order's urgency tier; the
//! model only contributes the recommendation narrative.

use crate::agents::AgentContext;
use crate::config::SupplierWeights;
use crate::error::{Result, SentinelError};
use crate::order::{Order, OrderId, OrderStatus, OrderUpdate};
use crate::types::{Alert, AlertType, Drug, Severity, Supplier};
use serde_json::json;
use tracing::{info, warn};

/// The supplier-selection analyzer
#[derive(Debug, Default)]
pub struct OrderAgent;

/// One scored candidate supplier
#[derive(Debug, Clone)]
struct ScoredSupplier {
    supplier: Supplier,
    score: f64,
}

impl OrderAgent {
    /// Create a new order agent
    pub fn new() -> Self {
        Self
    }

    /// Score candidates with the urgency tier's weights. Price and lead
    /// time are normalized against the best candidate so the weights stay
    /// comparable across drugs with very different price points.
    fn score_suppliers(candidates: &[Supplier], weights: SupplierWeights) -> Vec<ScoredSupplier> {
        let min_price = candidates
            .iter()
            .map(|s| s.price_per_unit)
            .fold(f64::INFINITY, f64::min)
            .max(0.01);
        let min_lead = candidates.iter().map(|s| s.lead_time_days).min().unwrap_or(0);

        candidates
            .iter()
            .map(|s| {
                let price_score = min_price / s.price_per_unit.max(0.01);
                let lead_score = (min_lead as f64 + 1.0) / (s.lead_time_days as f64 + 1.0);
                let mut score = weights.price * price_score
                    + weights.lead_time * lead_score
                    + weights.reliability * s.reliability_score;
                if s.is_nearby_hospital {
                    score += weights.nearby_bonus;
                }
                ScoredSupplier {
                    supplier: s.clone(),
                    score,
                }
            })
            .collect()
    }

    /// Analyze one order end to end.
    ///
    /// Returns the order in its post-analysis state (SUGGESTED or
    /// FAILED). A lost PENDING -> ANALYZING compare-and-set surfaces as
    /// `SentinelError::Conflict`, meaning someone else holds the order.
    pub async fn analyze(&self, ctx: &AgentContext, order_id: OrderId) -> Result<Order> {
        // Claim the order; losing this CAS means a concurrent analyzer won
        let order = ctx
            .store
            .update_order_if(order_id, OrderStatus::Pending, OrderUpdate::status(OrderStatus::Analyzing))
            .await?;

        let Some(drug) = ctx.store.get_drug(order.drug_id).await? else {
            let failed = ctx
                .store
                .update_order_if(
                    order_id,
                    OrderStatus::Analyzing,
                    OrderUpdate::status(OrderStatus::Failed)
                        .with_notes("Order references an unknown drug"),
                )
                .await?;
            return Ok(failed);
        };

        let candidates: Vec<Supplier> = ctx
            .store
            .active_suppliers()
            .await?
            .into_iter()
            .filter(|s| s.carries(&drug.name))
            .collect();

        if candidates.is_empty() {
            warn!(order = %order_id, drug = %drug.name, "No active supplier carries the drug");
            let failed = ctx
                .store
                .update_order_if(
                    order_id,
                    OrderStatus::Analyzing,
                    OrderUpdate::status(OrderStatus::Failed)
                        .with_notes(format!("No active supplier carries {}", drug.name)),
                )
                .await?;
            return Ok(failed);
        }

        let weights = ctx.config.supplier_weights(order.urgency);
        let mut scored = Self::score_suppliers(&candidates, weights);
        scored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        // Non-empty by the guard above
        let best = scored
            .first()
            .ok_or_else(|| SentinelError::agent("supplier scoring produced no candidates"))?;

        let notes = self.recommendation_notes(ctx, &order, &drug, best).await;
        let total = best.supplier.price_per_unit * order.quantity;
        let suggested = ctx
            .store
            .update_order_if(
                order_id,
                OrderStatus::Analyzing,
                OrderUpdate::status(OrderStatus::Suggested)
                    .with_selection(best.supplier.id, best.supplier.price_per_unit, total)
                    .with_notes(notes.clone()),
            )
            .await?;

        let alert = Alert::new(
            ctx.run_id,
            Severity::Info,
            AlertType::OrderSuggested,
            Some(drug.id),
            format!("Supplier suggested for {} order", drug.name),
        )
        .with_description(notes);
        ctx.store.insert_alert(alert).await?;

        info!(
            order = %order_id,
            drug = %drug.name,
            supplier = %best.supplier.name,
            urgency = %suggested.urgency,
            total = format!("{:.2}", total),
            "Order suggestion ready for operator confirmation"
        );
        Ok(suggested)
    }

    /// Recommendation narrative; deterministic text when the model is
    /// unavailable or malformed.
    async fn recommendation_notes(
        &self,
        ctx: &AgentContext,
        order: &Order,
        drug: &Drug,
        best: &ScoredSupplier,
    ) -> String {
        let fallback = format!(
            "{} selected for {} x{:.0} ({}): ${:.2}/unit, {} day lead, reliability {:.2}",
            best.supplier.name,
            drug.name,
            order.quantity,
            order.urgency,
            best.supplier.price_per_unit,
            best.supplier.lead_time_days,
            best.supplier.reliability_score,
        );
        let Some(llm) = &ctx.llm else { return fallback };

        let prompt = format!(
            "Write one sentence justifying this procurement choice.\n{}\n\
             Respond as JSON: {{\"summary\": \"...\"}}",
            json!({
                "drug": drug.name,
                "quantity": order.quantity,
                "urgency": order.urgency.to_string(),
                "supplier": best.supplier.name,
                "unit_price": best.supplier.price_per_unit,
                "lead_time_days": best.supplier.lead_time_days,
            }),
        );
        match llm
            .complete("You are a hospital procurement analyst.", &prompt)
            .await
        {
            Ok(value) => value
                .get("summary")
                .and_then(|v| v.as_str())
                .map(str::to_string)
                .unwrap_or(fallback),
            Err(e) => {
                warn!(error = %e, "Recommendation narration unavailable");
                fallback
            }
        }
    }
}
