//! Substitute Agent: per-drug replacement analysis
//!
//! Fanned out once per drug that synthesis flagged as needing a
//! substitute. Candidates come from the clinically validated table;
//! availability is checked against local stock; ranking asks the model
//! and falls back to the table's clinical preference order. Previously
//! suggested substitutes that dropped out of the table are deactivated
//! rather than deleted.

use crate::agents::{AgentContext, AgentFindings};
use crate::catalog::{SubstitutionCandidate, SubstitutionTable};
use crate::error::Result;
use crate::llm::BoxedLlmClient;
use crate::types::{Drug, Substitute};
use chrono::Utc;
use serde_json::json;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{info, warn};

/// Replacement analyzer for a single shortage drug
pub struct SubstituteAgent {
    table: Arc<SubstitutionTable>,
}

impl SubstituteAgent {
    /// Create a substitute agent over the given table
    pub fn new(table: Arc<SubstitutionTable>) -> Self {
        Self { table }
    }

    /// Ask the model to reorder candidates by clinical suitability for
    /// this shortage. A response that is not a permutation of the
    /// candidate names is discarded.
    async fn rank_with_llm(
        llm: &BoxedLlmClient,
        drug: &Drug,
        candidates: &[SubstitutionCandidate],
    ) -> Option<Vec<String>> {
        let names: Vec<&str> = candidates.iter().map(|c| c.name.as_str()).collect();
        let prompt = format!(
            "{} ({}) is in shortage. Rank these substitutes by clinical \
             suitability, best first: {}.\n\
             Respond as JSON: {{\"ranking\": [\"name\", ...]}}",
            drug.name,
            drug.category,
            names.join(", "),
        );
        let value = match llm
            .complete("You are a clinical pharmacist advising on drug substitution.", &prompt)
            .await
        {
            Ok(value) => value,
            Err(e) => {
                warn!(error = %e, drug = %drug.name, "Ranking unavailable, keeping table order");
                return None;
            }
        };

        let ranking: Vec<String> = value
            .get("ranking")?
            .as_array()?
            .iter()
            .filter_map(|v| v.as_str().map(str::to_string))
            .collect();

        let expected: HashSet<&str> = names.iter().copied().collect();
        let returned: HashSet<&str> = ranking.iter().map(String::as_str).collect();
        if ranking.len() != candidates.len() || expected != returned {
            warn!(drug = %drug.name, "Ranking was not a permutation of candidates, keeping table order");
            return None;
        }
        Some(ranking)
    }

    /// Analyze substitutes for one drug and refresh its stored rows
    pub async fn run_for_drug(&self, ctx: &AgentContext, drug: &Drug) -> Result<AgentFindings> {
        let candidates = self.table.candidates_for(&drug.name);

        // Suggestions that fell out of the validated table are stale
        let valid_names: HashSet<&str> = candidates.iter().map(|c| c.name.as_str()).collect();
        let mut deactivated = 0usize;
        for row in ctx.store.substitutes_for(drug.id).await? {
            if row.active && !valid_names.contains(row.substitute_name.as_str()) {
                ctx.store
                    .deactivate_substitute(drug.id, &row.substitute_name)
                    .await?;
                deactivated += 1;
            }
        }

        if candidates.is_empty() {
            info!(drug = %drug.name, "No viable substitute exists");
            return Ok(AgentFindings::new(
                json!({ "drug": drug.name, "candidates": 0, "deactivated": deactivated }),
                format!("No viable substitute for {}", drug.name),
                0,
            ));
        }

        let ranking = match &ctx.llm {
            Some(llm) => Self::rank_with_llm(llm, drug, candidates).await,
            None => None,
        };
        let ordered: Vec<&SubstitutionCandidate> = match &ranking {
            Some(names) => names
                .iter()
                .filter_map(|n| candidates.iter().find(|c| &c.name == n))
                .collect(),
            None => candidates.iter().collect(),
        };

        let mut rows = Vec::new();
        for (idx, candidate) in ordered.iter().enumerate() {
            // A substitute counts as available only when local stock
            // clears the safety margin
            let in_stock = match ctx.store.get_drug_by_name(&candidate.name).await? {
                Some(stocked) => stocked.stock_level > ctx.config.substitute_safety_margin,
                None => false,
            };
            let substitute = Substitute {
                drug_id: drug.id,
                substitute_name: candidate.name.clone(),
                rank: (idx + 1) as u32,
                conversion_note: candidate.note.clone(),
                contraindications: String::new(),
                in_stock,
                active: true,
                updated_at: Utc::now(),
            };
            ctx.store.upsert_substitute(substitute).await?;
            rows.push(json!({ "name": candidate.name, "rank": idx + 1, "in_stock": in_stock }));
        }

        let summary = format!(
            "{} substitutes ranked for {} ({} ranking)",
            rows.len(),
            drug.name,
            if ranking.is_some() { "model" } else { "table" }
        );
        Ok(AgentFindings::new(
            json!({ "drug": drug.name, "substitutes": rows, "deactivated": deactivated }),
            summary,
            rows.len(),
        ))
    }
}
