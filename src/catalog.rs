//! Startup configuration data: monitored drugs, substitutions, suppliers
//!
//! ## Table of Contents
//! - **MonitoredDrug / DrugCatalog**: The fixed catalog of critical drugs
//! - **SubstitutionTable**: Clinically validated substitute candidates
//! - **default_suppliers**: Fallback roster of major distributors
//!
//! All of this is immutable process-wide configuration loaded once at
//! startup and passed explicitly to components, so deployments can swap
//! in their own catalog and tests can run on a small synthetic one.

use crate::types::Supplier;
use serde::{Deserialize, Serialize};

/// One entry of the monitored-drug catalog
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitoredDrug {
    /// Canonical drug name
    pub name: String,
    /// Clinical category
    pub category: String,
    /// Criticality rank, 1 (most critical) to 10
    pub rank: u8,
    /// Brand/generic name variants the matcher should accept
    pub aliases: Vec<String>,
}

impl MonitoredDrug {
    /// Create a catalog entry
    pub fn new(name: impl Into<String>, category: impl Into<String>, rank: u8) -> Self {
        Self {
            name: name.into(),
            category: category.into(),
            rank: rank.clamp(1, 10),
            aliases: Vec::new(),
        }
    }

    /// Add a name alias
    pub fn alias(mut self, alias: impl Into<String>) -> Self {
        self.aliases.push(alias.into());
        self
    }
}

/// The fixed catalog of drugs the hospital monitors
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DrugCatalog {
    entries: Vec<MonitoredDrug>,
}

impl DrugCatalog {
    /// Build a catalog from explicit entries
    pub fn new(entries: Vec<MonitoredDrug>) -> Self {
        Self { entries }
    }

    /// The standard hospital catalog, ranked by criticality
    pub fn standard() -> Self {
        Self::new(vec![
            MonitoredDrug::new("Epinephrine", "Vasopressor", 1).alias("Adrenaline"),
            MonitoredDrug::new("Propofol", "Anesthetic", 2).alias("Diprivan"),
            MonitoredDrug::new("Penicillin", "Antibiotic", 3),
            MonitoredDrug::new("Levofloxacin", "Antibiotic", 4).alias("Levaquin"),
            MonitoredDrug::new("Heparin", "Anticoagulant", 5),
            MonitoredDrug::new("Insulin", "Hormone", 6).alias("Humulin"),
            MonitoredDrug::new("Morphine", "Opioid analgesic", 7),
            MonitoredDrug::new("IV Fluids", "Fluid therapy", 8).alias("Normal Saline"),
            MonitoredDrug::new("Oxygen", "Respiratory", 9),
            MonitoredDrug::new("Polio Vaccine", "Vaccine", 10),
        ])
    }

    /// All catalog entries in rank order
    pub fn entries(&self) -> &[MonitoredDrug] {
        &self.entries
    }

    /// Canonical names of all monitored drugs
    pub fn names(&self) -> Vec<&str> {
        self.entries.iter().map(|e| e.name.as_str()).collect()
    }

    /// Look up an entry by canonical name
    pub fn get(&self, name: &str) -> Option<&MonitoredDrug> {
        self.entries.iter().find(|e| e.name == name)
    }

    /// Criticality rank for a canonical name, if monitored
    pub fn rank_of(&self, name: &str) -> Option<u8> {
        self.get(name).map(|e| e.rank)
    }

    /// Number of monitored drugs
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the catalog is empty
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for DrugCatalog {
    fn default() -> Self {
        Self::standard()
    }
}

/// A clinically validated substitute candidate
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubstitutionCandidate {
    /// Substitute drug name
    pub name: String,
    /// Equivalence/usage note
    pub note: String,
}

impl SubstitutionCandidate {
    fn new(name: &str, note: &str) -> Self {
        Self {
            name: name.to_string(),
            note: note.to_string(),
        }
    }
}

/// Clinical substitution table: drug name to ordered candidate list.
///
/// Candidate order encodes clinical preference (first is best) and serves
/// as the deterministic ranking when the LLM is unavailable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubstitutionTable {
    mappings: Vec<(String, Vec<SubstitutionCandidate>)>,
}

impl SubstitutionTable {
    /// Build a table from explicit mappings
    pub fn new(mappings: Vec<(String, Vec<SubstitutionCandidate>)>) -> Self {
        Self { mappings }
    }

    /// The standard, medically validated substitution mappings
    pub fn standard() -> Self {
        use SubstitutionCandidate as C;
        Self::new(vec![
            (
                "Epinephrine".to_string(),
                vec![
                    C::new("Norepinephrine", "For cardiac use only"),
                    C::new("Vasopressin", "Second-line for cardiac arrest"),
                ],
            ),
            (
                "Propofol".to_string(),
                vec![
                    C::new("Etomidate", "Shorter duration"),
                    C::new("Ketamine", "Good for hemodynamically unstable"),
                    C::new("Midazolam", "Slower onset"),
                ],
            ),
            (
                "Penicillin".to_string(),
                vec![
                    C::new("Amoxicillin", "Similar spectrum"),
                    C::new("Cephalexin", "Check for cross-reactivity"),
                    C::new("Azithromycin", "Use if allergy is confirmed"),
                ],
            ),
            (
                "Levofloxacin".to_string(),
                vec![
                    C::new("Moxifloxacin", "Same class"),
                    C::new("Ciprofloxacin", "Same class, different spectrum"),
                    C::new("Doxycycline", "Tetracycline class alternative"),
                ],
            ),
            (
                "Heparin".to_string(),
                vec![
                    C::new("Enoxaparin", "LMWH, more predictable"),
                    C::new("Fondaparinux", "For HIT patients"),
                    C::new("Warfarin", "Oral, slower onset"),
                ],
            ),
            (
                "Insulin".to_string(),
                vec![
                    C::new("Insulin Lispro", "Rapid-acting"),
                    C::new("Insulin Glargine", "Long-acting basal"),
                ],
            ),
            (
                "Morphine".to_string(),
                vec![
                    C::new("Hydromorphone", "5-7x more potent"),
                    C::new("Fentanyl", "50-100x more potent"),
                    C::new("Oxycodone", "Oral option"),
                ],
            ),
            (
                "IV Fluids".to_string(),
                vec![
                    C::new("Lactated Ringer's", "Good for large-volume resuscitation"),
                    C::new("Normal Saline", "Standard isotonic"),
                    C::new("D5W", "Provides free water"),
                ],
            ),
            // Oxygen and vaccines have no viable substitute
            ("Oxygen".to_string(), vec![]),
            ("Polio Vaccine".to_string(), vec![]),
        ])
    }

    /// Candidates for a drug, in clinical preference order
    pub fn candidates_for(&self, drug_name: &str) -> &[SubstitutionCandidate] {
        self.mappings
            .iter()
            .find(|(name, _)| name == drug_name)
            .map(|(_, candidates)| candidates.as_slice())
            .unwrap_or(&[])
    }
}

impl Default for SubstitutionTable {
    fn default() -> Self {
        Self::standard()
    }
}

/// Fallback roster of major pharmaceutical distributors and manufacturers,
/// merged with deployment-specific supplier rows from the store.
pub fn default_suppliers() -> Vec<Supplier> {
    vec![
        Supplier::new("McKesson Corporation", 25.0, 1).with_reliability(0.98),
        Supplier::new("Cardinal Health", 24.0, 1).with_reliability(0.97),
        Supplier::new("AmerisourceBergen", 23.0, 1).with_reliability(0.96),
        Supplier::new("Pfizer (Direct)", 20.0, 5).with_reliability(0.99),
        Supplier::new("Teva Pharmaceuticals", 18.0, 7).with_reliability(0.93),
        Supplier::new("Baxter International", 21.0, 3).with_reliability(0.96),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_standard_catalog_ranks() {
        let catalog = DrugCatalog::standard();
        assert_eq!(catalog.len(), 10);
        assert_eq!(catalog.rank_of("Epinephrine"), Some(1));
        assert_eq!(catalog.rank_of("Polio Vaccine"), Some(10));
        assert_eq!(catalog.rank_of("Ibuprofen"), None);
    }

    #[test]
    fn test_alias_present() {
        let catalog = DrugCatalog::standard();
        let epi = catalog.get("Epinephrine").unwrap();
        assert!(epi.aliases.iter().any(|a| a == "Adrenaline"));
    }

    #[test]
    fn test_substitution_preference_order() {
        let table = SubstitutionTable::standard();
        let subs = table.candidates_for("Propofol");
        assert_eq!(subs.len(), 3);
        assert_eq!(subs[0].name, "Etomidate");
    }

    #[test]
    fn test_no_substitute_for_oxygen() {
        let table = SubstitutionTable::standard();
        assert!(table.candidates_for("Oxygen").is_empty());
    }

    #[test]
    fn test_default_suppliers_active() {
        let suppliers = default_suppliers();
        assert!(suppliers.iter().all(|s| s.active));
        assert!(suppliers.iter().any(|s| s.name.contains("McKesson")));
    }
}
