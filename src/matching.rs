//! Fuzzy drug-name matching against the monitored catalog
//!
//! ## Table of Contents
//! - **DrugMatcher**: Alias-aware, normalized fuzzy matcher
//!
//! External feeds report brand names, salt forms, and packaging noise
//! ("EPINEPHrine HCl 1mg/mL inj."); the matcher has to map these back to
//! the canonical catalog entry before a signal can be recorded.

use crate::catalog::DrugCatalog;
use strsim::jaro_winkler;

/// Similarity required before a fuzzy (non-exact, non-alias) match counts
const FUZZY_THRESHOLD: f64 = 0.88;

/// Alias-aware fuzzy matcher over the monitored catalog
#[derive(Debug, Clone)]
pub struct DrugMatcher {
    // (normalized variant, canonical name)
    variants: Vec<(String, String)>,
}

impl DrugMatcher {
    /// Build a matcher for the given catalog
    pub fn new(catalog: &DrugCatalog) -> Self {
        let mut variants = Vec::new();
        for entry in catalog.entries() {
            variants.push((normalize(&entry.name), entry.name.clone()));
            for alias in &entry.aliases {
                variants.push((normalize(alias), entry.name.clone()));
            }
        }
        Self { variants }
    }

    /// Resolve a raw external name to a canonical catalog name.
    ///
    /// Exact and alias matches win outright; otherwise the best
    /// Jaro-Winkler score above the fuzzy threshold is taken. Substring
    /// containment (raw text embedding a catalog name) also counts, which
    /// handles feed strings like "Propofol Injectable Emulsion".
    pub fn resolve(&self, raw: &str) -> Option<&str> {
        let needle = normalize(raw);
        if needle.is_empty() {
            return None;
        }

        // Exact or alias hit
        for (variant, canonical) in &self.variants {
            if *variant == needle {
                return Some(canonical);
            }
        }

        // Containment: feed strings usually wrap the name in dosage noise
        for (variant, canonical) in &self.variants {
            if needle.contains(variant.as_str()) {
                return Some(canonical);
            }
        }

        // Fuzzy fallback
        let mut best: Option<(&str, f64)> = None;
        for (variant, canonical) in &self.variants {
            let score = jaro_winkler(&needle, variant);
            if score >= FUZZY_THRESHOLD && best.map(|(_, s)| score > s).unwrap_or(true) {
                best = Some((canonical, score));
            }
        }
        best.map(|(canonical, _)| canonical)
    }
}

fn normalize(name: &str) -> String {
    name.to_lowercase()
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || c.is_whitespace())
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}
