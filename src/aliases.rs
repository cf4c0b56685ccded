//! Canonical product name resolution across the three naming vocabularies:
//! order records, benchmark API responses and the purchase-price ledger.

use std::collections::HashMap;
use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;

/// Which vocabulary a raw product name comes from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Vocabulary {
    Order,
    Benchmark,
    Distribution,
}

/// One entry of the static alias table
#[derive(Debug, Clone, Deserialize)]
pub struct AliasRecord {
    pub canonical: String,
    #[serde(default)]
    pub order_variants: Vec<String>,
    #[serde(default)]
    pub benchmark_variants: Vec<String>,
    #[serde(default)]
    pub distribution_variants: Vec<String>,
}

/// Case-insensitive variant -> canonical lookup, one map per vocabulary.
/// Built once at startup and passed by reference into the aggregators.
#[derive(Debug, Default)]
pub struct AliasIndex {
    order: HashMap<String, String>,
    benchmark: HashMap<String, String>,
    distribution: HashMap<String, String>,
}

fn normalize(raw: &str) -> String {
    raw.trim().to_lowercase()
}

fn register(map: &mut HashMap<String, String>, variant: &str, canonical: &str) {
    let key = normalize(variant);
    if key.is_empty() {
        return;
    }
    // First-registered wins on collision.
    map.entry(key).or_insert_with(|| canonical.to_string());
}

impl AliasIndex {
    /// Load the alias table from its JSON file. A missing or malformed file
    /// is a hard error: without canonical names the whole computation would
    /// silently fragment products into duplicates.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("product alias file not found at {}", path.display()))?;
        let records: Vec<AliasRecord> = serde_json::from_str(&text)
            .with_context(|| format!("invalid product alias file {}", path.display()))?;
        Ok(Self::from_records(&records))
    }

    pub fn from_records(records: &[AliasRecord]) -> Self {
        let mut index = Self::default();
        for record in records {
            let canonical = record.canonical.trim();
            if canonical.is_empty() {
                continue;
            }
            for variant in record.order_variants.iter().map(String::as_str).chain([canonical]) {
                register(&mut index.order, variant, canonical);
            }
            for variant in record
                .benchmark_variants
                .iter()
                .map(String::as_str)
                .chain([canonical])
            {
                register(&mut index.benchmark, variant, canonical);
            }
            for variant in record
                .distribution_variants
                .iter()
                .map(String::as_str)
                .chain([canonical])
            {
                register(&mut index.distribution, variant, canonical);
            }
        }
        index
    }

    fn map(&self, vocabulary: Vocabulary) -> &HashMap<String, String> {
        match vocabulary {
            Vocabulary::Order => &self.order,
            Vocabulary::Benchmark => &self.benchmark,
            Vocabulary::Distribution => &self.distribution,
        }
    }

    /// Resolve a raw name to its canonical form, or None if un-aliased.
    pub fn resolve(&self, vocabulary: Vocabulary, raw: &str) -> Option<&str> {
        self.map(vocabulary).get(&normalize(raw)).map(String::as_str)
    }

    /// Resolve a raw name, falling back to the trimmed raw name when it has
    /// no alias so unmapped products still participate downstream.
    pub fn resolve_or_raw(&self, vocabulary: Vocabulary, raw: &str) -> String {
        match self.resolve(vocabulary, raw) {
            Some(canonical) => canonical.to_string(),
            None => raw.trim().to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_index() -> AliasIndex {
        AliasIndex::from_records(&[
            AliasRecord {
                canonical: "Red Onion".to_string(),
                order_variants: vec!["onion red".to_string(), "Onions".to_string()],
                benchmark_variants: vec!["onion".to_string()],
                distribution_variants: vec!["RED ONION A".to_string()],
            },
            AliasRecord {
                canonical: "Tomato".to_string(),
                // Collides with Red Onion's benchmark variant; first wins.
                order_variants: vec![],
                benchmark_variants: vec!["onion".to_string()],
                distribution_variants: vec![],
            },
        ])
    }

    #[test]
    fn resolve_is_case_insensitive_and_trimmed() {
        let index = sample_index();
        assert_eq!(index.resolve(Vocabulary::Order, "  ONION RED "), Some("Red Onion"));
        assert_eq!(index.resolve(Vocabulary::Distribution, "red onion a"), Some("Red Onion"));
    }

    #[test]
    fn canonical_name_resolves_to_itself() {
        let index = sample_index();
        // resolve(v) == resolve(c) == c for every vocabulary
        assert_eq!(index.resolve(Vocabulary::Order, "Red Onion"), Some("Red Onion"));
        assert_eq!(index.resolve(Vocabulary::Benchmark, "red onion"), Some("Red Onion"));
        assert_eq!(
            index.resolve(Vocabulary::Benchmark, "onion"),
            index.resolve(Vocabulary::Benchmark, "Red Onion"),
        );
    }

    #[test]
    fn first_registered_wins_on_collision() {
        let index = sample_index();
        assert_eq!(index.resolve(Vocabulary::Benchmark, "onion"), Some("Red Onion"));
    }

    #[test]
    fn unknown_name_falls_back_to_trimmed_raw() {
        let index = sample_index();
        assert_eq!(index.resolve(Vocabulary::Order, "cabbage"), None);
        assert_eq!(index.resolve_or_raw(Vocabulary::Order, "  Cabbage "), "Cabbage");
    }
}
