//! Sector and stage vocabularies.
//!
//! Free-text labels are folded to a canonical key with a fixed lookup order:
//! exact key, exact synonym, substring against an entry's key and synonyms,
//! then the normalized label itself.

use std::collections::{BTreeSet, HashMap, HashSet};

use anyhow::{bail, Context, Result};
use serde::Deserialize;

/// Fallback investor demand for sectors without an explicit figure.
pub const DEFAULT_SECTOR_DEMAND: u8 = 50;

/// Terms this short only match as whole words ("ml", "it", "bi", "api").
const WHOLE_WORD_MAX_LEN: usize = 3;

/// Lowercase, map every non-alphanumeric character to a space, collapse whitespace.
pub fn normalize_label(input: &str) -> String {
    input
        .to_ascii_lowercase()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { ' ' })
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Substring test on normalized text; short needles must be a whole word of `haystack`.
pub fn contains_term(haystack: &str, needle: &str) -> bool {
    if needle.is_empty() {
        return false;
    }
    if needle.len() <= WHOLE_WORD_MAX_LEN {
        haystack.split(' ').any(|word| word == needle)
    } else {
        haystack.contains(needle)
    }
}

#[derive(Debug, Clone, Deserialize)]
struct SectorsFile {
    version: u32,
    sectors: Vec<SectorEntry>,
}

#[derive(Debug, Clone, Deserialize)]
struct SectorEntry {
    key: String,
    #[serde(default)]
    synonyms: Vec<String>,
    #[serde(default)]
    adjacent: Vec<String>,
    #[serde(default)]
    demand: Option<u8>,
}

#[derive(Debug, Clone)]
struct SectorTerms {
    key: String,
    synonyms: Vec<String>,
    adjacent: HashSet<String>,
    demand: u8,
}

#[derive(Debug, Clone)]
pub struct Vocabulary {
    version: u32,
    entries: Vec<SectorTerms>,
    index: HashMap<String, usize>,
}

impl Vocabulary {
    pub fn from_yaml(text: &str) -> Result<Self> {
        let file: SectorsFile = serde_yaml::from_str(text).context("parsing sector vocabulary")?;
        let mut entries = Vec::with_capacity(file.sectors.len());
        let mut index = HashMap::new();

        for entry in file.sectors {
            let key = normalize_label(&entry.key);
            if key.is_empty() {
                bail!("sector vocabulary contains an empty key");
            }
            if index.insert(key.clone(), entries.len()).is_some() {
                bail!("sector vocabulary defines `{key}` twice");
            }
            entries.push(SectorTerms {
                key,
                synonyms: entry
                    .synonyms
                    .iter()
                    .map(|s| normalize_label(s))
                    .filter(|s| !s.is_empty())
                    .collect(),
                adjacent: entry
                    .adjacent
                    .iter()
                    .map(|s| normalize_label(s))
                    .filter(|s| !s.is_empty())
                    .collect(),
                demand: entry.demand.unwrap_or(DEFAULT_SECTOR_DEMAND),
            });
        }

        Ok(Self {
            version: file.version,
            entries,
            index,
        })
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|e| e.key.as_str())
    }

    pub fn is_canonical(&self, key: &str) -> bool {
        self.index.contains_key(key)
    }

    /// Canonical key for a free-text sector label, or `None` for blank input.
    pub fn canonical_key(&self, label: &str) -> Option<String> {
        let normalized = normalize_label(label);
        if normalized.is_empty() {
            return None;
        }

        if self.index.contains_key(&normalized) {
            return Some(normalized);
        }

        if let Some(entry) = self
            .entries
            .iter()
            .find(|e| e.synonyms.iter().any(|s| *s == normalized))
        {
            return Some(entry.key.clone());
        }

        let overlaps = |term: &str| {
            contains_term(&normalized, term) || contains_term(term, &normalized)
        };
        if let Some(entry) = self
            .entries
            .iter()
            .find(|e| overlaps(&e.key) || e.synonyms.iter().any(|s| overlaps(s)))
        {
            return Some(entry.key.clone());
        }

        Some(normalized)
    }

    /// Canonical keys for a label list, de-duplicated in first-seen order.
    pub fn canonical_keys<S: AsRef<str>>(&self, labels: &[S]) -> Vec<String> {
        let mut seen = HashSet::new();
        labels
            .iter()
            .filter_map(|label| self.canonical_key(label.as_ref()))
            .filter(|key| seen.insert(key.clone()))
            .collect()
    }

    /// Adjacency is checked in both directions.
    pub fn are_adjacent(&self, a: &str, b: &str) -> bool {
        let listed = |from: &str, to: &str| {
            self.index
                .get(from)
                .is_some_and(|&i| self.entries[i].adjacent.contains(to))
        };
        listed(a, b) || listed(b, a)
    }

    pub fn demand(&self, key: &str) -> u8 {
        self.index
            .get(key)
            .map(|&i| self.entries[i].demand)
            .unwrap_or(DEFAULT_SECTOR_DEMAND)
    }
}

#[derive(Debug, Clone, Deserialize)]
struct StagesFile {
    version: u32,
    stages: Vec<StageEntry>,
}

#[derive(Debug, Clone, Deserialize)]
struct StageEntry {
    label: String,
    ordinal: u8,
}

/// Highest ordinal a stage can carry (late stage).
pub const MAX_STAGE_ORDINAL: u8 = 6;

/// Investor stage coverage after normalization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StagePreference {
    /// No recognizable stage labels; the investor is treated as stage-agnostic.
    Agnostic,
    Stages(BTreeSet<u8>),
}

#[derive(Debug, Clone)]
pub struct StageTable {
    version: u32,
    labels: HashMap<String, u8>,
}

impl StageTable {
    pub fn from_yaml(text: &str) -> Result<Self> {
        let file: StagesFile = serde_yaml::from_str(text).context("parsing stage table")?;
        let mut labels = HashMap::new();
        for entry in file.stages {
            if entry.ordinal > MAX_STAGE_ORDINAL {
                bail!(
                    "stage `{}` has ordinal {} above {MAX_STAGE_ORDINAL}",
                    entry.label,
                    entry.ordinal
                );
            }
            labels.insert(normalize_label(&entry.label), entry.ordinal);
        }
        Ok(Self {
            version: file.version,
            labels,
        })
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    /// Ordinal for a stage label; unmapped labels yield `None`.
    pub fn ordinal(&self, label: &str) -> Option<u8> {
        self.labels.get(&normalize_label(label)).copied()
    }

    pub fn preference<S: AsRef<str>>(&self, labels: &[S]) -> StagePreference {
        let stages: BTreeSet<u8> = labels
            .iter()
            .filter_map(|label| self.ordinal(label.as_ref()))
            .collect();
        if stages.is_empty() {
            StagePreference::Agnostic
        } else {
            StagePreference::Stages(stages)
        }
    }
}
