//! Name-based de-duplication of discovered startups.

use std::collections::HashSet;

use strsim::jaro_winkler;

pub const NAME_SIMILARITY_THRESHOLD: f64 = 0.95;

const LEGAL_SUFFIXES: &[&str] = &["inc", "llc", "ltd", "corp", "co", "gmbh", "sa"];

/// Lowercased alphanumerics with legal suffixes dropped.
pub fn normalize_name(name: &str) -> String {
    let lowered = name.to_lowercase();
    let words: Vec<&str> = lowered
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .collect();
    let keep = match words.split_last() {
        Some((last, rest)) if !rest.is_empty() && LEGAL_SUFFIXES.contains(last) => rest,
        _ => &words[..],
    };
    keep.join(" ")
}

/// Known startup names, checked exactly and by Jaro-Winkler similarity.
#[derive(Debug, Clone, Default)]
pub struct NameIndex {
    exact: HashSet<String>,
    names: Vec<String>,
}

impl NameIndex {
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut index = Self::default();
        for name in names {
            index.insert(name.as_ref());
        }
        index
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        let key = normalize_name(name);
        if key.is_empty() {
            return false;
        }
        self.exact.contains(&key)
            || self
                .names
                .iter()
                .any(|known| jaro_winkler(known, &key) >= NAME_SIMILARITY_THRESHOLD)
    }

    /// Record a name; returns false when it was already known.
    pub fn insert(&mut self, name: &str) -> bool {
        if self.contains(name) {
            return false;
        }
        let key = normalize_name(name);
        if key.is_empty() {
            return false;
        }
        self.exact.insert(key.clone());
        self.names.push(key);
        true
    }
}
