//! Scoring heuristics for Hot Match: vocabulary normalization, GOD score,
//! match scoring, investor tiers, smell tests and score distributions.
//!
//! All heuristic tables live in versioned YAML files under `rules/`. They are
//! embedded at build time and can be overridden from a workspace directory.

pub mod distribution;
pub mod god;
pub mod investor;
pub mod matching;
pub mod smell;
pub mod vocabulary;

use std::path::Path;

use anyhow::{Context, Result};
use sha2::{Digest, Sha256};

pub use distribution::{
    ConfidenceCounts, GodHistogram, MatchAudit, ScoreBand, ScoreDistribution, TierCounts,
    BAND_TOLERANCE_POINTS, TARGET_BANDS,
};
pub use god::{GodScore, GodScorer, GOD_FORMULA_VERSION};
pub use investor::{InvestorScore, InvestorScorer, KnownFirms};
pub use matching::{
    MatchScore, MatchStrategy, MatchWeights, WeightSets, WeightedMatchScorer, SCORE_CEILING,
    SCORE_FLOOR,
};
pub use smell::evaluate_smell_tests;
pub use vocabulary::{normalize_label, StagePreference, StageTable, Vocabulary};

pub const CRATE_NAME: &str = "hotmatch-scoring";

const SECTORS_YAML: &str = include_str!("../../../rules/sectors.yaml");
const STAGES_YAML: &str = include_str!("../../../rules/stages.yaml");
const MATCH_WEIGHTS_YAML: &str = include_str!("../../../rules/match_weights.yaml");
const KNOWN_FIRMS_YAML: &str = include_str!("../../../rules/known_firms.yaml");

/// Every heuristic table a scorer needs, loaded together.
#[derive(Debug, Clone)]
pub struct RuleSet {
    vocabulary: Vocabulary,
    stages: StageTable,
    weights: WeightSets,
    known_firms: KnownFirms,
    fingerprint: String,
}

impl RuleSet {
    /// Rules compiled into the binary.
    pub fn builtin() -> Result<Self> {
        Self::from_sources(SECTORS_YAML, STAGES_YAML, MATCH_WEIGHTS_YAML, KNOWN_FIRMS_YAML)
    }

    pub fn from_workspace_root(root: &Path) -> Result<Self> {
        let rules_dir = root.join("rules");
        let read = |name: &str| {
            std::fs::read_to_string(rules_dir.join(name))
                .with_context(|| format!("reading rules/{name}"))
        };
        Self::from_sources(
            &read("sectors.yaml")?,
            &read("stages.yaml")?,
            &read("match_weights.yaml")?,
            &read("known_firms.yaml")?,
        )
    }

    /// Workspace rules when a `rules/` directory exists, otherwise the builtin set.
    pub fn load(workspace_root: &Path) -> Result<Self> {
        if workspace_root.join("rules").join("sectors.yaml").exists() {
            Self::from_workspace_root(workspace_root)
        } else {
            Self::builtin()
        }
    }

    fn from_sources(sectors: &str, stages: &str, weights: &str, firms: &str) -> Result<Self> {
        let vocabulary = Vocabulary::from_yaml(sectors).context("parsing rules/sectors.yaml")?;
        let stages_table = StageTable::from_yaml(stages).context("parsing rules/stages.yaml")?;
        let weight_sets =
            WeightSets::from_yaml(weights).context("parsing rules/match_weights.yaml")?;
        let known_firms = KnownFirms::from_yaml(firms).context("parsing rules/known_firms.yaml")?;

        let mut hasher = Sha256::new();
        for text in [sectors, stages, weights, firms] {
            hasher.update(text.as_bytes());
            hasher.update([0u8]);
        }
        let fingerprint = hex::encode(hasher.finalize())[..12].to_string();

        Ok(Self {
            vocabulary,
            stages: stages_table,
            weights: weight_sets,
            known_firms,
            fingerprint,
        })
    }

    pub fn vocabulary(&self) -> &Vocabulary {
        &self.vocabulary
    }

    pub fn stages(&self) -> &StageTable {
        &self.stages
    }

    pub fn weights(&self) -> &WeightSets {
        &self.weights
    }

    pub fn known_firms(&self) -> &KnownFirms {
        &self.known_firms
    }

    /// Short content hash of the rule text, recorded with every match.
    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }
}
