//! Score distribution statistics used by the audit and run reports.

use hotmatch_core::{Confidence, InvestorTier};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ScoreBand {
    pub label: &'static str,
    pub min: u8,
    pub max: u8,
    /// Target share of all matches, in percent.
    pub target: f64,
}

impl ScoreBand {
    pub fn contains(&self, score: u8) -> bool {
        (self.min..=self.max).contains(&score)
    }
}

/// Band shares further than this many points from target are out of tolerance.
pub const BAND_TOLERANCE_POINTS: f64 = 5.0;

pub const TARGET_BANDS: [ScoreBand; 6] = [
    ScoreBand { label: "0-20", min: 0, max: 20, target: 5.0 },
    ScoreBand { label: "21-35", min: 21, max: 35, target: 15.0 },
    ScoreBand { label: "36-50", min: 36, max: 50, target: 35.0 },
    ScoreBand { label: "51-65", min: 51, max: 65, target: 30.0 },
    ScoreBand { label: "66-80", min: 66, max: 80, target: 15.0 },
    ScoreBand { label: "81+", min: 81, max: 100, target: 0.0 },
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BandCount {
    pub label: String,
    pub count: u64,
    pub share: f64,
    pub target: f64,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ScoreDistribution {
    pub total: u64,
    pub mean: f64,
    pub bands: Vec<BandCount>,
}

impl ScoreDistribution {
    pub fn from_scores<I: IntoIterator<Item = u8>>(scores: I) -> Self {
        let mut counts = [0u64; TARGET_BANDS.len()];
        let mut total = 0u64;
        let mut sum = 0u64;
        for score in scores {
            total += 1;
            sum += u64::from(score);
            if let Some(idx) = TARGET_BANDS.iter().position(|b| b.contains(score)) {
                counts[idx] += 1;
            }
        }
        let bands = TARGET_BANDS
            .iter()
            .zip(counts)
            .map(|(band, count)| BandCount {
                label: band.label.to_string(),
                count,
                share: percent(count, total),
                target: band.target,
            })
            .collect();
        Self {
            total,
            mean: if total == 0 { 0.0 } else { sum as f64 / total as f64 },
            bands,
        }
    }

    pub fn share(&self, label: &str) -> Option<f64> {
        self.bands.iter().find(|b| b.label == label).map(|b| b.share)
    }

    /// Largest absolute gap, in percentage points, between a band's share and its target.
    pub fn max_deviation(&self) -> f64 {
        self.bands
            .iter()
            .map(|b| (b.share - b.target).abs())
            .fold(0.0, f64::max)
    }

    pub fn within_tolerance(&self, points: f64) -> bool {
        self.total > 0 && self.max_deviation() <= points
    }
}

fn percent(count: u64, total: u64) -> f64 {
    if total == 0 {
        0.0
    } else {
        count as f64 * 100.0 / total as f64
    }
}

/// GOD score counts per decile; the last bucket holds 90-100.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct GodHistogram {
    pub total: u64,
    pub mean: f64,
    pub deciles: [u64; 10],
}

impl GodHistogram {
    pub fn from_scores<I: IntoIterator<Item = u8>>(scores: I) -> Self {
        let mut histogram = Self::default();
        let mut sum = 0u64;
        for score in scores {
            let idx = usize::from(score.min(100) / 10).min(9);
            histogram.deciles[idx] += 1;
            histogram.total += 1;
            sum += u64::from(score);
        }
        if histogram.total > 0 {
            histogram.mean = sum as f64 / histogram.total as f64;
        }
        histogram
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ConfidenceCounts {
    pub high: u64,
    pub medium: u64,
    pub low: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TierCounts {
    pub elite: u64,
    pub strong: u64,
    pub solid: u64,
    pub emerging: u64,
    pub unscored: u64,
}

impl TierCounts {
    pub fn from_tiers<I: IntoIterator<Item = Option<InvestorTier>>>(tiers: I) -> Self {
        let mut counts = Self::default();
        for tier in tiers {
            match tier {
                Some(InvestorTier::Elite) => counts.elite += 1,
                Some(InvestorTier::Strong) => counts.strong += 1,
                Some(InvestorTier::Solid) => counts.solid += 1,
                Some(InvestorTier::Emerging) => counts.emerging += 1,
                None => counts.unscored += 1,
            }
        }
        counts
    }
}

/// Match-table audit: band distribution plus confidence labels.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct MatchAudit {
    pub distribution: ScoreDistribution,
    pub confidence: ConfidenceCounts,
}

impl MatchAudit {
    pub fn from_matches<I: IntoIterator<Item = (u8, Confidence)>>(matches: I) -> Self {
        let mut confidence = ConfidenceCounts::default();
        let mut scores = Vec::new();
        for (score, level) in matches {
            scores.push(score);
            match level {
                Confidence::High => confidence.high += 1,
                Confidence::Medium => confidence.medium += 1,
                Confidence::Low => confidence.low += 1,
            }
        }
        Self {
            distribution: ScoreDistribution::from_scores(scores),
            confidence,
        }
    }
}
