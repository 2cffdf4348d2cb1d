//! Startup/investor match scoring.
//!
//! A score is a sum of point buckets (sector, stage, traction, GOD tier and the
//! optional velocity and check-size terms) pushed through the weight set's
//! rescale curve and clamped to `[SCORE_FLOOR, SCORE_CEILING]`.

use std::collections::BTreeMap;
use std::sync::Arc;

use anyhow::{anyhow, bail, ensure, Context, Result};
use hotmatch_core::{
    CheckSizeFit, Confidence, FitAnalysis, Investor, MatchRecord, SectorFit, StageFit, Startup,
    TractionSignal, MATCH_STATUS_SUGGESTED,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::vocabulary::{normalize_label, StagePreference};
use crate::RuleSet;

pub const SCORE_FLOOR: u8 = 10;
pub const SCORE_CEILING: u8 = 95;

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SectorWeights {
    pub exact: i32,
    pub adjacent: i32,
    pub unknown: i32,
    pub none: i32,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct StageWeights {
    pub exact: i32,
    pub next: i32,
    pub agnostic: i32,
    pub unknown: i32,
    pub one_off: i32,
    pub two_off: i32,
    pub far: i32,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct TractionWeights {
    pub revenue: i32,
    pub customers: i32,
    pub launched: i32,
}

/// A point bucket hit when `min <= value <= max` (either bound optional).
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Threshold {
    #[serde(default)]
    pub min: Option<f64>,
    #[serde(default)]
    pub max: Option<f64>,
    pub points: i32,
}

impl Threshold {
    fn hits(&self, value: f64) -> bool {
        self.min.map_or(true, |min| value >= min) && self.max.map_or(true, |max| value <= max)
    }
}

fn first_hit(tiers: &[Threshold], value: f64) -> i32 {
    tiers
        .iter()
        .find(|tier| tier.hits(value))
        .map_or(0, |tier| tier.points)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VelocityWeights {
    pub base: i32,
    #[serde(default)]
    pub mvp_days: Vec<Threshold>,
    #[serde(default)]
    pub revenue_months: Vec<Threshold>,
    #[serde(default)]
    pub deploy: BTreeMap<String, i32>,
    #[serde(default)]
    pub growth: Vec<Threshold>,
    #[serde(default)]
    pub pivot_days: Vec<Threshold>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct CheckSizeWeights {
    pub fit: i32,
    pub partial: i32,
    pub poor: i32,
    pub unknown: i32,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct Penalties {
    #[serde(default)]
    pub sector_none: i32,
    #[serde(default)]
    pub stage_far: i32,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Segment {
    /// Inclusive upper bound of raw scores this segment covers; `None` is unbounded.
    #[serde(default)]
    pub upto: Option<f64>,
    pub base: f64,
    pub origin: f64,
    pub slope: f64,
}

/// Maps a raw point sum onto the output scale.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Rescale {
    Linear { base: f64, origin: f64, slope: f64 },
    Piecewise { segments: Vec<Segment> },
}

impl Rescale {
    pub fn apply(&self, raw: f64) -> f64 {
        match self {
            Self::Linear { base, origin, slope } => base + (raw - origin) * slope,
            Self::Piecewise { segments } => {
                let segment = segments
                    .iter()
                    .find(|s| s.upto.map_or(true, |upto| raw <= upto))
                    .or_else(|| segments.last());
                match segment {
                    Some(s) => s.base + (raw - s.origin) * s.slope,
                    None => raw,
                }
            }
        }
    }
}

/// One named, versioned weight set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchWeights {
    pub name: String,
    pub sector: SectorWeights,
    pub stage: StageWeights,
    pub traction: TractionWeights,
    pub god: Vec<Threshold>,
    #[serde(default)]
    pub velocity: Option<VelocityWeights>,
    #[serde(default)]
    pub check_size: Option<CheckSizeWeights>,
    #[serde(default)]
    pub penalties: Penalties,
    pub rescale: Rescale,
}

impl MatchWeights {
    /// Rejects weight sets that would break the ordering guarantees of the scorer.
    pub fn validate(&self) -> Result<()> {
        let s = &self.sector;
        ensure!(
            s.exact >= s.adjacent
                && s.adjacent >= s.unknown
                && s.unknown >= s.none + self.penalties.sector_none,
            "weight set `{}`: sector weights must satisfy exact >= adjacent >= unknown >= none",
            self.name
        );

        for pair in self.god.windows(2) {
            let (hi, lo) = (&pair[0], &pair[1]);
            ensure!(
                hi.min.unwrap_or(f64::MIN) >= lo.min.unwrap_or(f64::MIN) && hi.points >= lo.points,
                "weight set `{}`: GOD tiers must be ordered from highest threshold down",
                self.name
            );
        }
        if self.god.iter().any(|t| t.points < 0 || t.max.is_some()) {
            bail!(
                "weight set `{}`: GOD tiers take a `min` bound and non-negative points",
                self.name
            );
        }

        let mut previous = self.rescale.apply(0.0);
        for raw in 1..=200 {
            let next = self.rescale.apply(f64::from(raw));
            ensure!(
                next >= previous,
                "weight set `{}`: rescale curve decreases at raw score {raw}",
                self.name
            );
            previous = next;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize)]
struct WeightSetsFile {
    #[allow(dead_code)]
    version: u32,
    canonical: String,
    sets: Vec<MatchWeights>,
}

#[derive(Debug, Clone)]
pub struct WeightSets {
    canonical: usize,
    sets: Vec<MatchWeights>,
}

impl WeightSets {
    pub fn from_yaml(text: &str) -> Result<Self> {
        let file: WeightSetsFile = serde_yaml::from_str(text).context("parsing weight sets")?;
        for set in &file.sets {
            set.validate()?;
        }
        let canonical = file
            .sets
            .iter()
            .position(|s| s.name == file.canonical)
            .ok_or_else(|| anyhow!("canonical weight set `{}` is not defined", file.canonical))?;
        Ok(Self {
            canonical,
            sets: file.sets,
        })
    }

    pub fn canonical(&self) -> &MatchWeights {
        &self.sets[self.canonical]
    }

    pub fn get(&self, name: &str) -> Option<&MatchWeights> {
        self.sets.iter().find(|s| s.name == name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.sets.iter().map(|s| s.name.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MatchScore {
    pub score: u8,
    pub confidence: Confidence,
    pub fit: FitAnalysis,
}

impl MatchScore {
    pub fn into_record(self, startup_id: Uuid, investor_id: Uuid) -> MatchRecord {
        MatchRecord {
            startup_id,
            investor_id,
            match_score: self.score,
            confidence_level: self.confidence,
            algorithm_version: self.fit.algorithm_version.clone(),
            fit_analysis: self.fit,
            status: MATCH_STATUS_SUGGESTED.to_string(),
        }
    }
}

/// Pluggable scoring strategy. Implementations must be pure.
pub trait MatchStrategy: Send + Sync {
    fn version(&self) -> &str;
    fn score(&self, startup: &Startup, investor: &Investor) -> MatchScore;
}

pub struct WeightedMatchScorer {
    rules: Arc<RuleSet>,
    weights: MatchWeights,
}

impl WeightedMatchScorer {
    pub fn canonical(rules: Arc<RuleSet>) -> Self {
        let weights = rules.weights().canonical().clone();
        Self { rules, weights }
    }

    pub fn with_version(rules: Arc<RuleSet>, version: &str) -> Result<Self> {
        let weights = rules
            .weights()
            .get(version)
            .cloned()
            .ok_or_else(|| anyhow!("unknown match weight set `{version}`"))?;
        Ok(Self { rules, weights })
    }

    pub fn weights(&self) -> &MatchWeights {
        &self.weights
    }

    fn sector_fit(&self, startup: &Startup, investor: &Investor) -> (SectorFit, Vec<String>) {
        let vocabulary = self.rules.vocabulary();
        let ours = vocabulary.canonical_keys(&startup.sectors);
        let theirs = vocabulary.canonical_keys(&investor.sectors);
        if ours.is_empty() || theirs.is_empty() {
            return (SectorFit::Unknown, Vec::new());
        }

        let mut matched: Vec<String> = ours.iter().filter(|k| theirs.contains(k)).cloned().collect();
        if !matched.is_empty() {
            matched.sort();
            return (SectorFit::Exact, matched);
        }

        let adjacent = ours
            .iter()
            .any(|a| theirs.iter().any(|b| vocabulary.are_adjacent(a, b)));
        if adjacent {
            (SectorFit::Adjacent, Vec::new())
        } else {
            (SectorFit::None, Vec::new())
        }
    }

    fn stage_fit(&self, startup: &Startup, investor: &Investor) -> StageFit {
        let Some(stage) = startup.stage else {
            return StageFit::Unknown;
        };
        match self.rules.stages().preference(&investor.stage) {
            StagePreference::Agnostic => StageFit::Agnostic,
            StagePreference::Stages(stages) => {
                if stages.contains(&stage) {
                    StageFit::Exact
                } else if stages.contains(&stage.saturating_add(1)) {
                    StageFit::Next
                } else {
                    let distance = stages
                        .iter()
                        .map(|s| (i16::from(*s) - i16::from(stage)).abs())
                        .min()
                        .unwrap_or(i16::MAX);
                    match distance {
                        1 => StageFit::OneOff,
                        2 => StageFit::TwoOff,
                        _ => StageFit::Far,
                    }
                }
            }
        }
    }

    fn velocity(&self, startup: &Startup) -> Option<(i32, Vec<String>)> {
        let weights = self.weights.velocity.as_ref()?;
        let mut points = weights.base;
        let mut signals = Vec::new();
        let mut bucket = |tiers: &[Threshold], value: Option<f64>, label: &str| {
            if let Some(v) = value.filter(|v| *v > 0.0) {
                let hit = first_hit(tiers, v);
                if hit > 0 {
                    points += hit;
                    signals.push(format!("{label}:{v}"));
                }
            }
        };

        bucket(&weights.mvp_days, startup.days_from_idea_to_mvp.map(f64::from), "mvp_days");
        bucket(
            &weights.revenue_months,
            startup.time_to_first_revenue_months.map(f64::from),
            "revenue_months",
        );
        bucket(&weights.growth, startup.growth_rate_monthly, "growth");
        bucket(&weights.pivot_days, startup.pivot_speed_days.map(f64::from), "pivot_days");

        if let Some(freq) = startup.deployment_frequency.as_deref().map(normalize_label) {
            if let Some(bonus) = weights.deploy.get(&freq).filter(|b| **b > 0) {
                points += bonus;
                signals.push(format!("deploy:{freq}"));
            }
        }

        Some((points, signals))
    }

    fn check_size_fit(startup: &Startup, investor: &Investor) -> CheckSizeFit {
        let Some(raise) = startup.raise_amount.filter(|r| *r > 0.0) else {
            return CheckSizeFit::Unknown;
        };
        if investor.check_size_min.is_none() && investor.check_size_max.is_none() {
            return CheckSizeFit::Unknown;
        }
        let low = investor.check_size_min.unwrap_or(0.0);
        let high = investor.check_size_max.unwrap_or(f64::INFINITY);
        if raise >= low && raise <= high {
            CheckSizeFit::Fit
        } else if raise >= low / 2.0 && raise <= high * 2.0 {
            CheckSizeFit::Partial
        } else {
            CheckSizeFit::Poor
        }
    }
}

fn traction_signal(startup: &Startup) -> TractionSignal {
    if startup.shows_revenue() {
        TractionSignal::Revenue
    } else if startup.has_customers || startup.customer_count.is_some_and(|c| c > 0) {
        TractionSignal::Customers
    } else if startup.is_launched {
        TractionSignal::Launched
    } else {
        TractionSignal::None
    }
}

fn confidence_for(sector: SectorFit, stage: StageFit) -> Confidence {
    if sector == SectorFit::Exact && matches!(stage, StageFit::Exact | StageFit::Next) {
        Confidence::High
    } else if sector == SectorFit::None || stage == StageFit::Far {
        Confidence::Low
    } else {
        Confidence::Medium
    }
}

impl MatchStrategy for WeightedMatchScorer {
    fn version(&self) -> &str {
        &self.weights.name
    }

    fn score(&self, startup: &Startup, investor: &Investor) -> MatchScore {
        let w = &self.weights;
        let (sector, matched_sectors) = self.sector_fit(startup, investor);
        let stage = self.stage_fit(startup, investor);
        let traction = traction_signal(startup);

        let mut raw = match sector {
            SectorFit::Exact => w.sector.exact,
            SectorFit::Adjacent => w.sector.adjacent,
            SectorFit::Unknown => w.sector.unknown,
            SectorFit::None => w.sector.none + w.penalties.sector_none,
        };

        raw += match stage {
            StageFit::Exact => w.stage.exact,
            StageFit::Next => w.stage.next,
            StageFit::Agnostic => w.stage.agnostic,
            StageFit::Unknown => w.stage.unknown,
            StageFit::OneOff => w.stage.one_off,
            StageFit::TwoOff => w.stage.two_off,
            StageFit::Far => w.stage.far + w.penalties.stage_far,
        };

        raw += match traction {
            TractionSignal::Revenue => w.traction.revenue,
            TractionSignal::Customers => w.traction.customers,
            TractionSignal::Launched => w.traction.launched,
            TractionSignal::None => 0,
        };

        let god_bonus = startup
            .total_god_score
            .map_or(0, |god| first_hit(&w.god, f64::from(god)));
        raw += god_bonus;

        let velocity = self.velocity(startup);
        if let Some((points, _)) = &velocity {
            raw += points;
        }

        let check_size = w.check_size.map(|weights| {
            let fit = Self::check_size_fit(startup, investor);
            raw += match fit {
                CheckSizeFit::Fit => weights.fit,
                CheckSizeFit::Partial => weights.partial,
                CheckSizeFit::Poor => weights.poor,
                CheckSizeFit::Unknown => weights.unknown,
            };
            fit
        });

        let scaled = w.rescale.apply(f64::from(raw)).round();
        let score = scaled.clamp(f64::from(SCORE_FLOOR), f64::from(SCORE_CEILING)) as u8;
        let (velocity_points, velocity_signals) = match velocity {
            Some((points, signals)) => (Some(points), signals),
            None => (None, Vec::new()),
        };

        MatchScore {
            score,
            confidence: confidence_for(sector, stage),
            fit: FitAnalysis {
                sector,
                matched_sectors,
                stage,
                traction,
                god_bonus,
                velocity_points,
                velocity_signals,
                check_size,
                raw_score: raw,
                algorithm_version: w.name.clone(),
                rules_fingerprint: self.rules.fingerprint().to_string(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scorer() -> WeightedMatchScorer {
        WeightedMatchScorer::canonical(Arc::new(RuleSet::builtin().expect("builtin rules")))
    }

    fn startup(sectors: &[&str], stage: Option<u8>) -> Startup {
        Startup {
            sectors: sectors.iter().map(|s| s.to_string()).collect(),
            stage,
            ..Startup::new(Uuid::from_u128(1), "acme")
        }
    }

    fn investor(sectors: &[&str], stages: &[&str]) -> Investor {
        Investor {
            sectors: sectors.iter().map(|s| s.to_string()).collect(),
            stage: stages.iter().map(|s| s.to_string()).collect(),
            ..Investor::new(Uuid::from_u128(2), "fund")
        }
    }

    #[test]
    fn piecewise_rescale_follows_segments() {
        let rescale = scorer().weights().rescale.clone();
        assert_eq!(rescale.apply(15.0), 10.0);
        assert_eq!(rescale.apply(30.0), 21.25);
        assert_eq!(rescale.apply(45.0), 40.0);
        assert_eq!(rescale.apply(70.0), 65.0);
        assert_eq!(rescale.apply(88.0), 81.0);
    }

    #[test]
    fn stage_tiers() {
        let scorer = scorer();
        let s = startup(&["ai"], Some(1));
        let fit = |stages: &[&str]| scorer.stage_fit(&s, &investor(&["ai"], stages));
        assert_eq!(fit(&["seed"]), StageFit::Exact);
        assert_eq!(fit(&["series a"]), StageFit::Next);
        assert_eq!(fit(&["pre-seed"]), StageFit::OneOff);
        assert_eq!(fit(&["series b"]), StageFit::TwoOff);
        assert_eq!(fit(&["growth"]), StageFit::Far);
        assert_eq!(fit(&["whenever"]), StageFit::Agnostic);
        assert_eq!(fit(&[]), StageFit::Agnostic);
        assert_eq!(
            scorer.stage_fit(&startup(&["ai"], None), &investor(&["ai"], &["seed"])),
            StageFit::Unknown
        );
    }

    #[test]
    fn traction_uses_highest_flag_only() {
        let mut s = startup(&[], None);
        s.is_launched = true;
        s.has_customers = true;
        assert_eq!(traction_signal(&s), TractionSignal::Customers);
        s.arr = Some(250_000.0);
        assert_eq!(traction_signal(&s), TractionSignal::Revenue);
    }

    #[test]
    fn check_size_bands() {
        let mut s = startup(&[], None);
        let mut i = investor(&[], &[]);
        assert_eq!(WeightedMatchScorer::check_size_fit(&s, &i), CheckSizeFit::Unknown);
        s.raise_amount = Some(2_000_000.0);
        assert_eq!(WeightedMatchScorer::check_size_fit(&s, &i), CheckSizeFit::Unknown);
        i.check_size_min = Some(1_000_000.0);
        i.check_size_max = Some(3_000_000.0);
        assert_eq!(WeightedMatchScorer::check_size_fit(&s, &i), CheckSizeFit::Fit);
        s.raise_amount = Some(5_000_000.0);
        assert_eq!(WeightedMatchScorer::check_size_fit(&s, &i), CheckSizeFit::Partial);
        s.raise_amount = Some(50_000_000.0);
        assert_eq!(WeightedMatchScorer::check_size_fit(&s, &i), CheckSizeFit::Poor);
    }

    #[test]
    fn velocity_counts_only_positive_signals() {
        let scorer = scorer();
        let mut s = startup(&[], None);
        let (points, signals) = scorer.velocity(&s).expect("v16 has velocity");
        assert_eq!(points, 5);
        assert!(signals.is_empty());

        s.days_from_idea_to_mvp = Some(45);
        s.deployment_frequency = Some("Daily".into());
        s.growth_rate_monthly = Some(20.0);
        s.pivot_speed_days = Some(0);
        let (points, signals) = scorer.velocity(&s).expect("v16 has velocity");
        assert_eq!(points, 5 + 3 + 2 + 2);
        assert_eq!(signals.len(), 3);
    }

    #[test]
    fn confidence_labels() {
        assert_eq!(confidence_for(SectorFit::Exact, StageFit::Next), Confidence::High);
        assert_eq!(confidence_for(SectorFit::Exact, StageFit::Agnostic), Confidence::Medium);
        assert_eq!(confidence_for(SectorFit::Adjacent, StageFit::Far), Confidence::Low);
        assert_eq!(confidence_for(SectorFit::None, StageFit::Exact), Confidence::Low);
    }

    #[test]
    fn legacy_linear_set_is_still_selectable() {
        let rules = Arc::new(RuleSet::builtin().expect("builtin rules"));
        let v15 = WeightedMatchScorer::with_version(rules.clone(), "v15").expect("v15");
        assert_eq!(v15.version(), "v15");
        let result = v15.score(&startup(&["ai"], Some(2)), &investor(&["ai"], &["series a"]));
        // 30 + 30 + base velocity 5 -> 10 + 55 * 0.7
        assert_eq!(result.fit.raw_score, 65);
        assert_eq!(result.score, 49);
        assert!(WeightedMatchScorer::with_version(rules, "v1").is_err());
    }

    #[test]
    fn invalid_weight_sets_are_rejected() {
        let yaml = r#"
version: 1
canonical: broken
sets:
  - name: broken
    sector: { exact: 10, adjacent: 20, unknown: 12, none: 5 }
    stage: { exact: 30, next: 24, agnostic: 18, unknown: 12, one_off: 14, two_off: 8, far: 3 }
    traction: { revenue: 15, customers: 9, launched: 4 }
    god: []
    rescale: { kind: linear, base: 10, origin: 10, slope: 0.7 }
"#;
        let err = WeightSets::from_yaml(yaml).expect_err("non-monotone sector weights");
        assert!(err.to_string().contains("sector weights"));
    }
}
