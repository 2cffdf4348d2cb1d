//! GOD score: a 0-100 startup quality composite.
//!
//! Five components each start from a baseline, earn points from whatever
//! signals are present and are capped. A startup with no signals at all still
//! lands on the summed baselines (30).

use std::sync::Arc;

use hotmatch_core::{GodBreakdown, Startup};
use serde::Serialize;

use crate::smell::evaluate_smell_tests;
use crate::vocabulary::{contains_term, normalize_label};
use crate::RuleSet;

pub const GOD_FORMULA_VERSION: &str = "god-v7";

const TEAM_CAP: u32 = 25;
const TRACTION_CAP: u32 = 30;
const MARKET_CAP: u32 = 20;
const PRODUCT_CAP: u32 = 15;
const VISION_CAP: u32 = 10;

const TEAM_BASELINE: u32 = 8;
const TRACTION_BASELINE: u32 = 5;
const MARKET_BASELINE: u32 = 8;
const PRODUCT_BASELINE: u32 = 4;
const VISION_BASELINE: u32 = 3;

const HOT_LOCATIONS: &[&str] = &[
    "san francisco", "sf", "bay area", "nyc", "new york", "austin", "boston", "seattle",
    "los angeles", "la",
];
const GOOD_LOCATIONS: &[&str] = &[
    "london", "berlin", "tel aviv", "singapore", "toronto", "denver", "miami", "chicago",
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GodScore {
    pub total: u8,
    pub breakdown: GodBreakdown,
    pub formula_version: String,
}

pub struct GodScorer {
    rules: Arc<RuleSet>,
}

impl GodScorer {
    pub fn new(rules: Arc<RuleSet>) -> Self {
        Self { rules }
    }

    pub fn score(&self, startup: &Startup) -> GodScore {
        let breakdown = GodBreakdown {
            team: capped(TEAM_BASELINE + team_points(startup), TEAM_CAP),
            traction: capped(TRACTION_BASELINE + traction_points(startup), TRACTION_CAP),
            market: capped(MARKET_BASELINE + self.market_points(startup), MARKET_CAP),
            product: capped(PRODUCT_BASELINE + product_points(startup), PRODUCT_CAP),
            vision: capped(VISION_BASELINE + vision_points(startup), VISION_CAP),
        };
        GodScore {
            total: breakdown.sum().min(100) as u8,
            breakdown,
            formula_version: GOD_FORMULA_VERSION.to_string(),
        }
    }

    fn market_points(&self, startup: &Startup) -> u32 {
        let mut points = 0;

        let tam = normalize_label(startup.tam_estimate.as_deref().unwrap_or_default());
        if tam.contains("trillion") {
            points += 6;
        } else if tam.contains("billion") || has_magnitude_suffix(&tam, 'b') {
            points += 4;
        } else if tam.contains("million") || has_magnitude_suffix(&tam, 'm') {
            points += 1;
        }

        let vocabulary = self.rules.vocabulary();
        let demand = vocabulary
            .canonical_keys(&startup.sectors)
            .iter()
            .map(|key| vocabulary.demand(key))
            .max()
            .unwrap_or(crate::vocabulary::DEFAULT_SECTOR_DEMAND);
        points += (f64::from(demand) / 25.0).round() as u32;

        let location = normalize_label(startup.location.as_deref().unwrap_or_default());
        if HOT_LOCATIONS.iter().any(|l| contains_term(&location, l)) {
            points += 2;
        } else if GOOD_LOCATIONS.iter().any(|l| contains_term(&location, l)) {
            points += 1;
        }

        if text_len(&startup.why_now) > 50 {
            points += 2;
        }
        points
    }
}

fn capped(points: u32, cap: u32) -> u8 {
    points.min(cap) as u8
}

fn text_len(value: &Option<String>) -> usize {
    value.as_deref().map_or(0, |s| s.trim().chars().count())
}

/// True for tokens like "50b" or "10m" in normalized text.
fn has_magnitude_suffix(text: &str, suffix: char) -> bool {
    text.split(' ').any(|word| {
        word.strip_suffix(suffix)
            .is_some_and(|digits| !digits.is_empty() && digits.chars().all(|c| c.is_ascii_digit()))
    })
}

fn team_points(startup: &Startup) -> u32 {
    let mut points = 0;
    if startup.has_technical_cofounder == Some(true) {
        points += 6;
    }

    let early = startup.stage.map_or(true, |s| s <= 1);
    points += match (startup.team_size, early) {
        (Some(n), true) if (2..=10).contains(&n) => 4,
        (Some(n), true) if (11..=20).contains(&n) => 2,
        (Some(1), true) => 1,
        (Some(n), false) if (10..=50).contains(&n) => 4,
        (Some(n), false) if n > 50 || (5..=9).contains(&n) => 3,
        (Some(n), false) if n >= 1 => 1,
        _ => 0,
    };

    if startup.repeat_founders == Some(true) {
        points += 4;
    }
    points += match startup.advisor_count {
        Some(n) if n >= 3 => 3,
        Some(n) if n >= 1 => 1,
        _ => 0,
    };
    points
}

fn traction_points(startup: &Startup) -> u32 {
    let mut points = 0;

    let annual = startup
        .arr
        .filter(|v| *v > 0.0)
        .or_else(|| startup.mrr.filter(|v| *v > 0.0).map(|m| m * 12.0));
    points += match annual {
        Some(v) if v >= 10_000_000.0 => 12,
        Some(v) if v >= 1_000_000.0 => 10,
        Some(v) if v >= 100_000.0 => 7,
        Some(v) if v >= 10_000.0 => 4,
        Some(_) => 2,
        None if startup.has_revenue => 2,
        None => 0,
    };

    points += match startup.growth_rate_monthly {
        Some(g) if g >= 30.0 => 6,
        Some(g) if g >= 15.0 => 4,
        Some(g) if g >= 5.0 => 2,
        Some(g) if g > 0.0 => 1,
        _ => 0,
    };

    points += match startup.customer_count {
        Some(c) if c >= 1000 => 4,
        Some(c) if c >= 100 => 3,
        Some(c) if c >= 10 => 2,
        Some(c) if c >= 1 => 1,
        _ if startup.has_customers => 1,
        _ => 0,
    };

    points += match startup.nrr {
        Some(n) if n >= 120.0 => 3,
        Some(n) if n >= 100.0 => 1,
        _ => 0,
    };
    points
}

fn product_points(startup: &Startup) -> u32 {
    let mut points = 0;
    if startup.is_launched {
        points += 4;
    }
    if startup.has_demo {
        points += 2;
    }
    points += match startup.days_from_idea_to_mvp {
        Some(d) if (1..=30).contains(&d) => 2,
        Some(d) if (31..=90).contains(&d) => 1,
        _ => 0,
    };
    let deploy = normalize_label(startup.deployment_frequency.as_deref().unwrap_or_default());
    points += match deploy.as_str() {
        "daily" | "continuous" => 2,
        "weekly" => 1,
        _ => 0,
    };
    if startup.nps_score.is_some_and(|n| n >= 50) {
        points += 1;
    }
    points
}

fn vision_points(startup: &Startup) -> u32 {
    let smell = startup
        .smell_tests
        .unwrap_or_else(|| evaluate_smell_tests(startup));
    let mut points = u32::from(smell.passed());
    if text_len(&startup.contrarian_belief) > 30 {
        points += 1;
    }
    if text_len(&startup.unfair_advantage) > 30 {
        points += 1;
    }
    points
}
