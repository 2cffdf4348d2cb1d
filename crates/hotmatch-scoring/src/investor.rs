//! Investor quality score (0-10) and tier.

use anyhow::{Context, Result};
use hotmatch_core::{Investor, InvestorTier};
use serde::{Deserialize, Serialize};

use crate::vocabulary::normalize_label;

pub const INVESTOR_SCORE_MAX: f64 = 10.0;

#[derive(Debug, Clone, Deserialize)]
struct KnownFirmsFile {
    #[allow(dead_code)]
    version: u32,
    firms: Vec<KnownFirm>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct KnownFirm {
    pub name: String,
    #[serde(default)]
    pub fund_size: Option<f64>,
    #[serde(default)]
    pub pace: Option<i32>,
    pub boost: f64,
}

#[derive(Debug, Clone)]
pub struct KnownFirms {
    firms: Vec<KnownFirm>,
}

impl KnownFirms {
    pub fn from_yaml(text: &str) -> Result<Self> {
        let file: KnownFirmsFile = serde_yaml::from_str(text).context("parsing known firms")?;
        let firms = file
            .firms
            .into_iter()
            .map(|firm| KnownFirm {
                name: normalize_label(&firm.name),
                ..firm
            })
            .collect();
        Ok(Self { firms })
    }

    /// First listed firm whose name appears in the investor's firm or name.
    pub fn lookup(&self, investor: &Investor) -> Option<&KnownFirm> {
        let firm = normalize_label(investor.firm.as_deref().unwrap_or_default());
        let name = normalize_label(&investor.name);
        self.firms.iter().find(|known| {
            (!firm.is_empty() && firm.contains(&known.name)) || name.contains(&known.name)
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct InvestorBreakdown {
    pub track_record: f64,
    pub fund_health: f64,
    pub activity: f64,
    pub expertise: f64,
    pub profile: f64,
    pub tier_boost: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InvestorScore {
    pub total: f64,
    pub tier: InvestorTier,
    pub breakdown: InvestorBreakdown,
    pub signals: Vec<String>,
}

pub struct InvestorScorer {
    firms: KnownFirms,
}

fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

impl InvestorScorer {
    pub fn new(firms: KnownFirms) -> Self {
        Self { firms }
    }

    pub fn score(&self, investor: &Investor) -> InvestorScore {
        let known = self.firms.lookup(investor);
        let mut signals = Vec::new();
        if let Some(firm) = known {
            signals.push(format!("known firm: {}", firm.name));
        }

        let investments = investor
            .total_investments
            .unwrap_or(investor.portfolio_companies.len() as i32);
        let fund_size = investor
            .active_fund_size
            .or_else(|| known.and_then(|k| k.fund_size))
            .unwrap_or(0.0);
        let pace = investor
            .investment_pace_per_year
            .or_else(|| known.and_then(|k| k.pace))
            .unwrap_or(0);

        let volume = match investments {
            n if n >= 200 => 2.0,
            n if n >= 100 => 1.7,
            n if n >= 50 => 1.4,
            n if n >= 20 => 1.0,
            n if n >= 5 => 0.5,
            _ => 0.0,
        };
        let exits = match investor.successful_exits.unwrap_or(0) {
            n if n >= 50 => 2.0,
            n if n >= 20 => 1.5,
            n if n >= 10 => 1.0,
            n if n >= 5 => 0.6,
            n if n >= 1 => 0.3,
            _ => 0.0,
        };
        if exits >= 1.0 {
            signals.push("strong exits".to_string());
        }
        let track_record = f64::min(volume + exits, 4.0);

        let fund_health = if fund_size >= 5e9 {
            2.0
        } else if fund_size >= 1e9 {
            1.5
        } else if fund_size >= 5e8 {
            1.2
        } else if fund_size >= 1e8 {
            0.8
        } else if investments >= 50 {
            0.5
        } else {
            0.0
        };

        let activity = match pace {
            p if p >= 100 => 1.5,
            p if p >= 30 => 1.2,
            p if p >= 15 => 0.8,
            p if p >= 5 => 0.4,
            _ => 0.0,
        };

        let sector_count = investor.sectors.len();
        let mut expertise = match sector_count {
            0 => 0.0,
            1..=3 => 1.0,
            4..=6 => 0.6,
            _ => 0.3,
        };
        let thesis_len = investor
            .investment_thesis
            .as_deref()
            .map_or(0, |t| t.trim().chars().count());
        if thesis_len > 100 {
            expertise += 0.5;
            signals.push("clear thesis".to_string());
        }
        let expertise = f64::min(expertise, 1.5);

        let mut profile: f64 = 0.0;
        if investor.leads_rounds == Some(true) {
            profile += 0.4;
        }
        if !investor.partners.is_empty() {
            profile += 0.3;
        }
        if investor.check_size_min.is_some() || investor.check_size_max.is_some() {
            profile += 0.2;
        }
        if thesis_len > 50 {
            profile += 0.1;
        }
        let profile = profile.min(1.0);

        let tier_boost = known.map_or(0.0, |k| k.boost);
        let total = f64::min(
            track_record + fund_health + activity + expertise + profile + tier_boost,
            INVESTOR_SCORE_MAX,
        );

        InvestorScore {
            total: round1(total),
            tier: InvestorTier::from_score(total),
            breakdown: InvestorBreakdown {
                track_record: round1(track_record),
                fund_health: round1(fund_health),
                activity: round1(activity),
                expertise: round1(expertise),
                profile: round1(profile),
                tier_boost,
            },
            signals,
        }
    }
}
