//! Core domain model for Hot Match: startups, investors, matches and queue jobs.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const CRATE_NAME: &str = "hotmatch-core";

/// Status written on every freshly generated match row.
pub const MATCH_STATUS_SUGGESTED: &str = "suggested";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StartupStatus {
    #[default]
    Pending,
    Approved,
    Rejected,
}

impl StartupStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "pending" => Some(Self::Pending),
            "approved" => Some(Self::Approved),
            "rejected" => Some(Self::Rejected),
            _ => None,
        }
    }
}

/// Boolean heuristics loosely modeled on accelerator evaluation checklists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SmellTests {
    pub lean: bool,
    pub user_passion: bool,
    pub learning_public: bool,
    pub inevitable: bool,
    pub massive_if_works: bool,
}

impl SmellTests {
    pub fn passed(&self) -> u8 {
        [
            self.lean,
            self.user_passion,
            self.learning_public,
            self.inevitable,
            self.massive_if_works,
        ]
        .into_iter()
        .filter(|flag| *flag)
        .count() as u8
    }
}

/// Per-component GOD score breakdown, stored next to the total.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct GodBreakdown {
    pub team: u8,
    pub traction: u8,
    pub market: u8,
    pub product: u8,
    pub vision: u8,
}

impl GodBreakdown {
    pub fn sum(&self) -> u32 {
        u32::from(self.team)
            + u32::from(self.traction)
            + u32::from(self.market)
            + u32::from(self.product)
            + u32::from(self.vision)
    }
}

/// A `startup_uploads` row. Every signal is optional; scorers treat missing as zero.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Startup {
    pub id: Uuid,
    pub name: String,
    pub tagline: Option<String>,
    pub description: Option<String>,
    pub pitch: Option<String>,
    pub website: Option<String>,
    pub sectors: Vec<String>,
    /// Ordinal 0 (pre-seed) through 6 (late).
    pub stage: Option<u8>,
    pub raise_amount: Option<f64>,
    pub mrr: Option<f64>,
    pub arr: Option<f64>,
    pub growth_rate_monthly: Option<f64>,
    pub customer_count: Option<i64>,
    pub nrr: Option<f64>,
    pub has_revenue: bool,
    pub has_customers: bool,
    pub is_launched: bool,
    pub has_demo: bool,
    pub team_size: Option<i32>,
    pub has_technical_cofounder: Option<bool>,
    pub repeat_founders: Option<bool>,
    pub advisor_count: Option<i32>,
    pub days_from_idea_to_mvp: Option<i32>,
    pub time_to_first_revenue_months: Option<i32>,
    pub deployment_frequency: Option<String>,
    pub pivot_speed_days: Option<i32>,
    pub nps_score: Option<i32>,
    pub tam_estimate: Option<String>,
    pub location: Option<String>,
    pub why_now: Option<String>,
    pub contrarian_belief: Option<String>,
    pub unfair_advantage: Option<String>,
    pub smell_tests: Option<SmellTests>,
    pub total_god_score: Option<u8>,
    pub god_breakdown: Option<GodBreakdown>,
    pub god_formula_version: Option<String>,
    pub status: StartupStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Startup {
    pub fn new(id: Uuid, name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id,
            name: name.into(),
            created_at: now,
            updated_at: now,
            ..Self::default()
        }
    }

    /// Concatenated free text used by keyword heuristics.
    pub fn text_blob(&self) -> String {
        [
            Some(self.name.as_str()),
            self.tagline.as_deref(),
            self.description.as_deref(),
            self.pitch.as_deref(),
        ]
        .into_iter()
        .flatten()
        .collect::<Vec<_>>()
        .join(" ")
        .to_ascii_lowercase()
    }

    /// Revenue signal, whether flagged or implied by recurring revenue figures.
    pub fn shows_revenue(&self) -> bool {
        self.has_revenue
            || self.mrr.is_some_and(|v| v > 0.0)
            || self.arr.is_some_and(|v| v > 0.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InvestorTier {
    Emerging,
    Solid,
    Strong,
    Elite,
}

impl InvestorTier {
    pub fn from_score(score: f64) -> Self {
        if score >= 8.0 {
            Self::Elite
        } else if score >= 6.0 {
            Self::Strong
        } else if score >= 4.0 {
            Self::Solid
        } else {
            Self::Emerging
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Emerging => "emerging",
            Self::Solid => "solid",
            Self::Strong => "strong",
            Self::Elite => "elite",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "emerging" => Some(Self::Emerging),
            "solid" => Some(Self::Solid),
            "strong" => Some(Self::Strong),
            "elite" => Some(Self::Elite),
            _ => None,
        }
    }
}

/// An `investors` row.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Investor {
    pub id: Uuid,
    pub name: String,
    pub firm: Option<String>,
    pub sectors: Vec<String>,
    /// Free-text stage labels ("Seed", "Series A", ...).
    pub stage: Vec<String>,
    pub check_size_min: Option<f64>,
    pub check_size_max: Option<f64>,
    pub partners: Vec<String>,
    pub notable_investments: Vec<String>,
    pub portfolio_companies: Vec<String>,
    pub investment_thesis: Option<String>,
    pub total_investments: Option<i32>,
    pub successful_exits: Option<i32>,
    pub investment_pace_per_year: Option<i32>,
    pub leads_rounds: Option<bool>,
    pub active_fund_size: Option<f64>,
    pub investor_score: Option<f64>,
    pub investor_tier: Option<InvestorTier>,
    pub active: bool,
    pub last_enriched_at: Option<DateTime<Utc>>,
}

impl Investor {
    pub fn new(id: Uuid, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            active: true,
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    Low,
    Medium,
    High,
}

impl Confidence {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "low" => Some(Self::Low),
            "medium" => Some(Self::Medium),
            "high" => Some(Self::High),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SectorFit {
    Exact,
    Adjacent,
    Unknown,
    None,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageFit {
    Exact,
    Next,
    Agnostic,
    Unknown,
    OneOff,
    TwoOff,
    Far,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TractionSignal {
    Revenue,
    Customers,
    Launched,
    None,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckSizeFit {
    Fit,
    Partial,
    Poor,
    Unknown,
}

/// Typed replacement for the `fit_analysis` JSON column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FitAnalysis {
    pub sector: SectorFit,
    pub matched_sectors: Vec<String>,
    pub stage: StageFit,
    pub traction: TractionSignal,
    pub god_bonus: i32,
    #[serde(default)]
    pub velocity_points: Option<i32>,
    #[serde(default)]
    pub velocity_signals: Vec<String>,
    #[serde(default)]
    pub check_size: Option<CheckSizeFit>,
    pub raw_score: i32,
    pub algorithm_version: String,
    pub rules_fingerprint: String,
}

/// A `startup_investor_matches` row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchRecord {
    pub startup_id: Uuid,
    pub investor_id: Uuid,
    pub match_score: u8,
    pub confidence_level: Confidence,
    pub fit_analysis: FitAnalysis,
    pub status: String,
    pub algorithm_version: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl JobStatus {
    pub const ALL: [JobStatus; 4] = [
        JobStatus::Pending,
        JobStatus::Processing,
        JobStatus::Completed,
        JobStatus::Failed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "pending" => Some(Self::Pending),
            "processing" => Some(Self::Processing),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

/// A `matching_queue` row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueJob {
    pub id: Uuid,
    pub startup_id: Uuid,
    pub status: JobStatus,
    pub attempts: i32,
    pub last_error: Option<String>,
    pub run_after: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl QueueJob {
    pub fn pending(startup_id: Uuid, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            startup_id,
            status: JobStatus::Pending,
            attempts: 0,
            last_error: None,
            run_after: now,
            started_at: None,
            completed_at: None,
            created_at: now,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct QueueStats {
    pub pending: i64,
    pub processing: i64,
    pub completed: i64,
    pub failed: i64,
}

impl QueueStats {
    pub fn total(&self) -> i64 {
        self.pending + self.processing + self.completed + self.failed
    }

    pub fn record(&mut self, status: JobStatus, count: i64) {
        match status {
            JobStatus::Pending => self.pending += count,
            JobStatus::Processing => self.processing += count,
            JobStatus::Completed => self.completed += count,
            JobStatus::Failed => self.failed += count,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    Rss,
    /// Listed for reference; requires scraping and is not fetched.
    Web,
}

/// An `rss_sources` row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RssSource {
    pub id: Uuid,
    pub name: String,
    pub url: String,
    pub category: Option<String>,
    pub kind: SourceKind,
    pub active: bool,
    pub last_scraped_at: Option<DateTime<Utc>>,
}

/// A `discovered_startups` row extracted from a news article.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiscoveredStartup {
    pub id: Uuid,
    pub name: String,
    pub website: Option<String>,
    pub description: Option<String>,
    pub funding_amount: Option<String>,
    pub funding_stage: Option<String>,
    pub investors_mentioned: Vec<String>,
    pub sectors: Vec<String>,
    pub article_url: Option<String>,
    pub article_title: Option<String>,
    pub rss_source: Option<String>,
    pub imported_to_startups: bool,
    pub discovered_at: DateTime<Utc>,
}
