//! Data access boundary. `PgStore` talks to Postgres; `MemoryStore` backs tests.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use hotmatch_core::{
    Confidence, DiscoveredStartup, Investor, InvestorTier, MatchRecord, QueueJob, QueueStats,
    RssSource, SmellTests, Startup,
};
use hotmatch_scoring::{GodScore, InvestorScore};
use uuid::Uuid;

/// Result of sweeping processing jobs whose worker went away.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StuckSweep {
    /// Returned to pending for another attempt.
    pub reset: u64,
    /// Out of attempts; moved to failed.
    pub failed: u64,
}

pub const STUCK_AT_MAX_ATTEMPTS: &str = "stuck after max attempts";

/// Which startups a page query returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartupFilter {
    All,
    Approved,
}

#[async_trait]
pub trait HotMatchStore: Send + Sync {
    // startups
    async fn startups_page(&self, filter: StartupFilter, offset: i64, limit: i64) -> Result<Vec<Startup>>;
    async fn startup(&self, id: Uuid) -> Result<Option<Startup>>;
    async fn startup_names(&self) -> Result<Vec<String>>;
    async fn insert_startup(&self, startup: &Startup) -> Result<()>;
    /// Writes the enrichable descriptive fields and traction flags.
    async fn update_startup_profile(&self, startup: &Startup) -> Result<()>;
    async fn save_god_score(&self, id: Uuid, score: &GodScore) -> Result<()>;
    async fn save_smell_tests(&self, id: Uuid, tests: &SmellTests) -> Result<()>;
    async fn god_scores(&self) -> Result<Vec<u8>>;

    // investors
    async fn investors_page(&self, offset: i64, limit: i64) -> Result<Vec<Investor>>;
    async fn active_investors(&self) -> Result<Vec<Investor>>;
    async fn update_investor_profile(&self, investor: &Investor) -> Result<()>;
    async fn save_investor_score(&self, id: Uuid, score: &InvestorScore) -> Result<()>;
    async fn investor_tiers(&self) -> Result<Vec<Option<InvestorTier>>>;

    // matches
    /// Deletes the startup's existing matches and upserts `matches` in its place.
    async fn replace_matches(&self, startup_id: Uuid, matches: &[MatchRecord]) -> Result<()>;
    async fn matches_for_startup(&self, startup_id: Uuid, limit: i64) -> Result<Vec<MatchRecord>>;
    async fn match_scores(&self) -> Result<Vec<(u8, Confidence)>>;

    // matching queue
    /// Returns false when the startup already has a pending or processing job.
    async fn enqueue(&self, startup_id: Uuid, now: DateTime<Utc>) -> Result<bool>;
    /// Moves up to `limit` due pending jobs with fewer than `max_attempts`
    /// attempts to processing, oldest first.
    async fn claim_jobs(&self, limit: i64, max_attempts: i32, now: DateTime<Utc>) -> Result<Vec<QueueJob>>;
    async fn complete_job(&self, id: Uuid, now: DateTime<Utc>) -> Result<()>;
    async fn retry_job(&self, id: Uuid, error: &str, run_after: DateTime<Utc>) -> Result<()>;
    async fn fail_job(&self, id: Uuid, error: &str, now: DateTime<Utc>) -> Result<()>;
    /// Processing jobs started before `cutoff` go back to pending, or to failed
    /// once they have used `max_attempts`.
    async fn reset_stuck_jobs(&self, cutoff: DateTime<Utc>, max_attempts: i32) -> Result<StuckSweep>;
    async fn queue_stats(&self) -> Result<QueueStats>;

    // discovery
    async fn active_sources(&self) -> Result<Vec<RssSource>>;
    async fn mark_source_scraped(&self, id: Uuid, at: DateTime<Utc>) -> Result<()>;
    async fn discovered_names(&self) -> Result<Vec<String>>;
    async fn insert_discovered(&self, startup: &DiscoveredStartup) -> Result<()>;
    async fn unimported_discoveries(&self, limit: i64) -> Result<Vec<DiscoveredStartup>>;
    async fn mark_imported(&self, id: Uuid) -> Result<()>;
}
