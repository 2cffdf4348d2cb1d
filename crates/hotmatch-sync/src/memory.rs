//! In-memory `HotMatchStore` with the same semantics as the Postgres store.

use std::collections::{BTreeMap, HashMap, HashSet};

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use hotmatch_core::{
    Confidence, DiscoveredStartup, Investor, InvestorTier, JobStatus, MatchRecord, QueueJob,
    QueueStats, RssSource, SmellTests, Startup, StartupStatus,
};
use hotmatch_scoring::{GodScore, InvestorScore};
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::store::{HotMatchStore, StartupFilter, StuckSweep, STUCK_AT_MAX_ATTEMPTS};

#[derive(Debug, Default)]
struct Inner {
    startups: BTreeMap<Uuid, Startup>,
    investors: BTreeMap<Uuid, Investor>,
    matches: HashMap<(Uuid, Uuid), MatchRecord>,
    jobs: Vec<QueueJob>,
    sources: Vec<RssSource>,
    discovered: Vec<DiscoveredStartup>,
    failing: HashSet<Uuid>,
    claim_failures: u32,
}

impl Inner {
    fn check_writable(&self, id: Uuid) -> Result<()> {
        if self.failing.contains(&id) {
            bail!("simulated write failure for {id}");
        }
        Ok(())
    }

    fn job_mut(&mut self, id: Uuid) -> Result<&mut QueueJob> {
        self.jobs
            .iter_mut()
            .find(|j| j.id == id)
            .ok_or_else(|| anyhow!("queue job {id} not found"))
    }
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add_startup(&self, startup: Startup) {
        self.inner.lock().await.startups.insert(startup.id, startup);
    }

    pub async fn add_investor(&self, investor: Investor) {
        self.inner.lock().await.investors.insert(investor.id, investor);
    }

    pub async fn add_source(&self, source: RssSource) {
        self.inner.lock().await.sources.push(source);
    }

    pub async fn add_discovered(&self, startup: DiscoveredStartup) {
        self.inner.lock().await.discovered.push(startup);
    }

    pub async fn add_job(&self, job: QueueJob) {
        self.inner.lock().await.jobs.push(job);
    }

    /// Every write touching `id` fails from now on.
    pub async fn fail_writes_for(&self, id: Uuid) {
        self.inner.lock().await.failing.insert(id);
    }

    /// The next `count` claims fail as if the database were unreachable.
    pub async fn fail_next_claims(&self, count: u32) {
        self.inner.lock().await.claim_failures = count;
    }

    pub async fn startups(&self) -> Vec<Startup> {
        self.inner.lock().await.startups.values().cloned().collect()
    }

    pub async fn investors(&self) -> Vec<Investor> {
        self.inner.lock().await.investors.values().cloned().collect()
    }

    pub async fn jobs(&self) -> Vec<QueueJob> {
        self.inner.lock().await.jobs.clone()
    }

    pub async fn discovered(&self) -> Vec<DiscoveredStartup> {
        self.inner.lock().await.discovered.clone()
    }

    pub async fn sources(&self) -> Vec<RssSource> {
        self.inner.lock().await.sources.clone()
    }
}

#[async_trait]
impl HotMatchStore for MemoryStore {
    async fn startups_page(&self, filter: StartupFilter, offset: i64, limit: i64) -> Result<Vec<Startup>> {
        let inner = self.inner.lock().await;
        Ok(inner
            .startups
            .values()
            .filter(|s| filter == StartupFilter::All || s.status == StartupStatus::Approved)
            .skip(usize::try_from(offset)?)
            .take(usize::try_from(limit)?)
            .cloned()
            .collect())
    }

    async fn startup(&self, id: Uuid) -> Result<Option<Startup>> {
        Ok(self.inner.lock().await.startups.get(&id).cloned())
    }

    async fn startup_names(&self) -> Result<Vec<String>> {
        let inner = self.inner.lock().await;
        Ok(inner.startups.values().map(|s| s.name.clone()).collect())
    }

    async fn insert_startup(&self, startup: &Startup) -> Result<()> {
        let mut inner = self.inner.lock().await;
        if inner.startups.contains_key(&startup.id) {
            bail!("startup {} already exists", startup.id);
        }
        inner.startups.insert(startup.id, startup.clone());
        Ok(())
    }

    async fn update_startup_profile(&self, startup: &Startup) -> Result<()> {
        let mut inner = self.inner.lock().await;
        inner.check_writable(startup.id)?;
        let row = inner
            .startups
            .get_mut(&startup.id)
            .ok_or_else(|| anyhow!("startup {} not found", startup.id))?;
        row.description = startup.description.clone();
        row.sectors = startup.sectors.clone();
        row.stage = startup.stage;
        row.location = startup.location.clone();
        row.team_size = startup.team_size;
        row.has_revenue = startup.has_revenue;
        row.has_customers = startup.has_customers;
        row.is_launched = startup.is_launched;
        row.updated_at = startup.updated_at;
        Ok(())
    }

    async fn save_god_score(&self, id: Uuid, score: &GodScore) -> Result<()> {
        let mut inner = self.inner.lock().await;
        inner.check_writable(id)?;
        let row = inner
            .startups
            .get_mut(&id)
            .ok_or_else(|| anyhow!("startup {id} not found"))?;
        row.total_god_score = Some(score.total);
        row.god_breakdown = Some(score.breakdown);
        row.god_formula_version = Some(score.formula_version.clone());
        Ok(())
    }

    async fn save_smell_tests(&self, id: Uuid, tests: &SmellTests) -> Result<()> {
        let mut inner = self.inner.lock().await;
        inner.check_writable(id)?;
        let row = inner
            .startups
            .get_mut(&id)
            .ok_or_else(|| anyhow!("startup {id} not found"))?;
        row.smell_tests = Some(*tests);
        Ok(())
    }

    async fn god_scores(&self) -> Result<Vec<u8>> {
        let inner = self.inner.lock().await;
        Ok(inner.startups.values().filter_map(|s| s.total_god_score).collect())
    }

    async fn investors_page(&self, offset: i64, limit: i64) -> Result<Vec<Investor>> {
        let inner = self.inner.lock().await;
        Ok(inner
            .investors
            .values()
            .skip(usize::try_from(offset)?)
            .take(usize::try_from(limit)?)
            .cloned()
            .collect())
    }

    async fn active_investors(&self) -> Result<Vec<Investor>> {
        let inner = self.inner.lock().await;
        Ok(inner.investors.values().filter(|i| i.active).cloned().collect())
    }

    async fn update_investor_profile(&self, investor: &Investor) -> Result<()> {
        let mut inner = self.inner.lock().await;
        inner.check_writable(investor.id)?;
        let row = inner
            .investors
            .get_mut(&investor.id)
            .ok_or_else(|| anyhow!("investor {} not found", investor.id))?;
        let (score, tier) = (row.investor_score, row.investor_tier);
        *row = investor.clone();
        row.investor_score = score;
        row.investor_tier = tier;
        Ok(())
    }

    async fn save_investor_score(&self, id: Uuid, score: &InvestorScore) -> Result<()> {
        let mut inner = self.inner.lock().await;
        inner.check_writable(id)?;
        let row = inner
            .investors
            .get_mut(&id)
            .ok_or_else(|| anyhow!("investor {id} not found"))?;
        row.investor_score = Some(score.total);
        row.investor_tier = Some(score.tier);
        Ok(())
    }

    async fn investor_tiers(&self) -> Result<Vec<Option<InvestorTier>>> {
        let inner = self.inner.lock().await;
        Ok(inner.investors.values().map(|i| i.investor_tier).collect())
    }

    async fn replace_matches(&self, startup_id: Uuid, matches: &[MatchRecord]) -> Result<()> {
        let mut inner = self.inner.lock().await;
        inner.check_writable(startup_id)?;
        inner.matches.retain(|(sid, _), _| *sid != startup_id);
        for record in matches {
            inner
                .matches
                .insert((record.startup_id, record.investor_id), record.clone());
        }
        Ok(())
    }

    async fn matches_for_startup(&self, startup_id: Uuid, limit: i64) -> Result<Vec<MatchRecord>> {
        let inner = self.inner.lock().await;
        let mut rows: Vec<MatchRecord> = inner
            .matches
            .values()
            .filter(|m| m.startup_id == startup_id)
            .cloned()
            .collect();
        rows.sort_by(|a, b| {
            b.match_score
                .cmp(&a.match_score)
                .then(a.investor_id.cmp(&b.investor_id))
        });
        rows.truncate(usize::try_from(limit)?);
        Ok(rows)
    }

    async fn match_scores(&self) -> Result<Vec<(u8, Confidence)>> {
        let inner = self.inner.lock().await;
        Ok(inner
            .matches
            .values()
            .map(|m| (m.match_score, m.confidence_level))
            .collect())
    }

    async fn enqueue(&self, startup_id: Uuid, now: DateTime<Utc>) -> Result<bool> {
        let mut inner = self.inner.lock().await;
        let live = inner.jobs.iter().any(|j| {
            j.startup_id == startup_id
                && matches!(j.status, JobStatus::Pending | JobStatus::Processing)
        });
        if live {
            return Ok(false);
        }
        inner.jobs.push(QueueJob::pending(startup_id, now));
        Ok(true)
    }

    async fn claim_jobs(&self, limit: i64, max_attempts: i32, now: DateTime<Utc>) -> Result<Vec<QueueJob>> {
        let mut inner = self.inner.lock().await;
        if inner.claim_failures > 0 {
            inner.claim_failures -= 1;
            bail!("simulated claim failure");
        }
        let mut due: Vec<usize> = inner
            .jobs
            .iter()
            .enumerate()
            .filter(|(_, j)| {
                j.status == JobStatus::Pending && j.run_after <= now && j.attempts < max_attempts
            })
            .map(|(idx, _)| idx)
            .collect();
        due.sort_by_key(|&idx| inner.jobs[idx].created_at);
        due.truncate(usize::try_from(limit)?);

        let mut claimed = Vec::with_capacity(due.len());
        for idx in due {
            let job = &mut inner.jobs[idx];
            job.status = JobStatus::Processing;
            job.attempts += 1;
            job.started_at = Some(now);
            claimed.push(job.clone());
        }
        Ok(claimed)
    }

    async fn complete_job(&self, id: Uuid, now: DateTime<Utc>) -> Result<()> {
        let mut inner = self.inner.lock().await;
        let job = inner.job_mut(id)?;
        job.status = JobStatus::Completed;
        job.completed_at = Some(now);
        job.last_error = None;
        Ok(())
    }

    async fn retry_job(&self, id: Uuid, error: &str, run_after: DateTime<Utc>) -> Result<()> {
        let mut inner = self.inner.lock().await;
        let job = inner.job_mut(id)?;
        job.status = JobStatus::Pending;
        job.last_error = Some(error.to_string());
        job.run_after = run_after;
        job.started_at = None;
        Ok(())
    }

    async fn fail_job(&self, id: Uuid, error: &str, now: DateTime<Utc>) -> Result<()> {
        let mut inner = self.inner.lock().await;
        let job = inner.job_mut(id)?;
        job.status = JobStatus::Failed;
        job.last_error = Some(error.to_string());
        job.completed_at = Some(now);
        Ok(())
    }

    async fn reset_stuck_jobs(&self, cutoff: DateTime<Utc>, max_attempts: i32) -> Result<StuckSweep> {
        let mut inner = self.inner.lock().await;
        let mut sweep = StuckSweep::default();
        let now = Utc::now();
        for job in inner.jobs.iter_mut() {
            if job.status != JobStatus::Processing || !job.started_at.is_some_and(|t| t < cutoff) {
                continue;
            }
            job.started_at = None;
            if job.attempts >= max_attempts {
                job.status = JobStatus::Failed;
                job.last_error = Some(STUCK_AT_MAX_ATTEMPTS.to_string());
                job.completed_at = Some(now);
                sweep.failed += 1;
            } else {
                job.status = JobStatus::Pending;
                sweep.reset += 1;
            }
        }
        Ok(sweep)
    }

    async fn queue_stats(&self) -> Result<QueueStats> {
        let inner = self.inner.lock().await;
        let mut stats = QueueStats::default();
        for job in &inner.jobs {
            stats.record(job.status, 1);
        }
        Ok(stats)
    }

    async fn active_sources(&self) -> Result<Vec<RssSource>> {
        let inner = self.inner.lock().await;
        Ok(inner.sources.iter().filter(|s| s.active).cloned().collect())
    }

    async fn mark_source_scraped(&self, id: Uuid, at: DateTime<Utc>) -> Result<()> {
        let mut inner = self.inner.lock().await;
        let source = inner
            .sources
            .iter_mut()
            .find(|s| s.id == id)
            .ok_or_else(|| anyhow!("rss source {id} not found"))?;
        source.last_scraped_at = Some(at);
        Ok(())
    }

    async fn discovered_names(&self) -> Result<Vec<String>> {
        let inner = self.inner.lock().await;
        Ok(inner.discovered.iter().map(|d| d.name.clone()).collect())
    }

    async fn insert_discovered(&self, startup: &DiscoveredStartup) -> Result<()> {
        let mut inner = self.inner.lock().await;
        inner.check_writable(startup.id)?;
        inner.discovered.push(startup.clone());
        Ok(())
    }

    async fn unimported_discoveries(&self, limit: i64) -> Result<Vec<DiscoveredStartup>> {
        let inner = self.inner.lock().await;
        let mut rows: Vec<DiscoveredStartup> = inner
            .discovered
            .iter()
            .filter(|d| !d.imported_to_startups)
            .cloned()
            .collect();
        rows.sort_by_key(|d| d.discovered_at);
        rows.truncate(usize::try_from(limit)?);
        Ok(rows)
    }

    async fn mark_imported(&self, id: Uuid) -> Result<()> {
        let mut inner = self.inner.lock().await;
        let row = inner
            .discovered
            .iter_mut()
            .find(|d| d.id == id)
            .ok_or_else(|| anyhow!("discovered startup {id} not found"))?;
        row.imported_to_startups = true;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;

    #[tokio::test]
    async fn enqueue_keeps_one_live_job_per_startup() {
        let store = MemoryStore::new();
        let startup = Uuid::new_v4();
        let now = Utc::now();
        assert!(store.enqueue(startup, now).await.expect("enqueue"));
        assert!(!store.enqueue(startup, now).await.expect("enqueue again"));

        let claimed = store.claim_jobs(10, 3, now).await.expect("claim");
        assert!(!store.enqueue(startup, now).await.expect("while processing"));
        store.complete_job(claimed[0].id, now).await.expect("complete");
        assert!(store.enqueue(startup, now).await.expect("after completion"));
    }

    #[tokio::test]
    async fn claims_are_fifo_and_respect_run_after() {
        let store = MemoryStore::new();
        let now = Utc::now();
        let mut late = QueueJob::pending(Uuid::new_v4(), now - Duration::minutes(1));
        late.run_after = now + Duration::minutes(5);
        let first = QueueJob::pending(Uuid::new_v4(), now - Duration::minutes(3));
        let second = QueueJob::pending(Uuid::new_v4(), now - Duration::minutes(2));
        store.add_job(late.clone()).await;
        store.add_job(second.clone()).await;
        store.add_job(first.clone()).await;

        let claimed = store.claim_jobs(10, 3, now).await.expect("claim");
        let ids: Vec<Uuid> = claimed.iter().map(|j| j.id).collect();
        assert_eq!(ids, vec![first.id, second.id]);
        assert!(claimed.iter().all(|j| j.attempts == 1 && j.started_at == Some(now)));
        assert_eq!(store.queue_stats().await.expect("stats").pending, 1);
    }

    #[tokio::test]
    async fn exhausted_jobs_are_never_claimed() {
        let store = MemoryStore::new();
        let now = Utc::now();
        let mut spent = QueueJob::pending(Uuid::new_v4(), now - Duration::minutes(2));
        spent.attempts = 3;
        store.add_job(spent).await;

        assert!(store.claim_jobs(10, 3, now).await.expect("claim").is_empty());
        assert_eq!(store.claim_jobs(10, 4, now).await.expect("claim").len(), 1);
    }
}
