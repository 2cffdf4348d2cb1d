//! Matching queue worker: claim due jobs, rebuild matches, record the outcome.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use futures::StreamExt;
use hotmatch_core::{Investor, QueueJob, Startup};
use hotmatch_fetch::BackoffPolicy;
use hotmatch_scoring::MatchStrategy;
use serde::Serialize;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::rebuild::rebuild_startup;
use crate::reports::RunSummary;
use crate::store::HotMatchStore;

pub const MAX_ATTEMPTS: i32 = 3;

#[derive(Debug, Clone)]
pub struct QueueConfig {
    pub batch_size: i64,
    pub poll_interval: Duration,
    pub concurrency: usize,
    pub max_attempts: i32,
    /// `processing` jobs older than this are returned to `pending`.
    pub stuck_after: chrono::Duration,
    pub investor_cache_ttl: Duration,
    pub backoff: BackoffPolicy,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            batch_size: 20,
            poll_interval: Duration::from_secs(5),
            concurrency: 1,
            max_attempts: MAX_ATTEMPTS,
            stuck_after: chrono::Duration::minutes(5),
            investor_cache_ttl: Duration::from_secs(10 * 60),
            backoff: BackoffPolicy {
                max_retries: MAX_ATTEMPTS as usize,
                base_delay: Duration::from_secs(30),
                max_delay: Duration::from_secs(10 * 60),
            },
        }
    }
}

/// Where a job goes after a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureTransition {
    Retry { run_after: DateTime<Utc> },
    Fail,
}

/// `attempts` is the counter after the claim that just failed.
pub fn failure_transition(attempts: i32, config: &QueueConfig, now: DateTime<Utc>) -> FailureTransition {
    if attempts >= config.max_attempts {
        return FailureTransition::Fail;
    }
    let index = usize::try_from(attempts.saturating_sub(1)).unwrap_or(0);
    let delay = config.backoff.delay_for_attempt(index);
    let delay = chrono::Duration::from_std(delay).unwrap_or_else(|_| chrono::Duration::minutes(10));
    FailureTransition::Retry {
        run_after: now + delay,
    }
}

/// Active investors, reloaded after `ttl`.
pub struct InvestorCache {
    ttl: Duration,
    loaded: Mutex<Option<(Instant, Arc<Vec<Investor>>)>>,
}

impl InvestorCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            loaded: Mutex::new(None),
        }
    }

    pub async fn get(&self, store: &dyn HotMatchStore) -> Result<Arc<Vec<Investor>>> {
        let mut slot = self.loaded.lock().await;
        if let Some((at, investors)) = slot.as_ref() {
            if at.elapsed() < self.ttl {
                return Ok(investors.clone());
            }
        }
        let investors = Arc::new(
            store
                .active_investors()
                .await
                .context("loading active investors")?,
        );
        info!(count = investors.len(), "investor cache refreshed");
        *slot = Some((Instant::now(), investors.clone()));
        Ok(investors)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueueRunSummary {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub batches: u64,
    pub stuck_reset: u64,
    /// Stuck jobs that had no attempts left.
    pub stuck_failed: u64,
    pub claimed: u64,
    pub completed: u64,
    pub retried: u64,
    pub failed: u64,
    pub matches_written: u64,
    /// Outcome writes that did not reach the store.
    pub bookkeeping_errors: u64,
    /// Batches abandoned because the sweep or the claim failed.
    pub batch_errors: u64,
}

impl QueueRunSummary {
    fn new() -> Self {
        let now = Utc::now();
        Self {
            run_id: Uuid::new_v4(),
            started_at: now,
            finished_at: now,
            batches: 0,
            stuck_reset: 0,
            stuck_failed: 0,
            claimed: 0,
            completed: 0,
            retried: 0,
            failed: 0,
            matches_written: 0,
            bookkeeping_errors: 0,
            batch_errors: 0,
        }
    }

    fn absorb(&mut self, other: &QueueRunSummary) {
        self.batches += other.batches;
        self.stuck_reset += other.stuck_reset;
        self.stuck_failed += other.stuck_failed;
        self.claimed += other.claimed;
        self.completed += other.completed;
        self.retried += other.retried;
        self.failed += other.failed;
        self.matches_written += other.matches_written;
        self.bookkeeping_errors += other.bookkeeping_errors;
        self.batch_errors += other.batch_errors;
        self.finished_at = other.finished_at;
    }
}

impl RunSummary for QueueRunSummary {
    fn job(&self) -> &str {
        "queue"
    }

    fn run_id(&self) -> Uuid {
        self.run_id
    }

    fn finished_at(&self) -> DateTime<Utc> {
        self.finished_at
    }

    fn headline(&self) -> String {
        format!(
            "queue: claimed={} completed={} retried={} failed={} stuck_reset={} stuck_failed={} batch_errors={}",
            self.claimed,
            self.completed,
            self.retried,
            self.failed,
            self.stuck_reset,
            self.stuck_failed,
            self.batch_errors
        )
    }

    fn markdown_body(&self) -> String {
        format!(
            "| batches | batch errors | claimed | completed | retried | failed | stuck reset | stuck failed | matches |\n\
             |---|---|---|---|---|---|---|---|---|\n\
             | {} | {} | {} | {} | {} | {} | {} | {} | {} |\n",
            self.batches,
            self.batch_errors,
            self.claimed,
            self.completed,
            self.retried,
            self.failed,
            self.stuck_reset,
            self.stuck_failed,
            self.matches_written
        )
    }
}

enum JobResult {
    Completed(usize),
    Retried,
    Failed,
}

pub struct QueueWorker {
    store: Arc<dyn HotMatchStore>,
    strategy: Arc<dyn MatchStrategy>,
    config: QueueConfig,
    investors: InvestorCache,
}

impl QueueWorker {
    pub fn new(store: Arc<dyn HotMatchStore>, strategy: Arc<dyn MatchStrategy>, config: QueueConfig) -> Self {
        let investors = InvestorCache::new(config.investor_cache_ttl);
        Self {
            store,
            strategy,
            config,
            investors,
        }
    }

    /// Sweep stuck jobs, then claim and process one batch.
    pub async fn run_once(&self) -> Result<QueueRunSummary> {
        let mut summary = QueueRunSummary::new();
        summary.batches = 1;
        let now = Utc::now();

        let sweep = self
            .store
            .reset_stuck_jobs(now - self.config.stuck_after, self.config.max_attempts)
            .await
            .context("resetting stuck jobs")?;
        summary.stuck_reset = sweep.reset;
        summary.stuck_failed = sweep.failed;
        if sweep.reset > 0 || sweep.failed > 0 {
            warn!(reset = sweep.reset, failed = sweep.failed, "swept stuck queue jobs");
        }

        let jobs = self
            .store
            .claim_jobs(self.config.batch_size, self.config.max_attempts, now)
            .await
            .context("claiming queue jobs")?;
        summary.claimed = jobs.len() as u64;
        if jobs.is_empty() {
            summary.finished_at = Utc::now();
            return Ok(summary);
        }

        let tally = Mutex::new(summary);
        futures::stream::iter(jobs)
            .for_each_concurrent(self.config.concurrency.max(1), |job| {
                let tally = &tally;
                async move {
                    let result = self.process(&job).await;
                    let mut summary = tally.lock().await;
                    match result {
                        Ok(JobResult::Completed(matches)) => {
                            summary.completed += 1;
                            summary.matches_written += matches as u64;
                        }
                        Ok(JobResult::Retried) => summary.retried += 1,
                        Ok(JobResult::Failed) => summary.failed += 1,
                        Err(err) => {
                            warn!(job = %job.id, error = %format!("{err:#}"), "queue bookkeeping failed");
                            summary.bookkeeping_errors += 1;
                        }
                    }
                }
            })
            .await;

        let mut summary = tally.into_inner();
        summary.finished_at = Utc::now();
        info!(
            claimed = summary.claimed,
            completed = summary.completed,
            retried = summary.retried,
            failed = summary.failed,
            "queue batch finished"
        );
        Ok(summary)
    }

    async fn process(&self, job: &QueueJob) -> Result<JobResult> {
        let span = info_span!("queue_job", job = %job.id, startup = %job.startup_id, attempt = job.attempts);
        self.process_job(job).instrument(span).await
    }

    async fn process_job(&self, job: &QueueJob) -> Result<JobResult> {
        let startup = match self.store.startup(job.startup_id).await {
            Ok(Some(startup)) => startup,
            Ok(None) => {
                let error = format!("startup {} not found", job.startup_id);
                warn!(%error, "failing queue job");
                self.store.fail_job(job.id, &error, Utc::now()).await?;
                return Ok(JobResult::Failed);
            }
            Err(err) => return self.record_failure(job, err).await,
        };

        match self.rebuild(&startup).await {
            Ok(matches) => {
                self.store.complete_job(job.id, Utc::now()).await?;
                Ok(JobResult::Completed(matches))
            }
            Err(err) => self.record_failure(job, err).await,
        }
    }

    async fn rebuild(&self, startup: &Startup) -> Result<usize> {
        let investors = self.investors.get(self.store.as_ref()).await?;
        rebuild_startup(self.store.as_ref(), self.strategy.as_ref(), startup, &investors).await
    }

    async fn record_failure(&self, job: &QueueJob, err: anyhow::Error) -> Result<JobResult> {
        let error = format!("{err:#}");
        let now = Utc::now();
        match failure_transition(job.attempts, &self.config, now) {
            FailureTransition::Retry { run_after } => {
                warn!(%error, %run_after, "queue job will be retried");
                self.store.retry_job(job.id, &error, run_after).await?;
                Ok(JobResult::Retried)
            }
            FailureTransition::Fail => {
                warn!(%error, attempts = job.attempts, "queue job failed permanently");
                self.store.fail_job(job.id, &error, now).await?;
                Ok(JobResult::Failed)
            }
        }
    }

    /// Process batches until `shutdown` resolves. Checked between batches; an
    /// empty or failed batch waits one poll interval.
    pub async fn run_until<F>(&self, shutdown: F) -> Result<QueueRunSummary>
    where
        F: Future<Output = ()>,
    {
        let mut total = QueueRunSummary::new();
        tokio::pin!(shutdown);
        loop {
            let pause = match self.run_once().await {
                Ok(batch) => {
                    total.absorb(&batch);
                    if batch.claimed == 0 {
                        self.config.poll_interval
                    } else {
                        Duration::ZERO
                    }
                }
                Err(err) => {
                    warn!(error = %format!("{err:#}"), "queue batch failed; polling again");
                    total.batch_errors += 1;
                    self.config.poll_interval
                }
            };
            tokio::select! {
                biased;
                _ = &mut shutdown => {
                    info!("queue worker stopping");
                    break;
                }
                _ = tokio::time::sleep(pause) => {}
            }
        }
        total.finished_at = Utc::now();
        Ok(total)
    }

    /// Poll until Ctrl-C.
    pub async fn run(&self) -> Result<QueueRunSummary> {
        self.run_until(async {
            if let Err(err) = tokio::signal::ctrl_c().await {
                warn!(error = %err, "could not listen for ctrl-c");
                std::future::pending::<()>().await;
            }
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use hotmatch_core::{JobStatus, StartupStatus};
    use hotmatch_scoring::{RuleSet, WeightedMatchScorer};

    use super::*;
    use crate::memory::MemoryStore;

    fn strategy() -> Arc<dyn MatchStrategy> {
        Arc::new(WeightedMatchScorer::canonical(Arc::new(
            RuleSet::builtin().expect("rules"),
        )))
    }

    fn fixed_now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, 19, 12, 0, 0).unwrap()
    }

    #[test]
    fn retries_back_off_then_fail_at_the_limit() {
        let config = QueueConfig::default();
        let now = fixed_now();
        assert_eq!(
            failure_transition(1, &config, now),
            FailureTransition::Retry {
                run_after: now + chrono::Duration::seconds(30)
            }
        );
        assert_eq!(
            failure_transition(2, &config, now),
            FailureTransition::Retry {
                run_after: now + chrono::Duration::seconds(60)
            }
        );
        assert_eq!(failure_transition(3, &config, now), FailureTransition::Fail);
        assert_eq!(failure_transition(7, &config, now), FailureTransition::Fail);
    }

    #[test]
    fn backoff_is_capped() {
        let config = QueueConfig {
            max_attempts: 20,
            ..QueueConfig::default()
        };
        let now = fixed_now();
        assert_eq!(
            failure_transition(12, &config, now),
            FailureTransition::Retry {
                run_after: now + chrono::Duration::minutes(10)
            }
        );
    }

    async fn store_with_startup() -> (Arc<MemoryStore>, Uuid) {
        let store = Arc::new(MemoryStore::new());
        let mut startup = Startup::new(Uuid::from_u128(1), "Lumen Health");
        startup.sectors = vec!["ai".into()];
        startup.stage = Some(1);
        startup.status = StartupStatus::Approved;
        store.add_startup(startup).await;
        let mut investor = Investor::new(Uuid::from_u128(100), "Seed Fund");
        investor.sectors = vec!["ai".into()];
        investor.stage = vec!["seed".into()];
        store.add_investor(investor).await;
        (store, Uuid::from_u128(1))
    }

    #[tokio::test]
    async fn processes_a_job_to_completion() {
        let (store, startup) = store_with_startup().await;
        store.enqueue(startup, Utc::now()).await.expect("enqueue");

        let worker = QueueWorker::new(store.clone(), strategy(), QueueConfig::default());
        let summary = worker.run_once().await.expect("run");
        assert_eq!(summary.claimed, 1);
        assert_eq!(summary.completed, 1);
        assert!(summary.matches_written >= 1);

        let jobs = store.jobs().await;
        assert_eq!(jobs[0].status, JobStatus::Completed);
        assert!(jobs[0].completed_at.is_some());
    }

    #[tokio::test]
    async fn write_failures_are_retried_then_failed() {
        let (store, startup) = store_with_startup().await;
        store.fail_writes_for(startup).await;
        store.enqueue(startup, Utc::now()).await.expect("enqueue");
        let worker = QueueWorker::new(store.clone(), strategy(), QueueConfig::default());

        let first = worker.run_once().await.expect("first");
        assert_eq!(first.retried, 1);
        let job = store.jobs().await.remove(0);
        assert_eq!(job.status, JobStatus::Pending);
        assert!(job.run_after > Utc::now());
        assert!(job.last_error.as_deref().is_some_and(|e| e.contains("simulated")));

        // Not due yet.
        assert_eq!(worker.run_once().await.expect("early").claimed, 0);

        for _ in 0..2 {
            let due = Utc::now() - chrono::Duration::seconds(1);
            let job = store.jobs().await.remove(0);
            store.retry_job(job.id, "forced due", due).await.expect("make due");
            worker.run_once().await.expect("attempt");
        }
        let job = store.jobs().await.remove(0);
        assert_eq!(job.attempts, 3);
        assert_eq!(job.status, JobStatus::Failed);
    }

    #[tokio::test]
    async fn missing_startup_fails_immediately() {
        let store = Arc::new(MemoryStore::new());
        store.enqueue(Uuid::from_u128(404), Utc::now()).await.expect("enqueue");
        let worker = QueueWorker::new(store.clone(), strategy(), QueueConfig::default());
        let summary = worker.run_once().await.expect("run");
        assert_eq!(summary.failed, 1);
        let job = store.jobs().await.remove(0);
        assert_eq!(job.status, JobStatus::Failed);
        assert_eq!(job.attempts, 1);
    }

    #[tokio::test]
    async fn stuck_jobs_are_reset_before_claiming() {
        let (store, startup) = store_with_startup().await;
        let mut stuck = QueueJob::pending(startup, Utc::now() - chrono::Duration::minutes(30));
        stuck.status = JobStatus::Processing;
        stuck.attempts = 1;
        stuck.started_at = Some(Utc::now() - chrono::Duration::minutes(6));
        store.add_job(stuck).await;

        let worker = QueueWorker::new(store.clone(), strategy(), QueueConfig::default());
        let summary = worker.run_once().await.expect("run");
        assert_eq!(summary.stuck_reset, 1);
        assert_eq!(summary.completed, 1);
        assert_eq!(store.jobs().await[0].attempts, 2);
    }

    #[tokio::test]
    async fn stuck_jobs_out_of_attempts_are_failed_not_reclaimed() {
        let (store, startup) = store_with_startup().await;
        let mut stuck = QueueJob::pending(startup, Utc::now() - chrono::Duration::minutes(30));
        stuck.status = JobStatus::Processing;
        stuck.attempts = MAX_ATTEMPTS;
        stuck.started_at = Some(Utc::now() - chrono::Duration::minutes(6));
        store.add_job(stuck).await;

        let worker = QueueWorker::new(store.clone(), strategy(), QueueConfig::default());
        let summary = worker.run_once().await.expect("run");
        assert_eq!((summary.stuck_reset, summary.stuck_failed), (0, 1));
        assert_eq!(summary.claimed, 0);

        let job = store.jobs().await.remove(0);
        assert_eq!(job.status, JobStatus::Failed);
        assert_eq!(job.attempts, MAX_ATTEMPTS);
        assert_eq!(job.last_error.as_deref(), Some(crate::store::STUCK_AT_MAX_ATTEMPTS));

        assert_eq!(worker.run_once().await.expect("again").claimed, 0);
    }

    #[tokio::test]
    async fn concurrent_workers_drain_the_batch() {
        let store = Arc::new(MemoryStore::new());
        for i in 1..=6u128 {
            let mut startup = Startup::new(Uuid::from_u128(i), format!("s{i}"));
            startup.status = StartupStatus::Approved;
            store.add_startup(startup).await;
            store.enqueue(Uuid::from_u128(i), Utc::now()).await.expect("enqueue");
        }
        let config = QueueConfig {
            concurrency: 3,
            batch_size: 4,
            ..QueueConfig::default()
        };
        let worker = QueueWorker::new(store.clone(), strategy(), config);
        let first = worker.run_once().await.expect("first");
        assert_eq!(first.completed, 4);
        let stats = store.queue_stats().await.expect("stats");
        assert_eq!((stats.pending, stats.completed), (2, 4));
    }

    #[tokio::test]
    async fn run_until_stops_after_the_current_batch() {
        let (store, startup) = store_with_startup().await;
        store.enqueue(startup, Utc::now()).await.expect("enqueue");
        let worker = QueueWorker::new(store.clone(), strategy(), QueueConfig::default());
        let total = worker.run_until(async {}).await.expect("run");
        assert_eq!(total.batches, 1);
        assert_eq!(total.completed, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn run_until_keeps_polling_after_a_failed_claim() {
        let (store, startup) = store_with_startup().await;
        store.enqueue(startup, Utc::now()).await.expect("enqueue");
        store.fail_next_claims(1).await;
        let worker = QueueWorker::new(store.clone(), strategy(), QueueConfig::default());

        let total = worker
            .run_until(tokio::time::sleep(Duration::from_secs(7)))
            .await
            .expect("worker survives");
        assert_eq!(total.batch_errors, 1);
        assert_eq!(total.completed, 1);
        assert_eq!(store.jobs().await[0].status, JobStatus::Completed);
    }

    #[tokio::test(start_paused = true)]
    async fn investor_cache_reloads_after_ttl() {
        let store = MemoryStore::new();
        store.add_investor(Investor::new(Uuid::from_u128(1), "first")).await;
        let cache = InvestorCache::new(Duration::from_secs(600));
        assert_eq!(cache.get(&store).await.expect("load").len(), 1);

        store.add_investor(Investor::new(Uuid::from_u128(2), "second")).await;
        tokio::time::advance(Duration::from_secs(300)).await;
        assert_eq!(cache.get(&store).await.expect("cached").len(), 1);

        tokio::time::advance(Duration::from_secs(301)).await;
        assert_eq!(cache.get(&store).await.expect("reloaded").len(), 2);
    }
}
