//! Hot Match pipelines: batch rescoring, LLM enrichment, match rebuilds, the
//! matching queue worker, feed discovery, audits and run reports.
//!
//! Everything talks to storage through [`HotMatchStore`]; [`PgStore`] backs
//! production and [`MemoryStore`] backs tests. [`Pipeline`] ties a store, the
//! rule set and the runtime configuration together and writes a report for
//! every run.

pub mod audit;
pub mod batch;
pub mod config;
pub mod discover;
pub mod enrich;
pub mod import;
pub mod jobs;
pub mod memory;
pub mod pg;
pub mod queue;
pub mod rebuild;
pub mod reports;
pub mod scheduler;
pub mod store;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use chrono::Utc;
use hotmatch_core::QueueStats;
use hotmatch_fetch::{HttpClientConfig, HttpFetcher, LlmClient, RequestPacer};
use hotmatch_scoring::{GodScorer, InvestorScorer, MatchStrategy, RuleSet, WeightedMatchScorer};
use tracing::info;
use uuid::Uuid;

pub use audit::{run_audit, AuditSummary};
pub use batch::{BatchJob, BatchRunner, BatchSummary, RowFailure, RowOutcome, DEFAULT_BATCH_SIZE};
pub use config::{ConfigError, HotMatchConfig};
pub use discover::{DiscoveryRun, DiscoverySummary};
pub use enrich::{InvestorEnrichJob, StartupEnrichJob};
pub use import::import_discovered;
pub use jobs::{GodRescoreJob, InvestorScoreJob, SmellTestJob};
pub use memory::MemoryStore;
pub use pg::PgStore;
pub use queue::{QueueConfig, QueueRunSummary, QueueWorker, MAX_ATTEMPTS};
pub use rebuild::{rebuild_startup, select_matches, RebuildJob, MAX_MATCHES_PER_STARTUP, MIN_MATCH_SCORE};
pub use reports::{latest_reports, report_markdown, write_report, ReportEntry, RunSummary};
pub use scheduler::{maybe_build_scheduler, run_scheduler};
pub use store::{HotMatchStore, StartupFilter, StuckSweep};

pub const CRATE_NAME: &str = "hotmatch-sync";

/// A store, the rule set and the configuration, shared by every command.
pub struct Pipeline {
    config: HotMatchConfig,
    store: Arc<dyn HotMatchStore>,
    rules: Arc<RuleSet>,
}

impl Pipeline {
    pub fn new(config: HotMatchConfig, store: Arc<dyn HotMatchStore>, rules: Arc<RuleSet>) -> Self {
        Self { config, store, rules }
    }

    /// Connect to Postgres and load rules from the workspace root.
    pub async fn connect(config: HotMatchConfig) -> Result<Self> {
        let url = config.require_database_url()?.to_string();
        let store = PgStore::connect(&url).await?;
        let rules = RuleSet::load(&config.workspace_root).context("loading rules")?;
        info!(rules = rules.fingerprint(), "pipeline ready");
        Ok(Self::new(config, Arc::new(store), Arc::new(rules)))
    }

    pub fn config(&self) -> &HotMatchConfig {
        &self.config
    }

    pub fn store(&self) -> Arc<dyn HotMatchStore> {
        self.store.clone()
    }

    pub fn rules(&self) -> Arc<RuleSet> {
        self.rules.clone()
    }

    pub fn strategy(&self) -> Arc<dyn MatchStrategy> {
        Arc::new(WeightedMatchScorer::canonical(self.rules.clone()))
    }

    fn runner(&self, limit: Option<u64>) -> BatchRunner {
        BatchRunner::new(self.config.batch_size).with_limit(limit)
    }

    fn pacing(&self) -> Arc<RequestPacer> {
        Arc::new(RequestPacer::every(self.config.llm_delay))
    }

    async fn finish<S: RunSummary>(&self, summary: S) -> Result<S> {
        let dir = write_report(&self.config.reports_dir, &summary).await?;
        info!(report = %dir.display(), "{}", summary.headline());
        Ok(summary)
    }

    pub async fn score_god(&self) -> Result<BatchSummary> {
        let job = GodRescoreJob::new(self.store(), GodScorer::new(self.rules()));
        let summary = self.runner(None).run(&job).await?;
        self.finish(summary).await
    }

    pub async fn score_investors(&self) -> Result<BatchSummary> {
        let job = InvestorScoreJob::new(self.store(), InvestorScorer::new(self.rules.known_firms().clone()));
        let summary = self.runner(None).run(&job).await?;
        self.finish(summary).await
    }

    pub async fn smell_tests(&self) -> Result<BatchSummary> {
        let job = SmellTestJob::new(self.store());
        let summary = self.runner(None).run(&job).await?;
        self.finish(summary).await
    }

    pub async fn enrich_investors(&self, limit: Option<u64>) -> Result<BatchSummary> {
        self.enrich_investors_with(limit, false).await
    }

    /// `refresh` also revisits investors that already carry `last_enriched_at`.
    pub async fn enrich_investors_with(&self, limit: Option<u64>, refresh: bool) -> Result<BatchSummary> {
        let llm = self.config.openai_client()?.with_pacing(self.pacing());
        let mut job = InvestorEnrichJob::new(self.store(), Arc::new(llm));
        job.refresh = refresh;
        let summary = self.runner(limit).run(&job).await?;
        self.finish(summary).await
    }

    pub async fn enrich_startups(&self, limit: Option<u64>) -> Result<BatchSummary> {
        let llm = self.config.openai_client()?.with_pacing(self.pacing());
        let job = StartupEnrichJob::new(self.store(), Arc::new(llm), self.rules());
        let summary = self.runner(limit).run(&job).await?;
        self.finish(summary).await
    }

    /// Rebuild one startup's matches, or every approved startup's.
    pub async fn rebuild(&self, startup: Option<Uuid>) -> Result<BatchSummary> {
        let strategy = self.strategy();
        let Some(id) = startup else {
            let job = RebuildJob::load(self.store(), strategy).await?;
            let summary = self.runner(None).run(&job).await?;
            return self.finish(summary).await;
        };

        let startup = self
            .store
            .startup(id)
            .await?
            .ok_or_else(|| anyhow!("startup {id} not found"))?;
        let investors = self.store.active_investors().await.context("loading active investors")?;
        let mut summary = BatchSummary::started("rebuild");
        summary.scanned = 1;
        let written = rebuild_startup(self.store.as_ref(), strategy.as_ref(), &startup, &investors).await?;
        summary.updated = 1;
        summary.finished_at = Utc::now();
        info!(startup = %id, matches = written, "startup rebuilt");
        self.finish(summary).await
    }

    /// Returns false when the startup already has a live job.
    pub async fn enqueue(&self, startup: Uuid) -> Result<bool> {
        self.store.enqueue(startup, Utc::now()).await
    }

    pub fn queue_worker(&self) -> QueueWorker {
        QueueWorker::new(self.store(), self.strategy(), self.config.queue.clone())
    }

    /// `once` drains a single batch; otherwise poll until Ctrl-C.
    pub async fn run_queue(&self, once: bool) -> Result<QueueRunSummary> {
        let worker = self.queue_worker();
        let summary = if once {
            worker.run_once().await?
        } else {
            worker.run().await?
        };
        self.finish(summary).await
    }

    pub async fn queue_stats(&self) -> Result<QueueStats> {
        self.store.queue_stats().await
    }

    pub async fn discover(&self) -> Result<DiscoverySummary> {
        let llm: Arc<dyn LlmClient> = Arc::new(self.config.anthropic_client()?.with_pacing(self.pacing()));
        let fetcher = HttpFetcher::new(HttpClientConfig {
            timeout: Duration::from_secs(self.config.http_timeout_secs),
            user_agent: Some(self.config.user_agent.clone()),
            ..Default::default()
        })?;
        let run = DiscoveryRun::new(self.store(), Arc::new(fetcher), llm);
        let summary = run.run(Utc::now()).await?;
        self.finish(summary).await
    }

    pub async fn import_discovered(&self) -> Result<BatchSummary> {
        let summary = import_discovered(self.store.as_ref(), &self.rules).await?;
        self.finish(summary).await
    }

    pub async fn audit(&self) -> Result<AuditSummary> {
        let summary = run_audit(self.store.as_ref()).await?;
        self.finish(summary).await
    }

    pub fn report(&self, runs: usize) -> Result<String> {
        report_markdown(&self.config.reports_dir, runs)
    }

    /// Scheduled: discovery followed by import of whatever it found.
    pub async fn discover_and_import(&self) -> Result<()> {
        self.discover().await?;
        self.import_discovered().await?;
        Ok(())
    }

    /// Scheduled: every score, then a full match rebuild.
    pub async fn rescore_all(&self) -> Result<()> {
        self.score_god().await?;
        self.smell_tests().await?;
        self.score_investors().await?;
        self.rebuild(None).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::path::Path;

    use hotmatch_core::{Investor, Startup, StartupStatus};

    use super::*;

    fn pipeline(reports: &Path) -> (Pipeline, Arc<MemoryStore>) {
        let vars: HashMap<String, String> = [(
            "HOTMATCH_REPORTS_DIR".to_string(),
            reports.display().to_string(),
        )]
        .into();
        let config = HotMatchConfig::from_lookup(|name| vars.get(name).cloned()).expect("config");
        let store = Arc::new(MemoryStore::new());
        let pipeline = Pipeline::new(config, store.clone(), Arc::new(RuleSet::builtin().expect("rules")));
        (pipeline, store)
    }

    #[tokio::test]
    async fn rescore_all_writes_a_report_per_job() {
        let dir = tempfile::tempdir().expect("tempdir");
        let (pipeline, store) = pipeline(dir.path());
        let mut startup = Startup::new(Uuid::from_u128(1), "Lumen Health");
        startup.sectors = vec!["ai".into()];
        startup.stage = Some(1);
        startup.status = StartupStatus::Approved;
        store.add_startup(startup).await;
        let mut investor = Investor::new(Uuid::from_u128(2), "Seed Fund");
        investor.sectors = vec!["ai".into()];
        investor.stage = vec!["seed".into()];
        store.add_investor(investor).await;

        pipeline.rescore_all().await.expect("rescore");

        let jobs: Vec<String> = latest_reports(dir.path(), 10)
            .expect("reports")
            .into_iter()
            .map(|entry| entry.job)
            .collect();
        for job in ["score-god", "smell-tests", "score-investors", "rebuild"] {
            assert!(jobs.iter().any(|j| j == job), "missing {job} report");
        }
        assert!(store.startups().await[0].total_god_score.is_some());
        assert!(pipeline.report(10).expect("markdown").contains("## rebuild"));
    }

    #[tokio::test]
    async fn single_rebuild_requires_a_known_startup() {
        let dir = tempfile::tempdir().expect("tempdir");
        let (pipeline, _store) = pipeline(dir.path());
        let err = pipeline.rebuild(Some(Uuid::from_u128(9))).await.expect_err("missing");
        assert!(err.to_string().contains("not found"));
    }

    #[tokio::test]
    async fn enrichment_without_a_key_is_a_config_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let (pipeline, _store) = pipeline(dir.path());
        let err = pipeline.enrich_investors(None).await.expect_err("no key");
        assert!(err.downcast_ref::<ConfigError>().is_some());
    }
}
