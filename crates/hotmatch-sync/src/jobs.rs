//! Rescoring jobs: GOD score, investor score/tier and smell tests.

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use hotmatch_core::{Investor, Startup};
use hotmatch_scoring::{evaluate_smell_tests, GodScorer, InvestorScorer};
use uuid::Uuid;

use crate::batch::{BatchJob, RowOutcome};
use crate::store::{HotMatchStore, StartupFilter};

pub struct GodRescoreJob {
    store: Arc<dyn HotMatchStore>,
    scorer: GodScorer,
}

impl GodRescoreJob {
    pub fn new(store: Arc<dyn HotMatchStore>, scorer: GodScorer) -> Self {
        Self { store, scorer }
    }
}

#[async_trait]
impl BatchJob for GodRescoreJob {
    type Row = Startup;

    fn name(&self) -> &'static str {
        "score-god"
    }

    fn row_id(&self, row: &Startup) -> Uuid {
        row.id
    }

    async fn load_page(&self, offset: i64, limit: i64) -> Result<Vec<Startup>> {
        self.store.startups_page(StartupFilter::All, offset, limit).await
    }

    async fn apply(&self, startup: Startup) -> Result<RowOutcome> {
        let score = self.scorer.score(&startup);
        let unchanged = startup.total_god_score == Some(score.total)
            && startup.god_breakdown == Some(score.breakdown)
            && startup.god_formula_version.as_deref() == Some(score.formula_version.as_str());
        if unchanged {
            return Ok(RowOutcome::Unchanged);
        }
        self.store.save_god_score(startup.id, &score).await?;
        Ok(RowOutcome::Updated)
    }
}

pub struct InvestorScoreJob {
    store: Arc<dyn HotMatchStore>,
    scorer: InvestorScorer,
}

impl InvestorScoreJob {
    pub fn new(store: Arc<dyn HotMatchStore>, scorer: InvestorScorer) -> Self {
        Self { store, scorer }
    }
}

#[async_trait]
impl BatchJob for InvestorScoreJob {
    type Row = Investor;

    fn name(&self) -> &'static str {
        "score-investors"
    }

    fn row_id(&self, row: &Investor) -> Uuid {
        row.id
    }

    async fn load_page(&self, offset: i64, limit: i64) -> Result<Vec<Investor>> {
        self.store.investors_page(offset, limit).await
    }

    async fn apply(&self, investor: Investor) -> Result<RowOutcome> {
        let score = self.scorer.score(&investor);
        let same_score = investor
            .investor_score
            .is_some_and(|old| (old - score.total).abs() < 0.05);
        if same_score && investor.investor_tier == Some(score.tier) {
            return Ok(RowOutcome::Unchanged);
        }
        self.store.save_investor_score(investor.id, &score).await?;
        Ok(RowOutcome::Updated)
    }
}

pub struct SmellTestJob {
    store: Arc<dyn HotMatchStore>,
}

impl SmellTestJob {
    pub fn new(store: Arc<dyn HotMatchStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl BatchJob for SmellTestJob {
    type Row = Startup;

    fn name(&self) -> &'static str {
        "smell-tests"
    }

    fn row_id(&self, row: &Startup) -> Uuid {
        row.id
    }

    async fn load_page(&self, offset: i64, limit: i64) -> Result<Vec<Startup>> {
        self.store.startups_page(StartupFilter::All, offset, limit).await
    }

    async fn apply(&self, startup: Startup) -> Result<RowOutcome> {
        let tests = evaluate_smell_tests(&startup);
        if startup.smell_tests == Some(tests) {
            return Ok(RowOutcome::Unchanged);
        }
        self.store.save_smell_tests(startup.id, &tests).await?;
        Ok(RowOutcome::Updated)
    }
}

#[cfg(test)]
mod tests {
    use hotmatch_core::InvestorTier;
    use hotmatch_scoring::RuleSet;

    use super::*;
    use crate::batch::BatchRunner;
    use crate::memory::MemoryStore;

    fn rules() -> Arc<RuleSet> {
        Arc::new(RuleSet::builtin().expect("rules"))
    }

    async fn seeded(n: u128) -> Arc<MemoryStore> {
        let store = Arc::new(MemoryStore::new());
        for i in 1..=n {
            let mut startup = Startup::new(Uuid::from_u128(i), format!("startup {i}"));
            startup.has_revenue = i % 2 == 0;
            startup.sectors = vec!["fintech".into()];
            store.add_startup(startup).await;
        }
        store
    }

    #[tokio::test]
    async fn god_rescore_is_idempotent() {
        let store = seeded(5).await;
        let job = GodRescoreJob::new(store.clone(), GodScorer::new(rules()));
        let first = BatchRunner::new(2).run(&job).await.expect("first run");
        assert_eq!(first.updated, 5);

        let second = BatchRunner::new(2).run(&job).await.expect("second run");
        assert_eq!(second.updated, 0);
        assert_eq!(second.unchanged, 5);
        assert!(store
            .startups()
            .await
            .iter()
            .all(|s| s.god_formula_version.as_deref() == Some("god-v7")));
    }

    #[tokio::test]
    async fn write_failures_do_not_stop_rescoring() {
        let store = seeded(4).await;
        store.fail_writes_for(Uuid::from_u128(2)).await;
        let job = GodRescoreJob::new(store.clone(), GodScorer::new(rules()));
        let summary = BatchRunner::default().run(&job).await.expect("run");
        assert_eq!(summary.updated, 3);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.failures[0].id, Uuid::from_u128(2));
    }

    #[tokio::test]
    async fn investor_scores_and_tiers_are_written() {
        let store = Arc::new(MemoryStore::new());
        store
            .add_investor(Investor::new(Uuid::from_u128(1), "Unknown Angel"))
            .await;
        let mut sequoia = Investor::new(Uuid::from_u128(2), "Roelof");
        sequoia.firm = Some("Sequoia Capital".into());
        store.add_investor(sequoia).await;

        let rules = rules();
        let job = InvestorScoreJob::new(store.clone(), InvestorScorer::new(rules.known_firms().clone()));
        let summary = BatchRunner::default().run(&job).await.expect("run");
        assert_eq!(summary.updated, 2);

        let investors = store.investors().await;
        assert_eq!(investors[0].investor_tier, Some(InvestorTier::Emerging));
        assert_eq!(investors[1].investor_tier, Some(InvestorTier::Strong));

        let again = BatchRunner::default().run(&job).await.expect("rerun");
        assert_eq!(again.unchanged, 2);
    }

    #[tokio::test]
    async fn smell_tests_are_refreshed_once() {
        let store = seeded(3).await;
        let job = SmellTestJob::new(store.clone());
        let first = BatchRunner::default().run(&job).await.expect("run");
        assert_eq!(first.scanned, 3);
        let second = BatchRunner::default().run(&job).await.expect("rerun");
        assert_eq!(second.updated, 0);
    }
}
