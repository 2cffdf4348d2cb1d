//! Match rebuild: score one startup against every active investor and
//! replace its stored matches.

use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use hotmatch_core::{Investor, MatchRecord, Startup};
use hotmatch_scoring::MatchStrategy;
use tracing::debug;
use uuid::Uuid;

use crate::batch::{BatchJob, RowOutcome};
use crate::store::{HotMatchStore, StartupFilter};

pub const MIN_MATCH_SCORE: u8 = 35;
pub const MAX_MATCHES_PER_STARTUP: usize = 100;

/// Matches at or above [`MIN_MATCH_SCORE`], best first, ties broken by investor id.
pub fn select_matches(
    strategy: &dyn MatchStrategy,
    startup: &Startup,
    investors: &[Investor],
) -> Vec<MatchRecord> {
    let mut records: Vec<MatchRecord> = investors
        .iter()
        .map(|investor| {
            strategy
                .score(startup, investor)
                .into_record(startup.id, investor.id)
        })
        .filter(|record| record.match_score >= MIN_MATCH_SCORE)
        .collect();
    records.sort_by(|a, b| {
        b.match_score
            .cmp(&a.match_score)
            .then(a.investor_id.cmp(&b.investor_id))
    });
    records.truncate(MAX_MATCHES_PER_STARTUP);
    records
}

/// Returns the number of matches written.
pub async fn rebuild_startup(
    store: &dyn HotMatchStore,
    strategy: &dyn MatchStrategy,
    startup: &Startup,
    investors: &[Investor],
) -> Result<usize> {
    let records = select_matches(strategy, startup, investors);
    store
        .replace_matches(startup.id, &records)
        .await
        .with_context(|| format!("writing matches for startup {}", startup.id))?;
    debug!(startup = %startup.id, matches = records.len(), "matches rebuilt");
    Ok(records.len())
}

/// Full rebuild over approved startups. The investor list is loaded once per run.
pub struct RebuildJob {
    store: Arc<dyn HotMatchStore>,
    strategy: Arc<dyn MatchStrategy>,
    investors: Vec<Investor>,
}

impl RebuildJob {
    pub async fn load(store: Arc<dyn HotMatchStore>, strategy: Arc<dyn MatchStrategy>) -> Result<Self> {
        let investors = store
            .active_investors()
            .await
            .context("loading active investors")?;
        Ok(Self {
            store,
            strategy,
            investors,
        })
    }
}

#[async_trait]
impl BatchJob for RebuildJob {
    type Row = Startup;

    fn name(&self) -> &'static str {
        "rebuild"
    }

    fn row_id(&self, row: &Startup) -> Uuid {
        row.id
    }

    async fn load_page(&self, offset: i64, limit: i64) -> Result<Vec<Startup>> {
        self.store
            .startups_page(StartupFilter::Approved, offset, limit)
            .await
    }

    async fn apply(&self, startup: Startup) -> Result<RowOutcome> {
        rebuild_startup(
            self.store.as_ref(),
            self.strategy.as_ref(),
            &startup,
            &self.investors,
        )
        .await?;
        Ok(RowOutcome::Updated)
    }
}

#[cfg(test)]
mod tests {
    use hotmatch_core::StartupStatus;
    use hotmatch_scoring::{RuleSet, WeightedMatchScorer};

    use super::*;
    use crate::batch::BatchRunner;
    use crate::memory::MemoryStore;

    fn strategy() -> Arc<dyn MatchStrategy> {
        let rules = Arc::new(RuleSet::builtin().expect("rules"));
        Arc::new(WeightedMatchScorer::canonical(rules))
    }

    fn ai_startup(id: u128) -> Startup {
        let mut startup = Startup::new(Uuid::from_u128(id), format!("ai startup {id}"));
        startup.sectors = vec!["ai".into()];
        startup.stage = Some(2);
        startup.total_god_score = Some(60);
        startup.has_revenue = true;
        startup.status = StartupStatus::Approved;
        startup
    }

    fn investor(id: u128, sectors: &[&str], stages: &[&str]) -> Investor {
        let mut investor = Investor::new(Uuid::from_u128(id), format!("investor {id}"));
        investor.sectors = sectors.iter().map(|s| s.to_string()).collect();
        investor.stage = stages.iter().map(|s| s.to_string()).collect();
        investor
    }

    #[test]
    fn selection_is_sorted_and_thresholded() {
        let investors = vec![
            investor(3, &["ai", "enterprise"], &["series a"]),
            investor(1, &["ai", "enterprise"], &["series a"]),
            investor(2, &["biotech"], &["growth"]),
        ];
        let records = select_matches(strategy().as_ref(), &ai_startup(9), &investors);
        assert!(records.iter().all(|r| r.match_score >= MIN_MATCH_SCORE));
        assert_eq!(records[0].investor_id, Uuid::from_u128(1));
        assert_eq!(records[1].investor_id, Uuid::from_u128(3));
        assert!(records[0].match_score >= 66);
        assert!(records
            .windows(2)
            .all(|pair| pair[0].match_score >= pair[1].match_score));
    }

    #[tokio::test]
    async fn rebuild_twice_yields_the_same_set() {
        let store = Arc::new(MemoryStore::new());
        store.add_startup(ai_startup(1)).await;
        let mut draft = ai_startup(2);
        draft.status = StartupStatus::Pending;
        store.add_startup(draft).await;
        for (id, sectors) in [(10, vec!["ai"]), (11, vec!["fintech"]), (12, vec!["ai", "saas"])] {
            store.add_investor(investor(id, &sectors, &["seed", "series a"])).await;
        }

        let job = RebuildJob::load(store.clone(), strategy()).await.expect("load");
        let first = BatchRunner::default().run(&job).await.expect("first");
        assert_eq!(first.scanned, 1);
        let before: Vec<(Uuid, u8)> = store
            .matches_for_startup(Uuid::from_u128(1), 100)
            .await
            .expect("matches")
            .into_iter()
            .map(|m| (m.investor_id, m.match_score))
            .collect();
        assert!(!before.is_empty());

        BatchRunner::default().run(&job).await.expect("second");
        let after: Vec<(Uuid, u8)> = store
            .matches_for_startup(Uuid::from_u128(1), 100)
            .await
            .expect("matches")
            .into_iter()
            .map(|m| (m.investor_id, m.match_score))
            .collect();
        assert_eq!(before, after);
        assert!(store
            .matches_for_startup(Uuid::from_u128(2), 100)
            .await
            .expect("draft matches")
            .is_empty());
    }
}
