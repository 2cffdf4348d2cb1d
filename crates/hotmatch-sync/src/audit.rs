//! Distribution audit over stored scores.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use hotmatch_core::QueueStats;
use hotmatch_scoring::{GodHistogram, MatchAudit, TierCounts, BAND_TOLERANCE_POINTS};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::reports::RunSummary;
use crate::store::HotMatchStore;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditSummary {
    pub run_id: Uuid,
    pub finished_at: DateTime<Utc>,
    pub matches: MatchAudit,
    pub god: GodHistogram,
    pub investor_tiers: TierCounts,
    pub queue: QueueStats,
}

pub async fn run_audit(store: &dyn HotMatchStore) -> Result<AuditSummary> {
    let matches = MatchAudit::from_matches(store.match_scores().await.context("loading match scores")?);
    let god = GodHistogram::from_scores(store.god_scores().await.context("loading god scores")?);
    let investor_tiers =
        TierCounts::from_tiers(store.investor_tiers().await.context("loading investor tiers")?);
    let queue = store.queue_stats().await.context("loading queue stats")?;
    Ok(AuditSummary {
        run_id: Uuid::new_v4(),
        finished_at: Utc::now(),
        matches,
        god,
        investor_tiers,
        queue,
    })
}

fn investor_count(tiers: &TierCounts) -> u64 {
    tiers.elite + tiers.strong + tiers.solid + tiers.emerging + tiers.unscored
}

impl RunSummary for AuditSummary {
    fn job(&self) -> &str {
        "audit"
    }

    fn run_id(&self) -> Uuid {
        self.run_id
    }

    fn finished_at(&self) -> DateTime<Utc> {
        self.finished_at
    }

    fn headline(&self) -> String {
        format!(
            "audit: matches={} mean_match={:.1} startups_scored={} mean_god={:.1} investors={} queue_pending={}",
            self.matches.distribution.total,
            self.matches.distribution.mean,
            self.god.total,
            self.god.mean,
            investor_count(&self.investor_tiers),
            self.queue.pending
        )
    }

    fn markdown_body(&self) -> String {
        let dist = &self.matches.distribution;
        let mut out = String::from("## Match scores\n\n| band | count | share | target |\n|---|---|---|---|\n");
        for band in &dist.bands {
            out.push_str(&format!(
                "| {} | {} | {:.1}% | {:.1}% |\n",
                band.label,
                band.count,
                band.share,
                band.target
            ));
        }
        let verdict = if dist.total == 0 {
            "no matches"
        } else if dist.within_tolerance(BAND_TOLERANCE_POINTS) {
            "within tolerance"
        } else {
            "outside tolerance"
        };
        out.push_str(&format!(
            "\nMax deviation from target: {:.1} points ({verdict}).\n",
            dist.max_deviation()
        ));
        out.push_str(&format!(
            "Confidence: high={} medium={} low={}\n",
            self.matches.confidence.high, self.matches.confidence.medium, self.matches.confidence.low
        ));

        out.push_str("\n## GOD scores\n\n| decile | count |\n|---|---|\n");
        for (i, count) in self.god.deciles.iter().enumerate() {
            let low = i * 10;
            let high = if i == 9 { 100 } else { low + 9 };
            out.push_str(&format!("| {low}-{high} | {count} |\n"));
        }

        let tiers = &self.investor_tiers;
        out.push_str(&format!(
            "\n## Investor tiers\n\nelite={} strong={} solid={} emerging={} unscored={}\n",
            tiers.elite, tiers.strong, tiers.solid, tiers.emerging, tiers.unscored
        ));
        out.push_str(&format!(
            "\n## Queue\n\npending={} processing={} completed={} failed={}\n",
            self.queue.pending, self.queue.processing, self.queue.completed, self.queue.failed
        ));
        out
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use hotmatch_core::{Investor, InvestorTier, Startup};
    use hotmatch_scoring::{RuleSet, WeightedMatchScorer};

    use super::*;
    use crate::memory::MemoryStore;
    use crate::rebuild::rebuild_startup;

    #[tokio::test]
    async fn audit_collects_every_statistic() {
        let store = MemoryStore::new();
        let rules = Arc::new(RuleSet::builtin().expect("rules"));
        let mut startup = Startup::new(Uuid::from_u128(1), "Lumen Health");
        startup.sectors = vec!["ai".into()];
        startup.stage = Some(2);
        startup.total_god_score = Some(60);
        startup.has_revenue = true;
        store.add_startup(startup.clone()).await;

        let mut investor = Investor::new(Uuid::from_u128(10), "Series A Partners");
        investor.sectors = vec!["ai".into(), "enterprise".into()];
        investor.stage = vec!["series a".into()];
        investor.investor_tier = Some(InvestorTier::Solid);
        store.add_investor(investor.clone()).await;
        store.add_investor(Investor::new(Uuid::from_u128(11), "Unscored")).await;

        let scorer = WeightedMatchScorer::canonical(rules);
        rebuild_startup(&store, &scorer, &startup, &[investor]).await.expect("rebuild");
        store.enqueue(startup.id, Utc::now()).await.expect("enqueue");

        let audit = run_audit(&store).await.expect("audit");
        assert_eq!(audit.matches.distribution.total, 1);
        assert_eq!(audit.matches.confidence.high, 1);
        assert_eq!(audit.god.total, 1);
        assert_eq!(audit.god.deciles[6], 1);
        assert_eq!((audit.investor_tiers.solid, audit.investor_tiers.unscored), (1, 1));
        assert_eq!(audit.queue.pending, 1);

        let body = audit.markdown_body();
        assert!(body.contains("## GOD scores"));
        assert!(audit.headline().starts_with("audit: matches=1"));
    }
}
