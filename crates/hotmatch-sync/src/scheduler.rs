//! Cron jobs for unattended runs: feed discovery and nightly rescoring.

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::{info, warn};

use crate::Pipeline;

/// `None` when `HOTMATCH_SCHEDULER_ENABLED` is off.
pub async fn maybe_build_scheduler(pipeline: Arc<Pipeline>) -> Result<Option<JobScheduler>> {
    if !pipeline.config().scheduler_enabled {
        return Ok(None);
    }

    let sched = JobScheduler::new().await.context("creating scheduler")?;

    let discover_cron = pipeline.config().discover_cron.clone();
    let discover = {
        let pipeline = pipeline.clone();
        Job::new_async(discover_cron.as_str(), move |_uuid, _l| {
            let pipeline = pipeline.clone();
            Box::pin(async move {
                info!("scheduled discovery starting");
                if let Err(err) = pipeline.discover_and_import().await {
                    warn!(error = %format!("{err:#}"), "scheduled discovery failed");
                }
            })
        })
        .with_context(|| format!("creating scheduler job for cron {discover_cron}"))?
    };
    sched.add(discover).await.context("adding discovery job")?;

    let rescore_cron = pipeline.config().rescore_cron.clone();
    let rescore = {
        let pipeline = pipeline.clone();
        Job::new_async(rescore_cron.as_str(), move |_uuid, _l| {
            let pipeline = pipeline.clone();
            Box::pin(async move {
                info!("scheduled rescoring starting");
                if let Err(err) = pipeline.rescore_all().await {
                    warn!(error = %format!("{err:#}"), "scheduled rescoring failed");
                }
            })
        })
        .with_context(|| format!("creating scheduler job for cron {rescore_cron}"))?
    };
    sched.add(rescore).await.context("adding rescoring job")?;

    Ok(Some(sched))
}

/// Start the scheduler and block until Ctrl-C.
pub async fn run_scheduler(pipeline: Arc<Pipeline>) -> Result<()> {
    let Some(mut sched) = maybe_build_scheduler(pipeline).await? else {
        warn!("scheduler disabled; set HOTMATCH_SCHEDULER_ENABLED=true");
        return Ok(());
    };
    sched.start().await.context("starting scheduler")?;
    info!("scheduler running; ctrl-c to stop");
    tokio::signal::ctrl_c().await.context("waiting for ctrl-c")?;
    sched.shutdown().await.context("stopping scheduler")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use hotmatch_scoring::RuleSet;

    use super::*;
    use crate::config::HotMatchConfig;
    use crate::memory::MemoryStore;

    fn pipeline(vars: &[(&str, &str)]) -> Arc<Pipeline> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        let config = HotMatchConfig::from_lookup(|name| vars.get(name).cloned()).expect("config");
        Arc::new(Pipeline::new(
            config,
            Arc::new(MemoryStore::new()),
            Arc::new(RuleSet::builtin().expect("rules")),
        ))
    }

    #[tokio::test]
    async fn disabled_by_default() {
        assert!(maybe_build_scheduler(pipeline(&[])).await.expect("build").is_none());
    }

    #[tokio::test]
    async fn builds_both_jobs_when_enabled() {
        let sched = maybe_build_scheduler(pipeline(&[("HOTMATCH_SCHEDULER_ENABLED", "true")]))
            .await
            .expect("build");
        assert!(sched.is_some());
    }

    #[tokio::test]
    async fn bad_cron_is_reported() {
        let err = maybe_build_scheduler(pipeline(&[
            ("HOTMATCH_SCHEDULER_ENABLED", "true"),
            ("HOTMATCH_DISCOVER_CRON", "every tuesday"),
        ]))
        .await
        .err()
        .expect("invalid cron");
        assert!(format!("{err:#}").contains("every tuesday"));
    }
}
