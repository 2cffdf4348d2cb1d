//! Promote discovered startups into `startup_uploads` as pending rows.

use std::collections::HashSet;

use anyhow::{Context, Result};
use chrono::Utc;
use hotmatch_core::{DiscoveredStartup, Startup, StartupStatus};
use hotmatch_discovery::{parse_funding_amount, NameIndex};
use hotmatch_scoring::RuleSet;
use tracing::{info, warn};
use uuid::Uuid;

use crate::batch::{BatchSummary, RowFailure};
use crate::store::HotMatchStore;

pub const IMPORT_PAGE: i64 = 200;

pub fn startup_from_discovery(found: &DiscoveredStartup, rules: &RuleSet) -> Startup {
    let mut startup = Startup::new(Uuid::new_v4(), found.name.trim());
    startup.description = found.description.clone();
    startup.website = found.website.clone();
    startup.sectors = found.sectors.clone();
    startup.stage = found
        .funding_stage
        .as_deref()
        .and_then(|label| rules.stages().ordinal(label));
    startup.raise_amount = found.funding_amount.as_deref().and_then(parse_funding_amount);
    startup.status = StartupStatus::Pending;
    startup
}

/// Imports every un-imported discovery. Names already present in
/// `startup_uploads` are marked imported and counted as skipped.
pub async fn import_discovered(store: &dyn HotMatchStore, rules: &RuleSet) -> Result<BatchSummary> {
    let mut summary = BatchSummary::started("import-discovered");
    let mut existing = NameIndex::new(store.startup_names().await.context("loading startup names")?);

    let mut failed_ids = HashSet::new();
    loop {
        let page: Vec<DiscoveredStartup> = store
            .unimported_discoveries(IMPORT_PAGE + failed_ids.len() as i64)
            .await
            .context("loading discovered startups")?
            .into_iter()
            .filter(|found| !failed_ids.contains(&found.id))
            .collect();
        if page.is_empty() {
            break;
        }
        for found in page {
            summary.scanned += 1;
            if existing.contains(&found.name) {
                store.mark_imported(found.id).await?;
                summary.skipped += 1;
                continue;
            }
            let startup = startup_from_discovery(&found, rules);
            let result = async {
                store.insert_startup(&startup).await?;
                store.mark_imported(found.id).await
            }
            .await;
            match result {
                Ok(()) => {
                    existing.insert(&found.name);
                    summary.updated += 1;
                }
                Err(err) => {
                    warn!(id = %found.id, error = %format!("{err:#}"), "import failed");
                    failed_ids.insert(found.id);
                    summary.failed += 1;
                    summary.failures.push(RowFailure {
                        id: found.id,
                        error: format!("{err:#}"),
                    });
                }
            }
        }
    }

    summary.finished_at = Utc::now();
    info!(imported = summary.updated, skipped = summary.skipped, failed = summary.failed, "import finished");
    Ok(summary)
}
