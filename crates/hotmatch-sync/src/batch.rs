//! Paged enumerate-transform-write loop shared by the rescoring and enrichment jobs.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::reports::RunSummary;

pub const DEFAULT_BATCH_SIZE: i64 = 500;

/// What happened to one row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RowOutcome {
    Updated,
    Unchanged,
    /// Nothing to do for this row; reported as unchanged but not counted
    /// against [`BatchRunner::limit`].
    NotDue,
    /// Malformed or unusable input; nothing written.
    Skipped(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RowFailure {
    pub id: Uuid,
    pub error: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BatchSummary {
    pub job: String,
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub scanned: u64,
    pub updated: u64,
    pub unchanged: u64,
    pub skipped: u64,
    pub failed: u64,
    pub failures: Vec<RowFailure>,
}

impl BatchSummary {
    fn new(job: &str, run_id: Uuid) -> Self {
        let now = Utc::now();
        Self {
            job: job.to_string(),
            run_id,
            started_at: now,
            finished_at: now,
            scanned: 0,
            updated: 0,
            unchanged: 0,
            skipped: 0,
            failed: 0,
            failures: Vec::new(),
        }
    }

    /// An empty summary for jobs that do their own walking.
    pub fn started(job: &str) -> Self {
        Self::new(job, Uuid::new_v4())
    }

    fn record(&mut self, id: Uuid, outcome: Result<RowOutcome>) {
        self.scanned += 1;
        match outcome {
            Ok(RowOutcome::Updated) => self.updated += 1,
            Ok(RowOutcome::Unchanged | RowOutcome::NotDue) => self.unchanged += 1,
            Ok(RowOutcome::Skipped(reason)) => {
                info!(%id, reason = %reason, "row skipped");
                self.skipped += 1;
            }
            Err(err) => {
                warn!(%id, error = %format!("{err:#}"), "row failed");
                self.failed += 1;
                self.failures.push(RowFailure {
                    id,
                    error: format!("{err:#}"),
                });
            }
        }
    }
}

impl RunSummary for BatchSummary {
    fn job(&self) -> &str {
        &self.job
    }

    fn run_id(&self) -> Uuid {
        self.run_id
    }

    fn finished_at(&self) -> DateTime<Utc> {
        self.finished_at
    }

    fn headline(&self) -> String {
        format!(
            "{}: scanned={} updated={} unchanged={} skipped={} failed={}",
            self.job, self.scanned, self.updated, self.unchanged, self.skipped, self.failed
        )
    }

    fn markdown_body(&self) -> String {
        let mut out = format!(
            "| scanned | updated | unchanged | skipped | failed |\n|---|---|---|---|---|\n| {} | {} | {} | {} | {} |\n",
            self.scanned, self.updated, self.unchanged, self.skipped, self.failed
        );
        if !self.failures.is_empty() {
            out.push_str("\n## Failures\n");
            for failure in &self.failures {
                out.push_str(&format!("- `{}`: {}\n", failure.id, failure.error));
            }
        }
        out
    }
}

/// One table-walking job. `apply` errors are counted as row failures, never fatal.
#[async_trait]
pub trait BatchJob: Send + Sync {
    type Row: Send + Sync;

    fn name(&self) -> &'static str;
    fn row_id(&self, row: &Self::Row) -> Uuid;
    async fn load_page(&self, offset: i64, limit: i64) -> Result<Vec<Self::Row>>;
    async fn apply(&self, row: Self::Row) -> Result<RowOutcome>;
}

#[derive(Debug, Clone, Copy)]
pub struct BatchRunner {
    pub page_size: i64,
    /// Stop after this many rows have been worked on. `NotDue` rows are free.
    pub limit: Option<u64>,
}

impl Default for BatchRunner {
    fn default() -> Self {
        Self {
            page_size: DEFAULT_BATCH_SIZE,
            limit: None,
        }
    }
}

impl BatchRunner {
    pub fn new(page_size: i64) -> Self {
        Self {
            page_size: page_size.max(1),
            limit: None,
        }
    }

    pub fn with_limit(mut self, limit: Option<u64>) -> Self {
        self.limit = limit;
        self
    }

    /// Walks the job's table with offset paging. Rows inserted or deleted
    /// concurrently can shift pages, so a row may be seen twice or missed.
    pub async fn run<J: BatchJob>(&self, job: &J) -> Result<BatchSummary> {
        let run_id = Uuid::new_v4();
        let span = info_span!("batch", job = job.name(), %run_id);
        async {
            let mut summary = BatchSummary::new(job.name(), run_id);
            let mut offset = 0i64;
            let mut attempted = 0u64;
            'pages: loop {
                let page = job
                    .load_page(offset, self.page_size)
                    .await
                    .with_context(|| format!("{}: loading rows at offset {offset}", job.name()))?;
                let page_len = page.len() as i64;
                for row in page {
                    if self.limit.is_some_and(|limit| attempted >= limit) {
                        break 'pages;
                    }
                    let id = job.row_id(&row);
                    let outcome = job.apply(row).await;
                    if !matches!(outcome, Ok(RowOutcome::NotDue)) {
                        attempted += 1;
                    }
                    summary.record(id, outcome);
                }
                if page_len < self.page_size {
                    break;
                }
                offset += page_len;
            }
            summary.finished_at = Utc::now();
            info!(
                scanned = summary.scanned,
                updated = summary.updated,
                skipped = summary.skipped,
                failed = summary.failed,
                "batch finished"
            );
            Ok(summary)
        }
        .instrument(span)
        .await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use anyhow::bail;

    use super::*;

    struct Numbers {
        rows: Vec<u128>,
        pages_loaded: Mutex<Vec<i64>>,
    }

    #[async_trait]
    impl BatchJob for Numbers {
        type Row = u128;

        fn name(&self) -> &'static str {
            "numbers"
        }

        fn row_id(&self, row: &u128) -> Uuid {
            Uuid::from_u128(*row)
        }

        async fn load_page(&self, offset: i64, limit: i64) -> Result<Vec<u128>> {
            self.pages_loaded.lock().expect("lock").push(offset);
            Ok(self
                .rows
                .iter()
                .skip(offset as usize)
                .take(limit as usize)
                .copied()
                .collect())
        }

        async fn apply(&self, row: u128) -> Result<RowOutcome> {
            match row % 4 {
                0 => bail!("row {row} exploded"),
                1 => Ok(RowOutcome::Updated),
                2 => Ok(RowOutcome::Unchanged),
                _ => Ok(RowOutcome::Skipped("odd".into())),
            }
        }
    }

    fn job(n: u128) -> Numbers {
        Numbers {
            rows: (1..=n).collect(),
            pages_loaded: Mutex::new(Vec::new()),
        }
    }

    #[tokio::test]
    async fn failures_are_counted_and_the_walk_continues() {
        let job = job(10);
        let summary = BatchRunner::new(3).run(&job).await.expect("run");
        assert_eq!(summary.scanned, 10);
        assert_eq!(summary.updated, 3);
        assert_eq!(summary.unchanged, 3);
        assert_eq!(summary.skipped, 2);
        assert_eq!(summary.failed, 2);
        assert_eq!(summary.failures[0].id, Uuid::from_u128(4));
        assert!(summary.failures[0].error.contains("exploded"));
        assert_eq!(*job.pages_loaded.lock().expect("lock"), vec![0, 3, 6, 9]);
    }

    #[tokio::test]
    async fn exact_multiple_needs_one_empty_page() {
        let job = job(6);
        let summary = BatchRunner::new(3).run(&job).await.expect("run");
        assert_eq!(summary.scanned, 6);
        assert_eq!(*job.pages_loaded.lock().expect("lock"), vec![0, 3, 6]);
    }

    #[tokio::test]
    async fn limit_caps_rows_scanned() {
        let job = job(10);
        let summary = BatchRunner::new(4)
            .with_limit(Some(5))
            .run(&job)
            .await
            .expect("run");
        assert_eq!(summary.scanned, 5);
        assert_eq!(summary.headline(), "numbers: scanned=5 updated=2 unchanged=1 skipped=1 failed=1");
    }

    struct Backlog;

    #[async_trait]
    impl BatchJob for Backlog {
        type Row = u128;

        fn name(&self) -> &'static str {
            "backlog"
        }

        fn row_id(&self, row: &u128) -> Uuid {
            Uuid::from_u128(*row)
        }

        async fn load_page(&self, offset: i64, limit: i64) -> Result<Vec<u128>> {
            Ok((1..=10u128).skip(offset as usize).take(limit as usize).collect())
        }

        async fn apply(&self, row: u128) -> Result<RowOutcome> {
            Ok(if row <= 4 { RowOutcome::NotDue } else { RowOutcome::Updated })
        }
    }

    #[tokio::test]
    async fn rows_with_nothing_to_do_do_not_use_up_the_limit() {
        let summary = BatchRunner::new(3)
            .with_limit(Some(3))
            .run(&Backlog)
            .await
            .expect("run");
        assert_eq!((summary.scanned, summary.updated, summary.unchanged), (7, 3, 4));
    }
}
