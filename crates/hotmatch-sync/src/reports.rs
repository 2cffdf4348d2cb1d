//! Run reports: `reports/<run_id>/summary.md` and `summary.json`.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::fs;
use uuid::Uuid;

/// A job result that can be written as a run report.
pub trait RunSummary: Serialize {
    fn job(&self) -> &str;
    fn run_id(&self) -> Uuid;
    fn finished_at(&self) -> DateTime<Utc>;
    /// One line of counts, printed by the CLI.
    fn headline(&self) -> String;
    fn markdown_body(&self) -> String;
}

#[derive(Debug, Serialize)]
struct ReportEnvelope<'a, S: Serialize> {
    job: &'a str,
    run_id: Uuid,
    finished_at: DateTime<Utc>,
    headline: String,
    summary: &'a S,
}

/// The listing view of a written report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportEntry {
    pub job: String,
    pub run_id: Uuid,
    pub finished_at: DateTime<Utc>,
    pub headline: String,
}

pub async fn write_report<S: RunSummary>(reports_root: &Path, summary: &S) -> Result<PathBuf> {
    let dir = reports_root.join(summary.run_id().to_string());
    fs::create_dir_all(&dir)
        .await
        .with_context(|| format!("creating {}", dir.display()))?;

    let markdown = format!(
        "# {} run\n\n- Run ID: `{}`\n- Finished: {}\n- Summary: {}\n\n{}",
        summary.job(),
        summary.run_id(),
        summary.finished_at().to_rfc3339(),
        summary.headline(),
        summary.markdown_body()
    );
    fs::write(dir.join("summary.md"), markdown)
        .await
        .context("writing summary.md")?;

    let envelope = ReportEnvelope {
        job: summary.job(),
        run_id: summary.run_id(),
        finished_at: summary.finished_at(),
        headline: summary.headline(),
        summary,
    };
    let json = serde_json::to_vec_pretty(&envelope).context("serializing run summary")?;
    fs::write(dir.join("summary.json"), json)
        .await
        .context("writing summary.json")?;
    Ok(dir)
}

/// Most recent reports first. A missing reports directory yields an empty list;
/// run directories without a readable `summary.json` are ignored.
pub fn latest_reports(reports_root: &Path, limit: usize) -> Result<Vec<ReportEntry>> {
    if !reports_root.exists() {
        return Ok(Vec::new());
    }
    let mut entries = Vec::new();
    for dir in std::fs::read_dir(reports_root)
        .with_context(|| format!("reading {}", reports_root.display()))?
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().map(|ft| ft.is_dir()).unwrap_or(false))
    {
        let path = dir.path().join("summary.json");
        let Ok(text) = std::fs::read_to_string(&path) else {
            continue;
        };
        if let Ok(entry) = serde_json::from_str::<ReportEntry>(&text) {
            entries.push(entry);
        }
    }
    entries.sort_by(|a, b| b.finished_at.cmp(&a.finished_at));
    entries.truncate(limit);
    Ok(entries)
}

pub fn report_markdown(reports_root: &Path, runs: usize) -> Result<String> {
    let entries = latest_reports(reports_root, runs.max(1))?;
    let mut lines = vec!["# Hot Match runs".to_string(), String::new()];
    if entries.is_empty() {
        lines.push("No runs recorded.".to_string());
    }
    for entry in entries {
        lines.push(format!("## {} `{}`", entry.job, entry.run_id));
        lines.push(format!("- finished: {}", entry.finished_at.to_rfc3339()));
        lines.push(format!("- {}", entry.headline));
        lines.push(format!(
            "- report: `{}`",
            reports_root.join(entry.run_id.to_string()).join("summary.md").display()
        ));
        lines.push(String::new());
    }
    Ok(lines.join("\n"))
}
