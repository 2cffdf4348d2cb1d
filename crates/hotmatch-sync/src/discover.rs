//! Feed discovery run: fetch each active RSS source, extract startups from
//! recent articles with the LLM and insert the ones not seen before.

use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use hotmatch_core::{RssSource, SourceKind};
use hotmatch_discovery::{
    discovery_request, parse_discovery_response, parse_feed, recent_items, Article, FeedSource,
    NameIndex, MAX_ITEMS_PER_SOURCE,
};
use hotmatch_fetch::LlmClient;
use serde::Serialize;
use tracing::{info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::reports::RunSummary;
use crate::store::HotMatchStore;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SourceOutcome {
    pub source: String,
    pub articles: u64,
    pub extracted: u64,
    pub inserted: u64,
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DiscoverySummary {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub sources: u64,
    pub skipped_sources: u64,
    pub failed_sources: u64,
    pub articles: u64,
    pub extracted: u64,
    pub duplicates: u64,
    pub inserted: u64,
    pub insert_failures: u64,
    pub per_source: Vec<SourceOutcome>,
}

impl RunSummary for DiscoverySummary {
    fn job(&self) -> &str {
        "discover"
    }

    fn run_id(&self) -> Uuid {
        self.run_id
    }

    fn finished_at(&self) -> DateTime<Utc> {
        self.finished_at
    }

    fn headline(&self) -> String {
        format!(
            "discover: sources={} articles={} extracted={} duplicates={} inserted={} failed_sources={}",
            self.sources, self.articles, self.extracted, self.duplicates, self.inserted, self.failed_sources
        )
    }

    fn markdown_body(&self) -> String {
        let mut out = String::from(
            "| source | articles | extracted | inserted | error |\n|---|---|---|---|---|\n",
        );
        for row in &self.per_source {
            out.push_str(&format!(
                "| {} | {} | {} | {} | {} |\n",
                row.source,
                row.articles,
                row.extracted,
                row.inserted,
                row.error.as_deref().unwrap_or("")
            ));
        }
        out
    }
}

pub struct DiscoveryRun {
    store: Arc<dyn HotMatchStore>,
    feeds: Arc<dyn FeedSource>,
    llm: Arc<dyn LlmClient>,
}

impl DiscoveryRun {
    pub fn new(store: Arc<dyn HotMatchStore>, feeds: Arc<dyn FeedSource>, llm: Arc<dyn LlmClient>) -> Self {
        Self { store, feeds, llm }
    }

    /// `now` anchors the recency window.
    pub async fn run(&self, now: DateTime<Utc>) -> Result<DiscoverySummary> {
        let run_id = Uuid::new_v4();
        let mut summary = DiscoverySummary {
            run_id,
            started_at: Utc::now(),
            finished_at: Utc::now(),
            sources: 0,
            skipped_sources: 0,
            failed_sources: 0,
            articles: 0,
            extracted: 0,
            duplicates: 0,
            inserted: 0,
            insert_failures: 0,
            per_source: Vec::new(),
        };

        let sources = self.store.active_sources().await.context("loading rss sources")?;
        let mut known = NameIndex::new(
            self.store
                .discovered_names()
                .await
                .context("loading discovered names")?,
        );
        for name in self.store.startup_names().await.context("loading startup names")? {
            known.insert(&name);
        }

        for source in sources {
            if source.kind == SourceKind::Web {
                info!(source = %source.name, "skipping web source");
                summary.skipped_sources += 1;
                continue;
            }
            summary.sources += 1;
            let span = info_span!("discover_source", source = %source.name, %run_id);
            let outcome = self
                .discover_source(run_id, &source, now, &mut known, &mut summary)
                .instrument(span)
                .await;
            if outcome.error.is_some() {
                summary.failed_sources += 1;
            } else if let Err(err) = self.store.mark_source_scraped(source.id, Utc::now()).await {
                warn!(source = %source.name, error = %format!("{err:#}"), "could not mark source scraped");
            }
            summary.per_source.push(outcome);
        }

        summary.finished_at = Utc::now();
        info!(
            sources = summary.sources,
            inserted = summary.inserted,
            duplicates = summary.duplicates,
            "discovery finished"
        );
        Ok(summary)
    }

    async fn discover_source(
        &self,
        run_id: Uuid,
        source: &RssSource,
        now: DateTime<Utc>,
        known: &mut NameIndex,
        summary: &mut DiscoverySummary,
    ) -> SourceOutcome {
        let mut outcome = SourceOutcome {
            source: source.name.clone(),
            articles: 0,
            extracted: 0,
            inserted: 0,
            error: None,
        };

        let items = match self.feeds.fetch_feed(run_id, source).await {
            Ok(xml) => match parse_feed(&xml) {
                Ok(items) => items,
                Err(err) => {
                    warn!(error = %err, "feed did not parse");
                    outcome.error = Some(err.to_string());
                    return outcome;
                }
            },
            Err(err) => {
                warn!(error = %err, "feed fetch failed");
                outcome.error = Some(err.to_string());
                return outcome;
            }
        };

        let articles: Vec<Article> = recent_items(items, now, MAX_ITEMS_PER_SOURCE)
            .iter()
            .map(Article::from_item)
            .collect();
        outcome.articles = articles.len() as u64;
        summary.articles += outcome.articles;
        if articles.is_empty() {
            return outcome;
        }

        let reply = match self.llm.complete(&discovery_request(&articles)).await {
            Ok(reply) => reply,
            Err(err) => {
                warn!(error = %err, disposition = ?err.disposition(), "extraction call failed");
                outcome.error = Some(err.to_string());
                return outcome;
            }
        };

        let found = parse_discovery_response(&reply, &articles, &source.name, now);
        outcome.extracted = found.len() as u64;
        summary.extracted += outcome.extracted;
        for startup in found {
            if !known.insert(&startup.name) {
                summary.duplicates += 1;
                continue;
            }
            match self.store.insert_discovered(&startup).await {
                Ok(()) => {
                    outcome.inserted += 1;
                    summary.inserted += 1;
                }
                Err(err) => {
                    warn!(name = %startup.name, error = %format!("{err:#}"), "insert failed");
                    summary.insert_failures += 1;
                }
            }
        }
        outcome
    }
}
