//! LLM enrichment of investor and startup profiles.
//!
//! Each row costs one completion call. The reply is reduced to a JSON object
//! and only fields the model actually filled are merged; existing data is never
//! blanked. Calls are paced by the client's spacing bucket and never retried
//! here. A transport or API error counts as a row failure, an unusable reply as
//! a skip.

use std::sync::Arc;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::Utc;
use hotmatch_core::{Investor, Startup};
use hotmatch_discovery::parse_funding_amount;
use hotmatch_fetch::{extract_json_object, CompletionRequest, LlmClient};
use hotmatch_scoring::RuleSet;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use tracing::warn;
use uuid::Uuid;

use crate::batch::{BatchJob, RowOutcome};
use crate::store::{HotMatchStore, StartupFilter};

const INVESTOR_SYSTEM: &str = "You are a venture capital research expert. Provide accurate, \
up-to-date information about VCs and investors. Format responses as valid JSON.";

const STARTUP_SYSTEM: &str = "You are a startup analyst. Describe companies factually and \
conservatively. Format responses as valid JSON.";

pub fn investor_request(investor: &Investor) -> CompletionRequest {
    let firm = investor.firm.as_deref().unwrap_or("unknown firm");
    let prompt = format!(
        r#"Research the investor "{name}" ({firm}) and return a JSON object with these fields:
{{
  "notable_investments": [{{"company": "name", "stage": "Seed", "year": 2021}}],
  "sector_focus": ["AI", "Fintech"],
  "stage_focus": ["Seed", "Series A"],
  "check_size_min": 0.5,
  "check_size_max": 5,
  "portfolio_companies": 120,
  "successful_exits": 12,
  "active_fund_size": "$500M",
  "investment_thesis": "one or two sentences",
  "partners": ["partner name"],
  "leads_rounds": true,
  "investment_pace_per_year": 25
}}
Check sizes are in millions of USD. Use null or omit any field you are not confident about."#,
        name = investor.name,
    );
    CompletionRequest::new(prompt).with_system(INVESTOR_SYSTEM)
}

pub fn startup_request(startup: &Startup) -> CompletionRequest {
    let mut known = vec![format!("Name: {}", startup.name)];
    for (label, value) in [
        ("Tagline", startup.tagline.as_deref()),
        ("Website", startup.website.as_deref()),
        ("Pitch", startup.pitch.as_deref()),
        ("Description", startup.description.as_deref()),
    ] {
        if let Some(value) = value.filter(|v| !v.trim().is_empty()) {
            known.push(format!("{label}: {value}"));
        }
    }
    let prompt = format!(
        r#"{known}

Return a JSON object describing this startup:
{{
  "description": "two or three sentences",
  "sectors": ["AI", "Healthcare"],
  "stage": "Seed",
  "location": "City, Country",
  "team_size": 8,
  "has_revenue": false,
  "has_customers": true,
  "is_launched": true
}}
Use null for anything you cannot infer from the information above."#,
        known = known.join("\n"),
    );
    CompletionRequest::new(prompt).with_system(STARTUP_SYSTEM)
}

/// Investor fields as the model tends to return them: numbers as strings,
/// objects where a string was asked for and the reverse.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct InvestorFacts {
    #[serde(deserialize_with = "null_as_empty")]
    notable_investments: Vec<Value>,
    #[serde(deserialize_with = "null_as_empty")]
    sector_focus: Vec<String>,
    #[serde(deserialize_with = "null_as_empty")]
    stage_focus: Vec<String>,
    check_size_min: Option<Value>,
    check_size_max: Option<Value>,
    portfolio_companies: Option<Value>,
    successful_exits: Option<Value>,
    active_fund_size: Option<Value>,
    investment_thesis: Option<String>,
    #[serde(deserialize_with = "null_as_empty")]
    partners: Vec<Value>,
    leads_rounds: Option<bool>,
    investment_pace_per_year: Option<Value>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct StartupFacts {
    description: Option<String>,
    #[serde(deserialize_with = "null_as_empty")]
    sectors: Vec<String>,
    stage: Option<String>,
    location: Option<String>,
    team_size: Option<Value>,
    has_revenue: Option<bool>,
    has_customers: Option<bool>,
    is_launched: Option<bool>,
}

fn null_as_empty<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

fn text(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty() && !v.eq_ignore_ascii_case("null") && !v.eq_ignore_ascii_case("unknown"))
}

fn labels(values: Vec<String>) -> Vec<String> {
    values.into_iter().filter_map(|v| text(Some(v))).collect()
}

fn number(value: &Value) -> Option<f64> {
    let parsed = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().trim_start_matches('$').parse().ok(),
        _ => None,
    };
    parsed.filter(|n| n.is_finite() && *n >= 0.0)
}

fn count(value: &Value) -> Option<i32> {
    number(value).and_then(|n| i32::try_from(n.round() as i64).ok())
}

/// Millions for bare numbers; strings with a unit ("$2M") are read as written.
fn usd_from_millions(value: &Value) -> Option<f64> {
    let usd = match value {
        Value::String(s) if s.chars().any(|c| c.is_alphabetic()) => parse_funding_amount(s),
        other => number(other).map(|m| m * 1e6),
    };
    usd.filter(|usd| *usd > 0.0)
}

/// `{"company": "Stripe", "stage": "Seed", "year": 2011}` becomes "Stripe (Seed, 2011)".
fn investment_label(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => text(Some(s.clone())),
        Value::Object(map) => {
            let company = map.get("company").and_then(Value::as_str).and_then(|c| text(Some(c.to_string())))?;
            let details: Vec<String> = ["stage", "year"]
                .iter()
                .filter_map(|key| match map.get(*key)? {
                    Value::String(s) => text(Some(s.clone())),
                    Value::Number(n) => Some(n.to_string()),
                    _ => None,
                })
                .collect();
            if details.is_empty() {
                Some(company)
            } else {
                Some(format!("{company} ({})", details.join(", ")))
            }
        }
        _ => None,
    }
}

fn partner_name(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => text(Some(s.clone())),
        Value::Object(map) => map.get("name").and_then(Value::as_str).and_then(|n| text(Some(n.to_string()))),
        _ => None,
    }
}

/// Merge non-empty facts into `investor`. Returns whether anything changed.
pub fn merge_investor_facts(investor: &mut Investor, facts: InvestorFacts) -> bool {
    let before = investor.clone();

    let notable: Vec<String> = facts.notable_investments.iter().filter_map(investment_label).collect();
    if !notable.is_empty() {
        investor.notable_investments = notable;
    }
    let sectors = labels(facts.sector_focus);
    if !sectors.is_empty() {
        investor.sectors = sectors;
    }
    let stages = labels(facts.stage_focus);
    if !stages.is_empty() {
        investor.stage = stages;
    }
    if let Some(min) = facts.check_size_min.as_ref().and_then(usd_from_millions) {
        investor.check_size_min = Some(min);
    }
    if let Some(max) = facts.check_size_max.as_ref().and_then(usd_from_millions) {
        investor.check_size_max = Some(max);
    }
    if let Some(total) = facts.portfolio_companies.as_ref().and_then(count).filter(|n| *n > 0) {
        investor.total_investments = Some(total);
    }
    if let Some(exits) = facts.successful_exits.as_ref().and_then(count) {
        investor.successful_exits = Some(exits);
    }
    if let Some(fund) = facts.active_fund_size.as_ref().and_then(usd_from_millions) {
        investor.active_fund_size = Some(fund);
    }
    if let Some(thesis) = text(facts.investment_thesis) {
        investor.investment_thesis = Some(thesis);
    }
    let partners: Vec<String> = facts.partners.iter().filter_map(partner_name).collect();
    if !partners.is_empty() {
        investor.partners = partners;
    }
    if let Some(leads) = facts.leads_rounds {
        investor.leads_rounds = Some(leads);
    }
    if let Some(pace) = facts.investment_pace_per_year.as_ref().and_then(count).filter(|n| *n > 0) {
        investor.investment_pace_per_year = Some(pace);
    }

    *investor != before
}

/// Fill gaps in `startup`. Traction flags are only ever switched on.
pub fn merge_startup_facts(startup: &mut Startup, facts: StartupFacts, rules: &RuleSet) -> bool {
    let before = startup.clone();

    if startup.description.as_deref().map_or(true, |d| d.trim().is_empty()) {
        if let Some(description) = text(facts.description) {
            startup.description = Some(description);
        }
    }
    if startup.sectors.is_empty() {
        startup.sectors = labels(facts.sectors);
    }
    if startup.stage.is_none() {
        startup.stage = text(facts.stage).and_then(|label| rules.stages().ordinal(&label));
    }
    if startup.location.is_none() {
        startup.location = text(facts.location);
    }
    if startup.team_size.is_none() {
        startup.team_size = facts.team_size.as_ref().and_then(count).filter(|n| *n > 0);
    }
    startup.has_revenue |= facts.has_revenue == Some(true);
    startup.has_customers |= facts.has_customers == Some(true);
    startup.is_launched |= facts.is_launched == Some(true);

    *startup != before
}

fn needs_enrichment(startup: &Startup) -> bool {
    startup.description.as_deref().map_or(true, |d| d.trim().is_empty())
        || startup.sectors.is_empty()
        || startup.location.is_none()
}

async fn ask<T: DeserializeOwned>(
    llm: &dyn LlmClient,
    request: &CompletionRequest,
    row: Uuid,
) -> Result<Option<T>> {
    let reply = llm.complete(request).await.map_err(|err| {
        warn!(%row, model = llm.model(), disposition = ?err.disposition(), error = %err, "llm call failed");
        anyhow!(err)
    })?;
    let Some(value) = extract_json_object(&reply) else {
        return Ok(None);
    };
    Ok(serde_json::from_value(value).ok())
}

pub struct InvestorEnrichJob {
    store: Arc<dyn HotMatchStore>,
    llm: Arc<dyn LlmClient>,
    /// Re-enrich investors that already have `last_enriched_at`.
    pub refresh: bool,
}

impl InvestorEnrichJob {
    pub fn new(store: Arc<dyn HotMatchStore>, llm: Arc<dyn LlmClient>) -> Self {
        Self {
            store,
            llm,
            refresh: false,
        }
    }
}

#[async_trait]
impl BatchJob for InvestorEnrichJob {
    type Row = Investor;

    fn name(&self) -> &'static str {
        "enrich-investors"
    }

    fn row_id(&self, row: &Investor) -> Uuid {
        row.id
    }

    async fn load_page(&self, offset: i64, limit: i64) -> Result<Vec<Investor>> {
        self.store.investors_page(offset, limit).await
    }

    async fn apply(&self, mut investor: Investor) -> Result<RowOutcome> {
        if investor.last_enriched_at.is_some() && !self.refresh {
            return Ok(RowOutcome::NotDue);
        }
        let request = investor_request(&investor);
        let Some(facts) = ask::<InvestorFacts>(self.llm.as_ref(), &request, investor.id).await? else {
            return Ok(RowOutcome::Skipped("reply was not a JSON object".into()));
        };
        let changed = merge_investor_facts(&mut investor, facts);
        investor.last_enriched_at = Some(Utc::now());
        self.store.update_investor_profile(&investor).await?;
        Ok(if changed {
            RowOutcome::Updated
        } else {
            RowOutcome::Unchanged
        })
    }
}

pub struct StartupEnrichJob {
    store: Arc<dyn HotMatchStore>,
    llm: Arc<dyn LlmClient>,
    rules: Arc<RuleSet>,
}

impl StartupEnrichJob {
    pub fn new(store: Arc<dyn HotMatchStore>, llm: Arc<dyn LlmClient>, rules: Arc<RuleSet>) -> Self {
        Self { store, llm, rules }
    }
}

#[async_trait]
impl BatchJob for StartupEnrichJob {
    type Row = Startup;

    fn name(&self) -> &'static str {
        "enrich-startups"
    }

    fn row_id(&self, row: &Startup) -> Uuid {
        row.id
    }

    async fn load_page(&self, offset: i64, limit: i64) -> Result<Vec<Startup>> {
        self.store.startups_page(StartupFilter::All, offset, limit).await
    }

    async fn apply(&self, mut startup: Startup) -> Result<RowOutcome> {
        if !needs_enrichment(&startup) {
            return Ok(RowOutcome::NotDue);
        }
        let request = startup_request(&startup);
        let Some(facts) = ask::<StartupFacts>(self.llm.as_ref(), &request, startup.id).await? else {
            return Ok(RowOutcome::Skipped("reply was not a JSON object".into()));
        };
        if !merge_startup_facts(&mut startup, facts, &self.rules) {
            return Ok(RowOutcome::Unchanged);
        }
        startup.updated_at = Utc::now();
        self.store.update_startup_profile(&startup).await?;
        Ok(RowOutcome::Updated)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::Mutex;

    use hotmatch_fetch::LlmError;
    use serde_json::json;

    use super::*;
    use crate::batch::BatchRunner;
    use crate::memory::MemoryStore;

    struct ScriptedLlm {
        replies: Mutex<VecDeque<Result<String, LlmError>>>,
        prompts: Mutex<Vec<String>>,
    }

    impl ScriptedLlm {
        fn new(replies: Vec<Result<String, LlmError>>) -> Arc<Self> {
            Arc::new(Self {
                replies: Mutex::new(replies.into()),
                prompts: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl LlmClient for ScriptedLlm {
        fn model(&self) -> &str {
            "scripted"
        }

        async fn complete(&self, request: &CompletionRequest) -> Result<String, LlmError> {
            self.prompts.lock().expect("lock").push(request.prompt.clone());
            self.replies
                .lock()
                .expect("lock")
                .pop_front()
                .unwrap_or(Err(LlmError::EmptyResponse))
        }
    }

    fn facts(value: serde_json::Value) -> InvestorFacts {
        serde_json::from_value(value).expect("facts")
    }

    #[test]
    fn investor_merge_converts_units_and_keeps_existing_values() {
        let mut investor = Investor::new(Uuid::nil(), "Ada");
        investor.investment_thesis = Some("Backs infra founders.".into());
        investor.sectors = vec!["devtools".into()];

        let changed = merge_investor_facts(
            &mut investor,
            facts(json!({
                "notable_investments": [
                    {"company": "Stripe", "stage": "Seed", "year": 2011},
                    "Figma",
                    {"stage": "A"}
                ],
                "sector_focus": null,
                "stage_focus": ["Seed", "null"],
                "check_size_min": 0.5,
                "check_size_max": "5",
                "portfolio_companies": 140,
                "active_fund_size": "$1.2B",
                "investment_thesis": "",
                "partners": [{"name": "Grace"}, "Linus"]
            })),
        );

        assert!(changed);
        assert_eq!(investor.notable_investments, vec!["Stripe (Seed, 2011)", "Figma"]);
        assert_eq!(investor.sectors, vec!["devtools"]);
        assert_eq!(investor.stage, vec!["Seed"]);
        assert_eq!(investor.check_size_min, Some(500_000.0));
        assert_eq!(investor.check_size_max, Some(5_000_000.0));
        assert_eq!(investor.total_investments, Some(140));
        assert_eq!(investor.active_fund_size, Some(1_200_000_000.0));
        assert_eq!(investor.investment_thesis.as_deref(), Some("Backs infra founders."));
        assert_eq!(investor.partners, vec!["Grace", "Linus"]);
    }

    #[test]
    fn bare_fund_size_is_millions() {
        let mut investor = Investor::new(Uuid::nil(), "Ada");
        merge_investor_facts(&mut investor, facts(json!({"active_fund_size": 250})));
        assert_eq!(investor.active_fund_size, Some(250_000_000.0));
        assert!(!merge_investor_facts(&mut investor, facts(json!({}))));
    }

    #[test]
    fn startup_merge_only_fills_gaps() {
        let rules = RuleSet::builtin().expect("rules");
        let mut startup = Startup::new(Uuid::nil(), "Gridline");
        startup.location = Some("Austin, TX".into());
        startup.has_customers = true;
        let facts: StartupFacts = serde_json::from_value(json!({
            "description": "Grid-scale battery analytics.",
            "sectors": ["Energy", "AI"],
            "stage": "Series A",
            "location": "Berlin",
            "team_size": "12",
            "has_revenue": true,
            "has_customers": false
        }))
        .expect("facts");

        assert!(merge_startup_facts(&mut startup, facts, &rules));
        assert_eq!(startup.description.as_deref(), Some("Grid-scale battery analytics."));
        assert_eq!(startup.stage, Some(2));
        assert_eq!(startup.location.as_deref(), Some("Austin, TX"));
        assert_eq!(startup.team_size, Some(12));
        assert!(startup.has_revenue && startup.has_customers);
    }

    #[tokio::test]
    async fn investor_job_counts_failures_and_skips() {
        let store = Arc::new(MemoryStore::new());
        for i in 1..=3 {
            store.add_investor(Investor::new(Uuid::from_u128(i), format!("Investor {i}"))).await;
        }
        let mut done = Investor::new(Uuid::from_u128(4), "Already Done");
        done.last_enriched_at = Some(Utc::now());
        store.add_investor(done).await;

        let llm = ScriptedLlm::new(vec![
            Ok("```json\n{\"sector_focus\": [\"Fintech\"], \"successful_exits\": 4}\n```".into()),
            Err(LlmError::Status {
                status: 429,
                body: "slow down".into(),
            }),
            Ok("I could not find anything.".into()),
        ]);
        let job = InvestorEnrichJob::new(store.clone(), llm.clone());
        let summary = BatchRunner::default().run(&job).await.expect("run");

        assert_eq!(summary.scanned, 4);
        assert_eq!(summary.updated, 1);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.skipped, 1);
        assert_eq!(summary.unchanged, 1);
        assert_eq!(llm.prompts.lock().expect("lock").len(), 3);

        let first = &store.investors().await[0];
        assert_eq!(first.sectors, vec!["Fintech"]);
        assert_eq!(first.successful_exits, Some(4));
        assert!(first.last_enriched_at.is_some());
    }

    #[tokio::test]
    async fn limited_runs_move_on_to_unenriched_investors() {
        let store = Arc::new(MemoryStore::new());
        for i in 1..=5 {
            store.add_investor(Investor::new(Uuid::from_u128(i), format!("Investor {i}"))).await;
        }
        let reply = || Ok(r#"{"sector_focus": ["Climate"]}"#.to_string());
        let llm = ScriptedLlm::new(vec![reply(), reply(), reply(), reply()]);
        let job = InvestorEnrichJob::new(store.clone(), llm.clone());
        let runner = BatchRunner::default().with_limit(Some(2));

        let first = runner.run(&job).await.expect("first");
        let second = runner.run(&job).await.expect("second");
        assert_eq!((first.updated, second.updated), (2, 2));
        assert_eq!(second.unchanged, 2);

        let enriched: Vec<u128> = store
            .investors()
            .await
            .iter()
            .filter(|i| i.last_enriched_at.is_some())
            .map(|i| i.id.as_u128())
            .collect();
        assert_eq!(enriched, vec![1, 2, 3, 4]);
        assert_eq!(llm.prompts.lock().expect("lock").len(), 4);
    }

    #[tokio::test]
    async fn startup_job_leaves_complete_profiles_alone() {
        let store = Arc::new(MemoryStore::new());
        let mut complete = Startup::new(Uuid::from_u128(1), "Complete");
        complete.description = Some("Already described.".into());
        complete.sectors = vec!["fintech".into()];
        complete.location = Some("Lisbon".into());
        store.add_startup(complete).await;
        store.add_startup(Startup::new(Uuid::from_u128(2), "Sparse")).await;

        let llm = ScriptedLlm::new(vec![Ok(
            r#"{"description": "Payroll for clinics.", "sectors": ["Healthcare"], "location": "Porto"}"#.into(),
        )]);
        let rules = Arc::new(RuleSet::builtin().expect("rules"));
        let job = StartupEnrichJob::new(store.clone(), llm.clone(), rules);
        let summary = BatchRunner::default().run(&job).await.expect("run");

        assert_eq!((summary.updated, summary.unchanged), (1, 1));
        let prompts = llm.prompts.lock().expect("lock").clone();
        assert_eq!(prompts.len(), 1);
        assert!(prompts[0].starts_with("Name: Sparse"));
        let sparse = &store.startups().await[1];
        assert_eq!(sparse.location.as_deref(), Some("Porto"));
    }
}
