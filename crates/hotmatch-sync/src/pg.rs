//! Postgres implementation of `HotMatchStore` using runtime-checked sqlx queries.

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use hotmatch_core::{
    Confidence, DiscoveredStartup, FitAnalysis, GodBreakdown, Investor, InvestorTier, JobStatus,
    MatchRecord, QueueJob, QueueStats, RssSource, SmellTests, SourceKind, Startup, StartupStatus,
};
use hotmatch_scoring::{GodScore, InvestorScore};
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::types::Json;
use sqlx::{PgPool, Postgres, QueryBuilder, Row};
use tracing::info;
use uuid::Uuid;

use crate::store::{HotMatchStore, StartupFilter, StuckSweep, STUCK_AT_MAX_ATTEMPTS};

/// Rows per multi-row match insert.
pub const MATCH_UPSERT_CHUNK: usize = 50;

const STARTUP_COLUMNS: &str = r#"
    id, name, tagline, description, pitch, website, sectors, stage, raise_amount, mrr, arr,
    growth_rate_monthly, customer_count, nrr, has_revenue, has_customers, is_launched, has_demo,
    team_size, has_technical_cofounder, repeat_founders, advisor_count, days_from_idea_to_mvp,
    time_to_first_revenue_months, deployment_frequency, pivot_speed_days, nps_score,
    tam_estimate, location, why_now, contrarian_belief, unfair_advantage, smell_tests,
    total_god_score, god_breakdown, god_formula_version, status, created_at, updated_at
"#;

const INVESTOR_COLUMNS: &str = r#"
    id, name, firm, sectors, stage, check_size_min, check_size_max, partners,
    notable_investments, portfolio_companies, investment_thesis, total_investments,
    successful_exits, investment_pace_per_year, leads_rounds, active_fund_size,
    investor_score, investor_tier, status, last_enriched_at
"#;

const JOB_COLUMNS: &str =
    "id, startup_id, status, attempts, last_error, run_after, started_at, completed_at, created_at";

const DISCOVERED_COLUMNS: &str = r#"
    id, name, website, description, funding_amount, funding_stage, investors_mentioned, sectors,
    article_url, article_title, rss_source, imported_to_startups, discovered_at
"#;

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(8)
            .connect(database_url)
            .await
            .context("connecting to postgres")?;
        Ok(Self { pool })
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("../../migrations")
            .run(&self.pool)
            .await
            .context("running migrations")?;
        info!("migrations applied");
        Ok(())
    }
}

fn small_to_u8(value: Option<i16>, column: &str) -> Result<Option<u8>> {
    value
        .map(|v| u8::try_from(v).with_context(|| format!("{column} out of range: {v}")))
        .transpose()
}

fn startup_from_row(row: &PgRow) -> Result<Startup> {
    let status: String = row.try_get("status")?;
    let smell_tests: Option<Json<SmellTests>> = row.try_get("smell_tests")?;
    let god_breakdown: Option<Json<GodBreakdown>> = row.try_get("god_breakdown")?;
    Ok(Startup {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        tagline: row.try_get("tagline")?,
        description: row.try_get("description")?,
        pitch: row.try_get("pitch")?,
        website: row.try_get("website")?,
        sectors: row.try_get("sectors")?,
        stage: small_to_u8(row.try_get("stage")?, "stage")?,
        raise_amount: row.try_get("raise_amount")?,
        mrr: row.try_get("mrr")?,
        arr: row.try_get("arr")?,
        growth_rate_monthly: row.try_get("growth_rate_monthly")?,
        customer_count: row.try_get("customer_count")?,
        nrr: row.try_get("nrr")?,
        has_revenue: row.try_get("has_revenue")?,
        has_customers: row.try_get("has_customers")?,
        is_launched: row.try_get("is_launched")?,
        has_demo: row.try_get("has_demo")?,
        team_size: row.try_get("team_size")?,
        has_technical_cofounder: row.try_get("has_technical_cofounder")?,
        repeat_founders: row.try_get("repeat_founders")?,
        advisor_count: row.try_get("advisor_count")?,
        days_from_idea_to_mvp: row.try_get("days_from_idea_to_mvp")?,
        time_to_first_revenue_months: row.try_get("time_to_first_revenue_months")?,
        deployment_frequency: row.try_get("deployment_frequency")?,
        pivot_speed_days: row.try_get("pivot_speed_days")?,
        nps_score: row.try_get("nps_score")?,
        tam_estimate: row.try_get("tam_estimate")?,
        location: row.try_get("location")?,
        why_now: row.try_get("why_now")?,
        contrarian_belief: row.try_get("contrarian_belief")?,
        unfair_advantage: row.try_get("unfair_advantage")?,
        smell_tests: smell_tests.map(|j| j.0),
        total_god_score: small_to_u8(row.try_get("total_god_score")?, "total_god_score")?,
        god_breakdown: god_breakdown.map(|j| j.0),
        god_formula_version: row.try_get("god_formula_version")?,
        status: StartupStatus::parse(&status)
            .ok_or_else(|| anyhow!("unknown startup status `{status}`"))?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn investor_from_row(row: &PgRow) -> Result<Investor> {
    let partners: Json<Vec<String>> = row.try_get("partners")?;
    let notable: Json<Vec<String>> = row.try_get("notable_investments")?;
    let portfolio: Json<Vec<String>> = row.try_get("portfolio_companies")?;
    let tier: Option<String> = row.try_get("investor_tier")?;
    let status: String = row.try_get("status")?;
    Ok(Investor {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        firm: row.try_get("firm")?,
        sectors: row.try_get("sectors")?,
        stage: row.try_get("stage")?,
        check_size_min: row.try_get("check_size_min")?,
        check_size_max: row.try_get("check_size_max")?,
        partners: partners.0,
        notable_investments: notable.0,
        portfolio_companies: portfolio.0,
        investment_thesis: row.try_get("investment_thesis")?,
        total_investments: row.try_get("total_investments")?,
        successful_exits: row.try_get("successful_exits")?,
        investment_pace_per_year: row.try_get("investment_pace_per_year")?,
        leads_rounds: row.try_get("leads_rounds")?,
        active_fund_size: row.try_get("active_fund_size")?,
        investor_score: row.try_get("investor_score")?,
        investor_tier: tier.as_deref().and_then(InvestorTier::parse),
        active: status == "active",
        last_enriched_at: row.try_get("last_enriched_at")?,
    })
}

fn match_from_row(row: &PgRow) -> Result<MatchRecord> {
    let score: i16 = row.try_get("match_score")?;
    let confidence: String = row.try_get("confidence_level")?;
    let fit: Json<FitAnalysis> = row.try_get("fit_analysis")?;
    Ok(MatchRecord {
        startup_id: row.try_get("startup_id")?,
        investor_id: row.try_get("investor_id")?,
        match_score: u8::try_from(score).with_context(|| format!("match_score out of range: {score}"))?,
        confidence_level: Confidence::parse(&confidence)
            .ok_or_else(|| anyhow!("unknown confidence `{confidence}`"))?,
        fit_analysis: fit.0,
        status: row.try_get("status")?,
        algorithm_version: row.try_get("algorithm_version")?,
    })
}

fn job_from_row(row: &PgRow) -> Result<QueueJob> {
    let status: String = row.try_get("status")?;
    Ok(QueueJob {
        id: row.try_get("id")?,
        startup_id: row.try_get("startup_id")?,
        status: JobStatus::parse(&status).ok_or_else(|| anyhow!("unknown job status `{status}`"))?,
        attempts: row.try_get("attempts")?,
        last_error: row.try_get("last_error")?,
        run_after: row.try_get("run_after")?,
        started_at: row.try_get("started_at")?,
        completed_at: row.try_get("completed_at")?,
        created_at: row.try_get("created_at")?,
    })
}

fn discovered_from_row(row: &PgRow) -> Result<DiscoveredStartup> {
    Ok(DiscoveredStartup {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        website: row.try_get("website")?,
        description: row.try_get("description")?,
        funding_amount: row.try_get("funding_amount")?,
        funding_stage: row.try_get("funding_stage")?,
        investors_mentioned: row.try_get("investors_mentioned")?,
        sectors: row.try_get("sectors")?,
        article_url: row.try_get("article_url")?,
        article_title: row.try_get("article_title")?,
        rss_source: row.try_get("rss_source")?,
        imported_to_startups: row.try_get("imported_to_startups")?,
        discovered_at: row.try_get("discovered_at")?,
    })
}

#[async_trait]
impl HotMatchStore for PgStore {
    async fn startups_page(&self, filter: StartupFilter, offset: i64, limit: i64) -> Result<Vec<Startup>> {
        let where_clause = match filter {
            StartupFilter::All => "",
            StartupFilter::Approved => "WHERE status = 'approved'",
        };
        let sql = format!(
            "SELECT {STARTUP_COLUMNS} FROM startup_uploads {where_clause} ORDER BY id OFFSET $1 LIMIT $2"
        );
        let rows = sqlx::query(&sql)
            .bind(offset)
            .bind(limit)
            .fetch_all(&self.pool)
            .await
            .context("loading startup page")?;
        rows.iter().map(startup_from_row).collect()
    }

    async fn startup(&self, id: Uuid) -> Result<Option<Startup>> {
        let sql = format!("SELECT {STARTUP_COLUMNS} FROM startup_uploads WHERE id = $1");
        let row = sqlx::query(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .with_context(|| format!("loading startup {id}"))?;
        row.as_ref().map(startup_from_row).transpose()
    }

    async fn startup_names(&self) -> Result<Vec<String>> {
        let rows = sqlx::query("SELECT name FROM startup_uploads")
            .fetch_all(&self.pool)
            .await
            .context("loading startup names")?;
        rows.iter()
            .map(|row| row.try_get::<String, _>("name").map_err(anyhow::Error::from))
            .collect()
    }

    async fn insert_startup(&self, startup: &Startup) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO startup_uploads
                (id, name, tagline, description, website, sectors, stage, raise_amount,
                 location, status, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $11)
            "#,
        )
        .bind(startup.id)
        .bind(&startup.name)
        .bind(&startup.tagline)
        .bind(&startup.description)
        .bind(&startup.website)
        .bind(&startup.sectors)
        .bind(startup.stage.map(i16::from))
        .bind(startup.raise_amount)
        .bind(&startup.location)
        .bind(startup.status.as_str())
        .bind(startup.created_at)
        .execute(&self.pool)
        .await
        .with_context(|| format!("inserting startup {}", startup.name))?;
        Ok(())
    }

    async fn update_startup_profile(&self, startup: &Startup) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE startup_uploads
               SET description = $2, sectors = $3, stage = $4, location = $5, team_size = $6,
                   has_revenue = $7, has_customers = $8, is_launched = $9, updated_at = $10
             WHERE id = $1
            "#,
        )
        .bind(startup.id)
        .bind(&startup.description)
        .bind(&startup.sectors)
        .bind(startup.stage.map(i16::from))
        .bind(&startup.location)
        .bind(startup.team_size)
        .bind(startup.has_revenue)
        .bind(startup.has_customers)
        .bind(startup.is_launched)
        .bind(startup.updated_at)
        .execute(&self.pool)
        .await
        .with_context(|| format!("updating startup {}", startup.id))?;
        Ok(())
    }

    async fn save_god_score(&self, id: Uuid, score: &GodScore) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE startup_uploads
               SET total_god_score = $2, god_breakdown = $3, god_formula_version = $4,
                   updated_at = NOW()
             WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(i16::from(score.total))
        .bind(Json(score.breakdown))
        .bind(&score.formula_version)
        .execute(&self.pool)
        .await
        .with_context(|| format!("saving god score for {id}"))?;
        Ok(())
    }

    async fn save_smell_tests(&self, id: Uuid, tests: &SmellTests) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE startup_uploads
               SET smell_tests = $2, smell_test_score = $3, updated_at = NOW()
             WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(Json(*tests))
        .bind(i16::from(tests.passed()))
        .execute(&self.pool)
        .await
        .with_context(|| format!("saving smell tests for {id}"))?;
        Ok(())
    }

    async fn god_scores(&self) -> Result<Vec<u8>> {
        let rows = sqlx::query(
            "SELECT total_god_score FROM startup_uploads WHERE total_god_score IS NOT NULL",
        )
        .fetch_all(&self.pool)
        .await
        .context("loading god scores")?;
        rows.iter()
            .map(|row| {
                let score: i16 = row.try_get("total_god_score")?;
                u8::try_from(score).with_context(|| format!("god score out of range: {score}"))
            })
            .collect()
    }

    async fn investors_page(&self, offset: i64, limit: i64) -> Result<Vec<Investor>> {
        let sql = format!("SELECT {INVESTOR_COLUMNS} FROM investors ORDER BY id OFFSET $1 LIMIT $2");
        let rows = sqlx::query(&sql)
            .bind(offset)
            .bind(limit)
            .fetch_all(&self.pool)
            .await
            .context("loading investor page")?;
        rows.iter().map(investor_from_row).collect()
    }

    async fn active_investors(&self) -> Result<Vec<Investor>> {
        let sql = format!("SELECT {INVESTOR_COLUMNS} FROM investors WHERE status = 'active' ORDER BY id");
        let rows = sqlx::query(&sql)
            .fetch_all(&self.pool)
            .await
            .context("loading active investors")?;
        rows.iter().map(investor_from_row).collect()
    }

    async fn update_investor_profile(&self, investor: &Investor) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE investors
               SET sectors = $2, stage = $3, check_size_min = $4, check_size_max = $5,
                   notable_investments = $6, portfolio_companies = $7, investment_thesis = $8,
                   total_investments = $9, successful_exits = $10, active_fund_size = $11,
                   last_enriched_at = $12, updated_at = NOW()
             WHERE id = $1
            "#,
        )
        .bind(investor.id)
        .bind(&investor.sectors)
        .bind(&investor.stage)
        .bind(investor.check_size_min)
        .bind(investor.check_size_max)
        .bind(Json(&investor.notable_investments))
        .bind(Json(&investor.portfolio_companies))
        .bind(&investor.investment_thesis)
        .bind(investor.total_investments)
        .bind(investor.successful_exits)
        .bind(investor.active_fund_size)
        .bind(investor.last_enriched_at)
        .execute(&self.pool)
        .await
        .with_context(|| format!("updating investor {}", investor.id))?;
        Ok(())
    }

    async fn save_investor_score(&self, id: Uuid, score: &InvestorScore) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE investors
               SET investor_score = $2, investor_tier = $3, updated_at = NOW()
             WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(score.total)
        .bind(score.tier.as_str())
        .execute(&self.pool)
        .await
        .with_context(|| format!("saving investor score for {id}"))?;
        Ok(())
    }

    async fn investor_tiers(&self) -> Result<Vec<Option<InvestorTier>>> {
        let rows = sqlx::query("SELECT investor_tier FROM investors")
            .fetch_all(&self.pool)
            .await
            .context("loading investor tiers")?;
        rows.iter()
            .map(|row| {
                let tier: Option<String> = row.try_get("investor_tier")?;
                Ok(tier.as_deref().and_then(InvestorTier::parse))
            })
            .collect()
    }

    async fn replace_matches(&self, startup_id: Uuid, matches: &[MatchRecord]) -> Result<()> {
        let mut tx = self.pool.begin().await.context("opening match transaction")?;
        sqlx::query("DELETE FROM startup_investor_matches WHERE startup_id = $1")
            .bind(startup_id)
            .execute(&mut *tx)
            .await
            .with_context(|| format!("clearing matches for {startup_id}"))?;

        for chunk in matches.chunks(MATCH_UPSERT_CHUNK) {
            let mut qb: QueryBuilder<Postgres> = QueryBuilder::new(
                "INSERT INTO startup_investor_matches \
                 (startup_id, investor_id, match_score, confidence_level, fit_analysis, status, algorithm_version) ",
            );
            qb.push_values(chunk, |mut b, m| {
                b.push_bind(m.startup_id)
                    .push_bind(m.investor_id)
                    .push_bind(i16::from(m.match_score))
                    .push_bind(m.confidence_level.as_str())
                    .push_bind(Json(m.fit_analysis.clone()))
                    .push_bind(m.status.clone())
                    .push_bind(m.algorithm_version.clone());
            });
            qb.push(
                " ON CONFLICT (startup_id, investor_id) DO UPDATE SET \
                 match_score = EXCLUDED.match_score, \
                 confidence_level = EXCLUDED.confidence_level, \
                 fit_analysis = EXCLUDED.fit_analysis, \
                 status = EXCLUDED.status, \
                 algorithm_version = EXCLUDED.algorithm_version",
            );
            qb.build()
                .execute(&mut *tx)
                .await
                .with_context(|| format!("upserting matches for {startup_id}"))?;
        }
        tx.commit().await.context("committing matches")?;
        Ok(())
    }

    async fn matches_for_startup(&self, startup_id: Uuid, limit: i64) -> Result<Vec<MatchRecord>> {
        let rows = sqlx::query(
            r#"
            SELECT startup_id, investor_id, match_score, confidence_level, fit_analysis, status,
                   algorithm_version
              FROM startup_investor_matches
             WHERE startup_id = $1
             ORDER BY match_score DESC, investor_id
             LIMIT $2
            "#,
        )
        .bind(startup_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .with_context(|| format!("loading matches for {startup_id}"))?;
        rows.iter().map(match_from_row).collect()
    }

    async fn match_scores(&self) -> Result<Vec<(u8, Confidence)>> {
        let rows = sqlx::query("SELECT match_score, confidence_level FROM startup_investor_matches")
            .fetch_all(&self.pool)
            .await
            .context("loading match scores")?;
        rows.iter()
            .map(|row| {
                let score: i16 = row.try_get("match_score")?;
                let confidence: String = row.try_get("confidence_level")?;
                Ok((
                    u8::try_from(score).with_context(|| format!("match score out of range: {score}"))?,
                    Confidence::parse(&confidence)
                        .ok_or_else(|| anyhow!("unknown confidence `{confidence}`"))?,
                ))
            })
            .collect()
    }

    async fn enqueue(&self, startup_id: Uuid, now: DateTime<Utc>) -> Result<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO matching_queue (id, startup_id, status, attempts, run_after, created_at, updated_at)
            VALUES ($1, $2, 'pending', 0, $3, $3, $3)
            ON CONFLICT DO NOTHING
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(startup_id)
        .bind(now)
        .execute(&self.pool)
        .await
        .with_context(|| format!("enqueueing {startup_id}"))?;
        Ok(result.rows_affected() == 1)
    }

    async fn claim_jobs(&self, limit: i64, max_attempts: i32, now: DateTime<Utc>) -> Result<Vec<QueueJob>> {
        let sql = format!(
            r#"
            UPDATE matching_queue
               SET status = 'processing', attempts = attempts + 1, started_at = $2, updated_at = $2
             WHERE id IN (
                   SELECT id FROM matching_queue
                    WHERE status = 'pending' AND run_after <= $2 AND attempts < $3
                    ORDER BY created_at
                    LIMIT $1
                      FOR UPDATE SKIP LOCKED)
            RETURNING {JOB_COLUMNS}
            "#
        );
        let rows = sqlx::query(&sql)
            .bind(limit)
            .bind(now)
            .bind(max_attempts)
            .fetch_all(&self.pool)
            .await
            .context("claiming queue jobs")?;
        let mut jobs = rows.iter().map(job_from_row).collect::<Result<Vec<_>>>()?;
        jobs.sort_by_key(|j| j.created_at);
        Ok(jobs)
    }

    async fn complete_job(&self, id: Uuid, now: DateTime<Utc>) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE matching_queue
               SET status = 'completed', completed_at = $2, last_error = NULL, updated_at = $2
             WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(now)
        .execute(&self.pool)
        .await
        .with_context(|| format!("completing job {id}"))?;
        Ok(())
    }

    async fn retry_job(&self, id: Uuid, error: &str, run_after: DateTime<Utc>) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE matching_queue
               SET status = 'pending', last_error = $2, run_after = $3, started_at = NULL,
                   updated_at = NOW()
             WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(error)
        .bind(run_after)
        .execute(&self.pool)
        .await
        .with_context(|| format!("rescheduling job {id}"))?;
        Ok(())
    }

    async fn fail_job(&self, id: Uuid, error: &str, now: DateTime<Utc>) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE matching_queue
               SET status = 'failed', last_error = $2, completed_at = $3, updated_at = $3
             WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(error)
        .bind(now)
        .execute(&self.pool)
        .await
        .with_context(|| format!("failing job {id}"))?;
        Ok(())
    }

    async fn reset_stuck_jobs(&self, cutoff: DateTime<Utc>, max_attempts: i32) -> Result<StuckSweep> {
        let failed = sqlx::query(
            r#"
            UPDATE matching_queue
               SET status = 'failed', last_error = $3, started_at = NULL,
                   completed_at = NOW(), updated_at = NOW()
             WHERE status = 'processing' AND started_at < $1 AND attempts >= $2
            "#,
        )
        .bind(cutoff)
        .bind(max_attempts)
        .bind(STUCK_AT_MAX_ATTEMPTS)
        .execute(&self.pool)
        .await
        .context("failing exhausted stuck jobs")?;
        let reset = sqlx::query(
            r#"
            UPDATE matching_queue
               SET status = 'pending', started_at = NULL, updated_at = NOW()
             WHERE status = 'processing' AND started_at < $1
            "#,
        )
        .bind(cutoff)
        .execute(&self.pool)
        .await
        .context("resetting stuck jobs")?;
        Ok(StuckSweep {
            reset: reset.rows_affected(),
            failed: failed.rows_affected(),
        })
    }

    async fn queue_stats(&self) -> Result<QueueStats> {
        let rows = sqlx::query("SELECT status, COUNT(*) AS n FROM matching_queue GROUP BY status")
            .fetch_all(&self.pool)
            .await
            .context("loading queue stats")?;
        let mut stats = QueueStats::default();
        for row in rows {
            let status: String = row.try_get("status")?;
            let count: i64 = row.try_get("n")?;
            if let Some(status) = JobStatus::parse(&status) {
                stats.record(status, count);
            }
        }
        Ok(stats)
    }

    async fn active_sources(&self) -> Result<Vec<RssSource>> {
        let rows = sqlx::query(
            r#"
            SELECT id, name, url, category, kind, active, last_scraped_at
              FROM rss_sources
             WHERE active
             ORDER BY name
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .context("loading rss sources")?;
        rows.iter()
            .map(|row| {
                let kind: String = row.try_get("kind")?;
                Ok(RssSource {
                    id: row.try_get("id")?,
                    name: row.try_get("name")?,
                    url: row.try_get("url")?,
                    category: row.try_get("category")?,
                    kind: if kind == "web" { SourceKind::Web } else { SourceKind::Rss },
                    active: row.try_get("active")?,
                    last_scraped_at: row.try_get("last_scraped_at")?,
                })
            })
            .collect()
    }

    async fn mark_source_scraped(&self, id: Uuid, at: DateTime<Utc>) -> Result<()> {
        sqlx::query("UPDATE rss_sources SET last_scraped_at = $2 WHERE id = $1")
            .bind(id)
            .bind(at)
            .execute(&self.pool)
            .await
            .with_context(|| format!("marking source {id} scraped"))?;
        Ok(())
    }

    async fn discovered_names(&self) -> Result<Vec<String>> {
        let rows = sqlx::query("SELECT name FROM discovered_startups")
            .fetch_all(&self.pool)
            .await
            .context("loading discovered names")?;
        rows.iter()
            .map(|row| row.try_get::<String, _>("name").map_err(anyhow::Error::from))
            .collect()
    }

    async fn insert_discovered(&self, startup: &DiscoveredStartup) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO discovered_startups
                (id, name, website, description, funding_amount, funding_stage,
                 investors_mentioned, sectors, article_url, article_title, rss_source,
                 imported_to_startups, discovered_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            "#,
        )
        .bind(startup.id)
        .bind(&startup.name)
        .bind(&startup.website)
        .bind(&startup.description)
        .bind(&startup.funding_amount)
        .bind(&startup.funding_stage)
        .bind(&startup.investors_mentioned)
        .bind(&startup.sectors)
        .bind(&startup.article_url)
        .bind(&startup.article_title)
        .bind(&startup.rss_source)
        .bind(startup.imported_to_startups)
        .bind(startup.discovered_at)
        .execute(&self.pool)
        .await
        .with_context(|| format!("inserting discovered startup {}", startup.name))?;
        Ok(())
    }

    async fn unimported_discoveries(&self, limit: i64) -> Result<Vec<DiscoveredStartup>> {
        let sql = format!(
            "SELECT {DISCOVERED_COLUMNS} FROM discovered_startups \
             WHERE NOT imported_to_startups ORDER BY discovered_at LIMIT $1"
        );
        let rows = sqlx::query(&sql)
            .bind(limit)
            .fetch_all(&self.pool)
            .await
            .context("loading unimported discoveries")?;
        rows.iter().map(discovered_from_row).collect()
    }

    async fn mark_imported(&self, id: Uuid) -> Result<()> {
        sqlx::query("UPDATE discovered_startups SET imported_to_startups = TRUE WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .with_context(|| format!("marking discovery {id} imported"))?;
        Ok(())
    }
}
