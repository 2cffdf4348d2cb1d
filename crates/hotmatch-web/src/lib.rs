//! Read-only JSON API over the match store and run reports.

use std::path::PathBuf;
use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use hotmatch_sync::{latest_reports, HotMatchStore, Pipeline};
use serde::Deserialize;
use tokio::net::TcpListener;
use tracing::info;
use uuid::Uuid;

pub const CRATE_NAME: &str = "hotmatch-web";

const DEFAULT_MATCH_LIMIT: i64 = 20;
const MAX_MATCH_LIMIT: i64 = 100;
const REPORT_LIMIT: usize = 20;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn HotMatchStore>,
    pub reports_dir: PathBuf,
}

impl AppState {
    pub fn new(store: Arc<dyn HotMatchStore>, reports_dir: impl Into<PathBuf>) -> Self {
        Self {
            store,
            reports_dir: reports_dir.into(),
        }
    }

    pub fn from_pipeline(pipeline: &Pipeline) -> Self {
        Self::new(pipeline.store(), pipeline.config().reports_dir.clone())
    }
}

#[derive(Debug, Deserialize)]
struct MatchQuery {
    limit: Option<i64>,
}

pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/startups/{id}/matches", get(startup_matches_handler))
        .route("/queue/stats", get(queue_stats_handler))
        .route("/reports", get(reports_handler))
        .with_state(Arc::new(state))
}

/// Bind `HOTMATCH_BIND_ADDR` and serve until the process stops.
pub async fn serve(pipeline: &Pipeline) -> anyhow::Result<()> {
    let addr = pipeline.config().bind_addr.clone();
    let listener = TcpListener::bind(&addr).await?;
    info!(%addr, "api listening");
    axum::serve(listener, app(AppState::from_pipeline(pipeline))).await?;
    Ok(())
}

async fn health_handler() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok", "service": CRATE_NAME }))
}

async fn startup_matches_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Query(query): Query<MatchQuery>,
) -> Response {
    let limit = query.limit.unwrap_or(DEFAULT_MATCH_LIMIT).clamp(1, MAX_MATCH_LIMIT);
    match state.store.startup(id).await {
        Ok(Some(_)) => {}
        Ok(None) => return not_found(format!("startup {id} not found")),
        Err(err) => return server_error(err),
    }
    match state.store.matches_for_startup(id, limit).await {
        Ok(matches) => Json(serde_json::json!({
            "startup_id": id,
            "count": matches.len(),
            "matches": matches,
        }))
        .into_response(),
        Err(err) => server_error(err),
    }
}

async fn queue_stats_handler(State(state): State<Arc<AppState>>) -> Response {
    match state.store.queue_stats().await {
        Ok(stats) => Json(serde_json::json!({
            "pending": stats.pending,
            "processing": stats.processing,
            "completed": stats.completed,
            "failed": stats.failed,
            "total": stats.total(),
        }))
        .into_response(),
        Err(err) => server_error(err),
    }
}

async fn reports_handler(State(state): State<Arc<AppState>>) -> Response {
    match latest_reports(&state.reports_dir, REPORT_LIMIT) {
        Ok(runs) => Json(serde_json::json!({ "runs": runs })).into_response(),
        Err(err) => server_error(err),
    }
}

fn not_found(message: String) -> Response {
    (StatusCode::NOT_FOUND, Json(serde_json::json!({ "error": message }))).into_response()
}

fn server_error(err: anyhow::Error) -> Response {
    tracing::error!(error = %format!("{err:#}"), "request failed");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(serde_json::json!({ "error": format!("{err:#}") })),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{header, Request};
    use chrono::Utc;
    use hotmatch_core::{Investor, Startup, StartupStatus};
    use hotmatch_scoring::{RuleSet, WeightedMatchScorer};
    use hotmatch_sync::{rebuild_startup, MemoryStore};
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    async fn body_json(resp: Response) -> serde_json::Value {
        let body = resp.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&body).unwrap()
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn handler_smoke_health() {
        let dir = tempfile::tempdir().unwrap();
        let app = app(AppState::new(Arc::new(MemoryStore::new()), dir.path()));
        let resp = app.oneshot(get("/health")).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(resp.headers()[header::CONTENT_TYPE].to_str().unwrap(), "application/json");
        assert_eq!(body_json(resp).await["status"], "ok");
    }

    #[tokio::test]
    async fn handler_smoke_startup_matches() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(MemoryStore::new());
        let mut startup = Startup::new(Uuid::from_u128(1), "Lumen Health");
        startup.sectors = vec!["ai".into()];
        startup.stage = Some(2);
        startup.total_god_score = Some(60);
        startup.has_revenue = true;
        startup.status = StartupStatus::Approved;
        store.add_startup(startup.clone()).await;
        let mut investor = Investor::new(Uuid::from_u128(10), "Series A Partners");
        investor.sectors = vec!["ai".into(), "enterprise".into()];
        investor.stage = vec!["series a".into()];
        store.add_investor(investor.clone()).await;

        let scorer = WeightedMatchScorer::canonical(Arc::new(RuleSet::builtin().unwrap()));
        rebuild_startup(store.as_ref(), &scorer, &startup, &[investor]).await.unwrap();

        let app = app(AppState::new(store, dir.path()));
        let resp = app
            .clone()
            .oneshot(get(&format!("/startups/{}/matches?limit=5", startup.id)))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let json = body_json(resp).await;
        assert_eq!(json["count"], 1);
        assert!(json["matches"][0]["match_score"].as_u64().unwrap() >= 66);

        let missing = app
            .oneshot(get(&format!("/startups/{}/matches", Uuid::from_u128(99))))
            .await
            .unwrap();
        assert_eq!(missing.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn handler_smoke_queue_stats() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(MemoryStore::new());
        store.enqueue(Uuid::from_u128(1), Utc::now()).await.unwrap();
        let app = app(AppState::new(store, dir.path()));
        let resp = app.oneshot(get("/queue/stats")).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let json = body_json(resp).await;
        assert_eq!((json["pending"].as_i64(), json["total"].as_i64()), (Some(1), Some(1)));
    }

    #[tokio::test]
    async fn handler_smoke_reports_listing() {
        let dir = tempfile::tempdir().unwrap();
        let app = app(AppState::new(Arc::new(MemoryStore::new()), dir.path().join("missing")));
        let resp = app.oneshot(get("/reports")).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(body_json(resp).await["runs"].as_array().map(Vec::len), Some(0));
    }
}
