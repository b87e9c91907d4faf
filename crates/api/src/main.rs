mod jobs;

use anyhow::Context;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{delete, get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

use council_core::domain::consensus::ConsensusResult;
use council_core::domain::persona::{PersonaDefinition, PersonaOpinion, Position};
use council_core::domain::trigger::TriggerKind;
use council_core::error::{EmptyScanError, FanOutLimitError, PersonaNotFoundError};
use council_core::ingest::aggregate::format_financial_context;
use council_core::pipeline::{
    OpportunityPipeline, QuickScan, WatchlistScan, DEFAULT_MAX_OPPORTUNITIES, DEFAULT_MIN_SCORE,
};
use council_core::storage::lock;
use council_core::storage::opportunities::{self, OpportunityStats, StoredOpportunity};
use council_core::triggers::default_watchlist;
use council_core::triggers::orchestrator::TriggerScan;
use jobs::{JobKind, JobOutcome, JobStatus, JobTracker};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let settings = council_core::config::Settings::from_env()?;
    let _sentry_guard = init_sentry(&settings);

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .with(sentry_tracing::layer())
        .init();

    let pipeline = Arc::new(OpportunityPipeline::from_settings(&settings)?);

    let pool = match settings.database_url.as_deref() {
        Some(db_url) => match sqlx::postgres::PgPoolOptions::new()
            .max_connections(5)
            .connect(db_url)
            .await
        {
            Ok(pool) => match council_core::storage::migrate(&pool).await {
                Ok(()) => Some(pool),
                Err(err) => {
                    sentry_anyhow::capture_anyhow(&err);
                    tracing::error!(error = %err, "migrations failed; starting without database");
                    None
                }
            },
            Err(err) => {
                let err = anyhow::Error::new(err).context("connect DATABASE_URL failed");
                sentry_anyhow::capture_anyhow(&err);
                tracing::error!(error = %err, "database unavailable; starting without it");
                None
            }
        },
        None => {
            tracing::warn!("DATABASE_URL not set; opportunity history routes disabled");
            None
        }
    };

    let state = AppState {
        pool,
        pipeline,
        jobs: JobTracker::default(),
    };

    let app = Router::new()
        .route("/healthz", get(healthz))
        .route("/personas", get(list_personas))
        .route("/personas/:id", get(get_persona))
        .route("/personas/:id/analyze", post(analyze_with_persona))
        .route("/council/analyze", post(analyze_with_council))
        .route("/triggers/scan", post(scan_triggers))
        .route("/triggers/types", get(trigger_types))
        .route("/watchlist", get(watchlist))
        .route("/scan/watchlist", post(scan_watchlist))
        .route("/scan/quick", post(quick_scan))
        .route("/jobs/status", get(job_status))
        .route("/jobs/scan/daily", post(start_daily_scan))
        .route("/opportunities/recent", get(recent_opportunities))
        .route("/opportunities/top", get(top_opportunities))
        .route("/opportunities/stats", get(opportunity_stats))
        .route("/opportunities/cleanup", delete(cleanup_opportunities))
        .route("/opportunities/update-prices", post(update_prices))
        .route("/opportunities/symbol/:symbol", get(opportunities_by_symbol))
        .route("/opportunities/scan/:scan_id", get(opportunities_by_scan))
        .route(
            "/opportunities/consensus/:position",
            get(opportunities_by_consensus),
        )
        .route("/opportunities/:id", get(opportunity_by_id))
        .with_state(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    let port: u16 = std::env::var("PORT")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(3000);
    let listener = tokio::net::TcpListener::bind(("0.0.0.0", port)).await?;
    tracing::info!(%port, "api listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

#[derive(Clone)]
struct AppState {
    pool: Option<PgPool>,
    pipeline: Arc<OpportunityPipeline>,
    jobs: JobTracker,
}

/// Maps core errors onto HTTP statuses. Only unexpected failures reach Sentry.
fn status_for(err: anyhow::Error) -> StatusCode {
    if err.downcast_ref::<PersonaNotFoundError>().is_some() {
        return StatusCode::NOT_FOUND;
    }
    if err.downcast_ref::<FanOutLimitError>().is_some()
        || err.downcast_ref::<EmptyScanError>().is_some()
    {
        return StatusCode::BAD_REQUEST;
    }
    sentry_anyhow::capture_anyhow(&err);
    tracing::error!(error = %err, "request failed");
    StatusCode::INTERNAL_SERVER_ERROR
}

fn require_pool(state: &AppState) -> Result<&PgPool, StatusCode> {
    state.pool.as_ref().ok_or(StatusCode::SERVICE_UNAVAILABLE)
}

async fn healthz() -> &'static str {
    "ok"
}

#[derive(Serialize)]
struct PersonaSummary {
    id: String,
    name: String,
    era: String,
    philosophy: String,
}

async fn list_personas(
    State(state): State<AppState>,
) -> Result<Json<Vec<PersonaSummary>>, StatusCode> {
    let personas = state
        .pipeline
        .council()
        .evaluator()
        .personas()
        .all()
        .await
        .map_err(status_for)?;

    Ok(Json(
        personas
            .iter()
            .map(|p| PersonaSummary {
                id: p.id.clone(),
                name: p.name.clone(),
                era: p.era.clone(),
                philosophy: p.philosophy.clone(),
            })
            .collect(),
    ))
}

async fn get_persona(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<PersonaDefinition>, StatusCode> {
    let persona = state
        .pipeline
        .council()
        .evaluator()
        .personas()
        .get(&id)
        .await
        .map_err(status_for)?
        .ok_or(StatusCode::NOT_FOUND)?;
    Ok(Json(persona.as_ref().clone()))
}

#[derive(Deserialize)]
struct AnalyzeRequest {
    symbol: String,
    context: Option<String>,
    #[serde(default)]
    persona_ids: Option<Vec<String>>,
    #[serde(default = "default_true")]
    include_market_data: bool,
}

fn default_true() -> bool {
    true
}

/// Caller-supplied context wins; otherwise market data is rendered when requested.
async fn resolve_context(state: &AppState, req: &AnalyzeRequest) -> Option<String> {
    if let Some(ctx) = req.context.as_deref().filter(|c| !c.trim().is_empty()) {
        return Some(ctx.to_string());
    }
    if !req.include_market_data {
        return None;
    }
    match state.pipeline.market().get_financial_data(&req.symbol).await {
        Ok(data) => Some(format_financial_context(&data)).filter(|t| !t.is_empty()),
        Err(err) => {
            tracing::warn!(symbol = %req.symbol, error = %err, "market data unavailable");
            None
        }
    }
}

fn normalized_symbol(symbol: &str) -> Result<String, StatusCode> {
    let symbol = symbol.trim().to_ascii_uppercase();
    if symbol.is_empty() {
        return Err(StatusCode::BAD_REQUEST);
    }
    Ok(symbol)
}

async fn analyze_with_persona(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(mut req): Json<AnalyzeRequest>,
) -> Result<Json<PersonaOpinion>, StatusCode> {
    req.symbol = normalized_symbol(&req.symbol)?;
    let context = resolve_context(&state, &req).await;
    let opinion = state
        .pipeline
        .council()
        .evaluator()
        .evaluate(&id, &req.symbol, context.as_deref())
        .await
        .map_err(status_for)?;
    Ok(Json(opinion))
}

#[derive(Serialize)]
struct CouncilResponse {
    symbol: String,
    opinions: Vec<PersonaOpinion>,
    consensus: ConsensusResult,
}

async fn analyze_with_council(
    State(state): State<AppState>,
    Json(mut req): Json<AnalyzeRequest>,
) -> Result<Json<CouncilResponse>, StatusCode> {
    req.symbol = normalized_symbol(&req.symbol)?;
    let context = resolve_context(&state, &req).await;
    let opinions = state
        .pipeline
        .council()
        .evaluate_council(&req.symbol, req.persona_ids.as_deref(), context.as_deref())
        .await
        .map_err(status_for)?;
    let consensus = state
        .pipeline
        .synthesizer()
        .synthesize(&req.symbol, &opinions)
        .await;

    Ok(Json(CouncilResponse {
        symbol: req.symbol,
        opinions,
        consensus,
    }))
}

#[derive(Deserialize)]
struct TriggerScanRequest {
    symbols: Option<Vec<String>>,
    trigger_types: Option<Vec<String>>,
}

async fn scan_triggers(
    State(state): State<AppState>,
    Json(req): Json<TriggerScanRequest>,
) -> Result<Json<TriggerScan>, StatusCode> {
    let kinds = match req.trigger_types {
        Some(names) => Some(
            names
                .iter()
                .map(|n| TriggerKind::parse(n).ok_or(StatusCode::BAD_REQUEST))
                .collect::<Result<Vec<_>, _>>()?,
        ),
        None => None,
    };
    let symbols = req
        .symbols
        .filter(|s| !s.is_empty())
        .unwrap_or_else(default_watchlist);

    let scan = state
        .pipeline
        .triggers()
        .scan_watchlist(&symbols, kinds.as_deref())
        .await
        .map_err(status_for)?;
    Ok(Json(scan))
}

#[derive(Serialize)]
struct TriggerTypeInfo {
    trigger_type: &'static str,
    description: &'static str,
    category: &'static str,
}

async fn trigger_types() -> Json<Vec<TriggerTypeInfo>> {
    Json(
        TriggerKind::ALL
            .iter()
            .map(|k| TriggerTypeInfo {
                trigger_type: k.as_str(),
                description: k.description(),
                category: k.category(),
            })
            .collect(),
    )
}

async fn watchlist() -> Json<Vec<String>> {
    Json(default_watchlist())
}

#[derive(Deserialize)]
struct WatchlistScanRequest {
    symbols: Vec<String>,
    #[serde(default = "default_true")]
    include_context: bool,
    #[serde(default)]
    save: bool,
}

/// Resolved before a scan starts so a save request never spends a council run it cannot keep.
fn save_target(pool: Option<&PgPool>, save: bool) -> Result<Option<&PgPool>, StatusCode> {
    match (save, pool) {
        (false, _) => Ok(None),
        (true, Some(pool)) => Ok(Some(pool)),
        (true, None) => Err(StatusCode::SERVICE_UNAVAILABLE),
    }
}

async fn scan_watchlist(
    State(state): State<AppState>,
    Json(req): Json<WatchlistScanRequest>,
) -> Result<Json<WatchlistScan>, StatusCode> {
    let save_to = save_target(state.pool.as_ref(), req.save)?;
    let scan = state
        .pipeline
        .run_watchlist_scan(&req.symbols, req.include_context)
        .await
        .map_err(status_for)?;

    if let Some(pool) = save_to {
        opportunities::persist_batch(pool, scan.scan_id, &scan.opportunities)
            .await
            .map_err(status_for)?;
    }
    Ok(Json(scan))
}

#[derive(Deserialize)]
struct QuickScanRequest {
    symbols: Vec<String>,
    #[serde(default = "default_true")]
    include_context: bool,
}

async fn quick_scan(
    State(state): State<AppState>,
    Json(req): Json<QuickScanRequest>,
) -> Result<Json<QuickScan>, StatusCode> {
    let scan = state
        .pipeline
        .run_quick_scan(&req.symbols, req.include_context)
        .await
        .map_err(status_for)?;
    Ok(Json(scan))
}

async fn job_status(State(state): State<AppState>) -> Json<JobStatus> {
    Json(state.jobs.status().await)
}

#[derive(Deserialize)]
struct DailyScanQuery {
    min_score: Option<f64>,
    max_opportunities: Option<usize>,
}

#[derive(Serialize)]
struct JobAccepted {
    job: JobKind,
    started_at: DateTime<Utc>,
    message: &'static str,
}

/// Starts the daily scan in the background; progress is read from `/jobs/status`.
async fn start_daily_scan(
    State(state): State<AppState>,
    Query(q): Query<DailyScanQuery>,
) -> Result<(StatusCode, Json<JobAccepted>), StatusCode> {
    let started_at = state
        .jobs
        .start(JobKind::DailyScan)
        .await
        .ok_or(StatusCode::CONFLICT)?;
    let min_score = q.min_score.unwrap_or(DEFAULT_MIN_SCORE);
    let max_opportunities = q
        .max_opportunities
        .unwrap_or(DEFAULT_MAX_OPPORTUNITIES)
        .max(1);

    tokio::spawn(async move {
        let outcome = daily_scan_job(&state, min_score, max_opportunities).await;
        if let Err(err) = &outcome {
            sentry_anyhow::capture_anyhow(err);
            tracing::error!(error = %err, "daily scan job failed");
        }
        state.jobs.finish(JobKind::DailyScan, &outcome).await;
    });

    Ok((
        StatusCode::ACCEPTED,
        Json(JobAccepted {
            job: JobKind::DailyScan,
            started_at,
            message: "daily scan started; poll /jobs/status for the result",
        }),
    ))
}

/// Same flow as the worker's daily run: the date lock guards the database, not the process.
async fn daily_scan_job(
    state: &AppState,
    min_score: f64,
    max_opportunities: usize,
) -> anyhow::Result<JobOutcome> {
    let Some(pool) = state.pool.as_ref() else {
        let report = state
            .pipeline
            .run_daily_scan(None, None, min_score, max_opportunities)
            .await?;
        return Ok(JobOutcome {
            scan_id: Some(report.scan_id),
            detail: format!(
                "{} opportunities found; not persisted without a database",
                report.opportunities.len()
            ),
        });
    };

    let scan_date = Utc::now().date_naive();
    let mut conn = pool.acquire().await.context("acquire connection failed")?;
    if !lock::try_acquire_daily_scan_lock(&mut conn, scan_date).await? {
        anyhow::bail!("daily scan for {scan_date} is already running elsewhere");
    }

    let outcome = async {
        let report = state
            .pipeline
            .run_daily_scan(None, None, min_score, max_opportunities)
            .await?;
        let ids = opportunities::persist_batch(pool, report.scan_id, &report.opportunities).await?;
        tracing::info!(
            %scan_date,
            scan_id = %report.scan_id,
            triggered = report.triggered_count,
            persisted = ids.len(),
            "daily scan persisted"
        );
        anyhow::Ok(JobOutcome {
            scan_id: Some(report.scan_id),
            detail: format!(
                "{} triggered, {} analyzed, {} persisted",
                report.triggered_count,
                report.analyzed_count,
                ids.len()
            ),
        })
    }
    .await;

    let _ = lock::release_daily_scan_lock(&mut conn, scan_date).await;
    outcome
}

#[derive(Deserialize)]
struct HistoryQuery {
    min_score: Option<f64>,
    days: Option<i64>,
    limit: Option<i64>,
}

impl HistoryQuery {
    fn days(&self, default: i64) -> i64 {
        self.days.unwrap_or(default).clamp(1, 365)
    }

    fn limit(&self, default: i64) -> i64 {
        self.limit.unwrap_or(default).clamp(1, 200)
    }
}

async fn recent_opportunities(
    State(state): State<AppState>,
    Query(q): Query<HistoryQuery>,
) -> Result<Json<Vec<StoredOpportunity>>, StatusCode> {
    let pool = require_pool(&state)?;
    let rows = opportunities::fetch_recent(
        pool,
        q.min_score.unwrap_or(0.0),
        q.days(7),
        q.limit(50),
    )
    .await
    .map_err(status_for)?;
    Ok(Json(rows))
}

async fn top_opportunities(
    State(state): State<AppState>,
    Query(q): Query<HistoryQuery>,
) -> Result<Json<Vec<StoredOpportunity>>, StatusCode> {
    let pool = require_pool(&state)?;
    let rows = opportunities::fetch_top(pool, q.days(7), q.limit(10))
        .await
        .map_err(status_for)?;
    Ok(Json(rows))
}

async fn opportunity_stats(
    State(state): State<AppState>,
    Query(q): Query<HistoryQuery>,
) -> Result<Json<OpportunityStats>, StatusCode> {
    let pool = require_pool(&state)?;
    let stats = opportunities::stats(pool, q.days(30))
        .await
        .map_err(status_for)?;
    Ok(Json(stats))
}

async fn opportunities_by_symbol(
    State(state): State<AppState>,
    Path(symbol): Path<String>,
    Query(q): Query<HistoryQuery>,
) -> Result<Json<Vec<StoredOpportunity>>, StatusCode> {
    let pool = require_pool(&state)?;
    let rows = opportunities::fetch_by_symbol(pool, &symbol, q.limit(20))
        .await
        .map_err(status_for)?;
    Ok(Json(rows))
}

async fn opportunities_by_scan(
    State(state): State<AppState>,
    Path(scan_id): Path<Uuid>,
) -> Result<Json<Vec<StoredOpportunity>>, StatusCode> {
    let pool = require_pool(&state)?;
    let rows = opportunities::fetch_by_scan(pool, scan_id)
        .await
        .map_err(status_for)?;
    Ok(Json(rows))
}

async fn opportunities_by_consensus(
    State(state): State<AppState>,
    Path(position): Path<String>,
    Query(q): Query<HistoryQuery>,
) -> Result<Json<Vec<StoredOpportunity>>, StatusCode> {
    let pool = require_pool(&state)?;
    let position = Position::parse(&position).ok_or(StatusCode::BAD_REQUEST)?;
    let rows = opportunities::fetch_by_consensus(pool, position, q.days(30), q.limit(50))
        .await
        .map_err(status_for)?;
    Ok(Json(rows))
}

async fn opportunity_by_id(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<StoredOpportunity>, StatusCode> {
    let pool = require_pool(&state)?;
    let row = opportunities::fetch_by_id(pool, id)
        .await
        .map_err(status_for)?
        .ok_or(StatusCode::NOT_FOUND)?;
    Ok(Json(row))
}

#[derive(Deserialize)]
struct MaintenanceQuery {
    days: Option<i64>,
}

const CLEANUP_DAYS: (i64, i64, i64) = (90, 30, 365);
const PRICE_UPDATE_DAYS: (i64, i64, i64) = (7, 1, 30);

/// Default when absent; out-of-range values are rejected rather than clamped.
fn window_days(days: Option<i64>, (default, min, max): (i64, i64, i64)) -> Result<i64, StatusCode> {
    let days = days.unwrap_or(default);
    if (min..=max).contains(&days) {
        Ok(days)
    } else {
        Err(StatusCode::BAD_REQUEST)
    }
}

#[derive(Serialize)]
struct CleanupResponse {
    days: i64,
    deleted_count: u64,
}

async fn cleanup_opportunities(
    State(state): State<AppState>,
    Query(q): Query<MaintenanceQuery>,
) -> Result<Json<CleanupResponse>, StatusCode> {
    let days = window_days(q.days, CLEANUP_DAYS)?;
    let pool = require_pool(&state)?;
    let deleted_count = opportunities::delete_older_than(pool, days)
        .await
        .map_err(status_for)?;
    tracing::info!(days, deleted_count, "cleanup finished");
    Ok(Json(CleanupResponse {
        days,
        deleted_count,
    }))
}

#[derive(Serialize)]
struct PriceUpdateResponse {
    days: i64,
    updated_count: usize,
}

async fn update_prices(
    State(state): State<AppState>,
    Query(q): Query<MaintenanceQuery>,
) -> Result<Json<PriceUpdateResponse>, StatusCode> {
    let days = window_days(q.days, PRICE_UPDATE_DAYS)?;
    let pool = require_pool(&state)?;
    state
        .jobs
        .start(JobKind::PriceUpdate)
        .await
        .ok_or(StatusCode::CONFLICT)?;

    let outcome = opportunities::refresh_prices(pool, state.pipeline.market().as_ref(), days).await;
    let recorded = match &outcome {
        Ok(updated) => Ok(JobOutcome {
            scan_id: None,
            detail: format!("{updated} opportunities repriced"),
        }),
        Err(err) => Err(anyhow::anyhow!("{err:#}")),
    };
    state.jobs.finish(JobKind::PriceUpdate, &recorded).await;

    let updated_count = outcome.map_err(status_for)?;
    Ok(Json(PriceUpdateResponse {
        days,
        updated_count,
    }))
}

fn init_sentry(settings: &council_core::config::Settings) -> Option<sentry::ClientInitGuard> {
    let dsn = settings.sentry_dsn.as_deref()?;
    Some(sentry::init((
        dsn,
        sentry::ClientOptions {
            release: sentry::release_name!(),
            ..Default::default()
        },
    )))
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    tracing::info!("shutdown signal received");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maintenance_windows_default_and_reject_out_of_range() {
        assert_eq!(window_days(None, CLEANUP_DAYS), Ok(90));
        assert_eq!(window_days(Some(30), CLEANUP_DAYS), Ok(30));
        assert_eq!(window_days(Some(7), CLEANUP_DAYS), Err(StatusCode::BAD_REQUEST));
        assert_eq!(window_days(None, PRICE_UPDATE_DAYS), Ok(7));
        assert_eq!(window_days(Some(31), PRICE_UPDATE_DAYS), Err(StatusCode::BAD_REQUEST));
    }

    #[test]
    fn saving_without_a_database_fails_before_scanning() {
        assert!(matches!(
            save_target(None, true),
            Err(StatusCode::SERVICE_UNAVAILABLE)
        ));
        assert!(matches!(save_target(None, false), Ok(None)));
    }

    #[test]
    fn empty_and_oversized_scans_are_client_errors() {
        assert_eq!(status_for(EmptyScanError.into()), StatusCode::BAD_REQUEST);
        let too_many = council_core::error::ensure_fan_out(21, 20).unwrap_err();
        assert_eq!(status_for(too_many), StatusCode::BAD_REQUEST);
    }
}
