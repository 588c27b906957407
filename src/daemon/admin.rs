//! HTTP admin API served by the daemon.
//!
//! - `POST /sync/incremental`, `POST /sync/historical` - manual triggers
//! - `GET /sync/status` - ledger, cursor and running flags
//! - `GET /gaps` - last gap detection snapshot
//! - `GET /health` - watchdog aggregate
//! - `POST /workers/{name}/restart` - forced restart
//! - `PUT /config/watchdog`, `PUT /config/gaps` - runtime tuning

use super::{GAP_DETECTOR, Pipeline};
use crate::config::{AdminConfig, GapDetectorConfig, WatchdogConfig};
use crate::core::gaps::GapDetector;
use crate::core::puller::{PullOutcome, Puller};
use crate::core::throttle::SlidingWindowLimiter;
use crate::core::watchdog::Watchdog;
use crate::core::worker::ScheduledWorker;
use crate::db::pool::DbPool;
use crate::db::queries;
use crate::errors::{AppError, AppResult};
use crate::models::punch::PUNCH_TIME_FORMAT;
use crate::models::sync::SyncKind;
use crate::utils::time::parse_bound;
use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post, put},
};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

pub struct AdminState {
    pub pool: DbPool,
    pub puller: Arc<Puller>,
    pub detector: Arc<GapDetector>,
    pub watchdog: Watchdog,
    pub gap_worker: Arc<ScheduledWorker>,
    incremental_limiter: SlidingWindowLimiter,
    historical_limiter: SlidingWindowLimiter,
}

impl AdminState {
    pub fn new(pipeline: &Pipeline, cfg: &AdminConfig) -> Self {
        let window = Duration::from_secs(cfg.manual_sync_window_secs.max(1));
        Self {
            pool: pipeline.pool.clone(),
            puller: pipeline.puller.clone(),
            detector: pipeline.detector.clone(),
            watchdog: pipeline.watchdog.clone(),
            gap_worker: pipeline.gap_worker.clone(),
            incremental_limiter: SlidingWindowLimiter::new(cfg.manual_sync_limit, window),
            historical_limiter: SlidingWindowLimiter::new(cfg.manual_sync_limit, window),
        }
    }

    fn limiter(&self, kind: SyncKind) -> &SlidingWindowLimiter {
        match kind {
            SyncKind::Incremental => &self.incremental_limiter,
            SyncKind::Historical => &self.historical_limiter,
        }
    }
}

/// `AppError` rendered as a JSON error body.
struct ApiError(AppError);

impl From<AppError> for ApiError {
    fn from(e: AppError) -> Self {
        ApiError(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            AppError::UnknownWorker(_) => StatusCode::NOT_FOUND,
            AppError::InvalidDate(_) | AppError::InvalidTime(_) | AppError::Config(_) => {
                StatusCode::BAD_REQUEST
            }
            AppError::Network(_) | AppError::Timeout(_) | AppError::Auth(_) | AppError::Data(_) => {
                StatusCode::BAD_GATEWAY
            }
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (
            status,
            Json(json!({ "error": self.0.to_string(), "kind": self.0.kind() })),
        )
            .into_response()
    }
}

type ApiResult<T> = Result<T, ApiError>;

pub fn create_router(state: AdminState) -> Router {
    Router::new()
        .route("/sync/incremental", post(sync_incremental))
        .route("/sync/historical", post(sync_historical))
        .route("/sync/status", get(sync_status))
        .route("/gaps", get(gaps))
        .route("/health", get(health))
        .route("/workers/{name}/restart", post(restart_worker))
        .route("/config/watchdog", put(update_watchdog))
        .route("/config/gaps", put(update_gaps))
        .with_state(Arc::new(state))
}

fn throttled(limiter: &SlidingWindowLimiter, kind: SyncKind) -> Option<Response> {
    if limiter.try_acquire() {
        return None;
    }
    warn!(kind = kind.as_str(), "Manual sync trigger throttled");
    Some(
        (
            StatusCode::TOO_MANY_REQUESTS,
            Json(json!({
                "error": "too many manual sync triggers",
                "retry_after_secs": limiter.retry_after().as_secs(),
            })),
        )
            .into_response(),
    )
}

fn outcome_response(outcome: PullOutcome) -> Response {
    match outcome {
        PullOutcome::AlreadyRunning => (StatusCode::CONFLICT, Json(outcome)).into_response(),
        PullOutcome::Completed { .. } => (StatusCode::OK, Json(outcome)).into_response(),
    }
}

async fn sync_incremental(State(state): State<Arc<AdminState>>) -> ApiResult<Response> {
    let kind = SyncKind::Incremental;
    if let Some(resp) = throttled(state.limiter(kind), kind) {
        return Ok(resp);
    }
    info!("Manual incremental sync requested");
    let outcome = state.puller.pull_incremental(None).await?;
    Ok(outcome_response(outcome))
}

#[derive(Debug, Deserialize)]
pub struct HistoricalRequest {
    pub from: String,
    pub to: String,
    pub limit: Option<u32>,
}

/// Backfills can be long; the run continues in the background.
async fn sync_historical(
    State(state): State<Arc<AdminState>>,
    Json(req): Json<HistoricalRequest>,
) -> ApiResult<Response> {
    let from = parse_bound(&req.from, false)?;
    let to = parse_bound(&req.to, true)?;
    if from > to {
        return Err(AppError::InvalidDate(format!("{} is after {}", req.from, req.to)).into());
    }

    let kind = SyncKind::Historical;
    if state.puller.is_running(kind) {
        return Ok(outcome_response(PullOutcome::AlreadyRunning));
    }
    if let Some(resp) = throttled(state.limiter(kind), kind) {
        return Ok(resp);
    }

    info!(from = %from, to = %to, "Manual historical sync requested");
    let puller = state.puller.clone();
    tokio::spawn(async move {
        // Completed runs and errors land in the sync ledger.
        match puller.pull_range(from, to, req.limit).await {
            Ok(PullOutcome::AlreadyRunning) => {
                debug!(from = %from, to = %to, "Backfill raced with another one, skipped")
            }
            Ok(PullOutcome::Completed { .. }) => {}
            Err(e) => debug!(error = %e, "Background backfill failed"),
        }
    });

    Ok((
        StatusCode::ACCEPTED,
        Json(json!({
            "status": "started",
            "from": from.format(PUNCH_TIME_FORMAT).to_string(),
            "to": to.format(PUNCH_TIME_FORMAT).to_string(),
        })),
    )
        .into_response())
}

async fn sync_status(State(state): State<Arc<AdminState>>) -> ApiResult<Response> {
    let (ledger, cursor) = state.pool.with_conn(|conn| {
        Ok((queries::load_sync_status(conn)?, queries::load_cursor(conn)?))
    })?;

    Ok(Json(json!({
        "ledger": ledger,
        "cursor": cursor.map(|c| c.format(PUNCH_TIME_FORMAT).to_string()),
        "pending_override": state
            .puller
            .pending_override()
            .map(|c| c.format(PUNCH_TIME_FORMAT).to_string()),
        "running": {
            "incremental": state.puller.is_running(SyncKind::Incremental),
            "historical": state.puller.is_running(SyncKind::Historical),
        },
    }))
    .into_response())
}

async fn gaps(State(state): State<Arc<AdminState>>) -> impl IntoResponse {
    Json(state.detector.snapshot())
}

async fn health(State(state): State<Arc<AdminState>>) -> impl IntoResponse {
    Json(state.watchdog.status().await)
}

async fn restart_worker(
    State(state): State<Arc<AdminState>>,
    Path(name): Path<String>,
) -> ApiResult<Response> {
    info!(worker = %name, "Forced restart requested");
    state.watchdog.restart_worker(&name).await?;
    Ok(Json(json!({ "restarted": name })).into_response())
}

async fn update_watchdog(
    State(state): State<Arc<AdminState>>,
    Json(cfg): Json<WatchdogConfig>,
) -> ApiResult<Response> {
    validate_watchdog(&cfg)?;
    state.watchdog.update_config(cfg).await?;
    Ok(Json(state.watchdog.config().await).into_response())
}

async fn update_gaps(
    State(state): State<Arc<AdminState>>,
    Json(cfg): Json<GapDetectorConfig>,
) -> ApiResult<Response> {
    if cfg.interval_secs == 0 || cfg.windows_hours.is_empty() {
        return Err(AppError::Config("interval_secs and windows_hours must be set".into()).into());
    }

    let interval = Duration::from_secs(cfg.interval_secs);
    let interval_changed = state.gap_worker.interval() != interval;
    state.detector.update_config(cfg);

    if interval_changed {
        state.gap_worker.set_interval(interval);
        state.watchdog.restart_worker(GAP_DETECTOR).await?;
    }
    Ok(Json(state.detector.config()).into_response())
}

fn validate_watchdog(cfg: &WatchdogConfig) -> AppResult<()> {
    if cfg.check_interval_secs == 0 || cfg.failure_threshold == 0 {
        return Err(AppError::Config(
            "check_interval_secs and failure_threshold must be positive".into(),
        ));
    }
    Ok(())
}

/// Bind and serve the admin API in the background.
pub async fn start_server(
    bind: &str,
    state: AdminState,
) -> AppResult<tokio::task::JoinHandle<Result<(), std::io::Error>>> {
    let router = create_router(state);
    let listener = tokio::net::TcpListener::bind(bind).await?;
    info!("Admin API listening on {}", bind);

    Ok(tokio::spawn(async move { axum::serve(listener, router).await }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::db::initialize::init_db;
    use crate::gateway::MemoryGateway;
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    async fn make_router(limit: usize) -> Router {
        let pool = DbPool::in_memory().unwrap();
        init_db(&pool).unwrap();
        let cfg = Config::default();
        let pipeline = Pipeline::build(&cfg, pool, Arc::new(MemoryGateway::new()))
            .await
            .unwrap();
        let admin = AdminConfig {
            manual_sync_limit: limit,
            ..AdminConfig::default()
        };
        create_router(AdminState::new(&pipeline, &admin))
    }

    async fn body_json(resp: Response) -> serde_json::Value {
        let body = axum::body::to_bytes(resp.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&body).unwrap()
    }

    fn request(method: &str, uri: &str, body: Option<serde_json::Value>) -> Request<Body> {
        let builder = Request::builder().method(method).uri(uri);
        match body {
            Some(v) => builder
                .header("content-type", "application/json")
                .body(Body::from(v.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        }
    }

    #[tokio::test]
    async fn health_lists_all_workers() {
        let app = make_router(5).await;
        let resp = app.oneshot(request("GET", "/health", None)).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let json = body_json(resp).await;
        assert_eq!(json["total"], 3);
        assert_eq!(json["workers"][0]["name"], "puller");
    }

    #[tokio::test]
    async fn manual_sync_is_throttled() {
        let app = make_router(1).await;
        let first = app
            .clone()
            .oneshot(request("POST", "/sync/incremental", None))
            .await
            .unwrap();
        assert_eq!(first.status(), StatusCode::OK);
        let json = body_json(first).await;
        assert_eq!(json["outcome"], "completed");

        let second = app
            .oneshot(request("POST", "/sync/incremental", None))
            .await
            .unwrap();
        assert_eq!(second.status(), StatusCode::TOO_MANY_REQUESTS);
    }

    #[tokio::test]
    async fn status_reports_ledger_after_sync() {
        let app = make_router(5).await;
        app.clone()
            .oneshot(request("POST", "/sync/incremental", None))
            .await
            .unwrap();
        let resp = app
            .oneshot(request("GET", "/sync/status", None))
            .await
            .unwrap();
        let json = body_json(resp).await;
        assert_eq!(json["ledger"][0]["kind"], "incremental");
        assert_eq!(json["ledger"][0]["state"], "completed");
        assert_eq!(json["running"]["incremental"], false);
    }

    #[tokio::test]
    async fn historical_rejects_bad_dates() {
        let app = make_router(5).await;
        let resp = app
            .oneshot(request(
                "POST",
                "/sync/historical",
                Some(json!({ "from": "2025-02-01", "to": "2025-01-01" })),
            ))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn historical_runs_in_background() {
        let app = make_router(5).await;
        let resp = app
            .clone()
            .oneshot(request(
                "POST",
                "/sync/historical",
                Some(json!({ "from": "2025-01-01", "to": "2025-01-31" })),
            ))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::ACCEPTED);

        let mut state = serde_json::Value::Null;
        for _ in 0..50 {
            let resp = app
                .clone()
                .oneshot(request("GET", "/sync/status", None))
                .await
                .unwrap();
            let json = body_json(resp).await;
            state = json["ledger"]
                .as_array()
                .and_then(|rows| rows.iter().find(|r| r["kind"] == "historical"))
                .map(|r| r["state"].clone())
                .unwrap_or_default();
            if state == "completed" {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert_eq!(state, "completed");
    }

    #[tokio::test]
    async fn restart_of_unknown_worker_is_404() {
        let app = make_router(5).await;
        let resp = app
            .oneshot(request("POST", "/workers/nope/restart", None))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn gap_config_can_be_tuned() {
        let app = make_router(5).await;
        let resp = app
            .oneshot(request(
                "PUT",
                "/config/gaps",
                Some(json!({ "interval_secs": 900, "windows_hours": [1, 2] })),
            ))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let json = body_json(resp).await;
        assert_eq!(json["windows_hours"], json!([1, 2]));
        assert_eq!(json["thresholds"]["critical_pct"], 50.0);
    }

    #[tokio::test]
    async fn watchdog_config_rejects_zero_threshold() {
        let app = make_router(5).await;
        let resp = app
            .oneshot(request(
                "PUT",
                "/config/watchdog",
                Some(json!({ "failure_threshold": 0 })),
            ))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }
}
