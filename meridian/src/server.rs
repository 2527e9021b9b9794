//! Administrative HTTP surface.
//!
//! Thin JSON handlers over the engines. Batch endpoints always answer with
//! partial-success summaries; a failed item never turns the response into
//! an all-or-nothing error. Omitted `date` / `month` parameters default to
//! the current UTC day or month; this is the only place wall-clock time
//! enters.

use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::{NaiveDate, Utc};
use serde::Deserialize;
use serde_json::json;
use tower_http::cors::{Any, CorsLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use lib_economy::{
    BalanceReconciler, DistributionEngine, EngineError, RankBonusEngine, SubscriptionDirectory,
};
use lib_ledger::LedgerStore;
use lib_types::SubscriberId;

/// Request timeout for administrative calls
const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Shared handler state
#[derive(Clone)]
pub struct AppState {
    pub store: LedgerStore,
    pub directory: Arc<dyn SubscriptionDirectory>,
    pub distribution: DistributionEngine,
    pub reconciler: BalanceReconciler,
    pub rank: RankBonusEngine,
}

/// Build the administrative router
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new().allow_origin(Any).allow_methods(Any);

    Router::new()
        .route("/health", get(health_handler))
        .route("/distribution/run", post(run_distribution_handler))
        .route("/distribution/status", get(distribution_status_handler))
        .route("/wallet/reconcile/:subscriber_id", post(reconcile_handler))
        .route("/rank-bonus/evaluate", post(evaluate_rank_bonus_handler))
        .route("/rank-bonus/status", get(rank_bonus_status_handler))
        .route("/commission/status", get(commission_status_handler))
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(Duration::from_secs(REQUEST_TIMEOUT_SECS)))
        .layer(cors)
        .with_state(state)
}

#[derive(Debug, Deserialize)]
struct DateQuery {
    date: Option<NaiveDate>,
}

#[derive(Debug, Deserialize)]
struct MonthQuery {
    month: Option<String>,
}

fn today() -> NaiveDate {
    Utc::now().date_naive()
}

fn current_month() -> String {
    Utc::now().format("%Y-%m").to_string()
}

/// Map engine errors onto the admin surface.
///
/// Transient collaborator outages are 503 (retry the idempotent call);
/// bad arguments are 400; the rest is 500.
fn error_response(err: EngineError) -> Response {
    let status = match &err {
        EngineError::InvalidMonth(_) | EngineError::InvalidTier(_) => StatusCode::BAD_REQUEST,
        EngineError::GraphUnavailable(_) | EngineError::DirectoryUnavailable(_) => {
            StatusCode::SERVICE_UNAVAILABLE
        }
        EngineError::Ledger(_) | EngineError::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, Json(json!({ "error": err.to_string() }))).into_response()
}

async fn health_handler() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

async fn run_distribution_handler(
    State(state): State<AppState>,
    Query(query): Query<DateQuery>,
) -> Response {
    let date = query.date.unwrap_or_else(today);
    match state.distribution.run(date).await {
        Ok(report) => Json(json!({
            "date": date,
            "created": report.created,
            "skipped": report.skipped,
            "failed": report.failed,
        }))
        .into_response(),
        Err(err) => error_response(err),
    }
}

async fn distribution_status_handler(
    State(state): State<AppState>,
    Query(query): Query<DateQuery>,
) -> Response {
    let date = query.date.unwrap_or_else(today);

    let active = match state.directory.list_active_subscriptions(date).await {
        Ok(subs) => subs.len() as i64,
        Err(err) => return error_response(EngineError::DirectoryUnavailable(err.to_string())),
    };
    let distributed = match state.store.count_distributions(date).await {
        Ok(count) => count,
        Err(err) => return error_response(err.into()),
    };

    let coverage_pct = if active > 0 {
        (distributed as f64 / active as f64) * 100.0
    } else {
        0.0
    };

    Json(json!({
        "date": date,
        "active_subscriptions": active,
        "distributed": distributed,
        "coverage_pct": (coverage_pct * 10.0).round() / 10.0,
    }))
    .into_response()
}

async fn reconcile_handler(
    State(state): State<AppState>,
    Path(subscriber_id): Path<String>,
) -> Response {
    let subscriber = SubscriberId::new(subscriber_id);
    match state.reconciler.reconcile(&subscriber).await {
        Ok(report) => Json(json!({
            "subscriber_id": report.subscriber_id,
            "previous_balance": report.previous_balance,
            "new_balance": report.recomputed_balance,
            "delta": report.delta,
            "corrected": report.corrected,
        }))
        .into_response(),
        Err(err) => error_response(err),
    }
}

async fn evaluate_rank_bonus_handler(
    State(state): State<AppState>,
    Query(query): Query<MonthQuery>,
) -> Response {
    let month = query.month.unwrap_or_else(current_month);
    match state.rank.evaluate_all(&month).await {
        Ok(report) => Json(json!({
            "month": month,
            "evaluated": report.evaluated,
            "paid": report.paid,
            "already_evaluated": report.already_evaluated,
            "failed": report.failed,
        }))
        .into_response(),
        Err(err) => error_response(err),
    }
}

async fn rank_bonus_status_handler(
    State(state): State<AppState>,
    Query(query): Query<MonthQuery>,
) -> Response {
    let month = query.month.unwrap_or_else(current_month);
    match state.store.rank_bonus_summary(&month).await {
        Ok(summary) => Json(json!(summary)).into_response(),
        Err(err) => error_response(err.into()),
    }
}

async fn commission_status_handler(
    State(state): State<AppState>,
    Query(query): Query<DateQuery>,
) -> Response {
    let date = query.date.unwrap_or_else(today);
    match state.store.commission_summary(date).await {
        Ok(levels) => {
            let total: i64 = levels.iter().map(|l| l.total_amount).sum();
            Json(json!({
                "date": date,
                "levels": levels,
                "total_amount": total,
            }))
            .into_response()
        }
        Err(err) => error_response(err.into()),
    }
}
