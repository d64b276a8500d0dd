use axum::{
    Json, Router,
    extract::{Query, State},
    response::sse::{KeepAlive, Sse},
    routing::get,
};
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use tower_http::cors::CorsLayer;

use horizon_core::assemble::assemble;
use horizon_core::model::{ConcreteTransfer, GroupingMode, PredictionParams, simplify_transfers};
use horizon_core::plan::plan_day;
use horizon_core::prediction::{CancelFlag, PredictionInput, predict};
use horizon_core::PredictionError;

use crate::error::{ApiError, ApiResult};
use crate::sse::EventStream;
use crate::state::AppState;
use crate::{db, sse};

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/api/predict/stream", get(predict_stream))
        .route("/api/transfers/plan", get(plan_transfers))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn healthz() -> &'static str {
    "ok"
}

#[derive(Debug, Deserialize)]
struct PredictQuery {
    duration: Option<i32>,
    samples: Option<usize>,
    quantile: Option<f64>,
    snapshot_cron: Option<String>,
    group_by: Option<String>,
    seed: Option<u64>,
}

impl PredictQuery {
    fn into_params(self) -> ApiResult<(PredictionParams, Option<u64>)> {
        let mut params = PredictionParams::default();
        if let Some(duration) = self.duration {
            if duration <= 0 {
                return Err(ApiError::ValidationError {
                    field: "duration".to_string(),
                    message: "must be a positive number of days".to_string(),
                });
            }
            params.duration_days = duration;
        }
        if let Some(samples) = self.samples {
            if samples == 0 {
                return Err(ApiError::ValidationError {
                    field: "samples".to_string(),
                    message: "must be positive".to_string(),
                });
            }
            params.samples = samples;
        }
        if let Some(quantile) = self.quantile {
            if quantile <= 0.0 || quantile >= 1.0 {
                return Err(ApiError::ValidationError {
                    field: "quantile".to_string(),
                    message: "must lie in (0, 1)".to_string(),
                });
            }
            params.quantile = quantile;
        }
        if let Some(cron) = &self.snapshot_cron {
            params.snapshot_cron = cron.parse().map_err(|e| ApiError::ValidationError {
                field: "snapshot_cron".to_string(),
                message: format!("{e}"),
            })?;
        }
        if let Some(group_by) = &self.group_by {
            params.grouping = GroupingMode::parse(group_by)?;
        }
        Ok((params, self.seed))
    }
}

fn load_input(state: &AppState) -> ApiResult<PredictionInput> {
    let rows = state.with_conn(|conn| db::load_input_rows(conn).map_err(ApiError::from))?;
    Ok(assemble(
        &rows.accounts,
        &rows.snapshots,
        &rows.growth_models,
        &rows.templates,
        &rows.account_types,
        &rows.special_dates,
    )?)
}

/// Stream one prediction run as SSE: `setup`, then `balanceSnapshot` and
/// `transfer` events, then `close`. A failed run emits an `error` event
/// instead of `close`.
async fn predict_stream(
    State(state): State<AppState>,
    Query(query): Query<PredictQuery>,
) -> ApiResult<Sse<axum::response::sse::KeepAliveStream<EventStream>>> {
    let (params, seed) = query.into_params()?;
    let seed = seed.unwrap_or_else(|| jiff::Timestamp::now().as_millisecond() as u64);
    let input = load_input(&state)?;
    let today = jiff::Zoned::now().date();

    let cancel = CancelFlag::new();
    let (sink, stream) = sse::channel(64, cancel.clone());
    let error_sink = sink.clone();
    tokio::task::spawn_blocking(move || {
        match predict(&input, &params, today, seed, sink, &cancel) {
            Ok(_) => {}
            Err(PredictionError::Cancelled) => {
                tracing::debug!("prediction cancelled by client");
            }
            Err(err) => {
                tracing::error!("prediction run failed: {err}");
                error_sink.send_error(&err.to_string());
            }
        }
    });

    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}

#[derive(Debug, Deserialize)]
struct PlanQuery {
    day: Option<String>,
    seed: Option<u64>,
}

#[derive(Debug, Serialize)]
struct PlanResponse {
    transfers: Vec<ConcreteTransfer>,
    /// True when a template needed a manual amount (or was clamped) and was
    /// left out of the plan.
    incomplete: bool,
}

/// The simplified concrete transfers to perform on a given day.
async fn plan_transfers(
    State(state): State<AppState>,
    Query(query): Query<PlanQuery>,
) -> ApiResult<Json<PlanResponse>> {
    let day = match &query.day {
        Some(raw) => raw.parse().map_err(|e| ApiError::ValidationError {
            field: "day".to_string(),
            message: format!("{e}"),
        })?,
        None => jiff::Zoned::now().date(),
    };
    let seed = query
        .seed
        .unwrap_or_else(|| jiff::Timestamp::now().as_millisecond() as u64);
    let input = load_input(&state)?;

    let plan = tokio::task::spawn_blocking(move || {
        plan_day(
            &input.entities,
            &input.templates,
            &FxHashMap::default(),
            day,
            seed,
        )
    })
    .await
    .map_err(|_| ApiError::PredictionError("planning task failed".to_string()))??;

    Ok(Json(PlanResponse {
        transfers: simplify_transfers(&plan.transfers),
        incomplete: plan.incomplete,
    }))
}
