use std::time::Duration;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::{round_cents, JobFailure, JobKey, JobKind, Symbol};
use crate::services::job_registry::JobTicket;
use crate::services::prediction_service;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/train/:symbol", post(train))
        .route("/train/:symbol/retrain", post(retrain))
        .route("/predict/:symbol", get(predict))
        .route("/models", get(list_models))
}

#[derive(Debug, Default, Deserialize)]
pub struct TrainParams {
    /// Block up to this many seconds for the run to finish, capped at the
    /// configured job wait timeout. Default: don't wait.
    pub wait_secs: Option<u64>,
}

#[derive(Debug, Serialize)]
pub struct TrainResponse {
    pub symbol: Symbol,
    /// `success`, `started` or `running`.
    pub status: &'static str,
    pub run_id: Option<Uuid>,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct PredictionResponse {
    pub symbol: Symbol,
    pub last_actual_price: f64,
    pub next_day_prediction: f64,
    pub training_range: String,
    pub retraining: bool,
    /// Set when the latest retrain failed and an older model is being served.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<JobFailure>,
}

#[derive(Debug, Serialize)]
pub struct ModelsResponse {
    pub trained_models: Vec<Symbol>,
}

/// POST /api/train/:symbol - Start (or join) a training run
pub async fn train(
    Path(symbol): Path<String>,
    Query(params): Query<TrainParams>,
    State(state): State<AppState>,
) -> Result<(StatusCode, Json<TrainResponse>), AppError> {
    let symbol = Symbol::parse(&symbol)?;
    info!("POST /api/train/{} - Training model", symbol);

    let ticket = state.jobs.get_or_start(JobKey::train(symbol.clone()));
    let wait = state.config.request_wait(params.wait_secs, Duration::ZERO);
    respond(symbol, ticket, wait).await
}

/// POST /api/train/:symbol/retrain - Discard the current model and train again
pub async fn retrain(
    Path(symbol): Path<String>,
    Query(params): Query<TrainParams>,
    State(state): State<AppState>,
) -> Result<(StatusCode, Json<TrainResponse>), AppError> {
    let symbol = Symbol::parse(&symbol)?;
    info!("POST /api/train/{}/retrain - Retraining model", symbol);

    let ticket = state
        .jobs
        .invalidate(JobKey::train(symbol.clone()))
        .map_err(|e| {
            warn!("Retrain rejected for {}: {}", symbol, e);
            e
        })?;
    let wait = state.config.request_wait(params.wait_secs, Duration::ZERO);
    respond(symbol, ticket, wait).await
}

async fn respond(
    symbol: Symbol,
    ticket: JobTicket,
    wait: Duration,
) -> Result<(StatusCode, Json<TrainResponse>), AppError> {
    let run_id = ticket.run_id();
    let in_flight_status = match &ticket {
        JobTicket::Ready(_) => "success",
        JobTicket::Started(_) => "started",
        JobTicket::Joined(_) => "running",
    };

    let outcome = match ticket {
        JobTicket::Ready(result) => Some(Ok(result)),
        _ if wait.is_zero() => None,
        pending => pending.outcome(wait).await,
    };

    match outcome {
        Some(Ok(_)) => Ok((
            StatusCode::OK,
            Json(TrainResponse {
                message: format!("Model for {} trained successfully.", symbol),
                symbol,
                status: "success",
                run_id,
            }),
        )),
        Some(Err(failure)) => {
            error!("Training failed for {}: {}", symbol, failure);
            Err(failure.into())
        }
        None => Ok((
            StatusCode::ACCEPTED,
            Json(TrainResponse {
                message: format!("Training for {} is in progress.", symbol),
                symbol,
                status: in_flight_status,
                run_id,
            }),
        )),
    }
}

/// GET /api/predict/:symbol - Forecast from the trained model
pub async fn predict(
    Path(symbol): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<PredictionResponse>, AppError> {
    let symbol = Symbol::parse(&symbol)?;
    info!("GET /api/predict/{} - Getting prediction", symbol);

    let lookup = prediction_service::fetch_prediction(&state.jobs, &symbol)?;
    let prediction = lookup.model.prediction;

    Ok(Json(PredictionResponse {
        symbol,
        last_actual_price: round_cents(prediction.last_actual_price),
        next_day_prediction: round_cents(prediction.next_day_prediction),
        training_range: prediction.training_range,
        retraining: lookup.retraining,
        last_error: lookup.last_error,
    }))
}

/// GET /api/models - Symbols with a trained model
pub async fn list_models(State(state): State<AppState>) -> Json<ModelsResponse> {
    info!("GET /api/models - Listing trained models");
    Json(ModelsResponse {
        trained_models: state.jobs.succeeded(JobKind::Train),
    })
}
