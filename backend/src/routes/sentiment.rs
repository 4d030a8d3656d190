use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::{JobKey, Symbol};
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/:symbol", get(get_sentiment))
        .route("/:symbol/refresh", post(refresh_sentiment))
}

/// Query parameters for sentiment analysis
#[derive(Debug, Default, Deserialize)]
pub struct SentimentQueryParams {
    /// Seconds to wait for a running analysis (default: JOB_WAIT_TIMEOUT_SECS)
    pub wait_secs: Option<u64>,
}

#[derive(Debug, Serialize)]
pub struct SentimentResponse {
    pub symbol: Symbol,
    pub sentiment: f64,
    pub headlines: Vec<String>,
    pub message: &'static str,
}

#[derive(Debug, Serialize)]
pub struct RefreshResponse {
    pub symbol: Symbol,
    pub status: &'static str,
    pub run_id: Option<Uuid>,
}

/// GET /api/sentiment/:symbol
/// Query params: wait_secs
pub async fn get_sentiment(
    Path(symbol): Path<String>,
    Query(params): Query<SentimentQueryParams>,
    State(state): State<AppState>,
) -> Result<Json<SentimentResponse>, AppError> {
    let symbol = Symbol::parse(&symbol)?;
    info!("GET /api/sentiment/{} - Analyzing sentiment", symbol);

    let key = JobKey::sentiment(symbol.clone());
    let wait = state
        .config
        .request_wait(params.wait_secs, state.config.job_wait_timeout);

    let ticket = state.jobs.get_or_start(key.clone());
    let run_id = ticket.run_id();
    let payload = match ticket.outcome(wait).await {
        Some(Ok(payload)) => payload,
        Some(Err(failure)) => {
            warn!("Sentiment analysis failed for {}: {}", symbol, failure);
            return Err(failure.into());
        }
        None => return Err(AppError::Pending { key, run_id }),
    };

    let result = payload
        .as_sentiment()
        .ok_or_else(|| AppError::Internal(format!("sentiment record for {} holds a non-sentiment payload", symbol)))?;

    let message = if result.headlines.is_empty() {
        "No news found for this symbol"
    } else {
        "Sentiment analysis successful"
    };

    Ok(Json(SentimentResponse {
        symbol,
        sentiment: result.score,
        headlines: result.headlines.clone(),
        message,
    }))
}

/// POST /api/sentiment/:symbol/refresh - Discard the cached score and analyze again
pub async fn refresh_sentiment(
    Path(symbol): Path<String>,
    State(state): State<AppState>,
) -> Result<(StatusCode, Json<RefreshResponse>), AppError> {
    let symbol = Symbol::parse(&symbol)?;
    info!("POST /api/sentiment/{}/refresh - Refreshing sentiment", symbol);

    let ticket = state.jobs.invalidate(JobKey::sentiment(symbol.clone()))?;

    Ok((
        StatusCode::ACCEPTED,
        Json(RefreshResponse {
            symbol,
            status: "started",
            run_id: ticket.run_id(),
        }),
    ))
}
