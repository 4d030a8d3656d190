use axum::extract::{Path, State};
use axum::routing::get;
use axum::{Json, Router};
use tracing::info;

use crate::errors::AppError;
use crate::models::{JobKey, JobKind, JobStatus, Symbol};
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_jobs))
        .route("/:kind/:symbol", get(job_status))
}

/// GET /api/jobs - Every known job record
async fn list_jobs(State(state): State<AppState>) -> Json<Vec<JobStatus>> {
    info!("GET /api/jobs - Listing job records");
    Json(state.jobs.snapshot())
}

/// GET /api/jobs/:kind/:symbol - Status of one job, never starts work
async fn job_status(
    Path((kind, symbol)): Path<(String, String)>,
    State(state): State<AppState>,
) -> Result<Json<JobStatus>, AppError> {
    let kind: JobKind = kind.parse()?;
    let symbol = Symbol::parse(&symbol)?;
    info!("GET /api/jobs/{}/{} - Getting job status", kind, symbol);

    Ok(Json(state.jobs.peek(&JobKey::new(symbol, kind))))
}
