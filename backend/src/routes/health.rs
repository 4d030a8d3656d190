use axum::{routing::get, Json, Router};
use serde_json::{json, Value};
use tracing::debug;

use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(root))
        .route("/health", get(health))
}

async fn root() -> Json<Value> {
    Json(json!({ "message": "StockX API is running!" }))
}

async fn health() -> &'static str {
    debug!("GET /health - Health check");
    "OK"
}
