use axum::http::{HeaderValue, Method};
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tracing::warn;

use crate::routes::{health, jobs, models, sentiment, stocks};
use crate::state::AppState;

pub fn create_app(state: AppState) -> Router {
    let cors = cors_layer(&state.config.cors_allow_origin);

    Router::<AppState>::new()
        .merge(health::router())
        .nest("/api", models::router().merge(stocks::router()))
        .nest("/api/sentiment", sentiment::router())
        .nest("/api/jobs", jobs::router())
        .layer(cors)
        .with_state(state)
}

fn cors_layer(origin: &str) -> CorsLayer {
    let layer = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST])
        .allow_headers(Any);

    if origin == "*" {
        return layer.allow_origin(Any);
    }
    match HeaderValue::from_str(origin) {
        Ok(value) => layer.allow_origin(value),
        Err(_) => {
            warn!("Ignoring invalid CORS_ALLOW_ORIGIN {:?}, allowing any origin", origin);
            layer.allow_origin(Any)
        }
    }
}
