use std::collections::BTreeMap;

use axum::extract::{Path, Query, State};
use axum::routing::get;
use axum::{Json, Router};
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::errors::AppError;
use crate::models::{round_cents, PricePoint, RangeSpec, Symbol};
use crate::services::history_cache::HistoryCache;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/stock/:symbol", get(get_latest_price))
        .route("/stock/:symbol/history", get(get_history))
        .route("/stocks", get(get_multiple_prices))
        .route("/top-companies", get(get_top_companies))
}

#[derive(Debug, Deserialize)]
pub struct HistoryParams {
    pub range: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct StocksParams {
    pub symbols: String,
}

#[derive(Debug, Serialize)]
pub struct HistoryResponse {
    pub symbol: Symbol,
    pub range: RangeSpec,
    pub history: Vec<PricePoint>,
}

#[derive(Debug, Serialize)]
pub struct LatestPriceResponse {
    pub symbol: Symbol,
    pub price: f64,
}

/// A price, or `"N/A"` when it could not be fetched.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum PriceCell {
    Price(f64),
    Unavailable(&'static str),
}

#[derive(Debug, Serialize)]
pub struct PriceEntry {
    pub price: PriceCell,
}

#[derive(Debug, Serialize)]
pub struct TopCompaniesResponse {
    pub top_companies: BTreeMap<String, PriceEntry>,
}

/// GET /api/stock/:symbol/history?range=6mo
pub async fn get_history(
    Path(symbol): Path<String>,
    Query(params): Query<HistoryParams>,
    State(state): State<AppState>,
) -> Result<Json<HistoryResponse>, AppError> {
    let symbol = Symbol::parse(&symbol)?;
    let range = match params.range.as_deref() {
        Some(raw) => raw.parse::<RangeSpec>()?,
        None => RangeSpec::default(),
    };
    info!("GET /api/stock/{}/history?range={} - Getting price history", symbol, range);

    let entry = state.history.fetch_history(&symbol, range).await?;
    let history = entry.points.iter().map(PricePoint::from).collect();

    Ok(Json(HistoryResponse {
        symbol,
        range,
        history,
    }))
}

/// GET /api/stock/:symbol - Latest closing price
pub async fn get_latest_price(
    Path(symbol): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<LatestPriceResponse>, AppError> {
    let symbol = Symbol::parse(&symbol)?;
    info!("GET /api/stock/{} - Getting latest price", symbol);

    let price = state.history.latest_price(&symbol).await?;
    Ok(Json(LatestPriceResponse {
        symbol,
        price: round_cents(price),
    }))
}

/// GET /api/stocks?symbols=AAPL,MSFT
pub async fn get_multiple_prices(
    Query(params): Query<StocksParams>,
    State(state): State<AppState>,
) -> Result<Json<BTreeMap<String, PriceEntry>>, AppError> {
    let requested: Vec<String> = params
        .symbols
        .split(',')
        .map(|s| s.trim().to_uppercase())
        .filter(|s| !s.is_empty())
        .collect();
    if requested.is_empty() {
        return Err(AppError::Validation("symbols must not be empty".to_string()));
    }
    info!("GET /api/stocks - Getting latest prices for {} symbols", requested.len());

    Ok(Json(price_table(&state.history, requested).await))
}

/// GET /api/top-companies
pub async fn get_top_companies(State(state): State<AppState>) -> Json<TopCompaniesResponse> {
    info!("GET /api/top-companies - Getting top company prices");
    let symbols = state
        .config
        .top_companies
        .iter()
        .map(|s| s.as_str().to_string())
        .collect();

    Json(TopCompaniesResponse {
        top_companies: price_table(&state.history, symbols).await,
    })
}

/// Latest price per symbol, fetched concurrently. Any failure renders as `"N/A"`.
async fn price_table(history: &HistoryCache, symbols: Vec<String>) -> BTreeMap<String, PriceEntry> {
    let lookups = symbols.into_iter().map(|raw| async move {
        let price = match Symbol::parse(&raw) {
            Ok(symbol) => match history.latest_price(&symbol).await {
                Ok(price) => PriceCell::Price(round_cents(price)),
                Err(e) => {
                    warn!("No price for {}: {}", symbol, e);
                    PriceCell::Unavailable("N/A")
                }
            },
            Err(_) => PriceCell::Unavailable("N/A"),
        };
        (raw, PriceEntry { price })
    });

    join_all(lookups).await.into_iter().collect()
}
