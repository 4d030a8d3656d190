use std::sync::Arc;

use async_trait::async_trait;
use chrono::DateTime;
use serde::Deserialize;
use tracing::debug;

use crate::external::price_provider::{ExternalPricePoint, PriceHistory, PriceProvider, PriceProviderError};
use crate::models::{RangeSpec, Symbol};
use crate::services::rate_limiter::RateLimiter;

/// Yahoo Finance chart API. No API key required.
pub struct YahooProvider {
    client: reqwest::Client,
    base_url: String,
    rate_limiter: Arc<RateLimiter>,
}

impl YahooProvider {
    pub fn new(base_url: impl Into<String>, rate_limiter: Arc<RateLimiter>) -> Self {
        Self {
            client: reqwest::Client::builder()
                .user_agent("Mozilla/5.0 (compatible; StockX/0.1)")
                .build()
                .unwrap_or_else(|_| reqwest::Client::new()),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            rate_limiter,
        }
    }
}

// Minimal response structs (only what we need)
#[derive(Debug, Deserialize)]
struct YahooChartResponse {
    chart: YahooChart,
}

#[derive(Debug, Deserialize)]
struct YahooChart {
    result: Option<Vec<YahooResult>>,
    error: Option<YahooError>,
}

#[derive(Debug, Deserialize)]
struct YahooError {
    code: String,
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct YahooResult {
    meta: Option<YahooMeta>,
    // absent when the range holds no bars
    #[serde(default)]
    timestamp: Vec<i64>,
    indicators: YahooIndicators,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct YahooMeta {
    regular_market_price: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct YahooIndicators {
    #[serde(default)]
    quote: Vec<YahooQuote>,
}

#[derive(Debug, Deserialize)]
struct YahooQuote {
    #[serde(default)]
    close: Vec<Option<f64>>,
}

#[async_trait]
impl PriceProvider for YahooProvider {
    async fn fetch_history(
        &self,
        symbol: &Symbol,
        range: RangeSpec,
    ) -> Result<PriceHistory, PriceProviderError> {
        let url = format!("{}/v8/finance/chart/{}", self.base_url, symbol);

        let _guard = self
            .rate_limiter
            .acquire()
            .await
            .map_err(|e| PriceProviderError::Network(e.to_string()))?;

        debug!("Requesting {} history for {} from Yahoo", range, symbol);
        let resp = self
            .client
            .get(url)
            .query(&[("range", range.as_str()), ("interval", "1d")])
            .send()
            .await
            .map_err(|e| PriceProviderError::Network(e.to_string()))?;

        let status = resp.status();
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(PriceProviderError::RateLimited);
        }

        let body = resp
            .json::<YahooChartResponse>()
            .await
            .map_err(|e| PriceProviderError::Parse(format!("{} (HTTP {})", e, status)))?;

        parse_chart(symbol, body)
    }
}

fn parse_chart(symbol: &Symbol, body: YahooChartResponse) -> Result<PriceHistory, PriceProviderError> {
    if let Some(error) = body.chart.error {
        if error.code.eq_ignore_ascii_case("Not Found") {
            return Err(PriceProviderError::UnknownSymbol(symbol.to_string()));
        }
        return Err(PriceProviderError::BadResponse(format!(
            "{}: {}",
            error.code,
            error.description.unwrap_or_default()
        )));
    }

    let result = body
        .chart
        .result
        .and_then(|mut r| r.pop())
        .ok_or_else(|| PriceProviderError::UnknownSymbol(symbol.to_string()))?;

    let last_price = result.meta.and_then(|m| m.regular_market_price);

    // timestamp aligns with close list by index
    let closes = result
        .indicators
        .quote
        .into_iter()
        .next()
        .map(|q| q.close)
        .unwrap_or_default();

    let mut points = Vec::with_capacity(result.timestamp.len());
    for (i, ts) in result.timestamp.iter().enumerate() {
        // skip missing closes
        let Some(close) = closes.get(i).copied().flatten() else { continue };

        let dt = DateTime::from_timestamp(*ts, 0)
            .ok_or_else(|| PriceProviderError::Parse("bad timestamp".into()))?;

        points.push(ExternalPricePoint {
            date: dt.date_naive(),
            close,
        });
    }

    // Ensure ascending by date
    points.sort_by_key(|p| p.date);

    Ok(PriceHistory { points, last_price })
}
