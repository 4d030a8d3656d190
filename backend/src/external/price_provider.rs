use async_trait::async_trait;
use chrono::NaiveDate;
use thiserror::Error;

use crate::models::{RangeSpec, Symbol};

#[derive(Debug, Clone, PartialEq)]
pub struct ExternalPricePoint {
    pub date: NaiveDate,
    pub close: f64,
}

/// Time-ordered closes for a range plus the provider's last known price.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PriceHistory {
    pub points: Vec<ExternalPricePoint>,
    pub last_price: Option<f64>,
}

#[derive(Debug, Error)]
pub enum PriceProviderError {
    #[error("network error: {0}")]
    Network(String),

    #[error("bad response: {0}")]
    BadResponse(String),

    #[error("parse error: {0}")]
    Parse(String),

    #[error("rate limited")]
    RateLimited,

    #[error("unknown symbol: {0}")]
    UnknownSymbol(String),
}

#[async_trait]
pub trait PriceProvider: Send + Sync {
    async fn fetch_history(
        &self,
        symbol: &Symbol,
        range: RangeSpec,
    ) -> Result<PriceHistory, PriceProviderError>;
}
