use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::external::price_provider::ExternalPricePoint;

// A single closing price as rendered to clients (rounded to cents).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PricePoint {
    pub date: NaiveDate,
    pub close: f64,
}

impl From<&ExternalPricePoint> for PricePoint {
    fn from(point: &ExternalPricePoint) -> Self {
        Self {
            date: point.date,
            close: round_cents(point.close),
        }
    }
}

pub fn round_cents(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
