use serde::{Deserialize, Serialize};

use super::Symbol;

/// Next-day forecast produced by a successful training run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionResult {
    pub last_actual_price: f64,
    pub next_day_prediction: f64,
    pub training_range: String,
}

/// Result payload of a Train job: the forecast plus whatever handle the
/// trainer reported for the persisted model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainedModel {
    pub symbol: Symbol,
    pub prediction: PredictionResult,
    pub model_path: Option<String>,
}
