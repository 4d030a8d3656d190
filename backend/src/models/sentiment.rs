use serde::{Deserialize, Serialize};

/// Aggregate news sentiment for a symbol.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SentimentResult {
    pub score: f64, // -1.0 to +1.0
    pub headlines: Vec<String>,
}
