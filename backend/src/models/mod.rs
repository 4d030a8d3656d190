mod job;
mod prediction;
mod price_point;
mod range;
mod sentiment;
mod symbol;

pub use job::{InvalidJobKind, JobFailure, JobKey, JobKind, JobOutcome, JobPayload, JobState, JobStatus};
pub use prediction::{PredictionResult, TrainedModel};
pub use price_point::{round_cents, PricePoint};
pub use range::{InvalidRange, RangeSpec};
pub use sentiment::SentimentResult;
pub use symbol::{InvalidSymbol, Symbol};
