use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use super::{SentimentResult, Symbol, TrainedModel};

/// Kind of memoizable external computation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobKind {
    Train,
    Sentiment,
}

impl JobKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobKind::Train => "train",
            JobKind::Sentiment => "sentiment",
        }
    }
}

impl fmt::Display for JobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Error, PartialEq)]
#[error("unknown job kind {0:?}, expected train or sentiment")]
pub struct InvalidJobKind(pub String);

impl FromStr for JobKind {
    type Err = InvalidJobKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "train" => Ok(JobKind::Train),
            "sentiment" => Ok(JobKind::Sentiment),
            _ => Err(InvalidJobKind(s.to_string())),
        }
    }
}

/// Identifies one unit of memoizable work.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct JobKey {
    pub symbol: Symbol,
    pub kind: JobKind,
}

impl JobKey {
    pub fn new(symbol: Symbol, kind: JobKind) -> Self {
        Self { symbol, kind }
    }

    pub fn train(symbol: Symbol) -> Self {
        Self::new(symbol, JobKind::Train)
    }

    pub fn sentiment(symbol: Symbol) -> Self {
        Self::new(symbol, JobKind::Sentiment)
    }
}

impl fmt::Display for JobKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.symbol, self.kind)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    Idle,
    Running,
    Succeeded,
    Failed,
}

/// Decoded output of a successful job.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum JobPayload {
    Model(TrainedModel),
    Sentiment(SentimentResult),
}

impl JobPayload {
    pub fn as_model(&self) -> Option<&TrainedModel> {
        match self {
            JobPayload::Model(model) => Some(model),
            _ => None,
        }
    }

    pub fn as_sentiment(&self) -> Option<&SentimentResult> {
        match self {
            JobPayload::Sentiment(sentiment) => Some(sentiment),
            _ => None,
        }
    }
}

/// Why a run ended without a result. Broadcast to every waiter of the run.
#[derive(Debug, Clone, Error, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum JobFailure {
    #[error("external process timed out after {after_ms}ms")]
    Timeout { after_ms: u64 },

    #[error("external process failed ({}): {stderr}", exit_label(.exit_code))]
    ProcessFailure { exit_code: Option<i32>, stderr: String },

    #[error("external process produced malformed output: {reason}")]
    DecodeFailure { reason: String },
}

fn exit_label(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("exit code {}", code),
        None => "no exit code".to_string(),
    }
}

pub type JobOutcome = Result<Arc<JobPayload>, JobFailure>;

/// Point-in-time view of a job record, used for status reporting.
#[derive(Debug, Clone, Serialize)]
pub struct JobStatus {
    pub symbol: Symbol,
    pub kind: JobKind,
    pub state: JobState,
    pub run_id: Option<Uuid>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub error: Option<JobFailure>,
    /// True when a result (current or superseded-by-a-running-retrain) is available.
    pub has_result: bool,
}
