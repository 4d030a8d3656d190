use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{bail, ensure, Context};

use crate::models::Symbol;
use crate::services::job_registry::ExpiryPolicy;
use crate::services::process_invoker::CommandSpec;

const DEFAULT_TOP_COMPANIES: &str = "AAPL,MSFT,AMZN,GOOGL,TSLA,NVDA,META";

/// Runtime configuration, read once at startup.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub bind_addr: SocketAddr,
    pub train_command: CommandSpec,
    pub sentiment_command: CommandSpec,
    pub job_workdir: Option<PathBuf>,
    /// Default and upper bound on how long a request waits for a running job.
    pub job_wait_timeout: Duration,
    pub expiry: ExpiryPolicy,
    pub history_cache_capacity: usize,
    pub history_cache_ttl: Duration,
    pub market_data_url: String,
    pub market_data_max_concurrent: usize,
    pub market_data_requests_per_minute: u32,
    pub top_companies: Vec<Symbol>,
    pub cors_allow_origin: String,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let get = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());

        let train_timeout = secs(&lookup, "TRAIN_TIMEOUT_SECS", 900)?;
        let sentiment_timeout = secs(&lookup, "SENTIMENT_TIMEOUT_SECS", 60)?;
        ensure!(!train_timeout.is_zero(), "TRAIN_TIMEOUT_SECS must be greater than zero");
        ensure!(!sentiment_timeout.is_zero(), "SENTIMENT_TIMEOUT_SECS must be greater than zero");

        let train_epochs: u32 = parse(&lookup, "TRAIN_EPOCHS", 10)?;
        ensure!(train_epochs > 0, "TRAIN_EPOCHS must be greater than zero");

        let train_template = get("TRAIN_COMMAND", "python3 train_model.py {symbol} {epochs}");
        let Some(train_command) = CommandSpec::from_template(&train_template, train_timeout) else {
            bail!("TRAIN_COMMAND must not be empty");
        };
        let train_command = train_command.with_var("epochs", train_epochs);
        let sentiment_template = get("SENTIMENT_COMMAND", "python3 sentiment_analysis.py {symbol}");
        let Some(sentiment_command) = CommandSpec::from_template(&sentiment_template, sentiment_timeout) else {
            bail!("SENTIMENT_COMMAND must not be empty");
        };

        let history_cache_capacity: usize = parse(&lookup, "HISTORY_CACHE_CAPACITY", 256)?;
        ensure!(history_cache_capacity > 0, "HISTORY_CACHE_CAPACITY must be greater than zero");

        let top_companies = get("TOP_COMPANIES", DEFAULT_TOP_COMPANIES)
            .split(',')
            .filter(|s| !s.trim().is_empty())
            .map(Symbol::parse)
            .collect::<Result<Vec<_>, _>>()
            .context("TOP_COMPANIES")?;

        Ok(Self {
            bind_addr: parse(&lookup, "BIND_ADDR", SocketAddr::from(([0, 0, 0, 0], 8000)))?,
            train_command,
            sentiment_command,
            job_workdir: lookup("JOB_WORKDIR").filter(|s| !s.is_empty()).map(PathBuf::from),
            job_wait_timeout: secs(&lookup, "JOB_WAIT_TIMEOUT_SECS", 30)?,
            expiry: ExpiryPolicy {
                train_ttl: optional_secs(&lookup, "MODEL_TTL_SECS")?,
                sentiment_ttl: optional_secs(&lookup, "SENTIMENT_TTL_SECS")?,
            },
            history_cache_capacity,
            history_cache_ttl: secs(&lookup, "HISTORY_CACHE_TTL_SECS", 300)?,
            market_data_url: get("MARKET_DATA_URL", "https://query1.finance.yahoo.com"),
            market_data_max_concurrent: parse(&lookup, "MARKET_DATA_MAX_CONCURRENT", 4)?,
            market_data_requests_per_minute: parse(&lookup, "MARKET_DATA_REQUESTS_PER_MINUTE", 120)?,
            top_companies,
            cors_allow_origin: get("CORS_ALLOW_ORIGIN", "*"),
        })
    }

    /// How long a request may block on a job: the caller's `wait_secs`,
    /// capped at `job_wait_timeout`, or `default` when none was given.
    pub fn request_wait(&self, wait_secs: Option<u64>, default: Duration) -> Duration {
        wait_secs
            .map(Duration::from_secs)
            .unwrap_or(default)
            .min(self.job_wait_timeout)
    }
}

fn parse<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match lookup(key) {
        Some(raw) => raw.trim().parse().with_context(|| format!("invalid {}: {:?}", key, raw)),
        None => Ok(default),
    }
}

fn secs(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: u64) -> anyhow::Result<Duration> {
    parse(lookup, key, default).map(Duration::from_secs)
}

fn optional_secs(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> anyhow::Result<Option<Duration>> {
    match lookup(key).filter(|s| !s.trim().is_empty()) {
        Some(_) => secs(lookup, key, 0).map(Some),
        None => Ok(None),
    }
}
