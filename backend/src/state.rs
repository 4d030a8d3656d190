use std::sync::Arc;

use crate::config::AppConfig;
use crate::external::price_provider::PriceProvider;
use crate::external::yahoo::YahooProvider;
use crate::services::history_cache::HistoryCache;
use crate::services::job_registry::JobRegistry;
use crate::services::process_invoker::{Invoker, ProcessInvoker};
use crate::services::rate_limiter::RateLimiter;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub jobs: Arc<JobRegistry>,
    pub history: Arc<HistoryCache>,
}

impl AppState {
    pub fn new(config: AppConfig, invoker: Arc<dyn Invoker>, provider: Arc<dyn PriceProvider>) -> Self {
        let jobs = JobRegistry::new(invoker, config.expiry.clone());
        let history = Arc::new(HistoryCache::new(
            provider,
            config.history_cache_capacity,
            config.history_cache_ttl,
        ));
        Self {
            config: Arc::new(config),
            jobs,
            history,
        }
    }

    /// Wire the real subprocess invoker and market data provider.
    pub fn from_config(config: AppConfig) -> Self {
        let invoker = Arc::new(ProcessInvoker::new(
            config.train_command.clone(),
            config.sentiment_command.clone(),
            config.job_workdir.clone(),
        ));
        let rate_limiter = Arc::new(RateLimiter::new(
            config.market_data_max_concurrent,
            config.market_data_requests_per_minute,
        ));
        let provider = Arc::new(YahooProvider::new(config.market_data_url.clone(), rate_limiter));
        Self::new(config, invoker, provider)
    }
}
