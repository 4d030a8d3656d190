use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tracing::{debug, info, warn};

use crate::errors::AppError;
use crate::external::price_provider::{ExternalPricePoint, PriceProvider, PriceProviderError};
use crate::models::{RangeSpec, Symbol};
use crate::services::failure_cache::{FailureCache, FailureType};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct HistoryKey {
    pub symbol: Symbol,
    pub range: RangeSpec,
}

/// Provider response for one `(symbol, range)`. Never mutated once stored;
/// a refetch produces a new entry.
#[derive(Debug, PartialEq)]
pub struct HistoryCacheEntry {
    pub symbol: Symbol,
    pub range: RangeSpec,
    pub points: Vec<ExternalPricePoint>,
    pub last_price: Option<f64>,
    pub fetched_at: DateTime<Utc>,
}

impl HistoryCacheEntry {
    /// Last known price, falling back to the final close of the range.
    pub fn latest_price(&self) -> Option<f64> {
        self.last_price.or_else(|| self.points.last().map(|p| p.close))
    }
}

struct Slot {
    entry: Arc<HistoryCacheEntry>,
    stored: Instant,
    last_used: AtomicU64,
}

/// Read-through, size-bounded (LRU) cache in front of the market data provider.
///
/// Reads only take the map's shard read lock. Concurrent misses on the same
/// key may both reach the provider; the last writer's entry wins.
pub struct HistoryCache {
    provider: Arc<dyn PriceProvider>,
    failures: FailureCache,
    entries: DashMap<HistoryKey, Slot>,
    clock: AtomicU64,
    capacity: usize,
    ttl: Duration,
}

impl HistoryCache {
    pub fn new(provider: Arc<dyn PriceProvider>, capacity: usize, ttl: Duration) -> Self {
        Self {
            provider,
            failures: FailureCache::new(),
            entries: DashMap::new(),
            clock: AtomicU64::new(0),
            capacity: capacity.max(1),
            ttl,
        }
    }

    pub async fn fetch_history(
        &self,
        symbol: &Symbol,
        range: RangeSpec,
    ) -> Result<Arc<HistoryCacheEntry>, AppError> {
        let key = HistoryKey {
            symbol: symbol.clone(),
            range,
        };

        if let Some(entry) = self.lookup(&key) {
            debug!("History cache hit for {} {}", symbol, range);
            return Ok(entry);
        }

        if let Some(failure) = self.failures.is_failed(symbol) {
            debug!("Skipping provider for {}: recent {:?}", symbol, failure.error_type);
            return Err(match failure.error_type {
                FailureType::UnknownSymbol => AppError::NotFound(format!("unknown symbol {}", symbol)),
                FailureType::RateLimited => AppError::ProviderUnavailable("rate limited".to_string()),
            });
        }

        let history = match self.provider.fetch_history(symbol, range).await {
            Ok(history) => history,
            Err(PriceProviderError::UnknownSymbol(_)) => {
                info!("Provider does not know {}", symbol);
                self.failures.record_failure(symbol, FailureType::UnknownSymbol);
                return Err(AppError::NotFound(format!("unknown symbol {}", symbol)));
            }
            Err(PriceProviderError::RateLimited) => {
                warn!("Rate limited fetching {} {}", symbol, range);
                self.failures.record_failure(symbol, FailureType::RateLimited);
                return Err(AppError::ProviderUnavailable("rate limited".to_string()));
            }
            Err(e) => {
                warn!("Failed to fetch {} {}: {}", symbol, range, e);
                return Err(AppError::ProviderUnavailable(e.to_string()));
            }
        };

        self.failures.clear(symbol);
        info!("📈 Fetched {} points for {} {}", history.points.len(), symbol, range);

        // Empty ranges are stored too, so they are not refetched every request.
        let entry = Arc::new(HistoryCacheEntry {
            symbol: symbol.clone(),
            range,
            points: history.points,
            last_price: history.last_price,
            fetched_at: Utc::now(),
        });
        self.insert(key, entry.clone());
        Ok(entry)
    }

    /// Latest price for `symbol`, read through the one-day range.
    pub async fn latest_price(&self, symbol: &Symbol) -> Result<f64, AppError> {
        let entry = self.fetch_history(symbol, RangeSpec::OneDay).await?;
        entry
            .latest_price()
            .ok_or_else(|| AppError::NotFound(format!("No data found for {}", symbol)))
    }

    /// Drop entries older than the cache window and expired negative entries.
    /// Returns `(history_entries, failure_entries)` removed.
    pub fn prune_expired(&self) -> (usize, usize) {
        let before = self.entries.len();
        self.entries.retain(|_, slot| slot.stored.elapsed() < self.ttl);
        let pruned = before.saturating_sub(self.entries.len());
        (pruned, self.failures.cleanup_expired())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn tick(&self) -> u64 {
        self.clock.fetch_add(1, Ordering::Relaxed)
    }

    fn lookup(&self, key: &HistoryKey) -> Option<Arc<HistoryCacheEntry>> {
        let slot = self.entries.get(key)?;
        if slot.stored.elapsed() >= self.ttl {
            return None;
        }
        slot.last_used.store(self.tick(), Ordering::Relaxed);
        Some(slot.entry.clone())
    }

    fn insert(&self, key: HistoryKey, entry: Arc<HistoryCacheEntry>) {
        let slot = Slot {
            entry,
            stored: Instant::now(),
            last_used: AtomicU64::new(self.tick()),
        };
        self.entries.insert(key, slot);

        while self.entries.len() > self.capacity {
            let victim = self
                .entries
                .iter()
                .min_by_key(|e| e.value().last_used.load(Ordering::Relaxed))
                .map(|e| e.key().clone());
            match victim {
                Some(victim) => {
                    debug!("Evicting {} {} from history cache", victim.symbol, victim.range);
                    self.entries.remove(&victim);
                }
                None => break,
            }
        }
    }
}
