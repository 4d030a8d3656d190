use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;

use crate::models::Symbol;

/// Information about a failed market data lookup for a symbol
#[derive(Debug, Clone)]
pub struct FailureInfo {
    pub failed_at: DateTime<Utc>,
    pub error_type: FailureType,
    pub ttl: Duration,
}

impl FailureInfo {
    fn is_live(&self, now: DateTime<Utc>) -> bool {
        now < self.failed_at + self.ttl
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum FailureType {
    UnknownSymbol, // Provider says the ticker does not exist
    RateLimited,   // Temporary upstream throttle
}

/// Negative cache for symbol lookups that are known to fail.
///
/// Keeps a mistyped ticker (or a throttled provider) from being hit on every
/// keystroke of the search box. Successful fetches clear the entry.
#[derive(Clone, Default)]
pub struct FailureCache {
    cache: Arc<DashMap<Symbol, FailureInfo>>,
}

impl FailureCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Check if a symbol is in the failure cache and the failure is still valid
    pub fn is_failed(&self, symbol: &Symbol) -> Option<FailureInfo> {
        if let Some(entry) = self.cache.get(symbol) {
            let info = entry.value().clone();
            if info.is_live(Utc::now()) {
                return Some(info);
            }
            drop(entry); // Release the read lock
            self.cache.remove(symbol);
        }
        None
    }

    pub fn record_failure(&self, symbol: &Symbol, error_type: FailureType) {
        let ttl = match error_type {
            FailureType::UnknownSymbol => Duration::minutes(30),
            FailureType::RateLimited => Duration::seconds(60),
        };

        let info = FailureInfo {
            failed_at: Utc::now(),
            error_type,
            ttl,
        };

        self.cache.insert(symbol.clone(), info);
    }

    /// Clear a symbol from the failure cache (e.g., after successful fetch)
    pub fn clear(&self, symbol: &Symbol) {
        self.cache.remove(symbol);
    }

    /// Clear all expired entries, returning how many were dropped
    pub fn cleanup_expired(&self) -> usize {
        let now = Utc::now();
        let before = self.cache.len();
        self.cache.retain(|_, info| info.is_live(now));
        before.saturating_sub(self.cache.len())
    }

    pub fn len(&self) -> usize {
        self.cache.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sym(s: &str) -> Symbol {
        Symbol::parse(s).unwrap()
    }

    #[test]
    fn test_cache_records_and_retrieves_failures() {
        let cache = FailureCache::new();

        cache.record_failure(&sym("ZZZZ"), FailureType::UnknownSymbol);

        let result = cache.is_failed(&sym("ZZZZ"));
        assert_eq!(result.unwrap().error_type, FailureType::UnknownSymbol);
    }

    #[test]
    fn test_cache_clears_symbol() {
        let cache = FailureCache::new();

        cache.record_failure(&sym("TEST"), FailureType::UnknownSymbol);
        assert!(cache.is_failed(&sym("TEST")).is_some());

        cache.clear(&sym("TEST"));
        assert!(cache.is_failed(&sym("TEST")).is_none());
    }

    #[test]
    fn test_different_ttls_for_error_types() {
        let cache = FailureCache::new();

        cache.record_failure(&sym("GONE"), FailureType::UnknownSymbol);
        cache.record_failure(&sym("BUSY"), FailureType::RateLimited);

        let unknown = cache.is_failed(&sym("GONE")).unwrap();
        let limited = cache.is_failed(&sym("BUSY")).unwrap();

        assert!(unknown.ttl > limited.ttl);
    }

    #[test]
    fn test_cleanup_drops_only_expired_entries() {
        let cache = FailureCache::new();
        cache.record_failure(&sym("LIVE"), FailureType::UnknownSymbol);
        cache.cache.insert(
            sym("OLD"),
            FailureInfo {
                failed_at: Utc::now() - Duration::hours(2),
                error_type: FailureType::RateLimited,
                ttl: Duration::seconds(60),
            },
        );

        assert_eq!(cache.cleanup_expired(), 1);
        assert_eq!(cache.len(), 1);
        assert!(cache.is_failed(&sym("LIVE")).is_some());
    }
}
