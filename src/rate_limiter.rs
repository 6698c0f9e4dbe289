//! Per-exchange request spacing
//!
//! Every caller targeting the same exchange shares one [`RateLimiter`], handed
//! out by the [`RateLimiterRegistry`] the scheduler owns. The check-and-update
//! of the last grant happens under one async mutex per exchange, so two
//! permits for the same key are never closer than `min_delay` no matter how
//! many monitors are live.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::Mutex;
use tokio::time::{sleep, Instant};
use tracing::debug;

/// Minimum spacing between requests to one exchange
#[derive(Debug)]
pub struct RateLimiter {
    key: String,
    min_delay: Duration,
    last_request: Mutex<Option<Instant>>,
}

impl RateLimiter {
    pub fn new(key: impl Into<String>, min_delay: Duration) -> Self {
        Self {
            key: key.into(),
            min_delay,
            last_request: Mutex::new(None),
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn min_delay(&self) -> Duration {
        self.min_delay
    }

    /// Wait for a permit and return the instant it was granted.
    ///
    /// Waiters queue on the mutex in arrival order. Dropping the future while
    /// it waits records nothing.
    pub async fn acquire(&self) -> Instant {
        let mut last = self.last_request.lock().await;

        if let Some(prev) = *last {
            let elapsed = prev.elapsed();
            if elapsed < self.min_delay {
                let wait = self.min_delay - elapsed;
                debug!("Rate limiting {}: waiting {}ms", self.key, wait.as_millis());
                sleep(wait).await;
            }
        }

        let granted = Instant::now();
        *last = Some(granted);
        granted
    }
}

/// Exchange identity -> shared limiter
#[derive(Debug)]
pub struct RateLimiterRegistry {
    delays: HashMap<String, Duration>,
    default_delay: Duration,
    limiters: DashMap<String, Arc<RateLimiter>>,
}

impl RateLimiterRegistry {
    pub fn new(delays: HashMap<String, Duration>, default_delay: Duration) -> Self {
        let delays = delays
            .into_iter()
            .map(|(k, v)| (normalize_key(&k), v))
            .collect();

        Self {
            delays,
            default_delay,
            limiters: DashMap::new(),
        }
    }

    /// Configured delay for an exchange, or the default for unknown ones
    pub fn delay_for(&self, exchange: &str) -> Duration {
        self.delays
            .get(&normalize_key(exchange))
            .copied()
            .unwrap_or(self.default_delay)
    }

    /// The limiter for `exchange`, created on first use
    pub fn limiter(&self, exchange: &str) -> Arc<RateLimiter> {
        let key = normalize_key(exchange);
        self.limiters
            .entry(key.clone())
            .or_insert_with(|| Arc::new(RateLimiter::new(key.clone(), self.delay_for(&key))))
            .clone()
    }

    pub fn len(&self) -> usize {
        self.limiters.len()
    }
}

fn normalize_key(exchange: &str) -> String {
    exchange.trim().to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_spaced(mut grants: Vec<Instant>, min_delay: Duration) {
        grants.sort();
        for pair in grants.windows(2) {
            let gap = pair[1] - pair[0];
            assert!(gap >= min_delay, "grants only {:?} apart (min {:?})", gap, min_delay);
        }
    }

    #[tokio::test]
    async fn test_sequential_grants_are_spaced() {
        let limiter = RateLimiter::new("binance", Duration::from_millis(20));
        let mut grants = Vec::new();
        for _ in 0..5 {
            grants.push(limiter.acquire().await);
        }
        assert_spaced(grants, Duration::from_millis(20));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_grants_are_spaced() {
        let registry = Arc::new(RateLimiterRegistry::new(
            HashMap::from([("kucoin".to_string(), Duration::from_millis(15))]),
            Duration::from_secs(1),
        ));

        let mut handles = Vec::new();
        for _ in 0..12 {
            let registry = registry.clone();
            handles.push(tokio::spawn(async move { registry.limiter("KuCoin").acquire().await }));
        }

        let mut grants = Vec::new();
        for handle in handles {
            grants.push(handle.await.unwrap());
        }

        assert_eq!(registry.len(), 1);
        assert_spaced(grants, Duration::from_millis(15));
    }

    #[tokio::test]
    async fn test_keys_do_not_block_each_other() {
        let registry = RateLimiterRegistry::new(
            HashMap::from([
                ("binance".to_string(), Duration::from_millis(500)),
                ("bitget".to_string(), Duration::from_millis(500)),
            ]),
            Duration::from_secs(1),
        );

        let start = Instant::now();
        registry.limiter("binance").acquire().await;
        registry.limiter("bitget").acquire().await;
        assert!(start.elapsed() < Duration::from_millis(250));
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_unknown_exchange_gets_default_delay() {
        let registry = RateLimiterRegistry::new(
            HashMap::from([("Binance".to_string(), Duration::from_millis(100))]),
            Duration::from_secs(2),
        );

        assert_eq!(registry.delay_for("binance"), Duration::from_millis(100));
        assert_eq!(registry.delay_for("somewhere"), Duration::from_secs(2));
        assert_eq!(registry.limiter("somewhere").min_delay(), Duration::from_secs(2));
        assert!(Arc::ptr_eq(&registry.limiter("BINANCE"), &registry.limiter("binance")));
    }
}
