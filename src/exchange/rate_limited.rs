use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rust_decimal::Decimal;
use tokio::time::timeout;

use super::{OrderBook, PriceSource, Ticker};
use crate::error::FetchError;
use crate::rate_limiter::RateLimiter;

/// Wraps any [`PriceSource`] so every request first takes a permit from the
/// exchange's shared limiter, then runs under a bounded timeout.
///
/// The timeout starts once the permit is granted; queueing behind other
/// callers of the same exchange does not count against it.
pub struct RateLimitedSource {
    inner: Arc<dyn PriceSource>,
    limiter: Arc<RateLimiter>,
    timeout: Duration,
}

impl RateLimitedSource {
    pub fn new(inner: Arc<dyn PriceSource>, limiter: Arc<RateLimiter>, timeout: Duration) -> Self {
        Self {
            inner,
            limiter,
            timeout,
        }
    }

    fn timed_out(&self) -> FetchError {
        FetchError::Timeout {
            exchange: self.inner.name().to_string(),
            timeout: self.timeout,
        }
    }
}

#[async_trait]
impl PriceSource for RateLimitedSource {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn fee_rate_percent(&self) -> Decimal {
        self.inner.fee_rate_percent()
    }

    async fn fetch_ticker(&self, symbol: &str) -> Result<Ticker, FetchError> {
        self.limiter.acquire().await;
        timeout(self.timeout, self.inner.fetch_ticker(symbol))
            .await
            .map_err(|_| self.timed_out())?
    }

    async fn fetch_order_book(&self, symbol: &str, depth: usize) -> Result<OrderBook, FetchError> {
        self.limiter.acquire().await;
        timeout(self.timeout, self.inner.fetch_order_book(symbol, depth))
            .await
            .map_err(|_| self.timed_out())?
    }
}
