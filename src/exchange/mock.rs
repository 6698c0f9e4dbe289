//! Scripted in-memory price source for tests

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use rust_decimal::Decimal;

use super::{OrderBook, OrderBookLevel, PriceSource, Ticker};
use crate::error::FetchError;

pub struct MockSource {
    name: String,
    fee_percent: Decimal,
    prices: Mutex<HashMap<String, Decimal>>,
    books: Mutex<HashMap<String, OrderBook>>,
    failing: Mutex<HashSet<String>>,
    delay: Mutex<Duration>,
    ticker_calls: AtomicUsize,
    book_calls: AtomicUsize,
}

impl MockSource {
    pub fn new(name: &str, fee_percent: Decimal) -> Self {
        Self {
            name: name.to_string(),
            fee_percent,
            prices: Mutex::new(HashMap::new()),
            books: Mutex::new(HashMap::new()),
            failing: Mutex::new(HashSet::new()),
            delay: Mutex::new(Duration::ZERO),
            ticker_calls: AtomicUsize::new(0),
            book_calls: AtomicUsize::new(0),
        }
    }

    pub fn set_price(&self, symbol: &str, price: Decimal) {
        self.prices.lock().insert(symbol.to_string(), price);
    }

    pub fn set_book(&self, symbol: &str, book: OrderBook) {
        self.books.lock().insert(symbol.to_string(), book);
    }

    /// Convenience: book from `(price, volume)` pairs
    pub fn set_levels(&self, symbol: &str, bids: &[(Decimal, Decimal)], asks: &[(Decimal, Decimal)]) {
        let to_levels = |rows: &[(Decimal, Decimal)]| {
            rows.iter()
                .map(|(p, v)| OrderBookLevel::new(*p, *v))
                .collect::<Vec<_>>()
        };
        self.set_book(
            symbol,
            OrderBook::new(to_levels(bids), to_levels(asks), usize::MAX),
        );
    }

    /// Every request for `symbol` fails with an HTTP status error
    pub fn fail(&self, symbol: &str) {
        self.failing.lock().insert(symbol.to_string());
    }

    /// Every request sleeps this long before answering
    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock() = delay;
    }

    pub fn ticker_calls(&self) -> usize {
        self.ticker_calls.load(Ordering::SeqCst)
    }

    pub fn book_calls(&self) -> usize {
        self.book_calls.load(Ordering::SeqCst)
    }

    async fn simulate_latency(&self, symbol: &str) -> Result<(), FetchError> {
        let delay = *self.delay.lock();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        if self.failing.lock().contains(symbol) {
            return Err(FetchError::Status {
                exchange: self.name.clone(),
                status: 503,
                body: "scripted failure".to_string(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl PriceSource for MockSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn fee_rate_percent(&self) -> Decimal {
        self.fee_percent
    }

    async fn fetch_ticker(&self, symbol: &str) -> Result<Ticker, FetchError> {
        self.ticker_calls.fetch_add(1, Ordering::SeqCst);
        self.simulate_latency(symbol).await?;

        match self.prices.lock().get(symbol) {
            Some(price) if *price > Decimal::ZERO => Ok(Ticker { last_price: *price }),
            _ => Err(FetchError::MissingPrice {
                exchange: self.name.clone(),
                symbol: symbol.to_string(),
            }),
        }
    }

    async fn fetch_order_book(&self, symbol: &str, depth: usize) -> Result<OrderBook, FetchError> {
        self.book_calls.fetch_add(1, Ordering::SeqCst);
        self.simulate_latency(symbol).await?;

        let book = self.books.lock().get(symbol).cloned().unwrap_or_default();
        Ok(OrderBook::new(book.bids, book.asks, depth))
    }
}
