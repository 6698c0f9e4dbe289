pub mod binance;
pub mod bitget;
pub mod bitstamp;
pub mod http;
pub mod kucoin;
pub mod rate_limited;

#[cfg(test)]
pub mod mock;

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use crate::error::FetchError;

pub use http::RestClient;
pub use rate_limited::RateLimitedSource;

/// Exchanges with a built-in REST adapter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExchangeId {
    Binance,
    Kucoin,
    Bitget,
    Bitstamp,
}

impl ExchangeId {
    pub const ALL: [ExchangeId; 4] = [
        ExchangeId::Binance,
        ExchangeId::Kucoin,
        ExchangeId::Bitget,
        ExchangeId::Bitstamp,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            ExchangeId::Binance => "binance",
            ExchangeId::Kucoin => "kucoin",
            ExchangeId::Bitget => "bitget",
            ExchangeId::Bitstamp => "bitstamp",
        }
    }

    /// Spot taker fee in percent
    pub fn default_fee_percent(&self) -> Decimal {
        match self {
            ExchangeId::Binance => dec!(0.1),
            ExchangeId::Kucoin => dec!(0.1),
            ExchangeId::Bitget => dec!(0.1),
            ExchangeId::Bitstamp => dec!(0.4),
        }
    }

    /// Minimum spacing between public market-data requests
    pub fn default_rate_delay(&self) -> Duration {
        match self {
            ExchangeId::Binance => Duration::from_millis(100),
            ExchangeId::Kucoin => Duration::from_millis(200),
            ExchangeId::Bitget => Duration::from_millis(100),
            ExchangeId::Bitstamp => Duration::from_millis(1000),
        }
    }
}

impl std::fmt::Display for ExchangeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for ExchangeId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "binance" => Ok(ExchangeId::Binance),
            "kucoin" => Ok(ExchangeId::Kucoin),
            "bitget" => Ok(ExchangeId::Bitget),
            "bitstamp" => Ok(ExchangeId::Bitstamp),
            other => Err(format!("unsupported exchange '{}'", other)),
        }
    }
}

/// Last-trade price snapshot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ticker {
    pub last_price: Decimal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrderBookLevel {
    pub price: Decimal,
    pub volume: Decimal,
}

impl OrderBookLevel {
    pub fn new(price: Decimal, volume: Decimal) -> Self {
        Self { price, volume }
    }
}

/// Depth snapshot, best level first on each side
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OrderBook {
    /// Descending by price
    pub bids: Vec<OrderBookLevel>,
    /// Ascending by price
    pub asks: Vec<OrderBookLevel>,
}

impl OrderBook {
    /// Builds a book from raw levels in any order.
    ///
    /// Levels with a non-positive price or negative volume are dropped, each
    /// side is sorted best-first and cut to `depth` levels.
    pub fn new(bids: Vec<OrderBookLevel>, asks: Vec<OrderBookLevel>, depth: usize) -> Self {
        let mut bids = sanitize(bids);
        let mut asks = sanitize(asks);

        bids.sort_by(|a, b| b.price.cmp(&a.price));
        asks.sort_by(|a, b| a.price.cmp(&b.price));
        bids.truncate(depth);
        asks.truncate(depth);

        Self { bids, asks }
    }
}

fn sanitize(levels: Vec<OrderBookLevel>) -> Vec<OrderBookLevel> {
    levels
        .into_iter()
        .filter(|l| l.price > Decimal::ZERO && l.volume >= Decimal::ZERO)
        .collect()
}

/// Market-data capability every exchange adapter implements
#[async_trait]
pub trait PriceSource: Send + Sync {
    /// Exchange identity, also the rate-limiter key
    fn name(&self) -> &str;

    /// Trading fee in percent (0-100)
    fn fee_rate_percent(&self) -> Decimal;

    async fn fetch_ticker(&self, symbol: &str) -> Result<Ticker, FetchError>;

    async fn fetch_order_book(&self, symbol: &str, depth: usize)
        -> Result<OrderBook, FetchError>;
}

/// Build the REST adapter for a supported exchange
pub fn build_source(id: ExchangeId, client: RestClient, fee_percent: Decimal) -> Arc<dyn PriceSource> {
    match id {
        ExchangeId::Binance => Arc::new(binance::BinanceSource::new(client, fee_percent)),
        ExchangeId::Kucoin => Arc::new(kucoin::KucoinSource::new(client, fee_percent)),
        ExchangeId::Bitget => Arc::new(bitget::BitgetSource::new(client, fee_percent)),
        ExchangeId::Bitstamp => Arc::new(bitstamp::BitstampSource::new(client, fee_percent)),
    }
}

/// Split a unified `BASE/QUOTE` symbol. Symbols without a slash are treated as
/// already exchange-native and returned as `None`.
pub fn split_symbol(symbol: &str) -> Result<Option<(&str, &str)>, FetchError> {
    match symbol.split_once('/') {
        Some((base, quote)) if !base.is_empty() && !quote.is_empty() && !quote.contains('/') => {
            Ok(Some((base, quote)))
        }
        Some(_) => Err(FetchError::InvalidSymbol {
            symbol: symbol.to_string(),
        }),
        None if symbol.trim().is_empty() => Err(FetchError::InvalidSymbol {
            symbol: symbol.to_string(),
        }),
        None => Ok(None),
    }
}

/// Parse a string-encoded decimal from an exchange payload
pub(crate) fn parse_decimal(exchange: &str, field: &str, raw: &str) -> Result<Decimal, FetchError> {
    Decimal::from_str(raw.trim())
        .or_else(|_| Decimal::from_scientific(raw.trim()))
        .map_err(|e| FetchError::Parse {
            exchange: exchange.to_string(),
            reason: format!("{} '{}': {}", field, raw, e),
        })
}

/// Price must be present and positive to be usable
pub(crate) fn usable_price(
    exchange: &str,
    symbol: &str,
    raw: Option<&str>,
) -> Result<Ticker, FetchError> {
    let missing = || FetchError::MissingPrice {
        exchange: exchange.to_string(),
        symbol: symbol.to_string(),
    };

    let raw = raw.filter(|s| !s.trim().is_empty()).ok_or_else(missing)?;
    let price = parse_decimal(exchange, "price", raw)?;
    if price <= Decimal::ZERO {
        return Err(missing());
    }
    Ok(Ticker { last_price: price })
}

/// Convert `[["price", "volume"], ...]` rows into levels
pub(crate) fn parse_levels(
    exchange: &str,
    rows: &[Vec<String>],
) -> Result<Vec<OrderBookLevel>, FetchError> {
    rows.iter()
        .map(|row| match row.as_slice() {
            [price, volume, ..] => Ok(OrderBookLevel::new(
                parse_decimal(exchange, "level price", price)?,
                parse_decimal(exchange, "level volume", volume)?,
            )),
            _ => Err(FetchError::Parse {
                exchange: exchange.to_string(),
                reason: format!("order book row has {} fields", row.len()),
            }),
        })
        .collect()
}
