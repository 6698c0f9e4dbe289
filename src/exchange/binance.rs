//! Binance spot public market data

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::Deserialize;

use super::{parse_levels, split_symbol, usable_price, OrderBook, PriceSource, RestClient, Ticker};
use crate::error::FetchError;

const API_BASE: &str = "https://api.binance.com";
const NAME: &str = "binance";
/// Largest depth the endpoint serves
const MAX_DEPTH: usize = 5000;

#[derive(Debug, Deserialize)]
struct TickerPriceResponse {
    price: Option<String>,
}

#[derive(Debug, Deserialize)]
struct DepthResponse {
    bids: Vec<Vec<String>>,
    asks: Vec<Vec<String>>,
}

pub struct BinanceSource {
    client: RestClient,
    fee_percent: Decimal,
}

impl BinanceSource {
    pub fn new(client: RestClient, fee_percent: Decimal) -> Self {
        Self { client, fee_percent }
    }

    /// `ABC/USDT` -> `ABCUSDT`
    fn native_symbol(symbol: &str) -> Result<String, FetchError> {
        Ok(match split_symbol(symbol)? {
            Some((base, quote)) => format!("{}{}", base, quote).to_uppercase(),
            None => symbol.to_uppercase(),
        })
    }
}

#[async_trait]
impl PriceSource for BinanceSource {
    fn name(&self) -> &str {
        NAME
    }

    fn fee_rate_percent(&self) -> Decimal {
        self.fee_percent
    }

    async fn fetch_ticker(&self, symbol: &str) -> Result<Ticker, FetchError> {
        let native = Self::native_symbol(symbol)?;
        let url = format!("{}/api/v3/ticker/price", API_BASE);
        let resp: TickerPriceResponse = self
            .client
            .get_json(NAME, &url, &[("symbol", native)])
            .await?;

        usable_price(NAME, symbol, resp.price.as_deref())
    }

    async fn fetch_order_book(&self, symbol: &str, depth: usize) -> Result<OrderBook, FetchError> {
        let native = Self::native_symbol(symbol)?;
        let url = format!("{}/api/v3/depth", API_BASE);
        let limit = depth.clamp(1, MAX_DEPTH);
        let resp: DepthResponse = self
            .client
            .get_json(NAME, &url, &[("symbol", native), ("limit", limit.to_string())])
            .await?;

        Ok(OrderBook::new(
            parse_levels(NAME, &resp.bids)?,
            parse_levels(NAME, &resp.asks)?,
            depth,
        ))
    }
}
