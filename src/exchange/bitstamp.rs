//! Bitstamp public market data

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::Deserialize;

use super::{parse_levels, split_symbol, usable_price, OrderBook, PriceSource, RestClient, Ticker};
use crate::error::FetchError;

const API_BASE: &str = "https://www.bitstamp.net";
const NAME: &str = "bitstamp";

#[derive(Debug, Deserialize)]
struct TickerResponse {
    last: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OrderBookResponse {
    #[serde(default)]
    bids: Vec<Vec<String>>,
    #[serde(default)]
    asks: Vec<Vec<String>>,
}

pub struct BitstampSource {
    client: RestClient,
    fee_percent: Decimal,
}

impl BitstampSource {
    pub fn new(client: RestClient, fee_percent: Decimal) -> Self {
        Self { client, fee_percent }
    }

    /// `ABC/USD` -> `abcusd`
    fn native_symbol(symbol: &str) -> Result<String, FetchError> {
        Ok(match split_symbol(symbol)? {
            Some((base, quote)) => format!("{}{}", base, quote).to_lowercase(),
            None => symbol.to_lowercase(),
        })
    }
}

#[async_trait]
impl PriceSource for BitstampSource {
    fn name(&self) -> &str {
        NAME
    }

    fn fee_rate_percent(&self) -> Decimal {
        self.fee_percent
    }

    async fn fetch_ticker(&self, symbol: &str) -> Result<Ticker, FetchError> {
        let url = format!("{}/api/v2/ticker/{}/", API_BASE, Self::native_symbol(symbol)?);
        let resp: TickerResponse = self.client.get_json(NAME, &url, &[]).await?;

        usable_price(NAME, symbol, resp.last.as_deref())
    }

    /// Bitstamp always returns the full book; it is cut to `depth` locally
    async fn fetch_order_book(&self, symbol: &str, depth: usize) -> Result<OrderBook, FetchError> {
        let url = format!(
            "{}/api/v2/order_book/{}/",
            API_BASE,
            Self::native_symbol(symbol)?
        );
        let resp: OrderBookResponse = self.client.get_json(NAME, &url, &[]).await?;

        Ok(OrderBook::new(
            parse_levels(NAME, &resp.bids)?,
            parse_levels(NAME, &resp.asks)?,
            depth,
        ))
    }
}
