//! Bitget spot (v2) public market data

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::Deserialize;

use super::{parse_levels, split_symbol, usable_price, OrderBook, PriceSource, RestClient, Ticker};
use crate::error::FetchError;

const API_BASE: &str = "https://api.bitget.com";
const NAME: &str = "bitget";
const SUCCESS_CODE: &str = "00000";
const MAX_DEPTH: usize = 150;

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    code: String,
    #[serde(default)]
    msg: Option<String>,
    data: Option<T>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TickerRow {
    last_pr: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Depth {
    #[serde(default)]
    bids: Vec<Vec<String>>,
    #[serde(default)]
    asks: Vec<Vec<String>>,
}

pub struct BitgetSource {
    client: RestClient,
    fee_percent: Decimal,
}

impl BitgetSource {
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

    fn unwrap_envelope<T>(symbol: &str, env: Envelope<T>) -> Result<Option<T>, FetchError> {
        if env.code != SUCCESS_CODE {
            return Err(FetchError::Api {
                exchange: NAME.to_string(),
                symbol: symbol.to_string(),
                reason: format!("code {} {}", env.code, env.msg.unwrap_or_default()),
            });
        }
        Ok(env.data)
    }
}

#[async_trait]
impl PriceSource for BitgetSource {
    fn name(&self) -> &str {
        NAME
    }

    fn fee_rate_percent(&self) -> Decimal {
        self.fee_percent
    }

    async fn fetch_ticker(&self, symbol: &str) -> Result<Ticker, FetchError> {
        let native = Self::native_symbol(symbol)?;
        let url = format!("{}/api/v2/spot/market/tickers", API_BASE);
        let env: Envelope<Vec<TickerRow>> = self
            .client
            .get_json(NAME, &url, &[("symbol", native)])
            .await?;

        let rows = Self::unwrap_envelope(symbol, env)?.unwrap_or_default();
        let last = rows.first().and_then(|r| r.last_pr.as_deref());
        usable_price(NAME, symbol, last)
    }

    async fn fetch_order_book(&self, symbol: &str, depth: usize) -> Result<OrderBook, FetchError> {
        let native = Self::native_symbol(symbol)?;
        let url = format!("{}/api/v2/spot/market/orderbook", API_BASE);
        let limit = depth.clamp(1, MAX_DEPTH);
        let env: Envelope<Depth> = self
            .client
            .get_json(
                NAME,
                &url,
                &[
                    ("symbol", native),
                    ("type", "step0".to_string()),
                    ("limit", limit.to_string()),
                ],
            )
            .await?;

        let data = Self::unwrap_envelope(symbol, env)?.unwrap_or(Depth {
            bids: Vec::new(),
            asks: Vec::new(),
        });

        Ok(OrderBook::new(
            parse_levels(NAME, &data.bids)?,
            parse_levels(NAME, &data.asks)?,
            depth,
        ))
    }
}
