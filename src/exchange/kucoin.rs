//! KuCoin spot public market data

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::Deserialize;

use super::{parse_levels, split_symbol, usable_price, OrderBook, PriceSource, RestClient, Ticker};
use crate::error::FetchError;

const API_BASE: &str = "https://api.kucoin.com";
const NAME: &str = "kucoin";
const SUCCESS_CODE: &str = "200000";

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    code: String,
    #[serde(default)]
    msg: Option<String>,
    data: Option<T>,
}

#[derive(Debug, Deserialize)]
struct Level1 {
    price: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Level2 {
    #[serde(default)]
    bids: Vec<Vec<String>>,
    #[serde(default)]
    asks: Vec<Vec<String>>,
}

pub struct KucoinSource {
    client: RestClient,
    fee_percent: Decimal,
}

impl KucoinSource {
    pub fn new(client: RestClient, fee_percent: Decimal) -> Self {
        Self { client, fee_percent }
    }

    /// `ABC/USDT` -> `ABC-USDT`
    fn native_symbol(symbol: &str) -> Result<String, FetchError> {
        Ok(match split_symbol(symbol)? {
            Some((base, quote)) => format!("{}-{}", base, quote).to_uppercase(),
            None => symbol.to_uppercase(),
        })
    }

    /// Partial books come in two fixed sizes
    fn depth_endpoint(depth: usize) -> &'static str {
        if depth <= 20 {
            "level2_20"
        } else {
            "level2_100"
        }
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
impl PriceSource for KucoinSource {
    fn name(&self) -> &str {
        NAME
    }

    fn fee_rate_percent(&self) -> Decimal {
        self.fee_percent
    }

    async fn fetch_ticker(&self, symbol: &str) -> Result<Ticker, FetchError> {
        let native = Self::native_symbol(symbol)?;
        let url = format!("{}/api/v1/market/orderbook/level1", API_BASE);
        let env: Envelope<Level1> = self
            .client
            .get_json(NAME, &url, &[("symbol", native)])
            .await?;

        // Unknown symbols come back as code 200000 with null data
        let data = Self::unwrap_envelope(symbol, env)?;
        usable_price(NAME, symbol, data.as_ref().and_then(|d| d.price.as_deref()))
    }

    async fn fetch_order_book(&self, symbol: &str, depth: usize) -> Result<OrderBook, FetchError> {
        let native = Self::native_symbol(symbol)?;
        let url = format!(
            "{}/api/v1/market/orderbook/{}",
            API_BASE,
            Self::depth_endpoint(depth)
        );
        let env: Envelope<Level2> = self
            .client
            .get_json(NAME, &url, &[("symbol", native)])
            .await?;

        let data = Self::unwrap_envelope(symbol, env)?.unwrap_or(Level2 {
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

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_native_symbol() {
        assert_eq!(KucoinSource::native_symbol("btc/usdt").unwrap(), "BTC-USDT");
        assert_eq!(KucoinSource::native_symbol("BTC-USDT").unwrap(), "BTC-USDT");
    }

    #[test]
    fn test_depth_endpoint() {
        assert_eq!(KucoinSource::depth_endpoint(5), "level2_20");
        assert_eq!(KucoinSource::depth_endpoint(20), "level2_20");
        assert_eq!(KucoinSource::depth_endpoint(21), "level2_100");
    }

    #[test]
    fn test_null_data_is_missing_price() {
        let body = r#"{"code":"200000","data":null}"#;
        let env: Envelope<Level1> = serde_json::from_str(body).unwrap();
        let data = KucoinSource::unwrap_envelope("NOPE/USDT", env).unwrap();
        let result = usable_price(NAME, "NOPE/USDT", data.as_ref().and_then(|d| d.price.as_deref()));
        assert!(matches!(result, Err(FetchError::MissingPrice { .. })));
    }

    #[test]
    fn test_error_code_is_api_error() {
        let body = r#"{"code":"400100","msg":"Invalid symbol"}"#;
        let env: Envelope<Level1> = serde_json::from_str(body).unwrap();
        let err = KucoinSource::unwrap_envelope("X/USDT", env).unwrap_err();
        assert!(err.to_string().contains("400100"));
    }

    #[test]
    fn test_parse_level1() {
        let body = r#"{"code":"200000","data":{"time":1700000000000,"sequence":"1","price":"37000.1","size":"0.01","bestBid":"37000","bestBidSize":"1","bestAsk":"37000.2","bestAskSize":"1"}}"#;
        let env: Envelope<Level1> = serde_json::from_str(body).unwrap();
        let data = KucoinSource::unwrap_envelope("BTC/USDT", env).unwrap();
        let ticker = usable_price(NAME, "BTC/USDT", data.as_ref().and_then(|d| d.price.as_deref())).unwrap();
        assert_eq!(ticker.last_price, dec!(37000.1));
    }
}
