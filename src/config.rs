//! Engine configuration
//!
//! Every option is an environment variable (a `.env` file is loaded first by
//! `main`). Values are parsed into [`EngineConfig`] and validated before the
//! scheduler starts; any problem is a [`ConfigError`].

use std::collections::HashMap;
use std::fmt::Display;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tracing::info;

use crate::assets::{AssetFiles, ExchangePair};
use crate::error::ConfigError;
use crate::exchange::ExchangeId;

// Defaults
pub const DEFAULT_ARBITRAGE_THRESHOLD: Decimal = dec!(2);
pub const DEFAULT_ABSURD_THRESHOLD: Decimal = dec!(100);
pub const DEFAULT_INVESTMENT_AMOUNT: Decimal = dec!(100);
pub const DEFAULT_ORDERBOOK_DEPTH: usize = 20;
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);
pub const DEFAULT_RATE_DELAY: Duration = Duration::from_secs(1);
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_ASSET_CONCURRENCY: usize = 4;
pub const DEFAULT_ALLOWED_QUOTES: &str = "USDT,EUR";

#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Minimum ticker profit (percent) worth confirming against the books
    pub arbitrage_threshold: Decimal,
    /// Ticker profit (percent) above which a quote is treated as bad data
    pub absurd_threshold: Decimal,
    /// Quote-currency amount each simulated trade invests
    pub investment_amount: Decimal,
    /// Order-book levels fetched and walked per side
    pub orderbook_depth: usize,
    /// Pause between the end of one round and the start of the next
    pub poll_interval: Duration,
    /// Built-in per-exchange delays merged with `PER_EXCHANGE_RATE_DELAY`
    pub rate_delays: HashMap<String, Duration>,
    pub default_rate_delay: Duration,
    pub fetch_timeout: Duration,
    pub asset_concurrency: usize,
    /// Empty means every pair in the asset file
    pub exchange_pairs: Vec<ExchangePair>,
    pub fee_overrides: HashMap<String, Decimal>,
    pub allowed_quotes: Vec<String>,
    pub asset_files: AssetFiles,
    pub assets_reload: Option<Duration>,
    pub report_dir: PathBuf,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            arbitrage_threshold: DEFAULT_ARBITRAGE_THRESHOLD,
            absurd_threshold: DEFAULT_ABSURD_THRESHOLD,
            investment_amount: DEFAULT_INVESTMENT_AMOUNT,
            orderbook_depth: DEFAULT_ORDERBOOK_DEPTH,
            poll_interval: DEFAULT_POLL_INTERVAL,
            rate_delays: builtin_rate_delays(),
            default_rate_delay: DEFAULT_RATE_DELAY,
            fetch_timeout: DEFAULT_FETCH_TIMEOUT,
            asset_concurrency: DEFAULT_ASSET_CONCURRENCY,
            exchange_pairs: Vec::new(),
            fee_overrides: HashMap::new(),
            allowed_quotes: split_list(DEFAULT_ALLOWED_QUOTES)
                .map(|q| q.to_uppercase())
                .collect(),
            asset_files: AssetFiles {
                assets: PathBuf::from("common_assets.json"),
                remove: PathBuf::from("assets_to_remove.json"),
                add: PathBuf::from("assets_to_add.json"),
            },
            assets_reload: None,
            report_dir: PathBuf::from("."),
        }
    }
}

impl EngineConfig {
    /// Create configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup; unset or blank keys take their default.
    /// The result is validated.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let mut config = Self::default();

        if let Some(v) = get("ARBITRAGE_THRESHOLD") {
            config.arbitrage_threshold = parse_value("ARBITRAGE_THRESHOLD", &v)?;
        }
        if let Some(v) = get("ABSURD_THRESHOLD") {
            config.absurd_threshold = parse_value("ABSURD_THRESHOLD", &v)?;
        }
        if let Some(v) = get("INVESTMENT_AMOUNT") {
            config.investment_amount = parse_value("INVESTMENT_AMOUNT", &v)?;
        }
        if let Some(v) = get("ORDERBOOK_DEPTH") {
            config.orderbook_depth = parse_value("ORDERBOOK_DEPTH", &v)?;
        }
        if let Some(v) = get("POLL_INTERVAL") {
            config.poll_interval = parse_seconds("POLL_INTERVAL", &v)?;
        }
        if let Some(v) = get("PER_EXCHANGE_RATE_DELAY") {
            for (exchange, raw) in parse_assignments("PER_EXCHANGE_RATE_DELAY", &v)? {
                let delay = parse_seconds("PER_EXCHANGE_RATE_DELAY", &raw)?;
                config.rate_delays.insert(exchange, delay);
            }
        }
        if let Some(v) = get("DEFAULT_RATE_DELAY") {
            config.default_rate_delay = parse_seconds("DEFAULT_RATE_DELAY", &v)?;
        }
        if let Some(v) = get("FETCH_TIMEOUT") {
            config.fetch_timeout = parse_seconds("FETCH_TIMEOUT", &v)?;
        }
        if let Some(v) = get("ASSET_CONCURRENCY") {
            config.asset_concurrency = parse_value("ASSET_CONCURRENCY", &v)?;
        }
        if let Some(v) = get("EXCHANGE_PAIRS") {
            config.exchange_pairs = split_list(&v)
                .map(ExchangePair::parse)
                .collect::<Result<_, _>>()?;
        }
        if let Some(v) = get("EXCHANGE_FEES") {
            for (exchange, raw) in parse_assignments("EXCHANGE_FEES", &v)? {
                let fee = parse_value("EXCHANGE_FEES", &raw)?;
                config.fee_overrides.insert(exchange, fee);
            }
        }
        if let Some(v) = get("ALLOWED_QUOTES") {
            config.allowed_quotes = split_list(&v).map(|q| q.to_uppercase()).collect();
        }
        if let Some(v) = get("ASSETS_FILE") {
            config.asset_files.assets = PathBuf::from(v.trim());
        }
        if let Some(v) = get("ASSETS_REMOVE_FILE") {
            config.asset_files.remove = PathBuf::from(v.trim());
        }
        if let Some(v) = get("ASSETS_ADD_FILE") {
            config.asset_files.add = PathBuf::from(v.trim());
        }
        if let Some(v) = get("ASSETS_RELOAD_SECS") {
            config.assets_reload = Some(parse_seconds("ASSETS_RELOAD_SECS", &v)?);
        }
        if let Some(v) = get("REPORT_DIR") {
            config.report_dir = PathBuf::from(v.trim());
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        positive_decimal("ARBITRAGE_THRESHOLD", self.arbitrage_threshold)?;
        positive_decimal("ABSURD_THRESHOLD", self.absurd_threshold)?;
        positive_decimal("INVESTMENT_AMOUNT", self.investment_amount)?;
        if self.absurd_threshold <= self.arbitrage_threshold {
            return Err(ConfigError::AbsurdBelowArbitrage {
                absurd: self.absurd_threshold,
                arbitrage: self.arbitrage_threshold,
            });
        }
        positive_count("ORDERBOOK_DEPTH", self.orderbook_depth)?;
        positive_count("ASSET_CONCURRENCY", self.asset_concurrency)?;
        positive_duration("POLL_INTERVAL", self.poll_interval)?;
        positive_duration("FETCH_TIMEOUT", self.fetch_timeout)?;
        if let Some(every) = self.assets_reload {
            positive_duration("ASSETS_RELOAD_SECS", every)?;
        }
        for (exchange, fee) in &self.fee_overrides {
            validate_fee(exchange, *fee)?;
        }
        Ok(())
    }

    /// Fee for an exchange: override first, then the built-in rate.
    /// `None` for an exchange with neither.
    pub fn fee_for(&self, exchange: &str) -> Option<Decimal> {
        let key = exchange.trim().to_lowercase();
        self.fee_overrides.get(&key).copied().or_else(|| {
            ExchangeId::from_str(&key)
                .ok()
                .map(|id| id.default_fee_percent())
        })
    }

    /// Log configuration on startup
    pub fn log_config(&self) {
        info!("=== Engine Configuration ===");
        info!("Arbitrage threshold: {}%", self.arbitrage_threshold);
        info!("Absurd threshold: {}%", self.absurd_threshold);
        info!("Investment amount: {}", self.investment_amount);
        info!("Order book depth: {}", self.orderbook_depth);
        info!("Poll interval: {:?}", self.poll_interval);
        info!("Fetch timeout: {:?}", self.fetch_timeout);
        info!("Asset concurrency: {}", self.asset_concurrency);

        let mut delays: Vec<_> = self.rate_delays.iter().collect();
        delays.sort();
        for (exchange, delay) in delays {
            info!("Rate delay {}: {:?}", exchange, delay);
        }
        info!("Rate delay (default): {:?}", self.default_rate_delay);

        if self.exchange_pairs.is_empty() {
            info!("Exchange pairs: all pairs in {}", self.asset_files.assets.display());
        } else {
            let pairs: Vec<String> = self.exchange_pairs.iter().map(ExchangePair::key).collect();
            info!("Exchange pairs: {}", pairs.join(", "));
        }
        info!("Allowed quotes: {}", self.allowed_quotes.join(", "));
        match self.assets_reload {
            Some(every) => info!("Asset reload: every {:?}", every),
            None => info!("Asset reload: disabled"),
        }
        info!("Report dir: {}", self.report_dir.display());
        info!("============================");
    }
}

/// Fee rates outside [0, 100) make every price meaningless
pub fn validate_fee(exchange: &str, fee: Decimal) -> Result<(), ConfigError> {
    if fee < Decimal::ZERO || fee >= dec!(100) {
        return Err(ConfigError::FeeOutOfRange {
            exchange: exchange.to_string(),
            fee,
        });
    }
    Ok(())
}

fn builtin_rate_delays() -> HashMap<String, Duration> {
    ExchangeId::ALL
        .iter()
        .map(|id| (id.name().to_string(), id.default_rate_delay()))
        .collect()
}

fn split_list(raw: &str) -> impl Iterator<Item = &str> {
    raw.split(',').map(str::trim).filter(|s| !s.is_empty())
}

/// `name=value,name=value`, names lowercased
fn parse_assignments(key: &str, raw: &str) -> Result<Vec<(String, String)>, ConfigError> {
    split_list(raw)
        .map(|item| match item.split_once('=') {
            Some((name, value)) if !name.trim().is_empty() => {
                Ok((name.trim().to_lowercase(), value.trim().to_string()))
            }
            _ => Err(ConfigError::Parse {
                key: key.to_string(),
                value: item.to_string(),
                reason: "expected name=value".to_string(),
            }),
        })
        .collect()
}

fn parse_value<T>(key: &str, raw: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: Display,
{
    raw.trim().parse().map_err(|e: T::Err| ConfigError::Parse {
        key: key.to_string(),
        value: raw.to_string(),
        reason: e.to_string(),
    })
}

fn parse_seconds(key: &str, raw: &str) -> Result<Duration, ConfigError> {
    let secs: f64 = parse_value(key, raw)?;
    Duration::try_from_secs_f64(secs).map_err(|e| ConfigError::Parse {
        key: key.to_string(),
        value: raw.to_string(),
        reason: e.to_string(),
    })
}

fn positive_decimal(key: &'static str, value: Decimal) -> Result<(), ConfigError> {
    if value <= Decimal::ZERO {
        return Err(ConfigError::NotPositive {
            key,
            value: value.to_string(),
        });
    }
    Ok(())
}

fn positive_count(key: &'static str, value: usize) -> Result<(), ConfigError> {
    if value == 0 {
        return Err(ConfigError::NotPositive {
            key,
            value: value.to_string(),
        });
    }
    Ok(())
}

fn positive_duration(key: &'static str, value: Duration) -> Result<(), ConfigError> {
    if value.is_zero() {
        return Err(ConfigError::NotPositive {
            key,
            value: format!("{:?}", value),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config_from(vars: &[(&str, &str)]) -> Result<EngineConfig, ConfigError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        EngineConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = config_from(&[]).unwrap();

        assert_eq!(config.arbitrage_threshold, dec!(2));
        assert_eq!(config.absurd_threshold, dec!(100));
        assert_eq!(config.investment_amount, dec!(100));
        assert_eq!(config.orderbook_depth, 20);
        assert_eq!(config.poll_interval, Duration::from_secs(1));
        assert_eq!(config.rate_delays["kucoin"], Duration::from_millis(200));
        assert_eq!(config.rate_delays["bitstamp"], Duration::from_secs(1));
        assert_eq!(config.allowed_quotes, vec!["USDT", "EUR"]);
        assert!(config.exchange_pairs.is_empty());
        assert!(config.assets_reload.is_none());
    }

    #[test]
    fn test_overrides() {
        let config = config_from(&[
            ("ARBITRAGE_THRESHOLD", "1.5"),
            ("ABSURD_THRESHOLD", "50"),
            ("POLL_INTERVAL", "0.25"),
            ("PER_EXCHANGE_RATE_DELAY", "Binance=0.5, newex=2"),
            ("EXCHANGE_PAIRS", "binance-kucoin, bitget-bitstamp"),
            ("EXCHANGE_FEES", "bitstamp=0.25"),
            ("ALLOWED_QUOTES", "usdt"),
            ("ASSETS_RELOAD_SECS", "300"),
        ])
        .unwrap();

        assert_eq!(config.arbitrage_threshold, dec!(1.5));
        assert_eq!(config.poll_interval, Duration::from_millis(250));
        assert_eq!(config.rate_delays["binance"], Duration::from_millis(500));
        assert_eq!(config.rate_delays["newex"], Duration::from_secs(2));
        assert_eq!(config.rate_delays["kucoin"], Duration::from_millis(200));
        assert_eq!(
            config.exchange_pairs,
            vec![
                ExchangePair::new("binance", "kucoin"),
                ExchangePair::new("bitget", "bitstamp")
            ]
        );
        assert_eq!(config.fee_for("bitstamp"), Some(dec!(0.25)));
        assert_eq!(config.fee_for("Binance"), Some(dec!(0.1)));
        assert_eq!(config.fee_for("unknown"), None);
        assert_eq!(config.allowed_quotes, vec!["USDT"]);
        assert_eq!(config.assets_reload, Some(Duration::from_secs(300)));
    }

    #[test]
    fn test_rejects_non_positive_values() {
        assert!(matches!(
            config_from(&[("ARBITRAGE_THRESHOLD", "0")]),
            Err(ConfigError::NotPositive { key: "ARBITRAGE_THRESHOLD", .. })
        ));
        assert!(matches!(
            config_from(&[("INVESTMENT_AMOUNT", "-5")]),
            Err(ConfigError::NotPositive { key: "INVESTMENT_AMOUNT", .. })
        ));
        assert!(matches!(
            config_from(&[("ORDERBOOK_DEPTH", "0")]),
            Err(ConfigError::NotPositive { key: "ORDERBOOK_DEPTH", .. })
        ));
        assert!(matches!(
            config_from(&[("POLL_INTERVAL", "0")]),
            Err(ConfigError::NotPositive { key: "POLL_INTERVAL", .. })
        ));
    }

    #[test]
    fn test_rejects_inconsistent_values() {
        assert!(matches!(
            config_from(&[("ARBITRAGE_THRESHOLD", "5"), ("ABSURD_THRESHOLD", "5")]),
            Err(ConfigError::AbsurdBelowArbitrage { .. })
        ));
        assert!(matches!(
            config_from(&[("EXCHANGE_FEES", "binance=100")]),
            Err(ConfigError::FeeOutOfRange { .. })
        ));
        assert!(matches!(
            config_from(&[("ORDERBOOK_DEPTH", "twenty")]),
            Err(ConfigError::Parse { .. })
        ));
        assert!(matches!(
            config_from(&[("POLL_INTERVAL", "-1")]),
            Err(ConfigError::Parse { .. })
        ));
        assert!(matches!(
            config_from(&[("PER_EXCHANGE_RATE_DELAY", "binance")]),
            Err(ConfigError::Parse { .. })
        ));
        assert!(matches!(
            config_from(&[("EXCHANGE_PAIRS", "binance")]),
            Err(ConfigError::InvalidPair(_))
        ));
    }

    #[test]
    fn test_blank_values_take_defaults() {
        let config = config_from(&[("ARBITRAGE_THRESHOLD", "  "), ("EXCHANGE_PAIRS", "")]).unwrap();
        assert_eq!(config.arbitrage_threshold, DEFAULT_ARBITRAGE_THRESHOLD);
        assert!(config.exchange_pairs.is_empty());
    }
}
