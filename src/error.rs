//! Error taxonomy for the detection engine.
//!
//! Fetch and mapping errors are recoverable per asset and per round.
//! Configuration errors are fatal at startup.

use std::path::PathBuf;
use std::time::Duration;

use rust_decimal::Decimal;
use thiserror::Error;

/// Failure fetching market data from one exchange.
///
/// Always transient: the asset's current round is abandoned and the next poll
/// tries again.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("{exchange}: request timed out after {timeout:?}")]
    Timeout { exchange: String, timeout: Duration },

    #[error("{exchange}: http error: {source}")]
    Http {
        exchange: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{exchange}: status {status}: {body}")]
    Status {
        exchange: String,
        status: u16,
        body: String,
    },

    #[error("{exchange}: failed to parse response: {reason}")]
    Parse { exchange: String, reason: String },

    #[error("{exchange}: no usable price for {symbol}")]
    MissingPrice { exchange: String, symbol: String },

    #[error("{exchange}: api rejected {symbol}: {reason}")]
    Api {
        exchange: String,
        symbol: String,
        reason: String,
    },

    #[error("invalid symbol '{symbol}'")]
    InvalidSymbol { symbol: String },
}

impl FetchError {
    pub fn exchange(&self) -> Option<&str> {
        match self {
            FetchError::Timeout { exchange, .. }
            | FetchError::Http { exchange, .. }
            | FetchError::Status { exchange, .. }
            | FetchError::Parse { exchange, .. }
            | FetchError::MissingPrice { exchange, .. }
            | FetchError::Api { exchange, .. } => Some(exchange),
            FetchError::InvalidSymbol { .. } => None,
        }
    }
}

/// Asset entry that cannot be evaluated for a given exchange pair.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum MappingError {
    #[error("asset {asset} has no symbol for exchange {exchange}")]
    MissingSymbol { asset: String, exchange: String },
}

/// Why one asset produced no outcome this round.
#[derive(Debug, Error)]
pub enum EvaluationError {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Mapping(#[from] MappingError),

    /// Quoted prices too far apart to compare in `Decimal`
    #[error("price arithmetic overflow for {asset}")]
    Overflow { asset: String },
}

/// Invalid startup configuration. The scheduler refuses to start on any of these.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{key}: cannot parse '{value}': {reason}")]
    Parse {
        key: String,
        value: String,
        reason: String,
    },

    #[error("{key} must be greater than zero, got {value}")]
    NotPositive { key: &'static str, value: String },

    #[error("ABSURD_THRESHOLD ({absurd}) must be above ARBITRAGE_THRESHOLD ({arbitrage})")]
    AbsurdBelowArbitrage { absurd: Decimal, arbitrage: Decimal },

    #[error("fee rate for {exchange} must be within [0, 100), got {fee}")]
    FeeOutOfRange { exchange: String, fee: Decimal },

    #[error("no price source configured for exchange '{0}'")]
    UnknownExchange(String),

    #[error("invalid exchange pair '{0}', expected '<exchange>-<exchange>'")]
    InvalidPair(String),

    #[error("no exchange pairs to monitor")]
    NoExchangePairs,

    #[error("cannot read {path}: {source}")]
    AssetsIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot parse {path}: {source}")]
    AssetsParse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Failure delivering an outcome to a report sink. Logged and dropped.
#[derive(Debug, Error)]
pub enum ReportError {
    #[error("report io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("report serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
}
