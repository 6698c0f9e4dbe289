//! Opportunity simulation
//!
//! Nothing here places orders. Prices come from tickers and order-book
//! snapshots; fills are estimated by walking the book.

pub mod liquidity;
pub mod profit_calculator;

pub use profit_calculator::{
    ArbitrageOutcome, Classification, LiquidityCheck, OpportunityEvaluator, Quote, Thresholds,
};
