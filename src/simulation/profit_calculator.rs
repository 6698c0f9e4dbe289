//! Profit Calculator Module
//!
//! Two-stage evaluation of a cross-exchange price difference:
//! - Stage A: fee-adjusted profit from last-trade prices, both directions
//! - Stage B: liquidity-confirmed profit from order-book depth
//!
//! Classification order is fixed: absurd beats everything, then a confirmed
//! positive liquidity profit, then a non-positive one.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Serialize;

use super::liquidity::ExecutionPriceEstimator;
use crate::exchange::OrderBookLevel;

const HUNDRED: Decimal = dec!(100);

// The helpers below return `None` when the result does not fit in a `Decimal`.

/// Price paid per unit once the taker fee is added
pub fn effective_buy_price(price: Decimal, fee_percent: Decimal) -> Option<Decimal> {
    let factor = fee_percent.checked_div(HUNDRED)?.checked_add(Decimal::ONE)?;
    price.checked_mul(factor)
}

/// Price received per unit once the taker fee is deducted
pub fn effective_sell_price(price: Decimal, fee_percent: Decimal) -> Option<Decimal> {
    let factor = Decimal::ONE.checked_sub(fee_percent.checked_div(HUNDRED)?)?;
    price.checked_mul(factor)
}

/// Percentage gained selling at `sell_eff` what was bought at `buy_eff`.
/// Zero when the buy price is not positive.
pub fn profit_pct(buy_eff: Decimal, sell_eff: Decimal) -> Option<Decimal> {
    if buy_eff <= Decimal::ZERO {
        return Some(Decimal::ZERO);
    }
    sell_eff
        .checked_sub(buy_eff)?
        .checked_div(buy_eff)?
        .checked_mul(HUNDRED)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Classification {
    Opportunity,
    Unprofitable,
    Absurd,
    BelowThreshold,
}

impl Classification {
    /// Log target (and report file stem) for the classification
    pub fn log_target(&self) -> &'static str {
        match self {
            Classification::Opportunity => "arbitrage_opportunities",
            Classification::Unprofitable => "unprofitable_opportunities",
            Classification::Absurd => "absurd_opportunities",
            Classification::BelowThreshold => "below_threshold",
        }
    }

    /// Whether outcomes of this kind go to the report sink
    pub fn is_reported(&self) -> bool {
        !matches!(self, Classification::BelowThreshold)
    }
}

impl std::fmt::Display for Classification {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Classification::Opportunity => "opportunity",
            Classification::Unprofitable => "unprofitable",
            Classification::Absurd => "absurd",
            Classification::BelowThreshold => "below_threshold",
        };
        write!(f, "{}", s)
    }
}

/// Profit thresholds in percent
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Thresholds {
    pub arbitrage: Decimal,
    pub absurd: Decimal,
}

/// One leg's last-trade price on one exchange
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Quote {
    pub exchange: String,
    pub symbol: String,
    pub price: Decimal,
    pub fee_percent: Decimal,
}

/// Stage A result for buying on `buy` and selling on `sell`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TickerScreen {
    /// Index of the buy leg in the pair handed to [`OpportunityEvaluator::screen`]
    pub buy: usize,
    pub sell: usize,
    pub effective_buy_price: Decimal,
    pub effective_sell_price: Decimal,
    pub profit_pct: Decimal,
}

/// Stage B result: what the books actually allow
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LiquidityCheck {
    pub quantity: Decimal,
    pub average_buy_price: Decimal,
    pub average_sell_price: Decimal,
    pub effective_buy_price: Decimal,
    pub effective_sell_price: Decimal,
    pub invested_amount: Decimal,
    pub proceeds: Decimal,
    pub profit_pct: Decimal,
}

/// Evaluation of one direction for one asset in one round
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ArbitrageOutcome {
    pub observed_at: DateTime<Utc>,
    pub asset: String,
    pub buy_exchange: String,
    pub sell_exchange: String,
    pub buy_symbol: String,
    pub sell_symbol: String,
    pub buy_price: Decimal,
    pub sell_price: Decimal,
    pub ticker_profit_pct: Decimal,
    pub effective_buy_price: Decimal,
    pub effective_sell_price: Decimal,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub average_buy_price: Option<Decimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub average_sell_price: Option<Decimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub liquidity_profit_pct: Option<Decimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub invested_amount: Option<Decimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub proceeds: Option<Decimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quantity: Option<Decimal>,
    pub classification: Classification,
}

/// Stateless evaluator shared by every asset of a monitor
#[derive(Debug, Clone, Copy)]
pub struct OpportunityEvaluator {
    thresholds: Thresholds,
    investment_amount: Decimal,
    estimator: ExecutionPriceEstimator,
}

impl OpportunityEvaluator {
    pub fn new(thresholds: Thresholds, investment_amount: Decimal, max_levels: usize) -> Self {
        Self {
            thresholds,
            investment_amount,
            estimator: ExecutionPriceEstimator::new(max_levels),
        }
    }

    /// Stage A for both directions: `[buy 0 / sell 1, buy 1 / sell 0]`.
    ///
    /// `None` when either direction's arithmetic overflows, e.g. a dust price
    /// on one leg against a normal price on the other.
    pub fn screen(&self, legs: [&Quote; 2]) -> Option<[TickerScreen; 2]> {
        Some([
            self.screen_direction(legs, 0, 1)?,
            self.screen_direction(legs, 1, 0)?,
        ])
    }

    fn screen_direction(&self, legs: [&Quote; 2], buy: usize, sell: usize) -> Option<TickerScreen> {
        let effective_buy_price = effective_buy_price(legs[buy].price, legs[buy].fee_percent)?;
        let effective_sell_price = effective_sell_price(legs[sell].price, legs[sell].fee_percent)?;

        Some(TickerScreen {
            buy,
            sell,
            effective_buy_price,
            effective_sell_price,
            profit_pct: profit_pct(effective_buy_price, effective_sell_price)?,
        })
    }

    /// A direction is worth confirming against the books when it clears the
    /// arbitrage threshold without being absurd.
    pub fn needs_confirmation(&self, screen: &TickerScreen) -> bool {
        screen.profit_pct >= self.thresholds.arbitrage && screen.profit_pct <= self.thresholds.absurd
    }

    /// Stage B: size the trade against the buy side's asks and the sell side's
    /// bids. `None` means no quantity could be filled on one of the sides, or
    /// the sizing overflowed; both count as insufficient liquidity.
    pub fn confirm(
        &self,
        asks: &[OrderBookLevel],
        buy_fee_percent: Decimal,
        bids: &[OrderBookLevel],
        sell_fee_percent: Decimal,
    ) -> Option<LiquidityCheck> {
        let best_ask = asks.first()?.price;
        let desired = self
            .investment_amount
            .checked_div(effective_buy_price(best_ask, buy_fee_percent)?)?;

        // capped by both sides' depth-bounded volume, so both walks fill it fully
        let target = desired
            .min(self.estimator.available_volume(asks))
            .min(self.estimator.available_volume(bids));

        let buy = self.estimator.estimate(asks, target)?;
        let sell = self.estimator.estimate(bids, buy.filled)?;
        let quantity = buy.filled;

        let effective_buy = effective_buy_price(buy.average_price, buy_fee_percent)?;
        let effective_sell = effective_sell_price(sell.average_price, sell_fee_percent)?;

        Some(LiquidityCheck {
            quantity,
            average_buy_price: buy.average_price,
            average_sell_price: sell.average_price,
            effective_buy_price: effective_buy,
            effective_sell_price: effective_sell,
            invested_amount: effective_buy.checked_mul(quantity)?,
            proceeds: effective_sell.checked_mul(quantity)?,
            profit_pct: profit_pct(effective_buy, effective_sell)?,
        })
    }

    /// Apply the threshold rules in order.
    ///
    /// `liquidity` is `None` when Stage B was not run or found nothing to fill;
    /// a direction that cleared the threshold but could not be filled is
    /// unprofitable.
    pub fn classify(&self, ticker_profit_pct: Decimal, liquidity: Option<&LiquidityCheck>) -> Classification {
        if ticker_profit_pct > self.thresholds.absurd {
            return Classification::Absurd;
        }

        let cleared = ticker_profit_pct >= self.thresholds.arbitrage;
        match liquidity.map(|l| l.profit_pct) {
            Some(p) if cleared && p > Decimal::ZERO => Classification::Opportunity,
            Some(p) if p <= Decimal::ZERO => Classification::Unprofitable,
            None if cleared => Classification::Unprofitable,
            _ => Classification::BelowThreshold,
        }
    }

    /// Assemble the outcome record for one direction
    pub fn outcome(
        &self,
        asset: &str,
        legs: [&Quote; 2],
        screen: &TickerScreen,
        liquidity: Option<&LiquidityCheck>,
        observed_at: DateTime<Utc>,
    ) -> ArbitrageOutcome {
        let buy = legs[screen.buy];
        let sell = legs[screen.sell];

        ArbitrageOutcome {
            observed_at,
            asset: asset.to_string(),
            buy_exchange: buy.exchange.clone(),
            sell_exchange: sell.exchange.clone(),
            buy_symbol: buy.symbol.clone(),
            sell_symbol: sell.symbol.clone(),
            buy_price: buy.price,
            sell_price: sell.price,
            ticker_profit_pct: screen.profit_pct,
            effective_buy_price: screen.effective_buy_price,
            effective_sell_price: screen.effective_sell_price,
            average_buy_price: liquidity.map(|l| l.average_buy_price),
            average_sell_price: liquidity.map(|l| l.average_sell_price),
            liquidity_profit_pct: liquidity.map(|l| l.profit_pct),
            invested_amount: liquidity.map(|l| l.invested_amount),
            proceeds: liquidity.map(|l| l.proceeds),
            quantity: liquidity.map(|l| l.quantity),
            classification: self.classify(screen.profit_pct, liquidity),
        }
    }
}
