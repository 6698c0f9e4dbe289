//! Order Book Liquidity Module
//!
//! Estimates the realistic average fill price for a quantity that may span
//! several order-book levels. Only the first `max_levels` levels of a side are
//! ever considered, so available liquidity is never overestimated.

use rust_decimal::Decimal;

use crate::exchange::OrderBookLevel;

/// Result of walking one book side for a target quantity
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FillEstimate {
    /// Volume-weighted average price over the filled quantity
    pub average_price: Decimal,
    /// Quantity actually fillable, at most the target
    pub filled: Decimal,
    /// Price of the last level touched
    pub worst_price: Decimal,
    pub levels_used: usize,
}

/// Weighted-average execution price against one side of a book
#[derive(Debug, Clone, Copy)]
pub struct ExecutionPriceEstimator {
    max_levels: usize,
}

impl ExecutionPriceEstimator {
    pub fn new(max_levels: usize) -> Self {
        Self { max_levels }
    }

    /// Walk `levels` best-first until `target_qty` is filled.
    ///
    /// Returns `None` when nothing at all can be filled (empty side, zero
    /// volume, non-positive target) or when the notional overflows `Decimal`.
    /// A partial fill is returned as is with `filled < target_qty`; callers
    /// size the trade from `filled`.
    pub fn estimate(&self, levels: &[OrderBookLevel], target_qty: Decimal) -> Option<FillEstimate> {
        if target_qty <= Decimal::ZERO {
            return None;
        }

        let mut filled = Decimal::ZERO;
        let mut cost = Decimal::ZERO;
        let mut worst_price = Decimal::ZERO;
        let mut levels_used = 0;

        for level in levels.iter().take(self.max_levels) {
            if filled >= target_qty {
                break;
            }
            let take = level.volume.min(target_qty - filled);
            if take <= Decimal::ZERO {
                continue;
            }
            cost = take
                .checked_mul(level.price)
                .and_then(|notional| cost.checked_add(notional))?;
            filled = filled.checked_add(take)?;
            worst_price = level.price;
            levels_used += 1;
        }

        if filled.is_zero() {
            return None;
        }

        Some(FillEstimate {
            average_price: cost.checked_div(filled)?,
            filled,
            worst_price,
            levels_used,
        })
    }

    /// Total volume within the depth bound, saturating at `Decimal::MAX`
    pub fn available_volume(&self, levels: &[OrderBookLevel]) -> Decimal {
        levels
            .iter()
            .take(self.max_levels)
            .fold(Decimal::ZERO, |total, l| total.saturating_add(l.volume))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn levels(rows: &[(Decimal, Decimal)]) -> Vec<OrderBookLevel> {
        rows.iter().map(|(p, v)| OrderBookLevel::new(*p, *v)).collect()
    }

    #[test]
    fn test_fill_spanning_two_ask_levels() {
        let estimator = ExecutionPriceEstimator::new(20);
        let asks = levels(&[(dec!(100), dec!(1)), (dec!(101), dec!(5))]);

        let fill = estimator.estimate(&asks, dec!(3)).unwrap();

        assert_eq!(fill.filled, dec!(3));
        assert_eq!(fill.average_price.round_dp(3), dec!(100.667));
        assert_eq!(fill.levels_used, 2);
        assert_eq!(fill.worst_price, dec!(101));
    }

    #[test]
    fn test_partial_fill_reports_available_quantity() {
        let estimator = ExecutionPriceEstimator::new(20);
        let bids = levels(&[(dec!(50), dec!(2))]);

        let fill = estimator.estimate(&bids, dec!(5)).unwrap();

        assert_eq!(fill.filled, dec!(2));
        assert_eq!(fill.average_price, dec!(50));
        assert_eq!(fill.average_price * fill.filled, dec!(100));
    }

    #[test]
    fn test_empty_side_is_insufficient_liquidity() {
        let estimator = ExecutionPriceEstimator::new(20);
        assert!(estimator.estimate(&[], dec!(1)).is_none());

        let dry = levels(&[(dec!(10), dec!(0)), (dec!(11), dec!(0))]);
        assert!(estimator.estimate(&dry, dec!(1)).is_none());
        assert!(estimator.estimate(&levels(&[(dec!(10), dec!(1))]), dec!(0)).is_none());
    }

    #[test]
    fn test_full_fill_average_between_best_and_worst() {
        let estimator = ExecutionPriceEstimator::new(20);
        let asks = levels(&[
            (dec!(10.0), dec!(0.4)),
            (dec!(10.5), dec!(0.7)),
            (dec!(11.2), dec!(3)),
            (dec!(12.0), dec!(9)),
        ]);

        for target in [dec!(0.1), dec!(0.4), dec!(1), dec!(2.5), dec!(4.1)] {
            let fill = estimator.estimate(&asks, target).unwrap();
            assert_eq!(fill.filled, target);
            assert!(fill.average_price >= asks[0].price);
            assert!(fill.average_price <= fill.worst_price);
        }
    }

    #[test]
    fn test_exhausted_book_fills_total_volume() {
        let estimator = ExecutionPriceEstimator::new(20);
        let bids = levels(&[(dec!(9), dec!(1.5)), (dec!(8), dec!(2.5))]);

        let fill = estimator.estimate(&bids, dec!(100)).unwrap();

        assert_eq!(fill.filled, estimator.available_volume(&bids));
        assert_eq!(fill.filled, dec!(4));
    }

    #[test]
    fn test_levels_beyond_depth_are_ignored() {
        let estimator = ExecutionPriceEstimator::new(1);
        let asks = levels(&[(dec!(100), dec!(1)), (dec!(101), dec!(5))]);

        let fill = estimator.estimate(&asks, dec!(3)).unwrap();

        assert_eq!(fill.filled, dec!(1));
        assert_eq!(fill.average_price, dec!(100));
        assert_eq!(estimator.available_volume(&asks), dec!(1));
    }

    #[test]
    fn test_notional_overflow_is_not_fillable() {
        let estimator = ExecutionPriceEstimator::new(20);
        let asks = levels(&[(Decimal::MAX, dec!(2))]);

        assert!(estimator.estimate(&asks, dec!(2)).is_none());
    }

    #[test]
    fn test_available_volume_saturates() {
        let estimator = ExecutionPriceEstimator::new(20);
        let bids = levels(&[(dec!(1), Decimal::MAX), (dec!(0.9), Decimal::MAX)]);

        assert_eq!(estimator.available_volume(&bids), Decimal::MAX);
    }
}
