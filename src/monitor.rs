//! Per exchange-pair polling loop
//!
//! Each round takes a snapshot of the pair's assets and, for every asset:
//! fetches both tickers concurrently, screens both directions on fees alone,
//! fetches order books only when a direction clears the threshold, classifies,
//! and reports. One asset's failure never touches the others.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures::stream::{self, StreamExt};
use tokio::time::{sleep, Instant};
use tracing::{debug, info, warn};

use crate::assets::{AssetMapping, ExchangePair, SharedAssets};
use crate::error::{EvaluationError, FetchError};
use crate::exchange::PriceSource;
use crate::report::ReportSink;
use crate::shutdown::Shutdown;
use crate::simulation::{ArbitrageOutcome, Classification, LiquidityCheck, OpportunityEvaluator, Quote};

#[derive(Debug, Clone, Copy)]
pub struct MonitorSettings {
    pub orderbook_depth: usize,
    pub asset_concurrency: usize,
    pub poll_interval: Duration,
}

/// Counters for one pass over a pair's assets
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RoundSummary {
    pub evaluated: usize,
    pub skipped: usize,
    pub opportunities: usize,
    pub unprofitable: usize,
    pub absurd: usize,
}

impl RoundSummary {
    fn record(&mut self, result: &Result<Vec<ArbitrageOutcome>, EvaluationError>) {
        match result {
            Ok(outcomes) => {
                self.evaluated += 1;
                for outcome in outcomes {
                    match outcome.classification {
                        Classification::Opportunity => self.opportunities += 1,
                        Classification::Unprofitable => self.unprofitable += 1,
                        Classification::Absurd => self.absurd += 1,
                        Classification::BelowThreshold => {}
                    }
                }
            }
            Err(_) => self.skipped += 1,
        }
    }
}

pub struct PairArbitrageMonitor {
    pair: ExchangePair,
    /// `[first, second]`, matching the pair's order
    sources: [Arc<dyn PriceSource>; 2],
    evaluator: OpportunityEvaluator,
    assets: SharedAssets,
    sink: Arc<dyn ReportSink>,
    settings: MonitorSettings,
}

impl PairArbitrageMonitor {
    pub fn new(
        pair: ExchangePair,
        sources: [Arc<dyn PriceSource>; 2],
        evaluator: OpportunityEvaluator,
        assets: SharedAssets,
        sink: Arc<dyn ReportSink>,
        settings: MonitorSettings,
    ) -> Self {
        Self {
            pair,
            sources,
            evaluator,
            assets,
            sink,
            settings,
        }
    }

    pub fn pair(&self) -> &ExchangePair {
        &self.pair
    }

    /// Poll until shutdown. Rounds never overlap: the next one starts a full
    /// poll interval after the previous one finished. Shutdown abandons the
    /// round in progress, dropping its in-flight requests.
    pub async fn run(self, shutdown: Shutdown) {
        info!("Monitoring {}", self.pair);

        while !shutdown.is_cancelled() {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = self.run_round() => {}
            }

            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = sleep(self.settings.poll_interval) => {}
            }
        }

        info!("Monitor {} stopped", self.pair);
    }

    /// One pass over every asset of the current catalog snapshot
    pub async fn run_round(&self) -> RoundSummary {
        let catalog = self.assets.snapshot();
        let Some(mapping) = catalog.mapping(&self.pair) else {
            debug!("{}: no assets in catalog", self.pair);
            return RoundSummary::default();
        };

        let started = Instant::now();
        let mut summary = RoundSummary::default();

        // futures are built up front; a lazily mapped stream is not Send
        let pending: Vec<_> = mapping
            .assets()
            .map(|asset| self.evaluate_and_report(asset, mapping))
            .collect();
        let mut results = stream::iter(pending).buffer_unordered(self.settings.asset_concurrency.max(1));

        while let Some(result) = results.next().await {
            summary.record(&result);
        }

        debug!(
            pair = %self.pair,
            evaluated = summary.evaluated,
            skipped = summary.skipped,
            opportunities = summary.opportunities,
            unprofitable = summary.unprofitable,
            absurd = summary.absurd,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Round complete"
        );
        if summary.evaluated == 0 && summary.skipped > 0 {
            warn!("{}: all {} assets failed this round", self.pair, summary.skipped);
        }

        summary
    }

    async fn evaluate_and_report(
        &self,
        asset: &str,
        mapping: &AssetMapping,
    ) -> Result<Vec<ArbitrageOutcome>, EvaluationError> {
        let result = self.evaluate_asset(asset, mapping).await;

        match &result {
            Ok(outcomes) => {
                for outcome in outcomes {
                    self.report(outcome);
                }
            }
            Err(EvaluationError::Mapping(e)) => warn!("{}: skipping {}", self.pair, e),
            Err(EvaluationError::Fetch(e @ FetchError::MissingPrice { .. })) => {
                debug!("{}: insufficient data for {}: {}", self.pair, asset, e)
            }
            Err(EvaluationError::Fetch(e)) => {
                warn!(
                    exchange = e.exchange().unwrap_or("-"),
                    "{}: insufficient data for {}: {}", self.pair, asset, e
                )
            }
            Err(e @ EvaluationError::Overflow { .. }) => {
                warn!("{}: insufficient data: {}", self.pair, e)
            }
        }

        result
    }

    /// Evaluate both directions for one asset.
    ///
    /// Returns one outcome per direction, including below-threshold ones. Any
    /// fetch failure, or prices that overflow the ticker screen, abandon the
    /// asset for this round.
    pub async fn evaluate_asset(
        &self,
        asset: &str,
        mapping: &AssetMapping,
    ) -> Result<Vec<ArbitrageOutcome>, EvaluationError> {
        let (first_symbol, second_symbol) = mapping.symbols_for(asset, &self.pair)?;
        let [first, second] = &self.sources;

        let (first_ticker, second_ticker) = tokio::join!(
            first.fetch_ticker(first_symbol),
            second.fetch_ticker(second_symbol)
        );

        let legs = [
            Quote {
                exchange: first.name().to_string(),
                symbol: first_symbol.to_string(),
                price: first_ticker?.last_price,
                fee_percent: first.fee_rate_percent(),
            },
            Quote {
                exchange: second.name().to_string(),
                symbol: second_symbol.to_string(),
                price: second_ticker?.last_price,
                fee_percent: second.fee_rate_percent(),
            },
        ];
        let legs = [&legs[0], &legs[1]];

        let screens = self.evaluator.screen(legs).ok_or_else(|| EvaluationError::Overflow {
            asset: asset.to_string(),
        })?;
        let mut checks: [Option<LiquidityCheck>; 2] = [None, None];

        if screens.iter().any(|s| self.evaluator.needs_confirmation(s)) {
            let depth = self.settings.orderbook_depth;
            let (first_book, second_book) = tokio::join!(
                first.fetch_order_book(first_symbol, depth),
                second.fetch_order_book(second_symbol, depth)
            );
            let books = [first_book?, second_book?];

            for (screen, check) in screens.iter().zip(checks.iter_mut()) {
                if !self.evaluator.needs_confirmation(screen) {
                    continue;
                }
                *check = self.evaluator.confirm(
                    &books[screen.buy].asks,
                    legs[screen.buy].fee_percent,
                    &books[screen.sell].bids,
                    legs[screen.sell].fee_percent,
                );
                if check.is_none() {
                    debug!(
                        "{}: insufficient liquidity for {} buying on {}",
                        self.pair, asset, legs[screen.buy].exchange
                    );
                }
            }
        }

        let observed_at = Utc::now();
        Ok(screens
            .iter()
            .zip(checks.iter())
            .map(|(screen, check)| {
                self.evaluator
                    .outcome(asset, legs, screen, check.as_ref(), observed_at)
            })
            .collect())
    }

    fn report(&self, outcome: &ArbitrageOutcome) {
        if !outcome.classification.is_reported() {
            debug!(
                "{}: {} {} -> {} ticker profit {:.4}% below threshold",
                self.pair,
                outcome.asset,
                outcome.buy_exchange,
                outcome.sell_exchange,
                outcome.ticker_profit_pct
            );
            return;
        }

        if let Err(e) = self.sink.report(outcome) {
            warn!("{}: failed to report {} outcome for {}: {}", self.pair, outcome.classification, outcome.asset, e);
        }
    }
}
