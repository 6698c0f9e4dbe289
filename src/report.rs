//! Outcome reporting

use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{info, warn};

use crate::error::ReportError;
use crate::simulation::{ArbitrageOutcome, Classification};

/// Receives every reported outcome. Delivery is fire-and-forget: the monitor
/// logs an error and moves on.
pub trait ReportSink: Send + Sync {
    fn report(&self, outcome: &ArbitrageOutcome) -> Result<(), ReportError>;
}

/// One structured log line per outcome, under the classification's target
#[derive(Debug, Default)]
pub struct TracingSink;

impl ReportSink for TracingSink {
    fn report(&self, o: &ArbitrageOutcome) -> Result<(), ReportError> {
        let liquidity = o
            .liquidity_profit_pct
            .map(|p| format!("{:.4}%", p))
            .unwrap_or_else(|| "n/a".to_string());
        let quantity = o.quantity.map(|q| q.normalize().to_string()).unwrap_or_default();

        match o.classification {
            Classification::Opportunity => info!(
                target: "arbitrage_opportunities",
                asset = %o.asset,
                buy = %o.buy_exchange,
                sell = %o.sell_exchange,
                ticker_profit_pct = %o.ticker_profit_pct.round_dp(4),
                liquidity_profit_pct = %liquidity,
                quantity = %quantity,
                "Arbitrage opportunity"
            ),
            Classification::Unprofitable => info!(
                target: "unprofitable_opportunities",
                asset = %o.asset,
                buy = %o.buy_exchange,
                sell = %o.sell_exchange,
                ticker_profit_pct = %o.ticker_profit_pct.round_dp(4),
                liquidity_profit_pct = %liquidity,
                "Unprofitable after liquidity check"
            ),
            Classification::Absurd => warn!(
                target: "absurd_opportunities",
                asset = %o.asset,
                buy = %o.buy_exchange,
                sell = %o.sell_exchange,
                buy_price = %o.buy_price,
                sell_price = %o.sell_price,
                ticker_profit_pct = %o.ticker_profit_pct.round_dp(4),
                "Absurd spread ignored"
            ),
            Classification::BelowThreshold => {}
        }
        Ok(())
    }
}

/// Appends each outcome as a JSON line to `<classification>.jsonl`
pub struct JsonlSink {
    opportunities: Mutex<BufWriter<File>>,
    unprofitable: Mutex<BufWriter<File>>,
    absurd: Mutex<BufWriter<File>>,
}

impl JsonlSink {
    pub fn new(dir: &Path) -> Result<Self, ReportError> {
        std::fs::create_dir_all(dir)?;
        let open = |c: Classification| -> Result<Mutex<BufWriter<File>>, ReportError> {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(dir.join(format!("{}.jsonl", c.log_target())))?;
            Ok(Mutex::new(BufWriter::new(file)))
        };

        Ok(Self {
            opportunities: open(Classification::Opportunity)?,
            unprofitable: open(Classification::Unprofitable)?,
            absurd: open(Classification::Absurd)?,
        })
    }
}

impl ReportSink for JsonlSink {
    fn report(&self, outcome: &ArbitrageOutcome) -> Result<(), ReportError> {
        let writer = match outcome.classification {
            Classification::Opportunity => &self.opportunities,
            Classification::Unprofitable => &self.unprofitable,
            Classification::Absurd => &self.absurd,
            Classification::BelowThreshold => return Ok(()),
        };

        let json = serde_json::to_string(outcome)?;
        let mut writer = writer.lock();
        writeln!(writer, "{}", json)?;
        writer.flush()?;
        Ok(())
    }
}

/// Forwards to every sink; all are tried, the first error is returned
#[derive(Default)]
pub struct FanoutSink {
    sinks: Vec<Arc<dyn ReportSink>>,
}

impl FanoutSink {
    pub fn new(sinks: Vec<Arc<dyn ReportSink>>) -> Self {
        Self { sinks }
    }
}

impl ReportSink for FanoutSink {
    fn report(&self, outcome: &ArbitrageOutcome) -> Result<(), ReportError> {
        let mut first_err = None;
        for sink in &self.sinks {
            if let Err(e) = sink.report(outcome) {
                first_err.get_or_insert(e);
            }
        }
        first_err.map_or(Ok(()), Err)
    }
}
