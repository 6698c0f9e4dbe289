use std::collections::HashMap;
use std::sync::Arc;

use futures::future::join_all;
use tracing::{error, info};

use crate::assets::{ExchangePair, SharedAssets};
use crate::config::{validate_fee, EngineConfig};
use crate::error::ConfigError;
use crate::exchange::{PriceSource, RateLimitedSource};
use crate::monitor::{MonitorSettings, PairArbitrageMonitor};
use crate::rate_limiter::RateLimiterRegistry;
use crate::report::ReportSink;
use crate::shutdown::Shutdown;
use crate::simulation::{OpportunityEvaluator, Thresholds};

/// Owns the rate-limiter registry and one monitor per exchange pair.
///
/// Every source is wrapped once, so all monitors touching an exchange share
/// its limiter.
pub struct Scheduler {
    monitors: Vec<PairArbitrageMonitor>,
    rate_limiters: Arc<RateLimiterRegistry>,
}

impl Scheduler {
    /// Validate everything up front; the scheduler never starts half-configured
    pub fn new(
        config: &EngineConfig,
        sources: HashMap<String, Arc<dyn PriceSource>>,
        assets: SharedAssets,
        sink: Arc<dyn ReportSink>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;

        let pairs = monitored_pairs(config, &assets)?;

        let rate_limiters = Arc::new(RateLimiterRegistry::new(
            config.rate_delays.clone(),
            config.default_rate_delay,
        ));

        let sources: HashMap<String, Arc<dyn PriceSource>> = sources
            .into_iter()
            .map(|(name, source)| (name.trim().to_lowercase(), source))
            .collect();

        let mut wrapped: HashMap<String, Arc<dyn PriceSource>> = HashMap::new();
        for pair in &pairs {
            for exchange in [&pair.first, &pair.second] {
                if wrapped.contains_key(exchange) {
                    continue;
                }
                let source = sources
                    .get(exchange)
                    .ok_or_else(|| ConfigError::UnknownExchange(exchange.clone()))?;
                validate_fee(exchange, source.fee_rate_percent())?;

                let limiter = rate_limiters.limiter(exchange);
                info!(
                    "Rate limit {}: {}ms between requests",
                    limiter.key(),
                    limiter.min_delay().as_millis()
                );
                let limited: Arc<dyn PriceSource> =
                    Arc::new(RateLimitedSource::new(source.clone(), limiter, config.fetch_timeout));
                wrapped.insert(exchange.clone(), limited);
            }
        }

        let evaluator = OpportunityEvaluator::new(
            Thresholds {
                arbitrage: config.arbitrage_threshold,
                absurd: config.absurd_threshold,
            },
            config.investment_amount,
            config.orderbook_depth,
        );
        let settings = MonitorSettings {
            orderbook_depth: config.orderbook_depth,
            asset_concurrency: config.asset_concurrency,
            poll_interval: config.poll_interval,
        };

        let monitors = pairs
            .into_iter()
            .map(|pair| {
                let legs = [wrapped[&pair.first].clone(), wrapped[&pair.second].clone()];
                PairArbitrageMonitor::new(pair, legs, evaluator, assets.clone(), sink.clone(), settings)
            })
            .collect();

        Ok(Self {
            monitors,
            rate_limiters,
        })
    }

    pub fn pairs(&self) -> impl Iterator<Item = &ExchangePair> {
        self.monitors.iter().map(PairArbitrageMonitor::pair)
    }

    /// Run every monitor concurrently; returns once all of them have observed
    /// shutdown.
    pub async fn run(self, shutdown: Shutdown) {
        info!(
            "Starting {} pair monitors across {} exchanges",
            self.monitors.len(),
            self.rate_limiters.len()
        );

        let handles = self
            .monitors
            .into_iter()
            .map(|monitor| {
                let pair = monitor.pair().clone();
                (pair, tokio::spawn(monitor.run(shutdown.clone())))
            })
            .collect::<Vec<_>>();

        let (pairs, tasks): (Vec<_>, Vec<_>) = handles.into_iter().unzip();
        for (pair, result) in pairs.iter().zip(join_all(tasks).await) {
            if let Err(e) = result {
                error!("Monitor {} ended abnormally: {}", pair, e);
            }
        }

        info!("All monitors stopped");
    }
}

/// Configured pairs, or every pair in the catalog when none are configured
fn monitored_pairs(config: &EngineConfig, assets: &SharedAssets) -> Result<Vec<ExchangePair>, ConfigError> {
    let mut pairs = if config.exchange_pairs.is_empty() {
        assets.snapshot().pairs().cloned().collect()
    } else {
        config.exchange_pairs.clone()
    };
    pairs.sort();
    pairs.dedup();

    if pairs.is_empty() {
        return Err(ConfigError::NoExchangePairs);
    }
    Ok(pairs)
}
