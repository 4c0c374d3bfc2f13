//! Parallel parameter sweeps.
//!
//! Replays are embarrassingly parallel: each run owns its ledger, simulator,
//! and strategy, and shares only the read-only instrument catalog and bar
//! data. Feeds are single-use, so callers hand over factories rather than
//! feeds.

use crate::engine::{Backtester, BacktestConfig, BacktestError, BacktestResult};
use crate::feed::EventFeed;
use crate::instrument::InstrumentCatalog;
use crate::strategy::Strategy;
use rayon::prelude::*;
use rust_decimal::Decimal;

/// Run one replay per config across a rayon pool. The strategy factory sees
/// the config so swept parameters can flow into signal generation. Results
/// come back in config order regardless of scheduling.
pub fn run_sweep<S, FeedFn, StratFn>(
    configs: &[BacktestConfig],
    catalog: &InstrumentCatalog,
    make_feed: FeedFn,
    make_strategy: StratFn,
) -> Vec<Result<BacktestResult, BacktestError>>
where
    S: Strategy + Send,
    FeedFn: Fn() -> EventFeed + Sync,
    StratFn: Fn(&BacktestConfig) -> S + Sync,
{
    configs
        .par_iter()
        .map(|config| {
            Backtester::new(config.clone(), catalog, make_strategy(config)).run(make_feed())
        })
        .collect()
}

/// One config per per-trade risk fraction, everything else from `base`.
pub fn vary_risk_fraction(base: &BacktestConfig, fractions: &[Decimal]) -> Vec<BacktestConfig> {
    fractions
        .iter()
        .map(|&fraction| {
            let mut config = base.clone();
            config.risk.max_risk_per_trade = fraction;
            config
        })
        .collect()
}
