//! Replay loop.
//!
//! Drives feed -> simulator -> strategy -> risk engine -> simulator, one
//! event at a time, and watches the kill switches between events. The loop
//! owns all mutable state; strategies only ever see snapshots.

use crate::engine::config::BacktestConfig;
use crate::engine::results::{
    BacktestError, BacktestResult, HaltReason, RejectionRecord, ReplayStatus,
};
use crate::feed::EventFeed;
use crate::instrument::InstrumentCatalog;
use crate::ledger::Ledger;
use crate::metrics::compute_stats;
use crate::order::{OrderKind, TimeInForce};
use crate::risk::size_position;
use crate::sim::ExecutionSim;
use crate::strategy::{MarketView, PortfolioView, Strategy};
use crate::types::{OrderId, Price, Side};
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

// exit orders owed to an entry order once it fills
#[derive(Debug, Clone)]
struct Protection {
    close_side: Side,
    stop: Price,
    target: Option<Price>,
}

pub struct Backtester<'a, S: Strategy> {
    config: BacktestConfig,
    catalog: &'a InstrumentCatalog,
    strategy: S,
    cancel: Option<Arc<AtomicBool>>,
}

impl<'a, S: Strategy> Backtester<'a, S> {
    pub fn new(config: BacktestConfig, catalog: &'a InstrumentCatalog, strategy: S) -> Self {
        Self {
            config,
            catalog,
            strategy,
            cancel: None,
        }
    }

    /// Install a cooperative cancellation flag, checked between events.
    pub fn with_cancel(mut self, flag: Arc<AtomicBool>) -> Self {
        self.cancel = Some(flag);
        self
    }

    /// Run the replay to a terminal status. Only data-integrity and
    /// internal-invariant failures surface as errors.
    pub fn run(mut self, feed: EventFeed) -> Result<BacktestResult, BacktestError> {
        let span = tracing::info_span!("replay");
        let _guard = span.enter();

        let mut ledger = Ledger::new(self.config.initial_equity);
        let mut sim = ExecutionSim::new(self.config.exec.clone());
        let mut rejections: Vec<RejectionRecord> = Vec::new();
        let mut pending_protection: HashMap<OrderId, Protection> = HashMap::new();

        let mut status = ReplayStatus::Completed;
        let mut current_day: Option<i64> = None;
        let mut day_start_equity = self.config.initial_equity;
        let mut rejection_streak: u32 = 0;

        'replay: for item in feed {
            let event = item?;

            if let Some(flag) = &self.cancel {
                if flag.load(Ordering::Relaxed) {
                    status = ReplayStatus::Canceled;
                    tracing::info!("replay canceled");
                    break 'replay;
                }
            }

            let spec = self.catalog.get(&event.symbol)?;

            let day = event.timestamp.utc_day();
            if current_day != Some(day) {
                current_day = Some(day);
                day_start_equity = ledger.equity();
            }

            let fills = sim.process_event(&event, &mut ledger, spec)?;

            // entry fills earn their protective exits
            for fill in &fills {
                if let Some(plan) = pending_protection.get(&fill.order_id).cloned() {
                    sim.submit_reduce(
                        fill.symbol.clone(),
                        plan.close_side,
                        OrderKind::Stop(plan.stop),
                        fill.quantity,
                        TimeInForce::GoodTillCancel,
                        event.timestamp,
                    );
                    if let Some(target) = plan.target {
                        sim.submit_reduce(
                            fill.symbol.clone(),
                            plan.close_side,
                            OrderKind::Limit(target),
                            fill.quantity,
                            TimeInForce::GoodTillCancel,
                            event.timestamp,
                        );
                    }
                    if matches!(fill.fill_type, crate::order::FillType::Full) {
                        pending_protection.remove(&fill.order_id);
                    }
                }
            }

            // plans whose entry died (IOC remainder expired) are dropped
            pending_protection.retain(|id, _| sim.has_working_order(*id));

            let intents = {
                let market = MarketView {
                    event: &event,
                    spec,
                };
                let portfolio = PortfolioView {
                    equity: ledger.equity(),
                    open_risk_fraction: committed_risk_fraction(&ledger, &sim),
                    position: ledger.position(&event.symbol),
                };
                self.strategy.on_event(&market, &portfolio)
            };

            for intent in intents {
                let intent_spec = self.catalog.get(&intent.symbol)?;
                // recomputed per intent so each admission sees the risk the
                // previous ones reserved, filled or not
                let sizing = size_position(
                    &intent,
                    ledger.equity(),
                    committed_risk_fraction(&ledger, &sim),
                    intent_spec,
                    &self.config.risk,
                );

                match sizing.rejection {
                    None => {
                        rejection_streak = 0;
                        let id = sim.submit_entry(&intent, &sizing, event.timestamp);
                        pending_protection.insert(
                            id,
                            Protection {
                                close_side: intent.side.opposite(),
                                stop: intent.stop_price,
                                target: intent.target_price,
                            },
                        );
                    }
                    Some(reason) => {
                        tracing::debug!(symbol = %intent.symbol, %reason, "intent rejected");
                        rejections.push(RejectionRecord {
                            timestamp: event.timestamp,
                            symbol: intent.symbol.clone(),
                            reason,
                        });
                        rejection_streak += 1;
                        if rejection_streak >= self.config.kill.max_consecutive_rejections {
                            status = ReplayStatus::Halted(HaltReason::ConsecutiveRejections);
                            tracing::warn!(streak = rejection_streak, "rejection kill switch tripped");
                            break 'replay;
                        }
                    }
                }
            }

            ledger.sample_equity(event.timestamp);

            if day_start_equity.value() > Decimal::ZERO {
                let drawdown =
                    (day_start_equity.value() - ledger.equity().value()) / day_start_equity.value();
                if drawdown > self.config.kill.max_daily_drawdown {
                    status = ReplayStatus::Halted(HaltReason::DailyDrawdown);
                    tracing::warn!(%drawdown, "daily drawdown kill switch tripped");
                    break 'replay;
                }
            }
        }

        Ok(self.finalize(status, ledger, rejections))
    }

    fn finalize(
        &self,
        status: ReplayStatus,
        ledger: Ledger,
        rejections: Vec<RejectionRecord>,
    ) -> BacktestResult {
        let stats = compute_stats(
            self.config.initial_equity,
            ledger.equity_curve(),
            ledger.closed_trades(),
            ledger.fees_paid(),
            ledger.funding_net(),
            self.config.periods_per_year,
        );
        let final_equity = ledger.equity();
        tracing::info!(
            ?status,
            final_equity = %final_equity,
            trades = stats.total_trades,
            "replay finished"
        );

        BacktestResult {
            status,
            stats,
            initial_equity: self.config.initial_equity,
            final_equity,
            equity_curve: ledger.equity_curve().to_vec(),
            trade_log: ledger.trade_log().to_vec(),
            closed_trades: ledger.closed_trades().to_vec(),
            rejections,
        }
    }
}

// Fraction of equity already spoken for: open positions' allocated risk
// plus the budget reserved by accepted-but-unfilled entry orders. Fills
// move risk from one bucket to the other without changing the total.
fn committed_risk_fraction(ledger: &Ledger, sim: &ExecutionSim) -> Decimal {
    let equity = ledger.equity().value();
    if equity <= Decimal::ZERO {
        return Decimal::ONE;
    }
    ledger.open_risk_fraction() + sim.pending_entry_risk().value() / equity
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feed::{BarSeries, MarketEvent};
    use crate::instrument::InstrumentSpec;
    use crate::strategy::{BuyAndHold, NoOpStrategy};
    use crate::types::{Symbol, Timestamp};
    use rust_decimal_macros::dec;

    const HOUR: i64 = 3_600_000;

    fn bar(ts: i64, open: Decimal, high: Decimal, low: Decimal, close: Decimal) -> MarketEvent {
        MarketEvent {
            symbol: Symbol::from("BTCUSDT"),
            timestamp: Timestamp::from_millis(ts),
            open: Price::new_unchecked(open),
            high: Price::new_unchecked(high),
            low: Price::new_unchecked(low),
            close: Price::new_unchecked(close),
            volume: dec!(1000),
            funding_rate: None,
        }
    }

    fn flat_feed(bars: usize) -> EventFeed {
        let bars = (0..bars as i64)
            .map(|i| bar(i * HOUR, dec!(50000), dec!(50100), dec!(49900), dec!(50000)))
            .collect();
        EventFeed::new(
            vec![BarSeries {
                symbol: Symbol::from("BTCUSDT"),
                bars,
            }],
            HOUR,
            dec!(1.5),
        )
    }

    fn catalog() -> InstrumentCatalog {
        InstrumentCatalog::new(vec![InstrumentSpec::btc_perp()])
    }

    #[test]
    fn noop_replay_completes_flat() {
        let catalog = catalog();
        let result = Backtester::new(BacktestConfig::default(), &catalog, NoOpStrategy)
            .run(flat_feed(24))
            .unwrap();

        assert_eq!(result.status, ReplayStatus::Completed);
        assert!(result.trade_log.is_empty());
        assert_eq!(result.final_equity, result.initial_equity);
        assert_eq!(result.equity_curve.len(), 24);
    }

    #[test]
    fn buy_and_hold_opens_with_protection() {
        let catalog = catalog();
        let strategy = BuyAndHold::new(Symbol::from("BTCUSDT"), dec!(0.01), dec!(0.02));
        let result = Backtester::new(BacktestConfig::default(), &catalog, strategy)
            .run(flat_feed(24))
            .unwrap();

        assert_eq!(result.status, ReplayStatus::Completed);
        // entry filled on the bar after the signal
        assert_eq!(result.trade_log.len(), 1);
        assert!(result.rejections.is_empty());
    }

    #[test]
    fn cancellation_is_terminal_not_error() {
        let catalog = catalog();
        let flag = Arc::new(AtomicBool::new(true));
        let result = Backtester::new(BacktestConfig::default(), &catalog, NoOpStrategy)
            .with_cancel(flag)
            .run(flat_feed(24))
            .unwrap();

        assert_eq!(result.status, ReplayStatus::Canceled);
        assert!(result.equity_curve.is_empty());
    }

    #[test]
    fn missing_instrument_is_fatal() {
        let catalog = InstrumentCatalog::default();
        let err = Backtester::new(BacktestConfig::default(), &catalog, NoOpStrategy)
            .run(flat_feed(4))
            .unwrap_err();

        assert!(matches!(err, BacktestError::MissingInstrument(_)));
    }

    #[test]
    fn data_gap_aborts_the_replay() {
        let catalog = catalog();
        let bars = vec![
            bar(0, dec!(50000), dec!(50100), dec!(49900), dec!(50000)),
            bar(5 * HOUR, dec!(50000), dec!(50100), dec!(49900), dec!(50000)),
        ];
        let feed = EventFeed::new(
            vec![BarSeries {
                symbol: Symbol::from("BTCUSDT"),
                bars,
            }],
            HOUR,
            dec!(1.5),
        );

        let err = Backtester::new(BacktestConfig::default(), &catalog, NoOpStrategy)
            .run(feed)
            .unwrap_err();
        assert!(matches!(err, BacktestError::Feed(_)));
    }
}
