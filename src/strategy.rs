//! Strategy boundary.
//!
//! The orchestrator is signal-agnostic: strategies see the current event and
//! a read-only portfolio snapshot and answer with zero or more intents. The
//! reference strategies here exist for the demo binary and tests; they are
//! deliberately tiny and deterministic.

use crate::feed::MarketEvent;
use crate::instrument::InstrumentSpec;
use crate::order::{OrderKind, TimeInForce};
use crate::position::Position;
use crate::risk::{OrderIntent, SizeMode};
use crate::types::{Price, Quote, Side, Symbol};
use rust_decimal::Decimal;
use std::collections::VecDeque;

/// What the strategy may see of the market at this event.
pub struct MarketView<'a> {
    pub event: &'a MarketEvent,
    pub spec: &'a InstrumentSpec,
}

/// Read-only account snapshot at this event.
pub struct PortfolioView<'a> {
    pub equity: Quote,
    /// Fraction of equity committed as risk, counting both open positions
    /// and entry orders that have not filled yet.
    pub open_risk_fraction: Decimal,
    /// Open position on the event's symbol, if any.
    pub position: Option<&'a Position>,
}

/// The sole signal-generation integration point.
pub trait Strategy {
    fn on_event(&mut self, market: &MarketView<'_>, portfolio: &PortfolioView<'_>) -> Vec<OrderIntent>;
}

/// Enters long once on the first bar and holds. Useful as a baseline and
/// for exercising the fill/funding plumbing in tests.
pub struct BuyAndHold {
    pub symbol: Symbol,
    pub risk_fraction: Decimal,
    /// Stop distance as a fraction of entry.
    pub stop_pct: Decimal,
    entered: bool,
}

impl BuyAndHold {
    pub fn new(symbol: Symbol, risk_fraction: Decimal, stop_pct: Decimal) -> Self {
        Self {
            symbol,
            risk_fraction,
            stop_pct,
            entered: false,
        }
    }
}

impl Strategy for BuyAndHold {
    fn on_event(&mut self, market: &MarketView<'_>, portfolio: &PortfolioView<'_>) -> Vec<OrderIntent> {
        if self.entered || portfolio.position.is_some() || market.event.symbol != self.symbol {
            return Vec::new();
        }
        self.entered = true;

        let entry = market.event.close;
        let stop = entry.value() * (Decimal::ONE - self.stop_pct);
        let Some(stop) = Price::new(stop) else {
            return Vec::new();
        };
        // bar range as a crude volatility proxy
        let atr = market.event.high.value() - market.event.low.value();

        vec![OrderIntent {
            symbol: self.symbol.clone(),
            side: Side::Long,
            kind: OrderKind::Market,
            entry_price: entry,
            stop_price: stop,
            target_price: None,
            size: SizeMode::RiskFraction(self.risk_fraction),
            time_in_force: TimeInForce::GoodTillCancel,
            atr,
        }]
    }
}

/// Channel breakout: goes long when the close exceeds the highest high of
/// the lookback window, stop under the lowest low of the same window. ATR
/// is a rolling mean of bar ranges over the window.
pub struct Breakout {
    pub symbol: Symbol,
    pub lookback: usize,
    pub risk_fraction: Decimal,
    highs: VecDeque<Decimal>,
    lows: VecDeque<Decimal>,
    ranges: VecDeque<Decimal>,
}

impl Breakout {
    pub fn new(symbol: Symbol, lookback: usize, risk_fraction: Decimal) -> Self {
        Self {
            symbol,
            lookback,
            risk_fraction,
            highs: VecDeque::new(),
            lows: VecDeque::new(),
            ranges: VecDeque::new(),
        }
    }

    fn push(&mut self, event: &MarketEvent) {
        self.highs.push_back(event.high.value());
        self.lows.push_back(event.low.value());
        self.ranges.push_back(event.high.value() - event.low.value());
        if self.highs.len() > self.lookback {
            self.highs.pop_front();
            self.lows.pop_front();
            self.ranges.pop_front();
        }
    }

    fn atr(&self) -> Decimal {
        if self.ranges.is_empty() {
            return Decimal::ZERO;
        }
        self.ranges.iter().copied().sum::<Decimal>() / Decimal::from(self.ranges.len() as u64)
    }
}

impl Strategy for Breakout {
    fn on_event(&mut self, market: &MarketView<'_>, portfolio: &PortfolioView<'_>) -> Vec<OrderIntent> {
        if market.event.symbol != self.symbol {
            return Vec::new();
        }

        let signal = if self.highs.len() == self.lookback && portfolio.position.is_none() {
            let channel_high = self.highs.iter().copied().max();
            let channel_low = self.lows.iter().copied().min();
            match (channel_high, channel_low) {
                (Some(high), Some(low)) if market.event.close.value() > high => {
                    Price::new(low).map(|stop| OrderIntent {
                        symbol: self.symbol.clone(),
                        side: Side::Long,
                        kind: OrderKind::Market,
                        entry_price: market.event.close,
                        stop_price: stop,
                        target_price: None,
                        size: SizeMode::RiskFraction(self.risk_fraction),
                        time_in_force: TimeInForce::GoodTillCancel,
                        atr: self.atr(),
                    })
                }
                _ => None,
            }
        } else {
            None
        };

        self.push(market.event);
        signal.into_iter().collect()
    }
}

/// Emits nothing. Replays with this strategy measure pure funding and
/// data-path behavior.
pub struct NoOpStrategy;

impl Strategy for NoOpStrategy {
    fn on_event(&mut self, _: &MarketView<'_>, _: &PortfolioView<'_>) -> Vec<OrderIntent> {
        Vec::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Timestamp;
    use rust_decimal_macros::dec;

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

    fn empty_portfolio() -> PortfolioView<'static> {
        PortfolioView {
            equity: Quote::new(dec!(10000)),
            open_risk_fraction: dec!(0),
            position: None,
        }
    }

    #[test]
    fn buy_and_hold_enters_once() {
        let spec = InstrumentSpec::btc_perp();
        let mut strategy = BuyAndHold::new(Symbol::from("BTCUSDT"), dec!(0.01), dec!(0.02));

        let event = bar(0, dec!(50000), dec!(50500), dec!(49800), dec!(50200));
        let market = MarketView {
            event: &event,
            spec: &spec,
        };

        let intents = strategy.on_event(&market, &empty_portfolio());
        assert_eq!(intents.len(), 1);
        assert_eq!(intents[0].side, Side::Long);
        assert_eq!(intents[0].stop_price.value(), dec!(49196.0000));

        // never again
        let intents = strategy.on_event(&market, &empty_portfolio());
        assert!(intents.is_empty());
    }

    #[test]
    fn breakout_waits_for_the_channel() {
        let spec = InstrumentSpec::btc_perp();
        let mut strategy = Breakout::new(Symbol::from("BTCUSDT"), 3, dec!(0.01));

        // three bars build the channel, no signal possible
        for i in 0..3 {
            let event = bar(
                i * 3_600_000,
                dec!(50000),
                dec!(50500),
                dec!(49500),
                dec!(50000),
            );
            let market = MarketView {
                event: &event,
                spec: &spec,
            };
            assert!(strategy.on_event(&market, &empty_portfolio()).is_empty());
        }

        // close above the 50500 channel high fires a long
        let event = bar(4 * 3_600_000, dec!(50400), dec!(51200), dec!(50300), dec!(51000));
        let market = MarketView {
            event: &event,
            spec: &spec,
        };
        let intents = strategy.on_event(&market, &empty_portfolio());
        assert_eq!(intents.len(), 1);
        assert_eq!(intents[0].stop_price.value(), dec!(49500));
        assert_eq!(intents[0].atr, dec!(1000));
    }

    #[test]
    fn breakout_stays_flat_with_open_position() {
        let spec = InstrumentSpec::btc_perp();
        let mut strategy = Breakout::new(Symbol::from("BTCUSDT"), 2, dec!(0.01));

        for i in 0..2 {
            let event = bar(i * 3_600_000, dec!(50000), dec!(50500), dec!(49500), dec!(50000));
            let market = MarketView {
                event: &event,
                spec: &spec,
            };
            strategy.on_event(&market, &empty_portfolio());
        }

        let position = Position::open(
            Symbol::from("BTCUSDT"),
            Side::Long,
            dec!(0.1),
            Price::new_unchecked(dec!(50000)),
            None,
            crate::types::Leverage::one(),
            Quote::new(dec!(5000)),
            None,
            Quote::new(dec!(100)),
            Timestamp::from_millis(0),
        );
        let portfolio = PortfolioView {
            equity: Quote::new(dec!(10000)),
            open_risk_fraction: dec!(0.01),
            position: Some(&position),
        };

        let event = bar(3 * 3_600_000, dec!(50400), dec!(51200), dec!(50300), dec!(51000));
        let market = MarketView {
            event: &event,
            spec: &spec,
        };
        assert!(strategy.on_event(&market, &portfolio).is_empty());
    }
}
