// 2.0: market event feed. merges per-symbol bar sequences into one stream
// ordered by (timestamp, symbol). finite and single-use: build a fresh feed
// per replay. gaps larger than the tolerated interval are reported as errors,
// never skipped, because silent gaps corrupt funding and cost accrual.

use crate::types::{Price, Symbol, Timestamp};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::cmp::Reverse;
use std::collections::BinaryHeap;

/// One OHLCV bar, optionally carrying the funding rate settled at this bar's
/// open. Immutable once produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketEvent {
    pub symbol: Symbol,
    pub timestamp: Timestamp,
    pub open: Price,
    pub high: Price,
    pub low: Price,
    pub close: Price,
    pub volume: Decimal,
    pub funding_rate: Option<Decimal>,
}

impl MarketEvent {
    /// True if `price` lies within this bar's traded range.
    pub fn range_crosses(&self, price: Price) -> bool {
        price >= self.low && price <= self.high
    }
}

/// Time-sorted bar history for one symbol, as delivered by the external
/// data layer.
#[derive(Debug, Clone)]
pub struct BarSeries {
    pub symbol: Symbol,
    pub bars: Vec<MarketEvent>,
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum FeedError {
    #[error("data gap in {symbol}: {prev_ms}ms -> {next_ms}ms exceeds {max_gap_ms}ms tolerance")]
    DataGap {
        symbol: Symbol,
        prev_ms: i64,
        next_ms: i64,
        max_gap_ms: i64,
    },

    #[error("out-of-order bar in {symbol}: {prev_ms}ms followed by {next_ms}ms")]
    OutOfOrder {
        symbol: Symbol,
        prev_ms: i64,
        next_ms: i64,
    },

    #[error("bar for {bar_symbol} found in series for {series_symbol}")]
    SymbolMismatch {
        series_symbol: Symbol,
        bar_symbol: Symbol,
    },
}

// heap entry ordered on Reverse((timestamp, symbol, source index)) only,
// giving a min-heap with deterministic lexical tie-break
struct HeapEntry {
    key: Reverse<(Timestamp, Symbol, usize)>,
    bar: MarketEvent,
}

impl PartialEq for HeapEntry {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key
    }
}

impl Eq for HeapEntry {}

impl PartialOrd for HeapEntry {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for HeapEntry {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.key.cmp(&other.key)
    }
}

/// K-way merged event stream. Yields `Err` once on the first integrity
/// failure and then terminates.
pub struct EventFeed {
    sources: Vec<std::vec::IntoIter<MarketEvent>>,
    heap: BinaryHeap<HeapEntry>,
    last_emitted: Vec<Option<Timestamp>>,
    symbols: Vec<Symbol>,
    max_gap_ms: i64,
    poisoned: bool,
}

impl EventFeed {
    /// `expected_interval_ms` is the nominal bar spacing; two consecutive bars
    /// of one symbol may be at most `expected_interval_ms * gap_tolerance`
    /// apart before the feed fails with [`FeedError::DataGap`].
    pub fn new(series: Vec<BarSeries>, expected_interval_ms: i64, gap_tolerance: Decimal) -> Self {
        let max_gap = Decimal::from(expected_interval_ms) * gap_tolerance;
        let max_gap_ms = max_gap.trunc().to_i64().unwrap_or(i64::MAX);

        let symbols: Vec<Symbol> = series.iter().map(|s| s.symbol.clone()).collect();
        let mut sources: Vec<std::vec::IntoIter<MarketEvent>> =
            series.into_iter().map(|s| s.bars.into_iter()).collect();

        let mut heap = BinaryHeap::new();
        for (idx, src) in sources.iter_mut().enumerate() {
            if let Some(bar) = src.next() {
                heap.push(HeapEntry {
                    key: Reverse((bar.timestamp, bar.symbol.clone(), idx)),
                    bar,
                });
            }
        }

        let last_emitted = vec![None; sources.len()];

        Self {
            sources,
            heap,
            last_emitted,
            symbols,
            max_gap_ms,
            poisoned: false,
        }
    }

    fn check_continuity(&self, idx: usize, bar: &MarketEvent) -> Result<(), FeedError> {
        if bar.symbol != self.symbols[idx] {
            return Err(FeedError::SymbolMismatch {
                series_symbol: self.symbols[idx].clone(),
                bar_symbol: bar.symbol.clone(),
            });
        }

        if let Some(prev) = self.last_emitted[idx] {
            let prev_ms = prev.as_millis();
            let next_ms = bar.timestamp.as_millis();

            if next_ms <= prev_ms {
                return Err(FeedError::OutOfOrder {
                    symbol: bar.symbol.clone(),
                    prev_ms,
                    next_ms,
                });
            }

            if next_ms - prev_ms > self.max_gap_ms {
                return Err(FeedError::DataGap {
                    symbol: bar.symbol.clone(),
                    prev_ms,
                    next_ms,
                    max_gap_ms: self.max_gap_ms,
                });
            }
        }

        Ok(())
    }
}

impl Iterator for EventFeed {
    type Item = Result<MarketEvent, FeedError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.poisoned {
            return None;
        }

        let HeapEntry {
            key: Reverse((_, _, idx)),
            bar,
        } = self.heap.pop()?;

        if let Err(e) = self.check_continuity(idx, &bar) {
            self.poisoned = true;
            return Some(Err(e));
        }
        self.last_emitted[idx] = Some(bar.timestamp);

        if let Some(next_bar) = self.sources[idx].next() {
            self.heap.push(HeapEntry {
                key: Reverse((next_bar.timestamp, next_bar.symbol.clone(), idx)),
                bar: next_bar,
            });
        }

        Some(Ok(bar))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn bar(symbol: &str, ts: i64, close: Decimal) -> MarketEvent {
        MarketEvent {
            symbol: Symbol::from(symbol),
            timestamp: Timestamp::from_millis(ts),
            open: Price::new_unchecked(close),
            high: Price::new_unchecked(close + dec!(10)),
            low: Price::new_unchecked(close - dec!(10)),
            close: Price::new_unchecked(close),
            volume: dec!(1000),
            funding_rate: None,
        }
    }

    const HOUR: i64 = 3_600_000;

    #[test]
    fn merge_orders_by_timestamp_then_symbol() {
        let feed = EventFeed::new(
            vec![
                BarSeries {
                    symbol: Symbol::from("ETHUSDT"),
                    bars: vec![bar("ETHUSDT", 0, dec!(3000)), bar("ETHUSDT", HOUR, dec!(3010))],
                },
                BarSeries {
                    symbol: Symbol::from("BTCUSDT"),
                    bars: vec![bar("BTCUSDT", 0, dec!(50000)), bar("BTCUSDT", HOUR, dec!(50100))],
                },
            ],
            HOUR,
            dec!(1.5),
        );

        let events: Vec<MarketEvent> = feed.map(|e| e.unwrap()).collect();
        let keys: Vec<(i64, String)> = events
            .iter()
            .map(|e| (e.timestamp.as_millis(), e.symbol.to_string()))
            .collect();

        // ties broken lexically: BTCUSDT before ETHUSDT
        assert_eq!(
            keys,
            vec![
                (0, "BTCUSDT".to_string()),
                (0, "ETHUSDT".to_string()),
                (HOUR, "BTCUSDT".to_string()),
                (HOUR, "ETHUSDT".to_string()),
            ]
        );
    }

    #[test]
    fn gap_beyond_tolerance_fails() {
        let mut feed = EventFeed::new(
            vec![BarSeries {
                symbol: Symbol::from("BTCUSDT"),
                bars: vec![
                    bar("BTCUSDT", 0, dec!(50000)),
                    bar("BTCUSDT", 3 * HOUR, dec!(50100)), // two bars missing
                ],
            }],
            HOUR,
            dec!(1.5),
        );

        assert!(feed.next().unwrap().is_ok());
        assert!(matches!(feed.next(), Some(Err(FeedError::DataGap { .. }))));
        // poisoned after the failure
        assert!(feed.next().is_none());
    }

    #[test]
    fn gap_within_tolerance_passes() {
        let feed = EventFeed::new(
            vec![BarSeries {
                symbol: Symbol::from("BTCUSDT"),
                bars: vec![
                    bar("BTCUSDT", 0, dec!(50000)),
                    bar("BTCUSDT", HOUR + HOUR / 4, dec!(50100)),
                ],
            }],
            HOUR,
            dec!(1.5),
        );

        assert_eq!(feed.filter(|e| e.is_ok()).count(), 2);
    }

    #[test]
    fn out_of_order_bars_fail() {
        let mut feed = EventFeed::new(
            vec![BarSeries {
                symbol: Symbol::from("BTCUSDT"),
                bars: vec![bar("BTCUSDT", HOUR, dec!(50000)), bar("BTCUSDT", 0, dec!(50100))],
            }],
            HOUR,
            dec!(1.5),
        );

        assert!(feed.next().unwrap().is_ok());
        assert!(matches!(feed.next(), Some(Err(FeedError::OutOfOrder { .. }))));
    }

    #[test]
    fn merged_stream_is_monotonic() {
        let feed = EventFeed::new(
            vec![
                BarSeries {
                    symbol: Symbol::from("BTCUSDT"),
                    bars: (0..10).map(|i| bar("BTCUSDT", i * HOUR, dec!(50000))).collect(),
                },
                BarSeries {
                    symbol: Symbol::from("SOLUSDT"),
                    bars: (0..10).map(|i| bar("SOLUSDT", i * HOUR, dec!(150))).collect(),
                },
            ],
            HOUR,
            dec!(1.5),
        );

        let mut last = i64::MIN;
        for event in feed {
            let ts = event.unwrap().timestamp.as_millis();
            assert!(ts >= last);
            last = ts;
        }
    }

    #[test]
    fn range_crosses() {
        let b = bar("BTCUSDT", 0, dec!(50000));
        assert!(b.range_crosses(Price::new_unchecked(dec!(50005))));
        assert!(!b.range_crosses(Price::new_unchecked(dec!(50020))));
    }
}
