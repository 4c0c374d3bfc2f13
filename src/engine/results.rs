//! Replay outcomes.

use crate::feed::FeedError;
use crate::instrument::MissingInstrument;
use crate::ledger::{ClosedTrade, EquityPoint, LedgerError};
use crate::metrics::BacktestStats;
use crate::order::Fill;
use crate::risk::RejectionReason;
use crate::types::{Quote, Symbol, Timestamp};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HaltReason {
    DailyDrawdown,
    ConsecutiveRejections,
}

/// How the replay ended. `Halted` and `Canceled` still produce a full
/// result over the events processed so far.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReplayStatus {
    /// The feed was exhausted.
    Completed,
    /// A kill switch tripped.
    Halted(HaltReason),
    /// The caller's cancellation flag was raised.
    Canceled,
}

/// A sizing rejection observed during the replay.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RejectionRecord {
    pub timestamp: Timestamp,
    pub symbol: Symbol,
    pub reason: RejectionReason,
}

/// Everything a finished replay leaves behind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BacktestResult {
    pub status: ReplayStatus,
    pub stats: BacktestStats,
    pub initial_equity: Quote,
    pub final_equity: Quote,
    pub equity_curve: Vec<EquityPoint>,
    pub trade_log: Vec<Fill>,
    pub closed_trades: Vec<ClosedTrade>,
    pub rejections: Vec<RejectionRecord>,
}

/// Fatal replay failures. Sizing rejections and kill-switch halts are never
/// errors; these are.
#[derive(Debug, Clone, thiserror::Error)]
pub enum BacktestError {
    #[error("feed integrity failure: {0}")]
    Feed(#[from] FeedError),

    #[error(transparent)]
    MissingInstrument(#[from] MissingInstrument),

    #[error("ledger invariant violated: {0}")]
    Ledger(#[from] LedgerError),
}
