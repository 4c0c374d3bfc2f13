// 10.0: backtest orchestrator. coordinates feed replay, strategy callbacks,
// risk-engine admission, simulated execution, and kill switches.
// deterministic and event-driven with no external I/O.

mod config;
mod core;
mod results;

pub use config::{BacktestConfig, KillSwitchParams};
pub use core::Backtester;
pub use results::{
    BacktestError, BacktestResult, HaltReason, RejectionRecord, ReplayStatus,
};
