//! Backtest configuration.

use crate::metrics::HOURLY_PERIODS_PER_YEAR;
use crate::risk::RiskParams;
use crate::sim::ExecConfig;
use crate::types::Quote;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

/// Hard limits that halt a replay when breached. A halt is a deliberate
/// outcome, not an error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KillSwitchParams {
    /// Equity decline from the UTC-day-start equity that stops trading.
    pub max_daily_drawdown: Decimal,
    /// Consecutive sizing rejections that stop trading.
    pub max_consecutive_rejections: u32,
}

impl Default for KillSwitchParams {
    fn default() -> Self {
        Self {
            max_daily_drawdown: dec!(0.02),
            max_consecutive_rejections: 5,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BacktestConfig {
    pub initial_equity: Quote,
    pub risk: RiskParams,
    pub exec: ExecConfig,
    pub kill: KillSwitchParams,
    /// Annualization basis for the Sharpe ratio.
    pub periods_per_year: u32,
}

impl Default for BacktestConfig {
    fn default() -> Self {
        Self {
            initial_equity: Quote::new(dec!(10000)),
            risk: RiskParams::default(),
            exec: ExecConfig::default(),
            kill: KillSwitchParams::default(),
            periods_per_year: HOURLY_PERIODS_PER_YEAR,
        }
    }
}
