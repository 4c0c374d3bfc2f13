//! Performance statistics.
//!
//! Pure functions over the finished equity curve and trade record. Nothing
//! here is maintained incrementally during a replay; everything is derived
//! once at finalization.

use crate::ledger::{ClosedTrade, EquityPoint};
use crate::types::Quote;
use rust_decimal::{Decimal, MathematicalOps};
use serde::{Deserialize, Serialize};

/// Periods per year for a 1h bar feed, the default annualization basis.
pub const HOURLY_PERIODS_PER_YEAR: u32 = 8760;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BacktestStats {
    pub total_trades: usize,
    pub winning_trades: usize,
    pub losing_trades: usize,
    /// Wins over total closes; zero when nothing closed.
    pub win_rate: Decimal,
    /// Final equity minus initial equity, net of fees and funding.
    pub total_pnl: Quote,
    pub total_fees: Quote,
    /// Net funding impact (negative = paid out).
    pub total_funding: Quote,
    /// Worst peak-to-trough equity decline as a fraction of the peak.
    pub max_drawdown: Decimal,
    /// Annualized mean over standard deviation of per-period returns.
    pub sharpe_ratio: Decimal,
    /// Gross profit over gross loss; `None` when there were no losses.
    pub profit_factor: Option<Decimal>,
}

/// Compute the full statistics block from a finished replay.
pub fn compute_stats(
    initial_equity: Quote,
    equity_curve: &[EquityPoint],
    closed_trades: &[ClosedTrade],
    total_fees: Quote,
    total_funding: Quote,
    periods_per_year: u32,
) -> BacktestStats {
    let winning_trades = closed_trades
        .iter()
        .filter(|t| t.realized.value() > Decimal::ZERO)
        .count();
    let losing_trades = closed_trades
        .iter()
        .filter(|t| t.realized.value() < Decimal::ZERO)
        .count();
    let total_trades = closed_trades.len();

    let win_rate = if total_trades > 0 {
        Decimal::from(winning_trades as u64) / Decimal::from(total_trades as u64)
    } else {
        Decimal::ZERO
    };

    let final_equity = equity_curve
        .last()
        .map(|p| p.equity)
        .unwrap_or(initial_equity);
    let total_pnl = final_equity.sub(initial_equity);

    let gross_profit: Decimal = closed_trades
        .iter()
        .map(|t| t.realized.value())
        .filter(|r| *r > Decimal::ZERO)
        .sum();
    let gross_loss: Decimal = closed_trades
        .iter()
        .map(|t| t.realized.value())
        .filter(|r| *r < Decimal::ZERO)
        .sum();
    let profit_factor = if gross_loss < Decimal::ZERO {
        Some(gross_profit / gross_loss.abs())
    } else {
        None
    };

    BacktestStats {
        total_trades,
        winning_trades,
        losing_trades,
        win_rate,
        total_pnl,
        total_fees,
        total_funding,
        max_drawdown: max_drawdown(equity_curve),
        sharpe_ratio: sharpe_ratio(equity_curve, periods_per_year),
        profit_factor,
    }
}

/// Worst peak-to-trough decline as a fraction of the peak.
pub fn max_drawdown(equity_curve: &[EquityPoint]) -> Decimal {
    let mut peak = Decimal::MIN;
    let mut worst = Decimal::ZERO;

    for point in equity_curve {
        let equity = point.equity.value();
        if equity > peak {
            peak = equity;
        }
        if peak > Decimal::ZERO {
            let drawdown = (peak - equity) / peak;
            if drawdown > worst {
                worst = drawdown;
            }
        }
    }

    worst
}

/// Annualized Sharpe ratio of per-period simple returns, risk-free rate
/// taken as zero. Zero when the curve is too short or flat.
pub fn sharpe_ratio(equity_curve: &[EquityPoint], periods_per_year: u32) -> Decimal {
    if equity_curve.len() < 2 {
        return Decimal::ZERO;
    }

    let mut returns = Vec::with_capacity(equity_curve.len() - 1);
    for pair in equity_curve.windows(2) {
        let prev = pair[0].equity.value();
        if prev <= Decimal::ZERO {
            return Decimal::ZERO;
        }
        returns.push((pair[1].equity.value() - prev) / prev);
    }

    let n = Decimal::from(returns.len() as u64);
    let mean: Decimal = returns.iter().copied().sum::<Decimal>() / n;
    let variance: Decimal = returns
        .iter()
        .map(|r| (*r - mean) * (*r - mean))
        .sum::<Decimal>()
        / n;

    let std_dev = variance.sqrt().unwrap_or(Decimal::ZERO);
    if std_dev.is_zero() {
        return Decimal::ZERO;
    }

    let annualization = Decimal::from(periods_per_year)
        .sqrt()
        .unwrap_or(Decimal::ONE);
    mean / std_dev * annualization
}
