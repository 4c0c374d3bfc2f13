//! Portfolio ledger.
//!
//! Single owner of equity, positions, the trade log, and the equity curve.
//! All mutation goes through `apply_fill`, `apply_funding`, and
//! `mark_to_market`. After every fill the ledger cross-checks its own cash
//! arithmetic against position-level bookkeeping; a mismatch means a defect
//! somewhere in the pipeline and aborts the replay.

use crate::instrument::InstrumentSpec;
use crate::order::{Fill, Order};
use crate::position::{Position, PositionError};
use crate::risk::liquidation_price;
use crate::types::{Leverage, Price, Quote, Symbol, Timestamp};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EquityPoint {
    pub timestamp: Timestamp,
    pub equity: Quote,
}

/// One closing fill's booked result. The unit of record for win/loss
/// statistics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClosedTrade {
    pub symbol: Symbol,
    pub quantity: Decimal,
    pub exit_price: Price,
    /// Realized P&L of the closed slice, gross of fees.
    pub realized: Quote,
    pub timestamp: Timestamp,
    pub forced: bool,
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum LedgerError {
    #[error(transparent)]
    Position(#[from] PositionError),

    #[error("reducing fill for {0} but no open position")]
    NoPositionToReduce(Symbol),

    #[error("conservation violated: cash balance {actual} but bookkeeping implies {expected}")]
    ConservationViolation { expected: Quote, actual: Quote },
}

#[derive(Debug, Clone)]
pub struct Ledger {
    initial_equity: Quote,
    /// Realized cash: initial equity plus booked P&L, fees, and funding.
    balance: Quote,
    positions: HashMap<Symbol, Position>,
    closed: Vec<Position>,
    fees_paid: Quote,
    /// Net signed equity impact of funding (negative = paid out).
    funding_net: Quote,
    trade_log: Vec<Fill>,
    closed_trades: Vec<ClosedTrade>,
    equity_curve: Vec<EquityPoint>,
    last_marks: HashMap<Symbol, Price>,
}

impl Ledger {
    pub fn new(initial_equity: Quote) -> Self {
        Self {
            initial_equity,
            balance: initial_equity,
            positions: HashMap::new(),
            closed: Vec::new(),
            fees_paid: Quote::zero(),
            funding_net: Quote::zero(),
            trade_log: Vec::new(),
            closed_trades: Vec::new(),
            equity_curve: Vec::new(),
            last_marks: HashMap::new(),
        }
    }

    pub fn initial_equity(&self) -> Quote {
        self.initial_equity
    }

    /// Mark-to-market account equity at the latest known marks.
    pub fn equity(&self) -> Quote {
        self.balance.add(self.unrealized_total())
    }

    pub fn unrealized_total(&self) -> Quote {
        self.positions
            .values()
            .filter(|p| p.is_open())
            .map(|p| {
                let mark = self.last_marks.get(&p.symbol).copied().unwrap_or(p.entry_price);
                p.unrealized_pnl(mark)
            })
            .sum()
    }

    /// Fraction of equity currently committed as allocated risk across all
    /// open positions. Recomputed from scratch, never cached.
    pub fn open_risk_fraction(&self) -> Decimal {
        let equity = self.equity().value();
        if equity <= Decimal::ZERO {
            // non-positive equity blocks all further sizing
            return Decimal::ONE;
        }
        let open_risk: Quote = self
            .positions
            .values()
            .filter(|p| p.is_open())
            .map(|p| p.risk_allocated)
            .sum();
        open_risk.value() / equity
    }

    pub fn position(&self, symbol: &Symbol) -> Option<&Position> {
        self.positions.get(symbol).filter(|p| p.is_open())
    }

    pub fn open_positions(&self) -> impl Iterator<Item = &Position> {
        self.positions.values().filter(|p| p.is_open())
    }

    pub fn trade_log(&self) -> &[Fill] {
        &self.trade_log
    }

    pub fn closed_trades(&self) -> &[ClosedTrade] {
        &self.closed_trades
    }

    pub fn equity_curve(&self) -> &[EquityPoint] {
        &self.equity_curve
    }

    pub fn fees_paid(&self) -> Quote {
        self.fees_paid
    }

    pub fn funding_net(&self) -> Quote {
        self.funding_net
    }

    /// Realized P&L booked across every position, open and closed, gross
    /// of fees and funding.
    pub fn realized_total(&self) -> Quote {
        let open: Quote = self.positions.values().map(|p| p.realized_pnl).sum();
        let done: Quote = self.closed.iter().map(|p| p.realized_pnl).sum();
        open.add(done)
    }

    /// Apply an execution. `order` is the order the fill came from; its
    /// sizing carry decides margin and risk attribution for opening fills.
    pub fn apply_fill(
        &mut self,
        fill: &Fill,
        order: &Order,
        spec: &InstrumentSpec,
    ) -> Result<(), LedgerError> {
        self.balance = self.balance.sub(fill.fee);
        self.fees_paid = self.fees_paid.add(fill.fee);

        let reduces = order.reduce_only
            || self
                .positions
                .get(&fill.symbol)
                .map_or(false, |p| p.is_open() && p.side == fill.side.opposite());

        if reduces {
            let position = self
                .positions
                .get_mut(&fill.symbol)
                .filter(|p| p.is_open())
                .ok_or_else(|| LedgerError::NoPositionToReduce(fill.symbol.clone()))?;

            // forced closes always take the whole position
            debug_assert!(!fill.forced || fill.quantity == position.quantity);
            let realized = if fill.forced {
                position.liquidate(fill.price)?
            } else {
                position.reduce(fill.quantity, fill.price)?
            };
            self.balance = self.balance.add(realized);
            self.closed_trades.push(ClosedTrade {
                symbol: fill.symbol.clone(),
                quantity: fill.quantity,
                exit_price: fill.price,
                realized,
                timestamp: fill.timestamp,
                forced: fill.forced,
            });

            if !position.is_open() {
                if let Some(done) = self.positions.remove(&fill.symbol) {
                    self.closed.push(done);
                }
            }
        } else {
            // opening or adding: attribute the order's sizing carry
            // proportionally to the filled slice
            let fraction = fill.quantity / order.quantity;
            let margin = order.margin.mul(fraction);
            let risk = order.risk_amount.mul(fraction);

            match self.positions.get_mut(&fill.symbol).filter(|p| p.is_open()) {
                Some(position) => {
                    position.add(fill.quantity, fill.price, margin, risk)?;
                    Self::refresh_liquidation(position, spec);
                }
                None => {
                    self.positions.insert(
                        fill.symbol.clone(),
                        Position::open(
                            fill.symbol.clone(),
                            fill.side,
                            fill.quantity,
                            fill.price,
                            order.stop_price,
                            order.leverage,
                            margin,
                            order.liquidation_price,
                            risk,
                            fill.timestamp,
                        ),
                    );
                }
            }
        }

        self.last_marks.insert(fill.symbol.clone(), fill.price);
        self.trade_log.push(fill.clone());
        self.check_conservation()
    }

    /// Settle a funding payment against the open position on `symbol`.
    /// Positive rates mean longs pay shorts. The effect lands directly on
    /// equity; no fill is recorded. Returns the signed equity impact.
    pub fn apply_funding(&mut self, symbol: &Symbol, rate: Decimal, mark: Price) -> Quote {
        let Some(position) = self.positions.get(symbol).filter(|p| p.is_open()) else {
            return Quote::zero();
        };
        let notional = position.notional_at(mark);
        let effect = notional.mul(rate).mul(position.side.sign()).negate();

        self.balance = self.balance.add(effect);
        self.funding_net = self.funding_net.add(effect);
        effect
    }

    /// Update the mark for `symbol`. Unrealized P&L and the liquidation
    /// sweep both read from these marks.
    pub fn mark_to_market(&mut self, symbol: &Symbol, close: Price) {
        self.last_marks.insert(symbol.clone(), close);
    }

    /// Append the current equity to the curve. Called once per event after
    /// all processing for that event.
    pub fn sample_equity(&mut self, timestamp: Timestamp) {
        let equity = self.equity();
        self.equity_curve.push(EquityPoint { timestamp, equity });
    }

    // After an add, entry and margin changed, so the liquidation level moves.
    // Isolated margin: leverage is notional over held margin.
    fn refresh_liquidation(position: &mut Position, spec: &InstrumentSpec) {
        if position.margin.value() <= Decimal::ZERO {
            return;
        }
        let notional = position.entry_price.value() * position.quantity;
        let lev = (notional / position.margin.value()).max(Decimal::ONE);
        if let Some(lev) = Leverage::new(lev) {
            position.leverage = lev;
            position.liquidation_price = liquidation_price(
                position.entry_price,
                position.side,
                lev,
                spec.maintenance_margin_rate,
            );
        }
    }

    fn check_conservation(&self) -> Result<(), LedgerError> {
        let expected = self
            .initial_equity
            .add(self.realized_total())
            .sub(self.fees_paid)
            .add(self.funding_net);
        if expected != self.balance {
            return Err(LedgerError::ConservationViolation {
                expected,
                actual: self.balance,
            });
        }
        Ok(())
    }
}
