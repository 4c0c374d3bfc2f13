//! Position accounting.
//!
//! A position is side plus an unsigned quantity. Adds blend the entry price
//! by size weight; reduces book realized P&L and release margin and risk
//! proportionally. Quantity is strictly decreasing across closes and can
//! never go negative: an over-reduce is an internal defect, surfaced as an
//! error so the ledger can abort the replay.

use crate::types::{Leverage, Price, Quote, Side, Symbol, Timestamp};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PositionStatus {
    Open,
    PartiallyClosed,
    Closed,
    /// Force-closed at the liquidation price.
    Liquidated,
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum PositionError {
    #[error("reduce of {requested} exceeds open quantity {open} on {symbol}")]
    ReduceExceedsQuantity {
        symbol: Symbol,
        requested: Decimal,
        open: Decimal,
    },

    #[error("operation on non-open position {symbol} ({status:?})")]
    NotOpen {
        symbol: Symbol,
        status: PositionStatus,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub symbol: Symbol,
    pub side: Side,
    /// Unsigned base quantity. Positive while the position is open.
    pub quantity: Decimal,
    /// Size-weighted average entry price.
    pub entry_price: Price,
    pub stop_price: Option<Price>,
    pub leverage: Leverage,
    /// Isolated margin held against this position.
    pub margin: Quote,
    pub liquidation_price: Option<Price>,
    /// Still-outstanding risk originally allocated at sizing time.
    pub risk_allocated: Quote,
    pub opened_at: Timestamp,
    pub status: PositionStatus,
    /// Cumulative realized P&L booked by reduces, gross of fees.
    pub realized_pnl: Quote,
}

impl Position {
    #[allow(clippy::too_many_arguments)]
    pub fn open(
        symbol: Symbol,
        side: Side,
        quantity: Decimal,
        entry_price: Price,
        stop_price: Option<Price>,
        leverage: Leverage,
        margin: Quote,
        liquidation_price: Option<Price>,
        risk_allocated: Quote,
        opened_at: Timestamp,
    ) -> Self {
        Self {
            symbol,
            side,
            quantity,
            entry_price,
            stop_price,
            leverage,
            margin,
            liquidation_price,
            risk_allocated,
            opened_at,
            status: PositionStatus::Open,
            realized_pnl: Quote::zero(),
        }
    }

    pub fn is_open(&self) -> bool {
        matches!(
            self.status,
            PositionStatus::Open | PositionStatus::PartiallyClosed
        )
    }

    pub fn notional_at(&self, price: Price) -> Quote {
        Quote::new(self.quantity * price.value())
    }

    /// Mark-to-market P&L of the open quantity.
    pub fn unrealized_pnl(&self, mark: Price) -> Quote {
        let per_unit = (mark.value() - self.entry_price.value()) * self.side.sign();
        Quote::new(per_unit * self.quantity)
    }

    /// Add to the position at `price`, blending the average entry by size
    /// weight. The caller recomputes the liquidation price afterwards since
    /// it depends on the blended entry and combined leverage.
    pub fn add(
        &mut self,
        quantity: Decimal,
        price: Price,
        margin: Quote,
        risk_allocated: Quote,
    ) -> Result<(), PositionError> {
        if !self.is_open() {
            return Err(PositionError::NotOpen {
                symbol: self.symbol.clone(),
                status: self.status,
            });
        }
        let combined = self.quantity + quantity;
        let blended =
            (self.entry_price.value() * self.quantity + price.value() * quantity) / combined;
        self.entry_price = Price::new_unchecked(blended);
        self.quantity = combined;
        self.margin = self.margin.add(margin);
        self.risk_allocated = self.risk_allocated.add(risk_allocated);
        Ok(())
    }

    /// Close `quantity` base units at `price`. Books and returns the
    /// realized P&L of the closed slice; margin and allocated risk are
    /// released proportionally.
    pub fn reduce(&mut self, quantity: Decimal, price: Price) -> Result<Quote, PositionError> {
        if !self.is_open() {
            return Err(PositionError::NotOpen {
                symbol: self.symbol.clone(),
                status: self.status,
            });
        }
        if quantity > self.quantity {
            return Err(PositionError::ReduceExceedsQuantity {
                symbol: self.symbol.clone(),
                requested: quantity,
                open: self.quantity,
            });
        }

        let per_unit = (price.value() - self.entry_price.value()) * self.side.sign();
        let realized = Quote::new(per_unit * quantity);

        let fraction_closed = quantity / self.quantity;
        self.margin = self.margin.mul(Decimal::ONE - fraction_closed);
        self.risk_allocated = self.risk_allocated.mul(Decimal::ONE - fraction_closed);

        self.quantity -= quantity;
        self.realized_pnl = self.realized_pnl.add(realized);
        self.status = if self.quantity.is_zero() {
            PositionStatus::Closed
        } else {
            PositionStatus::PartiallyClosed
        };

        Ok(realized)
    }

    /// Force-close the whole position at its liquidation price.
    pub fn liquidate(&mut self, price: Price) -> Result<Quote, PositionError> {
        let realized = self.reduce(self.quantity, price)?;
        self.status = PositionStatus::Liquidated;
        Ok(realized)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn long_position(quantity: Decimal, entry: Decimal) -> Position {
        Position::open(
            Symbol::from("BTCUSDT"),
            Side::Long,
            quantity,
            Price::new_unchecked(entry),
            Some(Price::new_unchecked(entry - dec!(1000))),
            Leverage::one(),
            Quote::new(quantity * entry),
            None,
            Quote::new(quantity * dec!(1000)),
            Timestamp::from_millis(0),
        )
    }

    #[test]
    fn weighted_average_add() {
        let mut pos = long_position(dec!(1), dec!(50000));
        pos.add(
            dec!(1),
            Price::new_unchecked(dec!(52000)),
            Quote::new(dec!(52000)),
            Quote::new(dec!(1000)),
        )
        .unwrap();

        assert_eq!(pos.quantity, dec!(2));
        assert_eq!(pos.entry_price.value(), dec!(51000));
        assert_eq!(pos.risk_allocated.value(), dec!(2000));
    }

    #[test]
    fn reduce_books_long_pnl() {
        let mut pos = long_position(dec!(2), dec!(50000));
        let realized = pos.reduce(dec!(1), Price::new_unchecked(dec!(51000))).unwrap();

        assert_eq!(realized.value(), dec!(1000));
        assert_eq!(pos.quantity, dec!(1));
        assert_eq!(pos.status, PositionStatus::PartiallyClosed);
        // half the margin and risk released
        assert_eq!(pos.margin.value(), dec!(50000));
        assert_eq!(pos.risk_allocated.value(), dec!(1000));
    }

    #[test]
    fn reduce_books_short_pnl() {
        let mut pos = Position::open(
            Symbol::from("ETHUSDT"),
            Side::Short,
            dec!(10),
            Price::new_unchecked(dec!(3000)),
            None,
            Leverage::one(),
            Quote::new(dec!(30000)),
            None,
            Quote::new(dec!(300)),
            Timestamp::from_millis(0),
        );
        // price fell: short profits
        let realized = pos.reduce(dec!(10), Price::new_unchecked(dec!(2900))).unwrap();

        assert_eq!(realized.value(), dec!(1000));
        assert_eq!(pos.status, PositionStatus::Closed);
        assert_eq!(pos.quantity, dec!(0));
    }

    #[test]
    fn over_reduce_is_an_error() {
        let mut pos = long_position(dec!(1), dec!(50000));
        let result = pos.reduce(dec!(1.5), Price::new_unchecked(dec!(50000)));
        assert!(matches!(
            result,
            Err(PositionError::ReduceExceedsQuantity { .. })
        ));
        // untouched on failure
        assert_eq!(pos.quantity, dec!(1));
    }

    #[test]
    fn closed_position_rejects_further_ops() {
        let mut pos = long_position(dec!(1), dec!(50000));
        pos.reduce(dec!(1), Price::new_unchecked(dec!(50000))).unwrap();

        let result = pos.reduce(dec!(1), Price::new_unchecked(dec!(50000)));
        assert!(matches!(result, Err(PositionError::NotOpen { .. })));
    }

    #[test]
    fn liquidation_marks_status() {
        let mut pos = long_position(dec!(1), dec!(50000));
        let realized = pos.liquidate(Price::new_unchecked(dec!(45250))).unwrap();

        assert_eq!(realized.value(), dec!(-4750));
        assert_eq!(pos.status, PositionStatus::Liquidated);
        assert!(!pos.is_open());
    }

    #[test]
    fn unrealized_pnl_signs() {
        let pos = long_position(dec!(2), dec!(50000));
        assert_eq!(pos.unrealized_pnl(Price::new_unchecked(dec!(51000))).value(), dec!(2000));
        assert_eq!(pos.unrealized_pnl(Price::new_unchecked(dec!(49000))).value(), dec!(-2000));
    }
}
