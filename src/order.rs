//! Order lifecycle and fill records.
//!
//! Orders move PENDING -> {FILLED, PARTIALLY_FILLED -> FILLED, REJECTED,
//! EXPIRED}. Fills are immutable facts appended to the trade log; they carry
//! everything the ledger needs to reconcile equity later.

use crate::types::{Leverage, OrderId, Price, Quote, Side, Symbol, Timestamp};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderKind {
    /// Fill at next bar open, pays taker fee and slippage.
    Market,
    /// Fill at the limit price when the bar range crosses it. Maker fee,
    /// no slippage.
    Limit(Price),
    /// Trigger when the bar range crosses the stop, fill at stop plus
    /// slippage. Taker fee.
    Stop(Price),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TimeInForce {
    /// Remains working until filled or canceled.
    GoodTillCancel,
    /// Whatever cannot fill this bar expires.
    ImmediateOrCancel,
}

impl Default for TimeInForce {
    fn default() -> Self {
        Self::GoodTillCancel
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderStatus {
    Pending,
    PartiallyFilled,
    Filled,
    Rejected,
    Expired,
}

impl OrderStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            OrderStatus::Filled | OrderStatus::Rejected | OrderStatus::Expired
        )
    }
}

/// A working order inside the simulator. Entry orders carry the sizing
/// verdict they were admitted under so the ledger can open the position
/// with the right margin, stop, and liquidation level.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub symbol: Symbol,
    pub side: Side,
    pub kind: OrderKind,
    pub quantity: Decimal,
    pub remaining: Decimal,
    pub time_in_force: TimeInForce,
    pub status: OrderStatus,
    /// True for closing orders: fills reduce the existing position and may
    /// never flip it.
    pub reduce_only: bool,
    pub created_at: Timestamp,
    // carried from the accepted sizing verdict; zeroed on reduce-only orders
    pub leverage: Leverage,
    pub margin: Quote,
    pub risk_amount: Quote,
    pub stop_price: Option<Price>,
    pub liquidation_price: Option<Price>,
}

impl Order {
    /// An opening order admitted by the risk engine.
    #[allow(clippy::too_many_arguments)]
    pub fn entry(
        id: OrderId,
        symbol: Symbol,
        side: Side,
        kind: OrderKind,
        quantity: Decimal,
        time_in_force: TimeInForce,
        created_at: Timestamp,
        leverage: Leverage,
        margin: Quote,
        risk_amount: Quote,
        stop_price: Price,
        liquidation_price: Option<Price>,
    ) -> Self {
        Self {
            id,
            symbol,
            side,
            kind,
            quantity,
            remaining: quantity,
            time_in_force,
            status: OrderStatus::Pending,
            reduce_only: false,
            created_at,
            leverage,
            margin,
            risk_amount,
            stop_price: Some(stop_price),
            liquidation_price,
        }
    }

    /// A closing order (protective stop, profit target, strategy exit).
    pub fn reduce(
        id: OrderId,
        symbol: Symbol,
        side: Side,
        kind: OrderKind,
        quantity: Decimal,
        time_in_force: TimeInForce,
        created_at: Timestamp,
    ) -> Self {
        Self {
            id,
            symbol,
            side,
            kind,
            quantity,
            remaining: quantity,
            time_in_force,
            status: OrderStatus::Pending,
            reduce_only: true,
            created_at,
            leverage: Leverage::one(),
            margin: Quote::zero(),
            risk_amount: Quote::zero(),
            stop_price: None,
            liquidation_price: None,
        }
    }

    /// Record a fill of `quantity` base units against this order.
    pub fn apply_fill(&mut self, quantity: Decimal) {
        debug_assert!(quantity > Decimal::ZERO);
        debug_assert!(quantity <= self.remaining, "fill exceeds remaining");
        self.remaining -= quantity;
        self.status = if self.remaining.is_zero() {
            OrderStatus::Filled
        } else {
            OrderStatus::PartiallyFilled
        };
    }

    pub fn expire(&mut self) {
        debug_assert!(!self.status.is_terminal());
        self.status = OrderStatus::Expired;
    }

    pub fn is_working(&self) -> bool {
        !self.status.is_terminal()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FillType {
    Full,
    Partial,
}

/// An execution. Immutable once produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fill {
    pub order_id: OrderId,
    pub symbol: Symbol,
    pub side: Side,
    pub price: Price,
    pub quantity: Decimal,
    /// Fee paid, always non-negative.
    pub fee: Quote,
    /// Signed price offset applied relative to the trigger price.
    pub slippage: Decimal,
    pub timestamp: Timestamp,
    pub fill_type: FillType,
    /// True when the position was force-closed at its liquidation price.
    pub forced: bool,
}

impl Fill {
    pub fn notional(&self) -> Quote {
        Quote::new(self.price.value() * self.quantity)
    }
}
