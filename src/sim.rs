//! Execution simulator.
//!
//! Replays one bar at a time against the working order set. Processing order
//! within an event is fixed: funding first, then the liquidation sweep, then
//! order triggering oldest-first, with the liquidation check re-run after
//! every fill. Identical inputs and seed produce identical fills.

use crate::feed::MarketEvent;
use crate::instrument::InstrumentSpec;
use crate::ledger::{Ledger, LedgerError};
use crate::order::{Fill, FillType, Order, OrderKind, TimeInForce};
use crate::risk::{OrderIntent, SizingResult};
use crate::slippage::SlippageModel;
use crate::types::{OrderId, Price, Quote, Side, Symbol, Timestamp};
use rand::rngs::StdRng;
use rand::SeedableRng;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

/// Execution parameters. Fees are fractions of fill notional.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecConfig {
    pub maker_fee: Decimal,
    pub taker_fee: Decimal,
    /// At most this fraction of a bar's volume may fill per order per bar.
    pub max_fill_ratio_per_bar: Decimal,
    pub slippage: SlippageModel,
}

impl Default for ExecConfig {
    fn default() -> Self {
        Self {
            maker_fee: dec!(0.0002),
            taker_fee: dec!(0.0004),
            max_fill_ratio_per_bar: dec!(0.1),
            slippage: SlippageModel::None,
        }
    }
}

pub struct ExecutionSim {
    config: ExecConfig,
    orders: Vec<Order>,
    next_order_id: u64,
    rng: StdRng,
}

impl ExecutionSim {
    pub fn new(config: ExecConfig) -> Self {
        let rng = StdRng::seed_from_u64(config.slippage.seed());
        Self {
            config,
            orders: Vec::new(),
            next_order_id: 1,
            rng,
        }
    }

    pub fn config(&self) -> &ExecConfig {
        &self.config
    }

    pub fn working_orders(&self) -> impl Iterator<Item = &Order> {
        self.orders.iter().filter(|o| o.is_working())
    }

    pub fn has_working_order(&self, id: OrderId) -> bool {
        self.orders.iter().any(|o| o.id == id && o.is_working())
    }

    /// Risk budget still reserved by working entry orders, pro-rated to the
    /// unfilled remainder. An accepted intent holds its risk from admission
    /// until the order fills into a position or dies; without this the
    /// portfolio ceiling would be blind to everything submitted but not yet
    /// filled.
    pub fn pending_entry_risk(&self) -> Quote {
        self.orders
            .iter()
            .filter(|o| o.is_working() && !o.reduce_only && !o.quantity.is_zero())
            .map(|o| o.risk_amount.mul(o.remaining / o.quantity))
            .sum()
    }

    fn allocate_id(&mut self) -> OrderId {
        let id = OrderId(self.next_order_id);
        self.next_order_id += 1;
        id
    }

    /// Submit an opening order admitted by the risk engine. Fills are
    /// attempted from the next processed event onward.
    pub fn submit_entry(
        &mut self,
        intent: &OrderIntent,
        sizing: &SizingResult,
        timestamp: Timestamp,
    ) -> OrderId {
        debug_assert!(sizing.accepted());
        let id = self.allocate_id();
        self.orders.push(Order::entry(
            id,
            sizing.symbol.clone(),
            sizing.side,
            intent.kind,
            sizing.quantity,
            intent.time_in_force,
            timestamp,
            sizing.leverage,
            sizing.margin_required,
            sizing.risk_amount,
            intent.stop_price,
            sizing.liquidation_price,
        ));
        id
    }

    /// Submit a closing order (protective stop, profit target).
    pub fn submit_reduce(
        &mut self,
        symbol: Symbol,
        side: Side,
        kind: OrderKind,
        quantity: Decimal,
        time_in_force: TimeInForce,
        timestamp: Timestamp,
    ) -> OrderId {
        let id = self.allocate_id();
        self.orders
            .push(Order::reduce(id, symbol, side, kind, quantity, time_in_force, timestamp));
        id
    }

    /// Process one bar. Returns the fills produced, in execution order.
    pub fn process_event(
        &mut self,
        event: &MarketEvent,
        ledger: &mut Ledger,
        spec: &InstrumentSpec,
    ) -> Result<Vec<Fill>, LedgerError> {
        let mut fills = Vec::new();

        // 1. funding settles before anything trades
        if let Some(rate) = event.funding_rate {
            let effect = ledger.apply_funding(&event.symbol, rate, event.open);
            if !effect.value().is_zero() {
                tracing::debug!(symbol = %event.symbol, %rate, effect = %effect, "funding settled");
            }
        }

        // 2. liquidation outranks every resting order
        self.sweep_liquidation(event, ledger, spec, &mut fills)?;

        // 3. trigger orders oldest-first
        for i in 0..self.orders.len() {
            if !self.orders[i].is_working() || self.orders[i].symbol != event.symbol {
                continue;
            }

            // protection left behind by a closed position is dead
            if self.orders[i].reduce_only && ledger.position(&event.symbol).is_none() {
                self.orders[i].expire();
                continue;
            }

            if let Some(planned) = self.plan_fill(i, event, ledger) {
                self.orders[i].apply_fill(planned.quantity);
                let fill = Fill {
                    order_id: self.orders[i].id,
                    symbol: event.symbol.clone(),
                    side: self.orders[i].side,
                    price: planned.price,
                    quantity: planned.quantity,
                    fee: planned.fee,
                    slippage: planned.slippage,
                    timestamp: event.timestamp,
                    fill_type: planned.fill_type,
                    forced: false,
                };
                let order = self.orders[i].clone();
                ledger.apply_fill(&fill, &order, spec)?;
                tracing::debug!(
                    order_id = fill.order_id.0,
                    symbol = %fill.symbol,
                    side = %fill.side,
                    price = %fill.price,
                    quantity = %fill.quantity,
                    "order filled"
                );
                fills.push(fill);

                // 4. a fill can push the position through its liquidation
                // level within the same bar
                self.sweep_liquidation(event, ledger, spec, &mut fills)?;
            }

            if self.orders[i].is_working()
                && self.orders[i].time_in_force == TimeInForce::ImmediateOrCancel
            {
                self.orders[i].expire();
            }
        }

        self.orders.retain(|o| o.is_working());

        ledger.mark_to_market(&event.symbol, event.close);
        Ok(fills)
    }

    // Decide whether order `i` fills on this bar and at what terms. Pure
    // apart from RNG draws for the seeded slippage model.
    fn plan_fill(&mut self, i: usize, event: &MarketEvent, ledger: &Ledger) -> Option<PlannedFill> {
        let order = &self.orders[i];

        let (trigger, maker, slips) = match order.kind {
            OrderKind::Market => (event.open, false, true),
            OrderKind::Limit(limit) => {
                let crossed = match order.side {
                    Side::Long => event.low <= limit,
                    Side::Short => event.high >= limit,
                };
                if !crossed {
                    return None;
                }
                (limit, true, false)
            }
            OrderKind::Stop(stop) => {
                let triggered = match order.side {
                    Side::Long => event.high >= stop,
                    Side::Short => event.low <= stop,
                };
                if !triggered {
                    return None;
                }
                (stop, false, true)
            }
        };

        let liquidity_cap = self.config.max_fill_ratio_per_bar * event.volume;
        if liquidity_cap <= Decimal::ZERO {
            return None;
        }
        let mut quantity = order.remaining.min(liquidity_cap);
        if order.reduce_only {
            let open = ledger.position(&order.symbol)?.quantity;
            quantity = quantity.min(open);
        }
        if quantity <= Decimal::ZERO {
            return None;
        }

        let (price, slippage) = if slips {
            let order_notional = trigger.value() * quantity;
            let bar_notional = event.volume * trigger.value();
            self.config
                .slippage
                .fill_price(trigger, order.side, order_notional, bar_notional, &mut self.rng)
        } else {
            (trigger, Decimal::ZERO)
        };

        let fee_rate = if maker {
            self.config.maker_fee
        } else {
            self.config.taker_fee
        };
        let fee = Quote::new(price.value() * quantity * fee_rate);

        let fill_type = if quantity == order.remaining {
            FillType::Full
        } else {
            FillType::Partial
        };

        Some(PlannedFill {
            price,
            quantity,
            fee,
            slippage,
            fill_type,
        })
    }

    // Force-close the open position if this bar's range reaches its
    // liquidation price (gaps included). Fills at the liquidation price
    // exactly, taker fee, marked forced.
    fn sweep_liquidation(
        &mut self,
        event: &MarketEvent,
        ledger: &mut Ledger,
        spec: &InstrumentSpec,
        fills: &mut Vec<Fill>,
    ) -> Result<(), LedgerError> {
        let Some(position) = ledger.position(&event.symbol) else {
            return Ok(());
        };
        let Some(liq) = position.liquidation_price else {
            return Ok(());
        };
        let crossed = match position.side {
            Side::Long => event.low <= liq,
            Side::Short => event.high >= liq,
        };
        if !crossed {
            return Ok(());
        }

        let quantity = position.quantity;
        let side = position.side.opposite();
        let id = self.allocate_id();
        let order = Order::reduce(
            id,
            event.symbol.clone(),
            side,
            OrderKind::Market,
            quantity,
            TimeInForce::ImmediateOrCancel,
            event.timestamp,
        );
        let fill = Fill {
            order_id: id,
            symbol: event.symbol.clone(),
            side,
            price: liq,
            quantity,
            fee: Quote::new(liq.value() * quantity * self.config.taker_fee),
            slippage: Decimal::ZERO,
            timestamp: event.timestamp,
            fill_type: FillType::Full,
            forced: true,
        };
        ledger.apply_fill(&fill, &order, spec)?;
        tracing::debug!(
            symbol = %event.symbol,
            price = %liq,
            quantity = %quantity,
            "position liquidated"
        );
        fills.push(fill);
        Ok(())
    }
}

struct PlannedFill {
    price: Price,
    quantity: Decimal,
    fee: Quote,
    slippage: Decimal,
    fill_type: FillType,
}
