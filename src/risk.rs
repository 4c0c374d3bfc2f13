//! Risk engine: liquidation-aware position sizing.
//!
//! Pure functions from (intent, account state, instrument, parameters) to a
//! sizing verdict. A rejected intent is a normal outcome carried as data,
//! never an error: callers branch on `SizingResult::accepted()`.

use crate::instrument::{InstrumentSpec, LiquidityClass};
use crate::order::{OrderKind, TimeInForce};
use crate::types::{Leverage, Price, Quote, Side, Symbol};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Maximum effective leverage per liquidity class.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LeverageCaps {
    pub core: Decimal,
    pub major: Decimal,
    pub alt: Decimal,
}

impl LeverageCaps {
    pub fn cap_for(&self, class: LiquidityClass) -> Decimal {
        match class {
            LiquidityClass::Core => self.core,
            LiquidityClass::Major => self.major,
            LiquidityClass::Alt => self.alt,
        }
    }
}

impl Default for LeverageCaps {
    fn default() -> Self {
        Self {
            core: dec!(15),
            major: dec!(6),
            alt: dec!(3),
        }
    }
}

/// How the two liquidation-buffer checks combine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BufferPolicy {
    /// Both the ATR-multiple check and the flat-percent check must pass.
    Both,
    /// Passing either check is enough.
    Either,
}

/// Sizing parameters. Defaults match a conservative intraday book:
/// 1% per trade, 3% portfolio ceiling, liquidation at least 3 ATR and 5%
/// away from entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskParams {
    /// Largest equity fraction a single trade may risk.
    pub max_risk_per_trade: Decimal,
    /// Ceiling on summed open risk across all positions.
    pub max_portfolio_risk: Decimal,
    /// Liquidation price must sit at least this many ATRs from entry.
    pub liquidation_buffer_atr_mult: Decimal,
    /// Liquidation price must sit at least this fraction of entry away.
    pub liquidation_buffer_pct: Decimal,
    pub buffer_policy: BufferPolicy,
    pub leverage_caps: LeverageCaps,
}

impl Default for RiskParams {
    fn default() -> Self {
        Self {
            max_risk_per_trade: dec!(0.01),
            max_portfolio_risk: dec!(0.03),
            liquidation_buffer_atr_mult: dec!(3.0),
            liquidation_buffer_pct: dec!(0.05),
            buffer_policy: BufferPolicy::Both,
            leverage_caps: LeverageCaps::default(),
        }
    }
}

/// How the strategy expresses desired size.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum SizeMode {
    /// Risk this fraction of current equity between entry and stop.
    RiskFraction(Decimal),
    /// Target this notional in quote currency.
    Notional(Decimal),
}

/// A strategy's request to open or add to a position. The strategy layer
/// owns indicators, so the prevailing ATR rides along with the intent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderIntent {
    pub symbol: Symbol,
    pub side: Side,
    pub kind: OrderKind,
    pub entry_price: Price,
    pub stop_price: Price,
    pub target_price: Option<Price>,
    pub size: SizeMode,
    pub time_in_force: TimeInForce,
    /// Average true range at intent time, in price units.
    pub atr: Decimal,
}

/// Why an intent was not sized. Values, not errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RejectionReason {
    RiskPerTradeExceeded,
    PortfolioRiskExceeded,
    LiquidationBufferInsufficient,
    LeverageTierCapped,
    InvalidStopDistance,
    QuantityRoundsToZero,
}

impl fmt::Display for RejectionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RejectionReason::RiskPerTradeExceeded => "risk per trade exceeded",
            RejectionReason::PortfolioRiskExceeded => "portfolio risk exceeded",
            RejectionReason::LiquidationBufferInsufficient => "liquidation buffer insufficient",
            RejectionReason::LeverageTierCapped => "leverage tier capped",
            RejectionReason::InvalidStopDistance => "invalid stop distance",
            RejectionReason::QuantityRoundsToZero => "quantity rounds to zero",
        };
        write!(f, "{s}")
    }
}

/// Immutable sizing verdict.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SizingResult {
    pub symbol: Symbol,
    pub side: Side,
    pub quantity: Decimal,
    pub notional: Quote,
    pub leverage: Leverage,
    pub margin_required: Quote,
    pub risk_amount: Quote,
    pub liquidation_price: Option<Price>,
    /// Distance from entry to liquidation, in ATRs.
    pub buffer_atr: Option<Decimal>,
    /// Distance from entry to liquidation, as a fraction of entry.
    pub buffer_pct: Option<Decimal>,
    pub rejection: Option<RejectionReason>,
}

impl SizingResult {
    pub fn accepted(&self) -> bool {
        self.rejection.is_none()
    }

    fn rejected(intent: &OrderIntent, reason: RejectionReason) -> Self {
        Self {
            symbol: intent.symbol.clone(),
            side: intent.side,
            quantity: Decimal::ZERO,
            notional: Quote::zero(),
            leverage: Leverage::one(),
            margin_required: Quote::zero(),
            risk_amount: Quote::zero(),
            liquidation_price: None,
            buffer_atr: None,
            buffer_pct: None,
            rejection: Some(reason),
        }
    }
}

/// Isolated-margin liquidation price.
///
/// Long:  entry * (1 - 1/L + mmr)
/// Short: entry * (1 + 1/L - mmr)
///
/// Returns `None` when the formula degenerates to a non-positive price,
/// which only happens at leverage so low the position cannot be liquidated
/// by price movement alone.
pub fn liquidation_price(
    entry: Price,
    side: Side,
    leverage: Leverage,
    maintenance_margin_rate: Decimal,
) -> Option<Price> {
    let inv = Decimal::ONE / leverage.value();
    let factor = match side {
        Side::Long => Decimal::ONE - inv + maintenance_margin_rate,
        Side::Short => Decimal::ONE + inv - maintenance_margin_rate,
    };
    Price::new(entry.value() * factor)
}

/// Size an intent against current account state.
///
/// Steps, in order; the first failing check decides the rejection reason:
/// stop geometry, per-trade risk ceiling, portfolio ceiling, step-grid
/// flooring, leverage tier cap, liquidation buffer.
pub fn size_position(
    intent: &OrderIntent,
    equity: Quote,
    open_risk_fraction: Decimal,
    spec: &InstrumentSpec,
    params: &RiskParams,
) -> SizingResult {
    let entry = intent.entry_price.value();
    let stop = intent.stop_price.value();

    // Stop must sit on the losing side of entry.
    let stop_ok = match intent.side {
        Side::Long => stop < entry,
        Side::Short => stop > entry,
    };
    if !stop_ok {
        return SizingResult::rejected(intent, RejectionReason::InvalidStopDistance);
    }
    let stop_distance = (entry - stop).abs();

    // Resolve the requested size into (risk fraction, raw quantity).
    let (risk_fraction, raw_quantity) = match intent.size {
        SizeMode::RiskFraction(fraction) => {
            let risk_amount = equity.value() * fraction;
            (fraction, risk_amount / stop_distance)
        }
        SizeMode::Notional(notional) => {
            let quantity = notional / entry;
            let risk_amount = quantity * stop_distance;
            let fraction = if equity.value() > Decimal::ZERO {
                risk_amount / equity.value()
            } else {
                Decimal::MAX
            };
            (fraction, quantity)
        }
    };

    if risk_fraction > params.max_risk_per_trade {
        return SizingResult::rejected(intent, RejectionReason::RiskPerTradeExceeded);
    }
    if open_risk_fraction + risk_fraction > params.max_portfolio_risk {
        return SizingResult::rejected(intent, RejectionReason::PortfolioRiskExceeded);
    }

    let quantity = spec.round_quantity(raw_quantity.max(Decimal::ZERO));
    if quantity <= Decimal::ZERO {
        return SizingResult::rejected(intent, RejectionReason::QuantityRoundsToZero);
    }
    // Risk actually carried after flooring, never more than requested.
    let risk_amount = Quote::new(quantity * stop_distance);

    let notional = quantity * entry;
    let cap = params.leverage_caps.cap_for(spec.class);
    let required = if equity.value() > Decimal::ZERO {
        notional / equity.value()
    } else {
        Decimal::MAX
    };
    if required > cap {
        return SizingResult::rejected(intent, RejectionReason::LeverageTierCapped);
    }
    // Exchange leverage floors at 1x even when the position is smaller
    // than equity.
    let leverage = Leverage::new(required.max(Decimal::ONE)).unwrap_or_else(Leverage::one);
    let margin_required = Quote::new(notional / leverage.value());

    let liq = liquidation_price(
        intent.entry_price,
        intent.side,
        leverage,
        spec.maintenance_margin_rate,
    );
    let Some(liq) = liq else {
        return SizingResult::rejected(intent, RejectionReason::LiquidationBufferInsufficient);
    };

    let liq_distance = (entry - liq.value()).abs();
    let buffer_atr = if intent.atr > Decimal::ZERO {
        Some(liq_distance / intent.atr)
    } else {
        None
    };
    let buffer_pct = liq_distance / entry;

    let atr_ok = buffer_atr.map_or(false, |b| b >= params.liquidation_buffer_atr_mult);
    let pct_ok = buffer_pct >= params.liquidation_buffer_pct;
    let buffer_ok = match params.buffer_policy {
        BufferPolicy::Both => atr_ok && pct_ok,
        BufferPolicy::Either => atr_ok || pct_ok,
    };
    if !buffer_ok {
        return SizingResult::rejected(intent, RejectionReason::LiquidationBufferInsufficient);
    }

    SizingResult {
        symbol: intent.symbol.clone(),
        side: intent.side,
        quantity,
        notional: Quote::new(notional),
        leverage,
        margin_required,
        risk_amount,
        liquidation_price: Some(liq),
        buffer_atr,
        buffer_pct: Some(buffer_pct),
        rejection: None,
    }
}
