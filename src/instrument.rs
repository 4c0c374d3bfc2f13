//! Instrument metadata.
//!
//! Static per-symbol facts the sizing and execution layers need: liquidity
//! class (which bounds leverage), maintenance margin rate, and the tick/step
//! grids quantities and prices must land on.

use crate::types::Symbol;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Leverage policy tier. Deep books tolerate more leverage than thin ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LiquidityClass {
    /// BTC, ETH class depth.
    Core,
    /// Liquid large caps.
    Major,
    /// Everything thinner.
    Alt,
}

/// Static instrument configuration (immutable after creation).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstrumentSpec {
    pub symbol: Symbol,
    pub class: LiquidityClass,
    /// Maintenance margin rate as a fraction (e.g. 0.005 = 0.5%).
    pub maintenance_margin_rate: Decimal,
    /// Minimum price increment.
    pub tick_size: Decimal,
    /// Minimum quantity increment. Sized quantities are floored to this grid.
    pub step_size: Decimal,
}

impl InstrumentSpec {
    /// Floor a raw quantity to the step grid.
    pub fn round_quantity(&self, quantity: Decimal) -> Decimal {
        if self.step_size <= Decimal::ZERO {
            return quantity;
        }
        (quantity / self.step_size).floor() * self.step_size
    }

    /// A BTC-style core instrument, used by the demo binary and tests.
    pub fn btc_perp() -> Self {
        Self {
            symbol: Symbol::from("BTCUSDT"),
            class: LiquidityClass::Core,
            maintenance_margin_rate: dec!(0.005),
            tick_size: dec!(0.1),
            step_size: dec!(0.001),
        }
    }

    /// An alt-style thin instrument.
    pub fn alt_perp(symbol: &str) -> Self {
        Self {
            symbol: Symbol::from(symbol),
            class: LiquidityClass::Alt,
            maintenance_margin_rate: dec!(0.01),
            tick_size: dec!(0.0001),
            step_size: dec!(1),
        }
    }
}

/// Symbol -> spec lookup. A missing entry is a data-integrity failure, not a
/// sizing rejection: the replay aborts.
#[derive(Debug, Clone, Default)]
pub struct InstrumentCatalog {
    specs: HashMap<Symbol, InstrumentSpec>,
}

impl InstrumentCatalog {
    pub fn new(specs: Vec<InstrumentSpec>) -> Self {
        Self {
            specs: specs.into_iter().map(|s| (s.symbol.clone(), s)).collect(),
        }
    }

    pub fn insert(&mut self, spec: InstrumentSpec) {
        self.specs.insert(spec.symbol.clone(), spec);
    }

    pub fn get(&self, symbol: &Symbol) -> Result<&InstrumentSpec, MissingInstrument> {
        self.specs
            .get(symbol)
            .ok_or_else(|| MissingInstrument(symbol.clone()))
    }

    pub fn contains(&self, symbol: &Symbol) -> bool {
        self.specs.contains_key(symbol)
    }

    pub fn len(&self) -> usize {
        self.specs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.specs.is_empty()
    }
}

#[derive(Debug, Clone, thiserror::Error)]
#[error("no instrument spec for {0}")]
pub struct MissingInstrument(pub Symbol);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quantity_floors_to_step() {
        let spec = InstrumentSpec::btc_perp();
        assert_eq!(spec.round_quantity(dec!(0.1239)), dec!(0.123));
        assert_eq!(spec.round_quantity(dec!(0.001)), dec!(0.001));
    }

    #[test]
    fn quantity_below_step_rounds_to_zero() {
        let spec = InstrumentSpec::btc_perp();
        assert_eq!(spec.round_quantity(dec!(0.0004)), dec!(0));
    }

    #[test]
    fn whole_unit_step() {
        let spec = InstrumentSpec::alt_perp("DOGEUSDT");
        assert_eq!(spec.round_quantity(dec!(1517.9)), dec!(1517));
    }

    #[test]
    fn catalog_lookup() {
        let catalog = InstrumentCatalog::new(vec![InstrumentSpec::btc_perp()]);

        assert!(catalog.get(&Symbol::from("BTCUSDT")).is_ok());
        let missing = catalog.get(&Symbol::from("ETHUSDT"));
        assert!(matches!(missing, Err(MissingInstrument(_))));
    }
}
