//! Slippage models for taker fills.
//!
//! A closed set of tagged variants rather than a trait object: replays must
//! stay serializable and byte-for-byte deterministic, so every model is a
//! value and the only randomness is an explicitly seeded RNG.

use crate::types::{Bps, Price, Side};
use rand::rngs::StdRng;
use rand::Rng;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SlippageModel {
    /// Fills exactly at the trigger price.
    None,
    /// Flat adverse offset in basis points.
    FixedBps(Bps),
    /// Offset grows with order notional relative to bar volume:
    /// `coefficient * (order_notional / bar_notional)`, capped.
    VolumeImpact { coefficient: Decimal, cap_bps: Bps },
    /// Base offset plus a uniform draw in `[0, jitter_bps]` from a seeded
    /// RNG. Identical seeds replay identically.
    Seeded {
        base_bps: Bps,
        jitter_bps: Bps,
        seed: u64,
    },
}

impl SlippageModel {
    /// Seed for the simulator's RNG. Models without randomness still get a
    /// fixed seed so replay state is identical regardless of model.
    pub fn seed(&self) -> u64 {
        match self {
            SlippageModel::Seeded { seed, .. } => *seed,
            _ => 0,
        }
    }

    /// Adverse offset as a non-negative fraction of price.
    pub fn offset_fraction(
        &self,
        order_notional: Decimal,
        bar_notional: Decimal,
        rng: &mut StdRng,
    ) -> Decimal {
        match self {
            SlippageModel::None => Decimal::ZERO,
            SlippageModel::FixedBps(bps) => bps.as_fraction(),
            SlippageModel::VolumeImpact {
                coefficient,
                cap_bps,
            } => {
                let cap = cap_bps.as_fraction();
                if bar_notional <= Decimal::ZERO {
                    return cap;
                }
                (coefficient * (order_notional / bar_notional)).min(cap)
            }
            SlippageModel::Seeded {
                base_bps,
                jitter_bps,
                ..
            } => {
                let jitter = if jitter_bps.value() > 0 {
                    Bps::new(rng.gen_range(0..=jitter_bps.value())).as_fraction()
                } else {
                    Decimal::ZERO
                };
                base_bps.as_fraction() + jitter
            }
        }
    }

    /// Slipped fill price for a taker execution. Longs pay up, shorts
    /// receive less. Returns the fill price and the signed offset applied.
    pub fn fill_price(
        &self,
        trigger: Price,
        side: Side,
        order_notional: Decimal,
        bar_notional: Decimal,
        rng: &mut StdRng,
    ) -> (Price, Decimal) {
        let fraction = self.offset_fraction(order_notional, bar_notional, rng);
        let offset = trigger.value() * fraction * side.sign();
        let slipped = trigger.value() + offset;
        // adverse offsets cannot push a price to zero for any sane bps input
        (Price::new(slipped).unwrap_or(trigger), offset)
    }
}

impl Default for SlippageModel {
    fn default() -> Self {
        Self::None
    }
}
