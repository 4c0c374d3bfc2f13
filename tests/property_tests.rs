//! Property-based tests for the sizing and liquidation math.

use backtest_core::*;
use proptest::prelude::*;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

fn long_intent(entry: Decimal, stop: Decimal, size: SizeMode, atr: Decimal) -> OrderIntent {
    OrderIntent {
        symbol: Symbol::from("BTCUSDT"),
        side: Side::Long,
        kind: OrderKind::Market,
        entry_price: Price::new_unchecked(entry),
        stop_price: Price::new_unchecked(stop),
        target_price: None,
        size,
        time_in_force: TimeInForce::GoodTillCancel,
        atr,
    }
}

proptest! {
    /// An accepted result never risks more than the per-trade ceiling, no
    /// matter how the stop and equity combine.
    #[test]
    fn accepted_risk_respects_per_trade_cap(
        entry in 1_000i64..100_000,
        stop_bps in 10i64..2_000,
        frac_bps in 1i64..100,
        equity in 1_000i64..1_000_000,
    ) {
        let params = RiskParams::default();
        let entry = Decimal::from(entry);
        let stop = entry * (Decimal::ONE - Decimal::new(stop_bps, 4));
        let fraction = Decimal::new(frac_bps, 4);
        let intent = long_intent(entry, stop, SizeMode::RiskFraction(fraction), entry * dec!(0.01));

        let result = size_position(
            &intent,
            Quote::new(Decimal::from(equity)),
            dec!(0),
            &InstrumentSpec::btc_perp(),
            &params,
        );

        if result.accepted() {
            prop_assert!(
                result.risk_amount.value() <= Decimal::from(equity) * params.max_risk_per_trade
            );
        }
    }

    /// Accepted results keep total open risk under the portfolio ceiling.
    #[test]
    fn accepted_risk_respects_portfolio_cap(
        entry in 1_000i64..100_000,
        stop_bps in 10i64..2_000,
        frac_bps in 1i64..100,
        open_risk_bps in 0i64..400,
        equity in 1_000i64..1_000_000,
    ) {
        let params = RiskParams::default();
        let entry = Decimal::from(entry);
        let stop = entry * (Decimal::ONE - Decimal::new(stop_bps, 4));
        let fraction = Decimal::new(frac_bps, 4);
        let open_risk = Decimal::new(open_risk_bps, 4);
        let intent = long_intent(entry, stop, SizeMode::RiskFraction(fraction), entry * dec!(0.01));

        let result = size_position(
            &intent,
            Quote::new(Decimal::from(equity)),
            open_risk,
            &InstrumentSpec::btc_perp(),
            &params,
        );

        if result.accepted() {
            prop_assert!(open_risk + fraction <= params.max_portfolio_risk);
        }
    }

    /// Step-grid flooring only ever shrinks the risk actually carried.
    #[test]
    fn flooring_never_raises_carried_risk(
        entry in 1_000i64..100_000,
        stop_bps in 10i64..2_000,
        frac_bps in 1i64..100,
        equity in 1_000i64..1_000_000,
    ) {
        let entry = Decimal::from(entry);
        let stop = entry * (Decimal::ONE - Decimal::new(stop_bps, 4));
        let fraction = Decimal::new(frac_bps, 4);
        let equity = Decimal::from(equity);
        let intent = long_intent(entry, stop, SizeMode::RiskFraction(fraction), entry * dec!(0.01));

        let result = size_position(
            &intent,
            Quote::new(equity),
            dec!(0),
            &InstrumentSpec::btc_perp(),
            &RiskParams::default(),
        );

        if result.accepted() {
            let requested = equity * fraction;
            prop_assert!(result.risk_amount.value() <= requested);
            prop_assert!(result.quantity > Decimal::ZERO);
        }
    }

    /// Liquidation sits below entry for longs and above for shorts across
    /// the whole realistic leverage range.
    #[test]
    fn liquidation_on_the_losing_side(
        entry in 100i64..100_000,
        lev_tenths in 11i64..250,
    ) {
        let entry_price = Price::new_unchecked(Decimal::from(entry));
        let leverage = Leverage::new(Decimal::new(lev_tenths, 1)).unwrap();
        let mmr = dec!(0.005);

        let long_liq = liquidation_price(entry_price, Side::Long, leverage, mmr).unwrap();
        let short_liq = liquidation_price(entry_price, Side::Short, leverage, mmr).unwrap();

        prop_assert!(long_liq.value() < entry_price.value());
        prop_assert!(short_liq.value() > entry_price.value());
    }

    /// More leverage always brings liquidation closer to entry.
    #[test]
    fn higher_leverage_tightens_the_buffer(
        entry in 100i64..100_000,
        lev_tenths in 11i64..200,
        extra_tenths in 1i64..100,
    ) {
        let entry_price = Price::new_unchecked(Decimal::from(entry));
        let lower = Leverage::new(Decimal::new(lev_tenths, 1)).unwrap();
        let higher = Leverage::new(Decimal::new(lev_tenths + extra_tenths, 1)).unwrap();
        let mmr = dec!(0.005);

        for side in [Side::Long, Side::Short] {
            let near = liquidation_price(entry_price, side, higher, mmr).unwrap();
            let far = liquidation_price(entry_price, side, lower, mmr).unwrap();
            let near_dist = (entry_price.value() - near.value()).abs();
            let far_dist = (entry_price.value() - far.value()).abs();
            prop_assert!(near_dist < far_dist);
        }
    }

    /// Under the Both policy an accepted result clears both buffer
    /// thresholds.
    #[test]
    fn accepted_buffers_clear_both_thresholds(
        entry in 1_000i64..100_000,
        stop_bps in 10i64..2_000,
        atr_bps in 10i64..1_000,
        equity in 1_000i64..1_000_000,
    ) {
        let params = RiskParams::default();
        let entry = Decimal::from(entry);
        let stop = entry * (Decimal::ONE - Decimal::new(stop_bps, 4));
        let atr = entry * Decimal::new(atr_bps, 4);
        let intent = long_intent(entry, stop, SizeMode::RiskFraction(dec!(0.01)), atr);

        let result = size_position(
            &intent,
            Quote::new(Decimal::from(equity)),
            dec!(0),
            &InstrumentSpec::btc_perp(),
            &params,
        );

        if result.accepted() {
            let buffer_atr = result.buffer_atr.unwrap();
            let buffer_pct = result.buffer_pct.unwrap();
            prop_assert!(buffer_atr >= params.liquidation_buffer_atr_mult);
            prop_assert!(buffer_pct >= params.liquidation_buffer_pct);
        }
    }

    /// The seeded slippage model is a pure function of its seed and the
    /// draw sequence.
    #[test]
    fn seeded_slippage_replays_identically(seed in any::<u64>()) {
        use rand::rngs::StdRng;
        use rand::SeedableRng;

        let model = SlippageModel::Seeded {
            base_bps: Bps::new(2),
            jitter_bps: Bps::new(8),
            seed,
        };
        let mut a = StdRng::seed_from_u64(model.seed());
        let mut b = StdRng::seed_from_u64(model.seed());
        for _ in 0..16 {
            prop_assert_eq!(
                model.offset_fraction(dec!(0), dec!(0), &mut a),
                model.offset_fraction(dec!(0), dec!(0), &mut b)
            );
        }
    }
}
