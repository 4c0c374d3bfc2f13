//! Backtest Engine Walkthrough.
//!
//! Demonstrates the full replay lifecycle: liquidation-aware sizing,
//! simulated execution with funding and forced closes, kill switches, and
//! parallel parameter sweeps over synthetic bar data.

use backtest_core::*;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    println!("Risk-Constrained Backtest Engine");
    println!("Isolated Margin, Liquidation-Aware Sizing, Deterministic Replay\n");

    scenario_1_position_sizing();
    scenario_2_breakout_replay();
    scenario_3_forced_liquidation();
    scenario_4_kill_switch();
    scenario_5_risk_sweep();

    println!("\nAll scenarios completed.");
}

const HOUR: i64 = 3_600_000;

fn bar(ts: i64, open: Decimal, high: Decimal, low: Decimal, close: Decimal) -> MarketEvent {
    MarketEvent {
        symbol: Symbol::from("BTCUSDT"),
        timestamp: Timestamp::from_millis(ts),
        open: Price::new_unchecked(open),
        high: Price::new_unchecked(high),
        low: Price::new_unchecked(low),
        close: Price::new_unchecked(close),
        volume: dec!(2000),
        funding_rate: None,
    }
}

/// Deterministic up-trending series with periodic pullbacks, a deep plunge
/// every 40 bars, and a funding print every eighth bar.
fn trending_bars(count: i64) -> Vec<MarketEvent> {
    let mut bars = Vec::new();
    let mut close = dec!(50000);
    for i in 0..count {
        let step = if i % 40 == 20 {
            dec!(-600)
        } else if i % 5 == 4 {
            dec!(-40)
        } else {
            dec!(35)
        };
        let open = close;
        close += step;
        let high = open.max(close) + dec!(20);
        let low = open.min(close) - dec!(20);
        let mut event = bar(i * HOUR, open, high, low, close);
        if i % 8 == 7 {
            event.funding_rate = Some(dec!(0.0001));
        }
        bars.push(event);
    }
    bars
}

fn feed_from(bars: Vec<MarketEvent>) -> EventFeed {
    EventFeed::new(
        vec![BarSeries {
            symbol: Symbol::from("BTCUSDT"),
            bars,
        }],
        HOUR,
        dec!(1.5),
    )
}

fn catalog() -> InstrumentCatalog {
    InstrumentCatalog::new(vec![InstrumentSpec::btc_perp()])
}

/// Sizing math on its own: one accepted intent, one buffer rejection.
fn scenario_1_position_sizing() {
    println!("Scenario 1: Position Sizing\n");

    let spec = InstrumentSpec::btc_perp();
    let params = RiskParams::default();
    let equity = Quote::new(dec!(10000));

    let intent = OrderIntent {
        symbol: Symbol::from("BTCUSDT"),
        side: Side::Long,
        kind: OrderKind::Market,
        entry_price: Price::new_unchecked(dec!(50000)),
        stop_price: Price::new_unchecked(dec!(49000)),
        target_price: None,
        size: SizeMode::RiskFraction(dec!(0.01)),
        time_in_force: TimeInForce::GoodTillCancel,
        atr: dec!(500),
    };

    let sizing = size_position(&intent, equity, dec!(0), &spec, &params);
    println!("  $10,000 equity, 1% risk, entry $50,000, stop $49,000");
    println!(
        "  Sized: {} BTC, ${} notional, {} leverage, ${} at risk",
        sizing.quantity,
        sizing.notional,
        sizing.leverage,
        sizing.risk_amount
    );
    if let Some(liq) = sizing.liquidation_price {
        println!("  Liquidation price: ${}\n", liq);
    }

    // same account chasing 10x notional: the liquidation level lands
    // within three ATRs of entry
    let oversized = OrderIntent {
        size: SizeMode::Notional(dec!(100000)),
        atr: dec!(2000),
        ..intent
    };
    let mut loose = params.clone();
    loose.max_risk_per_trade = dec!(0.05);
    let rejected = size_position(&oversized, equity, dec!(0), &spec, &loose);
    println!(
        "  $100,000 notional on the same account: {}\n",
        rejected
            .rejection
            .map(|r| r.to_string())
            .unwrap_or_else(|| "accepted".to_string())
    );
}

/// Full replay of a channel breakout strategy.
fn scenario_2_breakout_replay() {
    println!("Scenario 2: Breakout Replay\n");

    let catalog = catalog();
    let strategy = Breakout::new(Symbol::from("BTCUSDT"), 12, dec!(0.01));
    let result = Backtester::new(BacktestConfig::default(), &catalog, strategy)
        .run(feed_from(trending_bars(240)))
        .expect("replay failed");

    println!("  Status: {:?}", result.status);
    println!("  Fills: {}", result.trade_log.len());
    println!("  Closed trades: {}", result.stats.total_trades);
    println!("  Final equity: ${}", result.final_equity);
    println!("  Fees paid: ${}", result.stats.total_fees);
    println!("  Funding net: ${}", result.stats.total_funding);
    println!("  Max drawdown: {}", result.stats.max_drawdown);
    println!();
}

/// A leveraged position force-closed when the bar range reaches its
/// liquidation price.
fn scenario_3_forced_liquidation() {
    println!("Scenario 3: Forced Liquidation\n");

    let spec = InstrumentSpec::btc_perp();
    let mut ledger = Ledger::new(Quote::new(dec!(10000)));
    let mut sim = ExecutionSim::new(ExecConfig::default());

    // hand-built 10x long: liquidation at 50_000 * (1 - 0.1 + 0.005)
    let leverage = Leverage::new(dec!(10)).expect("leverage");
    let entry_price = Price::new_unchecked(dec!(50000));
    let liq = liquidation_price(entry_price, Side::Long, leverage, spec.maintenance_margin_rate);
    let order = Order::entry(
        OrderId(1),
        Symbol::from("BTCUSDT"),
        Side::Long,
        OrderKind::Market,
        dec!(2),
        TimeInForce::GoodTillCancel,
        Timestamp::from_millis(0),
        leverage,
        Quote::new(dec!(10000)),
        Quote::new(dec!(200)),
        Price::new_unchecked(dec!(49000)),
        liq,
    );
    let fill = Fill {
        order_id: OrderId(1),
        symbol: Symbol::from("BTCUSDT"),
        side: Side::Long,
        price: entry_price,
        quantity: dec!(2),
        fee: Quote::zero(),
        slippage: dec!(0),
        timestamp: Timestamp::from_millis(0),
        fill_type: FillType::Full,
        forced: false,
    };
    ledger.apply_fill(&fill, &order, &spec).expect("fill");
    println!("  2 BTC long at $50,000, 10x leverage");
    println!("  Liquidation price: ${}", liq.expect("liq price"));

    let crash = bar(HOUR, dec!(47000), dec!(47500), dec!(44000), dec!(44500));
    let fills = sim.process_event(&crash, &mut ledger, &spec).expect("event");

    println!("  Bar trades down to $44,000...");
    for f in &fills {
        println!(
            "  Forced close: {} BTC @ ${} (fee ${})",
            f.quantity, f.price, f.fee
        );
    }
    println!("  Equity after liquidation: ${}\n", ledger.equity());
}

/// Daily drawdown kill switch halting a replay mid-feed.
fn scenario_4_kill_switch() {
    println!("Scenario 4: Daily Drawdown Kill Switch\n");

    // steady collapse: every bar closes lower
    let mut bars = Vec::new();
    let mut close = dec!(50000);
    for i in 0..48 {
        let open = close;
        close -= dec!(150);
        bars.push(bar(i * HOUR, open, open + dec!(30), close - dec!(30), close));
    }

    let mut config = BacktestConfig::default();
    config.kill.max_daily_drawdown = dec!(0.005);

    let catalog = catalog();
    let strategy = BuyAndHold::new(Symbol::from("BTCUSDT"), dec!(0.01), dec!(0.02));
    let result = Backtester::new(config, &catalog, strategy)
        .run(feed_from(bars))
        .expect("replay failed");

    println!("  Status: {:?}", result.status);
    println!("  Events processed: {}", result.equity_curve.len());
    println!("  Final equity: ${}\n", result.final_equity);
}

/// Parallel sweep over per-trade risk fractions.
fn scenario_5_risk_sweep() {
    println!("Scenario 5: Risk Fraction Sweep\n");

    let catalog = catalog();
    let fractions = [dec!(0.0025), dec!(0.005), dec!(0.0075), dec!(0.01)];
    let configs = vary_risk_fraction(&BacktestConfig::default(), &fractions);

    let results = run_sweep(
        &configs,
        &catalog,
        || feed_from(trending_bars(240)),
        |config| Breakout::new(Symbol::from("BTCUSDT"), 12, config.risk.max_risk_per_trade),
    );

    for (fraction, result) in fractions.iter().zip(&results) {
        match result {
            Ok(r) => println!(
                "  risk {}: final equity ${}, {} closed trades, max dd {}",
                fraction, r.final_equity, r.stats.total_trades, r.stats.max_drawdown
            ),
            Err(e) => println!("  risk {}: failed: {e}", fraction),
        }
    }
}
