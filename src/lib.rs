// backtest-core: risk-constrained backtesting engine for perpetual futures.
// risk-first architecture: liquidation-aware sizing gates every order before
// it reaches the simulator. all computation is deterministic with no
// external I/O.
//
// file map:
//   1.x  types.rs: primitives: Symbol, Side, Price, Quote, Leverage
//   2.x  feed.rs: k-way merged OHLCV event stream with integrity checks
//   3.x  instrument.rs: liquidity classes, tick/step grids, catalog
//   4.x  risk.rs: position sizing, leverage tiers, liquidation buffers
//   5.x  order.rs: order state machine and fill records
//   6.x  slippage.rs: taker slippage models (fixed, volume impact, seeded)
//   7.x  sim.rs: bar-replay execution: funding, liquidation sweep, fills
//   8.x  position.rs / ledger.rs: portfolio accounting and conservation
//   9.x  metrics.rs / strategy.rs: finalization stats, strategy boundary
//   10.x engine/: replay orchestrator, kill switches, results
//   11.x sweep.rs: parallel parameter sweeps

// market data and metadata
pub mod feed;
pub mod instrument;
pub mod types;

// sizing and execution
pub mod order;
pub mod risk;
pub mod sim;
pub mod slippage;

// portfolio state
pub mod ledger;
pub mod position;

// orchestration and analysis
pub mod engine;
pub mod metrics;
pub mod strategy;
pub mod sweep;

// re exports for convenience
pub use engine::*;
pub use feed::*;
pub use instrument::*;
pub use ledger::*;
pub use metrics::*;
pub use order::*;
pub use position::*;
pub use risk::*;
pub use sim::*;
pub use slippage::*;
pub use strategy::*;
pub use sweep::*;
pub use types::*;
