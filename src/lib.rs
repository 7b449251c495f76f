//! # SMS: Synthetic Market Simulator
//!
//! **SMS** is a Rust library that synthesizes a live stream of OHLC candles and lets you trade
//! against it with paper positions.
//! It is designed for **visual plausibility and determinism**. It suits trading games, chart widgets,
//! UI demos and strategy toys that need a market which *looks* real without any data feed.
//!
//! ## Why SMS?
//! - **Plausible Price Paths**: Skewed, smoothed volatility with drift, trends, retracements and rare spikes.
//! - **Scripted Chart Patterns**: Double top/bottom, head-and-shoulders, triangles, flags and wedges.
//! - **Numeric Invariants**: Every candle satisfies `low <= min(open, close)`, `high >= max(open, close)` and `low > 0`.
//! - **Deterministic**: Inject a seed and replay the exact same session.
//! - **Paper Trading**: Long/short positions with spread, take-profit, stop-loss and margin calls.
//!
//! ## Core Components
//! | Component               | Description                                                                        |
//! |-------------------------|------------------------------------------------------------------------------------|
//! | **`Candle`**            | One OHLC bar of the synthetic feed.                                                |
//! | **`VolatilityEstimator`** | Skewed and exponentially smoothed "typical move" for a price.                    |
//! | **`Retracement`**       | Multi-candle partial reversal scheduled after a large move.                        |
//! | **`Trend`**             | Multi-candle directional drift phase.                                              |
//! | **`PatternEngine`**     | Scripted multi-phase chart formations with cooldown and queue.                     |
//! | **`Market`**            | The tick scheduler: decides which controller drives each candle.                   |
//! | **`Ledger`**            | Open positions, trade history, spread and margin calls.                            |
//!
//! ## Controller Precedence
//! | Priority | Controller      | Active when                                                      |
//! |----------|-----------------|------------------------------------------------------------------|
//! | 1        | Pattern         | A pattern is running.                                            |
//! | 2        | Spike           | A rare one-off draw during plain drift.                          |
//! | 3        | Retracement     | A large move was detected and the return is in flight.           |
//! | 4        | Trend           | A trend phase was started on an idle tick.                       |
//! | 5        | Drift           | Nothing else drives the price.                                   |
//!
//! ## Getting Started
//! ```rust
//! use sms_rs::prelude::*;
//!
//! let mut market = Market::new(MarketConfig::default(), Tier::Medium, Some(42)).unwrap();
//! market.start();
//!
//! let id = market.place_buy(None, None).unwrap();
//! for _ in 0..100 {
//!     market.on_timer().unwrap();
//! }
//!
//! if market.ledger().position(id).is_some_and(|p| p.is_open()) {
//!     let profit = market.close_position(id).unwrap();
//!     println!("realized {profit:.2}");
//! }
//!
//! let last = market.history().last().unwrap();
//! assert!(last.low() > 0.0);
//! assert!(last.high() >= last.open().max(last.close()));
//! ```
//!
//! ## Error Handling
//! SMS uses a custom error type to handle:
//! - Invalid manual input (non-finite pump/dump deltas).
//! - Closed market or empty balance when opening positions.
//! - Unknown positions, tiers or patterns.
//! - Invalid configuration files.
//!
//! ```rust
//! use sms_rs::prelude::*;
//!
//! let mut market = Market::new(MarketConfig::default(), Tier::Low, Some(7)).unwrap();
//! match market.place_sell(None, None) {
//!     Ok(_) => println!("Position opened!"),
//!     Err(Error::MarketClosed) => eprintln!("Start the market first"),
//!     Err(e) => eprintln!("{e}"),
//! }
//! ```
//!
//! ## License
//! MIT
#![warn(missing_docs)]

/// Core simulation components: candles, controllers, scheduler and ledger.
pub mod engine;

/// Error types for the library.
pub mod errors;

/// Session configuration: tiers and controller tunables.
pub mod config;

/// Utility functions and helpers.
mod utils;

/// Trade metrics: drawdown, profit factor, win rate.
#[cfg(feature = "metrics")]
pub mod metrics;

/// Re-exports of commonly used types and traits for convenience.
pub mod prelude {
    pub use super::*;
    pub use crate::config::*;
    pub use crate::engine::*;
    pub use crate::errors::*;

    #[cfg(feature = "metrics")]
    pub use crate::metrics::*;
}

/// Trait for price-scale calculations.
///
/// Prices in a session span several orders of magnitude (a few units up to tens of thousands),
/// so thresholds and moves are expressed relative to the decimal magnitude of the price.
pub trait PriceScale {
    /// Returns the decimal magnitude of the value, `10^floor(log10(self))`.
    ///
    /// ### Returns
    /// `1.0` for `9.5`, `100.0` for `120.0`, `0.0` for non-positive values.
    fn magnitude(self) -> Self;

    /// Moves the value a fraction of the way toward `target`.
    ///
    /// ### Arguments
    /// * `target` - The value to move toward.
    /// * `fraction` - The part of the distance to cover (e.g., 0.3 for 30%).
    fn toward(self, target: Self, fraction: Self) -> Self;

    /// Clamps the value so it never goes below `floor`.
    fn floored(self, floor: Self) -> Self;
}

impl PriceScale for f64 {
    fn magnitude(self) -> Self {
        if self <= 0.0 || !self.is_finite() {
            return 0.0;
        }
        10f64.powi(self.log10().floor() as i32)
    }

    fn toward(self, target: Self, fraction: Self) -> Self {
        self + (target - self) * fraction
    }

    fn floored(self, floor: Self) -> Self {
        self.max(floor)
    }
}
