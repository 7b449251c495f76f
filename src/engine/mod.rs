//! Core simulation components.
//!
//! This module provides the fundamental types of a market session:
//! - `Candle`: OHLC bar, validated builder and wick shaping.
//! - `PriceHistory`: Bounded window of candles with session extrema.
//! - `VolatilityEstimator`, `Retracement`, `Trend`, `PatternEngine`: The price controllers.
//! - `Market`: The tick scheduler owning every controller.
//! - `Ledger`, `Position`, `Wallet`: Paper positions against the feed.

mod candle;
mod history;
mod ledger;
mod market;
mod pattern;
mod position;
mod retracement;
mod trend;
mod volatility;
mod wallet;

pub use candle::*;
pub use history::*;
pub use ledger::*;
pub use market::*;
pub use pattern::*;
pub use position::*;
pub use retracement::*;
pub use trend::*;
pub use volatility::*;
pub use wallet::*;
