use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::{
    PriceScale,
    errors::{Error, Result},
};

/// One OHLC bar of the synthetic feed.
///
/// A candle always satisfies `low <= min(open, close)`, `high >= max(open, close)` and `low > 0`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    index: u64,
    open: f64,
    high: f64,
    low: f64,
    close: f64,
}

impl Candle {
    /// Returns the sequence index, starting at 1 for the seed candle of a session.
    pub fn index(&self) -> u64 {
        self.index
    }

    /// Returns the open price.
    pub fn open(&self) -> f64 {
        self.open
    }

    /// Returns the high price.
    pub fn high(&self) -> f64 {
        self.high
    }

    /// Returns the low price.
    pub fn low(&self) -> f64 {
        self.low
    }

    /// Returns the close price.
    pub fn close(&self) -> f64 {
        self.close
    }

    /// Returns `true` when the close is above the open.
    pub fn is_bullish(&self) -> bool {
        self.close > self.open
    }

    /// Returns the signed body, `close - open`.
    pub fn body(&self) -> f64 {
        self.close - self.open
    }
}

/// Validated builder for [`Candle`].
///
/// ### Example
/// ```rust
/// use sms_rs::prelude::*;
///
/// let candle = CandleBuilder::builder()
///     .index(1)
///     .open(100.0)
///     .high(110.0)
///     .low(95.0)
///     .close(105.0)
///     .build()
///     .unwrap();
/// assert_eq!(candle.close(), 105.0);
///
/// let invalid = CandleBuilder::builder().index(2).open(100.0).high(99.0).low(95.0).close(105.0).build();
/// assert!(invalid.is_err());
/// ```
#[derive(Debug, Default)]
pub struct CandleBuilder {
    index: Option<u64>,
    open: Option<f64>,
    high: Option<f64>,
    low: Option<f64>,
    close: Option<f64>,
}

impl CandleBuilder {
    /// Creates an empty builder.
    pub fn builder() -> Self {
        Self::default()
    }

    /// Sets the sequence index.
    pub fn index(mut self, index: u64) -> Self {
        self.index = Some(index);
        self
    }

    /// Sets the open price.
    pub fn open(mut self, open: f64) -> Self {
        self.open = Some(open);
        self
    }

    /// Sets the high price.
    pub fn high(mut self, high: f64) -> Self {
        self.high = Some(high);
        self
    }

    /// Sets the low price.
    pub fn low(mut self, low: f64) -> Self {
        self.low = Some(low);
        self
    }

    /// Sets the close price.
    pub fn close(mut self, close: f64) -> Self {
        self.close = Some(close);
        self
    }

    /// Builds the candle, checking the OHLC ordering and the positive low.
    pub fn build(self) -> Result<Candle> {
        let index = self.index.ok_or(Error::MissingField("index"))?;
        let open = self.open.ok_or(Error::MissingField("open"))?;
        let high = self.high.ok_or(Error::MissingField("high"))?;
        let low = self.low.ok_or(Error::MissingField("low"))?;
        let close = self.close.ok_or(Error::MissingField("close"))?;

        let finite = [open, high, low, close].iter().all(|v| v.is_finite());
        if !finite || low <= 0.0 || high < open.max(close) || low > open.min(close) {
            return Err(Error::InvalidCandle { open, high, low, close });
        }

        Ok(Candle {
            index,
            open,
            high,
            low,
            close,
        })
    }
}

/// Derives the wicks of generated candles.
///
/// Wicks are randomized in proportion to volatility and then clamped, so every shaped candle
/// respects the OHLC ordering and never goes below the price floor.
#[derive(Debug, Clone, Copy)]
pub struct WickShaper {
    wick_factor: f64,
    floor: f64,
}

/// Share of the manual spike budget kept for the tail on the unfavourable side.
const MANUAL_TAIL: f64 = 0.1;

impl WickShaper {
    /// Creates a shaper.
    ///
    /// ### Arguments
    /// * `wick_factor` - Largest wick beyond the body, in units of volatility.
    /// * `floor` - Price floor of the session.
    pub fn new(wick_factor: f64, floor: f64) -> Self {
        Self { wick_factor, floor }
    }

    /// Returns the price floor.
    pub fn floor(&self) -> f64 {
        self.floor
    }

    /// Shapes a regular candle from `open` to `close`.
    pub fn shape<R: Rng>(&self, index: u64, open: f64, close: f64, volatility: f64, rng: &mut R) -> Candle {
        let reach = volatility * self.wick_factor;
        let upper = rng.random::<f64>() * reach;
        let lower = rng.random::<f64>() * reach;
        self.clamp(index, open, close, upper, lower)
    }

    /// Shapes a spike candle: the body dominates and wicks stay short.
    pub fn spike<R: Rng>(
        &self,
        index: u64,
        open: f64,
        close: f64,
        volatility: f64,
        wick_factor: f64,
        rng: &mut R,
    ) -> Candle {
        let reach = volatility * wick_factor;
        let upper = rng.random::<f64>() * reach;
        let lower = rng.random::<f64>() * reach;
        self.clamp(index, open, close, upper, lower)
    }

    /// Shapes a manual pump or dump candle.
    ///
    /// The wick on the side of the move spikes up to 60% of the body, the opposite tail stays minimal.
    pub fn manual<R: Rng>(&self, index: u64, open: f64, close: f64, volatility: f64, rng: &mut R) -> Candle {
        let budget = ((close - open).abs() * 0.6).max(volatility * 0.03);
        let spike = rng.random::<f64>() * budget;
        let tail = rng.random::<f64>() * budget * MANUAL_TAIL;
        if close >= open {
            self.clamp(index, open, close, spike, tail)
        } else {
            self.clamp(index, open, close, tail, spike)
        }
    }

    fn clamp(&self, index: u64, open: f64, close: f64, upper: f64, lower: f64) -> Candle {
        let open = open.floored(self.floor);
        let close = close.floored(self.floor);
        let body_high = open.max(close);
        let body_low = open.min(close);
        let high = (body_high + upper).max(body_high);
        let low = (body_low - lower).min(body_low).floored(self.floor);

        debug_assert!(high >= body_high && low <= body_low && low > 0.0);
        Candle {
            index,
            open,
            high,
            low,
            close,
        }
    }
}
