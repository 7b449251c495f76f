use std::collections::{VecDeque, vec_deque::Iter};

use crate::{
    engine::Candle,
    errors::{Error, Result},
};

/// Bounded, append-only window of candles.
///
/// Once the capacity is exceeded the oldest candle is evicted. The window also tracks the session
/// extrema, which are widened by every appended candle and survive eviction.
#[derive(Debug, Clone)]
pub struct PriceHistory {
    candles: VecDeque<Candle>,
    capacity: usize,
    next_index: u64,
    session_high: Option<f64>,
    session_low: Option<f64>,
}

impl PriceHistory {
    /// Creates an empty history.
    pub fn new(capacity: usize) -> Result<Self> {
        if capacity == 0 {
            return Err(Error::InvalidCapacity(capacity));
        }

        Ok(Self {
            candles: VecDeque::with_capacity(capacity.min(4096)),
            capacity,
            next_index: 1,
            session_high: None,
            session_low: None,
        })
    }

    /// Returns the index the next appended candle must carry.
    pub fn next_index(&self) -> u64 {
        self.next_index
    }

    /// Appends a candle and returns the evicted one, if any.
    pub fn push(&mut self, candle: Candle) -> Option<Candle> {
        debug_assert_eq!(candle.index(), self.next_index);
        self.next_index = candle.index() + 1;
        self.session_high = Some(self.session_high.map_or(candle.high(), |h| h.max(candle.high())));
        self.session_low = Some(self.session_low.map_or(candle.low(), |l| l.min(candle.low())));
        self.candles.push_back(candle);
        if self.candles.len() > self.capacity {
            self.candles.pop_front()
        } else {
            None
        }
    }

    /// Returns the most recent candle.
    pub fn last(&self) -> Option<&Candle> {
        self.candles.back()
    }

    /// Returns the candle before the most recent one.
    pub fn previous(&self) -> Option<&Candle> {
        self.candles.len().checked_sub(2).and_then(|i| self.candles.get(i))
    }

    /// Returns the close of the most recent candle.
    pub fn last_close(&self) -> Result<f64> {
        self.last().map(Candle::close).ok_or(Error::HistoryEmpty)
    }

    /// Returns the highest high since the session started.
    pub fn session_high(&self) -> Option<f64> {
        self.session_high
    }

    /// Returns the lowest low since the session started.
    pub fn session_low(&self) -> Option<f64> {
        self.session_low
    }

    /// Returns the number of candles kept.
    pub fn len(&self) -> usize {
        self.candles.len()
    }

    /// Returns `true` if no candle is kept.
    pub fn is_empty(&self) -> bool {
        self.candles.is_empty()
    }

    /// Returns the maximum number of candles kept.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Returns an iterator over the candles, oldest first.
    pub fn iter(&self) -> Iter<'_, Candle> {
        self.candles.iter()
    }

    /// Drops every candle, restarts the sequence at 1 and forgets the session extrema.
    pub fn clear(&mut self) {
        self.candles.clear();
        self.next_index = 1;
        self.session_high = None;
        self.session_low = None;
    }
}

impl<'a> IntoIterator for &'a PriceHistory {
    type Item = &'a Candle;
    type IntoIter = Iter<'a, Candle>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}
