use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{
    PriceScale,
    config::TrendConfig,
    utils::{centered, uniform_steps},
};

/// Direction of a trend or a directional pattern.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TrendDirection {
    /// Prices rise.
    Up,
    /// Prices fall.
    Down,
}

impl TrendDirection {
    /// Returns `1.0` for up, `-1.0` for down.
    pub fn sign(&self) -> f64 {
        match self {
            Self::Up => 1.0,
            Self::Down => -1.0,
        }
    }

    /// Draws a direction with even odds.
    pub fn random<R: Rng>(rng: &mut R) -> Self {
        if rng.random_bool(0.5) { Self::Up } else { Self::Down }
    }
}

/// Multi-candle directional drift.
#[derive(Debug, Clone)]
pub struct Trend {
    config: TrendConfig,
    direction: Option<TrendDirection>,
    remaining: usize,
}

impl Trend {
    /// Creates an idle controller.
    pub fn new(config: TrendConfig) -> Self {
        Self {
            config,
            direction: None,
            remaining: 0,
        }
    }

    /// Returns `true` while a trend drives the price.
    pub fn is_active(&self) -> bool {
        self.direction.is_some() && self.remaining > 0
    }

    /// Returns the direction of the active trend.
    pub fn direction(&self) -> Option<TrendDirection> {
        self.direction
    }

    /// Returns the number of candles left.
    pub fn remaining(&self) -> usize {
        self.remaining
    }

    /// Starts a trend with the configured chance when none is active.
    ///
    /// ### Returns
    /// `true` if a trend was started.
    pub fn maybe_start<R: Rng>(&mut self, rng: &mut R) -> bool {
        if self.is_active() || !rng.random_bool(self.config.chance) {
            return false;
        }
        let direction = TrendDirection::random(rng);
        let steps = uniform_steps(rng, self.config.min_steps, self.config.max_steps);
        self.start(direction, steps);
        true
    }

    /// Starts a trend, replacing any active one.
    pub fn start(&mut self, direction: TrendDirection, steps: usize) {
        debug!(?direction, steps, "trend started");
        self.direction = Some(direction);
        self.remaining = steps;
    }

    /// Computes the next close while active: `last + volatility * vol_factor * sign` with a little noise.
    ///
    /// ### Returns
    /// `None` when no trend is active.
    pub fn step<R: Rng>(&mut self, last: f64, volatility: f64, floor: f64, rng: &mut R) -> Option<f64> {
        if !self.is_active() {
            return None;
        }
        let direction = self.direction?;

        let base = volatility * self.config.vol_factor * direction.sign();
        let noise = centered(rng) * base * self.config.noise;

        self.remaining -= 1;
        if self.remaining == 0 {
            debug!(?direction, "trend finished");
            self.clear();
        }
        Some((last + base + noise).floored(floor))
    }

    /// Cancels any active trend.
    pub fn clear(&mut self) {
        self.direction = None;
        self.remaining = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::session_rng;

    #[test]
    fn never_starts_with_zero_chance() {
        let config = TrendConfig {
            chance: 0.0,
            ..TrendConfig::default()
        };
        let mut trend = Trend::new(config);
        let mut rng = session_rng(Some(1));
        for _ in 0..1000 {
            assert!(!trend.maybe_start(&mut rng));
        }
    }

    #[test]
    fn starts_within_duration_range() {
        let config = TrendConfig {
            chance: 1.0,
            ..TrendConfig::default()
        };
        let mut trend = Trend::new(config);
        let mut rng = session_rng(Some(1));
        assert!(trend.maybe_start(&mut rng));
        assert!(trend.is_active());
        assert!((25..=50).contains(&trend.remaining()));

        // already active
        assert!(!trend.maybe_start(&mut rng));
    }

    #[test]
    fn scenario_uptrend_rises_every_step() {
        let mut trend = Trend::new(TrendConfig::default());
        let mut rng = session_rng(Some(5));
        trend.start(TrendDirection::Up, 30);

        let mut last = 100.0;
        let mut steps = 0;
        while let Some(close) = trend.step(last, 2.0, 0.01, &mut rng) {
            // step is 1.0 with at most 10% noise
            assert!(close - last >= 0.9 && close - last <= 1.1);
            last = close;
            steps += 1;
        }
        assert_eq!(30, steps);
        assert!(!trend.is_active());
        assert!(trend.direction().is_none());
    }

    #[test]
    fn scenario_downtrend_respects_floor() {
        let mut trend = Trend::new(TrendConfig::default());
        let mut rng = session_rng(Some(6));
        trend.start(TrendDirection::Down, 40);

        let mut last = 5.0;
        while let Some(close) = trend.step(last, 2.0, 0.01, &mut rng) {
            assert!(close >= 0.01);
            last = close;
        }
        assert_eq!(0.01, last);
    }
}
