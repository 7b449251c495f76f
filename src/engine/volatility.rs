use rand::Rng;

use crate::{
    PriceScale,
    config::{VolatilityConfig, VolatilityModel},
};

/// Converts a price into a typical move size.
///
/// Each sample draws `r` uniformly in `[0, 1)`, skews it with `r^skew` so small moves dominate,
/// interpolates between the model bounds and smooths the result exponentially against the
/// previous sample: `smoothed' = smoothed * memory + raw * (1 - memory)`.
/// The first sample seeds the smoothed value.
#[derive(Debug, Clone)]
pub struct VolatilityEstimator {
    model: VolatilityModel,
    skew: f64,
    memory: f64,
    smoothed: Option<f64>,
}

impl VolatilityEstimator {
    /// Creates an estimator without any sample yet.
    pub fn new(config: &VolatilityConfig) -> Self {
        Self {
            model: config.model,
            skew: config.skew,
            memory: config.memory,
            smoothed: None,
        }
    }

    /// Returns the `(min, max)` move bounds at `price`.
    pub fn bounds(&self, price: f64) -> (f64, f64) {
        match self.model {
            VolatilityModel::Proportional { min_rate, max_rate } => (price * min_rate, price * max_rate),
            VolatilityModel::Magnitude { min_factor, max_factor } => {
                let magnitude = price.magnitude();
                (magnitude * min_factor, magnitude * max_factor)
            }
        }
    }

    /// Computes the raw move at `price` for the uniform draw `r`, without touching the smoothing state.
    ///
    /// Returns `0.0` for non-positive prices.
    pub fn raw_move(&self, price: f64, r: f64) -> f64 {
        if price <= 0.0 || !price.is_finite() {
            return 0.0;
        }
        let (min, max) = self.bounds(price);
        min + (max - min) * r.powf(self.skew)
    }

    /// Folds a raw move into the smoothed value and returns the new smoothed value.
    pub fn smooth(&mut self, raw: f64) -> f64 {
        let smoothed = match self.smoothed {
            Some(previous) => previous * self.memory + raw * (1.0 - self.memory),
            None => raw,
        };
        self.smoothed = Some(smoothed);
        smoothed
    }

    /// Draws a raw move at `price` and returns the updated smoothed volatility.
    pub fn sample<R: Rng>(&mut self, price: f64, rng: &mut R) -> f64 {
        let raw = self.raw_move(price, rng.random());
        self.smooth(raw)
    }

    /// Returns the last smoothed value, `None` before the first sample.
    pub fn smoothed(&self) -> Option<f64> {
        self.smoothed
    }

    /// Forgets the smoothing state.
    pub fn reset(&mut self) {
        self.smoothed = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::session_rng;

    fn estimator() -> VolatilityEstimator {
        VolatilityEstimator::new(&VolatilityConfig::default())
    }

    #[test]
    fn raw_move_bounds() {
        let vol = estimator();
        let (min, max) = vol.bounds(100.0);
        assert!((min - 0.55).abs() < 1e-12);
        assert!((max - 10.5).abs() < 1e-12);

        assert!((vol.raw_move(100.0, 0.0) - min).abs() < 1e-12);
        assert!((vol.raw_move(100.0, 1.0) - max).abs() < 1e-12);
    }

    #[test]
    fn skew_favours_small_moves() {
        let vol = estimator();
        // 0.5^2.5 ~ 0.177, well below the linear midpoint
        let mid = vol.raw_move(100.0, 0.5);
        assert!(mid < 0.55 + (10.5 - 0.55) * 0.25);
    }

    #[test]
    fn magnitude_model() {
        let config = VolatilityConfig {
            model: VolatilityModel::Magnitude {
                min_factor: 0.01,
                max_factor: 0.2,
            },
            ..VolatilityConfig::default()
        };
        let vol = VolatilityEstimator::new(&config);
        let (min, max) = vol.bounds(950.0);
        assert!((min - 1.0).abs() < 1e-12);
        assert!((max - 20.0).abs() < 1e-12);
    }

    #[test]
    fn non_positive_price() {
        let vol = estimator();
        assert_eq!(0.0, vol.raw_move(0.0, 0.5));
        assert_eq!(0.0, vol.raw_move(-1.0, 0.5));
    }

    #[test]
    fn first_sample_seeds_smoothing() {
        let mut vol = estimator();
        assert!(vol.smoothed().is_none());
        assert_eq!(4.0, vol.smooth(4.0));
        assert_eq!(Some(4.0), vol.smoothed());
    }

    #[test]
    fn smoothing_recurrence() {
        let mut vol = estimator();
        let s1 = vol.smooth(vol.raw_move(100.0, 0.3));
        let raw2 = vol.raw_move(100.0, 0.9);
        let s2 = vol.smooth(raw2);
        assert!((s2 - (0.8 * s1 + 0.2 * raw2)).abs() < 1e-12);
    }

    #[test]
    fn sample_stays_within_bounds() {
        let mut vol = estimator();
        let mut rng = session_rng(Some(8));
        for _ in 0..1000 {
            let v = vol.sample(100.0, &mut rng);
            assert!(v > 0.55 - 1e-9 && v < 10.5 + 1e-9);
        }
    }

    #[test]
    fn reset_forgets_state() {
        let mut vol = estimator();
        vol.smooth(3.0);
        vol.reset();
        assert!(vol.smoothed().is_none());
    }
}
