use rand::Rng;
use tracing::debug;

use crate::{
    PriceScale,
    config::RetracementConfig,
    utils::{centered, uniform, uniform_steps},
};

/// Smallest absolute move that triggers a retracement at `price`.
///
/// The threshold scales with the decimal magnitude of the price: `factor * 10^floor(log10(price))`.
pub fn retrace_threshold(price: f64, factor: f64) -> f64 {
    factor * price.magnitude()
}

/// Schedules and steps a partial return after a large move.
///
/// At most one retracement is in flight. A qualifying move while one is active is ignored.
#[derive(Debug, Clone)]
pub struct Retracement {
    config: RetracementConfig,
    floor: f64,
    target: Option<f64>,
    remaining: usize,
}

impl Retracement {
    /// Creates an idle controller.
    pub fn new(config: RetracementConfig, floor: f64) -> Self {
        Self {
            config,
            floor,
            target: None,
            remaining: 0,
        }
    }

    /// Returns `true` while a retracement drives the price.
    pub fn is_active(&self) -> bool {
        self.target.is_some() && self.remaining > 0
    }

    /// Returns the price the retracement ends on.
    pub fn target(&self) -> Option<f64> {
        self.target
    }

    /// Returns the number of candles left.
    pub fn remaining(&self) -> usize {
        self.remaining
    }

    /// Starts a retracement if the move from `prior` to `moved` reaches the threshold and none is active.
    ///
    /// ### Returns
    /// `true` if a retracement was started.
    pub fn try_trigger<R: Rng>(&mut self, prior: f64, moved: f64, rng: &mut R) -> bool {
        let delta = moved - prior;
        if self.is_active() || delta.abs() < retrace_threshold(prior, self.config.threshold_factor) {
            return false;
        }

        let fraction = uniform(rng, self.config.min_fraction, self.config.max_fraction);
        let steps = uniform_steps(rng, self.config.min_steps, self.config.max_steps);
        self.trigger(moved, delta, fraction, steps);
        true
    }

    /// Starts a retracement giving back `fraction` of `delta` over `steps` candles.
    ///
    /// The target is `moved - delta * fraction`, floored. Overrides any active retracement.
    pub fn trigger(&mut self, moved: f64, delta: f64, fraction: f64, steps: usize) {
        let target = (moved - delta * fraction).floored(self.floor);
        debug!(moved, delta, fraction, steps, target, "retracement triggered");
        self.target = Some(target);
        self.remaining = steps.max(1);
    }

    /// Computes the next close while active.
    ///
    /// The close moves by the linear interpolation `(target - last) / remaining` plus noise bounded by a
    /// share of the step. A step may move against the retracement for realism. The final step lands
    /// exactly on the target and clears the controller, so a retracement always lasts its full duration.
    ///
    /// ### Returns
    /// `None` when no retracement is active.
    pub fn step<R: Rng>(&mut self, last: f64, rng: &mut R) -> Option<f64> {
        if !self.is_active() {
            return None;
        }
        let target = self.target?;

        let step = (target - last) / self.remaining as f64;
        let noise = centered(rng) * step.abs() * self.config.noise;
        let close = if rng.random_bool(self.config.counter_chance) {
            last - step * self.config.counter_factor + noise
        } else {
            last + step + noise
        };

        self.remaining -= 1;
        if self.remaining == 0 {
            debug!(target, "retracement complete");
            self.clear();
            return Some(target);
        }
        Some(close.floored(self.floor))
    }

    /// Cancels any active retracement.
    pub fn clear(&mut self) {
        self.target = None;
        self.remaining = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::session_rng;

    fn controller() -> Retracement {
        Retracement::new(RetracementConfig::default(), 0.01)
    }

    #[test]
    fn threshold_scales_with_magnitude() {
        assert_eq!(0.5, retrace_threshold(9.5, 0.5));
        assert_eq!(50.0, retrace_threshold(100.0, 0.5));
        assert_eq!(500.0, retrace_threshold(9999.0, 0.5));
    }

    #[test]
    fn small_move_does_not_trigger() {
        let mut retrace = controller();
        let mut rng = session_rng(Some(1));
        assert!(!retrace.try_trigger(100.0, 120.0, &mut rng));
        assert!(!retrace.is_active());
    }

    #[test]
    fn large_move_triggers() {
        let mut retrace = controller();
        let mut rng = session_rng(Some(1));
        assert!(retrace.try_trigger(100.0, 160.0, &mut rng));
        assert!(retrace.is_active());
        assert!((10..=19).contains(&retrace.remaining()));

        // gives back 60% to 80% of the +60 move
        let target = retrace.target().unwrap();
        assert!((112.0..=124.0).contains(&target));
    }

    #[test]
    fn second_trigger_is_ignored_while_active() {
        let mut retrace = controller();
        let mut rng = session_rng(Some(2));
        assert!(retrace.try_trigger(100.0, 160.0, &mut rng));
        let target = retrace.target();
        assert!(!retrace.try_trigger(160.0, 90.0, &mut rng));
        assert_eq!(target, retrace.target());
    }

    #[test]
    fn target_is_floored() {
        let mut retrace = controller();
        retrace.trigger(5.0, 10.0, 0.8, 10);
        assert_eq!(Some(0.01), retrace.target());
    }

    #[test]
    fn scenario_retracement_lands_on_target() {
        let mut retrace = controller();
        let mut rng = session_rng(Some(42));

        retrace.trigger(120.0, 20.0, 0.70, 12);
        let target = retrace.target().unwrap();
        assert!((target - 106.0).abs() < 1e-9);

        let mut last = 120.0;
        for i in 0..12 {
            assert!(retrace.is_active());
            last = retrace.step(last, &mut rng).unwrap();
            if i < 11 {
                assert!(last > 0.0);
            }
        }

        assert_eq!(target, last);
        assert!(!retrace.is_active());
        assert!(retrace.step(last, &mut rng).is_none());
    }

    #[test]
    fn steps_progress_toward_target() {
        let config = RetracementConfig {
            counter_chance: 0.0,
            ..RetracementConfig::default()
        };
        let mut retrace = Retracement::new(config, 0.01);
        let mut rng = session_rng(Some(3));

        retrace.trigger(200.0, 100.0, 0.5, 10);
        let mut last = 200.0;
        while retrace.is_active() {
            let close = retrace.step(last, &mut rng).unwrap();
            assert!(close <= last);
            assert!(close >= 150.0);
            last = close;
        }
        assert_eq!(150.0, last);
    }
}
