use rand::{Rng, SeedableRng, rngs::StdRng};

/// Builds the session random source, seeded when a seed is given.
pub(crate) fn session_rng(seed: Option<u64>) -> StdRng {
    match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_os_rng(),
    }
}

/// Draws a value in `[-0.5, 0.5)`.
pub(crate) fn centered<R: Rng>(rng: &mut R) -> f64 {
    rng.random::<f64>() - 0.5
}

/// Draws `1.0` or `-1.0` with even odds.
pub(crate) fn coin<R: Rng>(rng: &mut R) -> f64 {
    if rng.random_bool(0.5) { 1.0 } else { -1.0 }
}

/// Draws a value in `[min, max)`, or `min` when the range is empty.
pub(crate) fn uniform<R: Rng>(rng: &mut R, min: f64, max: f64) -> f64 {
    if max > min { rng.random_range(min..max) } else { min }
}

/// Draws an integer in `[min, max]`, or `min` when the range is empty.
pub(crate) fn uniform_steps<R: Rng>(rng: &mut R, min: usize, max: usize) -> usize {
    if max > min { rng.random_range(min..=max) } else { min }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seeded_rng_is_deterministic() {
        let mut a = session_rng(Some(42));
        let mut b = session_rng(Some(42));
        for _ in 0..16 {
            assert_eq!(a.random::<u64>(), b.random::<u64>());
        }
    }

    #[test]
    fn centered_bounds() {
        let mut rng = session_rng(Some(1));
        for _ in 0..1000 {
            let v = centered(&mut rng);
            assert!((-0.5..0.5).contains(&v));
        }
    }

    #[test]
    fn uniform_empty_range() {
        let mut rng = session_rng(Some(1));
        assert_eq!(3.0, uniform(&mut rng, 3.0, 3.0));
        assert_eq!(10, uniform_steps(&mut rng, 10, 10));
    }

    #[test]
    fn uniform_steps_inclusive() {
        let mut rng = session_rng(Some(3));
        for _ in 0..1000 {
            let v = uniform_steps(&mut rng, 10, 19);
            assert!((10..=19).contains(&v));
        }
    }
}
