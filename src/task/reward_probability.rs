//! Reward probabilities that drift as a bounded random walk.
//!
//! Each final-stage symbol carries one of these. Once per trial the value takes
//! a Gaussian step and is reflected back into `[MIN_VALUE, MAX_VALUE]`.
//!
//! ```text
//! v' = v + (δ mod 1),  δ ~ N(0, DIFFUSION_RATE)
//! v' > MAX  →  2·MAX − v'
//! v' < MIN  →  2·MIN − v'
//! ```
//!
//! The modulo is floored (result carries the divisor's sign), so a small
//! negative δ becomes an increment just below 1 and is folded back by the two
//! reflections. Sequences must match reference runs draw for draw, so the
//! transform is kept as is.

use std::fmt;

use rand::Rng;
use rand_distr::{Distribution, StandardNormal};
use serde::{Deserialize, Serialize};

use crate::errors::{Error, Result};

/// Probability of reward for one final-stage symbol.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(try_from = "f64", into = "f64")]
pub struct RewardProbability(f64);

impl RewardProbability {
    pub const MIN_VALUE: f64 = 0.25;
    pub const MAX_VALUE: f64 = 0.75;
    /// Standard deviation of the per-trial Gaussian step.
    pub const DIFFUSION_RATE: f64 = 0.025;

    /// Wraps a value known to be in range.
    ///
    /// # Panics
    /// Panics if `value` is outside `[MIN_VALUE, MAX_VALUE]`.
    pub fn new(value: f64) -> Self {
        assert!(
            (Self::MIN_VALUE..=Self::MAX_VALUE).contains(&value),
            "reward probability {value} outside [{}, {}]",
            Self::MIN_VALUE,
            Self::MAX_VALUE
        );
        Self(value)
    }

    /// Fallible constructor for values read from data files.
    pub fn try_new(value: f64) -> Result<Self> {
        if (Self::MIN_VALUE..=Self::MAX_VALUE).contains(&value) {
            Ok(Self(value))
        } else {
            Err(Error::OutOfRange {
                value,
                min: Self::MIN_VALUE,
                max: Self::MAX_VALUE,
            })
        }
    }

    /// Uniform draw from the allowed interval.
    pub fn create_random<R: Rng + ?Sized>(rng: &mut R) -> Self {
        Self::new(rng.gen_range(Self::MIN_VALUE..=Self::MAX_VALUE))
    }

    pub fn value(self) -> f64 {
        self.0
    }

    /// Next value of the walk. `self` is left untouched.
    pub fn diffuse<R: Rng + ?Sized>(self, rng: &mut R) -> Self {
        let z: f64 = StandardNormal.sample(rng);
        self.reflect_on_boundaries(z * Self::DIFFUSION_RATE)
    }

    /// Applies a raw Gaussian increment with the modulo-and-reflect rule.
    pub fn reflect_on_boundaries(self, increment: f64) -> Self {
        let mut next = self.0 + increment.rem_euclid(1.0);
        if next > Self::MAX_VALUE {
            next = 2.0 * Self::MAX_VALUE - next;
        }
        if next < Self::MIN_VALUE {
            next = 2.0 * Self::MIN_VALUE - next;
        }
        Self::new(next)
    }

    /// Bernoulli outcome: 1 with probability `self`, otherwise 0.
    pub fn sample_reward<R: Rng + ?Sized>(self, rng: &mut R) -> u8 {
        u8::from(rng.gen::<f64>() < self.0)
    }
}

impl TryFrom<f64> for RewardProbability {
    type Error = Error;

    fn try_from(value: f64) -> Result<Self> {
        Self::try_new(value)
    }
}

impl From<RewardProbability> for f64 {
    fn from(p: RewardProbability) -> f64 {
        p.0
    }
}

impl fmt::Display for RewardProbability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_create_random_in_bounds() {
        let mut rng = StdRng::seed_from_u64(1);
        for _ in 0..1000 {
            let p = RewardProbability::create_random(&mut rng).value();
            assert!((0.25..=0.75).contains(&p), "out of bounds: {p}");
        }
    }

    #[test]
    fn test_diffusion_stays_in_bounds() {
        let mut rng = StdRng::seed_from_u64(7);
        for start in [0.25, 0.3, 0.5, 0.7, 0.75] {
            let mut p = RewardProbability::new(start);
            for step in 0..5000 {
                p = p.diffuse(&mut rng);
                assert!(
                    (0.25..=0.75).contains(&p.value()),
                    "start={start} step={step}: {}",
                    p.value()
                );
            }
        }
    }

    #[test]
    fn test_reflection_extreme_increments() {
        for start in [0.25, 0.4, 0.6, 0.75] {
            let p = RewardProbability::new(start);
            for incr in [-3.7, -1.0, -0.5, -1e-20, 0.0, 0.2, 0.999, 1.0, 2.5] {
                let next = p.reflect_on_boundaries(incr).value();
                assert!(
                    (0.25..=0.75).contains(&next),
                    "start={start} incr={incr}: {next}"
                );
            }
        }
    }

    #[test]
    fn test_small_negative_step_moves_down() {
        // 0.5 + (-0.01 mod 1) = 1.49 → 0.01 → 0.49
        let next = RewardProbability::new(0.5).reflect_on_boundaries(-0.01);
        assert!((next.value() - 0.49).abs() < 1e-12);
    }

    #[test]
    fn test_small_positive_step_moves_up() {
        let next = RewardProbability::new(0.5).reflect_on_boundaries(0.02);
        assert!((next.value() - 0.52).abs() < 1e-12);
    }

    #[test]
    fn test_reflect_off_upper_bound() {
        // 0.74 + 0.03 = 0.77 → 1.5 - 0.77 = 0.73
        let next = RewardProbability::new(0.74).reflect_on_boundaries(0.03);
        assert!((next.value() - 0.73).abs() < 1e-12);
    }

    #[test]
    fn test_diffuse_does_not_mutate() {
        let mut rng = StdRng::seed_from_u64(3);
        let p = RewardProbability::new(0.5);
        let _ = p.diffuse(&mut rng);
        assert_eq!(p.value(), 0.5);
    }

    #[test]
    #[should_panic(expected = "outside")]
    fn test_out_of_range_panics() {
        let _ = RewardProbability::new(0.8);
    }

    #[test]
    fn test_try_new_rejects_out_of_range() {
        assert!(RewardProbability::try_new(0.1).is_err());
        assert!(RewardProbability::try_new(0.75).is_ok());
        let parsed: std::result::Result<RewardProbability, _> = serde_json::from_str("0.9");
        assert!(parsed.is_err());
    }

    #[test]
    fn test_sample_reward_frequency() {
        let mut rng = StdRng::seed_from_u64(11);
        let p = RewardProbability::new(0.7);
        let n = 20_000;
        let hits: u32 = (0..n).map(|_| u32::from(p.sample_reward(&mut rng))).sum();
        let freq = hits as f64 / n as f64;
        assert!((freq - 0.7).abs() < 0.02, "frequency {freq}");
    }
}
