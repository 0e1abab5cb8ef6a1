//! Timeline estimation for tasks the model left unestimated
//!
//! The only shared mutable state in the pipeline lives here. Production code
//! draws from a `StdRng`; tests inject a seeded or fixed source.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::ops::RangeInclusive;

/// Default bounded range for synthesized task timelines (days)
pub const DEFAULT_TIMELINE_RANGE: RangeInclusive<u32> = 1..=5;

/// Source of task timeline estimates
pub trait TimelineEstimator: Send {
    /// Returns an estimate in days, always >= 1
    fn estimate_days(&mut self) -> u32;
}

/// Uniform pseudo-random estimates over a bounded range
#[derive(Debug, Clone)]
pub struct RandomEstimator {
    rng: StdRng,
    range: RangeInclusive<u32>,
}

impl RandomEstimator {
    /// Deterministic estimator for a given seed
    pub fn seeded(seed: u64, range: RangeInclusive<u32>) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            range: Self::sanitize(range),
        }
    }

    /// Estimator seeded from OS entropy
    pub fn from_entropy(range: RangeInclusive<u32>) -> Self {
        Self {
            rng: StdRng::from_entropy(),
            range: Self::sanitize(range),
        }
    }

    /// Seeded when a seed is configured, entropy otherwise
    pub fn new(seed: Option<u64>, range: RangeInclusive<u32>) -> Self {
        match seed {
            Some(seed) => Self::seeded(seed, range),
            None => Self::from_entropy(range),
        }
    }

    fn sanitize(range: RangeInclusive<u32>) -> RangeInclusive<u32> {
        let lo = (*range.start()).max(1);
        let hi = (*range.end()).max(lo);
        lo..=hi
    }
}

impl Default for RandomEstimator {
    fn default() -> Self {
        Self::from_entropy(DEFAULT_TIMELINE_RANGE)
    }
}

impl TimelineEstimator for RandomEstimator {
    fn estimate_days(&mut self) -> u32 {
        self.rng.gen_range(self.range.clone())
    }
}

/// Always returns the same estimate
#[derive(Debug, Clone, Copy)]
pub struct FixedEstimator(pub u32);

impl TimelineEstimator for FixedEstimator {
    fn estimate_days(&mut self) -> u32 {
        self.0.max(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seeded_estimator_is_repeatable() {
        let mut a = RandomEstimator::seeded(42, DEFAULT_TIMELINE_RANGE);
        let mut b = RandomEstimator::seeded(42, DEFAULT_TIMELINE_RANGE);
        let xs: Vec<u32> = (0..20).map(|_| a.estimate_days()).collect();
        let ys: Vec<u32> = (0..20).map(|_| b.estimate_days()).collect();
        assert_eq!(xs, ys);
    }

    #[test]
    fn test_estimates_stay_in_range() {
        let mut est = RandomEstimator::seeded(7, 1..=5);
        for _ in 0..200 {
            let d = est.estimate_days();
            assert!((1..=5).contains(&d));
        }
    }

    #[test]
    fn test_degenerate_range_is_sanitized() {
        let mut est = RandomEstimator::seeded(1, 0..=0);
        assert_eq!(est.estimate_days(), 1);
        assert_eq!(FixedEstimator(0).estimate_days(), 1);
    }
}
