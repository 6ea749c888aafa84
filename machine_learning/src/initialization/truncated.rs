use rand::Rng;
use rand_distr::{Distribution, Normal};

use super::{RandErr, Result};

/// A normal distribution whose samples further than two standard deviations from the mean are
/// dropped and drawn again.
#[derive(Debug, Clone, Copy)]
pub struct TruncatedNormal {
    normal: Normal<f32>,
    mean: f32,
    bound: f32,
}

impl TruncatedNormal {
    /// Creates a new `TruncatedNormal` distribution.
    ///
    /// # Arguments
    /// * `mean` - The mean of the distribution.
    /// * `std_dev` - The standard deviation of the untruncated distribution.
    ///
    /// # Returns
    /// An error if `std_dev` is negative or not finite.
    pub fn new(mean: f32, std_dev: f32) -> Result<Self> {
        if std_dev < 0. {
            return Err(RandErr::invalid(format!(
                "the standard deviation can't be negative, got {std_dev}"
            )));
        }

        Ok(Self {
            normal: Normal::new(mean, std_dev)?,
            mean,
            bound: 2. * std_dev,
        })
    }
}

impl Distribution<f32> for TruncatedNormal {
    fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> f32 {
        if self.bound == 0. {
            return self.mean;
        }

        loop {
            let x = self.normal.sample(rng);
            if (x - self.mean).abs() <= self.bound {
                return x;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use rand::{SeedableRng, rngs::StdRng};

    use super::*;

    #[test]
    fn samples_stay_within_two_std_devs() {
        let mut rng = StdRng::seed_from_u64(42);
        let dist = TruncatedNormal::new(1., 0.5).unwrap();

        for _ in 0..10_000 {
            let x = dist.sample(&mut rng);
            assert!((0. ..=2.).contains(&x), "{x} escaped the truncation bounds");
        }
    }

    #[test]
    fn zero_std_dev_is_constant() {
        let mut rng = StdRng::seed_from_u64(42);
        let dist = TruncatedNormal::new(3., 0.).unwrap();
        assert_eq!(dist.sample(&mut rng), 3.);
    }

    #[test]
    fn negative_std_dev() {
        assert!(TruncatedNormal::new(0., -1.).is_err());
        assert!(TruncatedNormal::new(0., f32::NAN).is_err());
    }

    #[test]
    fn negative_std_dev_is_rejected_by_init() {
        use std::{cell::RefCell, rc::Rc};

        use crate::initialization::Init;

        let rng = Rc::new(RefCell::new(StdRng::seed_from_u64(1)));
        assert!(Init::truncated(-0.02).param_gen(&rng, 4).is_err());
    }
}
