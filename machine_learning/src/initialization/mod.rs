//! Seeded weight generators.

use rand::RngCore;
use rand_distr::{Distribution, Normal, Uniform};

use crate::{MlErr, Result};

/// Samples `n` weights from a normal distribution.
///
/// # Arguments
/// * `rng` - A random number generator.
/// * `n` - The amount of weights to generate.
/// * `mean` - The mean of the distribution.
/// * `std_dev` - The standard deviation of the distribution.
///
/// # Returns
/// An error if `std_dev` is not finite.
pub fn normal(rng: &mut dyn RngCore, n: usize, mean: f32, std_dev: f32) -> Result<Vec<f32>> {
    let distribution = Normal::new(mean, std_dev)
        .map_err(|_| MlErr::InvalidInput("normal standard deviation must be finite"))?;

    Ok(sample(rng, &distribution, n))
}

/// Samples `n` weights using Xavier uniform initialization.
///
/// # Arguments
/// * `rng` - A random number generator.
/// * `n` - The amount of weights to generate.
/// * `fan_in` - The number of input units in the weight tensor.
/// * `fan_out` - The number of output units in the weight tensor.
pub fn xavier_uniform(
    rng: &mut dyn RngCore,
    n: usize,
    fan_in: usize,
    fan_out: usize,
) -> Result<Vec<f32>> {
    let range = (6. / (fan_in + fan_out).max(1) as f32).sqrt();
    let distribution = Uniform::new(-range, range)
        .map_err(|_| MlErr::InvalidInput("invalid xavier uniform range"))?;

    Ok(sample(rng, &distribution, n))
}

fn sample<D: Distribution<f32>>(rng: &mut dyn RngCore, distribution: &D, n: usize) -> Vec<f32> {
    (0..n).map(|_| distribution.sample(rng)).collect()
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    use super::*;

    #[test]
    fn same_seed_same_weights() {
        let a = normal(&mut ChaCha8Rng::seed_from_u64(3), 16, 0.0, 0.02).unwrap();
        let b = normal(&mut ChaCha8Rng::seed_from_u64(3), 16, 0.0, 0.02).unwrap();

        assert_eq!(a, b);
    }

    #[test]
    fn xavier_respects_its_bound() {
        let w = xavier_uniform(&mut ChaCha8Rng::seed_from_u64(1), 64, 4, 2).unwrap();
        let bound = 1.0;

        assert_eq!(w.len(), 64);
        assert!(w.iter().all(|v| v.abs() <= bound));
    }

    #[test]
    fn non_finite_std_dev_is_rejected() {
        assert!(normal(&mut ChaCha8Rng::seed_from_u64(1), 1, 0.0, f32::NAN).is_err());
    }
}
