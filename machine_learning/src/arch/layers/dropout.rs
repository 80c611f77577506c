use ndarray::Array2;
use rand::RngCore;
use rand_distr::{Bernoulli, Distribution};

use crate::{MlErr, Result};

/// Inverted dropout: in training mode each activation is zeroed with probability `p` and the
/// survivors are scaled by `1 / (1 - p)`; in evaluation mode it is the identity.
#[derive(Clone, Debug)]
pub struct Dropout {
    p: f32,
    keep: Bernoulli,
    mask: Option<Array2<f32>>,
}

impl Dropout {
    /// Creates a new `Dropout`.
    ///
    /// # Arguments
    /// * `p` - The probability of dropping an activation, in `[0, 1)`.
    pub fn new(p: f32) -> Result<Self> {
        if !(0.0..1.0).contains(&p) {
            return Err(MlErr::InvalidInput("dropout probability must be in [0, 1)"));
        }

        let keep = Bernoulli::new(1.0 - p as f64)
            .map_err(|_| MlErr::InvalidInput("dropout probability must be in [0, 1)"))?;

        Ok(Self {
            p,
            keep,
            mask: None,
        })
    }

    pub fn p(&self) -> f32 {
        self.p
    }

    /// Applies dropout to `x`.
    ///
    /// # Arguments
    /// * `x` - The activations.
    /// * `rng` - The source of the dropout mask, `None` means evaluation mode.
    pub fn forward(&mut self, x: Array2<f32>, rng: Option<&mut dyn RngCore>) -> Array2<f32> {
        let Some(rng) = rng.filter(|_| self.p > 0.0) else {
            self.mask = None;
            return x;
        };

        let scale = 1.0 / (1.0 - self.p);
        let keep = self.keep;
        let mask = Array2::from_shape_fn(x.raw_dim(), |_| {
            if keep.sample(&mut *rng) { scale } else { 0.0 }
        });

        let out = &x * &mask;
        self.mask = Some(mask);
        out
    }

    pub fn backward(&mut self, d: Array2<f32>) -> Result<Array2<f32>> {
        let Some(mask) = self.mask.take() else {
            return Ok(d);
        };

        if mask.dim() != d.dim() {
            return Err(MlErr::Shape {
                what: "dropout delta",
                got: d.len(),
                expected: mask.len(),
            });
        }

        Ok(d * mask)
    }
}
