use ndarray::{Array2, ArrayView1, ArrayView2};

use super::{LossFn, loss_fn::check_batch};
use crate::{MlErr, Result, arch::activations::Sigmoid};

/// Binary cross-entropy on a single logit per example against a `0`/`1` label.
#[derive(Debug, Default, Clone, Copy)]
pub struct BceWithLogits;

impl BceWithLogits {
    pub fn new() -> Self {
        Self
    }

    fn check_label(label: f32) -> Result<f32> {
        if label != 0.0 && label != 1.0 {
            return Err(MlErr::InvalidLabel {
                what: "binary",
                value: label,
            });
        }

        Ok(label)
    }
}

impl LossFn for BceWithLogits {
    fn loss(&self, y_pred: ArrayView2<f32>, y: ArrayView1<f32>) -> Result<f32> {
        check_batch(&y_pred, &y, 1)?;

        let mut total = 0.0;
        for (&z, &label) in y_pred.column(0).iter().zip(y) {
            let label = Self::check_label(label)?;
            // max(z, 0) - z * y + ln(1 + e^-|z|)
            total += z.max(0.0) - z * label + (-z.abs()).exp().ln_1p();
        }

        Ok(total)
    }

    fn loss_prime(&self, y_pred: ArrayView2<f32>, y: ArrayView1<f32>) -> Result<Array2<f32>> {
        check_batch(&y_pred, &y, 1)?;

        let sigmoid = Sigmoid::default();
        let mut d = y_pred.mapv(|z| sigmoid.f(z));
        for (p, &label) in d.iter_mut().zip(y) {
            *p -= Self::check_label(label)?;
        }

        Ok(d)
    }
}
