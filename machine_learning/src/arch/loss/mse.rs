use ndarray::{Array2, ArrayView1, ArrayView2, Axis};

use super::{LossFn, loss_fn::check_batch};
use crate::Result;

/// Squared error summed over the batch, one output per example.
#[derive(Debug, Default, Clone, Copy)]
pub struct Mse;

impl Mse {
    /// Returns a new `Mse`.
    pub fn new() -> Self {
        Self
    }
}

impl LossFn for Mse {
    fn loss(&self, y_pred: ArrayView2<f32>, y: ArrayView1<f32>) -> Result<f32> {
        check_batch(&y_pred, &y, 1)?;

        Ok((&y_pred.column(0) - &y).mapv(|x| x.powi(2)).sum())
    }

    fn loss_prime(&self, y_pred: ArrayView2<f32>, y: ArrayView1<f32>) -> Result<Array2<f32>> {
        check_batch(&y_pred, &y, 1)?;

        let d = (&y_pred.column(0) - &y) * 2.0;
        Ok(d.insert_axis(Axis(1)))
    }
}
