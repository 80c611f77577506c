use ndarray::{Array2, ArrayView1, ArrayView2};

use crate::{MlErr, Result};

/// A loss over a batch of unnormalized model outputs.
///
/// Every implementation uses SUM reduction, callers decide how to normalize.
pub trait LossFn {
    /// Computes the summed loss.
    ///
    /// # Arguments
    /// * `y_pred` - The model's raw outputs, one row per example.
    /// * `y` - The labels, one per example.
    fn loss(&self, y_pred: ArrayView2<f32>, y: ArrayView1<f32>) -> Result<f32>;

    /// Computes the derivative of the summed loss with respect to `y_pred`.
    fn loss_prime(&self, y_pred: ArrayView2<f32>, y: ArrayView1<f32>) -> Result<Array2<f32>>;
}

/// Checks that there is one label per row and that every row has `cols` outputs.
pub(super) fn check_batch(
    y_pred: &ArrayView2<f32>,
    y: &ArrayView1<f32>,
    cols: usize,
) -> Result<()> {
    if y_pred.ncols() != cols {
        return Err(MlErr::Shape {
            what: "loss input columns",
            got: y_pred.ncols(),
            expected: cols,
        });
    }

    if y_pred.nrows() != y.len() {
        return Err(MlErr::Shape {
            what: "labels",
            got: y.len(),
            expected: y_pred.nrows(),
        });
    }

    Ok(())
}
