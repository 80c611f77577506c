use ndarray::{Array2, ArrayView1, ArrayView2, Axis};

use super::{LossFn, loss_fn::check_batch};
use crate::{MlErr, Result};

/// Multi-class cross-entropy over class logits against integer class labels.
#[derive(Debug, Clone, Copy)]
pub struct CrossEntropy {
    classes: usize,
}

impl CrossEntropy {
    /// Returns a new `CrossEntropy` over `classes` classes.
    pub fn new(classes: usize) -> Self {
        Self { classes }
    }

    fn class_of(&self, label: f32) -> Result<usize> {
        if label < 0.0 || label.fract() != 0.0 || label as usize >= self.classes {
            return Err(MlErr::InvalidLabel {
                what: "class",
                value: label,
            });
        }

        Ok(label as usize)
    }

    /// Row-wise numerically stable softmax.
    fn softmax(y_pred: ArrayView2<f32>) -> Array2<f32> {
        let mut probs = y_pred.to_owned();

        for mut row in probs.axis_iter_mut(Axis(0)) {
            let max = row.fold(f32::NEG_INFINITY, |m, &v| m.max(v));
            row.mapv_inplace(|v| (v - max).exp());
            let sum = row.sum();
            row.mapv_inplace(|v| v / sum);
        }

        probs
    }
}

impl LossFn for CrossEntropy {
    fn loss(&self, y_pred: ArrayView2<f32>, y: ArrayView1<f32>) -> Result<f32> {
        check_batch(&y_pred, &y, self.classes)?;

        let mut total = 0.0;
        for (row, &label) in y_pred.axis_iter(Axis(0)).zip(y) {
            let class = self.class_of(label)?;
            let max = row.fold(f32::NEG_INFINITY, |m, &v| m.max(v));
            let log_sum_exp = max + row.mapv(|v| (v - max).exp()).sum().ln();
            total += log_sum_exp - row[class];
        }

        Ok(total)
    }

    fn loss_prime(&self, y_pred: ArrayView2<f32>, y: ArrayView1<f32>) -> Result<Array2<f32>> {
        check_batch(&y_pred, &y, self.classes)?;

        let mut d = Self::softmax(y_pred);
        for (mut row, &label) in d.axis_iter_mut(Axis(0)).zip(y) {
            row[self.class_of(label)?] -= 1.0;
        }

        Ok(d)
    }
}

#[cfg(test)]
mod tests {
    use ndarray::array;

    use super::*;

    #[test]
    fn confident_correct_logits_have_near_zero_loss() {
        let ce = CrossEntropy::new(5);
        let logits = array![
            [-20., -20., -20., -20., 20.],
            [20., -20., -20., -20., -20.]
        ];
        let labels = array![4., 0.];

        let loss = ce.loss(logits.view(), labels.view()).unwrap();

        assert!(loss.abs() < 1e-6, "loss = {loss}");
    }

    #[test]
    fn uniform_logits_cost_log_classes() {
        let ce = CrossEntropy::new(4);
        let logits = Array2::zeros((2, 4));
        let labels = array![1., 3.];

        let loss = ce.loss(logits.view(), labels.view()).unwrap();

        assert!((loss - 2.0 * 4f32.ln()).abs() < 1e-5);
    }

    #[test]
    fn gradient_is_softmax_minus_one_hot() {
        let ce = CrossEntropy::new(2);
        let logits = array![[0., 0.]];
        let labels = array![1.];

        let d = ce.loss_prime(logits.view(), labels.view()).unwrap();

        assert_eq!(d, array![[0.5, -0.5]]);
    }

    #[test]
    fn out_of_range_label_is_rejected() {
        let ce = CrossEntropy::new(5);
        let logits = Array2::zeros((1, 5));

        let err = ce.loss(logits.view(), array![5.].view()).unwrap_err();

        assert!(matches!(err, MlErr::InvalidLabel { .. }));
    }
}
