use std::ops::Range;

use super::ParamLayout;
use crate::{MlErr, Result, arch::TrainMode, optimization::Optimizer};

/// The single owner of every trainable value: the shared trunk plus the three heads, together
/// with a gradient buffer of the same length.
#[derive(Debug, Clone)]
pub struct Parameters {
    values: Vec<f32>,
    grad: Vec<f32>,
    layout: ParamLayout,
    trainable: Range<usize>,
}

impl Parameters {
    /// Creates a new `Parameters`.
    ///
    /// # Arguments
    /// * `values` - The initial parameter values.
    /// * `layout` - How `values` splits into trunk and heads.
    /// * `mode` - Which part of the buffer the optimizer may update.
    ///
    /// # Returns
    /// An error if `values` does not match the layout's length.
    pub fn new(values: Vec<f32>, layout: ParamLayout, mode: TrainMode) -> Result<Self> {
        if values.len() != layout.len() {
            return Err(MlErr::Shape {
                what: "parameters",
                got: values.len(),
                expected: layout.len(),
            });
        }

        Ok(Self {
            grad: vec![0.0; values.len()],
            trainable: layout.trainable(mode),
            values,
            layout,
        })
    }

    pub fn values(&self) -> &[f32] {
        &self.values
    }

    pub fn grad(&self) -> &[f32] {
        &self.grad
    }

    pub fn layout(&self) -> &ParamLayout {
        &self.layout
    }

    /// The number of parameters the optimizer sees.
    pub fn trainable_len(&self) -> usize {
        self.trainable.len()
    }

    /// Borrows the values and the gradient at the same time.
    pub fn split_mut(&mut self) -> (&[f32], &mut [f32]) {
        (&self.values, &mut self.grad)
    }

    /// Replaces every value, e.g. when restoring a checkpoint.
    pub fn load(&mut self, values: Vec<f32>) -> Result<()> {
        if values.len() != self.values.len() {
            return Err(MlErr::Shape {
                what: "restored parameters",
                got: values.len(),
                expected: self.values.len(),
            });
        }

        self.values = values;
        Ok(())
    }

    /// Zeros out the gradient.
    pub fn zero_grad(&mut self) {
        self.grad.fill(0.0);
    }

    /// Applies the gradient onto the trainable range of the parameters.
    pub fn optimize(&mut self, optimizer: &mut dyn Optimizer) -> Result<()> {
        let range = self.trainable.clone();
        optimizer.update_weights(&self.grad[range.clone()], &mut self.values[range])
    }
}
