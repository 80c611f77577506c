use super::{Optimizer, OptimizerState};
use crate::{MlErr, Result};

pub const KIND: &str = "gradient_descent";

#[derive(Debug)]
pub struct GradientDescent {
    learning_rate: f32,
    step: u64,
}

impl GradientDescent {
    /// Creates a new `GradientDescent` optimizer.
    ///
    /// # Arguments
    /// * `learning_rate` - The small coefficient that modulates the amount of training per update.
    ///
    /// # Returns
    /// A new `GradientDescent` instance.
    pub fn new(learning_rate: f32) -> Self {
        Self {
            learning_rate,
            step: 0,
        }
    }
}

impl Optimizer for GradientDescent {
    fn update_weights(&mut self, grad: &[f32], weights: &mut [f32]) -> Result<()> {
        if grad.len() != weights.len() {
            return Err(MlErr::Shape {
                what: "gradient",
                got: grad.len(),
                expected: weights.len(),
            });
        }

        let lr = self.learning_rate;

        for (w, g) in weights.iter_mut().zip(grad) {
            *w -= lr * g;
        }

        self.step += 1;
        Ok(())
    }

    fn state(&self) -> OptimizerState {
        OptimizerState {
            kind: KIND.to_string(),
            step: self.step,
            ..Default::default()
        }
    }

    fn load_state(&mut self, state: OptimizerState) -> Result<()> {
        if state.kind != KIND {
            return Err(MlErr::InvalidInput("optimizer state is not a gradient descent state"));
        }

        self.step = state.step;
        Ok(())
    }
}
