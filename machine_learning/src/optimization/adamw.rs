use std::collections::BTreeMap;

use super::{Optimizer, OptimizerState};
use crate::{MlErr, Result};

pub const KIND: &str = "adamw";
const FIRST_MOMENT: &str = "exp_avg";
const SECOND_MOMENT: &str = "exp_avg_sq";

/// Adam with decoupled weight decay.
#[derive(Debug)]
pub struct AdamW {
    learning_rate: f32,
    beta1: f32,
    beta2: f32,
    epsilon: f32,
    weight_decay: f32,
    step: u64,
    v: Box<[f32]>,
    s: Box<[f32]>,
}

impl AdamW {
    /// Creates a new `AdamW` optimizer.
    ///
    /// # Arguments
    /// * `len` - The amount of parameters this instance should hold.
    /// * `learning_rate` - The small coefficient that modulates the amount of training per update.
    /// * `beta1`, `beta2`, `epsilon` - Hyperparameters to the optimization algorithm.
    /// * `weight_decay` - Decay applied straight to the weights, outside of the moment estimates.
    ///
    /// # Returns
    /// A new `AdamW` instance.
    pub fn new(
        len: usize,
        learning_rate: f32,
        beta1: f32,
        beta2: f32,
        epsilon: f32,
        weight_decay: f32,
    ) -> Self {
        Self {
            learning_rate,
            beta1,
            beta2,
            epsilon,
            weight_decay,
            step: 0,
            v: vec![0.; len].into_boxed_slice(),
            s: vec![0.; len].into_boxed_slice(),
        }
    }

    pub fn step(&self) -> u64 {
        self.step
    }
}

impl Optimizer for AdamW {
    fn update_weights(&mut self, grad: &[f32], weights: &mut [f32]) -> Result<()> {
        for (what, len) in [("gradient", grad.len()), ("adamw moments", self.v.len())] {
            if len != weights.len() {
                return Err(MlErr::Shape {
                    what,
                    got: len,
                    expected: weights.len(),
                });
            }
        }

        let Self {
            learning_rate: lr,
            beta1: b1,
            beta2: b2,
            epsilon: eps,
            weight_decay: wd,
            ..
        } = *self;

        self.step += 1;
        let t = self.step.min(i32::MAX as u64) as i32;

        let bc1 = 1. - b1.powi(t);
        let bc2 = 1. - b2.powi(t);
        let step_size = lr * (bc2.sqrt() / bc1);

        weights
            .iter_mut()
            .zip(grad)
            .zip(self.v.iter_mut())
            .zip(self.s.iter_mut())
            .for_each(|(((w, g), v), s)| {
                *v = b1 * *v + (1. - b1) * g;
                *s = b2 * *s + (1. - b2) * g.powi(2);
                *w -= step_size * *v / (s.sqrt() + eps);

                if wd > 0. {
                    *w -= lr * wd * *w;
                }
            });

        Ok(())
    }

    fn state(&self) -> OptimizerState {
        OptimizerState {
            kind: KIND.to_string(),
            step: self.step,
            slots: BTreeMap::from([
                (FIRST_MOMENT.to_string(), self.v.to_vec()),
                (SECOND_MOMENT.to_string(), self.s.to_vec()),
            ]),
        }
    }

    fn load_state(&mut self, mut state: OptimizerState) -> Result<()> {
        if state.kind != KIND {
            return Err(MlErr::InvalidInput("optimizer state is not an adamw state"));
        }

        let mut take = |name: &str| -> Result<Box<[f32]>> {
            let slot = state
                .slots
                .remove(name)
                .ok_or(MlErr::InvalidInput("adamw state is missing a moment buffer"))?;

            if slot.len() != self.v.len() {
                return Err(MlErr::Shape {
                    what: "adamw moments",
                    got: slot.len(),
                    expected: self.v.len(),
                });
            }

            Ok(slot.into_boxed_slice())
        };

        let v = take(FIRST_MOMENT)?;
        let s = take(SECOND_MOMENT)?;

        self.v = v;
        self.s = s;
        self.step = state.step;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_step_moves_every_weight_by_the_learning_rate() {
        let mut adam = AdamW::new(3, 0.1, 0.9, 0.999, 1e-8, 0.0);
        let mut weights = [1.0, 1.0, 1.0];

        adam.update_weights(&[0.5, -2.0, 0.0], &mut weights).unwrap();

        assert!((weights[0] - 0.9).abs() < 1e-5);
        assert!((weights[1] - 1.1).abs() < 1e-5);
        assert_eq!(weights[2], 1.0);
    }

    #[test]
    fn weight_decay_shrinks_weights_without_gradient() {
        let mut adam = AdamW::new(1, 0.1, 0.9, 0.999, 1e-8, 0.5);
        let mut weights = [2.0];

        adam.update_weights(&[0.0], &mut weights).unwrap();

        assert!((weights[0] - 1.9).abs() < 1e-6);
    }

    #[test]
    fn restored_state_continues_identically() {
        let grads = [[0.3, -0.1], [0.2, 0.4], [-0.5, 0.1]];

        let mut reference = AdamW::new(2, 0.01, 0.9, 0.999, 1e-6, 0.01);
        let mut expected = [0.5, -0.5];
        for g in &grads {
            reference.update_weights(g, &mut expected).unwrap();
        }

        let mut first = AdamW::new(2, 0.01, 0.9, 0.999, 1e-6, 0.01);
        let mut weights = [0.5, -0.5];
        first.update_weights(&grads[0], &mut weights).unwrap();

        let mut resumed = AdamW::new(2, 0.01, 0.9, 0.999, 1e-6, 0.01);
        resumed.load_state(first.state()).unwrap();
        for g in &grads[1..] {
            resumed.update_weights(g, &mut weights).unwrap();
        }

        assert_eq!(weights, expected);
        assert_eq!(resumed.step(), 3);
    }

    #[test]
    fn rejects_foreign_or_missized_state() {
        let mut adam = AdamW::new(2, 0.01, 0.9, 0.999, 1e-6, 0.0);

        let foreign = OptimizerState {
            kind: "gradient_descent".into(),
            ..Default::default()
        };
        assert!(adam.load_state(foreign).is_err());

        let missized = AdamW::new(3, 0.01, 0.9, 0.999, 1e-6, 0.0).state();
        assert!(adam.load_state(missized).is_err());
    }

    #[test]
    fn mismatched_gradient_is_an_error() {
        let mut adam = AdamW::new(2, 0.01, 0.9, 0.999, 1e-6, 0.0);
        assert!(adam.update_weights(&[0.0], &mut [0.0, 0.0]).is_err());
    }
}
