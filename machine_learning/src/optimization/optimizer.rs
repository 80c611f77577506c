use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::Result;

/// Defines the strategy for updating model parameters based on calculated gradients.
pub trait Optimizer {
    /// Updates the provided slice of weights using the accumulated gradients.
    ///
    /// # Arguments
    /// * `grad` - A reference to the model's gradient.
    /// * `weights` - The weights to update.
    ///
    /// # Returns
    /// An error if there's a mismatch in the sizes of `grad` and `weights`.
    fn update_weights(&mut self, grad: &[f32], weights: &mut [f32]) -> Result<()>;

    /// Snapshots the optimizer's internal state.
    fn state(&self) -> OptimizerState;

    /// Restores a state produced by `state`.
    ///
    /// # Returns
    /// An error if the state belongs to another kind of optimizer or was sized differently.
    fn load_state(&mut self, state: OptimizerState) -> Result<()>;
}

/// Everything an optimizer needs to resume exactly where it left off.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OptimizerState {
    pub kind: String,
    pub step: u64,
    /// Per-parameter buffers, e.g. moment estimates. Not part of the serialized metadata, they
    /// travel as tensors.
    #[serde(skip)]
    pub slots: BTreeMap<String, Vec<f32>>,
}
