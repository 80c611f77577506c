use serde::{Deserialize, Serialize};

use super::{AdamW, GradientDescent, Optimizer};

/// Which optimizer to train with, and its hyperparameters. The learning rate lives outside so
/// that both kinds share it.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum OptimizerConfig {
    Adamw {
        #[serde(default = "default_b1")]
        b1: f32,
        #[serde(default = "default_b2")]
        b2: f32,
        #[serde(default = "default_eps")]
        eps: f32,
        #[serde(default)]
        weight_decay: f32,
    },
    GradientDescent,
}

fn default_b1() -> f32 {
    0.9
}

fn default_b2() -> f32 {
    0.999
}

fn default_eps() -> f32 {
    1e-6
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self::Adamw {
            b1: default_b1(),
            b2: default_b2(),
            eps: default_eps(),
            weight_decay: 0.0,
        }
    }
}

#[derive(Debug, Default)]
pub struct OptimizerBuilder;

impl OptimizerBuilder {
    pub fn new() -> Self {
        Self
    }

    /// Builds an optimizer.
    ///
    /// # Arguments
    /// * `config` - The optimizer's kind and hyperparameters.
    /// * `lr` - The learning rate.
    /// * `len` - The amount of parameters it will update.
    ///
    /// # Returns
    /// A boxed optimizer.
    pub fn build(&self, config: OptimizerConfig, lr: f32, len: usize) -> Box<dyn Optimizer> {
        match config {
            OptimizerConfig::Adamw {
                b1,
                b2,
                eps,
                weight_decay,
            } => Box::new(AdamW::new(len, lr, b1, b2, eps, weight_decay)),
            OptimizerConfig::GradientDescent => Box::new(GradientDescent::new(lr)),
        }
    }
}
