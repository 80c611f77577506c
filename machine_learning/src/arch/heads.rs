use ndarray::Array2;
use rand::RngCore;
use serde::{Deserialize, Serialize};

use super::layers::{Dense, Dropout};
use crate::{Result, initialization};

/// The three prediction heads sharing the encoder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HeadKind {
    Sentiment,
    Paraphrase,
    Similarity,
}

impl HeadKind {
    pub const ALL: [HeadKind; 3] = [Self::Sentiment, Self::Paraphrase, Self::Similarity];

    pub fn name(self) -> &'static str {
        match self {
            Self::Sentiment => "sentiment",
            Self::Paraphrase => "paraphrase",
            Self::Similarity => "similarity",
        }
    }
}

/// Dropout followed by a linear projection of the (pair-)embedding.
#[derive(Debug, Clone)]
pub struct Head {
    dropout: Dropout,
    dense: Dense,
}

impl Head {
    /// Creates a new `Head`.
    ///
    /// # Arguments
    /// * `hidden_size` - Width of the embeddings it consumes.
    /// * `outputs` - Number of scores it produces.
    /// * `dropout` - Dropout probability applied before the projection.
    pub fn new(hidden_size: usize, outputs: usize, dropout: f32) -> Result<Self> {
        Ok(Self {
            dropout: Dropout::new(dropout)?,
            dense: Dense::new((hidden_size, outputs), None),
        })
    }

    pub fn size(&self) -> usize {
        self.dense.size()
    }

    pub fn outputs(&self) -> usize {
        self.dense.dim().1
    }

    /// Xavier-initialized weights followed by zero biases.
    pub fn init_params(&self, rng: &mut dyn RngCore) -> Result<Vec<f32>> {
        let (fan_in, fan_out) = self.dense.dim();
        let mut params = initialization::xavier_uniform(rng, fan_in * fan_out, fan_in, fan_out)?;
        params.extend(std::iter::repeat_n(0.0, fan_out));
        Ok(params)
    }

    /// Produces unnormalized scores; `rng` enables dropout.
    pub fn forward(
        &mut self,
        params: &[f32],
        embedding: Array2<f32>,
        rng: Option<&mut dyn RngCore>,
    ) -> Result<Array2<f32>> {
        let x = self.dropout.forward(embedding, rng);
        self.dense.forward(params, x.view())
    }

    /// Back-propagates the score derivative, returning the embedding derivative.
    pub fn backward(
        &mut self,
        params: &[f32],
        grad: &mut [f32],
        d: Array2<f32>,
    ) -> Result<Array2<f32>> {
        let d = self.dense.backward(params, grad, d)?;
        self.dropout.backward(d)
    }
}
