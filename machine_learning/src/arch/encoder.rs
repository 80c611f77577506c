use ndarray::{Array2, ArrayView2};
use rand::RngCore;

use crate::Result;

/// A sequence encoder mapping token ids plus an attention mask to one pooled vector per row.
///
/// Like every layer in this crate it does not own its parameters: they are handed in as a flat
/// slice on every call.
pub trait Encoder {
    /// Returns the number of scalar parameters expected in `params` and `grad`.
    fn size(&self) -> usize;

    /// Width of the produced embeddings.
    fn hidden_size(&self) -> usize;

    /// Longest sequence the encoder accepts.
    fn max_len(&self) -> usize;

    /// Generates a fresh set of parameters.
    fn init_params(&self, rng: &mut dyn RngCore) -> Result<Vec<f32>>;

    /// Encodes a padded batch.
    ///
    /// # Arguments
    /// * `params` - The encoder's parameters.
    /// * `ids` - Token ids, one row per sequence, padded to equal length.
    /// * `mask` - `true` on real tokens, `false` on padding; same shape as `ids`.
    ///
    /// # Returns
    /// A `(rows, hidden_size)` embedding matrix.
    ///
    /// # Errors
    /// `MlErr::Shape` on malformed batch geometry, `MlErr::SequenceTooLong` when the rows are
    /// longer than `max_len`.
    fn embed(
        &mut self,
        params: &[f32],
        ids: ArrayView2<u32>,
        mask: ArrayView2<bool>,
    ) -> Result<Array2<f32>>;

    /// Accumulates into `grad` the gradient of the loss given `d`, its derivative with respect
    /// to the embeddings returned by the last `embed` call.
    fn backward(&mut self, params: &[f32], grad: &mut [f32], d: Array2<f32>) -> Result<()>;
}
