use std::{collections::HashMap, fs, path::Path};

use log::info;
use ndarray::{Array2, ArrayView2, ArrayViewMut2};
use rand::RngCore;
use safetensors::{Dtype, SafeTensors};

use super::{Encoder, activations::ActFn, layers::Dense};
use crate::{MlErr, Result, initialization};

pub const TOKEN_EMBEDDINGS: &str = "embeddings.token";
pub const POSITION_EMBEDDINGS: &str = "embeddings.position";
pub const POOLER_WEIGHT: &str = "pooler.weight";
pub const POOLER_BIAS: &str = "pooler.bias";

const INIT_STD_DEV: f32 = 0.02;

/// An encoder that sums token and position embeddings, mean-pools them over the real tokens of
/// each row and passes the result through a dense `tanh` pooler.
///
/// Parameter layout: `[token table (vocab x hidden), position table (max_len x hidden), pooler]`.
#[derive(Debug, Clone)]
pub struct PoolingEncoder {
    vocab_size: usize,
    hidden_size: usize,
    max_len: usize,
    pooler: Dense,
    cache: Option<PoolCache>,
}

#[derive(Debug, Clone)]
struct PoolCache {
    ids: Array2<u32>,
    mask: Array2<bool>,
    counts: Vec<usize>,
}

impl PoolingEncoder {
    /// Creates a new `PoolingEncoder`.
    ///
    /// # Arguments
    /// * `vocab_size` - Number of rows of the token embedding table.
    /// * `hidden_size` - Embedding width.
    /// * `max_len` - Number of rows of the position embedding table.
    pub fn new(vocab_size: usize, hidden_size: usize, max_len: usize) -> Self {
        Self {
            vocab_size,
            hidden_size,
            max_len,
            pooler: Dense::new((hidden_size, hidden_size), Some(ActFn::tanh())),
            cache: None,
        }
    }

    fn token_len(&self) -> usize {
        self.vocab_size * self.hidden_size
    }

    fn position_len(&self) -> usize {
        self.max_len * self.hidden_size
    }

    /// Reads pretrained weights from a safetensors file.
    ///
    /// The file must hold the four tensors named by this module's constants, in `f32`, with the
    /// shapes this encoder was built with.
    ///
    /// # Returns
    /// The flat parameter buffer, ready to be handed to `embed`.
    pub fn load_pretrained<P: AsRef<Path>>(&self, path: P) -> Result<Vec<f32>> {
        let path = path.as_ref();
        let bytes = fs::read(path)
            .map_err(|e| MlErr::Weights(format!("cannot read '{}': {e}", path.display())))?;
        let tensors =
            SafeTensors::deserialize(&bytes).map_err(|e| MlErr::Weights(e.to_string()))?;

        let h = self.hidden_size;
        let expected = [
            (TOKEN_EMBEDDINGS, vec![self.vocab_size, h]),
            (POSITION_EMBEDDINGS, vec![self.max_len, h]),
            (POOLER_WEIGHT, vec![h, h]),
            (POOLER_BIAS, vec![h]),
        ];

        let mut params = Vec::with_capacity(self.size());
        for (name, shape) in expected {
            let tensor = tensors
                .tensor(name)
                .map_err(|e| MlErr::Weights(format!("{name}: {e}")))?;

            if tensor.dtype() != Dtype::F32 {
                return Err(MlErr::Weights(format!("{name}: expected f32 values")));
            }

            if tensor.shape() != shape.as_slice() {
                return Err(MlErr::Weights(format!(
                    "{name}: expected shape {shape:?}, got {:?}",
                    tensor.shape()
                )));
            }

            params.extend(
                tensor
                    .data()
                    .chunks_exact(4)
                    .map(bytemuck::pod_read_unaligned::<f32>),
            );
        }

        info!("loaded pretrained encoder weights from {}", path.display());
        Ok(params)
    }

    fn check_batch(&self, ids: &ArrayView2<u32>, mask: &ArrayView2<bool>) -> Result<()> {
        if ids.nrows() != mask.nrows() {
            return Err(MlErr::Shape {
                what: "attention mask rows",
                got: mask.nrows(),
                expected: ids.nrows(),
            });
        }

        if ids.ncols() != mask.ncols() {
            return Err(MlErr::Shape {
                what: "attention mask columns",
                got: mask.ncols(),
                expected: ids.ncols(),
            });
        }

        if ids.ncols() > self.max_len {
            return Err(MlErr::SequenceTooLong {
                got: ids.ncols(),
                max: self.max_len,
            });
        }

        if let Some(&id) = ids.iter().find(|&&id| id as usize >= self.vocab_size) {
            return Err(MlErr::UnknownToken {
                id,
                vocab: self.vocab_size,
            });
        }

        Ok(())
    }

    fn check_params(&self, what: &'static str, got: usize) -> Result<()> {
        if got != self.size() {
            return Err(MlErr::Shape {
                what,
                got,
                expected: self.size(),
            });
        }

        Ok(())
    }
}

impl Encoder for PoolingEncoder {
    fn size(&self) -> usize {
        self.token_len() + self.position_len() + self.pooler.size()
    }

    fn hidden_size(&self) -> usize {
        self.hidden_size
    }

    fn max_len(&self) -> usize {
        self.max_len
    }

    fn init_params(&self, rng: &mut dyn RngCore) -> Result<Vec<f32>> {
        let h = self.hidden_size;
        let mut params = initialization::normal(
            rng,
            self.token_len() + self.position_len() + h * h,
            0.0,
            INIT_STD_DEV,
        )?;
        params.extend(std::iter::repeat_n(0.0, h));
        Ok(params)
    }

    fn embed(
        &mut self,
        params: &[f32],
        ids: ArrayView2<u32>,
        mask: ArrayView2<bool>,
    ) -> Result<Array2<f32>> {
        self.check_params("encoder parameters", params.len())?;
        self.check_batch(&ids, &mask)?;

        let (tokens, rest) = params.split_at(self.token_len());
        let (positions, pooler) = rest.split_at(self.position_len());
        let tokens = ArrayView2::from_shape((self.vocab_size, self.hidden_size), tokens)?;
        let positions = ArrayView2::from_shape((self.max_len, self.hidden_size), positions)?;

        let mut pooled = Array2::zeros((ids.nrows(), self.hidden_size));
        let mut counts = Vec::with_capacity(ids.nrows());

        for (i, mut row) in pooled.rows_mut().into_iter().enumerate() {
            let mut count = 0;
            for (t, &id) in ids.row(i).iter().enumerate() {
                if !mask[[i, t]] {
                    continue;
                }

                row.scaled_add(1.0, &tokens.row(id as usize));
                row.scaled_add(1.0, &positions.row(t));
                count += 1;
            }

            if count > 0 {
                let scale = 1.0 / count as f32;
                row.mapv_inplace(|v| v * scale);
            }
            counts.push(count);
        }

        let out = self.pooler.forward(pooler, pooled.view())?;
        self.cache = Some(PoolCache {
            ids: ids.to_owned(),
            mask: mask.to_owned(),
            counts,
        });

        Ok(out)
    }

    fn backward(&mut self, params: &[f32], grad: &mut [f32], d: Array2<f32>) -> Result<()> {
        self.check_params("encoder parameters", params.len())?;
        self.check_params("encoder gradient", grad.len())?;

        let cache = self.cache.take().ok_or(MlErr::MissingForward { what: "encoder" })?;

        let pooler_start = self.token_len() + self.position_len();
        let (token_grad, rest) = grad.split_at_mut(self.token_len());
        let (position_grad, pooler_grad) = rest.split_at_mut(self.position_len());

        let d_pooled = self
            .pooler
            .backward(&params[pooler_start..], pooler_grad, d)?;

        let mut token_grad =
            ArrayViewMut2::from_shape((self.vocab_size, self.hidden_size), token_grad)?;
        let mut position_grad =
            ArrayViewMut2::from_shape((self.max_len, self.hidden_size), position_grad)?;

        for (i, d_row) in d_pooled.rows().into_iter().enumerate() {
            let count = cache.counts[i];
            if count == 0 {
                continue;
            }

            let scale = 1.0 / count as f32;
            for (t, &id) in cache.ids.row(i).iter().enumerate() {
                if !cache.mask[[i, t]] {
                    continue;
                }

                token_grad.row_mut(id as usize).scaled_add(scale, &d_row);
                position_grad.row_mut(t).scaled_add(scale, &d_row);
            }
        }

        Ok(())
    }
}

/// Names every tensor of a flat `PoolingEncoder` buffer, the inverse of `load_pretrained`.
pub fn named_tensors(
    encoder: &PoolingEncoder,
    params: &[f32],
) -> Result<HashMap<&'static str, (Vec<usize>, Vec<f32>)>> {
    encoder.check_params("encoder parameters", params.len())?;

    let h = encoder.hidden_size;
    let (tokens, rest) = params.split_at(encoder.token_len());
    let (positions, pooler) = rest.split_at(encoder.position_len());
    let (weight, bias) = pooler.split_at(h * h);

    Ok(HashMap::from([
        (TOKEN_EMBEDDINGS, (vec![encoder.vocab_size, h], tokens.to_vec())),
        (POSITION_EMBEDDINGS, (vec![encoder.max_len, h], positions.to_vec())),
        (POOLER_WEIGHT, (vec![h, h], weight.to_vec())),
        (POOLER_BIAS, (vec![h], bias.to_vec())),
    ]))
}

#[cfg(test)]
mod tests {
    use ndarray::array;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;
    use safetensors::tensor::TensorView;

    use super::*;

    fn encoder() -> (PoolingEncoder, Vec<f32>) {
        let encoder = PoolingEncoder::new(10, 4, 6);
        let params = encoder.init_params(&mut ChaCha8Rng::seed_from_u64(0)).unwrap();
        (encoder, params)
    }

    #[test]
    fn one_vector_per_row() {
        let (mut encoder, params) = encoder();
        let ids = array![[1, 2, 3], [4, 5, 0]];
        let mask = array![[true, true, true], [true, true, false]];

        let out = encoder.embed(&params, ids.view(), mask.view()).unwrap();

        assert_eq!(params.len(), encoder.size());
        assert_eq!(out.dim(), (2, 4));
    }

    #[test]
    fn padding_does_not_change_the_embedding() {
        let (mut encoder, params) = encoder();

        let short = encoder
            .embed(&params, array![[1, 2]].view(), array![[true, true]].view())
            .unwrap();
        let padded = encoder
            .embed(
                &params,
                array![[1, 2, 0, 0]].view(),
                array![[true, true, false, false]].view(),
            )
            .unwrap();

        assert_eq!(short, padded);
    }

    #[test]
    fn rejects_bad_batches() {
        let (mut encoder, params) = encoder();

        let too_long = Array2::<u32>::ones((1, 7));
        let err = encoder
            .embed(&params, too_long.view(), Array2::from_elem((1, 7), true).view())
            .unwrap_err();
        assert!(matches!(err, MlErr::SequenceTooLong { got: 7, max: 6 }));

        let err = encoder
            .embed(&params, array![[10]].view(), array![[true]].view())
            .unwrap_err();
        assert!(matches!(err, MlErr::UnknownToken { id: 10, .. }));

        let err = encoder
            .embed(&params, array![[1, 2]].view(), array![[true]].view())
            .unwrap_err();
        assert!(matches!(err, MlErr::Shape { .. }));
    }

    #[test]
    fn backward_only_touches_seen_rows() {
        let (mut encoder, params) = encoder();
        let mut grad = vec![0.0; encoder.size()];

        let out = encoder
            .embed(&params, array![[3, 0]].view(), array![[true, false]].view())
            .unwrap();
        encoder
            .backward(&params, &mut grad, Array2::ones(out.dim()))
            .unwrap();

        let h = 4;
        let token_rows: Vec<bool> = grad[..10 * h]
            .chunks(h)
            .map(|row| row.iter().any(|&g| g != 0.0))
            .collect();
        assert_eq!(token_rows.iter().filter(|&&seen| seen).count(), 1);
        assert!(token_rows[3]);

        let second_position = &grad[10 * h + h..10 * h + 2 * h];
        assert!(second_position.iter().all(|&g| g == 0.0));
    }

    #[test]
    fn backward_without_forward_fails() {
        let (mut encoder, params) = encoder();
        let mut grad = vec![0.0; encoder.size()];

        let err = encoder
            .backward(&params, &mut grad, Array2::ones((1, 4)))
            .unwrap_err();
        assert!(matches!(err, MlErr::MissingForward { .. }));
    }

    #[test]
    fn pretrained_weights_round_trip() {
        let (encoder, params) = encoder();
        let tensors = named_tensors(&encoder, &params).unwrap();

        let bytes: HashMap<_, _> = tensors
            .iter()
            .map(|(name, (shape, values))| {
                (*name, (shape.clone(), bytemuck::cast_slice::<f32, u8>(values).to_vec()))
            })
            .collect();
        let views: Vec<_> = bytes
            .iter()
            .map(|(name, (shape, data))| {
                (*name, TensorView::new(Dtype::F32, shape.clone(), data).unwrap())
            })
            .collect();

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("encoder.safetensors");
        safetensors::serialize_to_file(views, &None, &path).unwrap();

        assert_eq!(encoder.load_pretrained(&path).unwrap(), params);
    }

    #[test]
    fn pretrained_weights_with_wrong_shape_are_rejected() {
        let (encoder, params) = encoder();
        let other = PoolingEncoder::new(12, 4, 6);
        let tensors = named_tensors(&encoder, &params).unwrap();

        let bytes: Vec<_> = tensors
            .iter()
            .map(|(name, (shape, values))| {
                (*name, shape.clone(), bytemuck::cast_slice::<f32, u8>(values).to_vec())
            })
            .collect();
        let views: Vec<_> = bytes
            .iter()
            .map(|(name, shape, data)| {
                (*name, TensorView::new(Dtype::F32, shape.clone(), data).unwrap())
            })
            .collect();

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("encoder.safetensors");
        safetensors::serialize_to_file(views, &None, &path).unwrap();

        assert!(matches!(other.load_pretrained(&path), Err(MlErr::Weights(_))));
    }
}
