use ndarray::{Array2, ArrayView2, Axis, concatenate};

use crate::{MlErr, Result};

/// Joins two batches of token sequences into one encoder input: `a [SEP] b [SEP]`.
///
/// The separator positions are always attended to; the masks of `a` and `b` are kept as they
/// come, so padding inside either half stays masked out.
#[derive(Debug, Clone, Copy)]
pub struct PairEncoder {
    sep_token_id: u32,
}

impl PairEncoder {
    pub fn new(sep_token_id: u32) -> Self {
        Self { sep_token_id }
    }

    pub fn sep_token_id(&self) -> u32 {
        self.sep_token_id
    }

    /// Builds the joint sequence of a pair batch.
    ///
    /// # Arguments
    /// * `a_ids`, `a_mask` - The first sentences and their mask.
    /// * `b_ids`, `b_mask` - The second sentences and their mask.
    /// * `max_len` - The longest sequence the encoder accepts.
    ///
    /// # Returns
    /// Token ids and mask of width `len(a) + len(b) + 2`.
    ///
    /// # Errors
    /// `MlErr::Shape` when the halves disagree on the number of rows or a mask does not match
    /// its ids, `MlErr::SequenceTooLong` when the joint width exceeds `max_len`. Nothing is
    /// truncated.
    pub fn join(
        &self,
        a_ids: ArrayView2<u32>,
        a_mask: ArrayView2<bool>,
        b_ids: ArrayView2<u32>,
        b_mask: ArrayView2<bool>,
        max_len: usize,
    ) -> Result<(Array2<u32>, Array2<bool>)> {
        let rows = a_ids.nrows();
        if b_ids.nrows() != rows {
            return Err(MlErr::Shape {
                what: "pair batch rows",
                got: b_ids.nrows(),
                expected: rows,
            });
        }

        for (ids, mask) in [(&a_ids, &a_mask), (&b_ids, &b_mask)] {
            if mask.dim() != ids.dim() {
                return Err(MlErr::Shape {
                    what: "pair attention mask columns",
                    got: mask.ncols(),
                    expected: ids.ncols(),
                });
            }
        }

        let len = a_ids.ncols() + b_ids.ncols() + 2;
        if len > max_len {
            return Err(MlErr::SequenceTooLong { got: len, max: max_len });
        }

        let sep = Array2::from_elem((rows, 1), self.sep_token_id);
        let attend = Array2::from_elem((rows, 1), true);

        let ids = concatenate(Axis(1), &[a_ids, sep.view(), b_ids, sep.view()])?;
        let mask = concatenate(Axis(1), &[a_mask, attend.view(), b_mask, attend.view()])?;

        Ok((ids, mask))
    }
}

#[cfg(test)]
mod tests {
    use ndarray::array;

    use super::*;

    #[test]
    fn joint_sequence_has_two_separators() {
        let pair = PairEncoder::new(102);
        let a = array![[5, 6, 7], [8, 9, 10]];
        let b = array![[11, 12], [13, 14]];
        let a_mask = Array2::from_elem(a.dim(), true);
        let b_mask = Array2::from_elem(b.dim(), true);

        let (ids, mask) = pair
            .join(a.view(), a_mask.view(), b.view(), b_mask.view(), 512)
            .unwrap();

        assert_eq!(ids.ncols(), 3 + 2 + 2);
        assert_eq!(ids.row(0).to_vec(), vec![5, 6, 7, 102, 11, 12, 102]);
        assert_eq!(ids.row(1).to_vec(), vec![8, 9, 10, 102, 13, 14, 102]);
        assert!(mask.rows().into_iter().all(|r| r.iter().filter(|&&m| m).count() == 7));
    }

    #[test]
    fn padding_stays_masked_and_separators_are_attended() {
        let pair = PairEncoder::new(2);
        let a = array![[5, 0]];
        let a_mask = array![[true, false]];
        let b = array![[6]];
        let b_mask = array![[true]];

        let (ids, mask) = pair
            .join(a.view(), a_mask.view(), b.view(), b_mask.view(), 8)
            .unwrap();

        assert_eq!(ids, array![[5, 0, 2, 6, 2]]);
        assert_eq!(mask, array![[true, false, true, true, true]]);
    }

    #[test]
    fn too_long_pairs_are_rejected_not_truncated() {
        let pair = PairEncoder::new(2);
        let a = Array2::<u32>::ones((1, 4));
        let b = Array2::<u32>::ones((1, 4));
        let mask = Array2::from_elem((1, 4), true);

        let err = pair
            .join(a.view(), mask.view(), b.view(), mask.view(), 9)
            .unwrap_err();

        assert!(matches!(err, MlErr::SequenceTooLong { got: 10, max: 9 }));
    }

    #[test]
    fn mismatched_rows_are_a_shape_error() {
        let pair = PairEncoder::new(2);
        let a = Array2::<u32>::ones((2, 1));
        let b = Array2::<u32>::ones((1, 1));

        let err = pair
            .join(
                a.view(),
                Array2::from_elem((2, 1), true).view(),
                b.view(),
                Array2::from_elem((1, 1), true).view(),
                16,
            )
            .unwrap_err();

        assert!(matches!(err, MlErr::Shape { .. }));
    }
}
