use ndarray::{Array1, Array2};

use super::{PairExample, SentenceExample};

/// Padded single-sentence batch.
#[derive(Debug, Clone, PartialEq)]
pub struct SentenceBatch {
    pub ids: Vec<String>,
    pub token_ids: Array2<u32>,
    pub mask: Array2<bool>,
    /// Class indices, `None` when any example of the batch is unlabeled.
    pub labels: Option<Array1<f32>>,
}

impl SentenceBatch {
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

/// Padded sentence-pair batch; each side is padded on its own.
#[derive(Debug, Clone, PartialEq)]
pub struct PairBatch {
    pub ids: Vec<String>,
    pub token_ids_1: Array2<u32>,
    pub mask_1: Array2<bool>,
    pub token_ids_2: Array2<u32>,
    pub mask_2: Array2<bool>,
    pub labels: Option<Array1<f32>>,
}

impl PairBatch {
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

/// Stacks examples into a padded batch.
pub trait Collate {
    type Batch;

    fn collate(examples: &[&Self], pad_token_id: u32) -> Self::Batch;
}

impl Collate for SentenceExample {
    type Batch = SentenceBatch;

    fn collate(examples: &[&Self], pad_token_id: u32) -> SentenceBatch {
        let (token_ids, mask) = pad(examples.iter().map(|e| &e.token_ids[..]), pad_token_id);

        SentenceBatch {
            ids: examples.iter().map(|e| e.id.clone()).collect(),
            token_ids,
            mask,
            labels: labels(examples.iter().map(|e| e.label.map(f32::from))),
        }
    }
}

impl Collate for PairExample {
    type Batch = PairBatch;

    fn collate(examples: &[&Self], pad_token_id: u32) -> PairBatch {
        let (token_ids_1, mask_1) =
            pad(examples.iter().map(|e| &e.token_ids_1[..]), pad_token_id);
        let (token_ids_2, mask_2) =
            pad(examples.iter().map(|e| &e.token_ids_2[..]), pad_token_id);

        PairBatch {
            ids: examples.iter().map(|e| e.id.clone()).collect(),
            token_ids_1,
            mask_1,
            token_ids_2,
            mask_2,
            labels: labels(examples.iter().map(|e| e.label)),
        }
    }
}

/// Right-pads every sequence to the longest one.
fn pad<'a, I>(sequences: I, pad_token_id: u32) -> (Array2<u32>, Array2<bool>)
where
    I: ExactSizeIterator<Item = &'a [u32]> + Clone,
{
    let rows = sequences.len();
    let cols = sequences.clone().map(<[u32]>::len).max().unwrap_or(0);

    let mut ids = Array2::from_elem((rows, cols), pad_token_id);
    let mut mask = Array2::from_elem((rows, cols), false);

    for (i, sequence) in sequences.enumerate() {
        for (j, &id) in sequence.iter().enumerate() {
            ids[[i, j]] = id;
            mask[[i, j]] = true;
        }
    }

    (ids, mask)
}

fn labels<I: Iterator<Item = Option<f32>>>(labels: I) -> Option<Array1<f32>> {
    labels.collect::<Option<Vec<_>>>().map(Array1::from)
}
