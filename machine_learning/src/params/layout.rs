use std::ops::Range;

use crate::arch::{HeadKind, TrainMode};

/// Maps the flat parameter buffer into the shared trunk and the three heads.
///
/// The trunk always comes first, followed by the sentiment, paraphrase and similarity heads, so
/// the head parameters form one contiguous tail of the buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParamLayout {
    pub trunk: Range<usize>,
    pub sentiment: Range<usize>,
    pub paraphrase: Range<usize>,
    pub similarity: Range<usize>,
}

impl ParamLayout {
    /// Creates a new `ParamLayout` from the size of each part.
    pub fn new(trunk: usize, sentiment: usize, paraphrase: usize, similarity: usize) -> Self {
        let sentiment_end = trunk + sentiment;
        let paraphrase_end = sentiment_end + paraphrase;

        Self {
            trunk: 0..trunk,
            sentiment: trunk..sentiment_end,
            paraphrase: sentiment_end..paraphrase_end,
            similarity: paraphrase_end..paraphrase_end + similarity,
        }
    }

    /// Total number of parameters.
    pub fn len(&self) -> usize {
        self.similarity.end
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn head(&self, kind: HeadKind) -> Range<usize> {
        match kind {
            HeadKind::Sentiment => self.sentiment.clone(),
            HeadKind::Paraphrase => self.paraphrase.clone(),
            HeadKind::Similarity => self.similarity.clone(),
        }
    }

    /// The range the optimizer is allowed to update under `mode`.
    pub fn trainable(&self, mode: TrainMode) -> Range<usize> {
        match mode {
            TrainMode::Finetune => 0..self.len(),
            TrainMode::Pretrain => self.sentiment.start..self.len(),
        }
    }
}
