use log::debug;
use ndarray::{Array2, ArrayView2};
use rand::RngCore;
use serde::{Deserialize, Serialize};

use super::{Encoder, Head, HeadKind, PairEncoder};
use crate::{
    MlErr, Result,
    optimization::Optimizer,
    params::{ParamLayout, Parameters},
};

/// Whether the shared encoder is trained along with the heads.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrainMode {
    /// The encoder is frozen, only the heads learn.
    #[default]
    Pretrain,
    Finetune,
}

/// Shape of the head set.
#[derive(Debug, Clone, Copy)]
pub struct HeadsConfig {
    pub num_sentiment_classes: usize,
    pub dropout: f32,
    pub sep_token_id: u32,
}

/// One shared encoder, one pair encoder and three heads over a single `Parameters` container.
///
/// Every forward path reads the same trunk; whichever head produced the loss, its gradient lands
/// in the same buffer and one optimizer step updates it.
pub struct MultitaskModel<E: Encoder> {
    encoder: E,
    pair: PairEncoder,
    sentiment: Head,
    paraphrase: Head,
    similarity: Head,
    params: Parameters,
    mode: TrainMode,
}

impl<E: Encoder> MultitaskModel<E> {
    /// Creates a new `MultitaskModel` with freshly initialized heads.
    ///
    /// # Arguments
    /// * `encoder` - The shared encoder.
    /// * `trunk` - The encoder's parameters, pretrained or freshly initialized.
    /// * `config` - The head set configuration.
    /// * `mode` - Fixed for the model's whole life.
    /// * `rng` - Source of the head initialization.
    pub fn new(
        encoder: E,
        trunk: Vec<f32>,
        config: HeadsConfig,
        mode: TrainMode,
        rng: &mut dyn RngCore,
    ) -> Result<Self> {
        let heads = Self::build_heads(&encoder, config)?;

        let mut values = trunk;
        for head in &heads {
            values.extend(head.init_params(rng)?);
        }

        Self::assemble(encoder, heads, values, config, mode)
    }

    /// Rebuilds a model around an already complete parameter buffer, e.g. from a checkpoint.
    pub fn with_params(
        encoder: E,
        values: Vec<f32>,
        config: HeadsConfig,
        mode: TrainMode,
    ) -> Result<Self> {
        let heads = Self::build_heads(&encoder, config)?;
        Self::assemble(encoder, heads, values, config, mode)
    }

    fn build_heads(encoder: &E, config: HeadsConfig) -> Result<[Head; 3]> {
        if config.num_sentiment_classes == 0 {
            return Err(MlErr::InvalidInput("there must be at least one sentiment class"));
        }

        let h = encoder.hidden_size();
        Ok([
            Head::new(h, config.num_sentiment_classes, config.dropout)?,
            Head::new(h, 1, config.dropout)?,
            Head::new(h, 1, config.dropout)?,
        ])
    }

    fn assemble(
        encoder: E,
        [sentiment, paraphrase, similarity]: [Head; 3],
        values: Vec<f32>,
        config: HeadsConfig,
        mode: TrainMode,
    ) -> Result<Self> {
        let layout = ParamLayout::new(
            encoder.size(),
            sentiment.size(),
            paraphrase.size(),
            similarity.size(),
        );

        let params = Parameters::new(values, layout, mode)?;
        debug!(
            trunk = params.layout().trunk.len(), trainable = params.trainable_len();
            "built multitask model"
        );

        Ok(Self {
            encoder,
            pair: PairEncoder::new(config.sep_token_id),
            sentiment,
            paraphrase,
            similarity,
            params,
            mode,
        })
    }

    pub fn mode(&self) -> TrainMode {
        self.mode
    }

    pub fn encoder(&self) -> &E {
        &self.encoder
    }

    pub fn params(&self) -> &Parameters {
        &self.params
    }

    pub fn params_mut(&mut self) -> &mut Parameters {
        &mut self.params
    }

    pub fn num_sentiment_classes(&self) -> usize {
        self.sentiment.outputs()
    }

    fn embed(&mut self, ids: ArrayView2<u32>, mask: ArrayView2<bool>) -> Result<Array2<f32>> {
        let trunk = self.params.layout().trunk.clone();
        self.encoder.embed(&self.params.values()[trunk], ids, mask)
    }

    fn embed_pair(
        &mut self,
        a: (ArrayView2<u32>, ArrayView2<bool>),
        b: (ArrayView2<u32>, ArrayView2<bool>),
    ) -> Result<Array2<f32>> {
        let max_len = self.encoder.max_len();
        let (ids, mask) = self.pair.join(a.0, a.1, b.0, b.1, max_len)?;
        self.embed(ids.view(), mask.view())
    }

    fn project(
        &mut self,
        kind: HeadKind,
        embedding: Array2<f32>,
        rng: Option<&mut dyn RngCore>,
    ) -> Result<Array2<f32>> {
        let range = self.params.layout().head(kind);
        let head = match kind {
            HeadKind::Sentiment => &mut self.sentiment,
            HeadKind::Paraphrase => &mut self.paraphrase,
            HeadKind::Similarity => &mut self.similarity,
        };

        head.forward(&self.params.values()[range], embedding, rng)
    }

    /// Sentiment class logits, `(rows, num_sentiment_classes)`.
    ///
    /// # Arguments
    /// * `ids` - Padded token ids.
    /// * `mask` - Attention mask of the same shape.
    /// * `rng` - `Some` in training mode (dropout active), `None` for evaluation.
    pub fn predict_sentiment(
        &mut self,
        ids: ArrayView2<u32>,
        mask: ArrayView2<bool>,
        rng: Option<&mut dyn RngCore>,
    ) -> Result<Array2<f32>> {
        let embedding = self.embed(ids, mask)?;
        self.project(HeadKind::Sentiment, embedding, rng)
    }

    /// Paraphrase logits, `(rows, 1)`, from the joint encoding of both sentences.
    pub fn predict_paraphrase(
        &mut self,
        a: (ArrayView2<u32>, ArrayView2<bool>),
        b: (ArrayView2<u32>, ArrayView2<bool>),
        rng: Option<&mut dyn RngCore>,
    ) -> Result<Array2<f32>> {
        let embedding = self.embed_pair(a, b)?;
        self.project(HeadKind::Paraphrase, embedding, rng)
    }

    /// Similarity scores, `(rows, 1)`, from the joint encoding of both sentences.
    pub fn predict_similarity(
        &mut self,
        a: (ArrayView2<u32>, ArrayView2<bool>),
        b: (ArrayView2<u32>, ArrayView2<bool>),
        rng: Option<&mut dyn RngCore>,
    ) -> Result<Array2<f32>> {
        let embedding = self.embed_pair(a, b)?;
        self.project(HeadKind::Similarity, embedding, rng)
    }

    /// Accumulates the gradient of a loss whose derivative with respect to the last output of
    /// `kind` is `d`.
    ///
    /// In `Pretrain` mode the derivative stops at the head.
    pub fn backward(&mut self, kind: HeadKind, d: Array2<f32>) -> Result<()> {
        let layout = self.params.layout().clone();
        let mode = self.mode;

        let (values, grad) = self.params.split_mut();
        let range = layout.head(kind);
        let d = match kind {
            HeadKind::Sentiment => &mut self.sentiment,
            HeadKind::Paraphrase => &mut self.paraphrase,
            HeadKind::Similarity => &mut self.similarity,
        }
        .backward(&values[range.clone()], &mut grad[range], d)?;

        if mode == TrainMode::Pretrain {
            return Ok(());
        }

        let trunk = layout.trunk;
        self.encoder
            .backward(&values[trunk.clone()], &mut grad[trunk], d)
    }

    pub fn zero_grad(&mut self) {
        self.params.zero_grad();
    }

    /// Applies one optimizer step over the trainable parameters.
    pub fn optimize(&mut self, optimizer: &mut dyn Optimizer) -> Result<()> {
        self.params.optimize(optimizer)
    }

    /// Number of parameters the optimizer must be sized for.
    pub fn trainable_len(&self) -> usize {
        self.params.trainable_len()
    }
}
