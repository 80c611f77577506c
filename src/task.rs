use std::{fmt, path::Path};

use machine_learning::{
    MlErr,
    arch::{
        Encoder, HeadKind, MultitaskModel,
        loss::{BceWithLogits, CrossEntropy, LossFn, Mse},
    },
    optimization::Optimizer,
};
use ndarray::{Array1, Array2};
use rand::{Rng, RngCore};

use crate::{
    Result, TrainErr,
    data::{DataLoader, PairBatch, PairExample, SentenceBatch, SentenceExample, load_jsonl},
};

/// The loss each task trains with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LossKind {
    CrossEntropy,
    BinaryCrossEntropyWithLogits,
    MeanSquaredError,
}

/// The three tasks trained together.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Task {
    Sentiment,
    Paraphrase,
    Similarity,
}

impl Task {
    pub const ALL: [Task; 3] = [Task::Sentiment, Task::Paraphrase, Task::Similarity];

    pub fn name(self) -> &'static str {
        match self {
            Task::Sentiment => "sst",
            Task::Paraphrase => "para",
            Task::Similarity => "sts",
        }
    }

    pub fn head(self) -> HeadKind {
        match self {
            Task::Sentiment => HeadKind::Sentiment,
            Task::Paraphrase => HeadKind::Paraphrase,
            Task::Similarity => HeadKind::Similarity,
        }
    }

    pub fn loss_kind(self) -> LossKind {
        match self {
            Task::Sentiment => LossKind::CrossEntropy,
            Task::Paraphrase => LossKind::BinaryCrossEntropyWithLogits,
            Task::Similarity => LossKind::MeanSquaredError,
        }
    }

    /// Draws this task's next batch of the epoch and trains on it.
    ///
    /// # Returns
    /// The normalized batch loss.
    ///
    /// # Errors
    /// `TrainErr::SourceExhausted` when the task has no batch left this epoch.
    pub fn step<E: Encoder>(
        self,
        sources: &mut TaskSources,
        ctx: &mut StepContext<'_, E>,
    ) -> Result<f32> {
        let exhausted = || TrainErr::SourceExhausted { task: self.name() };

        match self {
            Task::Sentiment => {
                let batch = sources.sentiment.next_batch().ok_or_else(exhausted)?;
                step_sentiment(ctx, &batch)
            }
            Task::Paraphrase => {
                let batch = sources.paraphrase.next_batch().ok_or_else(exhausted)?;
                step_paraphrase(ctx, &batch)
            }
            Task::Similarity => {
                let batch = sources.similarity.next_batch().ok_or_else(exhausted)?;
                step_similarity(ctx, &batch)
            }
        }
    }
}

impl fmt::Display for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// The training loaders of the three tasks.
#[derive(Debug, Clone)]
pub struct TaskSources {
    pub sentiment: DataLoader<SentenceExample>,
    pub paraphrase: DataLoader<PairExample>,
    pub similarity: DataLoader<PairExample>,
}

impl TaskSources {
    /// Loads the three splits from JSON lines files.
    ///
    /// # Arguments
    /// * `sst`, `para`, `sts` - The sentiment, paraphrase and similarity files.
    /// * `batch_size` - The batch size of every loader.
    /// * `pad_token_id` - The padding token.
    /// * `shuffle` - Whether the loaders reshuffle on every epoch.
    pub fn load(
        [sst, para, sts]: [&Path; 3],
        batch_size: usize,
        pad_token_id: u32,
        shuffle: bool,
    ) -> Result<Self> {
        Ok(Self {
            sentiment: DataLoader::new(load_jsonl(sst)?, batch_size, pad_token_id, shuffle),
            paraphrase: DataLoader::new(load_jsonl(para)?, batch_size, pad_token_id, shuffle),
            similarity: DataLoader::new(load_jsonl(sts)?, batch_size, pad_token_id, shuffle),
        })
    }

    /// The number of batches `task` contributes to one epoch.
    pub fn count(&self, task: Task) -> usize {
        match task {
            Task::Sentiment => self.sentiment.num_batches(),
            Task::Paraphrase => self.paraphrase.num_batches(),
            Task::Similarity => self.similarity.num_batches(),
        }
    }

    pub fn counts(&self) -> [(Task, usize); 3] {
        Task::ALL.map(|task| (task, self.count(task)))
    }

    /// Reshuffles every loader and rewinds its cursor.
    pub fn start_epoch<R: Rng + ?Sized>(&mut self, rng: &mut R) {
        self.sentiment.start_epoch(rng);
        self.paraphrase.start_epoch(rng);
        self.similarity.start_epoch(rng);
    }
}

/// What every step function mutates or reads: the model, the optimizer, the dropout source and
/// the nominal batch size losses are divided by.
pub struct StepContext<'a, E: Encoder> {
    pub model: &'a mut MultitaskModel<E>,
    pub optimizer: &'a mut dyn Optimizer,
    pub rng: &'a mut dyn RngCore,
    pub batch_size: usize,
}

/// Trains the sentiment head (and the encoder, when fine-tuning) on one batch.
pub fn step_sentiment<E: Encoder>(
    ctx: &mut StepContext<'_, E>,
    batch: &SentenceBatch,
) -> Result<f32> {
    let labels = labels_of(&batch.labels)?;

    ctx.model.zero_grad();
    let logits = ctx.model.predict_sentiment(
        batch.token_ids.view(),
        batch.mask.view(),
        Some(&mut *ctx.rng),
    )?;

    let loss_fn = CrossEntropy::new(ctx.model.num_sentiment_classes());
    apply(ctx, Task::Sentiment, &loss_fn, logits, labels)
}

/// Trains the paraphrase head on one batch of pairs.
pub fn step_paraphrase<E: Encoder>(ctx: &mut StepContext<'_, E>, batch: &PairBatch) -> Result<f32> {
    let labels = labels_of(&batch.labels)?;

    ctx.model.zero_grad();
    let logits = ctx.model.predict_paraphrase(
        (batch.token_ids_1.view(), batch.mask_1.view()),
        (batch.token_ids_2.view(), batch.mask_2.view()),
        Some(&mut *ctx.rng),
    )?;

    apply(ctx, Task::Paraphrase, &BceWithLogits, logits, labels)
}

/// Trains the similarity head on one batch of pairs.
pub fn step_similarity<E: Encoder>(ctx: &mut StepContext<'_, E>, batch: &PairBatch) -> Result<f32> {
    let labels = labels_of(&batch.labels)?;

    ctx.model.zero_grad();
    let scores = ctx.model.predict_similarity(
        (batch.token_ids_1.view(), batch.mask_1.view()),
        (batch.token_ids_2.view(), batch.mask_2.view()),
        Some(&mut *ctx.rng),
    )?;

    apply(ctx, Task::Similarity, &Mse, scores, labels)
}

fn labels_of(labels: &Option<Array1<f32>>) -> Result<&Array1<f32>> {
    labels
        .as_ref()
        .ok_or(TrainErr::Ml(MlErr::InvalidInput("training batches must be labeled")))
}

/// Summed loss over the nominal batch size, backward pass and one optimizer step.
fn apply<E: Encoder, L: LossFn>(
    ctx: &mut StepContext<'_, E>,
    task: Task,
    loss_fn: &L,
    output: Array2<f32>,
    labels: &Array1<f32>,
) -> Result<f32> {
    let scale = 1.0 / ctx.batch_size as f32;

    let loss = loss_fn.loss(output.view(), labels.view())? * scale;
    let d = loss_fn.loss_prime(output.view(), labels.view())? * scale;

    ctx.model.backward(task.head(), d)?;
    ctx.model.optimize(ctx.optimizer)?;

    Ok(loss)
}

#[cfg(test)]
mod tests {
    use machine_learning::{
        arch::{HeadsConfig, PoolingEncoder, TrainMode},
        optimization::GradientDescent,
    };
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    use super::*;
    use crate::data::Collate;

    fn model() -> MultitaskModel<PoolingEncoder> {
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        let encoder = PoolingEncoder::new(20, 6, 16);
        let trunk = encoder.init_params(&mut rng).unwrap();
        let config = HeadsConfig {
            num_sentiment_classes: 5,
            dropout: 0.0,
            sep_token_id: 1,
        };
        MultitaskModel::new(encoder, trunk, config, TrainMode::Finetune, &mut rng).unwrap()
    }

    fn sentences(labels: &[Option<u8>]) -> Vec<SentenceExample> {
        labels
            .iter()
            .enumerate()
            .map(|(i, &label)| SentenceExample {
                id: format!("s{i}"),
                token_ids: vec![2 + i as u32, 3],
                label,
            })
            .collect()
    }

    fn pairs(labels: &[f32]) -> Vec<PairExample> {
        labels
            .iter()
            .enumerate()
            .map(|(i, &label)| PairExample {
                id: format!("p{i}"),
                token_ids_1: vec![4, 5 + i as u32],
                token_ids_2: vec![6],
                label: Some(label),
            })
            .collect()
    }

    fn sentiment_loss(batch_size: usize) -> f32 {
        let mut model = model();
        let mut optimizer = GradientDescent::new(0.0);
        let mut rng = ChaCha8Rng::seed_from_u64(0);
        let mut ctx = StepContext {
            model: &mut model,
            optimizer: &mut optimizer,
            rng: &mut rng,
            batch_size,
        };

        let examples = sentences(&[Some(4), Some(0)]);
        let batch = SentenceExample::collate(&examples.iter().collect::<Vec<_>>(), 0);
        step_sentiment(&mut ctx, &batch).unwrap()
    }

    #[test]
    fn losses_are_divided_by_the_nominal_batch_size() {
        let small = sentiment_loss(8);
        let large = sentiment_loss(4);

        assert!(small > 0.0);
        assert_eq!(large, 2.0 * small);
    }

    #[test]
    fn every_task_reports_a_finite_loss_and_updates_the_model() {
        let mut model = model();
        let mut optimizer = GradientDescent::new(0.1);
        let mut rng = ChaCha8Rng::seed_from_u64(0);
        let before = model.params().values().to_vec();

        let mut sources = TaskSources {
            sentiment: DataLoader::new(sentences(&[Some(1), Some(2), Some(3)]), 2, 0, false),
            paraphrase: DataLoader::new(pairs(&[1.0, 0.0]), 2, 0, false),
            similarity: DataLoader::new(pairs(&[4.5, 0.5, 2.0]), 2, 0, false),
        };

        let mut ctx = StepContext {
            model: &mut model,
            optimizer: &mut optimizer,
            rng: &mut rng,
            batch_size: 2,
        };

        for task in Task::ALL {
            let loss = task.step(&mut sources, &mut ctx).unwrap();
            assert!(loss.is_finite() && loss >= 0.0, "{task}: {loss}");
        }

        assert_ne!(model.params().values(), before.as_slice());
    }

    #[test]
    fn an_exhausted_source_is_an_error() {
        let mut model = model();
        let mut optimizer = GradientDescent::new(0.1);
        let mut rng = ChaCha8Rng::seed_from_u64(0);
        let mut sources = TaskSources {
            sentiment: DataLoader::new(sentences(&[Some(1)]), 2, 0, false),
            paraphrase: DataLoader::new(Vec::new(), 2, 0, false),
            similarity: DataLoader::new(Vec::new(), 2, 0, false),
        };
        let mut ctx = StepContext {
            model: &mut model,
            optimizer: &mut optimizer,
            rng: &mut rng,
            batch_size: 2,
        };

        Task::Sentiment.step(&mut sources, &mut ctx).unwrap();
        let err = Task::Sentiment.step(&mut sources, &mut ctx).unwrap_err();

        assert!(matches!(err, TrainErr::SourceExhausted { task: "sst" }));
    }

    #[test]
    fn unlabeled_batches_cannot_be_trained_on() {
        let mut model = model();
        let mut optimizer = GradientDescent::new(0.1);
        let mut rng = ChaCha8Rng::seed_from_u64(0);
        let mut ctx = StepContext {
            model: &mut model,
            optimizer: &mut optimizer,
            rng: &mut rng,
            batch_size: 2,
        };

        let examples = sentences(&[Some(1), None]);
        let batch = SentenceExample::collate(&examples.iter().collect::<Vec<_>>(), 0);

        assert!(step_sentiment(&mut ctx, &batch).is_err());
    }

    #[test]
    fn counts_follow_the_loaders() {
        let sources = TaskSources {
            sentiment: DataLoader::new(sentences(&[Some(0); 5]), 2, 0, true),
            paraphrase: DataLoader::new(pairs(&[1.0; 4]), 2, 0, true),
            similarity: DataLoader::new(Vec::new(), 2, 0, true),
        };

        assert_eq!(
            sources.counts(),
            [(Task::Sentiment, 3), (Task::Paraphrase, 2), (Task::Similarity, 0)]
        );
    }

    #[test]
    fn tasks_route_to_their_heads_and_losses() {
        assert_eq!(Task::Sentiment.head(), HeadKind::Sentiment);
        assert_eq!(Task::Paraphrase.loss_kind(), LossKind::BinaryCrossEntropyWithLogits);
        assert_eq!(Task::Similarity.loss_kind(), LossKind::MeanSquaredError);
    }
}
