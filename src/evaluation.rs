use log::debug;
use machine_learning::{
    MlErr,
    arch::{Encoder, MultitaskModel},
    metrics,
};
use ndarray::{Array1, Array2, ArrayView2, Axis};

use crate::{
    Result, TrainErr,
    data::{DataLoader, PairBatch, PairExample, SentenceBatch, SentenceExample},
    task::TaskSources,
};

/// Per-example predictions of one task, in the order the loader yielded them.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TaskPredictions<T> {
    pub ids: Vec<String>,
    pub predictions: Vec<T>,
}

impl<T> TaskPredictions<T> {
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    fn extend(&mut self, ids: Vec<String>, predictions: impl IntoIterator<Item = T>) {
        self.ids.extend(ids);
        self.predictions.extend(predictions);
    }
}

/// Predictions of the three heads over one split.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MultitaskPredictions {
    /// Sentiment class in `[0, num_sentiment_classes)`.
    pub sentiment: TaskPredictions<u8>,
    /// `1` when the pair is predicted to be a paraphrase.
    pub paraphrase: TaskPredictions<u8>,
    pub similarity: TaskPredictions<f32>,
}

/// Scores and predictions over a labeled split.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EvalReport {
    pub sentiment_accuracy: f32,
    pub paraphrase_accuracy: f32,
    pub similarity_correlation: f32,
    pub predictions: MultitaskPredictions,
}

impl EvalReport {
    /// Unweighted mean of the three scores.
    pub fn aggregate(&self) -> f32 {
        (self.sentiment_accuracy + self.paraphrase_accuracy + self.similarity_correlation) / 3.0
    }
}

/// Gold labels collected next to the predictions.
#[derive(Debug, Default)]
struct Golds {
    sentiment: Vec<u8>,
    paraphrase: Vec<u8>,
    similarity: Vec<f32>,
}

/// Runs the three heads over labeled splits in evaluation mode and scores them.
///
/// Sentiment and paraphrase are scored by accuracy, similarity by Pearson correlation.
///
/// # Errors
/// Model errors, or `MlErr::InvalidInput` when a split has unlabeled examples.
pub fn evaluate_multitask<E: Encoder>(
    model: &mut MultitaskModel<E>,
    splits: &mut TaskSources,
) -> Result<EvalReport> {
    let mut golds = Golds::default();
    let predictions = run_heads(model, splits, Some(&mut golds))?;

    let report = EvalReport {
        sentiment_accuracy: metrics::accuracy(&predictions.sentiment.predictions, &golds.sentiment),
        paraphrase_accuracy: metrics::accuracy(
            &predictions.paraphrase.predictions,
            &golds.paraphrase,
        ),
        similarity_correlation: metrics::pearson(
            &predictions.similarity.predictions,
            &golds.similarity,
        ),
        predictions,
    };

    debug!(
        sst = report.sentiment_accuracy,
        para = report.paraphrase_accuracy,
        sts = report.similarity_correlation;
        "evaluated dev splits"
    );

    Ok(report)
}

/// Runs the three heads over splits that may be unlabeled.
pub fn predict_multitask<E: Encoder>(
    model: &mut MultitaskModel<E>,
    splits: &mut TaskSources,
) -> Result<MultitaskPredictions> {
    run_heads(model, splits, None)
}

fn run_heads<E: Encoder>(
    model: &mut MultitaskModel<E>,
    splits: &mut TaskSources,
    mut golds: Option<&mut Golds>,
) -> Result<MultitaskPredictions> {
    let mut out = MultitaskPredictions::default();

    for batch in batches(&mut splits.sentiment) {
        let logits = model.predict_sentiment(batch.token_ids.view(), batch.mask.view(), None)?;
        if let Some(golds) = golds.as_deref_mut() {
            golds.sentiment.extend(required(&batch.labels)?.iter().map(|&y| y as u8));
        }
        out.sentiment.extend(batch.ids, argmax(&logits));
    }

    for batch in pair_batches(&mut splits.paraphrase) {
        let logits = model.predict_paraphrase(first(&batch), second(&batch), None)?;
        if let Some(golds) = golds.as_deref_mut() {
            golds.paraphrase.extend(required(&batch.labels)?.iter().map(|&y| y as u8));
        }

        let predicted = logits.iter().map(|&z| u8::from(sigmoid(z) > 0.5)).collect::<Vec<_>>();
        out.paraphrase.extend(batch.ids, predicted);
    }

    for batch in pair_batches(&mut splits.similarity) {
        let scores = model.predict_similarity(first(&batch), second(&batch), None)?;
        if let Some(golds) = golds.as_deref_mut() {
            golds.similarity.extend(required(&batch.labels)?.iter().copied());
        }
        out.similarity.extend(batch.ids, scores.iter().copied().collect::<Vec<_>>());
    }

    Ok(out)
}

fn batches(loader: &mut DataLoader<SentenceExample>) -> impl Iterator<Item = SentenceBatch> + '_ {
    loader.reset();
    std::iter::from_fn(move || loader.next_batch())
}

fn pair_batches(loader: &mut DataLoader<PairExample>) -> impl Iterator<Item = PairBatch> + '_ {
    loader.reset();
    std::iter::from_fn(move || loader.next_batch())
}

type Side<'a> = (ArrayView2<'a, u32>, ArrayView2<'a, bool>);

fn first(batch: &PairBatch) -> Side<'_> {
    (batch.token_ids_1.view(), batch.mask_1.view())
}

fn second(batch: &PairBatch) -> Side<'_> {
    (batch.token_ids_2.view(), batch.mask_2.view())
}

fn required(labels: &Option<Array1<f32>>) -> Result<&Array1<f32>> {
    labels
        .as_ref()
        .ok_or(TrainErr::Ml(MlErr::InvalidInput("evaluation splits must be labeled")))
}

fn argmax(logits: &Array2<f32>) -> Vec<u8> {
    logits
        .axis_iter(Axis(0))
        .map(|row| {
            row.iter()
                .enumerate()
                .fold((0, f32::NEG_INFINITY), |best, (i, &v)| {
                    if v > best.1 { (i, v) } else { best }
                })
                .0 as u8
        })
        .collect()
}

fn sigmoid(z: f32) -> f32 {
    1.0 / (1.0 + (-z).exp())
}

#[cfg(test)]
mod tests {
    use ndarray::array;

    use super::*;

    #[test]
    fn argmax_picks_the_first_highest_score() {
        let logits = array![[0.0, 3.0, 1.0, 3.0, -1.0], [9.0, 0.0, 0.0, 0.0, 0.0]];
        assert_eq!(argmax(&logits), vec![1, 0]);
    }

    #[test]
    fn aggregate_is_the_mean_of_three_scores() {
        let report = EvalReport {
            sentiment_accuracy: 0.5,
            paraphrase_accuracy: 1.0,
            similarity_correlation: -0.3,
            ..Default::default()
        };

        assert!((report.aggregate() - 0.4).abs() < 1e-6);
    }

    #[test]
    fn a_half_probability_is_not_a_paraphrase() {
        assert!(sigmoid(0.0) <= 0.5);
        assert!(sigmoid(0.01) > 0.5);
    }
}
