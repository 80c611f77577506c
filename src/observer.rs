use log::{debug, info};

use crate::task::Task;

/// Reported after every scheduled step.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StepEvent {
    pub epoch: usize,
    /// 0-based index within the epoch.
    pub step: usize,
    pub total_steps: usize,
    pub task: Task,
    pub loss: f32,
}

/// Reported after evaluation and checkpoint selection of every epoch.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EpochEvent {
    pub epoch: usize,
    pub train_loss: f32,
    pub sentiment_accuracy: f32,
    pub paraphrase_accuracy: f32,
    pub similarity_correlation: f32,
    pub aggregate: f32,
    pub improved: bool,
}

/// Progress callbacks of a training run. Both default to doing nothing.
pub trait TrainObserver {
    fn on_step(&mut self, _event: &StepEvent) {}

    fn on_epoch(&mut self, _event: &EpochEvent) {}
}

/// Silent observer.
impl TrainObserver for () {}

/// Reports progress through the `log` facade.
#[derive(Debug, Clone)]
pub struct LogObserver {
    every: usize,
}

impl LogObserver {
    /// Creates a new `LogObserver` logging one step out of `every` (and the last one).
    pub fn new(every: usize) -> Self {
        Self {
            every: every.max(1),
        }
    }
}

impl TrainObserver for LogObserver {
    fn on_step(&mut self, event: &StepEvent) {
        let done = event.step + 1;
        if done % self.every != 0 && done != event.total_steps {
            return;
        }

        debug!(
            epoch = event.epoch, task = event.task.name(), loss = event.loss;
            "step {done}/{}", event.total_steps
        );
    }

    fn on_epoch(&mut self, event: &EpochEvent) {
        info!(
            "epoch {}: train loss :: {:.3}, sst acc :: {:.3}, para acc :: {:.3}, sts corr :: {:.3}, dev aggregate :: {:.3}{}",
            event.epoch,
            event.train_loss,
            event.sentiment_accuracy,
            event.paraphrase_accuracy,
            event.similarity_correlation,
            event.aggregate,
            if event.improved { " (new best)" } else { "" },
        );
    }
}
