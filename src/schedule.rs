use rand::{Rng, seq::SliceRandom};

use crate::task::Task;

/// Where an epoch stands.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum EpochPhase {
    /// The schedule has not been drawn yet.
    #[default]
    Build,
    /// Scheduled steps remain.
    Drain,
    Done,
}

/// One epoch of interleaved training: a random permutation of every task's batches, drained in
/// order while losses are accumulated.
#[derive(Debug, Clone, Default)]
pub struct Epoch {
    phase: EpochPhase,
    schedule: Vec<Task>,
    cursor: usize,
    loss_sum: f64,
}

impl Epoch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Draws the schedule: `count` copies of each task, uniformly permuted.
    ///
    /// # Arguments
    /// * `counts` - How many batches each task has this epoch.
    /// * `rng` - The schedule's random source.
    pub fn build<R: Rng + ?Sized>(&mut self, counts: &[(Task, usize)], rng: &mut R) {
        let mut schedule: Vec<Task> = counts
            .iter()
            .flat_map(|&(task, count)| std::iter::repeat_n(task, count))
            .collect();
        schedule.shuffle(rng);

        self.schedule = schedule;
        self.cursor = 0;
        self.loss_sum = 0.0;
        self.phase = if self.schedule.is_empty() {
            EpochPhase::Done
        } else {
            EpochPhase::Drain
        };
    }

    pub fn phase(&self) -> EpochPhase {
        self.phase
    }

    pub fn schedule(&self) -> &[Task] {
        &self.schedule
    }

    /// Total number of scheduled steps.
    pub fn len(&self) -> usize {
        self.schedule.len()
    }

    pub fn is_empty(&self) -> bool {
        self.schedule.is_empty()
    }

    /// Steps taken so far.
    pub fn steps(&self) -> usize {
        self.cursor
    }

    /// How many times `task` is scheduled.
    pub fn occurrences(&self, task: Task) -> usize {
        self.schedule.iter().filter(|&&t| t == task).count()
    }

    /// Returns the task of the next step, `None` once the schedule is exhausted.
    pub fn next_task(&self) -> Option<Task> {
        match self.phase {
            EpochPhase::Drain => self.schedule.get(self.cursor).copied(),
            EpochPhase::Build | EpochPhase::Done => None,
        }
    }

    /// Records the loss of the step returned by `next_task` and moves on.
    pub fn record(&mut self, loss: f32) {
        if self.phase != EpochPhase::Drain {
            return;
        }

        self.loss_sum += loss as f64;
        self.cursor += 1;

        if self.cursor == self.schedule.len() {
            self.phase = EpochPhase::Done;
        }
    }

    /// Mean loss over the steps taken, `0` if none was.
    pub fn mean_loss(&self) -> f32 {
        if self.cursor == 0 {
            return 0.0;
        }

        (self.loss_sum / self.cursor as f64) as f32
    }
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    use super::*;

    const COUNTS: [(Task, usize); 3] = [
        (Task::Sentiment, 5),
        (Task::Paraphrase, 12),
        (Task::Similarity, 3),
    ];

    fn built(seed: u64) -> Epoch {
        let mut epoch = Epoch::new();
        epoch.build(&COUNTS, &mut ChaCha8Rng::seed_from_u64(seed));
        epoch
    }

    #[test]
    fn every_task_is_scheduled_its_batch_count() {
        let epoch = built(0);

        assert_eq!(epoch.len(), 5 + 12 + 3);
        for (task, count) in COUNTS {
            assert_eq!(epoch.occurrences(task), count);
        }
    }

    #[test]
    fn same_seed_same_schedule() {
        assert_eq!(built(11711).schedule(), built(11711).schedule());
        assert_ne!(built(1).schedule(), built(2).schedule());
    }

    #[test]
    fn tasks_are_interleaved() {
        let epoch = built(4);
        let switches = epoch
            .schedule()
            .windows(2)
            .filter(|pair| pair[0] != pair[1])
            .count();

        assert!(switches > 2);
    }

    #[test]
    fn phases_follow_the_schedule() {
        let mut epoch = Epoch::new();
        assert_eq!(epoch.phase(), EpochPhase::Build);
        assert_eq!(epoch.next_task(), None);

        let counts = [(Task::Sentiment, 1), (Task::Similarity, 1)];
        epoch.build(&counts, &mut ChaCha8Rng::seed_from_u64(0));
        assert_eq!(epoch.phase(), EpochPhase::Drain);

        epoch.record(1.0);
        assert_eq!(epoch.phase(), EpochPhase::Drain);
        epoch.record(2.0);
        assert_eq!(epoch.phase(), EpochPhase::Done);
        assert_eq!(epoch.next_task(), None);

        epoch.record(100.0);
        assert_eq!(epoch.steps(), 2);
        assert_eq!(epoch.mean_loss(), 1.5);
    }

    #[test]
    fn empty_epochs_are_done_immediately() {
        let mut epoch = Epoch::new();
        epoch.build(&[], &mut ChaCha8Rng::seed_from_u64(0));

        assert_eq!(epoch.phase(), EpochPhase::Done);
        assert_eq!(epoch.mean_loss(), 0.0);
    }
}
