use rand::{Rng, seq::SliceRandom};

use super::Collate;

/// Yields padded batches of its examples, each exactly once per epoch.
///
/// A shuffling loader draws a fresh order on every `start_epoch`; otherwise examples come out in
/// the order they were loaded.
#[derive(Debug, Clone)]
pub struct DataLoader<T> {
    examples: Vec<T>,
    order: Vec<usize>,
    batch_size: usize,
    pad_token_id: u32,
    shuffle: bool,
    cursor: usize,
}

impl<T: Collate> DataLoader<T> {
    /// Creates a new `DataLoader`.
    ///
    /// # Arguments
    /// * `examples` - The split's examples.
    /// * `batch_size` - The size of every batch but possibly the last one, at least 1.
    /// * `pad_token_id` - The token used to pad shorter sequences.
    /// * `shuffle` - Whether to reshuffle on every epoch.
    pub fn new(examples: Vec<T>, batch_size: usize, pad_token_id: u32, shuffle: bool) -> Self {
        Self {
            order: (0..examples.len()).collect(),
            examples,
            batch_size: batch_size.max(1),
            pad_token_id,
            shuffle,
            cursor: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.examples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.examples.is_empty()
    }

    /// The number of batches in one epoch.
    pub fn num_batches(&self) -> usize {
        self.examples.len().div_ceil(self.batch_size)
    }

    /// Rewinds to the first batch, reshuffling if this loader shuffles.
    ///
    /// The new order only depends on `rng`, not on previous epochs.
    pub fn start_epoch<R: Rng + ?Sized>(&mut self, rng: &mut R) {
        if self.shuffle {
            self.order.sort_unstable();
            self.order.shuffle(rng);
        }

        self.reset();
    }

    /// Rewinds to the first batch keeping the current order.
    pub fn reset(&mut self) {
        self.cursor = 0;
    }

    /// Returns the next unseen batch of the epoch, or `None` once every example was yielded.
    pub fn next_batch(&mut self) -> Option<T::Batch> {
        if self.cursor >= self.order.len() {
            return None;
        }

        let end = (self.cursor + self.batch_size).min(self.order.len());
        let examples: Vec<&T> = self.order[self.cursor..end]
            .iter()
            .map(|&i| &self.examples[i])
            .collect();

        self.cursor = end;
        Some(T::collate(&examples, self.pad_token_id))
    }
}
