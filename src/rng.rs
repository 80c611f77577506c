//! The run's random number generators, all derived from one seed.

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

const DATA_STREAM: u64 = 0;
const SCHEDULE_STREAM: u64 = 1;
const DROPOUT_STREAM: u64 = 2;

/// Three independent streams of the same seed.
///
/// * `data` shuffles the training sets.
/// * `schedule` permutes the task schedule.
/// * `dropout` initializes weights and draws dropout masks.
#[derive(Debug, Clone, PartialEq)]
pub struct RngStates {
    pub data: ChaCha8Rng,
    pub schedule: ChaCha8Rng,
    pub dropout: ChaCha8Rng,
}

impl RngStates {
    pub fn from_seed(seed: u64) -> Self {
        let stream = |id| {
            let mut rng = ChaCha8Rng::seed_from_u64(seed);
            rng.set_stream(id);
            rng
        };

        Self {
            data: stream(DATA_STREAM),
            schedule: stream(SCHEDULE_STREAM),
            dropout: stream(DROPOUT_STREAM),
        }
    }

    pub fn snapshot(&self) -> RngStatesSnapshot {
        RngStatesSnapshot {
            data: RngSnapshot::of(&self.data),
            schedule: RngSnapshot::of(&self.schedule),
            dropout: RngSnapshot::of(&self.dropout),
        }
    }

    pub fn restore(snapshot: &RngStatesSnapshot) -> Self {
        Self {
            data: snapshot.data.restore(),
            schedule: snapshot.schedule.restore(),
            dropout: snapshot.dropout.restore(),
        }
    }
}

/// The exact position of one generator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RngSnapshot {
    pub seed: [u8; 32],
    pub stream: u64,
    pub word_pos: u128,
}

impl RngSnapshot {
    pub fn of(rng: &ChaCha8Rng) -> Self {
        Self {
            seed: rng.get_seed(),
            stream: rng.get_stream(),
            word_pos: rng.get_word_pos(),
        }
    }

    pub fn restore(&self) -> ChaCha8Rng {
        let mut rng = ChaCha8Rng::from_seed(self.seed);
        rng.set_stream(self.stream);
        rng.set_word_pos(self.word_pos);
        rng
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RngStatesSnapshot {
    pub data: RngSnapshot,
    pub schedule: RngSnapshot,
    pub dropout: RngSnapshot,
}

#[cfg(test)]
mod tests {
    use rand::Rng;

    use super::*;

    #[test]
    fn streams_are_independent() {
        let mut states = RngStates::from_seed(5);

        let a: u64 = states.data.random();
        let b: u64 = states.schedule.random();
        let c: u64 = states.dropout.random();

        assert_ne!(a, b);
        assert_ne!(b, c);
    }

    #[test]
    fn same_seed_same_states() {
        assert_eq!(RngStates::from_seed(11711), RngStates::from_seed(11711));
    }

    #[test]
    fn restored_generators_continue_where_they_stopped() {
        let mut states = RngStates::from_seed(3);
        for _ in 0..17 {
            let _: u32 = states.schedule.random();
        }

        let json = serde_json::to_string(&states.snapshot()).unwrap();
        let snapshot: RngStatesSnapshot = serde_json::from_str(&json).unwrap();
        let mut restored = RngStates::restore(&snapshot);

        let expected: Vec<u64> = (0..8).map(|_| states.schedule.random()).collect();
        let got: Vec<u64> = (0..8).map(|_| restored.schedule.random()).collect();
        assert_eq!(got, expected);
    }
}
