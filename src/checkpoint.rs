use std::{
    collections::HashMap,
    fs, io,
    path::{Path, PathBuf},
};

use log::info;
use machine_learning::optimization::OptimizerState;
use safetensors::{Dtype, SafeTensors, tensor::TensorView};

use crate::{Result, TrainErr, config::TrainConfig, rng::RngStatesSnapshot};

pub const FORMAT: &str = "multitask-bert/1";

const PARAMETERS: &str = "parameters";
const OPTIMIZER_PREFIX: &str = "optimizer.";

const META_FORMAT: &str = "format";
const META_CONFIG: &str = "config";
const META_OPTIMIZER: &str = "optimizer";
const META_RNG: &str = "rng";
const META_BEST: &str = "best_metric";
const META_EPOCH: &str = "epoch";

/// Everything needed to resume a run or to predict with its model.
#[derive(Debug, Clone, PartialEq)]
pub struct TrainingState {
    pub parameters: Vec<f32>,
    pub optimizer: OptimizerState,
    pub rng: RngStatesSnapshot,
    pub config: TrainConfig,
    pub best_metric: f32,
    /// Number of completed epochs.
    pub epoch: usize,
}

impl TrainingState {
    /// Writes the state as a single safetensors file, creating parent directories as needed.
    ///
    /// Parameters and optimizer buffers are stored as `f32` tensors, everything else as JSON
    /// metadata.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();

        let mut buffers: Vec<(String, Vec<u8>, usize)> = Vec::new();
        let mut push = |name: String, values: &[f32]| {
            buffers.push((name, bytemuck::cast_slice::<f32, u8>(values).to_vec(), values.len()));
        };

        push(PARAMETERS.to_string(), &self.parameters);
        for (slot, values) in &self.optimizer.slots {
            push(format!("{OPTIMIZER_PREFIX}{slot}"), values);
        }

        let mut views = Vec::with_capacity(buffers.len());
        for (name, data, len) in &buffers {
            views.push((name.as_str(), TensorView::new(Dtype::F32, vec![*len], data)?));
        }

        let metadata = HashMap::from([
            (META_FORMAT.to_string(), FORMAT.to_string()),
            (META_CONFIG.to_string(), serde_json::to_string(&self.config)?),
            (META_OPTIMIZER.to_string(), serde_json::to_string(&self.optimizer)?),
            (META_RNG.to_string(), serde_json::to_string(&self.rng)?),
            (META_BEST.to_string(), self.best_metric.to_string()),
            (META_EPOCH.to_string(), self.epoch.to_string()),
        ]);

        let serialized = safetensors::serialize(views, &Some(metadata))?;

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, serialized)?;

        info!("saved checkpoint to {}", path.display());
        Ok(())
    }

    /// Reads a state written by `save`.
    ///
    /// # Errors
    /// `TrainErr::MissingCheckpoint` if there is no file at `path`, `TrainErr::Checkpoint` if it
    /// is not a valid checkpoint.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let bytes = fs::read(path).map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => TrainErr::MissingCheckpoint {
                path: path.to_path_buf(),
            },
            _ => TrainErr::Io(e),
        })?;

        let (_, header) = SafeTensors::read_metadata(&bytes)?;
        let metadata = header
            .metadata()
            .as_ref()
            .ok_or_else(|| TrainErr::Checkpoint("checkpoint has no metadata".into()))?;

        let field = |key: &str| {
            metadata
                .get(key)
                .ok_or_else(|| TrainErr::Checkpoint(format!("checkpoint is missing '{key}'")))
        };

        let format = field(META_FORMAT)?;
        if format != FORMAT {
            return Err(TrainErr::Checkpoint(format!(
                "unsupported checkpoint format '{format}'"
            )));
        }

        let config: TrainConfig = serde_json::from_str(field(META_CONFIG)?)?;
        let mut optimizer: OptimizerState = serde_json::from_str(field(META_OPTIMIZER)?)?;
        let rng: RngStatesSnapshot = serde_json::from_str(field(META_RNG)?)?;
        let best_metric = field(META_BEST)?
            .parse::<f32>()
            .map_err(|_| TrainErr::Checkpoint("best_metric is not a number".into()))?;
        let epoch = field(META_EPOCH)?
            .parse::<usize>()
            .map_err(|_| TrainErr::Checkpoint("epoch is not a number".into()))?;

        let tensors = SafeTensors::deserialize(&bytes)?;
        let mut parameters = None;
        for (name, view) in tensors.tensors() {
            if view.dtype() != Dtype::F32 {
                return Err(TrainErr::Checkpoint(format!("tensor '{name}' is not f32")));
            }

            let values = read_f32(view.data());
            if name == PARAMETERS {
                parameters = Some(values);
            } else if let Some(slot) = name.strip_prefix(OPTIMIZER_PREFIX) {
                optimizer.slots.insert(slot.to_string(), values);
            }
        }

        let parameters = parameters
            .ok_or_else(|| TrainErr::Checkpoint("checkpoint has no parameters".into()))?;

        info!("loaded checkpoint from {}", path.display());
        Ok(Self {
            parameters,
            optimizer,
            rng,
            config,
            best_metric,
            epoch,
        })
    }
}

fn read_f32(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(bytemuck::pod_read_unaligned::<f32>)
        .collect()
}

/// Persists the training state whenever the aggregate validation metric strictly improves.
#[derive(Debug, Clone)]
pub struct CheckpointSelector {
    path: PathBuf,
    best: f32,
}

impl CheckpointSelector {
    /// Creates a new `CheckpointSelector` that has seen nothing yet.
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self::with_best(path, f32::NEG_INFINITY)
    }

    /// Creates a selector that only saves when `best` is beaten, e.g. after resuming.
    pub fn with_best<P: Into<PathBuf>>(path: P, best: f32) -> Self {
        Self {
            path: path.into(),
            best,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn best(&self) -> f32 {
        self.best
    }

    /// Saves the state produced by `state` if `metric` beats the best seen so far.
    ///
    /// # Arguments
    /// * `metric` - This epoch's aggregate metric.
    /// * `state` - Builds the state to persist, only called on improvement.
    ///
    /// # Returns
    /// Whether a checkpoint was written.
    pub fn consider<F>(&mut self, metric: f32, state: F) -> Result<bool>
    where
        F: FnOnce() -> TrainingState,
    {
        if !(metric > self.best) {
            return Ok(false);
        }

        let mut state = state();
        state.best_metric = metric;
        state.save(&self.path)?;

        info!(previous = self.best, best = metric; "aggregate metric improved");
        self.best = metric;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use rand::Rng;

    use super::*;
    use crate::{rng::RngStates, schedule::Epoch, task::Task};

    fn state(rng: &RngStates) -> TrainingState {
        TrainingState {
            parameters: vec![0.25, -1.5, 3.0, f32::MIN_POSITIVE],
            optimizer: OptimizerState {
                kind: "adamw".into(),
                step: 12,
                slots: BTreeMap::from([
                    ("exp_avg".to_string(), vec![0.1, 0.2, 0.3, 0.4]),
                    ("exp_avg_sq".to_string(), vec![1.0, 2.0, 3.0, 4.0]),
                ]),
            },
            rng: rng.snapshot(),
            config: TrainConfig::default(),
            best_metric: 0.42,
            epoch: 3,
        }
    }

    #[test]
    fn round_trip_preserves_everything() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/run.safetensors");
        let saved = state(&RngStates::from_seed(1));

        saved.save(&path).unwrap();
        let loaded = TrainingState::load(&path).unwrap();

        assert_eq!(loaded, saved);
    }

    #[test]
    fn restored_rng_gives_the_same_next_schedule() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run.safetensors");
        let counts = [(Task::Sentiment, 4), (Task::Paraphrase, 6), (Task::Similarity, 2)];

        let mut rngs = RngStates::from_seed(11711);
        let _: u64 = rngs.schedule.random();
        state(&rngs).save(&path).unwrap();

        let mut expected = Epoch::new();
        expected.build(&counts, &mut rngs.schedule);

        let mut restored = RngStates::restore(&TrainingState::load(&path).unwrap().rng);
        let mut got = Epoch::new();
        got.build(&counts, &mut restored.schedule);

        assert_eq!(got.schedule(), expected.schedule());
    }

    #[test]
    fn loading_nothing_is_a_missing_checkpoint() {
        let dir = tempfile::tempdir().unwrap();
        let err = TrainingState::load(dir.path().join("never-saved.safetensors")).unwrap_err();

        assert!(matches!(err, TrainErr::MissingCheckpoint { .. }));
    }

    #[test]
    fn garbage_is_an_invalid_checkpoint() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("garbage.safetensors");
        fs::write(&path, b"definitely not safetensors").unwrap();

        assert!(matches!(TrainingState::load(&path), Err(TrainErr::Checkpoint(_))));
    }

    #[test]
    fn only_strict_improvements_are_saved() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("best.safetensors");
        let rngs = RngStates::from_seed(0);
        let mut selector = CheckpointSelector::new(&path);

        assert!(selector.consider(-0.2, || state(&rngs)).unwrap());
        assert!(selector.consider(0.5, || state(&rngs)).unwrap());
        assert!(!selector.consider(0.5, || state(&rngs)).unwrap());
        assert!(!selector.consider(0.1, || unreachable!()).unwrap());
        assert!(!selector.consider(f32::NAN, || unreachable!()).unwrap());

        assert_eq!(selector.best(), 0.5);
        assert_eq!(TrainingState::load(&path).unwrap().best_metric, 0.5);
    }

    #[test]
    fn nothing_is_written_without_improvement() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("best.safetensors");
        let mut selector = CheckpointSelector::with_best(&path, 0.9);

        assert!(!selector.consider(0.3, || unreachable!()).unwrap());
        assert!(!path.exists());
    }
}
