use log::{info, warn};
use machine_learning::{
    arch::{Encoder, HeadsConfig, MultitaskModel, PoolingEncoder},
    optimization::{Optimizer, OptimizerBuilder},
};

use crate::{
    Result, TrainErr,
    checkpoint::{CheckpointSelector, TrainingState},
    config::TrainConfig,
    evaluation::{EvalReport, evaluate_multitask, predict_multitask},
    observer::{EpochEvent, StepEvent, TrainObserver},
    predictions::{PARAPHRASE_COLUMN, SENTIMENT_COLUMN, SIMILARITY_COLUMN, write_predictions},
    rng::RngStates,
    schedule::Epoch,
    task::{StepContext, TaskSources},
};

/// Trains the three tasks together, one randomly interleaved schedule per epoch, keeping the
/// checkpoint with the best dev aggregate.
pub struct MultitaskTrainer<E: Encoder> {
    config: TrainConfig,
    model: MultitaskModel<E>,
    optimizer: Box<dyn Optimizer>,
    rngs: RngStates,
    train: TaskSources,
    dev: TaskSources,
    selector: CheckpointSelector,
    epoch: usize,
}

impl MultitaskTrainer<PoolingEncoder> {
    /// Loads the train and dev splits named by `config` and builds a fresh model.
    pub fn from_config(config: TrainConfig) -> Result<Self> {
        config.validate()?;

        let data = &config.data;
        let (batch_size, pad) = (config.batch_size, config.encoder.pad_token_id);
        let train = TaskSources::load(
            [&data.sst_train, &data.para_train, &data.sts_train].map(|p| p.as_path()),
            batch_size,
            pad,
            true,
        )?;
        let dev = TaskSources::load(
            [&data.sst_dev, &data.para_dev, &data.sts_dev].map(|p| p.as_path()),
            batch_size,
            pad,
            false,
        )?;

        let mut rngs = RngStates::from_seed(config.seed);
        let (encoder, trunk) = build_encoder(&config, &mut rngs)?;
        Self::new(config, encoder, trunk, rngs, train, dev)
    }
}

impl<E: Encoder> MultitaskTrainer<E> {
    /// Creates a new `MultitaskTrainer`.
    ///
    /// # Arguments
    /// * `config` - The run's configuration.
    /// * `encoder` - The shared encoder.
    /// * `trunk` - The encoder's initial parameters.
    /// * `rngs` - The run's random sources, heads are initialized from `rngs.dropout`.
    /// * `train` - Shuffling training loaders.
    /// * `dev` - Labeled loaders scored after every epoch.
    pub fn new(
        config: TrainConfig,
        encoder: E,
        trunk: Vec<f32>,
        mut rngs: RngStates,
        train: TaskSources,
        dev: TaskSources,
    ) -> Result<Self> {
        config.validate()?;

        let model = MultitaskModel::new(
            encoder,
            trunk,
            heads_config(&config),
            config.option,
            &mut rngs.dropout,
        )?;
        let optimizer =
            OptimizerBuilder::new().build(config.optimizer, config.lr, model.trainable_len());

        info!(
            "training {} of {} parameters ({:?})",
            model.trainable_len(),
            model.params().values().len(),
            config.option
        );

        Ok(Self {
            selector: CheckpointSelector::new(config.checkpoint_path()),
            config,
            model,
            optimizer,
            rngs,
            train,
            dev,
            epoch: 0,
        })
    }

    /// Picks a run back up from a checkpoint: parameters, optimizer, random sources, best
    /// metric and epoch counter all continue where they were saved.
    pub fn resume(
        state: TrainingState,
        encoder: E,
        train: TaskSources,
        dev: TaskSources,
    ) -> Result<Self> {
        let config = state.config;
        config.validate()?;

        let model = MultitaskModel::with_params(
            encoder,
            state.parameters,
            heads_config(&config),
            config.option,
        )?;
        let mut optimizer =
            OptimizerBuilder::new().build(config.optimizer, config.lr, model.trainable_len());
        optimizer.load_state(state.optimizer)?;

        info!(epoch = state.epoch, best = state.best_metric; "resuming training");

        Ok(Self {
            selector: CheckpointSelector::with_best(config.checkpoint_path(), state.best_metric),
            rngs: RngStates::restore(&state.rng),
            config,
            model,
            optimizer,
            train,
            dev,
            epoch: state.epoch,
        })
    }

    pub fn config(&self) -> &TrainConfig {
        &self.config
    }

    pub fn model(&self) -> &MultitaskModel<E> {
        &self.model
    }

    /// Completed epochs.
    pub fn epoch(&self) -> usize {
        self.epoch
    }

    pub fn best_metric(&self) -> f32 {
        self.selector.best()
    }

    /// The state a checkpoint taken right now would hold.
    pub fn state(&self) -> TrainingState {
        snapshot(
            &self.config,
            &self.model,
            self.optimizer.as_ref(),
            &self.rngs,
            self.selector.best(),
            self.epoch,
        )
    }

    /// Runs every remaining epoch.
    ///
    /// # Returns
    /// The best dev aggregate seen.
    pub fn train(&mut self, observer: &mut dyn TrainObserver) -> Result<f32> {
        while self.epoch < self.config.epochs {
            self.train_epoch(observer)?;
        }

        Ok(self.selector.best())
    }

    /// Runs one epoch: build the schedule, drain it, score the dev splits and checkpoint on
    /// improvement.
    pub fn train_epoch(&mut self, observer: &mut dyn TrainObserver) -> Result<EpochEvent> {
        self.train.start_epoch(&mut self.rngs.data);

        let mut epoch = Epoch::new();
        epoch.build(&self.train.counts(), &mut self.rngs.schedule);
        let total_steps = epoch.len();

        let mut ctx = StepContext {
            model: &mut self.model,
            optimizer: self.optimizer.as_mut(),
            rng: &mut self.rngs.dropout,
            batch_size: self.config.batch_size,
        };

        while let Some(task) = epoch.next_task() {
            let step = epoch.steps();
            let loss = task.step(&mut self.train, &mut ctx)?;
            if !loss.is_finite() {
                return Err(TrainErr::NonFiniteLoss {
                    task: task.name(),
                    step,
                });
            }

            epoch.record(loss);
            observer.on_step(&StepEvent {
                epoch: self.epoch,
                step,
                total_steps,
                task,
                loss,
            });
        }

        let report = evaluate_multitask(&mut self.model, &mut self.dev)?;
        let aggregate = report.aggregate();
        self.epoch += 1;

        let improved = self.selector.consider(aggregate, || {
            snapshot(
                &self.config,
                &self.model,
                self.optimizer.as_ref(),
                &self.rngs,
                aggregate,
                self.epoch,
            )
        })?;

        let event = EpochEvent {
            epoch: self.epoch - 1,
            train_loss: epoch.mean_loss(),
            sentiment_accuracy: report.sentiment_accuracy,
            paraphrase_accuracy: report.paraphrase_accuracy,
            similarity_correlation: report.similarity_correlation,
            aggregate,
            improved,
        };
        observer.on_epoch(&event);

        Ok(event)
    }
}

fn snapshot<E: Encoder>(
    config: &TrainConfig,
    model: &MultitaskModel<E>,
    optimizer: &dyn Optimizer,
    rngs: &RngStates,
    best_metric: f32,
    epoch: usize,
) -> TrainingState {
    TrainingState {
        parameters: model.params().values().to_vec(),
        optimizer: optimizer.state(),
        rng: rngs.snapshot(),
        config: config.clone(),
        best_metric,
        epoch,
    }
}

fn heads_config(config: &TrainConfig) -> HeadsConfig {
    HeadsConfig {
        num_sentiment_classes: config.num_sentiment_classes,
        dropout: config.hidden_dropout_prob,
        sep_token_id: config.encoder.sep_token_id,
    }
}

/// Builds the encoder described by `config`, with pretrained weights when it names some and a
/// seeded initialization otherwise.
pub fn build_encoder(
    config: &TrainConfig,
    rngs: &mut RngStates,
) -> Result<(PoolingEncoder, Vec<f32>)> {
    let enc = &config.encoder;
    let encoder = PoolingEncoder::new(enc.vocab_size, enc.hidden_size, enc.max_len);

    let trunk = match &enc.weights {
        Some(path) => encoder.load_pretrained(path)?,
        None => {
            warn!("no pretrained encoder weights configured, starting from a random encoder");
            encoder.init_params(&mut rngs.dropout)?
        }
    };

    Ok((encoder, trunk))
}

/// Loads the best checkpoint and writes dev and test predictions for the three tasks.
///
/// The model is rebuilt from the checkpointed configuration; data and output paths come from
/// `config`.
///
/// # Returns
/// The dev report.
///
/// # Errors
/// `TrainErr::MissingCheckpoint` if training never saved a checkpoint.
pub fn run_test(config: &TrainConfig) -> Result<EvalReport> {
    let path = config.checkpoint_path();
    let state = TrainingState::load(&path)?;
    let saved = &state.config;

    let enc = &saved.encoder;
    let mut model = MultitaskModel::with_params(
        PoolingEncoder::new(enc.vocab_size, enc.hidden_size, enc.max_len),
        state.parameters,
        heads_config(saved),
        saved.option,
    )?;
    info!("loaded model to test from {}", path.display());

    let data = &config.data;
    let (batch_size, pad) = (config.batch_size, enc.pad_token_id);
    let mut dev = TaskSources::load(
        [&data.sst_dev, &data.para_dev, &data.sts_dev].map(|p| p.as_path()),
        batch_size,
        pad,
        false,
    )?;
    let mut test = TaskSources::load(
        [&data.sst_test, &data.para_test, &data.sts_test].map(|p| p.as_path()),
        batch_size,
        pad,
        false,
    )?;

    let report = evaluate_multitask(&mut model, &mut dev)?;
    info!(
        "dev sentiment acc :: {:.3}, dev paraphrase acc :: {:.3}, dev sts corr :: {:.3}",
        report.sentiment_accuracy, report.paraphrase_accuracy, report.similarity_correlation
    );

    let out = &config.outputs;
    let dev_predictions = &report.predictions;
    write_predictions(&out.sst_dev_out, SENTIMENT_COLUMN, &dev_predictions.sentiment)?;
    write_predictions(&out.para_dev_out, PARAPHRASE_COLUMN, &dev_predictions.paraphrase)?;
    write_predictions(&out.sts_dev_out, SIMILARITY_COLUMN, &dev_predictions.similarity)?;

    let test_predictions = predict_multitask(&mut model, &mut test)?;
    write_predictions(&out.sst_test_out, SENTIMENT_COLUMN, &test_predictions.sentiment)?;
    write_predictions(&out.para_test_out, PARAPHRASE_COLUMN, &test_predictions.paraphrase)?;
    write_predictions(&out.sts_test_out, SIMILARITY_COLUMN, &test_predictions.similarity)?;

    Ok(report)
}
