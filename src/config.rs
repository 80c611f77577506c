use std::{
    fs,
    path::{Path, PathBuf},
};

use log::info;
use machine_learning::{arch::TrainMode, optimization::OptimizerConfig};
use serde::{Deserialize, Serialize};

use crate::{Result, TrainErr};

/// Where the three tasks' splits live.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DataPaths {
    pub sst_train: PathBuf,
    pub sst_dev: PathBuf,
    pub sst_test: PathBuf,
    pub para_train: PathBuf,
    pub para_dev: PathBuf,
    pub para_test: PathBuf,
    pub sts_train: PathBuf,
    pub sts_dev: PathBuf,
    pub sts_test: PathBuf,
}

impl Default for DataPaths {
    fn default() -> Self {
        Self {
            sst_train: "data/ids-sst-train.jsonl".into(),
            sst_dev: "data/ids-sst-dev.jsonl".into(),
            sst_test: "data/ids-sst-test-student.jsonl".into(),
            para_train: "data/quora-train.jsonl".into(),
            para_dev: "data/quora-dev.jsonl".into(),
            para_test: "data/quora-test-student.jsonl".into(),
            sts_train: "data/sts-train.jsonl".into(),
            sts_dev: "data/sts-dev.jsonl".into(),
            sts_test: "data/sts-test-student.jsonl".into(),
        }
    }
}

/// Where the prediction files are written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputPaths {
    pub sst_dev_out: PathBuf,
    pub sst_test_out: PathBuf,
    pub para_dev_out: PathBuf,
    pub para_test_out: PathBuf,
    pub sts_dev_out: PathBuf,
    pub sts_test_out: PathBuf,
}

impl Default for OutputPaths {
    fn default() -> Self {
        Self {
            sst_dev_out: "predictions/sst-dev-output.csv".into(),
            sst_test_out: "predictions/sst-test-output.csv".into(),
            para_dev_out: "predictions/para-dev-output.csv".into(),
            para_test_out: "predictions/para-test-output.csv".into(),
            sts_dev_out: "predictions/sts-dev-output.csv".into(),
            sts_test_out: "predictions/sts-test-output.csv".into(),
        }
    }
}

/// The shared encoder and the tokenizer ids it relies on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EncoderConfig {
    pub vocab_size: usize,
    pub hidden_size: usize,
    pub max_len: usize,
    pub sep_token_id: u32,
    pub pad_token_id: u32,
    /// Pretrained weights, a seeded random initialization is used when absent.
    pub weights: Option<PathBuf>,
}

impl Default for EncoderConfig {
    fn default() -> Self {
        Self {
            vocab_size: 30522,
            hidden_size: 768,
            max_len: 512,
            sep_token_id: 102,
            pad_token_id: 0,
            weights: None,
        }
    }
}

/// Everything a run is parameterized by.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainConfig {
    pub data: DataPaths,
    pub outputs: OutputPaths,
    pub checkpoint: Option<PathBuf>,
    pub option: TrainMode,
    pub seed: u64,
    pub epochs: usize,
    pub batch_size: usize,
    pub hidden_dropout_prob: f32,
    pub lr: f32,
    pub optimizer: OptimizerConfig,
    pub encoder: EncoderConfig,
    pub num_sentiment_classes: usize,
    pub log_every: usize,
}

impl Default for TrainConfig {
    fn default() -> Self {
        Self {
            data: DataPaths::default(),
            outputs: OutputPaths::default(),
            checkpoint: None,
            option: TrainMode::Pretrain,
            seed: 11711,
            epochs: 10,
            batch_size: 8,
            hidden_dropout_prob: 0.3,
            lr: 1e-5,
            optimizer: OptimizerConfig::default(),
            encoder: EncoderConfig::default(),
            num_sentiment_classes: 5,
            log_every: 50,
        }
    }
}

impl TrainConfig {
    /// Reads a configuration from a JSON file, missing fields take their defaults.
    ///
    /// # Errors
    /// `TrainErr::Io` / `TrainErr::Json` if the file cannot be read or parsed, and
    /// `TrainErr::InvalidConfig` if the values are out of range.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&content)?;
        config.validate()?;

        info!("loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Checks every value is within its range.
    pub fn validate(&self) -> Result<()> {
        let invalid = |msg: String| Err(TrainErr::InvalidConfig(msg));

        if !(0.0..1.0).contains(&self.hidden_dropout_prob) {
            return invalid(format!(
                "hidden_dropout_prob must be in [0, 1), got {}",
                self.hidden_dropout_prob
            ));
        }

        if !self.lr.is_finite() || self.lr <= 0.0 {
            return invalid(format!("lr must be positive, got {}", self.lr));
        }

        if self.epochs == 0 {
            return invalid("epochs must be at least 1".into());
        }

        if self.batch_size == 0 {
            return invalid("batch_size must be at least 1".into());
        }

        if self.num_sentiment_classes == 0 {
            return invalid("num_sentiment_classes must be at least 1".into());
        }

        if self.encoder.hidden_size == 0 || self.encoder.max_len < 3 {
            return invalid("the encoder needs a hidden size and room for a pair".into());
        }

        for (name, id) in [
            ("sep_token_id", self.encoder.sep_token_id),
            ("pad_token_id", self.encoder.pad_token_id),
        ] {
            if id as usize >= self.encoder.vocab_size {
                return invalid(format!(
                    "{name} {id} is outside a vocabulary of {}",
                    self.encoder.vocab_size
                ));
            }
        }

        Ok(())
    }

    /// The checkpoint location, derived from the run's options unless set explicitly.
    pub fn checkpoint_path(&self) -> PathBuf {
        if let Some(path) = &self.checkpoint {
            return path.clone();
        }

        let option = match self.option {
            TrainMode::Pretrain => "pretrain",
            TrainMode::Finetune => "finetune",
        };

        format!("{option}-{}-{}-multitask.safetensors", self.epochs, self.lr).into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_json_gives_defaults() {
        let config: TrainConfig = serde_json::from_str("{}").unwrap();

        assert_eq!(config, TrainConfig::default());
        assert_eq!(config.seed, 11711);
        assert_eq!(config.option, TrainMode::Pretrain);
        config.validate().unwrap();
    }

    #[test]
    fn partial_json_overrides_only_what_it_names() {
        let config: TrainConfig = serde_json::from_str(
            r#"{
                "option": "finetune",
                "lr": 0.001,
                "optimizer": { "kind": "gradient_descent" },
                "encoder": { "hidden_size": 16 }
            }"#,
        )
        .unwrap();

        assert_eq!(config.option, TrainMode::Finetune);
        assert_eq!(config.optimizer, OptimizerConfig::GradientDescent);
        assert_eq!(config.encoder.hidden_size, 16);
        assert_eq!(config.encoder.vocab_size, 30522);
        assert_eq!(config.batch_size, 8);
    }

    #[test]
    fn adamw_hyperparameters_default_individually() {
        let config: TrainConfig =
            serde_json::from_str(r#"{ "optimizer": { "kind": "adamw", "weight_decay": 0.01 } }"#)
                .unwrap();

        assert_eq!(
            config.optimizer,
            OptimizerConfig::Adamw {
                b1: 0.9,
                b2: 0.999,
                eps: 1e-6,
                weight_decay: 0.01
            }
        );
    }

    #[test]
    fn out_of_range_values_are_rejected() {
        let cases = [
            TrainConfig {
                hidden_dropout_prob: 1.0,
                ..Default::default()
            },
            TrainConfig {
                lr: 0.0,
                ..Default::default()
            },
            TrainConfig {
                epochs: 0,
                ..Default::default()
            },
            TrainConfig {
                batch_size: 0,
                ..Default::default()
            },
            TrainConfig {
                encoder: EncoderConfig {
                    vocab_size: 100,
                    ..Default::default()
                },
                ..Default::default()
            },
        ];

        for config in cases {
            assert!(matches!(config.validate(), Err(TrainErr::InvalidConfig(_))));
        }
    }

    #[test]
    fn checkpoint_name_follows_the_options() {
        let config = TrainConfig {
            option: TrainMode::Finetune,
            epochs: 3,
            lr: 0.5,
            ..Default::default()
        };
        assert_eq!(
            config.checkpoint_path(),
            PathBuf::from("finetune-3-0.5-multitask.safetensors")
        );

        let explicit = TrainConfig {
            checkpoint: Some("best.safetensors".into()),
            ..config
        };
        assert_eq!(explicit.checkpoint_path(), PathBuf::from("best.safetensors"));
    }
}
