use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use shards::{FeatureSpec, StalePolicy};

/// Whether a smaller or a bigger monitored value is an improvement.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MonitorMode {
    #[default]
    Min,
    Max,
}

/// The metric early stopping, learning rate reduction and checkpointing follow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    pub metric: String,
    pub mode: MonitorMode,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            metric: "val_loss".into(),
            mode: MonitorMode::Min,
        }
    }
}

/// The lookup table of one categorical column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    pub column: String,
    pub vocab: usize,
    pub dim: usize,
}

impl EmbeddingConfig {
    fn new(column: &str, vocab: usize, dim: usize) -> Self {
        Self {
            column: column.into(),
            vocab,
            dim,
        }
    }
}

/// Everything about a run besides the network's shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingConfig {
    pub raw_pattern: String,
    pub cache_dir: PathBuf,
    pub stale_policy: StalePolicy,
    pub batch_size: usize,
    /// Derived from the training shards' row counts when absent.
    pub steps_per_epoch: Option<usize>,
    /// Derived from the validation shards' row counts when absent.
    pub validation_steps: Option<usize>,
    pub epochs: usize,
    pub valid_fraction: f64,
    pub split_seed: u64,
    pub seed: u64,
    /// Amount of batches loaded ahead on a background thread, 0 disables it.
    pub prefetch: usize,

    pub monitor: MonitorConfig,
    pub min_delta: f64,
    pub early_stopping_patience: usize,
    pub lr_patience: usize,
    pub lr_factor: f32,
    pub min_lr: f32,

    pub checkpoint: PathBuf,
    pub resume_from: Option<PathBuf>,
    pub log_file: PathBuf,
    pub metrics_dir: PathBuf,

    pub features: FeatureSpec,
    pub embeddings: Vec<EmbeddingConfig>,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            raw_pattern: "../data/dmt_train_raw/*.csv.gz".into(),
            cache_dir: "cache2/train".into(),
            stale_policy: StalePolicy::default(),
            batch_size: 50_000,
            steps_per_epoch: None,
            validation_steps: None,
            epochs: 10_000,
            valid_fraction: 0.2,
            split_seed: 42,
            seed: 0,
            prefetch: 0,

            monitor: MonitorConfig::default(),
            min_delta: 1e-8,
            early_stopping_patience: 3,
            lr_patience: 2,
            lr_factor: 0.1,
            min_lr: 0.,

            checkpoint: "weights/best_weights.safetensors".into(),
            resume_from: None,
            log_file: "train.log".into(),
            metrics_dir: "logs".into(),

            features: FeatureSpec::default(),
            embeddings: vec![
                EmbeddingConfig::new("app", 1024, 8),
                EmbeddingConfig::new("device", 4096, 8),
                EmbeddingConfig::new("os", 1024, 8),
                EmbeddingConfig::new("channel", 512, 8),
                EmbeddingConfig::new("hour", 24, 4),
                EmbeddingConfig::new("dayofweek", 7, 2),
            ],
        }
    }
}
