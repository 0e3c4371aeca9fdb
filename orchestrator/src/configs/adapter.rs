use std::num::NonZeroUsize;

use machine_learning::arch::NetBuilder;
use shards::{BatchSource, Schema, ShardCache};

use super::{EmbeddingConfig, RunConfig, TrainingConfig};
use crate::error::{OrchestratorError, Result};

/// What a validated `RunConfig` turns into.
pub struct RunPlan {
    pub net: NetBuilder,
    pub source: BatchSource,
}

/// Validates run configs and turns them into the pieces a run is made of.
pub struct Adapter;

impl Adapter {
    pub fn new() -> Self {
        Self
    }

    /// Checks `config` and builds the network builder and batch source it describes.
    ///
    /// # Returns
    /// The run plan or `InvalidConfig` describing the first problem found.
    pub fn adapt(&self, config: &RunConfig) -> Result<RunPlan> {
        self.validate_model(config)?;
        self.validate_training(&config.training)?;

        let net = self.adapt_net(config)?;
        let source = self.adapt_source(&config.training)?;
        Ok(RunPlan { net, source })
    }

    // -------------------------------------------------------------------------
    // Validation
    // -------------------------------------------------------------------------

    fn validate_model(&self, config: &RunConfig) -> Result<()> {
        if let Some(i) = config.hidden_layers.iter().position(|&w| w == 0) {
            return Err(OrchestratorError::InvalidConfig(format!(
                "hidden layer {i} must have at least one unit"
            )));
        }

        if !(config.learning_rate.is_finite() && config.learning_rate > 0.) {
            return Err(OrchestratorError::InvalidConfig(format!(
                "learning_rate must be positive, got {}",
                config.learning_rate
            )));
        }

        Ok(())
    }

    fn validate_training(&self, training: &TrainingConfig) -> Result<()> {
        let positive = |name: &str, value: usize| match value {
            0 => Err(OrchestratorError::InvalidConfig(format!(
                "{name} must be greater than 0"
            ))),
            _ => Ok(()),
        };

        positive("batch_size", training.batch_size)?;
        positive("epochs", training.epochs)?;
        if let Some(steps) = training.steps_per_epoch {
            positive("steps_per_epoch", steps)?;
        }

        if !(training.valid_fraction > 0. && training.valid_fraction < 1.) {
            return Err(OrchestratorError::InvalidConfig(format!(
                "valid_fraction must be within (0, 1), got {}",
                training.valid_fraction
            )));
        }

        if !(training.lr_factor > 0. && training.lr_factor < 1.) {
            return Err(OrchestratorError::InvalidConfig(format!(
                "lr_factor must be within (0, 1), got {}",
                training.lr_factor
            )));
        }

        if !(training.min_delta >= 0.) || training.min_lr < 0. {
            return Err(OrchestratorError::InvalidConfig(
                "min_delta and min_lr can't be negative".into(),
            ));
        }

        let features = &training.features;
        if features.dense.is_empty() && features.categorical.is_empty() {
            return Err(OrchestratorError::InvalidConfig(
                "at least one dense or categorical feature is required".into(),
            ));
        }

        // Every categorical column needs exactly one usable embedding
        for column in &features.categorical {
            let embedding = self.embedding_of(training, column)?;
            if embedding.vocab == 0 || embedding.dim == 0 {
                return Err(OrchestratorError::InvalidConfig(format!(
                    "embedding of {column}: vocab and dim must be greater than 0"
                )));
            }
        }

        if let Some(unused) = training
            .embeddings
            .iter()
            .find(|e| !features.categorical.contains(&e.column))
        {
            return Err(OrchestratorError::InvalidConfig(format!(
                "embedding for {}, which is not a categorical feature",
                unused.column
            )));
        }

        Ok(())
    }

    fn embedding_of<'a>(
        &self,
        training: &'a TrainingConfig,
        column: &str,
    ) -> Result<&'a EmbeddingConfig> {
        let mut matches = training.embeddings.iter().filter(|e| e.column == column);

        match (matches.next(), matches.next()) {
            (Some(embedding), None) => Ok(embedding),
            (None, _) => Err(OrchestratorError::InvalidConfig(format!(
                "categorical feature {column} has no embedding"
            ))),
            (Some(_), Some(_)) => Err(OrchestratorError::InvalidConfig(format!(
                "categorical feature {column} has more than one embedding"
            ))),
        }
    }

    // -------------------------------------------------------------------------
    // Adaptation
    // -------------------------------------------------------------------------

    /// The embeddings follow the order of the categorical features, which is the order the
    /// batches hold their index arrays in.
    fn adapt_net(&self, config: &RunConfig) -> Result<NetBuilder> {
        let training = &config.training;
        let mut net = NetBuilder::new(training.features.dense.len());

        for column in &training.features.categorical {
            let embedding = self.embedding_of(training, column)?;
            net = net.embedding(embedding.vocab, embedding.dim);
        }

        Ok(net.hidden(config.hidden_layers.iter().copied()))
    }

    fn adapt_source(&self, training: &TrainingConfig) -> Result<BatchSource> {
        let batch_size = NonZeroUsize::new(training.batch_size).ok_or_else(|| {
            OrchestratorError::InvalidConfig("batch_size must be greater than 0".into())
        })?;

        let cache = ShardCache::new(&training.cache_dir, Schema::click_log())
            .with_stale_policy(training.stale_policy);

        Ok(BatchSource::new(cache, training.features.clone(), batch_size))
    }
}
