use std::{fs, path::Path};

use log::info;
use serde::{Deserialize, Serialize};

use super::TrainingConfig;
use crate::error::Result;

/// The hyper-parameters of a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    /// The widths of the hidden layers, in order.
    #[serde(alias = "first_dences")]
    pub hidden_layers: Vec<usize>,
    pub learning_rate: f32,
    pub training: TrainingConfig,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            hidden_layers: vec![64, 32, 32, 8],
            learning_rate: 0.001,
            training: TrainingConfig::default(),
        }
    }
}

impl RunConfig {
    /// Loads the run's hyper-parameters.
    ///
    /// # Arguments
    /// * `path` - A JSON file, every key it leaves out keeps its default.
    ///
    /// # Returns
    /// The defaults if `path` is `None`, or an error if the file can't be read or parsed.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };

        let raw = fs::read_to_string(path)?;
        let config = serde_json::from_str(&raw)?;
        info!("loaded hyper-parameters from {}", path.display());

        Ok(config)
    }
}
