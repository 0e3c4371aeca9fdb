mod adapter;
mod run;
mod training;

pub use adapter::{Adapter, RunPlan};
pub use run::RunConfig;
pub use training::{EmbeddingConfig, MonitorConfig, MonitorMode, TrainingConfig};
