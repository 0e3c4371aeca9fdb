mod early_stopping;
mod metrics_writer;
mod model_checkpoint;
mod monitor;
mod reduce_lr;
mod validation;

use std::collections::BTreeMap;

use machine_learning::arch::Predictor;

pub use early_stopping::EarlyStopping;
pub use metrics_writer::MetricsWriter;
pub use model_checkpoint::ModelCheckpoint;
pub use monitor::{Monitor, Observation};
pub use reduce_lr::ReduceLrOnPlateau;
pub use validation::ValidationAuc;

use crate::error::Result;

/// The metrics of one epoch by name, sorted so every report lists them in the same order.
pub type EpochLogs = BTreeMap<String, f64>;

/// What a callback may look at and change at an epoch boundary.
pub struct EpochCtx<'a> {
    pub model: &'a mut dyn Predictor,
    learning_rate: f32,
    stop: bool,
}

impl<'a> EpochCtx<'a> {
    pub fn new(model: &'a mut dyn Predictor, learning_rate: f32) -> Self {
        Self {
            model,
            learning_rate,
            stop: false,
        }
    }

    pub fn learning_rate(&self) -> f32 {
        self.learning_rate
    }

    /// Sets the learning rate the optimizer uses from the next epoch on.
    pub fn set_learning_rate(&mut self, learning_rate: f32) {
        self.learning_rate = learning_rate;
    }

    /// Asks the trainer to stop once every callback of this epoch ran.
    pub fn request_stop(&mut self) {
        self.stop = true;
    }

    pub fn stop_requested(&self) -> bool {
        self.stop
    }
}

/// Observes the training loop at epoch boundaries.
///
/// Callbacks run in the order they were registered, so one may read the metrics an earlier
/// one added to the logs.
pub trait Callback {
    fn on_epoch_begin(&mut self, _epoch: usize, _ctx: &mut EpochCtx<'_>) -> Result<()> {
        Ok(())
    }

    /// Runs after the epoch's training and validation steps.
    ///
    /// # Arguments
    /// * `epoch` - The 0 based index of the epoch.
    /// * `logs` - The epoch's metrics, callbacks may add their own.
    /// * `ctx` - The model, learning rate and stop flag.
    fn on_epoch_end(
        &mut self,
        epoch: usize,
        logs: &mut EpochLogs,
        ctx: &mut EpochCtx<'_>,
    ) -> Result<()>;
}
