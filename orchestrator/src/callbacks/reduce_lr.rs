use log::info;

use super::{Callback, EpochCtx, EpochLogs, Monitor, Observation};
use crate::error::Result;

/// Multiplies the learning rate by `factor` once the monitored metric stalls for `patience`
/// epochs in a row, never going below `min_lr`.
pub struct ReduceLrOnPlateau {
    monitor: Monitor,
    patience: usize,
    factor: f32,
    min_lr: f32,
}

impl ReduceLrOnPlateau {
    pub fn new(monitor: Monitor, patience: usize, factor: f32, min_lr: f32) -> Self {
        Self {
            monitor,
            patience,
            factor,
            min_lr,
        }
    }
}

impl Callback for ReduceLrOnPlateau {
    fn on_epoch_end(
        &mut self,
        epoch: usize,
        logs: &mut EpochLogs,
        ctx: &mut EpochCtx<'_>,
    ) -> Result<()> {
        let Observation::Stalled { wait } = self.monitor.observe(logs) else {
            return Ok(());
        };

        let old_lr = ctx.learning_rate();
        if wait >= self.patience && old_lr > self.min_lr {
            let new_lr = (old_lr * self.factor).max(self.min_lr);
            ctx.set_learning_rate(new_lr);
            self.monitor.reset_wait();

            info!("Epoch {epoch}: reducing learning rate from {old_lr:e} to {new_lr:e}");
        }

        Ok(())
    }
}
