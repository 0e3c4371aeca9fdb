use log::info;

use super::{Callback, EpochCtx, EpochLogs, Monitor, Observation};
use crate::error::Result;

/// Stops training once the monitored metric stalls for `patience` epochs in a row.
pub struct EarlyStopping {
    monitor: Monitor,
    patience: usize,
}

impl EarlyStopping {
    pub fn new(monitor: Monitor, patience: usize) -> Self {
        Self { monitor, patience }
    }
}

impl Callback for EarlyStopping {
    fn on_epoch_end(
        &mut self,
        epoch: usize,
        logs: &mut EpochLogs,
        ctx: &mut EpochCtx<'_>,
    ) -> Result<()> {
        match self.monitor.observe(logs) {
            Observation::Stalled { wait } if wait >= self.patience => {
                info!(
                    "Epoch {epoch}: early stopping, {} did not improve for {wait} epochs",
                    self.monitor.metric()
                );
                ctx.request_stop();
            }
            _ => {}
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        callbacks::testing::{Scaled, logs},
        configs::MonitorMode,
    };

    #[test]
    fn stops_after_patience_stalled_epochs() {
        let mut model = Scaled::new(1.);
        let mut stopping = EarlyStopping::new(Monitor::new("val_loss", MonitorMode::Min, 0.), 2);
        let losses = [1.0, 0.8, 0.9, 0.85, 0.7];

        let mut stopped_at = None;
        for (epoch, loss) in losses.into_iter().enumerate() {
            let mut ctx = EpochCtx::new(&mut model, 0.1);
            stopping
                .on_epoch_end(epoch, &mut logs([("val_loss", loss)]), &mut ctx)
                .unwrap();
            if ctx.stop_requested() {
                stopped_at = Some(epoch);
                break;
            }
        }

        assert_eq!(stopped_at, Some(3));
    }

    #[test]
    fn keeps_going_while_improving() {
        let mut model = Scaled::new(1.);
        let mut stopping = EarlyStopping::new(Monitor::new("val_auc", MonitorMode::Max, 0.), 1);

        for (epoch, auc) in [0.6, 0.7, 0.8].into_iter().enumerate() {
            let mut ctx = EpochCtx::new(&mut model, 0.1);
            stopping
                .on_epoch_end(epoch, &mut logs([("val_auc", auc)]), &mut ctx)
                .unwrap();
            assert!(!ctx.stop_requested());
        }
    }
}
