use std::{collections::HashMap, path::PathBuf};

use log::{debug, info};

use super::{Callback, EpochCtx, EpochLogs, Monitor, Observation};
use crate::{checkpoint, error::Result};

/// Saves the model's weights every time the monitored metric improves, so the file always
/// holds the best weights seen so far.
pub struct ModelCheckpoint {
    path: PathBuf,
    monitor: Monitor,
}

impl ModelCheckpoint {
    pub fn new(path: impl Into<PathBuf>, monitor: Monitor) -> Self {
        Self {
            path: path.into(),
            monitor,
        }
    }
}

impl Callback for ModelCheckpoint {
    fn on_epoch_end(
        &mut self,
        epoch: usize,
        logs: &mut EpochLogs,
        ctx: &mut EpochCtx<'_>,
    ) -> Result<()> {
        let metric = self.monitor.metric().to_string();

        match self.monitor.observe(logs) {
            Observation::Improved { previous, current } => {
                match previous {
                    Some(previous) => info!(
                        "Epoch {epoch}: {metric} improved from {previous:.5} to {current:.5}, saving model to {}",
                        self.path.display()
                    ),
                    None => info!(
                        "Epoch {epoch}: {metric} is {current:.5}, saving model to {}",
                        self.path.display()
                    ),
                }

                let metadata = HashMap::from([
                    ("epoch".to_string(), epoch.to_string()),
                    ("monitor".to_string(), metric),
                    ("value".to_string(), current.to_string()),
                ]);
                checkpoint::save(&self.path, &*ctx.model, metadata)?;
            }
            Observation::Stalled { .. } => {
                if let Some(best) = self.monitor.best() {
                    debug!("Epoch {epoch}: {metric} did not improve from {best:.5}");
                }
            }
            Observation::Missing => {}
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use machine_learning::arch::Predictor;

    use super::*;
    use crate::{
        callbacks::testing::{Scaled, logs},
        configs::MonitorMode,
    };

    #[test]
    fn keeps_the_best_weights_only() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("weights").join("best.safetensors");
        let mut saver = ModelCheckpoint::new(&path, Monitor::new("val_loss", MonitorMode::Min, 0.));

        for (epoch, (weight, loss)) in [(1., 0.5), (2., 0.3), (3., 0.4)].into_iter().enumerate() {
            let mut model = Scaled::new(weight);
            let mut ctx = EpochCtx::new(&mut model, 0.1);
            saver
                .on_epoch_end(epoch, &mut logs([("val_loss", loss)]), &mut ctx)
                .unwrap();
        }

        let mut restored = Scaled::new(0.);
        let metadata = checkpoint::load(&path, &mut restored).unwrap();

        assert_eq!(restored.params(), [2.]);
        assert_eq!(metadata["epoch"], "1");
        assert_eq!(metadata["monitor"], "val_loss");
        assert_eq!(metadata["value"], "0.3");
    }

    #[test]
    fn nothing_is_written_without_the_metric() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("best.safetensors");
        let mut saver = ModelCheckpoint::new(&path, Monitor::new("val_loss", MonitorMode::Min, 0.));

        let mut model = Scaled::new(1.);
        let mut ctx = EpochCtx::new(&mut model, 0.1);
        saver
            .on_epoch_end(0, &mut logs([("loss", 0.5)]), &mut ctx)
            .unwrap();

        assert!(!path.exists());
    }
}
