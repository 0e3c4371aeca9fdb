use log::{info, warn};
use machine_learning::{
    arch::{Features, Predictor},
    metrics::roc_auc,
};
use shards::Batch;

use super::{Callback, EpochCtx, EpochLogs};
use crate::error::Result;

/// Reports the ROC AUC of the model on a fixed validation snapshot at the end of every epoch.
///
/// The snapshot is materialized once, when the callback is created, so every epoch scores
/// exactly the same rows in the same order. A defined AUC is added to the logs as `val_auc`.
pub struct ValidationAuc {
    batches: Vec<Batch>,
    labels: Vec<f32>,
}

impl ValidationAuc {
    pub fn new(batches: Vec<Batch>) -> Self {
        let labels = batches
            .iter()
            .flat_map(|b| b.labels.iter().copied())
            .collect();

        Self { batches, labels }
    }

    /// Drains a finite batch source into a snapshot.
    ///
    /// # Errors
    /// The first error the source yields.
    pub fn collect<I>(batches: I) -> Result<Self>
    where
        I: IntoIterator<Item = shards::Result<Batch>>,
    {
        let batches = batches.into_iter().collect::<shards::Result<Vec<_>>>()?;
        let snapshot = Self::new(batches);

        info!(
            "validation snapshot holds {} rows in {} batches",
            snapshot.len(),
            snapshot.batches.len()
        );
        Ok(snapshot)
    }

    /// Returns the amount of rows in the snapshot.
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// Scores every row of the snapshot, in snapshot order.
    pub fn scores(&self, model: &mut dyn Predictor) -> Result<Vec<f32>> {
        let mut scores = Vec::with_capacity(self.len());

        for batch in &self.batches {
            let features = Features::new(batch.dense.view(), batch.categorical_views());
            scores.extend(model.predict(features)?);
        }

        Ok(scores)
    }

    /// Computes the AUC of `model` on the snapshot.
    ///
    /// # Returns
    /// `None` if the snapshot is empty or holds a single class.
    pub fn evaluate(&self, model: &mut dyn Predictor) -> Result<Option<f64>> {
        let scores = self.scores(model)?;
        Ok(roc_auc(&scores, &self.labels))
    }
}

impl Callback for ValidationAuc {
    fn on_epoch_end(
        &mut self,
        epoch: usize,
        logs: &mut EpochLogs,
        ctx: &mut EpochCtx<'_>,
    ) -> Result<()> {
        let auc = self.evaluate(&mut *ctx.model)?;

        let mut report = vec![format!("Epoch: {epoch}")];
        report.extend(logs.iter().map(|(k, v)| format!("{k}: {v:.6}")));

        match auc {
            Some(auc) => {
                report.push(format!("auc: {auc:.6}"));
                logs.insert("val_auc".into(), auc);
            }
            None => {
                warn!(
                    "validation AUC is undefined, the snapshot of {} rows holds a single class",
                    self.len()
                );
                report.push("auc: undefined".into());
            }
        }

        info!("{}", report.join(", "));
        Ok(())
    }
}
