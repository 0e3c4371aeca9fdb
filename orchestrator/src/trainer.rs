use log::{debug, info};
use machine_learning::{
    arch::{Features, Model, loss::LossFn},
    optimization::Optimizer,
};
use shards::Batch;

use crate::{
    callbacks::{Callback, EpochCtx, EpochLogs},
    error::{OrchestratorError, Result},
};

/// The logs of every epoch a `Trainer::fit` call ran.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct History {
    pub epochs: Vec<EpochLogs>,
    /// Whether a callback ended training before the epoch budget ran out.
    pub stopped_early: bool,
}

impl History {
    pub fn len(&self) -> usize {
        self.epochs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.epochs.is_empty()
    }

    pub fn last(&self) -> Option<&EpochLogs> {
        self.epochs.last()
    }
}

/// Runs the epoch loop: a fixed amount of optimization steps over the training source, a
/// fixed amount of loss evaluations over the validation source and then the callbacks.
pub struct Trainer<M: Model, O: Optimizer, L: LossFn> {
    model: M,
    optimizer: O,
    loss: L,
    callbacks: Vec<Box<dyn Callback>>,

    epochs: usize,
    steps_per_epoch: usize,
    validation_steps: usize,
}

impl<M: Model, O: Optimizer, L: LossFn> Trainer<M, O, L> {
    /// Creates a new `Trainer` that runs a single epoch of a single step.
    pub fn new(model: M, optimizer: O, loss: L) -> Self {
        Self {
            model,
            optimizer,
            loss,
            callbacks: Vec::new(),
            epochs: 1,
            steps_per_epoch: 1,
            validation_steps: 0,
        }
    }

    pub fn epochs(mut self, epochs: usize) -> Self {
        self.epochs = epochs;
        self
    }

    pub fn steps_per_epoch(mut self, steps: usize) -> Self {
        self.steps_per_epoch = steps;
        self
    }

    /// Sets how many validation batches `val_loss` is averaged over, 0 skips it.
    pub fn validation_steps(mut self, steps: usize) -> Self {
        self.validation_steps = steps;
        self
    }

    /// Registers a callback, callbacks run in registration order.
    pub fn callback(mut self, callback: Box<dyn Callback>) -> Self {
        self.callbacks.push(callback);
        self
    }

    pub fn model(&self) -> &M {
        &self.model
    }

    pub fn into_model(self) -> M {
        self.model
    }

    /// Trains the model until the epoch budget runs out or a callback asks to stop.
    ///
    /// Both sources are expected to be infinite: every epoch pulls exactly `steps_per_epoch`
    /// training batches and `validation_steps` validation batches, picking up where the
    /// previous epoch left off.
    ///
    /// # Arguments
    /// * `train` - The batches the model is optimized on.
    /// * `validation` - The batches `val_loss` is computed on.
    ///
    /// # Returns
    /// The logs of every epoch, or the first error. A source ending early is
    /// `SourceExhausted`.
    pub fn fit<T, V>(&mut self, mut train: T, mut validation: V) -> Result<History>
    where
        T: Iterator<Item = shards::Result<Batch>>,
        V: Iterator<Item = shards::Result<Batch>>,
    {
        let mut history = History::default();

        for epoch in 0..self.epochs {
            let mut ctx = EpochCtx::new(&mut self.model, self.optimizer.learning_rate());
            for callback in &mut self.callbacks {
                callback.on_epoch_begin(epoch, &mut ctx)?;
            }

            let mut logs = EpochLogs::new();
            logs.insert("lr".into(), self.optimizer.learning_rate() as f64);

            let mut loss = Mean::default();
            for step in 0..self.steps_per_epoch {
                let batch = next_batch(&mut train, "training", epoch, step)?;
                let features = Features::new(batch.dense.view(), batch.categorical_views());

                let batch_loss = self.model.train_batch(
                    features,
                    batch.labels.view(),
                    &self.loss,
                    &mut self.optimizer,
                )?;
                loss.add(batch_loss, batch.len());
                debug!("epoch {epoch} step {step}: loss {batch_loss:.6}");
            }
            logs.insert("loss".into(), loss.value());

            if self.validation_steps > 0 {
                let mut val_loss = Mean::default();
                for step in 0..self.validation_steps {
                    let batch = next_batch(&mut validation, "validation", epoch, step)?;
                    let features = Features::new(batch.dense.view(), batch.categorical_views());

                    let batch_loss =
                        self.model
                            .evaluate(features, batch.labels.view(), &self.loss)?;
                    val_loss.add(batch_loss, batch.len());
                }
                logs.insert("val_loss".into(), val_loss.value());
            }

            info!(
                "epoch {}/{}: {}",
                epoch + 1,
                self.epochs,
                logs.iter()
                    .map(|(k, v)| format!("{k} {v:.6}"))
                    .collect::<Vec<_>>()
                    .join(", ")
            );

            let mut ctx = EpochCtx::new(&mut self.model, self.optimizer.learning_rate());
            for callback in &mut self.callbacks {
                callback.on_epoch_end(epoch, &mut logs, &mut ctx)?;
            }

            let (learning_rate, stop) = (ctx.learning_rate(), ctx.stop_requested());
            self.optimizer.set_learning_rate(learning_rate);
            history.epochs.push(logs);

            if stop {
                info!("training stopped after epoch {epoch}");
                history.stopped_early = true;
                break;
            }
        }

        Ok(history)
    }
}

fn next_batch<I>(source: &mut I, name: &'static str, epoch: usize, step: usize) -> Result<Batch>
where
    I: Iterator<Item = shards::Result<Batch>>,
{
    let batch = source.next().ok_or(OrchestratorError::SourceExhausted {
        source: name,
        epoch,
        step,
    })??;

    Ok(batch)
}

/// A mean of per batch values weighted by the batches' row counts.
#[derive(Default)]
struct Mean {
    sum: f64,
    rows: usize,
}

impl Mean {
    fn add(&mut self, value: f32, rows: usize) {
        self.sum += value as f64 * rows as f64;
        self.rows += rows;
    }

    fn value(&self) -> f64 {
        match self.rows {
            0 => f64::NAN,
            rows => self.sum / rows as f64,
        }
    }
}
