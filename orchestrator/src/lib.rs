pub mod callbacks;
pub mod checkpoint;
pub mod configs;
pub mod error;
pub mod logging;
mod paths;
mod trainer;

use log::{info, warn};
use machine_learning::{
    arch::{Predictor, loss::BinaryCrossEntropy},
    optimization::Adam,
};
use rand::{SeedableRng, rngs::StdRng};
use shards::{Batch, Prefetcher};

use callbacks::{
    EarlyStopping, MetricsWriter, ModelCheckpoint, Monitor, ReduceLrOnPlateau, ValidationAuc,
};
use configs::{Adapter, RunConfig, RunPlan};

pub use error::{OrchestratorError, Result};
pub use paths::split_paths;
pub use trainer::{History, Trainer};

type Batches = Box<dyn Iterator<Item = shards::Result<Batch>> + Send>;

/// Trains a click classifier with the given hyper-parameters.
///
/// Discovers the raw shards, splits them into a training and a validation set, builds the
/// network and runs the epoch loop until early stopping fires or the epoch budget runs out.
/// The best weights end up in the configured checkpoint file.
///
/// # Errors
/// Returns an `OrchestratorError` if the config is invalid, no shards are found, a shard
/// can't be loaded or a checkpoint can't be written.
pub fn run(config: RunConfig) -> Result<History> {
    let RunPlan { net, source } = Adapter::new().adapt(&config)?;
    let training = &config.training;

    let paths = shards::discover(&training.raw_pattern)?;
    if paths.is_empty() {
        return Err(OrchestratorError::NoShards {
            pattern: training.raw_pattern.clone(),
        });
    }
    let (train_paths, valid_paths) =
        split_paths(paths, training.valid_fraction, training.split_seed)?;

    let steps_per_epoch = match training.steps_per_epoch {
        Some(steps) => steps,
        None => source.count_batches(&train_paths)?,
    };
    if steps_per_epoch == 0 {
        return Err(OrchestratorError::InvalidConfig(
            "the training shards hold no rows".into(),
        ));
    }
    let validation_steps = match training.validation_steps {
        Some(steps) => steps,
        None => source.count_batches(&valid_paths)?,
    };
    if validation_steps == 0 {
        warn!("val_loss won't be computed, there are no validation steps");
    }

    info!(
        "batch size {}, {steps_per_epoch} steps per epoch, {validation_steps} validation steps",
        source.batch_size()
    );

    let mut model = net.build(&mut StdRng::seed_from_u64(training.seed))?;
    if let Some(path) = &training.resume_from {
        let metadata = checkpoint::load(path, &mut model)?;
        info!("resumed from {} {metadata:?}", path.display());
    }
    info!(
        "training a network of {} parameters, hidden layers {:?}",
        model.size(),
        config.hidden_layers
    );

    let snapshot_rng = StdRng::seed_from_u64(training.seed.wrapping_add(3));
    let snapshot = ValidationAuc::collect(source.produce(valid_paths.clone(), false, snapshot_rng))?;

    let train_rng = StdRng::seed_from_u64(training.seed.wrapping_add(1));
    let valid_rng = StdRng::seed_from_u64(training.seed.wrapping_add(2));
    let train = prefetched(Box::new(source.produce(train_paths, true, train_rng)), training.prefetch);
    let validation = prefetched(
        Box::new(source.produce(valid_paths, true, valid_rng)),
        training.prefetch,
    );

    let monitor = || {
        Monitor::new(
            &training.monitor.metric,
            training.monitor.mode,
            training.min_delta,
        )
    };
    let optimizer = Adam::with_defaults(model.size(), config.learning_rate);

    let mut trainer = Trainer::new(model, optimizer, BinaryCrossEntropy::default())
        .epochs(training.epochs)
        .steps_per_epoch(steps_per_epoch)
        .validation_steps(validation_steps)
        .callback(Box::new(snapshot))
        .callback(Box::new(MetricsWriter::new(&training.metrics_dir)?))
        .callback(Box::new(ModelCheckpoint::new(&training.checkpoint, monitor())))
        .callback(Box::new(ReduceLrOnPlateau::new(
            monitor(),
            training.lr_patience,
            training.lr_factor,
            training.min_lr,
        )))
        .callback(Box::new(EarlyStopping::new(
            monitor(),
            training.early_stopping_patience,
        )));

    let history = trainer.fit(train, validation)?;
    info!(
        "finished after {} epochs, best weights in {}",
        history.len(),
        training.checkpoint.display()
    );

    Ok(history)
}

fn prefetched(batches: Batches, depth: usize) -> Batches {
    match depth {
        0 => batches,
        depth => Box::new(Prefetcher::spawn(batches, depth)),
    }
}
