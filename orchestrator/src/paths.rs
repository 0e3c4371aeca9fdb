use std::path::PathBuf;

use log::info;
use rand::{SeedableRng, rngs::StdRng, seq::SliceRandom};

use crate::error::{OrchestratorError, Result};

/// Splits the shard paths into a training and a validation set.
///
/// The paths are shuffled with a generator seeded by `seed` and the first
/// `ceil(len * valid_fraction)` of them go to validation, so the split only depends on the
/// path list and the seed.
///
/// # Returns
/// `(train, validation)`, or an error if either side would be empty.
pub fn split_paths(
    mut paths: Vec<PathBuf>,
    valid_fraction: f64,
    seed: u64,
) -> Result<(Vec<PathBuf>, Vec<PathBuf>)> {
    let n_valid = (paths.len() as f64 * valid_fraction).ceil() as usize;

    if n_valid == 0 || n_valid >= paths.len() {
        return Err(OrchestratorError::InvalidConfig(format!(
            "can't split {} shards with a validation fraction of {valid_fraction}",
            paths.len()
        )));
    }

    paths.shuffle(&mut StdRng::seed_from_u64(seed));
    let train = paths.split_off(n_valid);

    info!(
        "split {} shards into {} for training and {} for validation",
        train.len() + paths.len(),
        train.len(),
        paths.len()
    );

    Ok((train, paths))
}
