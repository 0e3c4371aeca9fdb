use std::{
    num::NonZeroUsize,
    path::{Path, PathBuf},
};

use log::debug;
use rand::Rng;

use crate::{Result, ShardErr, batch::Batch, cache::ShardCache, schema::FeatureSpec, table::Table};

/// The value missing numeric fields are replaced with before batching.
pub const MISSING_FILL: f32 = -1.0;

/// Everything needed to turn shards into batches, shared by every producer of a run.
#[derive(Debug, Clone)]
pub struct BatchSource {
    cache: ShardCache,
    features: FeatureSpec,
    batch_size: NonZeroUsize,
}

impl BatchSource {
    /// Creates a new `BatchSource`.
    ///
    /// # Arguments
    /// * `cache` - The cache shards are loaded through.
    /// * `features` - Which columns make up a batch.
    /// * `batch_size` - The amount of rows per batch.
    ///
    /// # Returns
    /// A new `BatchSource` instance.
    pub fn new(cache: ShardCache, features: FeatureSpec, batch_size: NonZeroUsize) -> Self {
        Self {
            cache,
            features,
            batch_size,
        }
    }

    pub fn cache(&self) -> &ShardCache {
        &self.cache
    }

    pub fn features(&self) -> &FeatureSpec {
        &self.features
    }

    pub fn batch_size(&self) -> NonZeroUsize {
        self.batch_size
    }

    /// Creates a lazy batch sequence over `paths`.
    ///
    /// # Arguments
    /// * `paths` - The shards, visited in this order on every pass.
    /// * `repeat` - Whether to start over after the last shard instead of ending.
    /// * `rng` - The generator every shard permutation is drawn from.
    ///
    /// # Returns
    /// A new `BatchProducer`.
    pub fn produce<R: Rng>(&self, paths: Vec<PathBuf>, repeat: bool, rng: R) -> BatchProducer<R> {
        BatchProducer::new(self.clone(), paths, repeat, rng)
    }

    /// Returns the amount of batches a single pass over `paths` yields.
    pub fn count_batches(&self, paths: &[PathBuf]) -> Result<usize> {
        let size = self.batch_size.get();
        let mut total = 0;

        for path in paths {
            total += self.cache.row_count(path)?.div_ceil(size);
        }

        Ok(total)
    }
}

/// The table of the shard currently being sliced.
#[derive(Debug)]
struct ShardCursor {
    table: Table,
    cursor: usize,
}

/// Shard-walking batch iterator.
///
/// Loads one shard at a time through the cache, shuffles its rows, slices it into batches and
/// drops the table before moving on to the next shard. Shards are never mixed: a batch always
/// comes from a single shard and the last batch of a shard may be shorter.
///
/// Errors are yielded once, after which the iterator is exhausted.
#[derive(Debug)]
pub struct BatchProducer<R: Rng> {
    source: BatchSource,
    paths: Vec<PathBuf>,
    repeat: bool,
    rng: R,

    next_path: usize,
    current: Option<ShardCursor>,
    pass: usize,
    yielded_in_pass: usize,
    done: bool,
}

impl<R: Rng> BatchProducer<R> {
    /// Creates a new `BatchProducer`, see `BatchSource::produce`.
    pub fn new(source: BatchSource, paths: Vec<PathBuf>, repeat: bool, rng: R) -> Self {
        Self {
            source,
            paths,
            repeat,
            rng,
            next_path: 0,
            current: None,
            pass: 0,
            yielded_in_pass: 0,
            done: false,
        }
    }

    pub fn paths(&self) -> &[PathBuf] {
        &self.paths
    }

    pub fn repeats(&self) -> bool {
        self.repeat
    }

    /// Returns the amount of completed passes over every shard.
    pub fn passes(&self) -> usize {
        self.pass
    }

    /// Returns the amount of batches one pass over this producer's shards yields.
    pub fn len_per_pass(&self) -> Result<usize> {
        self.source.count_batches(&self.paths)
    }

    /// Loads, shuffles and fills the next shard.
    fn open(&mut self, path: &Path) -> Result<Table> {
        let mut table = self.source.cache.load(path)?;
        table.shuffle(&mut self.rng);
        table.fill_missing(MISSING_FILL);

        debug!(
            "pass {}: opened {} ({} rows)",
            self.pass,
            path.display(),
            table.len()
        );

        Ok(table)
    }

    fn fail(&mut self, err: ShardErr) -> Option<Result<Batch>> {
        self.done = true;
        self.current = None;
        Some(Err(err))
    }
}

impl<R: Rng> Iterator for BatchProducer<R> {
    type Item = Result<Batch>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if self.done {
                return None;
            }

            if let Some(shard) = &mut self.current {
                if shard.cursor < shard.table.len() {
                    let start = shard.cursor;
                    let end = (start + self.source.batch_size.get()).min(shard.table.len());
                    shard.cursor = end;

                    return match Batch::assemble(&shard.table, start..end, &self.source.features) {
                        Ok(batch) => {
                            self.yielded_in_pass += 1;
                            Some(Ok(batch))
                        }
                        Err(e) => self.fail(e),
                    };
                }

                // The shard is exhausted, release its table before loading the next one.
                self.current = None;
                continue;
            }

            if self.next_path == self.paths.len() {
                if self.repeat && self.yielded_in_pass == 0 {
                    let shards = self.paths.len();
                    return self.fail(ShardErr::EmptyPass { shards });
                }

                self.pass += 1;
                if !self.repeat {
                    self.done = true;
                    return None;
                }

                self.next_path = 0;
                self.yielded_in_pass = 0;
                continue;
            }

            let path = self.paths[self.next_path].clone();
            self.next_path += 1;

            match self.open(&path) {
                Ok(table) if table.is_empty() => debug!("skipping empty shard {}", path.display()),
                Ok(table) => self.current = Some(ShardCursor { table, cursor: 0 }),
                Err(e) => return self.fail(e),
            }
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        match (self.done, self.repeat) {
            (true, _) => (0, Some(0)),
            (false, true) => (usize::MAX, None),
            (false, false) => (0, None),
        }
    }
}
