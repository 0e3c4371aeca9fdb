use std::{
    fs::{self, File},
    io::{self, BufReader, BufWriter},
    path::{Path, PathBuf},
};

use log::{debug, warn};
use serde::{Deserialize, Serialize};

use crate::{
    Result, ShardErr,
    codec::{self, SourceStamp},
    csv,
    schema::Schema,
    table::Table,
};

/// What the cache does when an artifact's source stamp differs from the raw shard's.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StalePolicy {
    /// Serve the artifact, the cache is keyed by filename only.
    Ignore,
    /// Serve the artifact and log a warning.
    #[default]
    Warn,
    /// Treat the artifact as a miss and re-parse the raw shard.
    Reparse,
}

/// A memoization layer in front of the raw shard parser.
///
/// Parsed tables are persisted under `dir`, keyed by the shard's base filename, so later
/// epochs (and later runs) skip decompressing and parsing the raw CSV again. Entries are never
/// invalidated automatically, see `StalePolicy` and `invalidate`.
#[derive(Debug, Clone)]
pub struct ShardCache {
    dir: PathBuf,
    schema: Schema,
    stale_policy: StalePolicy,
}

impl ShardCache {
    /// Creates a new `ShardCache`.
    ///
    /// # Arguments
    /// * `dir` - The directory artifacts are stored in, created on the first write.
    /// * `schema` - The column-to-type mapping raw shards are parsed with.
    ///
    /// # Returns
    /// A new `ShardCache` instance.
    pub fn new(dir: impl Into<PathBuf>, schema: Schema) -> Self {
        Self {
            dir: dir.into(),
            schema,
            stale_policy: StalePolicy::default(),
        }
    }

    /// Sets the policy applied to stale artifacts.
    pub fn with_stale_policy(mut self, stale_policy: StalePolicy) -> Self {
        self.stale_policy = stale_policy;
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Returns where the artifact of `shard` lives: its base filename up to the first dot,
    /// with a `gz` extension, under the cache directory.
    pub fn cache_path(&self, shard: &Path) -> PathBuf {
        let name = shard
            .file_name()
            .map(|n| n.to_string_lossy())
            .unwrap_or_default();
        let stem = name.split('.').next().unwrap_or_default();

        self.dir.join(format!("{stem}.gz"))
    }

    /// Loads the parsed table of a shard.
    ///
    /// Serves the cached artifact when there's a usable one, otherwise parses the raw shard
    /// and persists the result.
    ///
    /// # Arguments
    /// * `shard` - The raw shard's path.
    ///
    /// # Returns
    /// The shard's table or an error if the raw shard had to be parsed and couldn't be.
    pub fn load(&self, shard: &Path) -> Result<Table> {
        let cached = self.cache_path(shard);
        let stamp = SourceStamp::of(shard).ok();

        match self.read_artifact(&cached, stamp) {
            Ok(Some(table)) => {
                debug!(rows = table.len(); "cache hit for {}", shard.display());
                return Ok(table);
            }
            Ok(None) => debug!("cache miss for {}", shard.display()),
            Err(e) => warn!("{e}, re-parsing {}", shard.display()),
        }

        let table = csv::read_table(shard, &self.schema)?;

        if let Err(e) = self.write_artifact(&cached, &table, stamp) {
            warn!("failed to write cache artifact {}: {e}", cached.display());
        }

        Ok(table)
    }

    /// Returns the row count of a shard, from its artifact's header when cached.
    pub fn row_count(&self, shard: &Path) -> Result<usize> {
        let cached = self.cache_path(shard);

        match File::open(&cached) {
            Ok(file) => match codec::peek(BufReader::new(file), &cached) {
                Ok(info) => return Ok(info.rows),
                Err(e) => warn!("{e}, counting raw rows of {}", shard.display()),
            },
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => warn!("cannot open {}: {e}", cached.display()),
        }

        csv::count_rows(shard)
    }

    /// Removes the artifact of `shard`.
    ///
    /// # Returns
    /// Whether there was an artifact to remove.
    pub fn invalidate(&self, shard: &Path) -> Result<bool> {
        let cached = self.cache_path(shard);

        match fs::remove_file(&cached) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(ShardErr::io(cached, e)),
        }
    }

    /// Reads an artifact if it exists and is usable under the current stale policy.
    ///
    /// # Returns
    /// `Ok(None)` on a miss, an error if the artifact is unreadable or corrupt.
    fn read_artifact(&self, cached: &Path, stamp: Option<SourceStamp>) -> Result<Option<Table>> {
        let file = match File::open(cached) {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(ShardErr::io(cached, e)),
        };

        let (table, info) = codec::decode(BufReader::new(file), cached)?;

        let stale = matches!((info.source, stamp), (Some(a), Some(b)) if a != b);
        if !stale {
            return Ok(Some(table));
        }

        match self.stale_policy {
            StalePolicy::Ignore => Ok(Some(table)),
            StalePolicy::Warn => {
                warn!(
                    "cache artifact {} is older than its raw shard, serving it anyway",
                    cached.display()
                );
                Ok(Some(table))
            }
            StalePolicy::Reparse => {
                debug!("cache artifact {} is stale", cached.display());
                Ok(None)
            }
        }
    }

    /// Writes an artifact next to its final location and moves it into place.
    fn write_artifact(
        &self,
        cached: &Path,
        table: &Table,
        stamp: Option<SourceStamp>,
    ) -> Result<()> {
        fs::create_dir_all(&self.dir).map_err(|e| ShardErr::io(&self.dir, e))?;

        let partial = cached.with_extension("partial");
        let file = File::create(&partial).map_err(|e| ShardErr::io(&partial, e))?;
        codec::encode(BufWriter::new(file), table, stamp).map_err(|e| ShardErr::io(&partial, e))?;
        fs::rename(&partial, cached).map_err(|e| ShardErr::io(cached, e))?;

        debug!(rows = table.len(); "cached {}", cached.display());
        Ok(())
    }
}
