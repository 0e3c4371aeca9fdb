use std::path::PathBuf;

use glob::glob;
use log::{debug, warn};

use crate::{Result, ShardErr};

/// Lists the shard files matching a glob pattern, sorted by path.
///
/// Unreadable entries are skipped with a warning and directories are ignored. An empty
/// result is not an error here, callers decide whether zero shards is acceptable.
pub fn discover(pattern: &str) -> Result<Vec<PathBuf>> {
    let entries = glob(pattern).map_err(|e| ShardErr::Pattern(format!("{pattern}: {e}")))?;

    let mut paths: Vec<PathBuf> = entries
        .filter_map(|entry| match entry {
            Ok(path) => Some(path),
            Err(e) => {
                warn!("skipping unreadable entry: {e}");
                None
            }
        })
        .filter(|p| p.is_file())
        .collect();

    paths.sort();
    debug!("{} shards match {pattern}", paths.len());

    Ok(paths)
}
