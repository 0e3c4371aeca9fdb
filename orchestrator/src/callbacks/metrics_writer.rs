use std::{
    fs::{self, OpenOptions},
    io::Write,
    path::{Path, PathBuf},
};

use serde::Serialize;

use super::{Callback, EpochCtx, EpochLogs};
use crate::error::Result;

#[derive(Serialize)]
struct EpochRecord<'a> {
    epoch: usize,
    #[serde(flatten)]
    logs: &'a EpochLogs,
}

/// Appends one JSON object per epoch to `<dir>/metrics.jsonl`.
pub struct MetricsWriter {
    path: PathBuf,
}

impl MetricsWriter {
    /// Creates a new `MetricsWriter`, creating `dir` if needed.
    pub fn new(dir: &Path) -> Result<Self> {
        fs::create_dir_all(dir)?;
        Ok(Self {
            path: dir.join("metrics.jsonl"),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Callback for MetricsWriter {
    fn on_epoch_end(
        &mut self,
        epoch: usize,
        logs: &mut EpochLogs,
        _ctx: &mut EpochCtx<'_>,
    ) -> Result<()> {
        let mut line = serde_json::to_vec(&EpochRecord { epoch, logs })?;
        line.push(b'\n');

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        file.write_all(&line)?;

        Ok(())
    }
}
