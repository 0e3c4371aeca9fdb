use std::{fs::OpenOptions, io::Write, path::Path};

use env_logger::{Builder, Env, Logger, Target, WriteStyle};
use log::{LevelFilter, Log, Metadata, Record};

use crate::error::{OrchestratorError, Result};

const DEFAULT_FILTER: &str = "info";
const FILE_FILTER_ENV: &str = "TRAIN_LOG_FILE";
const DEFAULT_FILE_FILTER: &str = "debug";

/// Sends every record to stderr and to the log file, each side with its own filter.
struct Split {
    console: Logger,
    file: Logger,
}

impl Split {
    fn max_level(&self) -> LevelFilter {
        self.console.filter().max(self.file.filter())
    }
}

impl Log for Split {
    fn enabled(&self, metadata: &Metadata<'_>) -> bool {
        self.console.enabled(metadata) || self.file.enabled(metadata)
    }

    fn log(&self, record: &Record<'_>) {
        self.console.log(record);
        self.file.log(record);
    }

    fn flush(&self) {
        self.console.flush();
        self.file.flush();
    }
}

/// A builder writing to `target` in the run's line format.
fn builder(target: Target) -> Builder {
    let mut builder = Builder::new();
    builder
        .format(|buf, record| {
            writeln!(
                buf,
                "{} {} {} [{}][{}] {}",
                buf.timestamp_millis(),
                record.target(),
                record.line().unwrap_or(0),
                record.level(),
                record.module_path().unwrap_or("-"),
                record.args()
            )
        })
        .write_style(WriteStyle::Never)
        .target(target);

    builder
}

/// Installs the global logger.
///
/// Stderr gets `info` and above unless `RUST_LOG` says otherwise. The file also gets
/// `debug` lines, its filter is read from `TRAIN_LOG_FILE`. Lines look like
/// `<timestamp> <target> <line> [<LEVEL>][<module>] <message>`.
///
/// # Arguments
/// * `log_file` - The file lines are appended to besides stderr.
pub fn init(log_file: &Path) -> Result<()> {
    if let Some(dir) = log_file.parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir)?;
    }
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_file)?;

    let split = Split {
        console: builder(Target::Stderr)
            .parse_env(Env::default().default_filter_or(DEFAULT_FILTER))
            .build(),
        file: builder(Target::Pipe(Box::new(file)))
            .parse_env(Env::new().filter_or(FILE_FILTER_ENV, DEFAULT_FILE_FILTER))
            .build(),
    };
    let max = split.max_level();

    log::set_boxed_logger(Box::new(split))
        .map_err(|e| OrchestratorError::Logger(e.to_string()))?;
    log::set_max_level(max);

    Ok(())
}
