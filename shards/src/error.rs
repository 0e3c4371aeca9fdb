use std::{
    error::Error,
    fmt::{self, Display},
    io,
    path::PathBuf,
};

/// The result type used in the entire shards module.
pub type Result<T> = std::result::Result<T, ShardErr>;

/// The shards module's error type.
#[derive(Debug)]
pub enum ShardErr {
    Io {
        path: PathBuf,
        source: io::Error,
    },
    Parse {
        path: PathBuf,
        line: usize,
        column: String,
        value: String,
    },
    RaggedRow {
        path: PathBuf,
        line: usize,
        got: usize,
        expected: usize,
    },
    EmptyFile {
        path: PathBuf,
    },
    MissingColumn {
        column: String,
    },
    NonNumericColumn {
        column: String,
    },
    InvalidLabel {
        column: String,
        row: usize,
        value: f32,
    },
    LengthMismatch {
        column: String,
        got: usize,
        expected: usize,
    },
    CorruptCache {
        path: PathBuf,
        reason: String,
    },
    EmptyPass {
        shards: usize,
    },
    Pattern(String),
}

impl Display for ShardErr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShardErr::Io { path, source } => write!(f, "io error on {}: {source}", path.display()),
            ShardErr::Parse {
                path,
                line,
                column,
                value,
            } => write!(
                f,
                "{} line {line}: cannot parse '{value}' for column {column}",
                path.display()
            ),
            ShardErr::RaggedRow {
                path,
                line,
                got,
                expected,
            } => write!(
                f,
                "{} line {line}: expected {expected} fields, got {got}",
                path.display()
            ),
            ShardErr::EmptyFile { path } => write!(f, "{} has no header row", path.display()),
            ShardErr::MissingColumn { column } => write!(f, "missing column {column}"),
            ShardErr::NonNumericColumn { column } => {
                write!(f, "column {column} is not numeric")
            }
            ShardErr::InvalidLabel { column, row, value } => write!(
                f,
                "label column {column} holds {value} at row {row}, expected 0 or 1"
            ),
            ShardErr::LengthMismatch {
                column,
                got,
                expected,
            } => write!(
                f,
                "column {column} has {got} rows, the table has {expected}"
            ),
            ShardErr::CorruptCache { path, reason } => {
                write!(f, "corrupt cache artifact {}: {reason}", path.display())
            }
            ShardErr::EmptyPass { shards } => write!(
                f,
                "a full pass over {shards} shard(s) produced no batches, refusing to repeat"
            ),
            ShardErr::Pattern(msg) => write!(f, "invalid shard pattern: {msg}"),
        }
    }
}

impl Error for ShardErr {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            ShardErr::Io { source, .. } => Some(source),
            _ => None,
        }
    }
}

impl ShardErr {
    /// Wraps an io error with the path it happened on.
    pub(crate) fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn corrupt(path: impl Into<PathBuf>, reason: impl Display) -> Self {
        Self::CorruptCache {
            path: path.into(),
            reason: reason.to_string(),
        }
    }
}
