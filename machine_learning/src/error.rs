use std::{
    error::Error,
    fmt::{self, Display},
};

/// The result type used in the entire machine learning module.
pub type Result<T> = std::result::Result<T, MlErr>;

/// The machine learning module's error type.
#[derive(Debug)]
pub enum MlErr {
    SizeMismatch {
        a: &'static str,
        b: &'static str,
        got: usize,
        expected: usize,
    },
    InvalidArchitecture {
        reason: String,
    },
    InvalidDistribution {
        reason: String,
    },
    MissingTensor {
        name: String,
    },
    ShapeMismatch {
        name: String,
        got: Vec<usize>,
        expected: Vec<usize>,
    },
}

impl Display for MlErr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            MlErr::SizeMismatch {
                a,
                b,
                got,
                expected,
            } => {
                format!(
                    "There's a size mismatch between {a} and {b}, got {got} and expected {expected}"
                )
            }
            MlErr::InvalidArchitecture { reason } => format!("Invalid architecture: {reason}"),
            MlErr::InvalidDistribution { reason } => {
                format!("Failed to build the initialization distribution: {reason}")
            }
            MlErr::MissingTensor { name } => format!("The tensor {name} is missing"),
            MlErr::ShapeMismatch {
                name,
                got,
                expected,
            } => format!("The tensor {name} has shape {got:?}, expected {expected:?}"),
        };

        write!(f, "{s}")
    }
}

impl Error for MlErr {}
