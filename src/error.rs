use std::{fmt, path::PathBuf};

use thiserror::Error;

use crate::trace::Param;

/// The step of the regression workflow an error originated from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    DataLoading,
    ModelConstruction,
    Sampling,
    Summarization,
    Prediction,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::DataLoading => "data loading",
            Stage::ModelConstruction => "model construction",
            Stage::Sampling => "sampling",
            Stage::Summarization => "summarization",
            Stage::Prediction => "prediction",
        };
        f.write_str(name)
    }
}

#[non_exhaustive]
#[derive(Error, Debug)]
pub enum RegressionError {
    #[error("invalid input during {stage}: {message}")]
    InvalidInput { stage: Stage, message: String },

    #[error("sampling failed in chain {chain} at draw {draw} while updating {param}: {message}")]
    Sampling {
        chain: u64,
        draw: u64,
        param: Param,
        message: String,
    },

    #[error("chain has no draws of {param} during {stage}")]
    EmptyChain { stage: Stage, param: Param },

    #[error("credible level must lie strictly between 0 and 1, got {0}")]
    InvalidLevel(f64),

    #[error("could not read {path:?}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl RegressionError {
    pub(crate) fn invalid_input(stage: Stage, message: impl Into<String>) -> Self {
        RegressionError::InvalidInput {
            stage,
            message: message.into(),
        }
    }

    /// The workflow step that failed.
    pub fn stage(&self) -> Stage {
        match self {
            RegressionError::InvalidInput { stage, .. } => *stage,
            RegressionError::Sampling { .. } => Stage::Sampling,
            RegressionError::EmptyChain { stage, .. } => *stage,
            RegressionError::InvalidLevel(_) => Stage::Summarization,
            RegressionError::Io { .. } => Stage::DataLoading,
        }
    }
}

pub type Result<T> = std::result::Result<T, RegressionError>;
