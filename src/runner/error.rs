use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

/// The pipeline stage an error or warning came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Resolve,
    Load,
    Run,
    Report,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Resolve => "resolve",
            Stage::Load => "load",
            Stage::Run => "run",
            Stage::Report => "report",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ResolutionError {
    #[error("model file not found: {}", .0.display())]
    NotFound(PathBuf),
    #[error("unsupported model format: {}", .0.display())]
    UnsupportedFormat(PathBuf),
    #[error("a model name is required to compile {}", .0.display())]
    MissingModelName(PathBuf),
    #[error("failed to compile model '{model_name}': {reason}")]
    Compile { model_name: String, reason: String },
}

#[derive(Debug, Clone, PartialEq, Error)]
#[error("engine rejected {}: {message}", unit.display())]
pub struct LoadError {
    pub unit: PathBuf,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum RunError {
    #[error("invalid time span [{start}, {stop}], stop must be after start")]
    InvalidTimeSpan { start: f64, stop: f64 },
    #[error("invalid step size {0}, must be positive")]
    InvalidStep(f64),
    #[error("{reason}")]
    Engine { reason: String },
}

/// A non fatal problem while reporting, returned next to an otherwise good result.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("could not render plot {}: {reason}", path.display())]
pub struct ReportWarning {
    pub path: PathBuf,
    pub reason: String,
}

/// A job that stopped at `resolve`, `load` or `run`.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum JobError {
    #[error("resolve failed: {0}")]
    Resolve(#[from] ResolutionError),
    #[error("load failed: {0}")]
    Load(#[from] LoadError),
    #[error("run failed: {0}")]
    Run(#[from] RunError),
}

impl JobError {
    pub fn stage(&self) -> Stage {
        match self {
            JobError::Resolve(_) => Stage::Resolve,
            JobError::Load(_) => Stage::Load,
            JobError::Run(_) => Stage::Run,
        }
    }

    /// Process exit code for the `simulate` command.
    pub fn exit_code(&self) -> i32 {
        match self {
            JobError::Resolve(_) => 1,
            JobError::Load(_) => 2,
            JobError::Run(_) => 3,
        }
    }
}
