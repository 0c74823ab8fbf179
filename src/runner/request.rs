use std::path::{Path, PathBuf};

use super::RunError;

/// A validated run request: `stop > start` and a positive step, if any.
#[derive(Debug, Clone, PartialEq)]
pub struct SimulationRequest {
    start: f64,
    stop: f64,
    step: Option<f64>,
    variables: Option<Vec<String>>,
    plot: Option<PathBuf>,
}

impl SimulationRequest {
    pub fn new(start: f64, stop: f64) -> Result<Self, RunError> {
        if !(start.is_finite() && stop.is_finite()) || stop <= start {
            return Err(RunError::InvalidTimeSpan { start, stop });
        }
        Ok(Self {
            start,
            stop,
            step: None,
            variables: None,
            plot: None,
        })
    }

    pub fn with_step(mut self, step: f64) -> Result<Self, RunError> {
        if !(step.is_finite() && step > 0.0) {
            return Err(RunError::InvalidStep(step));
        }
        self.step = Some(step);
        Ok(self)
    }

    /// An empty list means "use the defaults".
    pub fn with_variables(mut self, variables: Vec<String>) -> Self {
        self.variables = if variables.is_empty() {
            None
        } else {
            Some(variables)
        };
        self
    }

    pub fn with_plot(mut self, path: impl Into<PathBuf>) -> Self {
        self.plot = Some(path.into());
        self
    }

    pub fn start(&self) -> f64 {
        self.start
    }

    pub fn stop(&self) -> f64 {
        self.stop
    }

    pub fn step(&self) -> Option<f64> {
        self.step
    }

    pub fn variables(&self) -> Option<&[String]> {
        self.variables.as_deref()
    }

    pub fn plot(&self) -> Option<&Path> {
        self.plot.as_deref()
    }
}
