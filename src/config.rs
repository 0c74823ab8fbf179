use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use serde::Deserialize;

/// Defaults for the job runner. Every field can be set from a TOML file; missing
/// fields keep their default.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RunnerConfig {
    /// extension of raw model sources that need compiling
    pub raw_extension: String,
    /// extension of compiled simulation units
    pub unit_extension: String,
    /// where compiled units are written, defaults to the directory of the source
    pub artifact_dir: Option<PathBuf>,
    pub start_time: f64,
    pub stop_time: f64,
    /// number of output intervals when a request has no step size
    pub communication_points: usize,
    /// recorded when a request names no variables, defaults to the engine's choice
    pub default_variables: Option<Vec<String>>,
    pub plot_width: u32,
    pub plot_height: u32,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            raw_extension: "mo".to_string(),
            unit_extension: "fmu".to_string(),
            artifact_dir: None,
            start_time: 0.0,
            stop_time: 5.0,
            communication_points: 500,
            default_variables: None,
            plot_width: 1024,
            plot_height: 768,
        }
    }
}

impl RunnerConfig {
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("cannot read config file {}", path.display()))?;
        Self::from_toml_str(text.as_str())
            .with_context(|| format!("invalid config file {}", path.display()))
    }

    pub fn validate(&self) -> Result<()> {
        let raw = self.raw_extension.trim_start_matches('.');
        let unit = self.unit_extension.trim_start_matches('.');
        if raw.is_empty() || unit.is_empty() {
            return Err(anyhow!("model extensions must not be empty"));
        }
        if raw.eq_ignore_ascii_case(unit) {
            return Err(anyhow!(
                "raw_extension and unit_extension are both '{}'",
                raw
            ));
        }
        if !(self.start_time.is_finite() && self.stop_time.is_finite())
            || self.stop_time <= self.start_time
        {
            return Err(anyhow!(
                "stop_time ({}) must be after start_time ({})",
                self.stop_time,
                self.start_time
            ));
        }
        if self.communication_points == 0 {
            return Err(anyhow!("communication_points must be at least 1"));
        }
        if self.plot_width == 0 || self.plot_height == 0 {
            return Err(anyhow!("plot size must be non-zero"));
        }
        Ok(())
    }

    pub fn raw_extension(&self) -> &str {
        self.raw_extension.trim_start_matches('.')
    }

    pub fn unit_extension(&self) -> &str {
        self.unit_extension.trim_start_matches('.')
    }
}
