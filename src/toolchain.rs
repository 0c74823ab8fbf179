use std::path::{Path, PathBuf};

use anyhow::Result;

use crate::compile::compile_file;
use crate::config::RunnerConfig;
use crate::engine::Simulation;
use crate::report::ChartPlotter;
use crate::result::{Sample, SimulationResult};

/// A simulation loaded by a [`Toolchain`], ready to run.
pub trait SimulationInstance {
    /// Variables recorded when the caller does not ask for any.
    fn default_outputs(&self) -> Vec<String>;

    /// Runs over `[start, stop]`; `step` of `None` leaves the choice to the engine.
    /// Must return every sample or an error.
    fn simulate(
        &mut self,
        start: f64,
        stop: f64,
        step: Option<f64>,
        outputs: &[String],
    ) -> Result<Vec<Sample>>;
}

/// The external collaborators of the job runner: a model compiler, a simulation
/// engine and a plot renderer. Errors are opaque messages, the runner attaches the stage.
pub trait Toolchain {
    type Instance: SimulationInstance;

    /// Compiles `model_name` from `source` into a unit under `out_dir`, returning its path.
    fn compile(&self, model_name: &str, source: &Path, out_dir: &Path) -> Result<PathBuf>;

    fn load(&self, unit: &Path) -> Result<Self::Instance>;

    fn render(&self, result: &SimulationResult, title: &str, path: &Path) -> Result<()>;
}

/// The built-in toolchain: the equation model compiler, the RK4 engine and SVG or PNG plots.
#[derive(Debug, Clone)]
pub struct NativeToolchain {
    unit_extension: String,
    communication_points: usize,
    plotter: ChartPlotter,
}

impl NativeToolchain {
    pub fn new(config: &RunnerConfig) -> Self {
        Self {
            unit_extension: config.unit_extension().to_string(),
            communication_points: config.communication_points,
            plotter: ChartPlotter::new(config.plot_width, config.plot_height),
        }
    }
}

impl Default for NativeToolchain {
    fn default() -> Self {
        Self::new(&RunnerConfig::default())
    }
}

impl SimulationInstance for Simulation {
    fn default_outputs(&self) -> Vec<String> {
        Simulation::default_outputs(self)
    }

    fn simulate(
        &mut self,
        start: f64,
        stop: f64,
        step: Option<f64>,
        outputs: &[String],
    ) -> Result<Vec<Sample>> {
        Simulation::simulate(self, start, stop, step, outputs)
    }
}

impl Toolchain for NativeToolchain {
    type Instance = Simulation;

    fn compile(&self, model_name: &str, source: &Path, out_dir: &Path) -> Result<PathBuf> {
        compile_file(model_name, source, out_dir, self.unit_extension.as_str())
    }

    fn load(&self, unit: &Path) -> Result<Simulation> {
        Simulation::load(unit, self.communication_points)
    }

    fn render(&self, result: &SimulationResult, title: &str, path: &Path) -> Result<()> {
        self.plotter.render(result, title, path)
    }
}
