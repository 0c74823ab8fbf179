use std::path::Path;

use anyhow::{anyhow, Result};
use itertools::Itertools;
use log::{debug, info};
use ndarray::Array1;

use crate::compile::CompiledModel;
use crate::result::Sample;
use crate::unit;

pub mod solver;
pub use solver::{grid_time, rk4_step, step_count};

// every step is recorded, so this also bounds the memory held by one result
pub const MAX_STEPS: usize = 1_000_000;

#[derive(Debug, Clone, Copy, PartialEq)]
enum Output {
    State(usize),
    Algebraic(usize),
    Parameter(f64),
}

/// A compiled model loaded into the fixed step RK4 engine.
#[derive(Debug, Clone)]
pub struct Simulation {
    model: CompiledModel,
    communication_points: usize,
}

impl Simulation {
    pub fn load(path: &Path, communication_points: usize) -> Result<Self> {
        let model = unit::read_unit(path)?;
        info!(
            "loaded unit {} (model '{}')",
            path.display(),
            model.name()
        );
        Self::from_model(model, communication_points)
    }

    pub fn from_model(model: CompiledModel, communication_points: usize) -> Result<Self> {
        if communication_points == 0 {
            return Err(anyhow!("communication points must be at least 1"));
        }
        Ok(Self {
            model,
            communication_points,
        })
    }

    pub fn model(&self) -> &CompiledModel {
        &self.model
    }

    /// Every name that can be recorded: states, algebraics, then parameters.
    pub fn variables(&self) -> Vec<String> {
        self.model
            .states()
            .iter()
            .map(|s| s.name.clone())
            .chain(self.model.algebraics().iter().map(|a| a.name.clone()))
            .chain(self.model.parameters().iter().map(|p| p.name.clone()))
            .collect()
    }

    /// States and algebraic variables, in that order.
    pub fn default_outputs(&self) -> Vec<String> {
        self.model
            .states()
            .iter()
            .map(|s| s.name.clone())
            .chain(self.model.algebraics().iter().map(|a| a.name.clone()))
            .collect()
    }

    pub fn default_step(&self, start: f64, stop: f64) -> f64 {
        (stop - start) / self.communication_points as f64
    }

    fn resolve_output(&self, name: &str) -> Option<Output> {
        if let Some(i) = self.model.states().iter().position(|s| s.name == name) {
            return Some(Output::State(i));
        }
        if let Some(i) = self.model.algebraics().iter().position(|a| a.name == name) {
            return Some(Output::Algebraic(i));
        }
        self.model
            .parameters()
            .iter()
            .find(|p| p.name == name)
            .map(|p| Output::Parameter(p.value))
    }

    fn record(&self, t: f64, y: &Array1<f64>, w: &[f64], outputs: &[(&str, Output)]) -> Sample {
        let mut sample = Sample::new(t);
        for (name, output) in outputs {
            let value = match output {
                Output::State(i) => y[*i],
                Output::Algebraic(i) => w[*i],
                Output::Parameter(value) => *value,
            };
            sample.values.insert(name.to_string(), value);
        }
        sample
    }

    /// Integrates from `start` to `stop`, recording `outputs` at every step. Either all
    /// samples are returned or an error, never a partial trajectory.
    pub fn simulate(
        &self,
        start: f64,
        stop: f64,
        step: Option<f64>,
        outputs: &[String],
    ) -> Result<Vec<Sample>> {
        if !(start.is_finite() && stop.is_finite()) || stop <= start {
            return Err(anyhow!(
                "invalid time span [{}, {}], stop must be after start",
                start,
                stop
            ));
        }
        let step = step.unwrap_or_else(|| self.default_step(start, stop));
        if !(step.is_finite() && step > 0.0) {
            return Err(anyhow!("invalid step size {}", step));
        }
        let n_steps = step_count(start, stop, step);
        if n_steps > MAX_STEPS {
            return Err(anyhow!(
                "step size {} needs {} steps, more than the limit of {}",
                step,
                n_steps,
                MAX_STEPS
            ));
        }

        let unknown = outputs
            .iter()
            .filter(|name| self.resolve_output(name).is_none())
            .collect::<Vec<_>>();
        if !unknown.is_empty() {
            return Err(anyhow!(
                "unknown variable(s) {} (available: {})",
                unknown.iter().map(|n| format!("'{}'", n)).join(", "),
                self.variables().join(", ")
            ));
        }
        let outputs = outputs
            .iter()
            .filter_map(|name| self.resolve_output(name).map(|o| (name.as_str(), o)))
            .collect::<Vec<_>>();

        debug!(
            "simulating '{}' over [{}, {}] with step {} ({} steps)",
            self.model.name(),
            start,
            stop,
            step,
            n_steps
        );

        let n_states = self.model.states().len();
        let mut w = vec![0.0; self.model.algebraics().len()];
        let mut rhs = |t: f64, y: &Array1<f64>| {
            let mut scratch = vec![0.0; self.model.algebraics().len()];
            let mut rr = vec![0.0; n_states];
            let yy = y.to_vec();
            self.model.rhs(t, yy.as_slice(), scratch.as_mut_slice(), rr.as_mut_slice());
            Array1::from(rr)
        };

        let mut y = Array1::from(self.model.initial_state());
        let mut t = start;
        let mut samples = Vec::with_capacity(n_steps + 1);
        self.model.calc_algebraics(t, y.as_slice().unwrap_or(&[]), w.as_mut_slice());
        check_finite(t, &y, &w, &self.model)?;
        samples.push(self.record(t, &y, &w, &outputs));

        for k in 1..=n_steps {
            let t_next = grid_time(start, stop, step, k, n_steps);
            y = rk4_step(&mut rhs, t, &y, t_next - t);
            t = t_next;
            self.model
                .calc_algebraics(t, y.as_slice().unwrap_or(&[]), w.as_mut_slice());
            check_finite(t, &y, &w, &self.model)?;
            samples.push(self.record(t, &y, &w, &outputs));
        }
        Ok(samples)
    }
}

fn check_finite(t: f64, y: &Array1<f64>, w: &[f64], model: &CompiledModel) -> Result<()> {
    let bad_state = y
        .iter()
        .position(|v| !v.is_finite())
        .map(|i| model.states()[i].name.as_str());
    let bad_alg = w
        .iter()
        .position(|v| !v.is_finite())
        .map(|i| model.algebraics()[i].name.as_str());
    match bad_state.or(bad_alg) {
        Some(name) => Err(anyhow!(
            "solver diverged at time {}: '{}' is not finite",
            t,
            name
        )),
        None => Ok(()),
    }
}
