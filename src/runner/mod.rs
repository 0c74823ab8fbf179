use std::path::{Path, PathBuf};

use log::{debug, info, warn};
use uid::Id;

use crate::config::RunnerConfig;
use crate::result::SimulationResult;
use crate::timing::TimeLogger;
use crate::toolchain::{NativeToolchain, SimulationInstance, Toolchain};

pub mod error;
pub use error::{JobError, LoadError, ReportWarning, ResolutionError, RunError, Stage};

pub mod model_ref;
pub use model_ref::{ArtifactOrigin, CompiledArtifact, ModelKind, ModelReference};

pub mod request;
pub use request::SimulationRequest;

use model_ref::has_extension;

/// Where a job is in the pipeline. Transitions only move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    Unresolved,
    Resolved,
    Loaded,
    Completed,
    Failed(Stage),
}

impl JobState {
    fn rank(&self) -> usize {
        match self {
            JobState::Unresolved => 0,
            JobState::Resolved => 1,
            JobState::Loaded => 2,
            JobState::Completed | JobState::Failed(_) => 3,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobState::Completed | JobState::Failed(_))
    }

    /// Moves to `next`; a terminal state or a backwards move stays where it is.
    pub fn advance(self, next: JobState) -> JobState {
        if self.is_terminal() || next.rank() <= self.rank() {
            debug!("ignoring job state change {:?} -> {:?}", self, next);
            return self;
        }
        next
    }
}

impl JobError {
    /// The terminal state of the job that produced this error.
    pub fn state(&self) -> JobState {
        JobState::Failed(self.stage())
    }
}

/// A loaded simulation together with the artifact it came from.
pub struct LoadedSimulation<I> {
    instance: I,
    artifact: CompiledArtifact,
}

impl<I> LoadedSimulation<I> {
    pub fn instance(&self) -> &I {
        &self.instance
    }

    pub fn artifact(&self) -> &CompiledArtifact {
        &self.artifact
    }
}

/// The outcome of a job that got through `run`.
#[derive(Debug, Clone)]
pub struct JobReport {
    pub job_id: String,
    pub state: JobState,
    pub artifact: CompiledArtifact,
    pub result: SimulationResult,
    pub warnings: Vec<ReportWarning>,
}

/// Drives one model through resolve, load, run and report.
pub struct JobRunner<T: Toolchain> {
    toolchain: T,
    config: RunnerConfig,
}

impl JobRunner<NativeToolchain> {
    pub fn native(config: RunnerConfig) -> Self {
        Self::new(NativeToolchain::new(&config), config)
    }
}

impl<T: Toolchain> JobRunner<T> {
    pub fn new(toolchain: T, config: RunnerConfig) -> Self {
        Self { toolchain, config }
    }

    pub fn toolchain(&self) -> &T {
        &self.toolchain
    }

    pub fn config(&self) -> &RunnerConfig {
        &self.config
    }

    fn artifact_dir(&self, source: &Path) -> PathBuf {
        match &self.config.artifact_dir {
            Some(dir) => dir.clone(),
            None => match source.parent() {
                Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
                _ => PathBuf::from("."),
            },
        }
    }

    /// Produces a loadable artifact, compiling raw models. Nothing is loaded here.
    pub fn resolve(&self, reference: &ModelReference) -> Result<CompiledArtifact, ResolutionError> {
        let path = reference.path();
        match reference.kind() {
            ModelKind::RawModel { model_name } => {
                if !has_extension(path, self.config.raw_extension()) {
                    return Err(ResolutionError::UnsupportedFormat(path.to_path_buf()));
                }
                if !path.is_file() {
                    return Err(ResolutionError::NotFound(path.to_path_buf()));
                }
                let out_dir = self.artifact_dir(path);
                info!(
                    "compiling model '{}' from {} into {}",
                    model_name,
                    path.display(),
                    out_dir.display()
                );
                let unit = self
                    .toolchain
                    .compile(model_name, path, out_dir.as_path())
                    .map_err(|e| ResolutionError::Compile {
                        model_name: model_name.clone(),
                        reason: format!("{:#}", e),
                    })?;
                Ok(CompiledArtifact::new(
                    unit,
                    ArtifactOrigin::Compiled {
                        model_name: model_name.clone(),
                        source: path.to_path_buf(),
                    },
                ))
            }
            ModelKind::PrecompiledUnit => {
                if !has_extension(path, self.config.unit_extension()) {
                    return Err(ResolutionError::UnsupportedFormat(path.to_path_buf()));
                }
                if !path.is_file() {
                    return Err(ResolutionError::NotFound(path.to_path_buf()));
                }
                debug!("using compiled unit {}", path.display());
                Ok(CompiledArtifact::new(
                    path.to_path_buf(),
                    ArtifactOrigin::Precompiled,
                ))
            }
        }
    }

    pub fn load(
        &self,
        artifact: CompiledArtifact,
    ) -> Result<LoadedSimulation<T::Instance>, LoadError> {
        let instance = self
            .toolchain
            .load(artifact.path())
            .map_err(|e| LoadError {
                unit: artifact.path().to_path_buf(),
                message: format!("{:#}", e),
            })?;
        Ok(LoadedSimulation { instance, artifact })
    }

    /// Variables to record: the request's, then the configured defaults, then the engine's.
    fn outputs(&self, instance: &T::Instance, request: &SimulationRequest) -> Vec<String> {
        if let Some(variables) = request.variables() {
            return variables.to_vec();
        }
        match &self.config.default_variables {
            Some(variables) if !variables.is_empty() => variables.clone(),
            _ => instance.default_outputs(),
        }
    }

    pub fn run(
        &self,
        loaded: &mut LoadedSimulation<T::Instance>,
        request: &SimulationRequest,
    ) -> Result<SimulationResult, RunError> {
        let outputs = self.outputs(&loaded.instance, request);
        debug!(
            "running {} over [{}, {}] recording {:?}",
            loaded.artifact.label(),
            request.start(),
            request.stop(),
            outputs
        );
        let samples = loaded
            .instance
            .simulate(request.start(), request.stop(), request.step(), outputs.as_slice())
            .map_err(|e| RunError::Engine {
                reason: format!("{:#}", e),
            })?;
        if samples.is_empty() {
            return Err(RunError::Engine {
                reason: "engine returned no samples".to_string(),
            });
        }
        if let Some(w) = samples.windows(2).find(|w| w[1].time <= w[0].time) {
            return Err(RunError::Engine {
                reason: format!(
                    "engine returned samples out of order (t = {} after t = {})",
                    w[1].time, w[0].time
                ),
            });
        }
        Ok(SimulationResult::new(outputs, samples))
    }

    /// Renders `result` to `plot`. Failures come back as a warning, the result is never touched.
    pub fn report(
        &self,
        result: &SimulationResult,
        title: &str,
        plot: Option<&Path>,
    ) -> Option<ReportWarning> {
        let path = plot?;
        match self.toolchain.render(result, title, path) {
            Ok(()) => None,
            Err(e) => {
                let warning = ReportWarning {
                    path: path.to_path_buf(),
                    reason: format!("{:#}", e),
                };
                warn!("{}", warning);
                Some(warning)
            }
        }
    }

    pub fn execute(
        &self,
        reference: &ModelReference,
        request: &SimulationRequest,
    ) -> Result<JobReport, JobError> {
        let mut timer = TimeLogger::new();
        self.execute_timed(reference, request, &mut timer)
    }

    /// Runs the full pipeline, timing each stage on `timer`. The first failure ends the job.
    pub fn execute_timed(
        &self,
        reference: &ModelReference,
        request: &SimulationRequest,
        timer: &mut TimeLogger,
    ) -> Result<JobReport, JobError> {
        let job_id = Id::<u32>::new().to_string();
        let mut state = JobState::Unresolved;
        let fail = |err: JobError| {
            info!("job {} {:?}: {}", job_id, err.state(), err);
            err
        };
        info!("job {}: {}", job_id, reference);

        timer.start("resolve");
        let artifact = self.resolve(reference);
        timer.stop("resolve");
        let artifact = artifact.map_err(|e| fail(e.into()))?;
        state = state.advance(JobState::Resolved);
        info!("job {}: resolved {}", job_id, artifact.path().display());

        timer.start("load");
        let loaded = self.load(artifact);
        timer.stop("load");
        let mut loaded = loaded.map_err(|e| fail(e.into()))?;
        state = state.advance(JobState::Loaded);
        info!("job {}: loaded {}", job_id, loaded.artifact.label());

        timer.start("run");
        let result = self.run(&mut loaded, request);
        timer.stop("run");
        let result = result.map_err(|e| fail(e.into()))?;
        state = state.advance(JobState::Completed);
        info!(
            "job {}: recorded {} samples of {} variables",
            job_id,
            result.len(),
            result.variables().len()
        );

        let mut warnings = Vec::new();
        if request.plot().is_some() {
            timer.start("report");
            warnings.extend(self.report(&result, loaded.artifact.label().as_str(), request.plot()));
            timer.stop("report");
        }

        Ok(JobReport {
            job_id,
            state,
            artifact: loaded.artifact,
            result,
            warnings,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;
    use std::fs;

    use anyhow::{anyhow, Result};

    use super::*;
    use crate::result::Sample;

    #[derive(Default)]
    struct FakeToolchain {
        compiles: Cell<usize>,
        loads: Cell<usize>,
        fail_compile: bool,
        fail_load: bool,
        fail_render: bool,
    }

    struct FakeInstance {
        runs: usize,
    }

    impl SimulationInstance for FakeInstance {
        fn default_outputs(&self) -> Vec<String> {
            vec!["x".to_string()]
        }

        fn simulate(
            &mut self,
            start: f64,
            stop: f64,
            step: Option<f64>,
            outputs: &[String],
        ) -> Result<Vec<Sample>> {
            self.runs += 1;
            if outputs.iter().any(|o| o != "x" && o != "y") {
                return Err(anyhow!("unknown variable"));
            }
            let n = step.map(|h| ((stop - start) / h).ceil() as usize).unwrap_or(10);
            Ok((0..=n)
                .map(|k| {
                    let t = start + (stop - start) * k as f64 / n as f64;
                    let mut sample = Sample::new(t);
                    for o in outputs {
                        sample.values.insert(o.clone(), t);
                    }
                    sample
                })
                .collect())
        }
    }

    impl Toolchain for FakeToolchain {
        type Instance = FakeInstance;

        fn compile(&self, model_name: &str, _source: &Path, out_dir: &Path) -> Result<PathBuf> {
            self.compiles.set(self.compiles.get() + 1);
            if self.fail_compile {
                return Err(anyhow!("Line 1, Column 7: Error: syntax"));
            }
            Ok(out_dir.join(format!("{}.fmu", model_name)))
        }

        fn load(&self, _unit: &Path) -> Result<FakeInstance> {
            self.loads.set(self.loads.get() + 1);
            if self.fail_load {
                return Err(anyhow!("corrupt unit"));
            }
            Ok(FakeInstance { runs: 0 })
        }

        fn render(&self, _result: &SimulationResult, _title: &str, _path: &Path) -> Result<()> {
            if self.fail_render {
                return Err(anyhow!("disk full"));
            }
            Ok(())
        }
    }

    fn runner(toolchain: FakeToolchain) -> JobRunner<FakeToolchain> {
        let _ = env_logger::builder().is_test(true).try_init();
        JobRunner::new(toolchain, RunnerConfig::default())
    }

    #[test]
    fn missing_unit_is_not_loaded() {
        let runner = runner(FakeToolchain::default());
        let request = SimulationRequest::new(0.0, 5.0).unwrap();
        let err = runner
            .execute(&ModelReference::precompiled("no/such/model.fmu"), &request)
            .unwrap_err();
        assert_eq!(
            err,
            JobError::Resolve(ResolutionError::NotFound(PathBuf::from(
                "no/such/model.fmu"
            )))
        );
        assert_eq!(err.exit_code(), 1);
        assert_eq!(err.state(), JobState::Failed(Stage::Resolve));
        assert_eq!(runner.toolchain().loads.get(), 0);
    }

    #[test]
    fn unsupported_extension() {
        let runner = runner(FakeToolchain::default());
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("system.ssp");
        fs::write(&path, "").unwrap();
        let err = runner
            .resolve(&ModelReference::precompiled(path.clone()))
            .unwrap_err();
        assert_eq!(err, ResolutionError::UnsupportedFormat(path.clone()));
        let err = runner
            .resolve(&ModelReference::raw(path.clone(), "A"))
            .unwrap_err();
        assert_eq!(err, ResolutionError::UnsupportedFormat(path));
        assert_eq!(runner.toolchain().compiles.get(), 0);
    }

    #[test]
    fn raw_model_compiles_next_to_source() {
        let runner = runner(FakeToolchain::default());
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("a.mo");
        fs::write(&source, "model A end A;").unwrap();
        let artifact = runner.resolve(&ModelReference::raw(source.clone(), "A")).unwrap();
        assert_eq!(artifact.path(), dir.path().join("A.fmu"));
        assert_eq!(
            artifact.origin(),
            &ArtifactOrigin::Compiled {
                model_name: "A".to_string(),
                source
            }
        );
        assert_eq!(runner.toolchain().compiles.get(), 1);
    }

    #[test]
    fn missing_source_is_not_compiled() {
        let runner = runner(FakeToolchain::default());
        let err = runner
            .resolve(&ModelReference::raw("missing.mo", "A"))
            .unwrap_err();
        assert_eq!(err, ResolutionError::NotFound(PathBuf::from("missing.mo")));
        assert_eq!(runner.toolchain().compiles.get(), 0);
    }

    #[test]
    fn compile_failure_keeps_reason() {
        let runner = runner(FakeToolchain {
            fail_compile: true,
            ..Default::default()
        });
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("a.mo");
        fs::write(&source, "model").unwrap();
        let request = SimulationRequest::new(0.0, 1.0).unwrap();
        let err = runner
            .execute(&ModelReference::raw(source, "A"), &request)
            .unwrap_err();
        assert_eq!(err.stage(), Stage::Resolve);
        assert!(err.to_string().contains("Line 1, Column 7"));
        assert_eq!(runner.toolchain().loads.get(), 0);
    }

    #[test]
    fn load_failure() {
        let runner = runner(FakeToolchain {
            fail_load: true,
            ..Default::default()
        });
        let dir = tempfile::tempdir().unwrap();
        let unit = dir.path().join("A.fmu");
        fs::write(&unit, "{}").unwrap();
        let request = SimulationRequest::new(0.0, 1.0).unwrap();
        let err = runner
            .execute(&ModelReference::precompiled(unit.clone()), &request)
            .unwrap_err();
        assert_eq!(
            err,
            JobError::Load(LoadError {
                unit,
                message: "corrupt unit".to_string()
            })
        );
        assert_eq!(err.exit_code(), 2);
        assert_eq!(err.state(), JobState::Failed(Stage::Load));
    }

    #[test]
    fn run_failure() {
        let runner = runner(FakeToolchain::default());
        let dir = tempfile::tempdir().unwrap();
        let unit = dir.path().join("A.fmu");
        fs::write(&unit, "{}").unwrap();
        let request = SimulationRequest::new(0.0, 1.0)
            .unwrap()
            .with_variables(vec!["nope".to_string()]);
        let err = runner
            .execute(&ModelReference::precompiled(unit), &request)
            .unwrap_err();
        assert_eq!(err.stage(), Stage::Run);
        assert_eq!(err.exit_code(), 3);
    }

    #[test]
    fn failed_render_keeps_result() {
        let runner = runner(FakeToolchain {
            fail_render: true,
            ..Default::default()
        });
        let dir = tempfile::tempdir().unwrap();
        let unit = dir.path().join("A.fmu");
        fs::write(&unit, "{}").unwrap();
        let request = SimulationRequest::new(0.0, 5.0).unwrap();
        let reference = ModelReference::precompiled(unit);

        let plain = runner.execute(&reference, &request).unwrap();
        let plotted = runner
            .execute(&reference, &request.clone().with_plot(dir.path().join("p.svg")))
            .unwrap();
        assert_eq!(plotted.state, JobState::Completed);
        assert_eq!(plotted.result, plain.result);
        assert_eq!(plotted.warnings.len(), 1);
        assert!(plotted.warnings[0].reason.contains("disk full"));
        assert!(plain.warnings.is_empty());
    }

    #[test]
    fn outputs_fall_back_to_config_then_engine() {
        let dir = tempfile::tempdir().unwrap();
        let unit = dir.path().join("A.fmu");
        fs::write(&unit, "{}").unwrap();
        let reference = ModelReference::precompiled(unit);
        let request = SimulationRequest::new(0.0, 1.0).unwrap();

        let runner = runner(FakeToolchain::default());
        let report = runner.execute(&reference, &request).unwrap();
        assert_eq!(report.result.variables(), ["x".to_string()]);

        let config = RunnerConfig {
            default_variables: Some(vec!["y".to_string()]),
            ..Default::default()
        };
        let runner = JobRunner::new(FakeToolchain::default(), config);
        let report = runner.execute(&reference, &request).unwrap();
        assert_eq!(report.result.variables(), ["y".to_string()]);
        let report = runner
            .execute(
                &reference,
                &request.with_variables(vec!["x".to_string(), "y".to_string()]),
            )
            .unwrap();
        assert_eq!(report.result.variables().len(), 2);
    }

    #[test]
    fn stages_are_timed() {
        let runner = runner(FakeToolchain::default());
        let dir = tempfile::tempdir().unwrap();
        let unit = dir.path().join("A.fmu");
        fs::write(&unit, "{}").unwrap();
        let request = SimulationRequest::new(0.0, 1.0)
            .unwrap()
            .with_plot(dir.path().join("p.svg"));
        let mut timer = TimeLogger::new();
        let report = runner
            .execute_timed(&ModelReference::precompiled(unit), &request, &mut timer)
            .unwrap();
        assert!(report.warnings.is_empty());
        for stage in ["resolve", "load", "run", "report"] {
            assert_eq!(timer.delta(stage).len(), 1, "{}", stage);
        }
    }

    #[test]
    fn state_only_moves_forward() {
        let state = JobState::Unresolved.advance(JobState::Resolved);
        assert_eq!(state, JobState::Resolved);
        assert_eq!(state.advance(JobState::Unresolved), JobState::Resolved);
        let failed = state.advance(JobState::Failed(Stage::Load));
        assert_eq!(failed, JobState::Failed(Stage::Load));
        assert_eq!(failed.advance(JobState::Completed), failed);
        assert!(JobState::Completed.is_terminal());
    }

    #[test]
    fn run_rejects_out_of_order_samples() {
        struct Backwards;
        impl SimulationInstance for Backwards {
            fn default_outputs(&self) -> Vec<String> {
                vec![]
            }
            fn simulate(&mut self, _: f64, _: f64, _: Option<f64>, _: &[String]) -> Result<Vec<Sample>> {
                Ok(vec![Sample::new(1.0), Sample::new(0.0)])
            }
        }
        struct BackwardsToolchain;
        impl Toolchain for BackwardsToolchain {
            type Instance = Backwards;
            fn compile(&self, _: &str, _: &Path, _: &Path) -> Result<PathBuf> {
                Err(anyhow!("unused"))
            }
            fn load(&self, _: &Path) -> Result<Backwards> {
                Ok(Backwards)
            }
            fn render(&self, _: &SimulationResult, _: &str, _: &Path) -> Result<()> {
                Ok(())
            }
        }
        let runner = JobRunner::new(BackwardsToolchain, RunnerConfig::default());
        let mut loaded = runner
            .load(CompiledArtifact::new(PathBuf::from("A.fmu"), ArtifactOrigin::Precompiled))
            .unwrap();
        let err = runner
            .run(&mut loaded, &SimulationRequest::new(0.0, 1.0).unwrap())
            .unwrap_err();
        assert!(err.to_string().contains("out of order"));
    }
}
