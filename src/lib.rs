extern crate pest;
#[macro_use]
extern crate pest_derive;

pub mod ast;
pub mod compile;
pub mod config;
pub mod engine;
pub mod parser;
pub mod report;
pub mod result;
pub mod runner;
pub mod timing;
pub mod toolchain;
pub mod unit;

pub use compile::{compile_file, compile_str, CompiledModel};
pub use config::RunnerConfig;
pub use engine::Simulation;
pub use result::{Sample, SimulationResult};
pub use runner::{
    ArtifactOrigin, CompiledArtifact, JobError, JobReport, JobRunner, JobState, LoadError,
    ModelKind, ModelReference, ReportWarning, ResolutionError, RunError, SimulationRequest, Stage,
};
pub use timing::TimeLogger;
pub use toolchain::{NativeToolchain, SimulationInstance, Toolchain};
