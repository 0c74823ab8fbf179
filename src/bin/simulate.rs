use std::path::PathBuf;
use std::process;

use anyhow::Result;
use clap::Parser;
use log::{error, warn};
use simrun::report::write_json;
use simrun::{
    JobRunner, ModelReference, ResolutionError, RunError, RunnerConfig, SimulationRequest,
    TimeLogger,
};

// invalid arguments or a bad config file
const EXIT_USAGE: i32 = 64;

/// compiles (if needed), runs and plots a model; takes a raw model (.mo) with a model
/// name, or a compiled unit (.fmu)
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Model source or compiled unit
    model_path: PathBuf,

    /// Model to compile (required for raw model sources)
    model_name: Option<String>,

    /// Start time [default: 0, or start_time from the config]
    #[arg(long, allow_negative_numbers = true)]
    start: Option<f64>,

    /// Stop time [default: 5, or stop_time from the config]
    #[arg(long, allow_negative_numbers = true)]
    stop: Option<f64>,

    /// Step size [default: (stop - start) / communication_points]
    #[arg(long)]
    step: Option<f64>,

    /// Comma separated variables to record [default: all states and algebraics]
    #[arg(long, value_delimiter = ',')]
    vars: Vec<String>,

    /// Write a plot of the recorded variables (svg)
    #[arg(long)]
    plot: Option<PathBuf>,

    /// Write the results as json
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Write stage timings as json
    #[arg(long)]
    timings: Option<PathBuf>,

    /// Runner config file (toml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Directory for compiled units [default: next to the model source]
    #[arg(long)]
    out_dir: Option<PathBuf>,
}

fn config(cli: &Args) -> Result<RunnerConfig> {
    let mut config = match &cli.config {
        Some(path) => RunnerConfig::from_file(path)?,
        None => RunnerConfig::default(),
    };
    if let Some(dir) = &cli.out_dir {
        config.artifact_dir = Some(dir.clone());
    }
    Ok(config)
}

fn request(cli: &Args, config: &RunnerConfig) -> Result<SimulationRequest> {
    let mut request = SimulationRequest::new(
        cli.start.unwrap_or(config.start_time),
        cli.stop.unwrap_or(config.stop_time),
    )?;
    if let Some(step) = cli.step {
        request = request.with_step(step)?;
    }
    let vars = cli
        .vars
        .iter()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .collect::<Vec<_>>();
    request = request.with_variables(vars);
    if let Some(plot) = &cli.plot {
        request = request.with_plot(plot.clone());
    }
    Ok(request)
}

// an unusable model path fails resolve and an invalid request fails run, like the
// same errors coming out of the job
fn setup_exit_code(err: &anyhow::Error) -> i32 {
    if err.downcast_ref::<ResolutionError>().is_some() {
        1
    } else if err.downcast_ref::<RunError>().is_some() {
        3
    } else {
        EXIT_USAGE
    }
}

fn usage_exit_code(err: &clap::Error) -> i32 {
    if err.use_stderr() {
        EXIT_USAGE
    } else {
        0
    }
}

fn run(cli: Args) -> i32 {
    let (config, request, reference) = match config(&cli).and_then(|config| {
        let request = request(&cli, &config)?;
        let reference =
            ModelReference::infer(cli.model_path.clone(), cli.model_name.as_deref(), &config)?;
        Ok((config, request, reference))
    }) {
        Ok(setup) => setup,
        Err(e) => {
            error!("{:#}", e);
            return setup_exit_code(&e);
        }
    };

    let runner = JobRunner::native(config);
    let mut timer = TimeLogger::new();
    let outcome = runner.execute_timed(&reference, &request, &mut timer);
    timer.stop_all();
    if let Some(path) = &cli.timings {
        if let Err(e) = timer.save(path) {
            warn!("{:#}", e);
        }
    }

    let report = match outcome {
        Ok(report) => report,
        Err(e) => {
            error!("{}", e);
            return e.exit_code();
        }
    };
    if let Some(path) = &cli.output {
        if let Err(e) = write_json(&report.result, path) {
            warn!("{:#}", e);
        }
    }
    if let Some(last) = report.result.samples().last() {
        println!("t = {}", last.time);
        for name in report.result.variables() {
            if let Some(value) = last.get(name) {
                println!("  {} = {}", name, value);
            }
        }
    }
    0
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = match Args::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let _ = e.print();
            process::exit(usage_exit_code(&e));
        }
    };
    process::exit(run(cli));
}
