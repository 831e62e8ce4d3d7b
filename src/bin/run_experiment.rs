//! CLI entry point: load (or default) planner/experiment configuration,
//! pick a demo domain, run a simulation-count sweep, and write the CSV
//! summary. Grounded on `main.cpp`'s option parsing and dispatch.

#[path = "../../demos/corridor.rs"]
mod corridor;
#[path = "../../demos/tiger.rs"]
mod tiger;

use clap::{Parser, ValueEnum};

use pomcp::config::{ExperimentParams, PlannerParams};
use pomcp::driver;
use pomcp::simulator::Simulator;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Domain {
    Tiger,
    Corridor,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Mode {
    /// Sweep simulation counts, report discounted/undiscounted return.
    Discounted,
    /// Sweep simulation counts, report average per-step reward.
    Average,
}

/// Run a POMCP simulation-count sweep against a demo domain.
#[derive(Debug, Parser)]
#[command(name = "pomcp-experiment", version, about)]
struct Cli {
    /// Demo domain to plan over.
    #[arg(long, value_enum, default_value = "tiger")]
    domain: Domain,

    /// Which sweep to run.
    #[arg(long, value_enum, default_value = "discounted")]
    mode: Mode,

    /// CSV output path. `"default"` discards output to /dev/null.
    #[arg(long, default_value = "default")]
    output: String,

    /// Optional JSON file with `PlannerParams` fields; defaults used if absent.
    #[arg(long)]
    planner_config: Option<String>,

    /// Optional JSON file with `ExperimentParams` fields; defaults used if absent.
    #[arg(long)]
    experiment_config: Option<String>,

    /// PRNG seed for the whole sweep.
    #[arg(long, default_value_t = 0)]
    seed: u64,
}

fn load_planner_params(path: Option<&str>) -> PlannerParams {
    match path {
        Some(p) => PlannerParams::from_file(p).unwrap_or_else(|e| {
            log::error!("failed to load planner config {p}: {e}");
            std::process::exit(1);
        }),
        None => PlannerParams::default(),
    }
}

fn load_experiment_params(path: Option<&str>) -> ExperimentParams {
    match path {
        Some(p) => ExperimentParams::from_file(p).unwrap_or_else(|e| {
            log::error!("failed to load experiment config {p}: {e}");
            std::process::exit(1);
        }),
        None => ExperimentParams::default(),
    }
}

fn main() {
    env_logger::init();
    let cli = Cli::parse();

    let planner_params = load_planner_params(cli.planner_config.as_deref());
    let experiment_params = load_experiment_params(cli.experiment_config.as_deref());

    if let Err(e) = experiment_params.validate() {
        log::error!("invalid experiment config: {e}");
        std::process::exit(1);
    }

    let result = match cli.domain {
        Domain::Tiger => {
            let sim = tiger::Tiger::default();
            if let Err(e) = pomcp::config::validate_simulator_shape(sim.discount(), sim.reward_range()) {
                log::error!("invalid simulator shape: {e}");
                std::process::exit(1);
            }
            run(&sim, &sim, planner_params, experiment_params, cli.mode, &cli.output, cli.seed)
        }
        Domain::Corridor => {
            let sim = corridor::Corridor::default();
            if let Err(e) = pomcp::config::validate_simulator_shape(sim.discount(), sim.reward_range()) {
                log::error!("invalid simulator shape: {e}");
                std::process::exit(1);
            }
            run(&sim, &sim, planner_params, experiment_params, cli.mode, &cli.output, cli.seed)
        }
    };

    if let Err(e) = result {
        log::error!("experiment failed: {e}");
        std::process::exit(1);
    }
}

fn run<Sim: pomcp::simulator::Simulator>(
    real: &Sim,
    model: &Sim,
    planner_params: PlannerParams,
    experiment_params: ExperimentParams,
    mode: Mode,
    output: &str,
    seed: u64,
) -> csv::Result<()> {
    match mode {
        Mode::Discounted => driver::discounted_return(real, model, planner_params, experiment_params, output, seed),
        Mode::Average => driver::average_reward(real, model, planner_params, experiment_params, output, seed),
    }
}
