use clap::Parser;
use log::info;

use batchsim::core::config::SimulationConfig;
use batchsim::experiment::{Experiment, ExperimentConfig};
use batchsim::extensions::job_spawner::{JobSpawner, NormalDistributedJobSpawner};
use batchsim::extensions::trace_reader::JobTraceReader;

fn init_logger() {
    use env_logger::Builder;
    use std::io::Write;
    Builder::from_default_env()
        .format(|buf, record| writeln!(buf, "{}", record.args()))
        .init();
}

/// Replays a workload under several scheduling policies and prints the
/// resulting utilization and cost figures.
#[derive(Parser, Debug)]
#[clap(about, long_about = None)]
struct Args {
    /// Simulation config file (built-in defaults are used when omitted)
    #[clap(long)]
    config: Option<String>,

    /// Comma-separated scheduler config strings
    #[clap(
        long,
        default_value = "FIFO,FIFOBackfill,BiggestFirstBackfill,LongestFirstBackfill"
    )]
    schedulers: String,

    /// Number of jobs to simulate
    #[clap(long, default_value_t = 1000)]
    job_count: usize,

    /// Job trace file to replay instead of a synthetic workload
    #[clap(long)]
    trace: Option<String>,

    /// Where to write the per-run results as JSON
    #[clap(long)]
    results: Option<String>,

    /// Number of worker threads
    #[clap(long, default_value_t = 4)]
    threads: usize,
}

fn main() {
    init_logger();
    let args = Args::parse();

    let simulation = args
        .config
        .as_deref()
        .map(SimulationConfig::from_file)
        .unwrap_or_default();

    let jobs = match &args.trace {
        Some(trace) => JobTraceReader::new().with_limit(args.job_count).read(trace),
        None => {
            NormalDistributedJobSpawner::new(simulation.cluster.clone(), simulation.seed).jobs(args.job_count)
        }
    };

    let schedulers = args.schedulers.split(',').map(str::to_string).collect();
    let config = ExperimentConfig { simulation, schedulers };
    let results = Experiment::new(config, jobs, args.results.clone()).run(args.threads);

    for (scheduler, summary) in &results {
        info!(
            "{}: utilization {:.1}%, energy {:.0} kWh, costs {:.1}, jobs aborted {}",
            scheduler,
            summary.utilization_percent,
            summary.energy_consumed_kwh,
            summary.costs_total,
            summary.jobs_aborted
        );
    }
}
