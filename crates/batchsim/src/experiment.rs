//! Tools for comparing scheduling policies over a common workload.

use std::fs::File;
use std::sync::{Arc, Mutex};

use indexmap::IndexMap;
use log::info;
use serde::{Deserialize, Serialize};
use threadpool::ThreadPool;

use crate::core::config::SimulationConfig;
use crate::core::job::{Job, JobRef};
use crate::core::reporter::{SimulationSummary, SummaryReporter};
use crate::simulation::BatchSimulation;

/// One experiment: the same workload replayed under several scheduling
/// policies.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExperimentConfig {
    /// Base configuration shared by all runs.
    pub simulation: SimulationConfig,
    /// Scheduler config strings, one simulation run each.
    pub schedulers: Vec<String>,
}

impl ExperimentConfig {
    pub fn from_file(file_name: &str) -> Self {
        serde_yaml::from_str(
            &std::fs::read_to_string(file_name).unwrap_or_else(|_| panic!("Can't read file {}", file_name)),
        )
        .unwrap_or_else(|_| panic!("Can't parse YAML from file {}", file_name))
    }
}

/// Implements execution of experiment.
pub struct Experiment {
    config: ExperimentConfig,
    jobs: Vec<Job>,
    results_path: Option<String>,
}

impl Experiment {
    pub fn new(config: ExperimentConfig, jobs: Vec<Job>, results_path: Option<String>) -> Self {
        Self {
            config,
            jobs,
            results_path,
        }
    }

    /// Runs every scheduler on its own copy of the workload using the given
    /// number of worker threads and returns per-scheduler summaries in config
    /// order.
    pub fn run(&mut self, num_threads: usize) -> IndexMap<String, SimulationSummary> {
        let results = Arc::new(Mutex::new(Vec::new()));
        let pool = ThreadPool::new(num_threads);

        for (run_id, scheduler) in self.config.schedulers.iter().enumerate() {
            let mut run_config = self.config.simulation.clone();
            run_config.scheduler = scheduler.clone();
            let scheduler = scheduler.clone();
            let jobs = self.jobs.clone();
            let results = results.clone();

            pool.execute(move || {
                info!("run {}: {}", run_id, scheduler);
                let job_refs: Vec<JobRef> = jobs.into_iter().map(Job::into_ref).collect();
                let mut simulation = BatchSimulation::new(run_config);
                let mut reporter = SummaryReporter::new();
                simulation.run(&job_refs, &mut reporter);
                results.lock().unwrap().push((run_id, scheduler, reporter.summary().clone()));
            });
        }
        pool.join();

        let mut results = Arc::try_unwrap(results).unwrap().into_inner().unwrap();
        results.sort_by_key(|(run_id, _, _)| *run_id);
        let results: IndexMap<String, SimulationSummary> = results
            .into_iter()
            .map(|(_, scheduler, summary)| (scheduler, summary))
            .collect();

        if let Some(path) = &self.results_path {
            let file = File::create(path).unwrap_or_else(|_| panic!("Can't create file {}", path));
            serde_json::to_writer_pretty(file, &results)
                .unwrap_or_else(|e| panic!("Can't write results to {}: {}", path, e));
        }
        results
    }
}
