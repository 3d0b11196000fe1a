//! Synthetic workload generation.

use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Exp, Normal};
use rand_pcg::Pcg64;

use crate::core::config::ClusterConfig;
use crate::core::job::Job;

/// Source of synthetic jobs.
pub trait JobSpawner {
    /// Returns the requested number of jobs ordered by submission time.
    fn jobs(&mut self, count: usize) -> Vec<Job>;
}

/// Spawns jobs with exponential inter-arrival times, uniform node counts and
/// normal-distributed runtimes clamped to the cluster's job time limit.
pub struct NormalDistributedJobSpawner {
    config: ClusterConfig,
    /// Mean inter-arrival time in seconds; zero submits everything at once.
    start_scale: f64,
    rand: Pcg64,
}

impl NormalDistributedJobSpawner {
    pub fn new(config: ClusterConfig, seed: u64) -> Self {
        Self {
            config,
            start_scale: 3. * 3600.,
            rand: Pcg64::seed_from_u64(seed),
        }
    }

    pub fn with_start_scale(mut self, start_scale: f64) -> Self {
        self.start_scale = start_scale;
        self
    }
}

impl JobSpawner for NormalDistributedJobSpawner {
    fn jobs(&mut self, count: usize) -> Vec<Job> {
        let max_minutes = self.config.max_job_time_min;
        let runtime_distr = Normal::new(max_minutes / 3. * 2., max_minutes / 2.).unwrap();
        let arrival_distr = (self.start_scale > 0.).then(|| Exp::new(1. / self.start_scale).unwrap());

        let mut submission_time = 0.;
        let mut jobs = Vec::with_capacity(count);
        for id in 0..count {
            if let Some(arrival_distr) = &arrival_distr {
                submission_time += arrival_distr.sample(&mut self.rand);
            }
            let minutes = runtime_distr
                .sample(&mut self.rand)
                .min(max_minutes)
                .max(max_minutes / 100.);
            let runtime = (minutes * 60.).round();
            let nodes = self.rand.gen_range(1..=self.config.nodes);
            let mut job = Job::new(
                id as u64,
                &id.to_string(),
                nodes,
                self.config.cpus_per_processor,
                submission_time,
                vec![runtime],
            );
            job.account = Some(self.rand.gen_range(1..11u32).to_string());
            jobs.push(job);
        }
        jobs
    }
}
