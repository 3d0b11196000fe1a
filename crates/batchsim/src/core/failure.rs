//! Stochastic node failure and repair model.

use rand::SeedableRng;
use rand_distr::{Distribution, Exp, Normal};
use rand_pcg::Pcg64;

use crate::core::config::ClusterConfig;

/// Draws failure and repair times from the cluster's MTBF/MTTR parameters.
///
/// All draws come from a generator seeded once at construction, so a fixed
/// seed reproduces the same failure sequence across runs.
pub struct FailureModel {
    failure_distr: Exp<f64>,
    repair_distr: Normal<f64>,
    min_repair_time: f64,
    rand: Pcg64,
}

impl FailureModel {
    pub fn new(config: &ClusterConfig, seed: u64) -> Self {
        Self {
            failure_distr: Exp::new(1. / config.node_mtbf).unwrap(),
            repair_distr: Normal::new(config.node_mttr, config.node_mttr_deviation).unwrap(),
            min_repair_time: config.node_min_repair_time,
            rand: Pcg64::seed_from_u64(seed),
        }
    }

    /// Draws one exponential failure time per exposed node and returns the
    /// earliest draw if it falls inside the exposure window.
    pub fn check_when_job_fails(&mut self, node_count: u32, exposure: f64) -> Option<f64> {
        let mut earliest = f64::INFINITY;
        for _ in 0..node_count {
            let t = self.failure_distr.sample(&mut self.rand);
            if t < earliest {
                earliest = t;
            }
        }
        if earliest < exposure {
            Some(earliest)
        } else {
            None
        }
    }

    /// Repair duration for a failed node, floored at the configured minimum.
    pub fn time_until_node_is_back(&mut self) -> f64 {
        self.repair_distr.sample(&mut self.rand).max(self.min_repair_time)
    }
}
