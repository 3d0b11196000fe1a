//! Batch job description.

use std::cell::RefCell;
use std::rc::Rc;

use crate::core::cluster::Cluster;

/// Shared handle to a job, passed between the simulator, the scheduler and
/// the reporters.
pub type JobRef = Rc<RefCell<Job>>;

/// A single batch job: immutable identity and resource requirements plus the
/// scheduling outcome filled in by the simulator at dispatch time.
#[derive(Debug, Clone)]
pub struct Job {
    pub id: u64,
    pub name: String,
    /// Number of requested nodes.
    pub nodes: u32,
    /// Processes per node.
    pub ppn: u32,
    pub submission_time: f64,
    /// Possible run lengths, e.g. under different CPU frequencies.
    pub durations: Vec<f64>,
    /// Shortest of the possible run lengths.
    pub duration_min: f64,
    /// Longest of the possible run lengths.
    pub duration_max: f64,
    /// Ids of jobs this job depends on. Not consulted by the shipped policies.
    pub dependencies: Vec<u64>,
    pub account: Option<String>,
    pub user: Option<String>,
    pub partition: Option<String>,
    /// Externally measured energy-to-solution in kWh, if known.
    pub ets: Option<f64>,
    /// Externally measured average power consumption in watts, if known.
    pub apc: Option<f64>,

    // Scheduling outcome, written once by the simulator at dispatch time.
    pub start_time: f64,
    pub end_time: f64,
    pub power_consumption: f64,
}

impl Job {
    pub fn new(id: u64, name: &str, nodes: u32, ppn: u32, submission_time: f64, durations: Vec<f64>) -> Self {
        assert!(!name.is_empty(), "job {} has no name", id);
        assert!(nodes > 0, "job {} requests zero nodes", id);
        assert!(submission_time >= 0., "job {} submitted before time zero", id);
        assert!(!durations.is_empty(), "job {} has no durations", id);
        let duration_min = durations.iter().cloned().fold(f64::INFINITY, f64::min);
        let duration_max = durations.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
        assert!(duration_min >= 0., "job {} has a negative duration", id);
        Self {
            id,
            name: name.to_string(),
            nodes,
            ppn,
            submission_time,
            durations,
            duration_min,
            duration_max,
            dependencies: Vec::new(),
            account: None,
            user: None,
            partition: None,
            ets: None,
            apc: None,
            start_time: 0.,
            end_time: 0.,
            power_consumption: 0.,
        }
    }

    /// Wraps the job into the shared handle used across the simulation.
    pub fn into_ref(self) -> JobRef {
        Rc::new(RefCell::new(self))
    }

    /// Power draw in watts when running at the given P-state.
    /// An externally supplied measurement takes precedence over the model.
    pub fn power_consumed(&self, pstate: usize, cluster: &Cluster) -> f64 {
        if let Some(apc) = self.apc {
            return apc;
        }
        let config = cluster.config();
        let cpu_power = config.cpu_frequency_power[pstate];
        self.nodes as f64 * (cpu_power * config.processors_per_node as f64 + config.node_power_consumption)
    }
}
