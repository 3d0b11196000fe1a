//! Observers of simulation progress and the statistics they accumulate.

use std::cell::RefCell;
use std::fs::File;
use std::rc::Rc;

use log::{info, warn};
use serde::Serialize;

use crate::core::cluster::Cluster;
use crate::core::energy::EnergyCostModel;
use crate::core::job::JobRef;
use crate::core::scheduler::Placement;

/// Observer notified of every state transition of a simulation run.
///
/// Reporters only record; they never influence scheduling. Notifications may
/// repeat the previously observed timestamp, which must be tolerated.
pub trait Reporter {
    fn set_cluster(&mut self, _cluster: Rc<RefCell<Cluster>>, _energy_model: Rc<RefCell<dyn EnergyCostModel>>) {}

    fn job_submitted(&mut self, _time: f64, _job: &JobRef) {}

    fn job_started(&mut self, _time: f64, _job: &JobRef, _runtime: f64, _placement: &Placement) {}

    fn job_finished(&mut self, _time: f64, _job: &JobRef) {}

    fn job_aborted_with_errors(&mut self, _time: f64, _job: &JobRef) {}

    fn empty_node_failed(&mut self, _time: f64) {}

    fn node_repaired(&mut self, _time: f64) {}

    fn cluster_status_changed(&mut self, _time: f64) {}

    fn print_summary(&mut self, _start_time: f64, _end_time: f64) {}
}

/// Final figures of a simulation run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SimulationSummary {
    pub runtime_days: f64,
    pub node_time: f64,
    pub jobs_started: u64,
    pub utilization_percent: f64,
    pub energy_consumed_kwh: f64,
    pub costs_energy: f64,
    pub costs_center: f64,
    pub costs_total: f64,
    pub node_errors: u64,
    pub nodes_repaired: u64,
    pub jobs_aborted: u64,
}

/// Accumulates utilization, energy and reliability statistics without
/// producing any per-event output.
pub struct SummaryReporter {
    cluster: Option<Rc<RefCell<Cluster>>>,
    energy_model: Option<Rc<RefCell<dyn EnergyCostModel>>>,
    node_time: f64,
    energy_consumed: f64,
    power_consumption: f64,
    power_min: f64,
    power_max: f64,
    costs_energy: f64,
    /// Accumulated runtime per P-state.
    pstate_time: Vec<f64>,
    jobs_started: u64,
    node_errors: u64,
    nodes_repaired: u64,
    jobs_aborted: u64,
    last_time: f64,
    summary: SimulationSummary,
}

impl SummaryReporter {
    pub fn new() -> Self {
        Self {
            cluster: None,
            energy_model: None,
            node_time: 0.,
            energy_consumed: 0.,
            power_consumption: 0.,
            power_min: f64::INFINITY,
            power_max: 0.,
            costs_energy: 0.,
            pstate_time: Vec::new(),
            jobs_started: 0,
            node_errors: 0,
            nodes_repaired: 0,
            jobs_aborted: 0,
            last_time: 0.,
            summary: SimulationSummary::default(),
        }
    }

    /// The figures computed by the final `print_summary` call.
    pub fn summary(&self) -> &SimulationSummary {
        &self.summary
    }
}

impl Default for SummaryReporter {
    fn default() -> Self {
        Self::new()
    }
}

impl Reporter for SummaryReporter {
    fn set_cluster(&mut self, cluster: Rc<RefCell<Cluster>>, energy_model: Rc<RefCell<dyn EnergyCostModel>>) {
        self.pstate_time = vec![0.; cluster.borrow().config().cpu_frequency_power.len()];
        self.cluster = Some(cluster);
        self.energy_model = Some(energy_model);
    }

    fn job_submitted(&mut self, time: f64, _job: &JobRef) {
        if self.last_time == 0. {
            self.last_time = time;
        }
    }

    fn job_started(&mut self, _time: f64, job: &JobRef, runtime: f64, placement: &Placement) {
        let job = job.borrow();
        self.node_time += runtime * job.nodes as f64;
        self.jobs_started += 1;
        self.pstate_time[placement.cpu_pstate] += runtime;
        self.power_consumption += job.power_consumption;
        if self.power_max < self.power_consumption {
            self.power_max = self.power_consumption;
        }
    }

    fn job_finished(&mut self, _time: f64, job: &JobRef) {
        self.power_consumption -= job.borrow().power_consumption;
        if self.power_consumption < 0. {
            self.power_consumption = 0.;
        }
        if self.power_min > self.power_consumption {
            self.power_min = self.power_consumption;
        }
    }

    fn job_aborted_with_errors(&mut self, _time: f64, _job: &JobRef) {
        self.node_errors += 1;
        self.jobs_aborted += 1;
    }

    fn empty_node_failed(&mut self, _time: f64) {
        self.node_errors += 1;
    }

    fn node_repaired(&mut self, _time: f64) {
        self.nodes_repaired += 1;
    }

    fn cluster_status_changed(&mut self, time: f64) {
        if time != self.last_time {
            let costs = self
                .energy_model
                .as_ref()
                .unwrap()
                .borrow()
                .energy_costs(self.last_time, time, self.power_consumption);
            self.costs_energy += costs;
            self.energy_consumed += (time - self.last_time) * self.power_consumption;
            self.last_time = time;
        }
    }

    fn print_summary(&mut self, start_time: f64, end_time: f64) {
        let runtime = end_time - start_time;
        let (total_nodes, costs_center) = {
            let cluster = self.cluster.as_ref().unwrap().borrow();
            let config = cluster.config();
            (
                cluster.total(),
                runtime / config.system_life_duration * config.costs_system
                    + runtime / 3600. / 24. / 365. * config.costs_infrastructure_annually,
            )
        };
        let utilization = self.node_time / (runtime * total_nodes as f64);

        let penalties = self
            .energy_model
            .as_ref()
            .unwrap()
            .borrow()
            .fixed_penalties(self.power_min, self.power_max);
        self.costs_energy += penalties;

        self.summary = SimulationSummary {
            runtime_days: runtime / 3600. / 24.,
            node_time: self.node_time,
            jobs_started: self.jobs_started,
            utilization_percent: utilization * 100.,
            energy_consumed_kwh: self.energy_consumed / 3600. / 1000.,
            costs_energy: self.costs_energy,
            costs_center,
            costs_total: self.costs_energy + costs_center,
            node_errors: self.node_errors,
            nodes_repaired: self.nodes_repaired,
            jobs_aborted: self.jobs_aborted,
        };
        let s = &self.summary;
        info!(
            "total runtime: {:.2} days, utilization: {:.1}%, energy consumed: {:.0} kWh, \
             costs energy: {:.1}, costs center: {:.1}, costs: {:.1}, \
             jobs aborted: {}, node errors: {} (repaired: {})",
            s.runtime_days,
            s.utilization_percent,
            s.energy_consumed_kwh,
            s.costs_energy,
            s.costs_center,
            s.costs_total,
            s.jobs_aborted,
            s.node_errors,
            s.nodes_repaired
        );
    }
}

/// One CSV row per state transition.
#[derive(Serialize)]
struct UtilizationRecord {
    time: f64,
    pending_jobs: i64,
    running_jobs: i64,
    used_nodes: i64,
    broken_nodes: i64,
    operation: char,
    waiting_time: Option<f64>,
    account: Option<String>,
    job_id: Option<u64>,
    name: Option<String>,
    nodes: Option<u32>,
    ppn: Option<u32>,
    duration_min: Option<f64>,
    cluster_power: f64,
}

/// Wraps a [`SummaryReporter`] and additionally writes one CSV row per state
/// transition for later plotting.
pub struct UtilizationReporter {
    inner: SummaryReporter,
    writer: csv::Writer<File>,
    pending_jobs: i64,
    running_jobs: i64,
    used_nodes: i64,
    broken_nodes: i64,
}

impl UtilizationReporter {
    pub fn new(file_name: &str) -> Self {
        let file = File::create(file_name).unwrap_or_else(|_| panic!("Can't create file {}", file_name));
        Self {
            inner: SummaryReporter::new(),
            writer: csv::Writer::from_writer(file),
            pending_jobs: 0,
            running_jobs: 0,
            used_nodes: 0,
            broken_nodes: 0,
        }
    }

    pub fn summary(&self) -> &SimulationSummary {
        self.inner.summary()
    }

    fn write_status(&mut self, time: f64, operation: char) {
        self.write_record(time, operation, None, None);
    }

    fn write_record(&mut self, time: f64, operation: char, job: Option<&JobRef>, waiting_time: Option<f64>) {
        let record = match job {
            None => UtilizationRecord {
                time,
                pending_jobs: self.pending_jobs,
                running_jobs: self.running_jobs,
                used_nodes: self.used_nodes,
                broken_nodes: self.broken_nodes,
                operation,
                waiting_time: None,
                account: None,
                job_id: None,
                name: None,
                nodes: None,
                ppn: None,
                duration_min: None,
                cluster_power: self.inner.power_consumption,
            },
            Some(job) => {
                let job = job.borrow();
                UtilizationRecord {
                    time,
                    pending_jobs: self.pending_jobs,
                    running_jobs: self.running_jobs,
                    used_nodes: self.used_nodes,
                    broken_nodes: self.broken_nodes,
                    operation,
                    waiting_time,
                    account: job.account.clone(),
                    job_id: Some(job.id),
                    name: Some(job.name.clone()),
                    nodes: Some(job.nodes),
                    ppn: Some(job.ppn),
                    duration_min: Some(job.duration_min),
                    cluster_power: self.inner.power_consumption,
                }
            }
        };
        self.writer
            .serialize(record)
            .unwrap_or_else(|e| panic!("Can't write utilization record: {}", e));
    }
}

impl Reporter for UtilizationReporter {
    fn set_cluster(&mut self, cluster: Rc<RefCell<Cluster>>, energy_model: Rc<RefCell<dyn EnergyCostModel>>) {
        self.inner.set_cluster(cluster, energy_model);
    }

    fn job_submitted(&mut self, time: f64, job: &JobRef) {
        self.inner.job_submitted(time, job);
        self.pending_jobs += 1;
        self.write_record(time, 'C', Some(job), None);
    }

    fn job_started(&mut self, time: f64, job: &JobRef, runtime: f64, placement: &Placement) {
        self.inner.job_started(time, job, runtime, placement);
        self.pending_jobs -= 1;
        self.running_jobs += 1;
        self.used_nodes += job.borrow().nodes as i64;
        let waiting_time = {
            let job = job.borrow();
            let waiting_time = job.start_time - job.submission_time;
            if waiting_time < 0. {
                warn!("negative waiting time {} for job {}", waiting_time, job.id);
            }
            waiting_time
        };
        self.write_record(time, '+', Some(job), Some(waiting_time));
    }

    fn job_finished(&mut self, time: f64, job: &JobRef) {
        self.inner.job_finished(time, job);
        self.running_jobs -= 1;
        self.used_nodes -= job.borrow().nodes as i64;
        self.write_record(time, '-', Some(job), None);
    }

    fn job_aborted_with_errors(&mut self, time: f64, job: &JobRef) {
        self.inner.job_aborted_with_errors(time, job);
        self.pending_jobs += 1;
        self.running_jobs -= 1;
        self.used_nodes -= job.borrow().nodes as i64;
        self.broken_nodes += 1;
        self.write_record(time, 'b', Some(job), None);
    }

    fn empty_node_failed(&mut self, time: f64) {
        self.inner.empty_node_failed(time);
        self.broken_nodes += 1;
        self.write_status(time, 'B');
    }

    fn node_repaired(&mut self, time: f64) {
        self.inner.node_repaired(time);
        self.broken_nodes -= 1;
        self.write_status(time, 'r');
    }

    fn cluster_status_changed(&mut self, time: f64) {
        self.inner.cluster_status_changed(time);
    }

    fn print_summary(&mut self, start_time: f64, end_time: f64) {
        self.inner.print_summary(start_time, end_time);
        self.writer
            .flush()
            .unwrap_or_else(|e| panic!("Can't flush utilization records: {}", e));
    }
}
