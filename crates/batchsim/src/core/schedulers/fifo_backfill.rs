//! Conservative backfill: out-of-order admission only when it cannot delay
//! the highest-priority pending job.

use std::cell::RefCell;
use std::rc::Rc;

use crate::core::cluster::Cluster;
use crate::core::energy::EnergyCostModel;
use crate::core::job::JobRef;
use crate::core::scheduler::{ScheduleDecision, Scheduler};

const DEFAULT_BACKFILL_LENGTH: usize = 1000;

/// FIFO with conservative backfilling.
///
/// The policy keeps a projection of currently dispatched jobs as
/// `(projected end time, node count)` pairs. Before admitting a job out of
/// order it replays the projected completions to find the moment the head job
/// could start; the candidate is rejected when its own completion would land
/// after that moment and so push it further out.
///
/// With `with_shutdown` the policy additionally takes all leftover free nodes
/// offline after each pass and wakes them at the next one.
pub struct FifoBackfillScheduler {
    cluster: Option<Rc<RefCell<Cluster>>>,
    pending: Vec<JobRef>,
    /// Projected (end time, node count) pairs of currently dispatched jobs.
    dispatched: Vec<(f64, u32)>,
    backfill_length: usize,
    shutdown_idle: bool,
}

impl FifoBackfillScheduler {
    pub fn new() -> Self {
        Self {
            cluster: None,
            pending: Vec::new(),
            dispatched: Vec::new(),
            backfill_length: DEFAULT_BACKFILL_LENGTH,
            shutdown_idle: false,
        }
    }

    /// Variant that sleeps leftover free nodes after each pass.
    pub fn with_shutdown() -> Self {
        Self {
            shutdown_idle: true,
            ..Self::new()
        }
    }

    pub fn with_backfill_length(mut self, backfill_length: usize) -> Self {
        self.backfill_length = backfill_length;
        self
    }

    fn purge_expired(&mut self, time: f64) {
        self.dispatched.retain(|&(end, _)| end > time);
    }

    /// Whether admitting `job` now would delay the start of the current head
    /// job, given `free` nodes and the projected completions.
    fn delays_prior_job(&self, time: f64, job: &JobRef, free: u32) -> bool {
        if self.pending.is_empty() {
            return false;
        }
        let head_nodes = self.pending[0].borrow().nodes;
        let job_nodes = job.borrow().nodes;
        let duration_min = job.borrow().duration_min;

        // the candidate fits alongside the head job right away
        let mut free = free;
        if free >= job_nodes && free - job_nodes >= head_nodes {
            return false;
        }

        // replay projected completions until the head job could start
        let mut head_start = None;
        for &(end, nodes) in &self.dispatched {
            free += nodes;
            if free >= head_nodes {
                head_start = Some(end);
                break;
            }
        }
        if free >= job_nodes && free - job_nodes >= head_nodes {
            return false;
        }
        match head_start {
            Some(start) => time + duration_min > start,
            None => false,
        }
    }

    fn record_dispatched(&mut self, time: f64, decisions: &[ScheduleDecision]) {
        for decision in decisions {
            if let ScheduleDecision::Dispatch { job, runtime, .. } = decision {
                self.dispatched.push((time + runtime, job.borrow().nodes));
            }
        }
    }
}

impl Default for FifoBackfillScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl Scheduler for FifoBackfillScheduler {
    fn set_cluster(&mut self, cluster: Rc<RefCell<Cluster>>, _energy_model: Rc<RefCell<dyn EnergyCostModel>>) {
        self.cluster = Some(cluster);
    }

    fn new_pending_jobs(&mut self, jobs: Vec<JobRef>, _time: f64) {
        self.pending.extend(jobs);
    }

    fn try_to_schedule(&mut self, time: f64, _job_completed: bool) -> Vec<ScheduleDecision> {
        let cluster = self.cluster.clone().unwrap();
        if self.pending.is_empty() {
            if self.shutdown_idle {
                let mut cluster = cluster.borrow_mut();
                cluster.wake_all();
                let free = cluster.available();
                cluster.sleep(free);
            }
            return Vec::new();
        }
        if self.shutdown_idle {
            cluster.borrow_mut().wake_all();
        }

        let mut decisions = Vec::new();
        let mut free = cluster.borrow().available();

        self.dispatched
            .sort_by(|a, b| a.0.total_cmp(&b.0).then_with(|| a.1.cmp(&b.1)));
        self.purge_expired(time);

        let mut i = 0;
        while i < self.pending.len() {
            if free == 0 {
                break;
            }
            let nodes = self.pending[i].borrow().nodes;
            if nodes > free || (i != 0 && self.delays_prior_job(time, &self.pending[i], free)) {
                i += 1;
                if i > self.backfill_length {
                    break;
                }
                continue;
            }
            free -= nodes;
            let job = self.pending.remove(i);
            decisions.push(ScheduleDecision::dispatch_default(job));
        }

        self.record_dispatched(time, &decisions);
        if self.shutdown_idle {
            cluster.borrow_mut().sleep(free);
        }
        decisions
    }

    fn job_aborted_with_errors(&mut self, job: JobRef, _time: f64) {
        self.pending.insert(0, job);
    }
}
