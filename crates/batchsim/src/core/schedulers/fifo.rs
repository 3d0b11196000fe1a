//! Strict first-in-first-out admission.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

use crate::core::cluster::Cluster;
use crate::core::energy::EnergyCostModel;
use crate::core::job::JobRef;
use crate::core::scheduler::{ScheduleDecision, Scheduler};

/// Admits jobs from the head of the queue while they fit and blocks on the
/// first one that does not. Aborted jobs are re-queued at the front so they
/// re-run first.
pub struct FifoScheduler {
    cluster: Option<Rc<RefCell<Cluster>>>,
    pending: VecDeque<JobRef>,
}

impl FifoScheduler {
    pub fn new() -> Self {
        Self {
            cluster: None,
            pending: VecDeque::new(),
        }
    }
}

impl Default for FifoScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl Scheduler for FifoScheduler {
    fn set_cluster(&mut self, cluster: Rc<RefCell<Cluster>>, _energy_model: Rc<RefCell<dyn EnergyCostModel>>) {
        self.cluster = Some(cluster);
    }

    fn new_pending_jobs(&mut self, jobs: Vec<JobRef>, _time: f64) {
        self.pending.extend(jobs);
    }

    fn try_to_schedule(&mut self, _time: f64, _job_completed: bool) -> Vec<ScheduleDecision> {
        let mut decisions = Vec::new();
        let mut free = self.cluster.as_ref().unwrap().borrow().available();
        while let Some(job) = self.pending.front() {
            let nodes = job.borrow().nodes;
            if free < nodes {
                return decisions;
            }
            free -= nodes;
            let job = self.pending.pop_front().unwrap();
            decisions.push(ScheduleDecision::dispatch_default(job));
        }
        decisions
    }

    fn job_aborted_with_errors(&mut self, job: JobRef, _time: f64) {
        self.pending.push_front(job);
    }
}
