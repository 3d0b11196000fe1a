//! Bounded backfill without head-delay protection.

use std::cell::RefCell;
use std::rc::Rc;

use crate::core::cluster::Cluster;
use crate::core::energy::EnergyCostModel;
use crate::core::job::JobRef;
use crate::core::scheduler::{ScheduleDecision, Scheduler};
use crate::core::schedulers::bounded_backfill_scan;

const DEFAULT_BACKFILL_LENGTH: usize = 1000;

/// Scans up to `backfill_length` queue positions and admits any job that fits
/// the free capacity, skipping jobs that do not. Nothing protects the head
/// job from being delayed indefinitely by smaller late arrivals.
///
/// With `with_shutdown` the policy additionally takes all leftover free nodes
/// offline after each pass and wakes them at the next one.
pub struct FifoBackfillDelayScheduler {
    cluster: Option<Rc<RefCell<Cluster>>>,
    pending: Vec<JobRef>,
    backfill_length: usize,
    shutdown_idle: bool,
}

impl FifoBackfillDelayScheduler {
    pub fn new() -> Self {
        Self {
            cluster: None,
            pending: Vec::new(),
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
}

impl Default for FifoBackfillDelayScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl Scheduler for FifoBackfillDelayScheduler {
    fn set_cluster(&mut self, cluster: Rc<RefCell<Cluster>>, _energy_model: Rc<RefCell<dyn EnergyCostModel>>) {
        self.cluster = Some(cluster);
    }

    fn new_pending_jobs(&mut self, jobs: Vec<JobRef>, _time: f64) {
        self.pending.extend(jobs);
    }

    fn try_to_schedule(&mut self, _time: f64, _job_completed: bool) -> Vec<ScheduleDecision> {
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
        let free = cluster.borrow().available();
        let (decisions, leftover) = bounded_backfill_scan(&mut self.pending, free, self.backfill_length);
        if self.shutdown_idle {
            cluster.borrow_mut().sleep(leftover);
        }
        decisions
    }

    fn job_aborted_with_errors(&mut self, job: JobRef, _time: f64) {
        self.pending.insert(0, job);
    }
}
