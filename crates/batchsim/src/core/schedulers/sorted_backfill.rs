//! Backfill over a queue kept sorted by job size or length.

use std::cell::RefCell;
use std::cmp::Ordering;
use std::rc::Rc;

use crate::core::cluster::Cluster;
use crate::core::energy::EnergyCostModel;
use crate::core::job::JobRef;
use crate::core::scheduler::{ScheduleDecision, Scheduler};
use crate::core::schedulers::bounded_backfill_scan;

const DEFAULT_BACKFILL_LENGTH: usize = 100;

/// Queue ordering applied on every submission batch and on re-queued jobs.
#[derive(Debug, Clone, Copy)]
pub enum QueueOrder {
    /// Most nodes first, runtime as tie-break.
    BiggestFirst,
    /// Longest runtime first, node count as tie-break.
    LongestFirst,
}

impl QueueOrder {
    fn compare(&self, a: &JobRef, b: &JobRef) -> Ordering {
        let a = a.borrow();
        let b = b.borrow();
        match self {
            QueueOrder::BiggestFirst => b
                .nodes
                .cmp(&a.nodes)
                .then_with(|| b.duration_min.total_cmp(&a.duration_min)),
            QueueOrder::LongestFirst => b
                .duration_min
                .total_cmp(&a.duration_min)
                .then_with(|| b.nodes.cmp(&a.nodes)),
        }
    }
}

/// Reorders the pending queue by the configured key on every submission batch
/// (stable sort, so equal keys keep arrival order) and then applies the
/// bounded scan-and-skip backfill with no head-delay protection.
pub struct SortedBackfillScheduler {
    cluster: Option<Rc<RefCell<Cluster>>>,
    pending: Vec<JobRef>,
    order: QueueOrder,
    backfill_length: usize,
}

impl SortedBackfillScheduler {
    pub fn new(order: QueueOrder) -> Self {
        Self {
            cluster: None,
            pending: Vec::new(),
            order,
            backfill_length: DEFAULT_BACKFILL_LENGTH,
        }
    }

    /// Schedules the biggest jobs first to optimize node usage.
    pub fn biggest_first() -> Self {
        Self::new(QueueOrder::BiggestFirst)
    }

    /// Schedules the longest jobs first.
    pub fn longest_first() -> Self {
        Self::new(QueueOrder::LongestFirst)
    }

    pub fn with_backfill_length(mut self, backfill_length: usize) -> Self {
        self.backfill_length = backfill_length;
        self
    }

    fn sort_pending(&mut self) {
        let order = self.order;
        self.pending.sort_by(|a, b| order.compare(a, b));
    }
}

impl Scheduler for SortedBackfillScheduler {
    fn set_cluster(&mut self, cluster: Rc<RefCell<Cluster>>, _energy_model: Rc<RefCell<dyn EnergyCostModel>>) {
        self.cluster = Some(cluster);
    }

    fn new_pending_jobs(&mut self, jobs: Vec<JobRef>, _time: f64) {
        self.pending.extend(jobs);
        self.sort_pending();
    }

    fn try_to_schedule(&mut self, _time: f64, _job_completed: bool) -> Vec<ScheduleDecision> {
        if self.pending.is_empty() {
            return Vec::new();
        }
        let free = self.cluster.as_ref().unwrap().borrow().available();
        let (decisions, _) = bounded_backfill_scan(&mut self.pending, free, self.backfill_length);
        decisions
    }

    fn job_aborted_with_errors(&mut self, job: JobRef, _time: f64) {
        self.pending.push(job);
        self.sort_pending();
    }
}
