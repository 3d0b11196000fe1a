//! Scheduling policy contract and the policy factory.

use std::cell::RefCell;
use std::rc::Rc;

use crate::core::cluster::Cluster;
use crate::core::config::{parse_config_value, parse_options};
use crate::core::energy::EnergyCostModel;
use crate::core::job::JobRef;
use crate::core::schedulers::fifo::FifoScheduler;
use crate::core::schedulers::fifo_backfill::FifoBackfillScheduler;
use crate::core::schedulers::fifo_backfill_delay::FifoBackfillDelayScheduler;
use crate::core::schedulers::price_aware::{
    EnforcePriceAwareShutdownScheduler, FifoPriceAwareShutdownScheduler, PriceAwareShutdownScheduler,
};
use crate::core::schedulers::sorted_backfill::SortedBackfillScheduler;

/// CPU P-state jobs are dispatched at unless a policy chooses otherwise.
pub const DEFAULT_PSTATE: usize = 4;

/// Placement attributes chosen for a dispatched job.
#[derive(Debug, Clone)]
pub struct Placement {
    pub cpu_pstate: usize,
}

impl Default for Placement {
    fn default() -> Self {
        Self {
            cpu_pstate: DEFAULT_PSTATE,
        }
    }
}

/// One entry of a scheduling pass outcome: either start a job now or put the
/// scheduler to sleep and wake it again after the given delay.
pub enum ScheduleDecision {
    Dispatch {
        job: JobRef,
        runtime: f64,
        placement: Placement,
    },
    Sleep {
        duration: f64,
    },
}

impl ScheduleDecision {
    /// Dispatches the job at its shortest runtime with default placement.
    pub fn dispatch_default(job: JobRef) -> Self {
        let runtime = job.borrow().duration_min;
        ScheduleDecision::Dispatch {
            job,
            runtime,
            placement: Placement::default(),
        }
    }
}

/// Admission-control policy.
///
/// Every scheduler owns its pending queue privately; the simulator only sees
/// the decisions returned from [`Scheduler::try_to_schedule`]. Returning an
/// empty list signals backpressure, never an error - the simulator invokes the
/// scheduler again on the next relevant event.
pub trait Scheduler {
    /// Wires the shared cluster state and the price model before the run.
    fn set_cluster(&mut self, cluster: Rc<RefCell<Cluster>>, energy_model: Rc<RefCell<dyn EnergyCostModel>>);

    /// Delay during which newly submitted jobs are batched before the next
    /// scheduling pass.
    fn scheduling_delay(&self) -> f64 {
        1.
    }

    /// Absorbs a batch of newly submitted jobs into the pending queue.
    fn new_pending_jobs(&mut self, jobs: Vec<JobRef>, time: f64);

    /// Computes the jobs to start at `time`. Decisions must fit the currently
    /// available nodes; `job_completed` tells whether this pass was triggered
    /// by a completion.
    fn try_to_schedule(&mut self, time: f64, job_completed: bool) -> Vec<ScheduleDecision>;

    /// The given job finished its execution.
    fn job_completed(&mut self, _job: &JobRef, _time: f64) {}

    /// The given job was aborted by a node failure and must re-run.
    fn job_aborted_with_errors(&mut self, job: JobRef, time: f64);

    /// Bulk pre-planning hook invoked once before the first event.
    fn submit_all_jobs_with_start_time(&mut self, _jobs: &[JobRef], _time: f64) {}
}

pub fn scheduler_resolver(config_str: &str) -> Box<dyn Scheduler> {
    let (name, options) = parse_config_value(config_str);
    let options = options.map(|s| parse_options(&s)).unwrap_or_default();
    let backfill_length = options.get("backfill_length").map(|v| {
        v.parse::<usize>()
            .unwrap_or_else(|_| panic!("Bad backfill_length: {}", v))
    });
    let hours_ahead = || {
        options
            .get("hours_ahead")
            .unwrap_or_else(|| panic!("{} needs an hours_ahead option", name))
            .parse::<usize>()
            .unwrap_or_else(|e| panic!("Bad hours_ahead: {}", e))
    };
    match name.as_str() {
        "FIFO" => Box::new(FifoScheduler::new()),
        "FIFOBackfillDelay" => {
            let mut scheduler = FifoBackfillDelayScheduler::new();
            if let Some(n) = backfill_length {
                scheduler = scheduler.with_backfill_length(n);
            }
            Box::new(scheduler)
        }
        "FIFOBackfill" => {
            let mut scheduler = FifoBackfillScheduler::new();
            if let Some(n) = backfill_length {
                scheduler = scheduler.with_backfill_length(n);
            }
            Box::new(scheduler)
        }
        "BiggestFirstBackfill" => Box::new(SortedBackfillScheduler::biggest_first()),
        "LongestFirstBackfill" => Box::new(SortedBackfillScheduler::longest_first()),
        "FIFOBackfillShutdown" => Box::new(FifoBackfillScheduler::with_shutdown()),
        "FIFOBackfillShutdownDelay" => Box::new(FifoBackfillDelayScheduler::with_shutdown()),
        "FIFOPriceAwareShutdown" => Box::new(FifoPriceAwareShutdownScheduler::new(hours_ahead())),
        "PriceAwareShutdown" => Box::new(PriceAwareShutdownScheduler::new(hours_ahead())),
        "EnforcePriceAwareShutdown" => Box::new(EnforcePriceAwareShutdownScheduler::new(hours_ahead())),
        _ => panic!("Can't resolve scheduler: {}", config_str),
    }
}
