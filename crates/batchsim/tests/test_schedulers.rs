use std::cell::RefCell;
use std::rc::Rc;

use sugars::{rc, refcell};

use batchsim::core::cluster::Cluster;
use batchsim::core::config::ClusterConfig;
use batchsim::core::energy::{EnergyCostModel, FixedPriceModel};
use batchsim::core::job::{Job, JobRef};
use batchsim::core::reporter::SummaryReporter;
use batchsim::core::scheduler::{scheduler_resolver, ScheduleDecision, Scheduler};
use batchsim::core::schedulers::fifo::FifoScheduler;
use batchsim::core::schedulers::fifo_backfill::FifoBackfillScheduler;
use batchsim::core::schedulers::fifo_backfill_delay::FifoBackfillDelayScheduler;
use batchsim::core::schedulers::sorted_backfill::SortedBackfillScheduler;
use batchsim::core::simulator::Simulator;

fn small_cluster(nodes: u32) -> Rc<RefCell<Cluster>> {
    let config = ClusterConfig {
        nodes,
        ..ClusterConfig::default()
    };
    rc!(refcell!(Cluster::new(config)))
}

fn job(id: u64, nodes: u32, duration: f64, submission_time: f64) -> JobRef {
    Job::new(id, &format!("job-{}", id), nodes, 1, submission_time, vec![duration]).into_ref()
}

fn fixed_energy() -> Rc<RefCell<dyn EnergyCostModel>> {
    rc!(refcell!(FixedPriceModel::new()))
}

fn dispatched_ids(decisions: &[ScheduleDecision]) -> Vec<u64> {
    decisions
        .iter()
        .filter_map(|decision| match decision {
            ScheduleDecision::Dispatch { job, .. } => Some(job.borrow().id),
            ScheduleDecision::Sleep { .. } => None,
        })
        .collect()
}

#[test]
fn test_fifo_admits_in_order_until_blocked() {
    let cluster = small_cluster(4);
    let mut scheduler = FifoScheduler::new();
    scheduler.set_cluster(cluster.clone(), fixed_energy());
    scheduler.new_pending_jobs(vec![job(1, 2, 100., 0.), job(2, 1, 100., 0.), job(3, 3, 100., 0.)], 0.);

    let decisions = scheduler.try_to_schedule(0., false);
    assert_eq!(dispatched_ids(&decisions), vec![1, 2]);
    cluster.borrow_mut().reserve(3);

    // job 3 stays blocked until enough nodes free up
    let decisions = scheduler.try_to_schedule(0., false);
    assert!(decisions.is_empty());
}

#[test]
fn test_fifo_blocked_head_blocks_everything() {
    let mut scheduler = FifoScheduler::new();
    scheduler.set_cluster(small_cluster(2), fixed_energy());
    scheduler.new_pending_jobs(vec![job(1, 3, 100., 0.), job(2, 1, 100., 0.)], 0.);

    let decisions = scheduler.try_to_schedule(0., false);
    assert!(decisions.is_empty());
}

#[test]
fn test_backfill_delay_skips_blocked_head() {
    let mut scheduler = FifoBackfillDelayScheduler::new();
    scheduler.set_cluster(small_cluster(2), fixed_energy());
    scheduler.new_pending_jobs(vec![job(1, 3, 100., 0.), job(2, 1, 100., 0.)], 0.);

    let decisions = scheduler.try_to_schedule(0., false);
    assert_eq!(dispatched_ids(&decisions), vec![2]);
}

#[test]
fn test_backfill_scan_respects_position_limit() {
    let mut scheduler = FifoBackfillDelayScheduler::new().with_backfill_length(1);
    scheduler.set_cluster(small_cluster(2), fixed_energy());
    scheduler.new_pending_jobs(
        vec![job(1, 3, 100., 0.), job(2, 3, 100., 0.), job(3, 1, 100., 0.)],
        0.,
    );

    // the scan gives up after skipping backfill_length positions
    let decisions = scheduler.try_to_schedule(0., false);
    assert!(decisions.is_empty());
}

#[test]
// A candidate whose completion would land after the head job's projected
// start is rejected by the conservative variant.
fn test_conservative_backfill_rejects_delaying_candidate() {
    let cluster = small_cluster(4);
    let mut scheduler = FifoBackfillScheduler::new();
    scheduler.set_cluster(cluster.clone(), fixed_energy());

    // a running job holding 3 nodes until t=100
    scheduler.new_pending_jobs(vec![job(1, 3, 100., 0.)], 0.);
    let decisions = scheduler.try_to_schedule(0., false);
    assert_eq!(dispatched_ids(&decisions), vec![1]);
    cluster.borrow_mut().reserve(3);

    // head needs the full cluster, the candidate would still be running when
    // the head could start at t=100
    scheduler.new_pending_jobs(vec![job(2, 4, 100., 10.), job(3, 1, 200., 10.)], 10.);
    let decisions = scheduler.try_to_schedule(10., false);
    assert!(decisions.is_empty());
}

#[test]
// A candidate that finishes before the head job could start anyway is let
// through.
fn test_conservative_backfill_admits_harmless_candidate() {
    let cluster = small_cluster(4);
    let mut scheduler = FifoBackfillScheduler::new();
    scheduler.set_cluster(cluster.clone(), fixed_energy());

    scheduler.new_pending_jobs(vec![job(1, 3, 100., 0.)], 0.);
    let decisions = scheduler.try_to_schedule(0., false);
    assert_eq!(dispatched_ids(&decisions), vec![1]);
    cluster.borrow_mut().reserve(3);

    scheduler.new_pending_jobs(vec![job(2, 4, 100., 10.), job(3, 1, 50., 10.)], 10.);
    let decisions = scheduler.try_to_schedule(10., false);
    assert_eq!(dispatched_ids(&decisions), vec![3]);
}

#[test]
fn test_biggest_first_orders_by_nodes() {
    let mut scheduler = SortedBackfillScheduler::biggest_first();
    scheduler.set_cluster(small_cluster(10), fixed_energy());
    scheduler.new_pending_jobs(
        vec![job(1, 1, 100., 0.), job(2, 4, 100., 0.), job(3, 2, 100., 0.)],
        0.,
    );

    let decisions = scheduler.try_to_schedule(0., false);
    assert_eq!(dispatched_ids(&decisions), vec![2, 3, 1]);
}

#[test]
fn test_longest_first_orders_by_duration() {
    let mut scheduler = SortedBackfillScheduler::longest_first();
    scheduler.set_cluster(small_cluster(10), fixed_energy());
    scheduler.new_pending_jobs(
        vec![job(1, 1, 10., 0.), job(2, 1, 40., 0.), job(3, 1, 20., 0.)],
        0.,
    );

    let decisions = scheduler.try_to_schedule(0., false);
    assert_eq!(dispatched_ids(&decisions), vec![2, 3, 1]);
}

#[test]
fn test_sorted_backfill_ties_keep_arrival_order() {
    let mut scheduler = SortedBackfillScheduler::biggest_first();
    scheduler.set_cluster(small_cluster(10), fixed_energy());
    scheduler.new_pending_jobs(
        vec![job(1, 2, 100., 0.), job(2, 2, 100., 0.), job(3, 2, 100., 0.)],
        0.,
    );

    let decisions = scheduler.try_to_schedule(0., false);
    assert_eq!(dispatched_ids(&decisions), vec![1, 2, 3]);
}

#[test]
// Backfilling a short job onto the idle node must not move the head job's
// start time compared to plain FIFO.
fn test_backfill_non_starvation() {
    let run = |scheduler_name: &str| {
        let cluster = small_cluster(4);
        let jobs = vec![job(1, 2, 100., 0.), job(2, 3, 50., 0.), job(3, 1, 10., 0.)];
        let mut scheduler = scheduler_resolver(scheduler_name);
        let mut reporter = SummaryReporter::new();
        Simulator::new(123).simulate(
            cluster,
            &jobs,
            scheduler.as_mut(),
            fixed_energy(),
            &mut reporter,
            false,
        );
        let head_start = jobs[1].borrow().start_time;
        let short_start = jobs[2].borrow().start_time;
        (head_start, short_start)
    };

    let (fifo_head_start, _) = run("FIFO");
    let (backfill_head_start, backfill_short_start) = run("FIFOBackfill");

    assert_eq!(fifo_head_start, 101.);
    assert_eq!(backfill_head_start, fifo_head_start);
    // the short job ran early on the otherwise idle node
    assert_eq!(backfill_short_start, 1.);
}
