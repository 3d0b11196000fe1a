use std::cell::RefCell;
use std::rc::Rc;

use sugars::{rc, refcell};

use batchsim::core::cluster::Cluster;
use batchsim::core::config::ClusterConfig;
use batchsim::core::energy::{EnergyCostModel, HourlyPriceModel};
use batchsim::core::job::{Job, JobRef};
use batchsim::core::scheduler::{ScheduleDecision, Scheduler};
use batchsim::core::schedulers::price_aware::{
    EnforcePriceAwareShutdownScheduler, FifoPriceAwareShutdownScheduler, PriceAwareShutdownScheduler,
};

const HOURS_AHEAD: usize = 10;

// Infrastructure power is zeroed so the idle-hold cost does not drown the
// price signal on a 4-node test cluster.
fn small_cluster(nodes: u32) -> Rc<RefCell<Cluster>> {
    let config = ClusterConfig {
        nodes,
        infrastructure_power_consumption: 0.,
        ..ClusterConfig::default()
    };
    rc!(refcell!(Cluster::new(config)))
}

fn job(id: u64, nodes: u32, duration: f64, submission_time: f64) -> JobRef {
    Job::new(id, &format!("job-{}", id), nodes, 1, submission_time, vec![duration]).into_ref()
}

/// Flat tariff of 1.0 with one cheaper hour of the day.
fn energy_with_cheap_hour(hour: usize, price: f64) -> Rc<RefCell<dyn EnergyCostModel>> {
    let mut table = [1.; 24];
    table[hour] = price;
    rc!(refcell!(HourlyPriceModel::new(table)))
}

fn flat_energy() -> Rc<RefCell<dyn EnergyCostModel>> {
    rc!(refcell!(HourlyPriceModel::new([1.; 24])))
}

fn sleep_duration(decisions: &[ScheduleDecision]) -> Option<f64> {
    decisions.iter().find_map(|decision| match decision {
        ScheduleDecision::Sleep { duration } => Some(*duration),
        ScheduleDecision::Dispatch { .. } => None,
    })
}

fn is_dispatch(decision: &ScheduleDecision) -> bool {
    matches!(decision, ScheduleDecision::Dispatch { .. })
}

#[test]
// A one-hour job at hour 0 with hour 5 strictly cheaper: the enforcing
// policy delays exactly until hour 5 and puts every free node to sleep.
fn test_enforce_delays_to_cheap_hour() {
    let cluster = small_cluster(4);
    let mut scheduler = EnforcePriceAwareShutdownScheduler::new(HOURS_AHEAD);
    scheduler.set_cluster(cluster.clone(), energy_with_cheap_hour(5, 0.1));
    scheduler.new_pending_jobs(vec![job(1, 1, 3600., 0.)], 0.);

    let decisions = scheduler.try_to_schedule(0., false);
    assert_eq!(sleep_duration(&decisions), Some(5. * 3600.));
    assert_eq!(cluster.borrow().available(), 0);
    assert_eq!(cluster.borrow().sleeping(), 4);
}

#[test]
// A saving below the 0.1% margin is not worth delaying for.
fn test_enforce_runs_now_when_saving_below_margin() {
    let cluster = small_cluster(4);
    let mut scheduler = EnforcePriceAwareShutdownScheduler::new(HOURS_AHEAD);
    scheduler.set_cluster(cluster.clone(), energy_with_cheap_hour(5, 0.9995));
    scheduler.new_pending_jobs(vec![job(1, 1, 3600., 0.)], 0.);

    let decisions = scheduler.try_to_schedule(0., false);
    assert_eq!(decisions.len(), 1);
    assert!(is_dispatch(&decisions[0]));
}

#[test]
// A job too long for the horizon minus the safety margin dispatches right
// away, no matter how cheap a later hour is.
fn test_enforce_dispatches_when_horizon_too_short() {
    let cluster = small_cluster(4);
    let mut scheduler = EnforcePriceAwareShutdownScheduler::new(HOURS_AHEAD);
    scheduler.set_cluster(cluster.clone(), energy_with_cheap_hour(5, 0.001));
    scheduler.new_pending_jobs(vec![job(1, 1, 9. * 3600., 0.)], 0.);

    let decisions = scheduler.try_to_schedule(0., false);
    assert_eq!(decisions.len(), 1);
    assert!(is_dispatch(&decisions[0]));
}

#[test]
// Sub-hour jobs are moved to the single cheapest hour of the horizon.
fn test_enforce_subhour_picks_cheapest_hour() {
    let cluster = small_cluster(4);
    let mut scheduler = EnforcePriceAwareShutdownScheduler::new(HOURS_AHEAD);
    scheduler.set_cluster(cluster.clone(), energy_with_cheap_hour(7, 0.05));
    scheduler.new_pending_jobs(vec![job(1, 1, 1800., 0.)], 0.);

    let decisions = scheduler.try_to_schedule(0., false);
    assert_eq!(sleep_duration(&decisions), Some(7. * 3600.));
}

#[test]
// While the wake-up timer is armed the enforcing policy stays quiet unless a
// completion frees capacity.
fn test_enforce_ignores_passes_before_wakeup() {
    let cluster = small_cluster(4);
    let mut scheduler = EnforcePriceAwareShutdownScheduler::new(HOURS_AHEAD);
    scheduler.set_cluster(cluster.clone(), energy_with_cheap_hour(5, 0.1));
    scheduler.new_pending_jobs(vec![job(1, 1, 3600., 0.)], 0.);

    let decisions = scheduler.try_to_schedule(0., false);
    assert!(sleep_duration(&decisions).is_some());

    let decisions = scheduler.try_to_schedule(600., false);
    assert!(decisions.is_empty());
}

#[test]
fn test_price_aware_sleeps_all_nodes_when_idle() {
    let cluster = small_cluster(4);
    let mut scheduler = PriceAwareShutdownScheduler::new(HOURS_AHEAD);
    scheduler.set_cluster(cluster.clone(), flat_energy());

    let decisions = scheduler.try_to_schedule(0., false);
    assert!(decisions.is_empty());
    assert_eq!(cluster.borrow().available(), 0);
    assert_eq!(cluster.borrow().sleeping(), 4);
}

#[test]
// With a flat tariff, waiting only adds idle cost: the job starts now and
// the leftover nodes go to sleep.
fn test_price_aware_dispatches_on_flat_tariff() {
    let cluster = small_cluster(4);
    let mut scheduler = PriceAwareShutdownScheduler::new(HOURS_AHEAD);
    scheduler.set_cluster(cluster.clone(), flat_energy());
    scheduler.new_pending_jobs(vec![job(1, 1, 3600., 0.)], 0.);

    let decisions = scheduler.try_to_schedule(0., false);
    assert_eq!(decisions.len(), 1);
    assert!(is_dispatch(&decisions[0]));
    assert_eq!(cluster.borrow().sleeping(), 3);
    assert_eq!(cluster.borrow().available(), 1);
}

#[test]
// The FIFO variant stops honoring cheap windows once a job has waited
// longer than the whole price horizon.
fn test_fifo_price_aware_dispatches_after_long_wait() {
    let cluster = small_cluster(4);
    let mut scheduler = FifoPriceAwareShutdownScheduler::new(HOURS_AHEAD);
    scheduler.set_cluster(cluster.clone(), energy_with_cheap_hour(16, 0.001));

    let submitted_at = 0.;
    let now = 11. * 3600.;
    scheduler.new_pending_jobs(vec![job(1, 1, 3600., submitted_at)], submitted_at);

    let decisions = scheduler.try_to_schedule(now, false);
    assert_eq!(decisions.len(), 1);
    assert!(is_dispatch(&decisions[0]));
}

#[test]
// The same job before the wait limit is still delayed to the cheap hour.
fn test_fifo_price_aware_delays_within_wait_limit() {
    let cluster = small_cluster(4);
    let mut scheduler = FifoPriceAwareShutdownScheduler::new(HOURS_AHEAD);
    scheduler.set_cluster(cluster.clone(), energy_with_cheap_hour(2, 0.0001));
    scheduler.new_pending_jobs(vec![job(1, 1, 3600., 0.)], 0.);

    let decisions = scheduler.try_to_schedule(0., false);
    assert_eq!(sleep_duration(&decisions), Some(2. * 3600.));
    assert_eq!(cluster.borrow().sleeping(), 4);
}
