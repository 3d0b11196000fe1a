//! Electricity-price-aware scheduling with voluntary node shutdown.
//!
//! These FIFO-based policies look at the hourly electricity prices over a
//! fixed horizon and either start the head job right away or put its nodes to
//! sleep until a cheaper window, trading the cost of idling the reserved
//! nodes against the cost of running during expensive hours.

use std::cell::RefCell;
use std::rc::Rc;

use log::debug;

use crate::core::cluster::Cluster;
use crate::core::energy::{seconds_until_next_hour, EnergyCostModel};
use crate::core::job::JobRef;
use crate::core::scheduler::{ScheduleDecision, Scheduler, DEFAULT_PSTATE};

/// Bias applied to the cost of starting immediately, so a delayed window must
/// beat "now" by a clear amount before it is chosen.
pub const IMMEDIACY_BIAS: f64 = 0.999;

/// Relative saving the enforcing variant requires before it prefers a delayed
/// window over the best choice found so far.
pub const DELAY_MARGIN: f64 = 0.999;

/// Chosen start window: 0 means "now", otherwise a whole-hour offset. The
/// flag tells whether the job is aligned to the window's end ("last") or its
/// start ("first").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct WindowChoice {
    window: usize,
    align_last: bool,
}

impl WindowChoice {
    const NOW: WindowChoice = WindowChoice {
        window: 0,
        align_last: false,
    };
}

fn hourly_prices(energy_model: &Rc<RefCell<dyn EnergyCostModel>>, time: f64, hours_ahead: usize) -> Vec<f64> {
    let energy_model = energy_model.borrow();
    (0..hours_ahead)
        .map(|hour| energy_model.timestamp_price(time + hour as f64 * 3600.))
        .collect()
}

/// Cost of starting the job right now: price times power summed over the
/// overlap of the job with each hour it spans, biased to favor "now".
fn immediate_cost(price: &[f64], duration: f64, t_remain_hour: f64, job_power: f64, bias: f64) -> f64 {
    let mut cost = 0.;
    let mut left = duration;
    let mut hour = 0;
    let mut span = t_remain_hour.min(left);
    while left > 0. {
        cost += price[hour] * span;
        left -= span;
        hour += 1;
        span = left.min(3600.);
    }
    cost * job_power / 1000. / 3600. * bias
}

/// Absolute delay in seconds for the chosen window.
fn window_delay(choice: WindowChoice, t_remain_hour: f64, remaining_seconds: f64) -> f64 {
    let mut delay = (choice.window as f64 - 1.) * 3600.;
    if choice.align_last {
        delay += t_remain_hour;
    } else {
        delay += t_remain_hour - remaining_seconds;
    }
    delay
}

/// Searches the price horizon for the cheapest start window of a job,
/// charging `idle_power` for every hour its nodes are held idle while
/// waiting. Window 0 is "start now".
///
/// For windows the cost of the partial first and last hour is bounded
/// pessimistically: whichever of the two edge overlaps is more expensive is
/// charged, so a delay wins only when it is clearly cheaper.
fn cheapest_window(
    price: &[f64],
    hours_ahead: usize,
    duration: f64,
    t_remain_hour: f64,
    job_power: f64,
    idle_power: f64,
    bias: f64,
) -> WindowChoice {
    let hours_needed = (duration / 3600.) as usize;
    let remaining_seconds = duration % 3600.;

    let mut cheapest = WindowChoice::NOW;
    let mut cheapest_price = immediate_cost(price, duration, t_remain_hour, job_power, bias);

    // idling from now to the end of the current hour
    let mut idle_price = price[0] * t_remain_hour * idle_power / 1000. / 3600.;
    let seconds_full_hour_empty = 3600. - remaining_seconds;

    if duration < 3600. {
        for w in 1..hours_ahead {
            let cost = idle_price + price[w] * job_power * remaining_seconds / 1000. / 3600.;
            if cost < cheapest_price {
                cheapest_price = cost;
                cheapest = WindowChoice {
                    window: w,
                    align_last: true,
                };
            }
            idle_price += price[w] * idle_power / 1000.;
        }
    } else {
        for w in 1..(hours_ahead - hours_needed - 1) {
            // the idle cost alone only grows with the window
            if idle_price > cheapest_price {
                break;
            }
            let mut cost = idle_price;
            for h in w..(hours_needed + w) {
                cost += price[h] * job_power / 1000.;
            }
            let p_last = price[hours_needed + w + 1]
                * (job_power * remaining_seconds + seconds_full_hour_empty * idle_power)
                / 1000.
                / 3600.;
            let p_first = price[w - 1]
                * (remaining_seconds * job_power + (seconds_full_hour_empty - remaining_seconds) * idle_power)
                / 1000.
                / 3600.;
            let align_last = p_first > p_last || w == 1;
            cost += if align_last { p_last } else { p_first };
            if cost < cheapest_price {
                cheapest_price = cost;
                cheapest = WindowChoice { window: w, align_last };
            }
            idle_price += price[w] * idle_power / 1000.;
        }
    }
    cheapest
}

////////////////////////////////////////////////////////////////////////////////

/// Shared machinery of the two non-enforcing price-aware policies.
struct PriceAwareCore {
    cluster: Option<Rc<RefCell<Cluster>>>,
    energy_model: Option<Rc<RefCell<dyn EnergyCostModel>>>,
    pending: Vec<JobRef>,
    hours_ahead: usize,
    idle_node_power: f64,
    sleep_end_time: f64,
    immediacy_bias: f64,
    /// Dispatch regardless of price once a job waited longer than the horizon.
    limit_wait_to_horizon: bool,
    /// Refuse to schedule while an armed wake-up timer lies in the future.
    honor_sleep_window: bool,
}

impl PriceAwareCore {
    fn new(hours_ahead: usize, limit_wait_to_horizon: bool, honor_sleep_window: bool) -> Self {
        Self {
            cluster: None,
            energy_model: None,
            pending: Vec::new(),
            hours_ahead,
            idle_node_power: 0.,
            sleep_end_time: 0.,
            immediacy_bias: IMMEDIACY_BIAS,
            limit_wait_to_horizon,
            honor_sleep_window,
        }
    }

    fn set_cluster(&mut self, cluster: Rc<RefCell<Cluster>>, energy_model: Rc<RefCell<dyn EnergyCostModel>>) {
        self.idle_node_power = cluster.borrow().infrastructure_power_per_node();
        self.cluster = Some(cluster);
        self.energy_model = Some(energy_model);
    }

    fn try_to_schedule(&mut self, time: f64) -> Vec<ScheduleDecision> {
        let cluster = self.cluster.clone().unwrap();
        if self.pending.is_empty() {
            let mut cluster = cluster.borrow_mut();
            cluster.wake_all();
            let free = cluster.available();
            cluster.sleep(free);
            return Vec::new();
        }

        let mut decisions = Vec::new();
        cluster.borrow_mut().wake_all();
        let mut free = cluster.borrow().available();

        let head_nodes = self.pending[0].borrow().nodes;
        if free < head_nodes || (self.honor_sleep_window && time < self.sleep_end_time) {
            cluster.borrow_mut().sleep(free);
            return decisions;
        }

        let price = hourly_prices(self.energy_model.as_ref().unwrap(), time, self.hours_ahead);
        let t_remain_hour = seconds_until_next_hour(time);

        while !self.pending.is_empty() {
            if free == 0 {
                return decisions;
            }
            let (nodes, duration_min, submission_time) = {
                let job = self.pending[0].borrow();
                (job.nodes, job.duration_min, job.submission_time)
            };
            if free < nodes {
                break;
            }
            // power of the job plus the idle draw of its nodes while waiting
            let idle_power = self.idle_node_power * nodes as f64;
            let job_power = self.pending[0].borrow().power_consumed(DEFAULT_PSTATE, &cluster.borrow()) + idle_power;
            let hours_needed = (duration_min / 3600.) as usize;

            let may_wait =
                !self.limit_wait_to_horizon || (time - submission_time) / 3600. <= self.hours_ahead as f64;
            if may_wait && hours_needed + 2 < self.hours_ahead {
                let choice = cheapest_window(
                    &price,
                    self.hours_ahead,
                    duration_min,
                    t_remain_hour,
                    job_power,
                    idle_power,
                    self.immediacy_bias,
                );
                if choice.window != 0 {
                    let delay = window_delay(choice, t_remain_hour, duration_min % 3600.);
                    debug!("delaying job by {} s to window {}", delay, choice.window);
                    cluster.borrow_mut().sleep(free);
                    self.sleep_end_time = time + delay;
                    decisions.push(ScheduleDecision::Sleep { duration: delay });
                    return decisions;
                }
            }

            free -= nodes;
            let job = self.pending.remove(0);
            decisions.push(ScheduleDecision::dispatch_default(job));
        }

        cluster.borrow_mut().sleep(free);
        decisions
    }
}

////////////////////////////////////////////////////////////////////////////////

/// FIFO with price-aware delays and node shutdown. A job that already waited
/// longer than the price horizon is dispatched regardless of price.
pub struct FifoPriceAwareShutdownScheduler {
    core: PriceAwareCore,
}

impl FifoPriceAwareShutdownScheduler {
    pub fn new(hours_ahead: usize) -> Self {
        Self {
            core: PriceAwareCore::new(hours_ahead, true, false),
        }
    }

    pub fn with_immediacy_bias(mut self, bias: f64) -> Self {
        self.core.immediacy_bias = bias;
        self
    }
}

impl Scheduler for FifoPriceAwareShutdownScheduler {
    fn set_cluster(&mut self, cluster: Rc<RefCell<Cluster>>, energy_model: Rc<RefCell<dyn EnergyCostModel>>) {
        self.core.set_cluster(cluster, energy_model);
    }

    fn new_pending_jobs(&mut self, jobs: Vec<JobRef>, _time: f64) {
        self.core.pending.extend(jobs);
    }

    fn try_to_schedule(&mut self, time: f64, _job_completed: bool) -> Vec<ScheduleDecision> {
        self.core.try_to_schedule(time)
    }

    fn job_aborted_with_errors(&mut self, job: JobRef, _time: f64) {
        self.core.pending.insert(0, job);
    }
}

////////////////////////////////////////////////////////////////////////////////

/// FIFO with price-aware delays and node shutdown. While a wake-up timer is
/// armed the policy stays asleep and ignores new work until the timer fires.
pub struct PriceAwareShutdownScheduler {
    core: PriceAwareCore,
}

impl PriceAwareShutdownScheduler {
    pub fn new(hours_ahead: usize) -> Self {
        Self {
            core: PriceAwareCore::new(hours_ahead, false, true),
        }
    }

    pub fn with_immediacy_bias(mut self, bias: f64) -> Self {
        self.core.immediacy_bias = bias;
        self
    }
}

impl Scheduler for PriceAwareShutdownScheduler {
    fn set_cluster(&mut self, cluster: Rc<RefCell<Cluster>>, energy_model: Rc<RefCell<dyn EnergyCostModel>>) {
        self.core.set_cluster(cluster, energy_model);
    }

    fn new_pending_jobs(&mut self, jobs: Vec<JobRef>, _time: f64) {
        self.core.pending.extend(jobs);
    }

    fn try_to_schedule(&mut self, time: f64, _job_completed: bool) -> Vec<ScheduleDecision> {
        self.core.try_to_schedule(time)
    }

    fn job_aborted_with_errors(&mut self, job: JobRef, _time: f64) {
        self.core.pending.insert(0, job);
    }
}

////////////////////////////////////////////////////////////////////////////////

/// Price-aware policy that only delays when the saving is clearly above the
/// margin. Idle-hold costs are ignored, and jobs shorter than one hour are
/// simply moved to the single cheapest hour of the horizon.
pub struct EnforcePriceAwareShutdownScheduler {
    cluster: Option<Rc<RefCell<Cluster>>>,
    energy_model: Option<Rc<RefCell<dyn EnergyCostModel>>>,
    pending: Vec<JobRef>,
    hours_ahead: usize,
    sleep_end_time: f64,
    pub immediacy_bias: f64,
    pub delay_margin: f64,
}

impl EnforcePriceAwareShutdownScheduler {
    pub fn new(hours_ahead: usize) -> Self {
        Self {
            cluster: None,
            energy_model: None,
            pending: Vec::new(),
            hours_ahead,
            sleep_end_time: 0.,
            immediacy_bias: IMMEDIACY_BIAS,
            delay_margin: DELAY_MARGIN,
        }
    }

    fn cheapest_window(&self, price: &[f64], duration: f64, t_remain_hour: f64, job_power: f64) -> WindowChoice {
        let hours_needed = (duration / 3600.) as usize;
        let remaining_seconds = duration % 3600.;
        let now_price = immediate_cost(price, duration, t_remain_hour, job_power, self.immediacy_bias);
        let mut cheapest = WindowChoice::NOW;
        let mut cheapest_price = now_price;

        if duration < 3600. {
            let mut min_price = f64::INFINITY;
            let mut min_hour = 0;
            for (w, &p) in price.iter().enumerate().take(self.hours_ahead).skip(1) {
                if p < min_price {
                    min_price = p;
                    min_hour = w;
                }
            }
            let delayed = min_price * job_power * remaining_seconds / 1000. / 3600.;
            if delayed < now_price {
                cheapest = WindowChoice {
                    window: min_hour,
                    align_last: true,
                };
            }
        } else {
            for w in 1..(self.hours_ahead - hours_needed - 1) {
                let mut cost = 0.;
                for h in w..(hours_needed + w) {
                    cost += price[h] * job_power / 1000.;
                }
                let p_last = price[hours_needed + w + 1] * job_power * remaining_seconds / 1000. / 3600.;
                let p_first = price[w - 1] * job_power * remaining_seconds / 1000. / 3600.;
                let align_last = p_first > p_last || w == 1;
                cost += if align_last { p_last } else { p_first };
                if cost < cheapest_price * self.delay_margin {
                    cheapest_price = cost;
                    cheapest = WindowChoice { window: w, align_last };
                }
            }
        }
        cheapest
    }
}

impl Scheduler for EnforcePriceAwareShutdownScheduler {
    fn set_cluster(&mut self, cluster: Rc<RefCell<Cluster>>, energy_model: Rc<RefCell<dyn EnergyCostModel>>) {
        self.cluster = Some(cluster);
        self.energy_model = Some(energy_model);
    }

    fn new_pending_jobs(&mut self, jobs: Vec<JobRef>, _time: f64) {
        self.pending.extend(jobs);
    }

    fn try_to_schedule(&mut self, time: f64, job_completed: bool) -> Vec<ScheduleDecision> {
        if self.pending.is_empty() {
            return Vec::new();
        }
        if !job_completed && time < self.sleep_end_time {
            return Vec::new();
        }

        let cluster = self.cluster.clone().unwrap();
        let price = hourly_prices(self.energy_model.as_ref().unwrap(), time, self.hours_ahead);
        let t_remain_hour = seconds_until_next_hour(time);

        cluster.borrow_mut().wake_all();
        let mut free = cluster.borrow().available();
        let mut decisions = Vec::new();

        while !self.pending.is_empty() {
            if free == 0 {
                return decisions;
            }
            let (nodes, duration_min) = {
                let job = self.pending[0].borrow();
                (job.nodes, job.duration_min)
            };
            if free < nodes {
                break;
            }
            let job_power = self.pending[0].borrow().power_consumed(DEFAULT_PSTATE, &cluster.borrow());
            let hours_needed = (duration_min / 3600.) as usize;

            if hours_needed + 2 < self.hours_ahead {
                let choice = self.cheapest_window(&price, duration_min, t_remain_hour, job_power);
                if choice.window != 0 {
                    let delay = window_delay(choice, t_remain_hour, duration_min % 3600.);
                    debug!("delaying job by {} s to window {}", delay, choice.window);
                    cluster.borrow_mut().sleep(free);
                    self.sleep_end_time = time + delay;
                    decisions.push(ScheduleDecision::Sleep { duration: delay });
                    return decisions;
                }
            }

            free -= nodes;
            let job = self.pending.remove(0);
            decisions.push(ScheduleDecision::dispatch_default(job));
        }

        cluster.borrow_mut().sleep(free);
        decisions
    }

    fn job_aborted_with_errors(&mut self, job: JobRef, _time: f64) {
        self.pending.insert(0, job);
    }
}
