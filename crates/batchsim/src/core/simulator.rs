//! Discrete-event simulation engine.

use std::cell::RefCell;
use std::process;
use std::rc::Rc;

use log::{error, info, warn};

use crate::core::cluster::Cluster;
use crate::core::energy::EnergyCostModel;
use crate::core::events::{EventKind, EventQueue};
use crate::core::failure::FailureModel;
use crate::core::job::JobRef;
use crate::core::reporter::Reporter;
use crate::core::scheduler::{ScheduleDecision, Scheduler};

/// Counters describing a finished simulation run.
#[derive(Debug, Clone, Default)]
pub struct SimulationStats {
    pub jobs_total: usize,
    pub jobs_admissible: usize,
    pub jobs_completed: usize,
    pub start_time: f64,
    pub end_time: f64,
}

/// The discrete-event simulator.
///
/// Job submissions and node failures are injected as time-stamped events; the
/// main loop pops the earliest event, updates the cluster state, informs the
/// responsible component and enqueues follow-up events.
///
/// Submissions are batched: the first submission arms a scheduler-invocation
/// timer after the scheduler's own delay, and every submission until then
/// lands in the same batch. This keeps a burst of near-simultaneous
/// submissions from producing a scheduling pass per job.
///
/// Running jobs are owned by the simulator, which turns every dispatch
/// decision into a completion or failure event. Pending jobs are owned
/// entirely by the scheduler and never inspected here.
pub struct Simulator {
    seed: u64,
}

impl Simulator {
    pub fn new(seed: u64) -> Self {
        Self { seed }
    }

    pub fn simulate(
        &mut self,
        cluster: Rc<RefCell<Cluster>>,
        jobs: &[JobRef],
        scheduler: &mut dyn Scheduler,
        energy_model: Rc<RefCell<dyn EnergyCostModel>>,
        reporter: &mut dyn Reporter,
        error_model: bool,
    ) -> SimulationStats {
        let nodes_total = cluster.borrow().total();
        let mut events = EventQueue::new();
        let mut failure_model = {
            let cluster = cluster.borrow();
            FailureModel::new(cluster.config(), self.seed)
        };

        let mut min_node_runtime = 0.;
        let mut longest_job_runtime: f64 = 0.;
        let mut admissible = 0;
        for job_ref in jobs {
            let job = job_ref.borrow();
            if job.nodes > nodes_total {
                warn!(
                    "skipped job {} ({}): needs {} nodes, cluster has {}",
                    job.id, job.name, job.nodes, nodes_total
                );
                continue;
            }
            events.push(job.submission_time, EventKind::JobSubmitted(job_ref.clone()));
            min_node_runtime += job.duration_min * job.nodes as f64;
            longest_job_runtime = longest_job_runtime.max(job.duration_min);
            admissible += 1;
        }
        info!(
            "{} jobs, optimal runtime with 100% utilization on {} nodes == {:.2} days (longest job: {:.2} days)",
            jobs.len(),
            nodes_total,
            min_node_runtime / nodes_total as f64 / 3600. / 24.,
            longest_job_runtime / 3600. / 24.
        );

        scheduler.set_cluster(cluster.clone(), energy_model.clone());
        reporter.set_cluster(cluster.clone(), energy_model.clone());

        if events.is_empty() {
            error!("nothing to do, no admissible jobs");
            process::exit(1);
        }

        let start_time = events.next_time().unwrap();
        let mut time = start_time;
        let mut old_time = time;
        let job_count = admissible;
        let mut completed_jobs = 0;

        energy_model.borrow_mut().init_timestamp(time);
        scheduler.submit_all_jobs_with_start_time(jobs, time);

        let mut submission_batch: Vec<JobRef> = Vec::new();
        let mut scheduler_armed = false;

        while let Some(event) = events.pop() {
            time = event.time;
            assert!(time >= old_time, "event time went backwards: {} after {}", time, old_time);
            old_time = time;

            if completed_jobs == job_count {
                // only repair bookkeeping can remain in the queue
                break;
            }

            let mut reschedule = true;
            let mut was_completion = false;
            match event.kind {
                EventKind::JobSubmitted(job) => {
                    reporter.job_submitted(time, &job);
                    submission_batch.push(job);
                    if !scheduler_armed {
                        events.push(time + scheduler.scheduling_delay(), EventKind::StartScheduler);
                        scheduler_armed = true;
                    }
                    continue;
                }
                EventKind::JobCompleted(job) => {
                    reporter.cluster_status_changed(time);
                    reporter.job_finished(time, &job);
                    cluster.borrow_mut().release(job.borrow().nodes);
                    scheduler.job_completed(&job, time);
                    completed_jobs += 1;
                    was_completion = true;
                }
                EventKind::EmptyNodeFailure => {
                    reporter.cluster_status_changed(time);
                    // the node picked for failure may have been taken since the draw
                    if cluster.borrow().available() > 0 {
                        cluster.borrow_mut().fail_idle_node();
                        let repair_duration = failure_model.time_until_node_is_back();
                        events.push(time + repair_duration, EventKind::NodeRepaired);
                        reporter.empty_node_failed(time);
                    }
                    reschedule = false;
                }
                EventKind::JobStoppedWithFailures(job) => {
                    reporter.cluster_status_changed(time);
                    reporter.job_aborted_with_errors(time, &job);
                    cluster.borrow_mut().fail_job_node(job.borrow().nodes);
                    scheduler.job_aborted_with_errors(job, time);
                    let repair_duration = failure_model.time_until_node_is_back();
                    events.push(time + repair_duration, EventKind::NodeRepaired);
                }
                EventKind::NodeRepaired => {
                    reporter.cluster_status_changed(time);
                    reporter.node_repaired(time);
                    cluster.borrow_mut().repair_node();
                }
                EventKind::StartScheduler => {
                    scheduler.new_pending_jobs(std::mem::take(&mut submission_batch), time);
                    scheduler_armed = false;
                }
            }

            if reschedule {
                reporter.cluster_status_changed(time);
                for decision in scheduler.try_to_schedule(time, was_completion) {
                    match decision {
                        ScheduleDecision::Sleep { duration } => {
                            assert!(duration > 0., "sleep decision must move time forward");
                            events.push(time + duration, EventKind::StartScheduler);
                        }
                        ScheduleDecision::Dispatch { job, runtime, placement } => {
                            {
                                let mut job = job.borrow_mut();
                                job.start_time = time;
                                job.power_consumption = job.power_consumed(placement.cpu_pstate, &cluster.borrow());
                            }
                            reporter.job_started(time, &job, runtime, &placement);
                            cluster.borrow_mut().reserve(job.borrow().nodes);

                            let failure = if error_model {
                                failure_model.check_when_job_fails(job.borrow().nodes, runtime)
                            } else {
                                None
                            };
                            match failure {
                                None => {
                                    let end_time = time + runtime;
                                    job.borrow_mut().end_time = end_time;
                                    events.push(end_time, EventKind::JobCompleted(job));
                                }
                                Some(fail_after) => {
                                    let end_time = time + fail_after;
                                    job.borrow_mut().end_time = end_time;
                                    events.push(end_time, EventKind::JobStoppedWithFailures(job));
                                }
                            }
                        }
                    }
                }
            }

            // check whether an idle node fails before the next queued event
            if error_model && cluster.borrow().available() > 0 {
                if let Some(next_time) = events.next_time() {
                    let idle_nodes = cluster.borrow().available();
                    if let Some(fail_after) = failure_model.check_when_job_fails(idle_nodes, next_time - time) {
                        events.push(time + fail_after, EventKind::EmptyNodeFailure);
                    }
                }
            }
        }

        reporter.cluster_status_changed(time);
        if completed_jobs != job_count {
            warn!(
                "did not process all jobs, some missing ({} of {} completed)",
                completed_jobs, job_count
            );
        }
        cluster.borrow_mut().reset();
        reporter.print_summary(start_time, time);

        SimulationStats {
            jobs_total: jobs.len(),
            jobs_admissible: admissible,
            jobs_completed: completed_jobs,
            start_time,
            end_time: time,
        }
    }
}
