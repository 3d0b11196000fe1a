//! Concrete scheduling policies.

pub mod fifo;
pub mod fifo_backfill;
pub mod fifo_backfill_delay;
pub mod price_aware;
pub mod sorted_backfill;

use crate::core::job::JobRef;
use crate::core::scheduler::ScheduleDecision;

/// Scans the pending queue in order and admits every job that fits the free
/// capacity, skipping over jobs that do not fit up to `backfill_length`
/// positions. Returns the decisions and the leftover free nodes.
///
/// Shared by the policies that backfill without head-delay protection; the
/// queue ordering is whatever the calling policy maintains.
pub(crate) fn bounded_backfill_scan(
    pending: &mut Vec<JobRef>,
    mut free: u32,
    backfill_length: usize,
) -> (Vec<ScheduleDecision>, u32) {
    let mut decisions = Vec::new();
    let mut i = 0;
    while i < pending.len() {
        if free == 0 {
            break;
        }
        let nodes = pending[i].borrow().nodes;
        if free < nodes {
            i += 1;
            if i > backfill_length {
                break;
            }
            continue;
        }
        free -= nodes;
        let job = pending.remove(i);
        decisions.push(ScheduleDecision::dispatch_default(job));
    }
    (decisions, free)
}
