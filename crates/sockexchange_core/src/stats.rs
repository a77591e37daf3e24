//! Point-in-time counters across the coordination core.

use serde::{Deserialize, Serialize};

/// Snapshot of the executor, notifier and registry counters.
///
/// Counters are read one by one without a global lock, so a snapshot taken
/// under load is approximate.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExchangeStats {
    pub messages_notified: u64,
    pub messages_unrouted: u64,
    pub consumer_invocations: u64,
    pub consumer_failures: u64,
    pub expectations_created: u64,
    pub expectations_resolved: u64,
    pub expectations_timed_out: u64,
    pub expectations_pending: usize,
    pub unmatched_responses: u64,
    pub tasks_submitted: u64,
    pub tasks_panicked: u64,
    pub in_flight: usize,
    pub rejected: u64,
}
