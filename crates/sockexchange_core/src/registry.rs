//! # Correlation Registry
//!
//! Matches asynchronous replies to the requests that expect them and
//! guarantees every request produces exactly one outcome.
//!
//! A sender allocates an id with [`CorrelationRegistry::new_expectation`],
//! embeds it in the outgoing payload, and the transport later hands the reply
//! to [`CorrelationRegistry::resolve`]. Expectations that never get a reply are
//! resolved with [`ResponseStatus::TimedOut`] by [`CorrelationRegistry::sweep`],
//! which a host timer calls on a fixed delay.
//!
//! ## Exactly-Once Delivery
//!
//! Both `resolve` and `sweep` go through the same atomic remove-if-present on
//! the pending table. Whichever removes the entry first owns the callback; the
//! other finds nothing and returns without effect.
//!
//! ## Timing
//!
//! An expectation is timed out by the first sweep at or after its expiration,
//! so detection lags by up to one sweep interval.
//!
//! [`ResponseStatus::TimedOut`]: crate::response::ResponseStatus::TimedOut

use crate::executor::TaskExecutor;
use crate::response::ResponseMessage;
use dashmap::DashMap;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

/// Default fixed delay between sweeps.
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(5);

/// Callback invoked exactly once with the outcome of a request.
pub type ResponseCallback = Box<dyn FnOnce(ResponseMessage) + Send + 'static>;

/// The callback sits behind a mutex so the table stays `Sync` while callers
/// only need to hand over `Send` closures. It is taken once, after the entry
/// has been removed.
struct PendingExpectation {
    callback: Mutex<Option<ResponseCallback>>,
    expires_at: Instant,
}

impl PendingExpectation {
    fn into_callback(self) -> Option<ResponseCallback> {
        self.callback.into_inner()
    }
}

#[derive(Debug, Default)]
struct RegistryCounters {
    created: AtomicU64,
    resolved: AtomicU64,
    timed_out: AtomicU64,
    unmatched: AtomicU64,
}

/// Table of requests awaiting a reply.
pub struct CorrelationRegistry {
    executor: Arc<TaskExecutor>,
    next_id: AtomicU64,
    pending: DashMap<u64, PendingExpectation>,
    counters: RegistryCounters,
}

impl std::fmt::Debug for CorrelationRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CorrelationRegistry")
            .field("pending", &self.pending.len())
            .field("next_id", &self.next_id.load(Ordering::Relaxed))
            .finish()
    }
}

impl CorrelationRegistry {
    pub fn new(executor: Arc<TaskExecutor>) -> Self {
        Self {
            executor,
            next_id: AtomicU64::new(1),
            pending: DashMap::new(),
            counters: RegistryCounters::default(),
        }
    }

    /// Stores a new expectation and returns its correlation id.
    ///
    /// Ids start at 1 and are never reused for the lifetime of the registry.
    pub fn new_expectation<F>(&self, timeout: Duration, callback: F) -> u64
    where
        F: FnOnce(ResponseMessage) + Send + 'static,
    {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let expectation = PendingExpectation {
            callback: Mutex::new(Some(Box::new(callback))),
            expires_at: Instant::now() + timeout,
        };

        self.pending.insert(id, expectation);
        self.counters.created.fetch_add(1, Ordering::Relaxed);
        debug!("🔖 Expecting response #{} within {:?}", id, timeout);
        id
    }

    /// Like [`CorrelationRegistry::new_expectation`] but hands the outcome to
    /// a channel the caller can await.
    pub fn expect_response(&self, timeout: Duration) -> (u64, oneshot::Receiver<ResponseMessage>) {
        let (tx, rx) = oneshot::channel();
        let id = self.new_expectation(timeout, move |response| {
            // The caller may have stopped waiting
            let _ = tx.send(response);
        });
        (id, rx)
    }

    /// Delivers `response` to the expectation registered under `id`.
    ///
    /// Returns `false` without doing anything when `id` is unknown, which is
    /// the normal outcome for a reply that lost the race against a sweep.
    pub fn resolve(&self, id: u64, response: ResponseMessage) -> bool {
        match self.pending.remove(&id) {
            Some((_, expectation)) => {
                self.counters.resolved.fetch_add(1, Ordering::Relaxed);
                debug!("📬 Resolving response #{} with {}", id, response.status());
                if let Some(callback) = expectation.into_callback() {
                    self.deliver(id, callback, response);
                }
                true
            }
            None => {
                self.counters.unmatched.fetch_add(1, Ordering::Relaxed);
                debug!("No pending expectation for response #{}", id);
                false
            }
        }
    }

    /// Resolves `id` with a cancelled outcome.
    pub fn cancel(&self, id: u64) -> bool {
        self.resolve(id, ResponseMessage::cancelled())
    }

    /// Times out every expectation whose deadline has passed and returns how
    /// many were timed out.
    pub fn sweep(&self) -> usize {
        let now = Instant::now();

        // Collect first: removing while iterating would deadlock on the shard lock
        let expired: Vec<u64> = self
            .pending
            .iter()
            .filter(|entry| entry.value().expires_at <= now)
            .map(|entry| *entry.key())
            .collect();

        let mut timed_out = 0;
        for id in expired {
            if let Some((_, expectation)) = self
                .pending
                .remove_if(&id, |_, expectation| expectation.expires_at <= now)
            {
                timed_out += 1;
                if let Some(callback) = expectation.into_callback() {
                    self.deliver(id, callback, ResponseMessage::timed_out());
                }
            }
        }

        if timed_out > 0 {
            self.counters
                .timed_out
                .fetch_add(timed_out as u64, Ordering::Relaxed);
            info!("⏰ Timed out {} pending responses", timed_out);
        }
        timed_out
    }

    /// Drops every pending expectation without invoking callbacks.
    ///
    /// Only meant for full shutdown, after which no resolution is expected.
    pub fn clear(&self) {
        let dropped = self.pending.len();
        self.pending.clear();
        if dropped > 0 {
            warn!("🧹 Dropped {} pending responses without delivery", dropped);
        }
    }

    /// Number of expectations still pending.
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Whether `id` is still pending.
    pub fn contains(&self, id: u64) -> bool {
        self.pending.contains_key(&id)
    }

    pub fn expectations_created(&self) -> u64 {
        self.counters.created.load(Ordering::Relaxed)
    }

    pub fn expectations_resolved(&self) -> u64 {
        self.counters.resolved.load(Ordering::Relaxed)
    }

    pub fn expectations_timed_out(&self) -> u64 {
        self.counters.timed_out.load(Ordering::Relaxed)
    }

    /// Replies that arrived for ids no longer pending.
    pub fn unmatched_responses(&self) -> u64 {
        self.counters.unmatched.load(Ordering::Relaxed)
    }

    /// Spawns the periodic sweep on the current runtime.
    ///
    /// The first sweep runs one `interval` after the call; later sweeps run
    /// with a fixed delay. Abort the returned handle to stop sweeping.
    pub fn spawn_sweeper(self: &Arc<Self>, interval: Duration) -> JoinHandle<()> {
        let registry = Arc::downgrade(self);

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                ticker.tick().await;
                let Some(registry) = registry.upgrade() else {
                    debug!("Registry dropped, stopping sweeper");
                    break;
                };
                registry.sweep();
            }
        })
    }

    /// Hands the callback to the executor, or runs it inline when the
    /// executor refuses work, so a removed expectation is never lost.
    fn deliver(&self, id: u64, callback: ResponseCallback, response: ResponseMessage) {
        let slot = Arc::new(Mutex::new(Some((callback, response))));
        let task_slot = slot.clone();

        let submitted = self.executor.execute(async move {
            if let Some((callback, response)) = take_slot(&task_slot) {
                callback(response);
            }
        });

        if let Err(e) = submitted {
            warn!("⚠️ Delivering response #{} inline: {}", id, e);
            if let Some((callback, response)) = take_slot(&slot) {
                if std::panic::catch_unwind(AssertUnwindSafe(move || callback(response))).is_err() {
                    error!("💥 Response callback #{} panicked", id);
                }
            }
        }
    }
}

fn take_slot(
    slot: &Mutex<Option<(ResponseCallback, ResponseMessage)>>,
) -> Option<(ResponseCallback, ResponseMessage)> {
    slot.lock().take()
}
