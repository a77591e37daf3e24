//! # Task Executor
//!
//! Bounded, drain-aware task execution shared by the notifier and the
//! correlation registry. Work is spawned onto a Tokio runtime but at most
//! `max_workers` submitted tasks run at the same time; the rest wait for a
//! worker permit in submission order.
//!
//! ## Lifecycle
//!
//! ```text
//! Running ──set_accepting_tasks(false)──▶ Draining ──shutdown()──▶ Terminated
//!    ▲                                       │
//!    └────────set_accepting_tasks(true)──────┘
//! ```
//!
//! `Terminated` is absorbing. Submissions are only accepted while `Running`.
//!
//! ## Shutdown
//!
//! [`TaskExecutor::shutdown`] stops intake, waits up to the configured timeout
//! for in-flight work, then raises the cancellation signal and waits once more.
//! Anything still running after that (a task stuck in blocking code never
//! reaches a cancellation point) is abandoned and reported in the returned
//! [`ShutdownOutcome`].

use crate::error::ExchangeError;
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, AtomicU8, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::{watch, Notify, Semaphore};
use tracing::{debug, error, info, warn};

/// Default number of tasks allowed to run concurrently.
pub const DEFAULT_MAX_WORKERS: usize = 8;

/// Default bound for each of the two shutdown waits.
pub const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(60);

/// Lifecycle state of a [`TaskExecutor`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExecutorState {
    Running,
    Draining,
    Terminated,
}

/// Raw state while [`TaskExecutor::shutdown`] runs. Reported as `Draining`,
/// but intake can no longer be reopened from it.
const SHUTTING_DOWN: u8 = 3;

impl ExecutorState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => ExecutorState::Running,
            1 | SHUTTING_DOWN => ExecutorState::Draining,
            _ => ExecutorState::Terminated,
        }
    }

    fn as_u8(self) -> u8 {
        match self {
            ExecutorState::Running => 0,
            ExecutorState::Draining => 1,
            ExecutorState::Terminated => 2,
        }
    }
}

impl fmt::Display for ExecutorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExecutorState::Running => f.write_str("running"),
            ExecutorState::Draining => f.write_str("draining"),
            ExecutorState::Terminated => f.write_str("terminated"),
        }
    }
}

/// How a call to [`TaskExecutor::shutdown`] ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ShutdownOutcome {
    /// All work finished within the first wait
    Completed,
    /// Remaining work had to be cancelled and finished within the second wait
    Cancelled,
    /// Work was still running after cancellation and has been abandoned
    Abandoned { remaining: usize },
    /// The executor had already been shut down
    AlreadyTerminated,
}

impl ShutdownOutcome {
    /// Whether the executor ended with no outstanding work.
    pub fn is_clean(&self) -> bool {
        !matches!(self, ShutdownOutcome::Abandoned { .. })
    }
}

/// Sizing and timing for a [`TaskExecutor`].
#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    /// Maximum number of tasks running at the same time
    pub max_workers: usize,
    /// Bound for the graceful wait and again for the post-cancel wait
    pub shutdown_timeout: Duration,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            max_workers: DEFAULT_MAX_WORKERS,
            shutdown_timeout: DEFAULT_SHUTDOWN_TIMEOUT,
        }
    }
}

/// Counters shared between the executor and its spawned tasks.
#[derive(Debug, Default)]
struct TaskCounters {
    in_flight: AtomicUsize,
    idle: Notify,
    submitted: AtomicU64,
    rejected: AtomicU64,
    panicked: AtomicU64,
    cancelled: AtomicU64,
}

/// Holds one slot of the in-flight count for the lifetime of a task.
///
/// Dropping the guard releases the slot whether the task completed, panicked
/// or was cancelled, and wakes shutdown waiters when the count reaches zero.
struct InFlightGuard {
    counters: Arc<TaskCounters>,
}

impl InFlightGuard {
    fn acquire(counters: &Arc<TaskCounters>) -> Self {
        counters.in_flight.fetch_add(1, Ordering::SeqCst);
        Self {
            counters: counters.clone(),
        }
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        if self.counters.in_flight.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.counters.idle.notify_waiters();
        }
    }
}

/// Bounded worker pool with two-phase, drain-aware shutdown.
///
/// The executor is shared through `Arc<TaskExecutor>`; every method takes
/// `&self` and is safe to call from any thread.
pub struct TaskExecutor {
    runtime: Handle,
    config: ExecutorConfig,
    state: AtomicU8,
    permits: Arc<Semaphore>,
    counters: Arc<TaskCounters>,
    cancel_tx: watch::Sender<bool>,
}

impl fmt::Debug for TaskExecutor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskExecutor")
            .field("state", &self.state())
            .field("max_workers", &self.config.max_workers)
            .field("in_flight", &self.in_flight())
            .finish()
    }
}

impl TaskExecutor {
    /// Creates an executor on the runtime of the calling context.
    ///
    /// # Panics
    ///
    /// Panics when called outside of a Tokio runtime, like `tokio::spawn`.
    pub fn new(config: ExecutorConfig) -> Self {
        Self::with_handle(Handle::current(), config)
    }

    /// Creates an executor that spawns onto the given runtime.
    pub fn with_handle(runtime: Handle, config: ExecutorConfig) -> Self {
        let max_workers = config.max_workers.max(1);
        let (cancel_tx, _) = watch::channel(false);

        Self {
            runtime,
            config: ExecutorConfig {
                max_workers,
                ..config
            },
            state: AtomicU8::new(ExecutorState::Running.as_u8()),
            permits: Arc::new(Semaphore::new(max_workers)),
            counters: Arc::new(TaskCounters::default()),
            cancel_tx,
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ExecutorState {
        ExecutorState::from_u8(self.state.load(Ordering::SeqCst))
    }

    /// Whether [`TaskExecutor::execute`] currently accepts submissions.
    pub fn is_accepting_tasks(&self) -> bool {
        self.state() == ExecutorState::Running
    }

    /// Number of submitted tasks that have not completed yet.
    pub fn in_flight(&self) -> usize {
        self.counters.in_flight.load(Ordering::SeqCst)
    }

    /// Number of submissions refused since creation.
    pub fn rejected_count(&self) -> u64 {
        self.counters.rejected.load(Ordering::Relaxed)
    }

    /// Number of submissions accepted since creation.
    pub fn submitted_count(&self) -> u64 {
        self.counters.submitted.load(Ordering::Relaxed)
    }

    /// Number of tasks that panicked.
    pub fn panicked_count(&self) -> u64 {
        self.counters.panicked.load(Ordering::Relaxed)
    }

    /// Number of tasks dropped by the shutdown cancellation signal.
    pub fn cancelled_count(&self) -> u64 {
        self.counters.cancelled.load(Ordering::Relaxed)
    }

    /// Submits a task for asynchronous execution.
    ///
    /// The task must not block its worker thread for an unbounded time. A
    /// panic inside the task is caught and logged; it never reaches the
    /// submitter.
    ///
    /// # Errors
    ///
    /// Returns [`ExchangeError::Rejected`] when the executor is draining or
    /// terminated. The task is dropped without running.
    pub fn execute<F>(&self, task: F) -> Result<(), ExchangeError>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        // Count first so a concurrent shutdown either sees this task or we see its state change
        let guard = InFlightGuard::acquire(&self.counters);

        let state = self.state();
        if state != ExecutorState::Running {
            drop(guard);
            self.counters.rejected.fetch_add(1, Ordering::Relaxed);
            debug!("🚫 Rejected task submission, executor is {}", state);
            return Err(ExchangeError::Rejected(state));
        }

        self.counters.submitted.fetch_add(1, Ordering::Relaxed);

        let permits = self.permits.clone();
        let counters = self.counters.clone();
        let cancel_rx = self.cancel_tx.subscribe();

        self.runtime.spawn(async move {
            let _guard = guard;

            let run = async {
                let Ok(_permit) = permits.acquire_owned().await else {
                    return;
                };

                if let Err(panic) = AssertUnwindSafe(task).catch_unwind().await {
                    counters.panicked.fetch_add(1, Ordering::Relaxed);
                    error!("💥 Executor task panicked: {}", panic_message(panic.as_ref()));
                }
            };

            tokio::select! {
                biased;
                _ = cancellation(cancel_rx) => {
                    counters.cancelled.fetch_add(1, Ordering::Relaxed);
                    debug!("✂️ Executor task cancelled during shutdown");
                }
                _ = run => {}
            }
        });

        Ok(())
    }

    /// Toggles intake without touching queued or running work.
    ///
    /// Turning intake off moves a running executor to `Draining`; turning it
    /// back on returns a draining executor to `Running`. Has no effect once
    /// the executor is terminated or while a shutdown is in progress.
    pub fn set_accepting_tasks(&self, accepting: bool) {
        let (from, to) = if accepting {
            (ExecutorState::Draining, ExecutorState::Running)
        } else {
            (ExecutorState::Running, ExecutorState::Draining)
        };

        if self
            .state
            .compare_exchange(from.as_u8(), to.as_u8(), Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
        {
            info!("🔀 Executor intake {}", if accepting { "resumed" } else { "stopped" });
        } else {
            debug!("Ignoring intake change, executor is {}", self.state());
        }
    }

    /// Polls the in-flight count until it reaches zero or `max_attempts` polls
    /// have elapsed, sleeping `interval` between polls.
    ///
    /// Best effort: returns `true` when the executor drained and `false` when
    /// the attempts ran out. Callers needing a hard guarantee follow up with
    /// [`TaskExecutor::shutdown`].
    pub async fn await_drain(&self, max_attempts: u32, interval: Duration) -> bool {
        for attempt in 1..=max_attempts {
            let remaining = self.in_flight();
            if remaining == 0 {
                debug!("✅ Executor drained after {} polls", attempt);
                return true;
            }

            debug!(
                "⏳ Waiting for {} tasks to drain (attempt {}/{})",
                remaining, attempt, max_attempts
            );
            tokio::time::sleep(interval).await;
        }

        let remaining = self.in_flight();
        if remaining > 0 {
            warn!(
                "⚠️ Executor did not drain after {} attempts, {} tasks outstanding",
                max_attempts, remaining
            );
        }
        remaining == 0
    }

    /// Stops intake, waits for outstanding work, cancels what is left and
    /// finally abandons anything that ignored cancellation.
    ///
    /// Always completes; the executor is `Terminated` afterwards. Calling it
    /// again returns [`ShutdownOutcome::AlreadyTerminated`].
    pub async fn shutdown(&self) -> ShutdownOutcome {
        let running = ExecutorState::Running.as_u8();
        let draining = ExecutorState::Draining.as_u8();
        let started = self
            .state
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |current| {
                (current == running || current == draining).then_some(SHUTTING_DOWN)
            });
        if started.is_err() {
            return ShutdownOutcome::AlreadyTerminated;
        }

        let timeout = self.config.shutdown_timeout;
        info!(
            "🛑 Executor shutting down with {} tasks in flight",
            self.in_flight()
        );

        let outcome = if self.wait_idle(timeout).await {
            ShutdownOutcome::Completed
        } else {
            warn!(
                "⚠️ {} tasks still running after {:?}, cancelling",
                self.in_flight(),
                timeout
            );
            self.cancel_tx.send_replace(true);
            self.permits.close();

            if self.wait_idle(timeout).await {
                ShutdownOutcome::Cancelled
            } else {
                let remaining = self.in_flight();
                error!(
                    "❌ Executor not idle after cancellation, abandoning {} tasks",
                    remaining
                );
                ShutdownOutcome::Abandoned { remaining }
            }
        };

        self.state
            .store(ExecutorState::Terminated.as_u8(), Ordering::SeqCst);
        info!("✅ Executor terminated ({:?})", outcome);
        outcome
    }

    /// Waits until the in-flight count is zero, up to `limit`.
    async fn wait_idle(&self, limit: Duration) -> bool {
        let counters = &self.counters;
        let idle = async {
            loop {
                // Register interest before checking so a concurrent wake-up is not lost
                let notified = counters.idle.notified();
                if counters.in_flight.load(Ordering::SeqCst) == 0 {
                    return;
                }
                notified.await;
            }
        };

        tokio::time::timeout(limit, idle).await.is_ok()
    }
}

/// Resolves once the cancellation signal is raised.
///
/// If the executor is dropped without raising it the future never resolves, so
/// detached tasks keep running to completion.
async fn cancellation(mut rx: watch::Receiver<bool>) {
    if rx.wait_for(|cancelled| *cancelled).await.is_err() {
        std::future::pending::<()>().await;
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
