//! Fixed-delay background task shared by the periodic senders.

use parking_lot::Mutex;
use std::future::Future;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::error;

/// Holds at most one running ticker task.
#[derive(Debug, Default)]
pub struct PeriodicTask {
    task: Mutex<Option<JoinHandle<()>>>,
}

impl PeriodicTask {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts calling `tick` every `period`, the first call immediately.
    ///
    /// Returns `false` when already running or when there is no runtime.
    pub fn start<F, Fut>(&self, name: &str, period: Duration, mut tick: F) -> bool
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let mut task = self.task.lock();
        if task.is_some() {
            return false;
        }

        let runtime = match Handle::try_current() {
            Ok(runtime) => runtime,
            Err(e) => {
                error!("❌ Cannot start {} outside a runtime: {}", name, e);
                return false;
            }
        };

        *task = Some(runtime.spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                ticker.tick().await;
                tick().await;
            }
        }));
        true
    }

    /// Aborts the task. Returns whether one was running.
    pub fn stop(&self) -> bool {
        match self.task.lock().take() {
            Some(handle) => {
                handle.abort();
                true
            }
            None => false,
        }
    }

    pub fn is_running(&self) -> bool {
        self.task
            .lock()
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }
}

impl Drop for PeriodicTask {
    fn drop(&mut self) {
        if let Some(handle) = self.task.get_mut().take() {
            handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[tokio::test(start_paused = true)]
    async fn test_ticks_until_stopped() {
        let task = PeriodicTask::new();
        let ticks = Arc::new(AtomicUsize::new(0));

        let counter = ticks.clone();
        assert!(task.start("counter", Duration::from_secs(1), move || {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
            }
        }));
        assert!(task.is_running());
        // A second start is refused while running
        assert!(!task.start("counter", Duration::from_secs(1), || async {}));

        tokio::time::sleep(Duration::from_millis(2500)).await;
        assert_eq!(ticks.load(Ordering::SeqCst), 3);

        assert!(task.stop());
        assert!(!task.is_running());
        assert!(!task.stop());

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(ticks.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_start_outside_runtime_fails() {
        let task = PeriodicTask::new();
        assert!(!task.start("orphan", Duration::from_secs(1), || async {}));
        assert!(!task.is_running());
    }
}
