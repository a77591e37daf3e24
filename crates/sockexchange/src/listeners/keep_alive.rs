//! Periodic empty `KeepAlive` message to every backend server.

use super::channels;
use super::periodic::PeriodicTask;
use crate::tie_in::ProxyTieIn;
use sockexchange_core::{ExchangeContext, Registerable};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

pub struct KeepAliveSender {
    tie_in: Arc<dyn ProxyTieIn>,
    interval: Duration,
    task: PeriodicTask,
}

impl KeepAliveSender {
    pub fn new(tie_in: Arc<dyn ProxyTieIn>, interval: Duration) -> Self {
        Self {
            tie_in,
            interval,
            task: PeriodicTask::new(),
        }
    }
}

impl Registerable for KeepAliveSender {
    fn register(&self, _context: &ExchangeContext) {
        let tie_in = self.tie_in.clone();
        let started = self.task.start("keep-alive sender", self.interval, move || {
            tie_in.send_to_servers(channels::KEEP_ALIVE, &[], &[]);
            async {}
        });
        if started {
            debug!("💓 Keep-alive sender started every {:?}", self.interval);
        }
    }

    fn unregister(&self, _context: &ExchangeContext) {
        if self.task.stop() {
            debug!("💓 Keep-alive sender stopped");
        }
    }
}
