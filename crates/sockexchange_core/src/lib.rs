//! # SockExchange Core
//!
//! Message coordination core for a proxy that exchanges channel-tagged
//! messages with its backend servers.
//!
//! ## Components
//!
//! - **[`TaskExecutor`]**: bounded async worker pool with intake control,
//!   best-effort draining and a two-phase shutdown
//! - **[`MessageNotifier`]**: channel-keyed publish/subscribe dispatch; every
//!   consumer runs as its own executor task
//! - **[`CorrelationRegistry`]**: matches replies to pending requests by id and
//!   times out the ones that never get an answer
//!
//! The three are built once and shared as `Arc` handles through an
//! [`ExchangeContext`]. There is no global instance.
//!
//! ## Quick Start Example
//!
//! ```rust
//! use sockexchange_core::*;
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() {
//!     let context = ExchangeContext::new(ExecutorConfig::default());
//!
//!     let logger: Arc<dyn MessageConsumer> = Arc::new(FnConsumer::new("logger", |message| {
//!         let mut input = message.data_input();
//!         println!("{} says {}", message.server_name(), input.read_utf()?);
//!         Ok(())
//!     }));
//!     context.notifier.register("ChatMessage", logger);
//!
//!     let mut writer = MessageWriter::new();
//!     writer.write_utf("hello").unwrap();
//!     context
//!         .notifier
//!         .notify(ReceivedMessage::new("ChatMessage", "lobby", writer.into_bytes()));
//!
//!     let (id, reply) = context.registry.expect_response(Duration::from_secs(5));
//!     context.registry.resolve(id, ResponseMessage::new(ResponseStatus::Ok));
//!     assert!(reply.await.unwrap().status().is_ok());
//!
//!     context.executor.shutdown().await;
//! }
//! ```

pub mod error;
pub mod executor;
pub mod message;
pub mod notifier;
pub mod registry;
pub mod response;
pub mod stats;

pub use error::ExchangeError;
pub use executor::{ExecutorConfig, ExecutorState, ShutdownOutcome, TaskExecutor};
pub use message::{MessageReader, MessageWriter, ReceivedMessage};
pub use notifier::{FnConsumer, MessageConsumer, MessageNotifier};
pub use registry::{CorrelationRegistry, ResponseCallback, DEFAULT_SWEEP_INTERVAL};
pub use response::{ResponseMessage, ResponseStatus};
pub use stats::ExchangeStats;

use std::sync::Arc;

/// Something that attaches itself to an [`ExchangeContext`] and can detach
/// again, such as a channel listener or a periodic sender.
pub trait Registerable: Send + Sync {
    /// Attaches to the context. Calling it twice must not double-register.
    fn register(&self, context: &ExchangeContext);

    /// Detaches from the context; a no-op when not registered.
    fn unregister(&self, context: &ExchangeContext);
}

/// Shared handles to the three coordination components.
#[derive(Debug, Clone)]
pub struct ExchangeContext {
    pub executor: Arc<TaskExecutor>,
    pub notifier: Arc<MessageNotifier>,
    pub registry: Arc<CorrelationRegistry>,
}

impl ExchangeContext {
    /// Builds all components on the current Tokio runtime.
    pub fn new(config: ExecutorConfig) -> Self {
        Self::with_executor(Arc::new(TaskExecutor::new(config)))
    }

    /// Builds the notifier and registry around an existing executor.
    pub fn with_executor(executor: Arc<TaskExecutor>) -> Self {
        Self {
            notifier: Arc::new(MessageNotifier::new(executor.clone())),
            registry: Arc::new(CorrelationRegistry::new(executor.clone())),
            executor,
        }
    }

    /// Collects the current counters of every component.
    pub fn stats(&self) -> ExchangeStats {
        ExchangeStats {
            messages_notified: self.notifier.messages_notified(),
            messages_unrouted: self.notifier.messages_unrouted(),
            consumer_invocations: self.notifier.consumer_invocations(),
            consumer_failures: self.notifier.consumer_failures(),
            expectations_created: self.registry.expectations_created(),
            expectations_resolved: self.registry.expectations_resolved(),
            expectations_timed_out: self.registry.expectations_timed_out(),
            expectations_pending: self.registry.len(),
            unmatched_responses: self.registry.unmatched_responses(),
            tasks_submitted: self.executor.submitted_count(),
            tasks_panicked: self.executor.panicked_count(),
            in_flight: self.executor.in_flight(),
            rejected: self.executor.rejected_count(),
        }
    }
}
