//! # Message Notifier
//!
//! Channel-keyed publish/subscribe dispatch between the transport and the
//! feature listeners.
//!
//! Every consumer registered on a channel receives its own executor task per
//! message, so a slow or failing consumer never holds up or breaks its
//! siblings, and nothing a consumer does reaches the code that called
//! [`MessageNotifier::notify`].
//!
//! ## Snapshot Semantics
//!
//! `notify` copies the channel's consumer set before scheduling anything. A
//! consumer registered while a dispatch is in progress may or may not see that
//! message, and a consumer whose `unregister` call has returned is never
//! scheduled by any later `notify`.

use crate::error::ExchangeError;
use crate::executor::TaskExecutor;
use crate::message::ReceivedMessage;
use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, error, warn};

/// A handler for messages published on a channel.
///
/// Consumers are compared by identity: registering the same `Arc` on a channel
/// twice stores it once.
#[async_trait]
pub trait MessageConsumer: Send + Sync {
    /// Handles one message. Errors are logged by the notifier and otherwise
    /// ignored.
    async fn accept(&self, message: ReceivedMessage) -> Result<(), ExchangeError>;

    /// Human-readable name used in logs.
    fn consumer_name(&self) -> &str {
        std::any::type_name::<Self>()
    }
}

/// Adapter turning a closure into a [`MessageConsumer`].
///
/// # Examples
///
/// ```rust
/// use sockexchange_core::{FnConsumer, MessageConsumer};
/// use std::sync::Arc;
///
/// let consumer: Arc<dyn MessageConsumer> = Arc::new(FnConsumer::new("chat_logger", |message| {
///     let mut input = message.data_input();
///     println!("chat from {}: {}", message.server_name(), input.read_utf()?);
///     Ok(())
/// }));
/// ```
pub struct FnConsumer<F>
where
    F: Fn(ReceivedMessage) -> Result<(), ExchangeError> + Send + Sync,
{
    name: String,
    handler: F,
}

impl<F> FnConsumer<F>
where
    F: Fn(ReceivedMessage) -> Result<(), ExchangeError> + Send + Sync,
{
    pub fn new(name: impl Into<String>, handler: F) -> Self {
        Self {
            name: name.into(),
            handler,
        }
    }
}

#[async_trait]
impl<F> MessageConsumer for FnConsumer<F>
where
    F: Fn(ReceivedMessage) -> Result<(), ExchangeError> + Send + Sync,
{
    async fn accept(&self, message: ReceivedMessage) -> Result<(), ExchangeError> {
        (self.handler)(message)
    }

    fn consumer_name(&self) -> &str {
        &self.name
    }
}

fn same_consumer(a: &Arc<dyn MessageConsumer>, b: &Arc<dyn MessageConsumer>) -> bool {
    // Compare data pointers only; vtable pointers are not guaranteed unique
    std::ptr::eq(
        Arc::as_ptr(a) as *const (),
        Arc::as_ptr(b) as *const (),
    )
}

#[derive(Debug, Default)]
struct NotifierCounters {
    messages_notified: AtomicU64,
    messages_unrouted: AtomicU64,
    consumer_invocations: AtomicU64,
    consumer_failures: AtomicU64,
}

/// Dispatches inbound messages to the consumers registered on their channel.
pub struct MessageNotifier {
    executor: Arc<TaskExecutor>,
    channels: DashMap<String, Vec<Arc<dyn MessageConsumer>>>,
    counters: Arc<NotifierCounters>,
}

impl std::fmt::Debug for MessageNotifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessageNotifier")
            .field("channels", &self.channels.len())
            .finish()
    }
}

impl MessageNotifier {
    pub fn new(executor: Arc<TaskExecutor>) -> Self {
        Self {
            executor,
            channels: DashMap::new(),
            counters: Arc::new(NotifierCounters::default()),
        }
    }

    /// Adds `consumer` to `channel`.
    ///
    /// Returns `false` when that exact consumer was already registered there.
    pub fn register(&self, channel: &str, consumer: Arc<dyn MessageConsumer>) -> bool {
        let mut consumers = self.channels.entry(channel.to_string()).or_default();

        if consumers.iter().any(|existing| same_consumer(existing, &consumer)) {
            debug!(
                "Consumer {} already registered on {}",
                consumer.consumer_name(),
                channel
            );
            return false;
        }

        debug!("📝 Registered {} on channel {}", consumer.consumer_name(), channel);
        consumers.push(consumer);
        true
    }

    /// Removes `consumer` from `channel`; a no-op when it is not registered.
    ///
    /// Returns whether anything was removed. A channel left without consumers
    /// is dropped from the table.
    pub fn unregister(&self, channel: &str, consumer: &Arc<dyn MessageConsumer>) -> bool {
        let removed = {
            let Some(mut consumers) = self.channels.get_mut(channel) else {
                return false;
            };
            let before = consumers.len();
            consumers.retain(|existing| !same_consumer(existing, consumer));
            before != consumers.len()
        };

        self.channels.remove_if(channel, |_, consumers| consumers.is_empty());

        if removed {
            debug!(
                "🗑️ Unregistered {} from channel {}",
                consumer.consumer_name(),
                channel
            );
        }
        removed
    }

    /// Schedules one invocation per consumer registered on the message's
    /// channel and returns how many were scheduled.
    ///
    /// Messages for channels without consumers are dropped silently.
    /// Invocations refused by the executor are logged and skipped.
    pub fn notify(&self, message: ReceivedMessage) -> usize {
        let consumers = match self.channels.get(message.channel()) {
            Some(consumers) => consumers.value().clone(),
            None => {
                self.counters.messages_unrouted.fetch_add(1, Ordering::Relaxed);
                debug!("No consumers for channel {}", message.channel());
                return 0;
            }
        };

        self.counters.messages_notified.fetch_add(1, Ordering::Relaxed);
        debug!(
            "📤 Dispatching {} from {} to {} consumers",
            message.channel(),
            message.server_name(),
            consumers.len()
        );

        let mut scheduled = 0;
        for consumer in consumers {
            let delivery = message.clone();
            let counters = self.counters.clone();
            let name = consumer.consumer_name().to_string();

            let submitted = self.executor.execute(async move {
                counters.consumer_invocations.fetch_add(1, Ordering::Relaxed);
                let channel = delivery.channel().to_string();

                if let Err(e) = consumer.accept(delivery).await {
                    counters.consumer_failures.fetch_add(1, Ordering::Relaxed);
                    error!(
                        "❌ Consumer {} failed on channel {}: {}",
                        consumer.consumer_name(),
                        channel,
                        e
                    );
                }
            });

            match submitted {
                Ok(()) => scheduled += 1,
                Err(e) => warn!(
                    "⚠️ Could not schedule {} for channel {}: {}",
                    name,
                    message.channel(),
                    e
                ),
            }
        }

        scheduled
    }

    /// Number of consumers currently registered on `channel`.
    pub fn consumer_count(&self, channel: &str) -> usize {
        self.channels.get(channel).map_or(0, |consumers| consumers.len())
    }

    /// Channels that currently have at least one consumer.
    pub fn channels(&self) -> Vec<String> {
        self.channels.iter().map(|entry| entry.key().clone()).collect()
    }

    /// Messages dispatched to at least one consumer.
    pub fn messages_notified(&self) -> u64 {
        self.counters.messages_notified.load(Ordering::Relaxed)
    }

    /// Messages dropped because their channel had no consumers.
    pub fn messages_unrouted(&self) -> u64 {
        self.counters.messages_unrouted.load(Ordering::Relaxed)
    }

    /// Consumer invocations that started running.
    pub fn consumer_invocations(&self) -> u64 {
        self.counters.consumer_invocations.load(Ordering::Relaxed)
    }

    /// Consumer invocations that returned an error.
    pub fn consumer_failures(&self) -> u64 {
        self.counters.consumer_failures.load(Ordering::Relaxed)
    }
}
