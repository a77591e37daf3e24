//! End-to-end behavior of executor, notifier and registry working together.

use sockexchange_core::*;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::{timeout, Instant};

const DRAIN_ATTEMPTS: u32 = 200;
const DRAIN_INTERVAL: Duration = Duration::from_millis(10);

fn chat_payload(sender: &str, text: &str) -> Vec<u8> {
    let mut writer = MessageWriter::new();
    writer.write_utf(sender).unwrap();
    writer.write_utf(text).unwrap();
    writer.into_bytes()
}

/// Consumer that decodes the chat payload and records what it read.
fn recording_consumer(name: &str, log: Arc<Mutex<Vec<(String, String, String)>>>) -> Arc<dyn MessageConsumer> {
    let name = name.to_string();
    Arc::new(FnConsumer::new(name.clone(), move |message| {
        let mut input = message.data_input();
        let sender = input.read_utf()?;
        let text = input.read_utf()?;
        log.lock().unwrap().push((name.clone(), sender, text));
        Ok(())
    }))
}

fn counting_consumer(name: &str, hits: Arc<AtomicUsize>) -> Arc<dyn MessageConsumer> {
    Arc::new(FnConsumer::new(name, move |_message| {
        hits.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }))
}

#[tokio::test(flavor = "multi_thread")]
async fn test_both_consumers_read_full_payload() {
    let context = ExchangeContext::new(ExecutorConfig::default());
    let log = Arc::new(Mutex::new(Vec::new()));

    context.notifier.register("chat", recording_consumer("A", log.clone()));
    context.notifier.register("chat", recording_consumer("B", log.clone()));

    let scheduled = context
        .notifier
        .notify(ReceivedMessage::new("chat", "lobby", chat_payload("alice", "hi all")));
    assert_eq!(scheduled, 2);
    assert!(context.executor.await_drain(DRAIN_ATTEMPTS, DRAIN_INTERVAL).await);

    let mut entries = log.lock().unwrap().clone();
    entries.sort();
    assert_eq!(
        entries,
        vec![
            ("A".to_string(), "alice".to_string(), "hi all".to_string()),
            ("B".to_string(), "alice".to_string(), "hi all".to_string()),
        ]
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn test_unregistered_consumer_not_invoked() {
    let context = ExchangeContext::new(ExecutorConfig::default());
    let a_hits = Arc::new(AtomicUsize::new(0));
    let b_hits = Arc::new(AtomicUsize::new(0));
    let a = counting_consumer("A", a_hits.clone());
    let b = counting_consumer("B", b_hits.clone());

    context.notifier.register("chat", a.clone());
    context.notifier.register("chat", b.clone());
    assert!(context.notifier.unregister("chat", &a));

    context.notifier.notify(ReceivedMessage::new("chat", "lobby", vec![]));
    assert!(context.executor.await_drain(DRAIN_ATTEMPTS, DRAIN_INTERVAL).await);

    assert_eq!(a_hits.load(Ordering::SeqCst), 0);
    assert_eq!(b_hits.load(Ordering::SeqCst), 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_panicking_consumer_isolated_from_siblings() {
    let context = ExchangeContext::new(ExecutorConfig::default());
    let hits = Arc::new(AtomicUsize::new(0));

    context.notifier.register(
        "chat",
        Arc::new(FnConsumer::new("bomb", |_message| panic!("consumer blew up"))),
    );
    context.notifier.register("chat", counting_consumer("steady", hits.clone()));

    assert_eq!(context.notifier.notify(ReceivedMessage::new("chat", "lobby", vec![])), 2);
    assert!(context.executor.await_drain(DRAIN_ATTEMPTS, DRAIN_INTERVAL).await);

    assert_eq!(hits.load(Ordering::SeqCst), 1);
    assert_eq!(context.executor.panicked_count(), 1);
    assert!(context.executor.is_accepting_tasks());
}

#[tokio::test(flavor = "multi_thread")]
async fn test_every_expectation_resolved_exactly_once() {
    let context = ExchangeContext::new(ExecutorConfig::default());
    let invocations: Arc<Mutex<HashMap<u64, usize>>> = Arc::new(Mutex::new(HashMap::new()));

    // Zero timeout so every id is eligible for both resolve and sweep
    let mut tracked = Vec::new();
    for _ in 0..500 {
        let invocations = invocations.clone();
        let slot = Arc::new(Mutex::new(None::<u64>));
        let callback_slot = slot.clone();
        let id = context.registry.new_expectation(Duration::ZERO, move |_response| {
            if let Some(id) = *callback_slot.lock().unwrap() {
                *invocations.lock().unwrap().entry(id).or_default() += 1;
            }
        });
        *slot.lock().unwrap() = Some(id);
        tracked.push(id);
    }

    let mut racers = Vec::new();
    for chunk in tracked.chunks(50) {
        let registry = context.registry.clone();
        let chunk = chunk.to_vec();
        racers.push(tokio::spawn(async move {
            for id in chunk {
                registry.resolve(id, ResponseMessage::new(ResponseStatus::Ok));
            }
        }));
    }
    for _ in 0..4 {
        let registry = context.registry.clone();
        racers.push(tokio::spawn(async move {
            registry.sweep();
        }));
    }
    for racer in racers {
        racer.await.unwrap();
    }

    assert!(context.executor.await_drain(DRAIN_ATTEMPTS, DRAIN_INTERVAL).await);
    assert!(context.registry.is_empty());

    let invocations = invocations.lock().unwrap();
    assert_eq!(invocations.len(), tracked.len());
    assert!(invocations.values().all(|&count| count == 1));

    let stats = context.stats();
    assert_eq!(
        stats.expectations_resolved + stats.expectations_timed_out,
        tracked.len() as u64
    );
}

#[tokio::test(start_paused = true)]
async fn test_timeout_detected_within_one_sweep_interval() {
    let context = ExchangeContext::new(ExecutorConfig::default());
    let sweeper = context.registry.spawn_sweeper(Duration::from_millis(5000));

    let started = Instant::now();
    let (_id, reply) = context.registry.expect_response(Duration::from_millis(1000));

    let response = reply.await.unwrap();
    let elapsed = started.elapsed();

    assert_eq!(response.status(), ResponseStatus::TimedOut);
    assert!(elapsed >= Duration::from_millis(1000), "timed out early: {:?}", elapsed);
    assert!(elapsed <= Duration::from_millis(5100), "timed out late: {:?}", elapsed);

    sweeper.abort();
}

#[tokio::test(start_paused = true)]
async fn test_resolved_expectation_not_swept() {
    let context = ExchangeContext::new(ExecutorConfig::default());
    let hits = Arc::new(AtomicUsize::new(0));
    let sweeper = context.registry.spawn_sweeper(Duration::from_millis(5000));

    let callback_hits = hits.clone();
    let id = context
        .registry
        .new_expectation(Duration::from_millis(1000), move |response| {
            assert!(response.status().is_ok());
            callback_hits.fetch_add(1, Ordering::SeqCst);
        });

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(context.registry.resolve(id, ResponseMessage::new(ResponseStatus::Ok)));

    // Let several sweeps pass
    tokio::time::sleep(Duration::from_millis(16_000)).await;

    assert_eq!(hits.load(Ordering::SeqCst), 1);
    assert_eq!(context.registry.expectations_timed_out(), 0);
    sweeper.abort();
}

#[tokio::test(flavor = "multi_thread")]
async fn test_intake_stop_rejects_and_drain_is_bounded() {
    let context = ExchangeContext::new(ExecutorConfig {
        max_workers: 2,
        shutdown_timeout: Duration::from_millis(100),
    });

    // Keep one task busy so the drain cannot complete
    let (release_tx, release_rx) = tokio::sync::oneshot::channel::<()>();
    context
        .executor
        .execute(async move {
            let _ = release_rx.await;
        })
        .unwrap();

    context.executor.set_accepting_tasks(false);
    let rejected = context.executor.execute(async {});
    assert!(matches!(rejected, Err(ExchangeError::Rejected(ExecutorState::Draining))));

    let drained = timeout(
        Duration::from_secs(2),
        context.executor.await_drain(3, Duration::from_millis(10)),
    )
    .await
    .expect("await_drain must give up after its attempts");
    assert!(!drained);

    release_tx.send(()).unwrap();
    assert!(context.executor.await_drain(DRAIN_ATTEMPTS, DRAIN_INTERVAL).await);
    assert!(context.executor.shutdown().await.is_clean());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_registration_churn() {
    const CHANNELS: usize = 10;
    const CONSUMERS: usize = 5;
    const TASKS: usize = 50;

    let context = ExchangeContext::new(ExecutorConfig::default());
    let hits = Arc::new(AtomicUsize::new(0));
    let consumers: Vec<Arc<dyn MessageConsumer>> = (0..CONSUMERS)
        .map(|i| counting_consumer(&format!("consumer-{i}"), hits.clone()))
        .collect();
    let channels: Vec<String> = (0..CHANNELS).map(|i| format!("channel-{i}")).collect();

    let mut handles = Vec::new();
    for task in 0..TASKS {
        let notifier = context.notifier.clone();
        let consumers = consumers.clone();
        let channels = channels.clone();
        handles.push(tokio::spawn(async move {
            for round in 0..20 {
                let consumer = &consumers[(task + round) % CONSUMERS];
                let channel = &channels[(task * 7 + round) % CHANNELS];
                notifier.register(channel, consumer.clone());
                tokio::task::yield_now().await;
                notifier.unregister(channel, consumer);
            }
        }));
    }
    for task in 0..TASKS {
        let notifier = context.notifier.clone();
        let channels = channels.clone();
        handles.push(tokio::spawn(async move {
            for round in 0..20 {
                let channel = &channels[(task + round) % CHANNELS];
                notifier.notify(ReceivedMessage::new(channel.as_str(), "hub", vec![]));
                tokio::task::yield_now().await;
            }
        }));
    }

    timeout(Duration::from_secs(30), futures::future::join_all(handles))
        .await
        .expect("registration churn deadlocked")
        .into_iter()
        .for_each(|result| result.unwrap());

    assert!(context.executor.await_drain(DRAIN_ATTEMPTS, DRAIN_INTERVAL).await);
    assert!(context.notifier.channels().is_empty());

    // Every consumer is now unregistered; further notifies reach nobody
    let settled = hits.load(Ordering::SeqCst);
    for channel in &channels {
        assert_eq!(
            context.notifier.notify(ReceivedMessage::new(channel.as_str(), "hub", vec![])),
            0
        );
    }
    assert!(context.executor.await_drain(DRAIN_ATTEMPTS, DRAIN_INTERVAL).await);
    assert_eq!(hits.load(Ordering::SeqCst), settled);
}
