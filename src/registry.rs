//! Receiver registry: one bounded queue and one worker task per receiver.
//!
//! [`ReceiverRegistry::send_event`] only enqueues. Each receiver's worker
//! drains its queue in order and calls the bound sink, so a slow or failing
//! sink stalls nothing but its own queue. Sink failures are logged and
//! counted per receiver and never retried here.

use crate::error::RegistryError;
use crate::event::EnhancedEvent;
use crate::metrics::{MetricsRecorder, NoopMetrics};
use crate::sinks::Sink;
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Default number of events buffered per receiver.
pub const DEFAULT_QUEUE_CAPACITY: usize = 1024;

/// Log one warning per this many queue-full drops on a receiver.
const DROP_WARN_EVERY: u64 = 1000;

/// What `send_event` does when a receiver's queue is full.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackpressurePolicy {
    /// Drop the event and count it. Ingestion never waits on a sink.
    #[default]
    Drop,
    /// Wait for space. A stuck sink stalls the whole pipeline.
    Block,
}

/// `receiverQueue` settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueConfig {
    #[serde(default = "default_capacity")]
    pub capacity: usize,
    #[serde(default)]
    pub on_full: BackpressurePolicy,
}

fn default_capacity() -> usize {
    DEFAULT_QUEUE_CAPACITY
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self { capacity: DEFAULT_QUEUE_CAPACITY, on_full: BackpressurePolicy::default() }
    }
}

/// Named delivery targets with asynchronous dispatch.
#[async_trait]
pub trait ReceiverRegistry: Send + Sync {
    /// Bind `sink` to a new receiver called `name`.
    fn register(&mut self, name: &str, sink: Arc<dyn Sink>) -> Result<(), RegistryError>;

    /// Hand `event` to the receiver's queue. Never calls the sink directly.
    async fn send_event(&self, name: &str, event: Arc<EnhancedEvent>) -> Result<(), RegistryError>;

    /// Whether a receiver called `name` is registered.
    fn contains(&self, name: &str) -> bool;

    /// Drain every queue, join the workers, then close the sinks. Calling it
    /// again is a no-op.
    async fn close(&mut self);
}

struct Registration {
    tx: Option<mpsc::Sender<Arc<EnhancedEvent>>>,
    worker: Option<JoinHandle<()>>,
    sink: Arc<dyn Sink>,
    dropped: AtomicU64,
}

/// [`ReceiverRegistry`] backed by tokio channels and tasks.
pub struct ChannelReceiverRegistry {
    receivers: HashMap<String, Registration>,
    queue: QueueConfig,
    metrics: Arc<dyn MetricsRecorder>,
}

impl std::fmt::Debug for ChannelReceiverRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut names: Vec<&String> = self.receivers.keys().collect();
        names.sort();
        f.debug_struct("ChannelReceiverRegistry")
            .field("receivers", &names)
            .field("queue", &self.queue)
            .finish()
    }
}

impl Default for ChannelReceiverRegistry {
    fn default() -> Self {
        Self::new(QueueConfig::default(), Arc::new(NoopMetrics))
    }
}

impl ChannelReceiverRegistry {
    pub fn new(queue: QueueConfig, metrics: Arc<dyn MetricsRecorder>) -> Self {
        Self {
            receivers: HashMap::new(),
            queue: QueueConfig { capacity: queue.capacity.max(1), ..queue },
            metrics,
        }
    }

    /// Registered receiver names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.receivers.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Events dropped on `name` because its queue was full.
    pub fn dropped(&self, name: &str) -> u64 {
        self.receivers.get(name).map(|r| r.dropped.load(Ordering::Relaxed)).unwrap_or_default()
    }

    fn record_drop(&self, name: &str, registration: &Registration) {
        let previous = registration.dropped.fetch_add(1, Ordering::Relaxed);
        self.metrics.event_dropped(name);
        if previous % DROP_WARN_EVERY == 0 {
            warn!(
                target: "eventrelay::registry",
                receiver = %name,
                dropped = previous + 1,
                capacity = self.queue.capacity,
                "receiver queue full; dropping event"
            );
        }
    }
}

#[async_trait]
impl ReceiverRegistry for ChannelReceiverRegistry {
    fn register(&mut self, name: &str, sink: Arc<dyn Sink>) -> Result<(), RegistryError> {
        if self.receivers.contains_key(name) {
            return Err(RegistryError::Duplicate(name.to_string()));
        }

        let (tx, rx) = mpsc::channel(self.queue.capacity);
        let worker = tokio::spawn(run_worker(name.to_string(), sink.clone(), rx, self.metrics.clone()));
        self.receivers.insert(
            name.to_string(),
            Registration { tx: Some(tx), worker: Some(worker), sink, dropped: AtomicU64::new(0) },
        );
        info!(receiver = %name, "Registered sink");
        Ok(())
    }

    async fn send_event(&self, name: &str, event: Arc<EnhancedEvent>) -> Result<(), RegistryError> {
        let registration = self
            .receivers
            .get(name)
            .ok_or_else(|| RegistryError::UnknownReceiver(name.to_string()))?;
        let tx = registration.tx.as_ref().ok_or(RegistryError::Closed)?;

        match self.queue.on_full {
            BackpressurePolicy::Block => tx.send(event).await.map_err(|_| RegistryError::Closed),
            BackpressurePolicy::Drop => match tx.try_send(event) {
                Ok(()) => Ok(()),
                Err(TrySendError::Full(_)) => {
                    self.record_drop(name, registration);
                    Err(RegistryError::QueueFull(name.to_string()))
                }
                Err(TrySendError::Closed(_)) => Err(RegistryError::Closed),
            },
        }
    }

    fn contains(&self, name: &str) -> bool {
        self.receivers.contains_key(name)
    }

    async fn close(&mut self) {
        // Closing every sender first lets all workers drain in parallel.
        for registration in self.receivers.values_mut() {
            registration.tx.take();
        }
        for (name, registration) in self.receivers.iter_mut() {
            let Some(worker) = registration.worker.take() else {
                continue;
            };
            if let Err(err) = worker.await {
                error!(receiver = %name, error = %err, "receiver worker terminated abnormally");
            }
            registration.sink.close().await;
            debug!(receiver = %name, "Closed sink");
        }
    }
}

async fn run_worker(
    name: String,
    sink: Arc<dyn Sink>,
    mut rx: mpsc::Receiver<Arc<EnhancedEvent>>,
    metrics: Arc<dyn MetricsRecorder>,
) {
    while let Some(event) = rx.recv().await {
        if let Err(err) = sink.send(&event).await {
            warn!(
                receiver = %name,
                error = %err,
                event_namespace = %event.metadata.namespace,
                event_name = %event.metadata.name,
                "Cannot send event"
            );
            metrics.send_error(&name);
        }
    }
    debug!(receiver = %name, "receiver worker stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SinkError;
    use crate::metrics::AtomicMetrics;
    use crate::sinks::MemorySink;
    use std::time::Duration;
    use tokio::sync::Semaphore;

    /// Sink that waits for a permit before each delivery.
    struct GatedSink {
        gate: Arc<Semaphore>,
        inner: MemorySink,
    }

    #[async_trait]
    impl Sink for GatedSink {
        async fn send(&self, event: &EnhancedEvent) -> Result<(), SinkError> {
            let permit = self.gate.acquire().await.map_err(|e| SinkError::Other(e.to_string()))?;
            permit.forget();
            self.inner.send(event).await
        }
    }

    fn event(reason: &str) -> Arc<EnhancedEvent> {
        Arc::new(EnhancedEvent { reason: reason.into(), ..Default::default() })
    }

    #[tokio::test]
    async fn duplicate_names_are_rejected() {
        let mut registry = ChannelReceiverRegistry::default();
        registry.register("dump", Arc::new(MemorySink::new())).unwrap();
        assert_eq!(
            registry.register("dump", Arc::new(MemorySink::new())),
            Err(RegistryError::Duplicate("dump".into()))
        );
        registry.close().await;
    }

    #[tokio::test]
    async fn unknown_receiver_is_an_error() {
        let registry = ChannelReceiverRegistry::default();
        assert_eq!(
            registry.send_event("nope", event("x")).await,
            Err(RegistryError::UnknownReceiver("nope".into()))
        );
    }

    #[tokio::test]
    async fn preserves_fifo_order_per_receiver() {
        let sink = MemorySink::new();
        let mut registry = ChannelReceiverRegistry::default();
        registry.register("dump", Arc::new(sink.clone())).unwrap();
        for i in 0..50 {
            registry.send_event("dump", event(&i.to_string())).await.unwrap();
        }
        registry.close().await;

        let reasons: Vec<String> = sink.events().into_iter().map(|e| e.reason).collect();
        let expected: Vec<String> = (0..50).map(|i| i.to_string()).collect();
        assert_eq!(reasons, expected);
        assert!(sink.is_closed());
    }

    #[tokio::test]
    async fn full_queue_drops_and_counts() {
        let gate = Arc::new(Semaphore::new(0));
        let inner = MemorySink::new();
        let metrics = Arc::new(AtomicMetrics::new());
        let mut registry = ChannelReceiverRegistry::new(
            QueueConfig { capacity: 1, on_full: BackpressurePolicy::Drop },
            metrics.clone(),
        );
        registry
            .register("slow", Arc::new(GatedSink { gate: gate.clone(), inner: inner.clone() }))
            .unwrap();

        // First event is taken by the worker, which then blocks on the gate.
        registry.send_event("slow", event("1")).await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        registry.send_event("slow", event("2")).await.unwrap();
        assert_eq!(
            registry.send_event("slow", event("3")).await,
            Err(RegistryError::QueueFull("slow".into()))
        );
        assert_eq!(registry.dropped("slow"), 1);
        assert_eq!(metrics.snapshot().dropped_for("slow"), 1);

        gate.add_permits(10);
        registry.close().await;
        let reasons: Vec<String> = inner.events().into_iter().map(|e| e.reason).collect();
        assert_eq!(reasons, vec!["1", "2"]);
    }

    #[tokio::test]
    async fn block_policy_waits_for_space() {
        let gate = Arc::new(Semaphore::new(0));
        let inner = MemorySink::new();
        let mut registry = ChannelReceiverRegistry::new(
            QueueConfig { capacity: 1, on_full: BackpressurePolicy::Block },
            Arc::new(NoopMetrics),
        );
        registry
            .register("slow", Arc::new(GatedSink { gate: gate.clone(), inner: inner.clone() }))
            .unwrap();

        registry.send_event("slow", event("1")).await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        registry.send_event("slow", event("2")).await.unwrap();

        let blocked = tokio::time::timeout(
            Duration::from_millis(50),
            registry.send_event("slow", event("3")),
        )
        .await;
        assert!(blocked.is_err(), "third send should wait for queue space");

        gate.add_permits(10);
        registry.send_event("slow", event("4")).await.unwrap();
        registry.close().await;
        assert_eq!(inner.len(), 3);
    }

    #[tokio::test]
    async fn close_is_idempotent_and_rejects_late_events() {
        let sink = MemorySink::new();
        let mut registry = ChannelReceiverRegistry::default();
        registry.register("dump", Arc::new(sink.clone())).unwrap();
        registry.close().await;
        registry.close().await;
        assert_eq!(registry.send_event("dump", event("late")).await, Err(RegistryError::Closed));
        assert!(sink.is_empty());
    }
}
