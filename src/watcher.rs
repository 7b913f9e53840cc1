//! Event watcher: turns source notifications into routed deliveries.
//!
//! Notifications are processed one at a time, in arrival order. Admission,
//! enrichment and the hand-off to the [`EventHandler`] complete for one
//! event before the next notification is read.

use crate::admission::AdmissionFilter;
use crate::enrich::Enricher;
use crate::event::{EnhancedEvent, Event};
use crate::metrics::MetricsRecorder;
use async_trait::async_trait;
use futures::{Stream, StreamExt};
use std::sync::Arc;
use tracing::{debug, warn};

/// Change notification from the event source.
#[derive(Debug, Clone, PartialEq)]
pub enum Notification {
    /// An event seen for the first time, including the initial listing.
    Added(Event),
    /// A modification of an event already seen. Ignored.
    Updated(Event),
    /// A deletion. Ignored.
    Deleted(Event),
    /// The source's watch failed; the source reconnects on its own.
    WatchError(String),
}

/// Consumer of enriched events.
#[async_trait]
pub trait EventHandler: Send + Sync {
    async fn on_event(&self, event: EnhancedEvent);
}

/// Drives the admission filter and enricher over a notification stream.
#[derive(Debug, Clone)]
pub struct EventWatcher {
    admission: AdmissionFilter,
    enricher: Enricher,
    metrics: Arc<dyn MetricsRecorder>,
}

impl EventWatcher {
    pub fn new(admission: AdmissionFilter, enricher: Enricher, metrics: Arc<dyn MetricsRecorder>) -> Self {
        Self { admission, enricher, metrics }
    }

    pub fn admission(&self) -> &AdmissionFilter {
        &self.admission
    }

    /// Consume `notifications` until the stream ends.
    ///
    /// Callers stop the watcher by ending the stream, e.g. with
    /// `StreamExt::take_until` on a cancellation future.
    pub async fn run<S>(&self, notifications: S, handler: &dyn EventHandler)
    where
        S: Stream<Item = Notification> + Send,
    {
        futures::pin_mut!(notifications);
        while let Some(notification) = notifications.next().await {
            self.handle(notification, handler).await;
        }
        debug!("event watcher stopped");
    }

    /// Process a single notification.
    pub async fn handle(&self, notification: Notification, handler: &dyn EventHandler) {
        match notification {
            Notification::Added(event) => self.on_added(event, handler).await,
            Notification::Updated(_) | Notification::Deleted(_) => {}
            Notification::WatchError(err) => {
                warn!(error = %err, "event watch failed");
                self.metrics.watch_error();
            }
        }
    }

    async fn on_added(&self, event: Event, handler: &dyn EventHandler) {
        if self.admission.should_discard(&event) {
            return;
        }

        debug!(
            msg = %event.message,
            namespace = %event.metadata.namespace,
            reason = %event.reason,
            involved_object = %event.involved_object.name,
            "Received event"
        );
        self.metrics.event_sent();

        let enhanced = self.enricher.enrich(event).await;
        handler.on_event(enhanced).await;
    }
}
