//! Age-based admission control.
//!
//! Events older than the configured maximum age are discarded. Discards of
//! events that happened before the filter was created are silent: the initial
//! list from the event source replays the whole backlog and would otherwise
//! flood the log with warnings on every start.

use crate::clock::{Clock, SystemClock};
use crate::event::Event;
use crate::metrics::{MetricsRecorder, NoopMetrics};
use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use tracing::warn;

/// Decides whether a raw event is too old to forward.
#[derive(Debug, Clone)]
pub struct AdmissionFilter {
    max_event_age: Duration,
    start_time: DateTime<Utc>,
    clock: Arc<dyn Clock>,
    metrics: Arc<dyn MetricsRecorder>,
}

impl AdmissionFilter {
    /// Filter using the system clock; the start time is "now".
    pub fn new(max_event_age_seconds: i64, metrics: Arc<dyn MetricsRecorder>) -> Self {
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let start_time = clock.now();
        Self { max_event_age: Duration::seconds(max_event_age_seconds), start_time, clock, metrics }
    }

    /// Filter with an explicit clock and start time, for tests and replays.
    pub fn with_start_time(
        max_event_age_seconds: i64,
        start_time: DateTime<Utc>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            max_event_age: Duration::seconds(max_event_age_seconds),
            start_time,
            clock,
            metrics: Arc::new(NoopMetrics),
        }
    }

    /// Replace the metrics recorder.
    pub fn with_metrics(mut self, metrics: Arc<dyn MetricsRecorder>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn max_event_age(&self) -> Duration {
        self.max_event_age
    }

    pub fn start_time(&self) -> DateTime<Utc> {
        self.start_time
    }

    /// True when the event is older than the maximum age.
    ///
    /// The age boundary is exclusive: an event exactly `max_event_age` old is
    /// kept. Events without any timestamp are treated as infinitely old.
    pub fn should_discard(&self, event: &Event) -> bool {
        let Some(timestamp) = event.reference_timestamp() else {
            return true;
        };
        let age = self.clock.now() - timestamp;
        if age <= self.max_event_age {
            return false;
        }
        if timestamp > self.start_time {
            warn!(
                event_age = %format_age(age),
                event_namespace = %event.metadata.namespace,
                event_name = %event.metadata.name,
                "Event discarded as being older then maxEventAgeSeconds"
            );
            self.metrics.event_discarded();
        }
        true
    }
}

fn format_age(age: Duration) -> String {
    match age.to_std() {
        Ok(d) => format!("{:?}", d),
        Err(_) => format!("{}s", age.num_seconds()),
    }
}
