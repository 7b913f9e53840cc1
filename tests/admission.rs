mod common;

use chrono::Duration;
use common::{at, capture_logs, event};
use eventrelay::{AdmissionFilter, AtomicMetrics, ManualClock};
use std::sync::Arc;

const WARNING: &str = "Event discarded as being older then maxEventAgeSeconds";

fn filter(start_offset_secs: i64) -> (AdmissionFilter, Arc<ManualClock>, Arc<AtomicMetrics>) {
    let start = at(10, 0, 0) + Duration::seconds(start_offset_secs);
    let clock = Arc::new(ManualClock::new(at(10, 0, 0)));
    let metrics = Arc::new(AtomicMetrics::new());
    let filter = AdmissionFilter::with_start_time(5, start, clock.clone()).with_metrics(metrics.clone());
    (filter, clock, metrics)
}

#[test]
fn stale_live_event_warns_and_counts() {
    let logs = capture_logs();
    // process started before the event was reported
    let (filter, clock, metrics) = filter(-60);
    clock.advance(Duration::seconds(6));

    assert!(filter.should_discard(&event("shop", "BackOff", "Warning")));
    assert_eq!(metrics.snapshot().events_discarded, 1);

    let out = logs.contents();
    assert!(out.contains(WARNING), "missing warning in: {out}");
    assert!(out.contains("web-0.BackOff"));
}

#[test]
fn stale_startup_backlog_is_silent() {
    let logs = capture_logs();
    // event predates process start, as during the initial list
    let (filter, clock, metrics) = filter(60);
    clock.advance(Duration::seconds(600));

    assert!(filter.should_discard(&event("shop", "BackOff", "Warning")));
    assert_eq!(metrics.snapshot().events_discarded, 0);
    assert!(!logs.contents().contains(WARNING));
}

#[test]
fn discard_at_exact_start_time_is_silent() {
    let logs = capture_logs();
    // event reported at the instant the process started
    let (filter, clock, metrics) = filter(0);
    clock.advance(Duration::seconds(30));

    assert!(filter.should_discard(&event("shop", "BackOff", "Warning")));
    assert_eq!(metrics.snapshot().events_discarded, 0);
    assert!(!logs.contents().contains(WARNING));
}

#[test]
fn boundary_age_is_admitted() {
    let (filter, clock, metrics) = filter(-60);
    clock.advance(Duration::seconds(5));
    assert!(!filter.should_discard(&event("shop", "BackOff", "Warning")));

    clock.advance(Duration::milliseconds(1));
    assert!(filter.should_discard(&event("shop", "BackOff", "Warning")));
    assert_eq!(metrics.snapshot().events_discarded, 1);
}

#[test]
fn event_time_is_used_when_last_timestamp_is_zero() {
    let (filter, clock, _) = filter(-60);
    clock.advance(Duration::seconds(3));

    let mut ev = event("shop", "Scheduled", "Normal");
    ev.last_timestamp = None;
    ev.event_time = Some(at(10, 0, 0));
    assert!(!filter.should_discard(&ev));

    ev.event_time = Some(at(9, 0, 0));
    assert!(filter.should_discard(&ev));
}
