use eventrelay::MetricsRecorder;
use eventrelay_prometheus::{serve_listener, PrometheusMetrics};
use prometheus::Registry;
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

fn counter_value(registry: &Registry, name: &str, receiver: Option<&str>) -> f64 {
    let families = registry.gather();
    let Some(family) = families.iter().find(|mf| mf.get_name() == name) else {
        return 0.0;
    };
    family
        .get_metric()
        .iter()
        .find(|m| match receiver {
            Some(r) => m.get_label().iter().any(|l| l.get_name() == "receiver" && l.get_value() == r),
            None => true,
        })
        .and_then(|m| m.get_counter().as_ref().map(|c| c.value()))
        .unwrap_or(0.0)
}

#[test]
fn counters_use_prefix() {
    let registry = Arc::new(Registry::new());
    let metrics = PrometheusMetrics::new(registry.clone(), "event_exporter_").expect("register metrics");

    metrics.event_sent();
    metrics.event_sent();
    metrics.event_discarded();
    metrics.watch_error();

    assert_eq!(counter_value(&registry, "event_exporter_events_sent", None), 2.0);
    assert_eq!(counter_value(&registry, "event_exporter_events_discarded", None), 1.0);
    assert_eq!(counter_value(&registry, "event_exporter_watch_errors", None), 1.0);
}

#[test]
fn per_receiver_counters_are_labelled() {
    let registry = Arc::new(Registry::new());
    let metrics = PrometheusMetrics::new(registry.clone(), "").expect("register metrics");

    metrics.send_error("slack");
    metrics.send_error("slack");
    metrics.send_error("dump");
    metrics.event_dropped("dump");

    assert_eq!(counter_value(&registry, "send_event_errors", Some("slack")), 2.0);
    assert_eq!(counter_value(&registry, "send_event_errors", Some("dump")), 1.0);
    assert_eq!(counter_value(&registry, "events_dropped", Some("dump")), 1.0);
}

#[test]
fn duplicate_registration_fails() {
    let registry = Arc::new(Registry::new());
    PrometheusMetrics::new(registry.clone(), "x_").expect("first registration");
    assert!(PrometheusMetrics::new(registry, "x_").is_err());
}

#[tokio::test]
async fn metrics_endpoint_serves_text_format() {
    let registry = Arc::new(Registry::new());
    let metrics = PrometheusMetrics::new(registry.clone(), "relay_").expect("register metrics");
    metrics.event_sent();

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (stop_tx, stop_rx) = tokio::sync::oneshot::channel::<()>();
    let server = tokio::spawn(serve_listener(listener, registry, async {
        let _ = stop_rx.await;
    }));

    let mut stream = TcpStream::connect(addr).await.unwrap();
    stream
        .write_all(b"GET /metrics HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n")
        .await
        .unwrap();
    let mut response = String::new();
    stream.read_to_string(&mut response).await.unwrap();

    assert!(response.starts_with("HTTP/1.1 200"), "unexpected response: {response}");
    assert!(response.contains("relay_events_sent 1"));

    stop_tx.send(()).unwrap();
    server.await.unwrap().unwrap();
}
