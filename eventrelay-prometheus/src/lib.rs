//! Prometheus recorder for `eventrelay`.
//! Bring your own `prometheus::Registry`; counters are registered and incremented.

use eventrelay::MetricsRecorder;
use prometheus::{IntCounter, IntCounterVec, Opts, Registry};
use std::net::SocketAddr;
use std::sync::Arc;

mod server;

pub use server::{parse_listen_addr, router, serve, serve_listener};

/// Pipeline counters exported under an optional name prefix.
#[derive(Clone, Debug)]
pub struct PrometheusMetrics {
    registry: Arc<Registry>,
    events_sent: IntCounter,
    events_discarded: IntCounter,
    watch_errors: IntCounter,
    send_errors: IntCounterVec,
    events_dropped: IntCounterVec,
}

impl PrometheusMetrics {
    /// Register the counters into `registry`, each name prefixed by `prefix`.
    ///
    /// # Errors
    /// Returns an error if a metric cannot be registered (e.g. name conflict
    /// or an invalid prefix).
    pub fn new<R: Into<Arc<Registry>>>(registry: R, prefix: &str) -> Result<Self, prometheus::Error> {
        let registry = registry.into();
        let counter = |name: &str, help: &str| -> Result<IntCounter, prometheus::Error> {
            let c = IntCounter::with_opts(Opts::new(format!("{prefix}{name}"), help))?;
            registry.register(Box::new(c.clone()))?;
            Ok(c)
        };
        let per_receiver = |name: &str, help: &str| -> Result<IntCounterVec, prometheus::Error> {
            let c = IntCounterVec::new(Opts::new(format!("{prefix}{name}"), help), &["receiver"])?;
            registry.register(Box::new(c.clone()))?;
            Ok(c)
        };

        let events_sent = counter("events_sent", "The total number of events processed")?;
        let events_discarded = counter(
            "events_discarded",
            "The total number of events discarded because of being older than the maxEventAgeSeconds specified",
        )?;
        let watch_errors = counter("watch_errors", "The total number of errors received from the informer")?;
        let send_errors = per_receiver("send_event_errors", "The total number of send event errors")?;
        let events_dropped =
            per_receiver("events_dropped", "The total number of events dropped because a receiver queue was full")?;

        Ok(Self { registry, events_sent, events_discarded, watch_errors, send_errors, events_dropped })
    }

    /// Expose the registry for HTTP scraping.
    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    /// Serve this recorder's registry at `GET /metrics` until `shutdown` resolves.
    pub async fn serve<F>(&self, addr: SocketAddr, shutdown: F) -> std::io::Result<()>
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        serve(addr, self.registry.clone(), shutdown).await
    }
}

impl MetricsRecorder for PrometheusMetrics {
    fn event_sent(&self) {
        self.events_sent.inc();
    }

    fn event_discarded(&self) {
        self.events_discarded.inc();
    }

    fn watch_error(&self) {
        self.watch_errors.inc();
    }

    fn send_error(&self, receiver: &str) {
        self.send_errors.with_label_values(&[receiver]).inc();
    }

    fn event_dropped(&self, receiver: &str) {
        self.events_dropped.with_label_values(&[receiver]).inc();
    }
}
