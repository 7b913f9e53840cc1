//! Pipeline assembly and lifecycle.

use anyhow::{Context, Result};
use eventrelay::{AdmissionFilter, Config, Engine, Enricher, EventWatcher, MetadataCache, MetricsRecorder, ObjectLookup};
use eventrelay_kube::{event_notifications, KubeObjectLookup, LeaderElector, LeadershipEnd};
use eventrelay_prometheus::{parse_listen_addr, PrometheusMetrics};
use futures::StreamExt;
use kube::Client;
use std::sync::Arc;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Run until a signal arrives or leadership is lost, then drain and return.
pub async fn run(config: Config, metrics_address: &str) -> Result<()> {
    let client = Client::try_default().await.context("cannot get kubeconfig")?;

    let registry = Arc::new(prometheus::Registry::new());
    let prometheus_metrics =
        PrometheusMetrics::new(registry, &config.metrics_name_prefix).context("cannot register metrics")?;
    let metrics: Arc<dyn MetricsRecorder> = Arc::new(prometheus_metrics.clone());

    let shutdown = CancellationToken::new();
    tokio::spawn({
        let shutdown = shutdown.clone();
        async move {
            let signal = wait_for_shutdown().await;
            info!(signal, "Received signal to exit");
            shutdown.cancel();
        }
    });

    let addr = parse_listen_addr(metrics_address)
        .with_context(|| format!("invalid metrics address '{metrics_address}'"))?;
    let metrics_server = tokio::spawn({
        let stopped = shutdown.clone().cancelled_owned();
        async move {
            if let Err(err) = prometheus_metrics.serve(addr, stopped).await {
                error!(error = %err, "metrics server failed");
            }
        }
    });

    let elector = if config.leader_election_enabled() {
        let elector = Arc::new(LeaderElector::new(client.clone(), &config.leader_election));
        if !elector.acquire(&shutdown).await {
            info!("Exiting");
            return Ok(());
        }
        info!(identity = elector.identity(), "leader election got");
        tokio::spawn({
            let elector = elector.clone();
            let shutdown = shutdown.clone();
            async move {
                if elector.hold(&shutdown).await == LeadershipEnd::Lost {
                    error!("leader election lost");
                    shutdown.cancel();
                }
            }
        });
        Some(elector)
    } else {
        None
    };

    let mut engine = Engine::from_config(&config, metrics.clone()).await?;

    let lookup: Arc<dyn ObjectLookup> =
        Arc::new(KubeObjectLookup::with_limits(client.clone(), config.kube_qps, config.kube_burst));
    let enricher = Enricher::new(
        Arc::new(MetadataCache::labels(lookup.clone(), config.cache_size)),
        Arc::new(MetadataCache::annotations(lookup, config.cache_size)),
    )
    .with_cluster_name(config.cluster_name.clone());
    let admission = AdmissionFilter::new(config.max_event_age_seconds, metrics.clone());
    let watcher = EventWatcher::new(admission, enricher, metrics);

    info!(namespace = %config.namespace, receivers = config.receivers.len(), "starting event watch");
    let notifications = event_notifications(client, &config.namespace).take_until(shutdown.cancelled());
    watcher.run(notifications, &engine).await;

    engine.stop().await;
    if let Some(elector) = elector {
        elector.release().await;
    }
    shutdown.cancel();
    if let Err(err) = metrics_server.await {
        warn!(error = %err, "metrics server task failed");
    }
    info!("Exiting");
    Ok(())
}

/// Resolve on SIGINT or SIGTERM, returning the signal name.
async fn wait_for_shutdown() -> &'static str {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            error!(error = %err, "cannot listen for interrupt");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(err) => {
                error!(error = %err, "cannot listen for terminate");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => "interrupt",
        _ = terminate => "terminated",
    }
}
