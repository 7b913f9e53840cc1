use chrono::{TimeZone, Utc};
use eventrelay::{
    AdmissionFilter, AtomicMetrics, ChannelReceiverRegistry, Engine, Enricher, EventWatcher, LookupError,
    ManualClock, MemorySink, MetadataCache, ObjectLookup, ObjectMetadata, ObjectReference, QueueConfig,
    ReceiverRegistry, Route,
};
use eventrelay_kube::notifications;
use k8s_openapi::api::core::v1::Event as CoreEvent;
use kube::runtime::watcher;
use serde_json::json;
use std::collections::BTreeMap;
use std::sync::Arc;

struct PodLabels;

#[async_trait::async_trait]
impl ObjectLookup for PodLabels {
    async fn fetch(&self, reference: &ObjectReference) -> Result<ObjectMetadata, LookupError> {
        if reference.name == "gone" {
            return Err(LookupError::NotFound);
        }
        Ok(ObjectMetadata {
            labels: BTreeMap::from([("app".to_string(), reference.name.clone())]),
            annotations: BTreeMap::new(),
        })
    }
}

fn core(uid: &str, object: &str, reason: &str, last: &str) -> CoreEvent {
    serde_json::from_value(json!({
        "metadata": { "name": uid, "namespace": "shop", "uid": uid },
        "involvedObject": { "kind": "Pod", "namespace": "shop", "name": object, "apiVersion": "v1" },
        "reason": reason,
        "type": "Warning",
        "lastTimestamp": last
    }))
    .unwrap()
}

#[tokio::test]
async fn watch_stream_flows_through_to_receivers() {
    let start = Utc.with_ymd_and_hms(2024, 3, 1, 10, 0, 0).unwrap();
    let clock = Arc::new(ManualClock::new(start));
    let metrics = Arc::new(AtomicMetrics::new());

    let lookup: Arc<dyn ObjectLookup> = Arc::new(PodLabels);
    let enricher = Enricher::new(
        Arc::new(MetadataCache::labels(lookup.clone(), 16)),
        Arc::new(MetadataCache::annotations(lookup, 16)),
    )
    .with_cluster_name("prod");
    let admission = AdmissionFilter::with_start_time(60, start, clock).with_metrics(metrics.clone());
    let watcher = EventWatcher::new(admission, enricher, metrics.clone());

    let sink = Arc::new(MemorySink::new());
    let mut registry = ChannelReceiverRegistry::new(QueueConfig::default(), metrics.clone());
    registry.register("dump", sink.clone()).unwrap();
    let route: Route = serde_json::from_value(json!({
        "routes": [{ "match": [{ "receiver": "dump" }] }]
    }))
    .unwrap();
    let mut engine = Engine::new(route, registry).await.unwrap();

    let raw = futures::stream::iter(vec![
        Ok(watcher::Event::Init),
        Ok(watcher::Event::InitApply(core("e1", "web-0", "BackOff", "2024-03-01T09:59:30Z"))),
        // Too old: discarded by admission.
        Ok(watcher::Event::InitApply(core("e2", "web-1", "Pulled", "2024-03-01T09:00:00Z"))),
        Ok(watcher::Event::InitDone),
        // Update of an already seen event: ignored.
        Ok(watcher::Event::Apply(core("e1", "web-0", "BackOff", "2024-03-01T09:59:40Z"))),
        Ok(watcher::Event::Apply(core("e3", "gone", "Killing", "2024-03-01T09:59:50Z"))),
        Err::<_, String>("connection reset".to_string()),
    ]);
    watcher.run(notifications(raw), &engine).await;
    engine.stop().await;

    let delivered = sink.events();
    let reasons: Vec<&str> = delivered.iter().map(|e| e.reason.as_str()).collect();
    assert_eq!(reasons, ["BackOff", "Killing"]);

    assert_eq!(delivered[0].cluster_name, "prod");
    assert_eq!(
        delivered[0].involved_object.labels.as_ref().and_then(|l| l.get("app")).map(String::as_str),
        Some("web-0")
    );
    assert_eq!(delivered[1].involved_object.labels, None);

    let snapshot = metrics.snapshot();
    assert_eq!(snapshot.events_sent, 2);
    assert_eq!(snapshot.watch_errors, 1);
}
