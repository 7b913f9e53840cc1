//! Builds [`EnhancedEvent`]s from raw events.

use crate::cache::{MetadataCache, MetadataKind};
use crate::error::LookupError;
use crate::event::{EnhancedEvent, Event, Metadata, ObjectReference};
use std::sync::Arc;
use tracing::{debug, error};

/// Object kinds whose lookups fail routinely; their errors are logged at debug.
const TRANSIENT_KINDS: [&str; 1] = ["CustomResourceDefinition"];

/// Attaches involved-object labels, annotations and the cluster name.
#[derive(Debug, Clone)]
pub struct Enricher {
    labels: Arc<MetadataCache>,
    annotations: Arc<MetadataCache>,
    cluster_name: Option<String>,
}

impl Enricher {
    pub fn new(labels: Arc<MetadataCache>, annotations: Arc<MetadataCache>) -> Self {
        Self { labels, annotations, cluster_name: None }
    }

    /// Stamp every event with `name`; empty names are ignored.
    pub fn with_cluster_name(mut self, name: impl Into<String>) -> Self {
        let name = name.into();
        self.cluster_name = (!name.is_empty()).then_some(name);
        self
    }

    pub fn cluster_name(&self) -> Option<&str> {
        self.cluster_name.as_deref()
    }

    /// Enrich `event`. Lookup failures are logged and leave the affected
    /// metadata unset; the event itself is never dropped here.
    pub async fn enrich(&self, event: Event) -> EnhancedEvent {
        let reference = event.involved_object.clone();
        let mut enhanced = EnhancedEvent::from(event);

        enhanced.involved_object.labels = self.fetch(&self.labels, &reference).await;
        enhanced.involved_object.annotations = self.fetch(&self.annotations, &reference).await;
        if let Some(name) = &self.cluster_name {
            enhanced.cluster_name = name.clone();
        }
        enhanced
    }

    async fn fetch(&self, cache: &MetadataCache, reference: &ObjectReference) -> Option<Metadata> {
        match cache.lookup(reference).await {
            Ok(metadata) => metadata,
            Err(err) => {
                log_lookup_failure(cache.kind(), reference, &err);
                None
            }
        }
    }
}

fn log_lookup_failure(kind: MetadataKind, reference: &ObjectReference, err: &LookupError) {
    let what = match kind {
        MetadataKind::Labels => "labels",
        MetadataKind::Annotations => "annotations",
    };
    if TRANSIENT_KINDS.contains(&reference.kind.as_str()) {
        debug!(
            error = %err,
            kind = %reference.kind,
            name = %reference.name,
            "Cannot list {what} of the object (CRD)"
        );
    } else {
        error!(
            error = %err,
            kind = %reference.kind,
            namespace = %reference.namespace,
            name = %reference.name,
            "Cannot list {what} of the object"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{ObjectLookup, ObjectMetadata};
    use async_trait::async_trait;

    struct StaticLookup(Result<ObjectMetadata, LookupError>);

    #[async_trait]
    impl ObjectLookup for StaticLookup {
        async fn fetch(&self, _reference: &ObjectReference) -> Result<ObjectMetadata, LookupError> {
            self.0.clone()
        }
    }

    fn enricher(result: Result<ObjectMetadata, LookupError>) -> Enricher {
        let lookup: Arc<dyn ObjectLookup> = Arc::new(StaticLookup(result));
        Enricher::new(
            Arc::new(MetadataCache::labels(lookup.clone(), 16)),
            Arc::new(MetadataCache::annotations(lookup, 16)),
        )
    }

    fn event() -> Event {
        Event {
            involved_object: ObjectReference {
                kind: "Pod".into(),
                namespace: "default".into(),
                name: "web-0".into(),
                uid: "u-1".into(),
                ..Default::default()
            },
            reason: "BackOff".into(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn attaches_metadata_and_cluster_name() {
        let metadata = ObjectMetadata {
            labels: [("app".to_string(), "web".to_string())].into_iter().collect(),
            annotations: [("owner".to_string(), "team-a".to_string())].into_iter().collect(),
        };
        let e = enricher(Ok(metadata)).with_cluster_name("prod-eu");
        let out = e.enrich(event()).await;

        assert_eq!(out.reason, "BackOff");
        assert_eq!(out.cluster_name, "prod-eu");
        assert_eq!(out.involved_object.labels.unwrap()["app"], "web");
        assert_eq!(out.involved_object.annotations.unwrap()["owner"], "team-a");
        assert_eq!(out.involved_object.reference.name, "web-0");
    }

    #[tokio::test]
    async fn failed_lookup_keeps_event_without_metadata() {
        let out = enricher(Err(LookupError::failed("timeout"))).enrich(event()).await;
        assert_eq!(out.reason, "BackOff");
        assert!(out.involved_object.labels.is_none());
        assert!(out.involved_object.annotations.is_none());
        assert!(out.cluster_name.is_empty());
    }

    #[tokio::test]
    async fn vanished_object_has_no_metadata() {
        let out = enricher(Err(LookupError::NotFound)).enrich(event()).await;
        assert!(out.involved_object.labels.is_none());
    }

    #[test]
    fn empty_cluster_name_is_ignored() {
        let e = enricher(Err(LookupError::NotFound)).with_cluster_name("");
        assert_eq!(e.cluster_name(), None);
    }
}
