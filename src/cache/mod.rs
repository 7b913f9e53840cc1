//! Involved-object metadata caches.
//!
//! Two [`MetadataCache`] instances run side by side, one for labels and one
//! for annotations. Both sit in front of an [`ObjectLookup`] and remember
//! "not found" outcomes, so a burst of events about a deleted object costs a
//! single fetch.

mod arc;

pub use arc::ArcCache;

use crate::error::LookupError;
use crate::event::{Metadata, ObjectReference};
use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use tracing::trace;

/// Default capacity of each metadata cache.
pub const DEFAULT_CACHE_SIZE: usize = 1024;

/// Annotation key fragments owned by the control plane.
const RESERVED_ANNOTATION_PREFIXES: [&str; 2] = ["kubernetes.io/", "k8s.io/"];

/// Labels and annotations of a fetched object.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ObjectMetadata {
    pub labels: Metadata,
    pub annotations: Metadata,
}

/// Fetches the current metadata of an object from the control plane.
#[async_trait]
pub trait ObjectLookup: Send + Sync {
    /// Return the object's metadata, [`LookupError::NotFound`] when the object
    /// no longer exists, or [`LookupError::Failed`] for anything else.
    async fn fetch(&self, reference: &ObjectReference) -> Result<ObjectMetadata, LookupError>;
}

/// Which slice of the object's metadata a cache keeps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetadataKind {
    Labels,
    Annotations,
}

impl MetadataKind {
    fn select(self, metadata: ObjectMetadata) -> Metadata {
        match self {
            MetadataKind::Labels => metadata.labels,
            MetadataKind::Annotations => metadata
                .annotations
                .into_iter()
                .filter(|(key, _)| !is_reserved_annotation(key))
                .collect(),
        }
    }
}

fn is_reserved_annotation(key: &str) -> bool {
    RESERVED_ANNOTATION_PREFIXES.iter().any(|prefix| key.contains(prefix))
}

#[derive(Debug, Clone)]
enum Entry {
    Found(Metadata),
    NotFound,
}

/// ARC-backed cache of one metadata kind, keyed by object identity.
///
/// A single lock guards the replacement structure. It is never held across
/// the fetch, so a slow control plane does not block unrelated hits.
pub struct MetadataCache {
    kind: MetadataKind,
    lookup: Arc<dyn ObjectLookup>,
    entries: Mutex<ArcCache<String, Entry>>,
}

impl std::fmt::Debug for MetadataCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetadataCache")
            .field("kind", &self.kind)
            .field("len", &self.len())
            .finish()
    }
}

impl MetadataCache {
    pub fn new(kind: MetadataKind, lookup: Arc<dyn ObjectLookup>, capacity: usize) -> Self {
        Self { kind, lookup, entries: Mutex::new(ArcCache::new(capacity)) }
    }

    /// Label cache with the given capacity.
    pub fn labels(lookup: Arc<dyn ObjectLookup>, capacity: usize) -> Self {
        Self::new(MetadataKind::Labels, lookup, capacity)
    }

    /// Annotation cache with the given capacity; reserved platform keys are
    /// stripped before storage.
    pub fn annotations(lookup: Arc<dyn ObjectLookup>, capacity: usize) -> Self {
        Self::new(MetadataKind::Annotations, lookup, capacity)
    }

    pub fn kind(&self) -> MetadataKind {
        self.kind
    }

    /// Number of cached entries, negative ones included.
    pub fn len(&self) -> usize {
        self.entries.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Metadata for the referenced object.
    ///
    /// `Ok(None)` means the object is gone; that outcome is cached like a
    /// hit. Other failures are returned without touching the cache.
    pub async fn lookup(&self, reference: &ObjectReference) -> Result<Option<Metadata>, LookupError> {
        let key = reference.identity();
        if let Some(entry) = self.cached(&key) {
            return Ok(match entry {
                Entry::Found(metadata) => Some(metadata),
                Entry::NotFound => None,
            });
        }

        trace!(kind = ?self.kind, object = %key, "metadata cache miss");
        match self.lookup.fetch(reference).await {
            Ok(metadata) => {
                let selected = self.kind.select(metadata);
                self.store(key, Entry::Found(selected.clone()));
                Ok(Some(selected))
            }
            Err(LookupError::NotFound) => {
                self.store(key, Entry::NotFound);
                Ok(None)
            }
            Err(err) => Err(err),
        }
    }

    fn cached(&self, key: &String) -> Option<Entry> {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.get(key).cloned()
    }

    fn store(&self, key: String, entry: Entry) {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.put(key, entry);
    }
}
