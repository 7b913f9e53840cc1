//! Object metadata lookup against the API server.

use async_trait::async_trait;
use eventrelay::{LookupError, ObjectLookup, ObjectMetadata, ObjectReference, TokenBucket};
use kube::api::{Api, DynamicObject};
use kube::discovery::{pinned_kind, ApiCapabilities, ApiResource, Scope};
use kube::core::GroupVersionKind;
use kube::Client;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tracing::debug;

type Resolved = (ApiResource, ApiCapabilities);

/// Fetches involved objects by group/version/kind.
///
/// Kind discovery is cached for the life of the process. Every API call takes
/// a token from the shared bucket configured by `kubeQPS` / `kubeBurst`.
pub struct KubeObjectLookup {
    client: Client,
    limiter: Arc<TokenBucket>,
    discovered: Mutex<HashMap<(String, String), Resolved>>,
}

impl std::fmt::Debug for KubeObjectLookup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KubeObjectLookup").field("limiter", &self.limiter).finish_non_exhaustive()
    }
}

impl KubeObjectLookup {
    pub fn new(client: Client, limiter: Arc<TokenBucket>) -> Self {
        Self { client, limiter, discovered: Mutex::new(HashMap::new()) }
    }

    /// Build with a fresh bucket of `qps` requests per second and `burst` capacity.
    pub fn with_limits(client: Client, qps: f64, burst: u32) -> Self {
        Self::new(client, Arc::new(TokenBucket::new(qps, burst.max(1))))
    }

    async fn resolve(&self, api_version: &str, kind: &str) -> Result<Resolved, kube::Error> {
        let key = (api_version.to_string(), kind.to_string());
        let cached = self.discovered.lock().unwrap_or_else(|e| e.into_inner()).get(&key).cloned();
        if let Some(found) = cached {
            return Ok(found);
        }

        let (group, version) = split_api_version(api_version);
        self.limiter.acquire(1).await;
        let resolved = pinned_kind(&self.client, &GroupVersionKind::gvk(group, version, kind)).await?;
        debug!(api_version, kind, plural = %resolved.0.plural, "discovered kind");
        self.discovered
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(key, resolved.clone());
        Ok(resolved)
    }
}

#[async_trait]
impl ObjectLookup for KubeObjectLookup {
    async fn fetch(&self, reference: &ObjectReference) -> Result<ObjectMetadata, LookupError> {
        let (resource, caps) = self
            .resolve(&reference.api_version, &reference.kind)
            .await
            .map_err(LookupError::failed)?;

        let api: Api<DynamicObject> = match caps.scope {
            Scope::Namespaced if !reference.namespace.is_empty() => {
                Api::namespaced_with(self.client.clone(), &reference.namespace, &resource)
            }
            _ => Api::all_with(self.client.clone(), &resource),
        };

        self.limiter.acquire(1).await;
        let object = api.get(&reference.name).await.map_err(classify)?;
        Ok(ObjectMetadata {
            labels: object.metadata.labels.unwrap_or_default(),
            annotations: object.metadata.annotations.unwrap_or_default(),
        })
    }
}

fn classify(err: kube::Error) -> LookupError {
    match err {
        kube::Error::Api(ref response) if response.code == 404 => LookupError::NotFound,
        other => LookupError::failed(other),
    }
}

/// Split `apps/v1` into (`apps`, `v1`); the core group is empty.
pub fn split_api_version(api_version: &str) -> (&str, &str) {
    match api_version.split_once('/') {
        Some((group, version)) => (group, version),
        None => ("", api_version),
    }
}
