//! Kubernetes-backed record store

use crate::error::StoreError;
use crate::key::HostKey;
use crate::store_trait::HostStoreTrait;
use crds::BareMetalHost;
use kube::api::{Patch, PatchParams, PostParams};
use kube::{Api, Client};
use serde_json::{json, Value};
use tracing::debug;

/// Record store backed by the Kubernetes API server
///
/// Both write paths send the fetched `resourceVersion`, so a concurrent
/// write surfaces as HTTP 409.
#[derive(Clone)]
pub struct KubeHostStore {
    client: Client,
}

impl std::fmt::Debug for KubeHostStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KubeHostStore").finish_non_exhaustive()
    }
}

impl KubeHostStore {
    /// Create a store from a Kubernetes client
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn api(&self, namespace: &str) -> Api<BareMetalHost> {
        Api::namespaced(self.client.clone(), namespace)
    }
}

/// Merge patch for the status subresource.
///
/// Carries the fetched `resourceVersion`, so the API server rejects the patch
/// with 409 if the record changed since it was read.
fn status_patch(host: &BareMetalHost) -> Value {
    json!({
        "metadata": { "resourceVersion": host.metadata.resource_version },
        "status": host.status,
    })
}

#[async_trait::async_trait]
impl HostStoreTrait for KubeHostStore {
    async fn get(&self, key: &HostKey) -> Result<BareMetalHost, StoreError> {
        debug!(host = %key, "fetching BareMetalHost");
        self.api(&key.namespace)
            .get_opt(&key.name)
            .await
            .map_err(|e| StoreError::from_kube(&key.to_string(), e))?
            .ok_or_else(|| StoreError::NotFound(key.to_string()))
    }

    async fn update(&self, host: &BareMetalHost) -> Result<BareMetalHost, StoreError> {
        let key = HostKey::from_host(host)?;
        debug!(host = %key, "updating BareMetalHost");
        self.api(&key.namespace)
            .replace(&key.name, &PostParams::default(), host)
            .await
            .map_err(|e| StoreError::from_kube(&key.to_string(), e))
    }

    async fn update_status(&self, host: &BareMetalHost) -> Result<BareMetalHost, StoreError> {
        let key = HostKey::from_host(host)?;
        debug!(host = %key, "updating BareMetalHost status");
        let status_patch = status_patch(host);
        self.api(&key.namespace)
            .patch_status(&key.name, &PatchParams::default(), &Patch::Merge(&status_patch))
            .await
            .map_err(|e| StoreError::from_kube(&key.to_string(), e))
    }
}
