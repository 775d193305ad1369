//! Mock record store for unit testing
//!
//! Keeps records in memory and mimics the parts of API server behaviour the
//! reconciler depends on:
//! - `resourceVersion` optimistic concurrency (stale writes get `Conflict`)
//! - status subresource discipline (`update` ignores status, `update_status`
//!   ignores everything else)
//! - finalizer-gated deletion (a deleting record disappears once its last
//!   finalizer is removed)
//!
//! Every call is recorded so tests can assert how many writes happened and
//! which path they took.

use crate::error::StoreError;
use crate::key::HostKey;
use crate::store_trait::HostStoreTrait;
use crds::BareMetalHost;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// A recorded store call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreOp {
    /// `get`
    Get(HostKey),
    /// `update` (full record)
    Update(HostKey),
    /// `update_status` (status subresource)
    UpdateStatus(HostKey),
}

impl StoreOp {
    /// Whether this call was a write.
    pub fn is_write(&self) -> bool {
        !matches!(self, StoreOp::Get(_))
    }
}

/// Failure to inject into the next matching call
#[derive(Debug, Clone, Copy)]
enum Injected {
    Conflict,
    Unavailable,
}

impl Injected {
    fn into_error(self, key: &HostKey) -> StoreError {
        match self {
            Injected::Conflict => StoreError::Conflict(key.to_string()),
            Injected::Unavailable => StoreError::Api {
                code: 503,
                message: "service unavailable".to_string(),
            },
        }
    }
}

/// In-memory `HostStoreTrait` implementation
#[derive(Clone, Default)]
pub struct MockHostStore {
    hosts: Arc<Mutex<HashMap<HostKey, BareMetalHost>>>,
    ops: Arc<Mutex<Vec<StoreOp>>>,
    next_resource_version: Arc<Mutex<u64>>,
    fail_next_get: Arc<Mutex<Option<Injected>>>,
    fail_next_write: Arc<Mutex<Option<Injected>>>,
}

impl std::fmt::Debug for MockHostStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockHostStore")
            .field("hosts", &self.hosts.lock().unwrap().len())
            .finish_non_exhaustive()
    }
}

impl MockHostStore {
    /// Create an empty mock store
    pub fn new() -> Self {
        Self::default()
    }

    fn bump_resource_version(&self) -> String {
        let mut rv = self.next_resource_version.lock().unwrap();
        *rv += 1;
        rv.to_string()
    }

    /// Add a record to the store (for test setup). Assigns a resourceVersion.
    pub fn insert(&self, mut host: BareMetalHost) -> HostKey {
        let key = HostKey::from_host(&host).unwrap();
        host.metadata.resource_version = Some(self.bump_resource_version());
        self.hosts.lock().unwrap().insert(key.clone(), host);
        key
    }

    /// Current stored copy of a record
    pub fn stored(&self, key: &HostKey) -> Option<BareMetalHost> {
        self.hosts.lock().unwrap().get(key).cloned()
    }

    /// Simulate an external edit (bumps resourceVersion).
    pub fn edit(&self, key: &HostKey, f: impl FnOnce(&mut BareMetalHost)) {
        let rv = self.bump_resource_version();
        let mut hosts = self.hosts.lock().unwrap();
        let host = hosts.get_mut(key).unwrap();
        f(host);
        host.metadata.resource_version = Some(rv);
    }

    /// Simulate `kubectl delete`: records without finalizers vanish,
    /// the rest get a deletion timestamp.
    pub fn request_deletion(&self, key: &HostKey) {
        let rv = self.bump_resource_version();
        let mut hosts = self.hosts.lock().unwrap();
        let Some(host) = hosts.get_mut(key) else { return };
        if host.metadata.finalizers.as_ref().is_none_or(Vec::is_empty) {
            hosts.remove(key);
            return;
        }
        if host.metadata.deletion_timestamp.is_none() {
            let ts: Time = serde_json::from_value(serde_json::json!("2026-01-01T00:00:00Z"))
                .expect("valid RFC 3339 timestamp");
            host.metadata.deletion_timestamp = Some(ts);
        }
        host.metadata.resource_version = Some(rv);
    }

    /// Make the next `get` fail with a transient API error.
    pub fn fail_next_get(&self) {
        *self.fail_next_get.lock().unwrap() = Some(Injected::Unavailable);
    }

    /// Make the next write fail with a transient API error.
    pub fn fail_next_write(&self) {
        *self.fail_next_write.lock().unwrap() = Some(Injected::Unavailable);
    }

    /// Make the next write fail with a conflict.
    pub fn conflict_next_write(&self) {
        *self.fail_next_write.lock().unwrap() = Some(Injected::Conflict);
    }

    /// All recorded calls, oldest first
    pub fn ops(&self) -> Vec<StoreOp> {
        self.ops.lock().unwrap().clone()
    }

    /// Number of write calls (successful or not)
    pub fn write_count(&self) -> usize {
        self.ops.lock().unwrap().iter().filter(|op| op.is_write()).count()
    }

    /// Forget recorded calls
    pub fn clear_ops(&self) {
        self.ops.lock().unwrap().clear();
    }

    fn check_version(
        stored: &BareMetalHost,
        incoming: &BareMetalHost,
        key: &HostKey,
    ) -> Result<(), StoreError> {
        match incoming.metadata.resource_version.as_deref() {
            Some(rv) if Some(rv) != stored.metadata.resource_version.as_deref() => {
                Err(StoreError::Conflict(key.to_string()))
            }
            _ => Ok(()),
        }
    }
}

#[async_trait::async_trait]
impl HostStoreTrait for MockHostStore {
    async fn get(&self, key: &HostKey) -> Result<BareMetalHost, StoreError> {
        self.ops.lock().unwrap().push(StoreOp::Get(key.clone()));
        if let Some(failure) = self.fail_next_get.lock().unwrap().take() {
            return Err(failure.into_error(key));
        }
        self.stored(key).ok_or_else(|| StoreError::NotFound(key.to_string()))
    }

    async fn update(&self, host: &BareMetalHost) -> Result<BareMetalHost, StoreError> {
        let key = HostKey::from_host(host)?;
        self.ops.lock().unwrap().push(StoreOp::Update(key.clone()));
        if let Some(failure) = self.fail_next_write.lock().unwrap().take() {
            return Err(failure.into_error(&key));
        }
        let rv = self.bump_resource_version();
        let mut hosts = self.hosts.lock().unwrap();
        let stored = hosts.get(&key).ok_or_else(|| StoreError::NotFound(key.to_string()))?;
        Self::check_version(stored, host, &key)?;

        let mut next = host.clone();
        next.status = stored.status.clone();
        // deletionTimestamp cannot be set or cleared through an update
        next.metadata.deletion_timestamp = stored.metadata.deletion_timestamp.clone();
        next.metadata.resource_version = Some(rv);

        if next.metadata.deletion_timestamp.is_some()
            && next.metadata.finalizers.as_ref().is_none_or(Vec::is_empty)
        {
            hosts.remove(&key);
        } else {
            hosts.insert(key, next.clone());
        }
        Ok(next)
    }

    async fn update_status(&self, host: &BareMetalHost) -> Result<BareMetalHost, StoreError> {
        let key = HostKey::from_host(host)?;
        self.ops.lock().unwrap().push(StoreOp::UpdateStatus(key.clone()));
        if let Some(failure) = self.fail_next_write.lock().unwrap().take() {
            return Err(failure.into_error(&key));
        }
        let rv = self.bump_resource_version();
        let mut hosts = self.hosts.lock().unwrap();
        let stored = hosts.get_mut(&key).ok_or_else(|| StoreError::NotFound(key.to_string()))?;
        Self::check_version(stored, host, &key)?;

        stored.status = host.status.clone();
        stored.metadata.resource_version = Some(rv);
        Ok(stored.clone())
    }
}
