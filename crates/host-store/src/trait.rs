//! HostStoreTrait for mocking
//!
//! This trait abstracts the record store so the reconciler can be unit tested
//! against an in-memory store. The concrete `KubeHostStore` implements it
//! on top of the Kubernetes API.

use crate::error::StoreError;
use crate::key::HostKey;
use crds::BareMetalHost;

/// Record store operations used by the reconciler
///
/// `update` and `update_status` are deliberately separate: `update` persists
/// metadata and spec and ignores the status block, `update_status` persists
/// only the status subresource. All async methods must be `Send` to work
/// with Tokio's work-stealing runtime.
#[async_trait::async_trait]
pub trait HostStoreTrait: Send + Sync {
    /// Fetch the current record. Returns `StoreError::NotFound` when absent.
    async fn get(&self, key: &HostKey) -> Result<BareMetalHost, StoreError>;

    /// Persist metadata, spec, finalizers and labels.
    async fn update(&self, host: &BareMetalHost) -> Result<BareMetalHost, StoreError>;

    /// Persist the status subresource only.
    async fn update_status(&self, host: &BareMetalHost) -> Result<BareMetalHost, StoreError>;
}
