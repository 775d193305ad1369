//! Out-of-band cleanup run before a host's finalizer is removed.
//!
//! Deprovisioning (wiping disks, releasing the BMC) is performed by a
//! provisioning backend outside this controller. The reconciler only needs
//! to know whether it succeeded.

use crate::error::CleanupError;
use crds::BareMetalHost;
use tracing::info;

/// Cleanup hook invoked once per deletion, before the finalizer is removed.
///
/// Must be idempotent: a crash after cleanup but before the finalizer write
/// runs it again on the next invocation.
#[async_trait::async_trait]
pub trait HostCleanup: Send + Sync {
    /// Release external resources held for `host`.
    async fn deprovision(&self, host: &BareMetalHost) -> Result<(), CleanupError>;
}

/// Cleanup for deployments without a provisioning backend.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopCleanup;

#[async_trait::async_trait]
impl HostCleanup for NoopCleanup {
    async fn deprovision(&self, host: &BareMetalHost) -> Result<(), CleanupError> {
        info!(
            name = host.metadata.name.as_deref().unwrap_or("<unknown>"),
            "no provisioning backend configured, nothing to deprovision"
        );
        Ok(())
    }
}
