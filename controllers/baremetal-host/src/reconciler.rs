//! Reconciliation logic for BareMetalHost CRDs.
//!
//! Each call to [`Reconciler::reconcile`] re-fetches the host, picks the
//! first step that still has work to do, persists at most one change and
//! returns. The dispatch loop calls again on `Requeue`, so a host converges
//! one observable write at a time and a crash between two writes leaves a
//! state the next call simply continues from.
//!
//! Step order:
//! 1. fetch (absent → `NotFound`)
//! 2. attach finalizer
//! 3. deletion: cleanup, then drop finalizer
//! 4. missing BMC credentials → error message, then `Error` status
//! 5. credentials present → clear error message, then `Online`/`Offline`
//! 6. hardware profile label
//! 7. stamp `lastUpdated` if no status write ever happened
//! 8. steady
//!
//! Write paths: finalizers and labels go through `update`; every status
//! field goes through `update_status`, which also refreshes `lastUpdated`.

use crate::cleanup::HostCleanup;
use crate::error::ReconcileError;
use chrono::Utc;
use crds::{
    BareMetalHost, OperationalStatus, HARDWARE_PROFILE_LABEL, MISSING_BMC_CREDENTIALS_MSG,
};
use host_store::{HostKey, HostStoreTrait, StoreError};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info};

/// Hardware profile recorded until inspection data is available.
pub const UNKNOWN_HARDWARE_PROFILE: &str = "unknown";

/// The single change persisted by a `Requeue` step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mutation {
    /// Finalizer token appended
    FinalizerAdded,
    /// Missing-credentials error message recorded
    ErrorMessageSet,
    /// Error message cleared after credentials appeared
    ErrorMessageCleared,
    /// Operational status changed
    OperationalStatusSet(OperationalStatus),
    /// Hardware profile label set
    HardwareProfileSet(String),
}

/// Result of one successful reconcile invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// The host no longer exists
    NotFound,
    /// Deletion was requested and our finalizer is already gone
    AlreadyFinalized,
    /// Cleanup ran and the finalizer was removed; deletion proceeds externally
    Finalized,
    /// One change was persisted; more work may remain
    Requeue(Mutation),
    /// First full pass completed: `lastUpdated` stamped
    Initialized,
    /// Nothing to do
    Steady,
}

impl ReconcileOutcome {
    /// Whether the dispatch loop should invoke again without waiting.
    pub fn needs_requeue(&self) -> bool {
        matches!(self, ReconcileOutcome::Requeue(_))
    }
}

/// Reconciles BareMetalHost resources.
///
/// Holds no per-host state: everything it decides is derived from the
/// record fetched at the start of the call.
#[derive(Clone)]
pub struct Reconciler {
    store: Arc<dyn HostStoreTrait>,
    cleanup: Arc<dyn HostCleanup>,
}

impl std::fmt::Debug for Reconciler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reconciler").finish_non_exhaustive()
    }
}

impl Reconciler {
    /// Creates a new reconciler instance.
    pub fn new(store: Arc<dyn HostStoreTrait>, cleanup: Arc<dyn HostCleanup>) -> Self {
        Self { store, cleanup }
    }

    /// Runs [`Self::reconcile`] under a deadline.
    ///
    /// On expiry the in-flight store call is dropped and the invocation
    /// reports [`ReconcileError::Timeout`] so it is retried.
    pub async fn reconcile_with_deadline(
        &self,
        key: &HostKey,
        deadline: Duration,
    ) -> Result<ReconcileOutcome, ReconcileError> {
        tokio::time::timeout(deadline, self.reconcile(key))
            .await
            .map_err(|_| ReconcileError::Timeout(deadline))?
    }

    /// Advances the host identified by `key` by at most one step.
    pub async fn reconcile(&self, key: &HostKey) -> Result<ReconcileOutcome, ReconcileError> {
        info!("Reconciling BareMetalHost");

        let mut host = match self.store.get(key).await {
            Ok(host) => host,
            Err(StoreError::NotFound(_)) => {
                debug!("BareMetalHost not found, nothing to do");
                return Ok(ReconcileOutcome::NotFound);
            }
            Err(e) => {
                error!(error = %e, "failed to fetch BareMetalHost");
                return Err(ReconcileError::store("fetch BareMetalHost")(e));
            }
        };

        if !host.is_deleting() && !host.has_finalizer() {
            info!(
                existing_finalizers = ?host.metadata.finalizers,
                new_value = crds::BAREMETAL_HOST_FINALIZER,
                "adding finalizer"
            );
            host.add_finalizer();
            self.update(&host, "add finalizer").await?;
            return Ok(ReconcileOutcome::Requeue(Mutation::FinalizerAdded));
        }

        if host.is_deleting() {
            return self.finalize(host).await;
        }

        if let Some(mutation) = self.reconcile_credentials(&mut host).await? {
            return Ok(ReconcileOutcome::Requeue(mutation));
        }

        let profile = hardware_profile(&host);
        if host.set_label(HARDWARE_PROFILE_LABEL, profile) {
            info!(profile, "setting hardware profile");
            self.update(&host, "update hardware profile").await?;
            return Ok(ReconcileOutcome::Requeue(Mutation::HardwareProfileSet(profile.to_string())));
        }

        if host.last_updated().is_none() {
            info!("initializing status");
            self.save_status(&mut host, "initialize status block").await?;
            return Ok(ReconcileOutcome::Initialized);
        }

        info!("Done with reconcile");
        Ok(ReconcileOutcome::Steady)
    }

    /// Deletion path. Touches nothing but the finalizer list.
    async fn finalize(&self, mut host: BareMetalHost) -> Result<ReconcileOutcome, ReconcileError> {
        info!(timestamp = ?host.metadata.deletion_timestamp, "marked to be deleted");

        if !host.has_finalizer() {
            info!("BareMetalHost is ready to be deleted");
            return Ok(ReconcileOutcome::AlreadyFinalized);
        }

        if let Err(e) = self.cleanup.deprovision(&host).await {
            error!(error = %e, "failed to deprovision host");
            return Err(e.into());
        }

        info!("cleanup is complete, removing finalizer");
        host.remove_finalizer();
        self.update(&host, "remove finalizer").await?;
        Ok(ReconcileOutcome::Finalized)
    }

    /// Steps 4 and 5: derive error message and operational status from the
    /// BMC credentials and power intent. Persists at most one change.
    async fn reconcile_credentials(
        &self,
        host: &mut BareMetalHost,
    ) -> Result<Option<Mutation>, ReconcileError> {
        if !host.has_bmc_credentials() {
            if host.set_error_message(MISSING_BMC_CREDENTIALS_MSG) {
                info!(message = MISSING_BMC_CREDENTIALS_MSG, "adding error message");
                self.save_status(host, "update error message").await?;
                return Ok(Some(Mutation::ErrorMessageSet));
            }
            return self
                .reconcile_operational_status(host, OperationalStatus::Error)
                .await;
        }

        if host.set_error_message("") {
            info!("clearing error message");
            self.save_status(host, "clear error message").await?;
            return Ok(Some(Mutation::ErrorMessageCleared));
        }

        // TODO: confirm the power state over the BMC before reporting Online
        let target = if host.spec.online {
            OperationalStatus::Online
        } else {
            OperationalStatus::Offline
        };
        self.reconcile_operational_status(host, target).await
    }

    async fn reconcile_operational_status(
        &self,
        host: &mut BareMetalHost,
        target: OperationalStatus,
    ) -> Result<Option<Mutation>, ReconcileError> {
        if !host.set_operational_status(target) {
            return Ok(None);
        }
        info!(new_status = %target, "setting operational status");
        self.save_status(host, "update operational status").await?;
        Ok(Some(Mutation::OperationalStatusSet(target)))
    }

    /// Full-record write: metadata, spec, finalizers, labels.
    async fn update(
        &self,
        host: &BareMetalHost,
        action: &'static str,
    ) -> Result<(), ReconcileError> {
        self.store.update(host).await.map(drop).map_err(|e| {
            error!(error = %e, "failed to {action}");
            ReconcileError::store(action)(e)
        })
    }

    /// Status subresource write. Always refreshes `lastUpdated`.
    async fn save_status(
        &self,
        host: &mut BareMetalHost,
        action: &'static str,
    ) -> Result<(), ReconcileError> {
        host.touch_status(Utc::now());
        self.store.update_status(host).await.map(drop).map_err(|e| {
            error!(error = %e, "failed to {action}");
            ReconcileError::store(action)(e)
        })
    }
}

/// Hardware profile classification for `host`.
///
/// Always [`UNKNOWN_HARDWARE_PROFILE`] until hardware inspection feeds
/// inventory data into the record.
pub fn hardware_profile(_host: &BareMetalHost) -> &'static str {
    UNKNOWN_HARDWARE_PROFILE
}
