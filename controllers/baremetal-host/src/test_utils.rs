//! Test utilities for unit testing the reconciler
//!
//! This module provides helpers for creating test hosts and wiring a
//! reconciler to the in-memory store.

#[cfg(test)]
use crate::cleanup::HostCleanup;
#[cfg(test)]
use crate::error::CleanupError;
#[cfg(test)]
use crate::reconciler::{ReconcileOutcome, Reconciler};
#[cfg(test)]
use crds::{BareMetalHost, BareMetalHostSpec, BmcDetails};
#[cfg(test)]
use host_store::{HostKey, MockHostStore};
#[cfg(test)]
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
#[cfg(test)]
use std::sync::Arc;

/// Helper to create a test BareMetalHost with full BMC credentials
#[cfg(test)]
pub fn create_test_host(name: &str, namespace: &str, online: bool) -> BareMetalHost {
    let mut host = BareMetalHost::new(
        name,
        BareMetalHostSpec {
            bmc: BmcDetails {
                ip: "192.168.100.10".to_string(),
                username: "admin".to_string(),
                password: "password".to_string(),
            },
            online,
        },
    );
    host.metadata.namespace = Some(namespace.to_string());
    host
}

/// Cleanup hook that counts calls and can be told to fail
#[cfg(test)]
#[derive(Debug, Default)]
pub struct RecordingCleanup {
    pub calls: AtomicUsize,
    pub fail: AtomicBool,
}

#[cfg(test)]
#[async_trait::async_trait]
impl HostCleanup for RecordingCleanup {
    async fn deprovision(&self, host: &BareMetalHost) -> Result<(), CleanupError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail.load(Ordering::SeqCst) {
            return Err(CleanupError {
                host: host.metadata.name.clone().unwrap_or_default(),
                reason: "BMC unreachable".to_string(),
            });
        }
        Ok(())
    }
}

/// Reconciler wired to a fresh mock store and recording cleanup
#[cfg(test)]
pub fn create_test_reconciler() -> (Reconciler, MockHostStore, Arc<RecordingCleanup>) {
    let store = MockHostStore::new();
    let cleanup = Arc::new(RecordingCleanup::default());
    let reconciler = Reconciler::new(Arc::new(store.clone()), cleanup.clone());
    (reconciler, store, cleanup)
}

/// Invoke until the outcome no longer asks for a requeue, the way the
/// dispatch loop would. Returns every outcome in order.
#[cfg(test)]
pub async fn reconcile_until_settled(
    reconciler: &Reconciler,
    key: &HostKey,
) -> Vec<ReconcileOutcome> {
    let mut outcomes = Vec::new();
    for _ in 0..20 {
        let outcome = reconciler.reconcile(key).await.unwrap();
        let again = outcome.needs_requeue();
        outcomes.push(outcome);
        if !again {
            return outcomes;
        }
    }
    panic!("host {key} did not settle: {outcomes:?}");
}
