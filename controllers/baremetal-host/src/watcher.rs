//! Kubernetes resource watcher and dispatch loop.
//!
//! Drives the reconciler from `kube_runtime::Controller`, which serializes
//! invocations per host, runs different hosts concurrently, and redelivers
//! on the `Action` each invocation returns. Retry backoff for failed
//! invocations is tracked here, per host, not in the reconciler.

use crate::backoff::FibonacciBackoff;
use crate::config::ControllerConfig;
use crate::error::{ControllerError, ReconcileError};
use crate::reconciler::{ReconcileOutcome, Reconciler};
use crds::BareMetalHost;
use futures::StreamExt;
use host_store::HostKey;
use kube::Api;
use kube_runtime::controller::{Action, Config as RuntimeConfig, Error as ControllerRunError};
use kube_runtime::{watcher, Controller};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tracing::{debug, error, info, info_span, warn, Instrument};

/// Shared state handed to every invocation by the dispatch loop.
pub struct Context {
    reconciler: Reconciler,
    config: ControllerConfig,
    /// Consecutive-failure backoff per host
    backoffs: Mutex<HashMap<HostKey, FibonacciBackoff>>,
}

impl Context {
    /// Creates the dispatch context.
    pub fn new(reconciler: Reconciler, config: ControllerConfig) -> Self {
        Self {
            reconciler,
            config,
            backoffs: Mutex::new(HashMap::new()),
        }
    }

    fn next_backoff(&self, key: &HostKey) -> Duration {
        let mut backoffs = self.backoffs.lock().unwrap_or_else(PoisonError::into_inner);
        backoffs
            .entry(key.clone())
            .or_insert_with(|| {
                FibonacciBackoff::new(self.config.backoff_min, self.config.backoff_max)
            })
            .next_backoff()
    }

    /// Drops the failure history of a host that succeeded or no longer exists.
    fn reset_backoff(&self, key: &HostKey) {
        let mut backoffs = self.backoffs.lock().unwrap_or_else(PoisonError::into_inner);
        backoffs.remove(key);
    }
}

/// Maps a reconcile outcome to what the dispatch loop does next.
pub fn action_for(outcome: &ReconcileOutcome, resync_interval: Duration) -> Action {
    if outcome.needs_requeue() {
        return Action::requeue(Duration::ZERO);
    }
    match outcome {
        ReconcileOutcome::Steady | ReconcileOutcome::Initialized => {
            Action::requeue(resync_interval)
        }
        _ => Action::await_change(),
    }
}

/// One invocation: re-fetch by key and advance at most one step.
///
/// The object delivered by the watch is only used for its key.
async fn reconcile(host: Arc<BareMetalHost>, ctx: Arc<Context>) -> Result<Action, ReconcileError> {
    let key = HostKey::from_host(&host).map_err(ReconcileError::store("address BareMetalHost"))?;
    let span = info_span!("reconcile", namespace = %key.namespace, name = %key.name);

    let outcome = ctx
        .reconciler
        .reconcile_with_deadline(&key, ctx.config.reconcile_timeout)
        .instrument(span)
        .await?;

    ctx.reset_backoff(&key);
    debug!(host = %key, ?outcome, "reconcile finished");
    Ok(action_for(&outcome, ctx.config.resync_interval))
}

fn error_policy(host: Arc<BareMetalHost>, error: &ReconcileError, ctx: Arc<Context>) -> Action {
    let Ok(key) = HostKey::from_host(&host) else {
        error!(%error, "reconcile failed for unaddressable BareMetalHost");
        return Action::requeue(ctx.config.backoff_max);
    };
    if error.is_not_found() {
        // Deleted mid-invocation; the next event for this key starts fresh
        ctx.reset_backoff(&key);
        debug!(host = %key, %error, "host disappeared during reconcile");
        return Action::await_change();
    }
    let delay = ctx.next_backoff(&key);
    if error.is_retryable() {
        warn!(host = %key, %error, retry_in = ?delay, "reconcile failed, will retry");
    } else {
        error!(
            host = %key,
            %error,
            retry_in = ?delay,
            "reconcile failed with a non-retryable error"
        );
    }
    Action::requeue(delay)
}

/// Watches BareMetalHost resources and dispatches reconciliation.
pub struct Watcher {
    context: Arc<Context>,
    api: Api<BareMetalHost>,
}

impl Watcher {
    /// Creates a new watcher instance.
    pub fn new(context: Arc<Context>, api: Api<BareMetalHost>) -> Self {
        Self { context, api }
    }

    /// Runs the dispatch loop until the process receives a shutdown signal.
    pub async fn watch_baremetal_hosts(&self) -> Result<(), ControllerError> {
        info!("Starting BareMetalHost watcher");

        let runtime_config = RuntimeConfig::default().concurrency(self.context.config.concurrency);

        Controller::new(self.api.clone(), watcher::Config::default())
            .with_config(runtime_config)
            .shutdown_on_signal()
            .run(reconcile, error_policy, Arc::clone(&self.context))
            .for_each(|res| {
                match res {
                    Ok((obj, action)) => debug!(host = %obj, ?action, "reconciled"),
                    Err(ControllerRunError::ObjectNotFound(obj_ref)) => {
                        // A scheduled retry fired after the host was deleted
                        let key = HostKey::new(
                            obj_ref.namespace.clone().unwrap_or_default(),
                            obj_ref.name.clone(),
                        );
                        self.context.reset_backoff(&key);
                        debug!(host = %key, "host deleted, dropping retry state");
                    }
                    Err(e) => debug!(error = %e, "dispatch error"),
                }
                futures::future::ready(())
            })
            .await;

        info!("BareMetalHost watcher stopped");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reconciler::Mutation;
    use crate::test_utils::*;
    use crds::OperationalStatus;

    fn context() -> Context {
        let (reconciler, _, _) = create_test_reconciler();
        Context::new(
            reconciler,
            ControllerConfig {
                backoff_min: Duration::from_secs(2),
                backoff_max: Duration::from_secs(8),
                ..ControllerConfig::default()
            },
        )
    }

    #[test]
    fn test_requeue_is_immediate() {
        let action = action_for(
            &ReconcileOutcome::Requeue(Mutation::OperationalStatusSet(OperationalStatus::Online)),
            Duration::from_secs(600),
        );
        assert_eq!(action, Action::requeue(Duration::ZERO));
    }

    #[test]
    fn test_steady_waits_for_resync() {
        let resync = Duration::from_secs(600);
        assert_eq!(action_for(&ReconcileOutcome::Steady, resync), Action::requeue(resync));
        assert_eq!(action_for(&ReconcileOutcome::Initialized, resync), Action::requeue(resync));
    }

    #[test]
    fn test_terminal_outcomes_await_change() {
        for outcome in [
            ReconcileOutcome::NotFound,
            ReconcileOutcome::AlreadyFinalized,
            ReconcileOutcome::Finalized,
        ] {
            assert_eq!(action_for(&outcome, Duration::from_secs(600)), Action::await_change());
        }
    }

    #[test]
    fn test_backoff_is_tracked_per_host() {
        let ctx = context();
        let a = HostKey::new("metal", "a");
        let b = HostKey::new("metal", "b");

        assert_eq!(ctx.next_backoff(&a), Duration::from_secs(2));
        assert_eq!(ctx.next_backoff(&a), Duration::from_secs(2));
        assert_eq!(ctx.next_backoff(&a), Duration::from_secs(4));
        assert_eq!(ctx.next_backoff(&b), Duration::from_secs(2));
        assert_eq!(ctx.next_backoff(&a), Duration::from_secs(6));
        assert_eq!(ctx.next_backoff(&a), Duration::from_secs(8));

        ctx.reset_backoff(&a);
        assert_eq!(ctx.next_backoff(&a), Duration::from_secs(2));
    }

    #[tokio::test]
    async fn test_error_policy_backs_off_after_failures() {
        let (reconciler, store, _) = create_test_reconciler();
        let ctx = Arc::new(Context::new(
            reconciler,
            ControllerConfig {
                backoff_min: Duration::from_secs(2),
                backoff_max: Duration::from_secs(8),
                ..ControllerConfig::default()
            },
        ));
        let host = create_test_host("worker-0", "metal", true);
        store.insert(host.clone());
        let host = Arc::new(host);

        store.fail_next_get();
        let err = reconcile(Arc::clone(&host), Arc::clone(&ctx)).await.unwrap_err();
        assert_eq!(
            error_policy(Arc::clone(&host), &err, Arc::clone(&ctx)),
            Action::requeue(Duration::from_secs(2))
        );

        store.conflict_next_write();
        let err = reconcile(Arc::clone(&host), Arc::clone(&ctx)).await.unwrap_err();
        assert_eq!(
            error_policy(Arc::clone(&host), &err, Arc::clone(&ctx)),
            Action::requeue(Duration::from_secs(2))
        );

        store.fail_next_write();
        let err = reconcile(Arc::clone(&host), Arc::clone(&ctx)).await.unwrap_err();
        assert_eq!(
            error_policy(Arc::clone(&host), &err, Arc::clone(&ctx)),
            Action::requeue(Duration::from_secs(4))
        );

        // Success resets the sequence
        let action = reconcile(Arc::clone(&host), Arc::clone(&ctx)).await.unwrap();
        assert_eq!(action, Action::requeue(Duration::ZERO));
        store.fail_next_get();
        let err = reconcile(Arc::clone(&host), Arc::clone(&ctx)).await.unwrap_err();
        assert_eq!(error_policy(host, &err, ctx), Action::requeue(Duration::from_secs(2)));
    }

    #[test]
    fn test_vanished_host_drops_backoff_state() {
        let ctx = Arc::new(context());
        let host = Arc::new(create_test_host("worker-0", "metal", true));
        let key = HostKey::from_host(&host).unwrap();
        ctx.next_backoff(&key);
        ctx.next_backoff(&key);

        let err = ReconcileError::Store {
            action: "update BareMetalHost",
            source: host_store::StoreError::NotFound(key.to_string()),
        };
        assert!(err.is_not_found());
        assert_eq!(error_policy(host, &err, Arc::clone(&ctx)), Action::await_change());
        assert!(!ctx.backoffs.lock().unwrap().contains_key(&key));

        // A later failure for a recreated host with the same name starts over
        assert_eq!(ctx.next_backoff(&key), Duration::from_secs(2));
    }

    #[tokio::test]
    async fn test_missing_host_clears_backoff_state() {
        let (reconciler, store, _) = create_test_reconciler();
        let ctx = Arc::new(Context::new(reconciler, ControllerConfig::default()));
        let host = create_test_host("worker-0", "metal", true);
        let key = store.insert(host.clone());
        let host = Arc::new(host);

        store.fail_next_get();
        let err = reconcile(Arc::clone(&host), Arc::clone(&ctx)).await.unwrap_err();
        error_policy(Arc::clone(&host), &err, Arc::clone(&ctx));
        assert!(ctx.backoffs.lock().unwrap().contains_key(&key));

        store.request_deletion(&key);
        let action = reconcile(host, Arc::clone(&ctx)).await.unwrap();
        assert_eq!(action, Action::await_change());
        assert!(ctx.backoffs.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_reconcile_refetches_instead_of_trusting_event() {
        let (reconciler, store, _) = create_test_reconciler();
        let ctx = Arc::new(Context::new(reconciler, ControllerConfig::default()));
        let host = create_test_host("worker-0", "metal", true);
        let key = store.insert(host.clone());
        store.edit(&key, |h| {
            h.add_finalizer();
        });

        // The event still carries the stale copy without a finalizer
        reconcile(Arc::new(host), ctx).await.unwrap();

        assert_eq!(
            store.stored(&key).unwrap().operational_status(),
            OperationalStatus::Online
        );
    }
}
