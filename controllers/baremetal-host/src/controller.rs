//! Main controller implementation.
//!
//! This module contains the `Controller` struct that wires the record store,
//! reconciler and watcher together for the BareMetalHost Controller.

use crate::cleanup::NoopCleanup;
use crate::config::ControllerConfig;
use crate::error::ControllerError;
use crate::reconciler::Reconciler;
use crate::watcher::{Context, Watcher};
use crds::BareMetalHost;
use host_store::KubeHostStore;
use kube::{Api, Client};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::info;

/// Main controller for BareMetalHost management.
pub struct Controller {
    host_watcher: JoinHandle<Result<(), ControllerError>>,
}

impl Controller {
    /// Creates a new controller instance and starts watching.
    pub async fn new(config: ControllerConfig) -> Result<Self, ControllerError> {
        info!("Initializing BareMetalHost Controller");

        let kube_client = Client::try_default().await?;

        let api: Api<BareMetalHost> = match config.namespace.as_deref() {
            Some(ns) => Api::namespaced(kube_client.clone(), ns),
            None => Api::all(kube_client.clone()),
        };

        let reconciler = Reconciler::new(
            Arc::new(KubeHostStore::new(kube_client)),
            Arc::new(NoopCleanup),
        );
        let context = Arc::new(Context::new(reconciler, config));
        let watcher = Watcher::new(context, api);

        let host_watcher = tokio::spawn(async move { watcher.watch_baremetal_hosts().await });

        Ok(Self { host_watcher })
    }

    /// Runs the controller until shutdown.
    pub async fn run(self) -> Result<(), ControllerError> {
        info!("BareMetalHost Controller running");

        self.host_watcher
            .await
            .map_err(|e| ControllerError::Watch(format!("BareMetalHost watcher panicked: {e}")))?
    }
}
