//! BareMetalHost Controller
//!
//! Drives `BareMetalHost` records toward their declared state: attaches a
//! finalizer, derives operational status and error message from the BMC
//! credentials and power intent, labels the hardware profile, and releases
//! the finalizer once cleanup finishes on deletion.

mod backoff;
mod cleanup;
mod config;
mod controller;
mod error;
mod reconciler;
mod test_utils;
mod watcher;

use crate::config::ControllerConfig;
use crate::error::ControllerError;
use controller::Controller;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), ControllerError> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,kube=warn")),
        )
        .init();

    if rustls::crypto::ring::default_provider().install_default().is_err() {
        debug!("rustls crypto provider already installed");
    }

    info!("Starting BareMetalHost Controller");

    let config = ControllerConfig::from_env()?;

    info!("Configuration:");
    info!("  Namespace: {}", config.namespace.as_deref().unwrap_or("all namespaces"));
    info!("  Concurrency: {}", config.concurrency);
    info!("  Reconcile timeout: {:?}", config.reconcile_timeout);
    info!("  Resync interval: {:?}", config.resync_interval);
    info!("  Retry backoff: {:?}..{:?}", config.backoff_min, config.backoff_max);

    let controller = Controller::new(config).await?;
    controller.run().await?;

    Ok(())
}
