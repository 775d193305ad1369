//! BareMetalHost Record Store Client
//!
//! Fetch and persist `BareMetalHost` records through two distinct write
//! paths: a full update (metadata, spec, finalizers, labels) and a status
//! subresource update. Writes carry the fetched `resourceVersion`, so a write
//! racing with another writer fails with [`StoreError::Conflict`] instead of
//! overwriting.
//!
//! # Example
//!
//! ```no_run
//! use host_store::{HostKey, HostStoreTrait, KubeHostStore};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = kube::Client::try_default().await?;
//! let store = KubeHostStore::new(client);
//!
//! let key = HostKey::new("metal", "worker-0");
//! let mut host = store.get(&key).await?;
//! host.add_finalizer();
//! store.update(&host).await?;
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod error;
pub mod key;
#[path = "trait.rs"]
pub mod store_trait;
#[cfg(feature = "test-util")]
pub mod mock;

pub use client::KubeHostStore;
pub use error::StoreError;
pub use key::HostKey;
pub use store_trait::HostStoreTrait;
#[cfg(feature = "test-util")]
pub use mock::{MockHostStore, StoreOp};
