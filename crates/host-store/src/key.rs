//! Record identity

use crate::error::StoreError;
use crds::BareMetalHost;
use std::fmt;

/// Namespace-qualified name of a BareMetalHost
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HostKey {
    /// Namespace the record lives in
    pub namespace: String,
    /// Record name
    pub name: String,
}

impl HostKey {
    /// Create a key from namespace and name
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    /// Key of an existing record. Fails if name or namespace is unset.
    pub fn from_host(host: &BareMetalHost) -> Result<Self, StoreError> {
        let name = host
            .metadata
            .name
            .as_deref()
            .ok_or_else(|| StoreError::InvalidObject("BareMetalHost missing name".to_string()))?;
        let namespace = host.metadata.namespace.as_deref().ok_or_else(|| {
            StoreError::InvalidObject(format!("BareMetalHost {name} missing namespace"))
        })?;
        Ok(Self::new(namespace, name))
    }
}

impl fmt::Display for HostKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}
