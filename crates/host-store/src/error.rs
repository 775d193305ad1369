//! Record store errors

use thiserror::Error;

/// Errors that can occur when reading or writing BareMetalHost records
#[derive(Debug, Error)]
pub enum StoreError {
    /// The record does not exist (already deleted)
    #[error("BareMetalHost not found: {0}")]
    NotFound(String),

    /// Optimistic-concurrency violation: the record changed since it was read
    #[error("Conflict writing BareMetalHost {0}: the object has been modified")]
    Conflict(String),

    /// The API server rejected the request
    #[error("Kubernetes API error ({code}): {message}")]
    Api {
        /// HTTP status code
        code: u16,
        /// Server-provided message
        message: String,
    },

    /// Transport or client error
    #[error("Kubernetes client error: {0}")]
    Kube(#[source] kube::Error),

    /// The record handed to the store cannot be addressed
    #[error("Invalid BareMetalHost object: {0}")]
    InvalidObject(String),
}

impl StoreError {
    /// Classifies a `kube::Error` for the record `what`.
    pub fn from_kube(what: &str, err: kube::Error) -> Self {
        match err {
            kube::Error::Api(ae) if ae.code == 404 => StoreError::NotFound(what.to_string()),
            kube::Error::Api(ae) if ae.code == 409 => StoreError::Conflict(what.to_string()),
            kube::Error::Api(ae) => StoreError::Api {
                code: ae.code,
                message: ae.message.clone(),
            },
            other => StoreError::Kube(other),
        }
    }

    /// Whether the caller should retry with backoff.
    ///
    /// `InvalidObject` is a programmer error; retrying will not help.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, StoreError::InvalidObject(_))
    }
}
