//! BareMetalHost CRD Definitions
//!
//! Kubernetes Custom Resource Definition for bare-metal hosts managed by the
//! BareMetalHost controller, plus the "set if changed" helpers the
//! reconciler uses to mutate it one field at a time.

pub mod baremetal_host;

pub use baremetal_host::*;
