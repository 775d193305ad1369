//! BareMetalHost Custom Resource Definition
//!
//! Declares the desired state of one physical machine (its BMC connection
//! details and power intent) and the status the controller derives from it.

use chrono::{DateTime, Utc};
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Finalizer token owned by the BareMetalHost controller.
pub const BAREMETAL_HOST_FINALIZER: &str = "baremetalhost.metalkube.org";

/// Label holding the derived hardware profile classification.
pub const HARDWARE_PROFILE_LABEL: &str = "metalkube.org/hardware-profile";

/// Error message recorded when any BMC connection detail is empty.
pub const MISSING_BMC_CREDENTIALS_MSG: &str = "Missing BMC connection details";

/// BareMetalHostSpec defines the desired state of a bare-metal host
#[derive(CustomResource, Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq)]
#[kube(
    group = "metalkube.org",
    version = "v1alpha1",
    kind = "BareMetalHost",
    namespaced,
    status = "BareMetalHostStatus",
    shortname = "bmh",
    derive = "PartialEq",
    printcolumn = r#"{"name":"Status","type":"string","jsonPath":".status.operationalStatus"}"#,
    printcolumn = r#"{"name":"Online","type":"boolean","jsonPath":".spec.online"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct BareMetalHostSpec {
    /// How to reach the baseboard management controller
    #[serde(default)]
    pub bmc: BmcDetails,

    /// Whether the host should be powered on
    #[serde(default)]
    pub online: bool,
}

/// Connection details for the host's management interface
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct BmcDetails {
    /// Management interface address
    #[serde(default)]
    pub ip: String,

    /// BMC username
    #[serde(default)]
    pub username: String,

    /// BMC password
    #[serde(default)]
    pub password: String,
}

/// Operational status derived by the controller
#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema, Default, PartialEq, Eq)]
pub enum OperationalStatus {
    /// Never evaluated; an absent status reads as this
    #[default]
    #[serde(rename = "")]
    Unset,

    /// Healthy with no power intent evaluated
    #[serde(rename = "OK")]
    Ok,

    /// Credentials present and the host is meant to be powered on
    Online,

    /// Credentials present and the host is meant to be powered off
    Offline,

    /// The host cannot be managed; see `errorMessage`
    Error,
}

impl fmt::Display for OperationalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            OperationalStatus::Unset => "",
            OperationalStatus::Ok => "OK",
            OperationalStatus::Online => "Online",
            OperationalStatus::Offline => "Offline",
            OperationalStatus::Error => "Error",
        };
        f.write_str(s)
    }
}

/// BareMetalHostStatus defines the observed state of a bare-metal host
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BareMetalHostStatus {
    /// Derived operational status
    #[serde(default)]
    pub operational_status: OperationalStatus,

    /// Last error, empty when healthy
    #[serde(default)]
    pub error_message: String,

    /// When the controller last wrote this status block
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_updated: Option<DateTime<Utc>>,
}

impl BareMetalHost {
    /// Whether deletion has been requested.
    pub fn is_deleting(&self) -> bool {
        self.metadata.deletion_timestamp.is_some()
    }

    /// Whether our finalizer token is present.
    pub fn has_finalizer(&self) -> bool {
        self.metadata
            .finalizers
            .as_ref()
            .is_some_and(|f| f.iter().any(|t| t == BAREMETAL_HOST_FINALIZER))
    }

    /// Appends the finalizer token. Returns `false` if it was already there.
    pub fn add_finalizer(&mut self) -> bool {
        if self.has_finalizer() {
            return false;
        }
        self.metadata
            .finalizers
            .get_or_insert_with(Vec::new)
            .push(BAREMETAL_HOST_FINALIZER.to_string());
        true
    }

    /// Removes every occurrence of the finalizer token, keeping other
    /// finalizers in order. Returns `false` if it was absent.
    pub fn remove_finalizer(&mut self) -> bool {
        let Some(finalizers) = self.metadata.finalizers.as_mut() else {
            return false;
        };
        let before = finalizers.len();
        finalizers.retain(|t| t != BAREMETAL_HOST_FINALIZER);
        finalizers.len() != before
    }

    /// All three BMC connection details are non-empty.
    pub fn has_bmc_credentials(&self) -> bool {
        let bmc = &self.spec.bmc;
        !bmc.ip.is_empty() && !bmc.username.is_empty() && !bmc.password.is_empty()
    }

    /// Current operational status, `Unset` when no status block exists.
    pub fn operational_status(&self) -> OperationalStatus {
        self.status
            .as_ref()
            .map(|s| s.operational_status)
            .unwrap_or_default()
    }

    /// Current error message, empty when no status block exists.
    pub fn error_message(&self) -> &str {
        self.status
            .as_ref()
            .map_or("", |s| s.error_message.as_str())
    }

    /// Last status write stamped by the controller.
    pub fn last_updated(&self) -> Option<DateTime<Utc>> {
        self.status.as_ref().and_then(|s| s.last_updated)
    }

    /// Sets the error message. Returns `false` if it already had that value.
    pub fn set_error_message(&mut self, message: &str) -> bool {
        if self.error_message() == message {
            return false;
        }
        self.status.get_or_insert_with(Default::default).error_message = message.to_string();
        true
    }

    /// Sets the operational status. Returns `false` if unchanged.
    pub fn set_operational_status(&mut self, status: OperationalStatus) -> bool {
        if self.operational_status() == status {
            return false;
        }
        self.status.get_or_insert_with(Default::default).operational_status = status;
        true
    }

    /// Sets a metadata label. Returns `false` if it already had that value.
    pub fn set_label(&mut self, key: &str, value: &str) -> bool {
        let labels = self.metadata.labels.get_or_insert_with(Default::default);
        if labels.get(key).is_some_and(|v| v == value) {
            return false;
        }
        labels.insert(key.to_string(), value.to_string());
        true
    }

    /// Stamps `lastUpdated`. Called before every status write.
    pub fn touch_status(&mut self, now: DateTime<Utc>) {
        self.status.get_or_insert_with(Default::default).last_updated = Some(now);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn host() -> BareMetalHost {
        BareMetalHost::new(
            "worker-0",
            BareMetalHostSpec {
                bmc: BmcDetails {
                    ip: "10.0.0.10".to_string(),
                    username: "admin".to_string(),
                    password: "secret".to_string(),
                },
                online: true,
            },
        )
    }

    #[test]
    fn test_finalizer_add_is_idempotent() {
        let mut h = host();
        assert!(!h.has_finalizer());
        assert!(h.add_finalizer());
        assert!(!h.add_finalizer());
        assert_eq!(
            h.metadata.finalizers.as_deref(),
            Some(&[BAREMETAL_HOST_FINALIZER.to_string()][..])
        );
    }

    #[test]
    fn test_remove_finalizer_keeps_foreign_tokens() {
        let mut h = host();
        h.metadata.finalizers = Some(vec![
            "other.example.com".to_string(),
            BAREMETAL_HOST_FINALIZER.to_string(),
        ]);
        assert!(h.remove_finalizer());
        assert!(!h.remove_finalizer());
        assert_eq!(h.metadata.finalizers, Some(vec!["other.example.com".to_string()]));
    }

    #[test]
    fn test_missing_any_credential() {
        let mut h = host();
        assert!(h.has_bmc_credentials());
        h.spec.bmc.password.clear();
        assert!(!h.has_bmc_credentials());
    }

    #[test]
    fn test_set_error_message_reports_change() {
        let mut h = host();
        assert!(!h.set_error_message(""), "absent status reads as empty message");
        assert!(h.status.is_none());
        assert!(h.set_error_message(MISSING_BMC_CREDENTIALS_MSG));
        assert!(!h.set_error_message(MISSING_BMC_CREDENTIALS_MSG));
        assert_eq!(h.error_message(), MISSING_BMC_CREDENTIALS_MSG);
    }

    #[test]
    fn test_set_operational_status_reports_change() {
        let mut h = host();
        assert_eq!(h.operational_status(), OperationalStatus::Unset);
        assert!(h.set_operational_status(OperationalStatus::Online));
        assert!(!h.set_operational_status(OperationalStatus::Online));
        assert!(h.set_operational_status(OperationalStatus::Error));
    }

    #[test]
    fn test_set_label_reports_change() {
        let mut h = host();
        assert!(h.set_label(HARDWARE_PROFILE_LABEL, "unknown"));
        assert!(!h.set_label(HARDWARE_PROFILE_LABEL, "unknown"));
        assert!(h.set_label(HARDWARE_PROFILE_LABEL, "dell"));
    }

    #[test]
    fn test_status_serializes_camel_case() {
        let mut h = host();
        h.set_operational_status(OperationalStatus::Offline);
        let value = serde_json::to_value(h.status.as_ref()).unwrap();
        assert_eq!(value["operationalStatus"], "Offline");
        assert_eq!(value["errorMessage"], "");
        assert!(value.get("lastUpdated").is_none());
    }

    #[test]
    fn test_operational_status_wire_values() {
        let cases = [
            (OperationalStatus::Unset, ""),
            (OperationalStatus::Ok, "OK"),
            (OperationalStatus::Online, "Online"),
            (OperationalStatus::Offline, "Offline"),
            (OperationalStatus::Error, "Error"),
        ];
        for (status, wire) in cases {
            assert_eq!(serde_json::to_value(status).unwrap(), serde_json::json!(wire));
            let parsed: OperationalStatus =
                serde_json::from_value(serde_json::json!(wire)).unwrap();
            assert_eq!(parsed, status);
            assert_eq!(status.to_string(), wire);
        }
        assert!(serde_json::from_value::<OperationalStatus>(serde_json::json!("Unknown")).is_err());
    }

    #[test]
    fn test_missing_status_fields_default() {
        let status: BareMetalHostStatus = serde_json::from_value(serde_json::json!({})).unwrap();
        assert_eq!(status.operational_status, OperationalStatus::Unset);
        assert!(status.error_message.is_empty());
        assert!(status.last_updated.is_none());
    }
}
