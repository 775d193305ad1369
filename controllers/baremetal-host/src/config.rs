//! Controller configuration loaded from environment variables.

use crate::error::ControllerError;
use std::time::Duration;

/// Runtime settings for the BareMetalHost controller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControllerConfig {
    /// Namespace to watch; `None` watches all namespaces (`WATCH_NAMESPACE`)
    pub namespace: Option<String>,
    /// Max concurrent reconciliations (`RECONCILE_CONCURRENCY`)
    pub concurrency: u16,
    /// Deadline for a single reconcile invocation (`RECONCILE_TIMEOUT_SECS`)
    pub reconcile_timeout: Duration,
    /// Requeue delay after a pass that found nothing to do (`RESYNC_INTERVAL_SECS`)
    pub resync_interval: Duration,
    /// First retry delay after a failed invocation (`BACKOFF_MIN_SECS`)
    pub backoff_min: Duration,
    /// Retry delay cap (`BACKOFF_MAX_SECS`)
    pub backoff_max: Duration,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            namespace: None,
            concurrency: 4,
            reconcile_timeout: Duration::from_secs(30),
            resync_interval: Duration::from_secs(600),
            backoff_min: Duration::from_secs(5),
            backoff_max: Duration::from_secs(300),
        }
    }
}

impl ControllerConfig {
    /// Load configuration from the process environment.
    pub fn from_env() -> Result<Self, ControllerError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through `lookup`, falling back to defaults for
    /// unset variables.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ControllerError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let secs = |key: &str, default: Duration| -> Result<Duration, ControllerError> {
            match lookup(key) {
                None => Ok(default),
                Some(raw) => parse_number::<u64>(key, &raw).map(Duration::from_secs),
            }
        };

        let namespace = lookup("WATCH_NAMESPACE").filter(|ns| !ns.is_empty());
        let concurrency = match lookup("RECONCILE_CONCURRENCY") {
            None => defaults.concurrency,
            Some(raw) => parse_number::<u16>("RECONCILE_CONCURRENCY", &raw)?,
        };

        let config = Self {
            namespace,
            concurrency,
            reconcile_timeout: secs("RECONCILE_TIMEOUT_SECS", defaults.reconcile_timeout)?,
            resync_interval: secs("RESYNC_INTERVAL_SECS", defaults.resync_interval)?,
            backoff_min: secs("BACKOFF_MIN_SECS", defaults.backoff_min)?,
            backoff_max: secs("BACKOFF_MAX_SECS", defaults.backoff_max)?,
        };
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ControllerError> {
        if self.concurrency == 0 {
            return Err(ControllerError::InvalidConfig(
                "RECONCILE_CONCURRENCY must be at least 1".to_string(),
            ));
        }
        if self.reconcile_timeout.is_zero() {
            return Err(ControllerError::InvalidConfig(
                "RECONCILE_TIMEOUT_SECS must be at least 1".to_string(),
            ));
        }
        if self.backoff_min > self.backoff_max {
            return Err(ControllerError::InvalidConfig(format!(
                "BACKOFF_MIN_SECS ({}) exceeds BACKOFF_MAX_SECS ({})",
                self.backoff_min.as_secs(),
                self.backoff_max.as_secs()
            )));
        }
        Ok(())
    }
}

fn parse_number<T: std::str::FromStr>(key: &str, raw: &str) -> Result<T, ControllerError> {
    raw.trim().parse::<T>().map_err(|_| {
        ControllerError::InvalidConfig(format!("{key} must be a non-negative integer, got {raw:?}"))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_when_unset() {
        let config = ControllerConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config, ControllerConfig::default());
    }

    #[test]
    fn test_overrides() {
        let config = ControllerConfig::from_lookup(lookup(&[
            ("WATCH_NAMESPACE", "metal"),
            ("RECONCILE_CONCURRENCY", "8"),
            ("RECONCILE_TIMEOUT_SECS", "10"),
            ("RESYNC_INTERVAL_SECS", "60"),
            ("BACKOFF_MIN_SECS", "1"),
            ("BACKOFF_MAX_SECS", " 30 "),
        ]))
        .unwrap();
        assert_eq!(config.namespace.as_deref(), Some("metal"));
        assert_eq!(config.concurrency, 8);
        assert_eq!(config.reconcile_timeout, Duration::from_secs(10));
        assert_eq!(config.resync_interval, Duration::from_secs(60));
        assert_eq!(config.backoff_min, Duration::from_secs(1));
        assert_eq!(config.backoff_max, Duration::from_secs(30));
    }

    #[test]
    fn test_empty_namespace_means_all() {
        let config = ControllerConfig::from_lookup(lookup(&[("WATCH_NAMESPACE", "")])).unwrap();
        assert!(config.namespace.is_none());
    }

    #[test]
    fn test_rejects_garbage_number() {
        let err = ControllerConfig::from_lookup(lookup(&[("RESYNC_INTERVAL_SECS", "ten")]))
            .unwrap_err();
        match err {
            ControllerError::InvalidConfig(msg) => assert!(msg.contains("RESYNC_INTERVAL_SECS")),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_rejects_zero_concurrency() {
        let err = ControllerConfig::from_lookup(lookup(&[("RECONCILE_CONCURRENCY", "0")]))
            .unwrap_err();
        assert!(matches!(err, ControllerError::InvalidConfig(_)));
    }

    #[test]
    fn test_rejects_inverted_backoff_bounds() {
        let err = ControllerConfig::from_lookup(lookup(&[
            ("BACKOFF_MIN_SECS", "60"),
            ("BACKOFF_MAX_SECS", "10"),
        ]))
        .unwrap_err();
        assert!(matches!(err, ControllerError::InvalidConfig(msg) if msg.contains("exceeds")));
    }
}
