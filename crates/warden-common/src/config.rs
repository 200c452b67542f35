//! Runtime configuration for the reconcile layer
//!
//! Values have sensible defaults and may be overridden through `WARDEN_*`
//! environment variables when the controller starts.

use std::time::Duration;

use crate::Error;

/// Annotation that trips the create-only latch when set to `"true"`
pub const DEFAULT_CREATE_ONLY_ANNOTATION: &str = "warden.spiffe.io/create-only";

/// Annotation carrying the configuration fingerprint on pod templates
pub const DEFAULT_CONFIG_HASH_ANNOTATION: &str = "warden.spiffe.io/config-hash";

/// Annotation written by `kubectl rollout restart`
pub const RESTARTED_AT_ANNOTATION: &str = "kubectl.kubernetes.io/restartedAt";

/// Condition type used for validation results on the managed custom resource
pub const DEFAULT_CONDITION_TYPE: &str = "ConfigurationValid";

/// Default requeue interval for retryable reconcile errors
pub const DEFAULT_RETRY_INTERVAL: Duration = Duration::from_secs(30);

/// Environment variable names
pub mod env {
    /// Override for the create-only sentinel annotation key
    pub const CREATE_ONLY_ANNOTATION: &str = "WARDEN_CREATE_ONLY_ANNOTATION";
    /// Override for the config fingerprint annotation key
    pub const CONFIG_HASH_ANNOTATION: &str = "WARDEN_CONFIG_HASH_ANNOTATION";
    /// Comma-separated extra pod template annotations compared on workloads
    pub const SPECIAL_ANNOTATIONS: &str = "WARDEN_SPECIAL_ANNOTATIONS";
    /// Requeue interval in seconds for retryable errors
    pub const RETRY_INTERVAL_SECS: &str = "WARDEN_RETRY_INTERVAL_SECS";
    /// Condition type for validation results
    pub const CONDITION_TYPE: &str = "WARDEN_CONDITION_TYPE";
}

/// Configuration shared by the comparator, latch, and reconcile driver
#[derive(Clone, Debug, PartialEq)]
pub struct ReconcileConfig {
    /// Annotation key whose value `"true"` trips the create-only latch
    pub create_only_annotation: String,
    /// Annotation key used to stamp configuration fingerprints
    pub config_hash_annotation: String,
    /// Pod template annotations compared exactly on workloads; all others
    /// are left to the store and co-owning controllers
    pub special_annotations: Vec<String>,
    /// Requeue interval for RetryRequired errors
    pub retry_interval: Duration,
    /// Condition type for validation results
    pub condition_type: String,
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            create_only_annotation: DEFAULT_CREATE_ONLY_ANNOTATION.to_string(),
            config_hash_annotation: DEFAULT_CONFIG_HASH_ANNOTATION.to_string(),
            special_annotations: vec![
                DEFAULT_CONFIG_HASH_ANNOTATION.to_string(),
                RESTARTED_AT_ANNOTATION.to_string(),
            ],
            retry_interval: DEFAULT_RETRY_INTERVAL,
            condition_type: DEFAULT_CONDITION_TYPE.to_string(),
        }
    }
}

impl ReconcileConfig {
    /// Load configuration from the process environment
    pub fn from_env() -> Result<Self, Error> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration from an arbitrary key lookup
    ///
    /// Unset or blank values keep their defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, Error>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let mut config = Self::default();

        if let Some(key) = get(env::CREATE_ONLY_ANNOTATION) {
            config.create_only_annotation = key;
        }

        if let Some(key) = get(env::CONFIG_HASH_ANNOTATION) {
            // The fingerprint annotation is always special; swap out the default.
            config
                .special_annotations
                .retain(|a| a != DEFAULT_CONFIG_HASH_ANNOTATION);
            config.special_annotations.insert(0, key.clone());
            config.config_hash_annotation = key;
        }

        if let Some(extra) = get(env::SPECIAL_ANNOTATIONS) {
            for annotation in extra.split(',').map(str::trim).filter(|a| !a.is_empty()) {
                if !config.special_annotations.iter().any(|a| a == annotation) {
                    config.special_annotations.push(annotation.to_string());
                }
            }
        }

        if let Some(secs) = get(env::RETRY_INTERVAL_SECS) {
            let secs: u64 = secs.parse().map_err(|_| {
                Error::config(
                    env::RETRY_INTERVAL_SECS,
                    format!("expected a number of seconds, got '{secs}'"),
                )
            })?;
            if secs == 0 {
                return Err(Error::config(
                    env::RETRY_INTERVAL_SECS,
                    "retry interval must be at least 1 second",
                ));
            }
            config.retry_interval = Duration::from_secs(secs);
        }

        if let Some(condition_type) = get(env::CONDITION_TYPE) {
            config.condition_type = condition_type;
        }

        Ok(config)
    }

    /// Override the create-only annotation key
    pub fn with_create_only_annotation(mut self, key: impl Into<String>) -> Self {
        self.create_only_annotation = key.into();
        self
    }
}
