//! Error types for Warden
//!
//! Errors are structured with fields to aid debugging in production.
//! Each variant carries the context a reconcile log line needs, such as the
//! offending field or configuration key.

use thiserror::Error;

/// Main error type for Warden operations
#[derive(Debug, Error)]
pub enum Error {
    /// Kubernetes API error
    #[error("kubernetes error: {source}")]
    Kube {
        /// The underlying kube-rs error
        #[from]
        source: kube::Error,
    },

    /// Validation error for a user-facing spec field
    #[error("validation error for {field}: {message}")]
    Validation {
        /// Field group that failed (e.g., "affinity", "labels")
        field: String,
        /// Description of what's invalid
        message: String,
    },

    /// A resource quantity could not be parsed
    #[error("invalid quantity '{value}': {message}")]
    Quantity {
        /// The raw quantity string
        value: String,
        /// Why it was rejected
        message: String,
    },

    /// JSON (de)serialization failed
    #[error("serialization error: {message}")]
    Serialization {
        /// Description of what failed
        message: String,
    },

    /// Configuration could not be loaded
    #[error("configuration error [{key}]: {message}")]
    Config {
        /// Configuration key (usually the environment variable name)
        key: String,
        /// Description of what's wrong
        message: String,
    },
}

impl Error {
    /// Create a validation error for the given field group
    pub fn validation(field: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            message: msg.into(),
        }
    }

    /// Create a quantity parse error
    pub fn quantity(value: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Quantity {
            value: value.into(),
            message: msg.into(),
        }
    }

    /// Create a serialization error with the given message
    pub fn serialization(msg: impl Into<String>) -> Self {
        Self::Serialization {
            message: msg.into(),
        }
    }

    /// Create a configuration error for the given key
    pub fn config(key: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Config {
            key: key.into(),
            message: msg.into(),
        }
    }

    /// Get the field name if this is a validation error
    pub fn field(&self) -> Option<&str> {
        match self {
            Error::Validation { field, .. } => Some(field),
            _ => None,
        }
    }

    /// Borrow the underlying kube-rs error, if any
    pub fn as_kube(&self) -> Option<&kube::Error> {
        match self {
            Error::Kube { source } => Some(source),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Self::serialization(e.to_string())
    }
}
