//! Common types for Warden: errors, configuration, CRDs, and utilities

#![deny(missing_docs)]

pub mod config;
pub mod crd;
pub mod error;
pub mod kube_utils;
pub mod quantity;
pub mod telemetry;

pub use config::ReconcileConfig;
pub use error::Error;

/// Result type alias using our custom Error type
pub type Result<T> = std::result::Result<T, Error>;
