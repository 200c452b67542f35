//! Reconciliation decision layer for Warden
//!
//! Everything a controller needs to decide what to do with one managed
//! resource, independent of how it talks to the cluster:
//!
//! - **Compare**: desired/observed drift detection per resource kind
//! - **Classify**: store failures mapped to requeue strategies
//! - **Fingerprint**: configuration digests that roll dependent workloads
//! - **Latch**: process-lifetime create-only mode
//! - **Validate**: scheduling and labeling field checks
//! - **Controller**: a reconcile driver wiring the above to a resource store

#![deny(missing_docs)]

pub mod classify;
pub mod compare;
pub mod controller;
pub mod fingerprint;
pub mod latch;
pub mod resource;
pub mod validate;

pub use classify::{ClassifyExt, ReconcileError, ReconcileReason};
pub use compare::{Comparable, Comparator, Drift};
pub use controller::{Outcome, Reconciler, ResourceStore, StatusReporter};
pub use fingerprint::Fingerprint;
pub use latch::CreateOnlyLatch;
pub use resource::{needs_update, ManagedResource, ResourceId};
