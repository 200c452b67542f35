//! Custom resource definitions and shared spec/status types

mod cluster_spiffe_id;
mod scheduling;
mod types;

pub use cluster_spiffe_id::{ClusterSPIFFEID, ClusterSpiffeId, ClusterSpiffeIdSpec};
pub use scheduling::SchedulingSpec;
pub use types::{upsert_condition, Condition, ConditionStatus};
