//! Reconcile driver
//!
//! Runs one pass for one desired resource: read what the store has, consult
//! the create-only latch, validate the user-facing scheduling fields, compare,
//! and write only when something drifted. Store failures come back
//! classified so the scheduler can pick a requeue strategy.
//!
//! Each managed-resource family gets its own [`Reconciler`] so that one
//! family's create-only latch never affects another.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use kube::runtime::controller::Action;
use tracing::{debug, info, instrument, warn};

#[cfg(test)]
use mockall::automock;

use warden_common::crd::{Condition, ConditionStatus, SchedulingSpec};
use warden_common::{Error, ReconcileConfig};

use crate::classify::{self, ClassifyExt, ReconcileError, ReconcileReason};
use crate::compare::Comparator;
use crate::latch::CreateOnlyLatch;
use crate::resource::{ManagedResource, ResourceId};
use crate::validate::validate_detailed_as;

/// Condition reason reported when a pass completes
pub const REASON_RECONCILED: &str = "Reconciled";

// =============================================================================
// Traits for dependency injection and testability
// =============================================================================

/// Read/write access to managed resources
///
/// Implemented over the Kubernetes API in production and mocked in tests.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ResourceStore: Send + Sync {
    /// Fetch a resource, `None` when it does not exist
    async fn get(&self, id: &ResourceId) -> Result<Option<ManagedResource>, Error>;

    /// Create a resource
    async fn create(&self, resource: &ManagedResource) -> Result<ManagedResource, Error>;

    /// Replace a resource; the metadata carries the expected resourceVersion
    async fn update(&self, resource: &ManagedResource) -> Result<ManagedResource, Error>;

    /// Delete a resource
    async fn delete(&self, id: &ResourceId) -> Result<(), Error>;
}

/// Status sink for the owning custom resource
#[cfg_attr(test, automock)]
#[async_trait]
pub trait StatusReporter: Send + Sync {
    /// Add or replace a status condition
    async fn add_condition(&self, condition: Condition) -> Result<(), Error>;
}

// =============================================================================
// Reconciler
// =============================================================================

/// What a reconcile pass did
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Outcome {
    /// The resource did not exist and was created
    Created,
    /// The resource drifted and was updated
    Updated,
    /// The resource already matched
    Unchanged,
    /// Writes are disabled by the create-only latch
    SkippedCreateOnly {
        /// Whether the observed resource differs from desired
        drifted: bool,
    },
}

/// Reconcile driver for one managed-resource family
pub struct Reconciler {
    store: Arc<dyn ResourceStore>,
    status: Arc<dyn StatusReporter>,
    comparator: Comparator,
    latch: CreateOnlyLatch,
    condition_type: String,
    retry_interval: Duration,
}

impl Reconciler {
    /// Create a reconciler with an open latch
    pub fn new(
        store: Arc<dyn ResourceStore>,
        status: Arc<dyn StatusReporter>,
        config: &ReconcileConfig,
    ) -> Self {
        Self {
            store,
            status,
            comparator: Comparator::new(config),
            latch: CreateOnlyLatch::new(config.create_only_annotation.clone()),
            condition_type: config.condition_type.clone(),
            retry_interval: config.retry_interval,
        }
    }

    /// This family's create-only latch
    pub fn latch(&self) -> &CreateOnlyLatch {
        &self.latch
    }

    /// Bring the store in line with `desired`
    ///
    /// `scheduling` is the user-facing scheduling configuration the desired
    /// resource was rendered from, if any. Invalid scheduling fields are
    /// reported as status conditions and fail the pass as irrecoverable.
    #[instrument(skip(self, desired, scheduling), fields(resource = %desired.id()))]
    pub async fn reconcile(
        &self,
        desired: &ManagedResource,
        scheduling: Option<&SchedulingSpec>,
    ) -> Result<Outcome, ReconcileError> {
        let id = desired.id();
        let observed = self
            .store
            .get(&id)
            .await
            .classify_with(|| format!("failed to read {id}"))?;

        if let Some(observed) = &observed {
            if self.latch.gate(Some(observed.meta())) {
                let drifted = observed.needs_update(desired, &self.comparator);
                if drifted {
                    info!("resource drifted but create-only mode is enabled, leaving as is");
                }
                return Ok(Outcome::SkippedCreateOnly { drifted });
            }
        }

        if let Some(spec) = scheduling {
            self.check_scheduling(&id, spec).await?;
        }

        let outcome = match &observed {
            None => {
                self.store
                    .create(desired)
                    .await
                    .classify_with(|| format!("failed to create {id}"))?;
                info!("created resource");
                Outcome::Created
            }
            Some(observed) if observed.needs_update(desired, &self.comparator) => {
                let mut update = desired.clone();
                update.meta_mut().resource_version = observed.meta().resource_version.clone();
                self.store
                    .update(&update)
                    .await
                    .classify_with(|| format!("failed to update {id}"))?;
                info!("updated resource");
                Outcome::Updated
            }
            Some(_) => {
                debug!("resource up to date");
                Outcome::Unchanged
            }
        };

        self.report(Condition::new(
            &self.condition_type,
            ConditionStatus::True,
            REASON_RECONCILED,
            format!("{id} matches the desired configuration"),
        ))
        .await?;

        Ok(outcome)
    }

    /// Delete the resource unless the create-only latch is tripped
    ///
    /// A resource that is already gone counts as deleted.
    #[instrument(skip(self), fields(resource = %id))]
    pub async fn remove(&self, id: &ResourceId) -> Result<(), ReconcileError> {
        let observed = self
            .store
            .get(id)
            .await
            .classify_with(|| format!("failed to read {id}"))?;
        let Some(observed) = observed else {
            return Ok(());
        };
        if self.latch.gate(Some(observed.meta())) {
            info!("create-only mode is enabled, not deleting");
            return Ok(());
        }
        match self.store.delete(id).await {
            Err(e) if is_not_found(&e) => Ok(()),
            other => other.classify_with(|| format!("failed to delete {id}")),
        }
    }

    /// Requeue strategy for a failed pass
    pub fn error_policy(&self, err: &ReconcileError) -> Action {
        classify::error_policy(err, self.retry_interval)
    }

    async fn check_scheduling(
        &self,
        id: &ResourceId,
        spec: &SchedulingSpec,
    ) -> Result<(), ReconcileError> {
        let mut results = validate_detailed_as(spec, &self.condition_type);
        if results.is_empty() {
            return Ok(());
        }
        for result in &results {
            self.report(result.to_condition()).await?;
        }
        let first = results.remove(0);
        warn!(failures = results.len() + 1, "scheduling configuration is invalid");
        Err(ReconcileError::new(
            ReconcileReason::Irrecoverable,
            first.cause,
            format!("invalid scheduling configuration for {id}"),
        ))
    }

    async fn report(&self, condition: Condition) -> Result<(), ReconcileError> {
        self.status
            .add_condition(condition)
            .await
            .classify("failed to report status condition")
    }
}

fn is_not_found(err: &Error) -> bool {
    matches!(err.as_kube(), Some(kube::Error::Api(resp)) if resp.code == 404)
}
