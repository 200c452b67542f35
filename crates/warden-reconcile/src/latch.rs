//! Create-only latch
//!
//! Operators can take a managed resource "hands off" by annotating it with
//! the create-only sentinel set to `"true"`. From then on the reconcile loop
//! still creates missing resources but never updates existing ones. The latch
//! is one-way for the lifetime of the process: removing the annotation does
//! not re-enable writes until the controller restarts.

use std::sync::atomic::{AtomicBool, Ordering};

use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use tracing::info;
use warden_common::config::DEFAULT_CREATE_ONLY_ANNOTATION;
use warden_common::kube_utils::{display_name, has_annotation_value};

/// Value the sentinel annotation must carry to trip the latch
pub const CREATE_ONLY_VALUE: &str = "true";

/// Gate a plain flag cell owned by the caller
///
/// Returns the flag after the check. `None` leaves the flag untouched.
pub fn gate(observed: Option<&ObjectMeta>, annotation: &str, flag: &mut bool) -> bool {
    if let Some(meta) = observed {
        if has_annotation_value(meta, annotation, CREATE_ONLY_VALUE) {
            *flag = true;
        }
    }
    *flag
}

/// Sticky create-only state for one managed-resource family
///
/// Each family's reconciler owns its own latch. The cell is atomic so a
/// shared reference can be handed to the reconcile closure, but reconciles
/// for one family are expected to be serialized by the scheduler.
#[derive(Debug)]
pub struct CreateOnlyLatch {
    annotation: String,
    tripped: AtomicBool,
}

impl Default for CreateOnlyLatch {
    fn default() -> Self {
        Self::new(DEFAULT_CREATE_ONLY_ANNOTATION)
    }
}

impl CreateOnlyLatch {
    /// Create an open latch watching the given annotation key
    pub fn new(annotation: impl Into<String>) -> Self {
        Self {
            annotation: annotation.into(),
            tripped: AtomicBool::new(false),
        }
    }

    /// The sentinel annotation key
    pub fn annotation(&self) -> &str {
        &self.annotation
    }

    /// Check the observed resource and report whether writes are blocked
    ///
    /// Trips the latch when the observed resource carries the sentinel with
    /// value `"true"`. Once tripped, always returns true.
    pub fn gate(&self, observed: Option<&ObjectMeta>) -> bool {
        if self.tripped.load(Ordering::Acquire) {
            return true;
        }
        let Some(meta) = observed else {
            return false;
        };
        if has_annotation_value(meta, &self.annotation, CREATE_ONLY_VALUE) {
            if !self.tripped.swap(true, Ordering::AcqRel) {
                info!(
                    resource = %display_name(meta),
                    annotation = %self.annotation,
                    "create-only mode enabled, updates disabled until restart"
                );
            }
            return true;
        }
        false
    }

    /// Whether the latch has tripped
    pub fn is_tripped(&self) -> bool {
        self.tripped.load(Ordering::Acquire)
    }
}
