//! Reconcile error classification
//!
//! Every failure that reaches the scheduler is a [`ReconcileError`] with one
//! of three reasons. The reason alone decides the retry cadence:
//!
//! - `RetryRequired`: transient store condition or anything unclassified;
//!   requeue with backoff.
//! - `Irrecoverable`: permissions, schema or programmer error; wait for a
//!   configuration change.
//! - `MultipleInstance`: more than one singleton configuration object
//!   exists; wait for the operator to delete the extras.
//!
//! Absence of an error stays absent: every entry point that accepts an
//! optional cause returns `None` for `None`, and [`ClassifyExt::classify`]
//! leaves `Ok` values untouched.

use std::error::Error as StdError;
use std::fmt;
use std::time::Duration;

use kube::runtime::controller::Action;
use thiserror::Error;
use tracing::{debug, error};

/// Boxed error used as the preserved cause
pub type BoxError = Box<dyn StdError + Send + Sync + 'static>;

/// Why a reconcile failed, and therefore how the scheduler reacts
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ReconcileReason {
    /// Retrying cannot help until configuration changes
    Irrecoverable,
    /// Transient failure; retry with backoff
    RetryRequired,
    /// A singleton configuration object has more than one instance
    MultipleInstance,
}

impl ReconcileReason {
    /// Stable string form used in status conditions and log fields
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Irrecoverable => "Irrecoverable",
            Self::RetryRequired => "RetryRequired",
            Self::MultipleInstance => "MultipleInstance",
        }
    }

    /// Whether the scheduler should requeue on its own
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::RetryRequired)
    }
}

impl fmt::Display for ReconcileReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A classified reconcile failure
///
/// The message is built only from the caller's context string so it stays
/// stable across retries; the cause is kept for logs.
#[derive(Debug, Error)]
#[error("{message}: {source}")]
pub struct ReconcileError {
    reason: ReconcileReason,
    message: String,
    #[source]
    source: BoxError,
}

impl ReconcileError {
    /// Build an error with an explicit reason
    pub fn new(
        reason: ReconcileReason,
        cause: impl Into<BoxError>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            reason,
            message: message.into(),
            source: cause.into(),
        }
    }

    /// The classification
    pub fn reason(&self) -> ReconcileReason {
        self.reason
    }

    /// Human-readable context
    pub fn message(&self) -> &str {
        &self.message
    }

    /// The preserved underlying error
    pub fn cause(&self) -> &(dyn StdError + Send + Sync + 'static) {
        self.source.as_ref()
    }

    /// True for `Irrecoverable`
    pub fn is_irrecoverable(&self) -> bool {
        self.reason == ReconcileReason::Irrecoverable
    }

    /// True for `RetryRequired`
    pub fn is_retry_required(&self) -> bool {
        self.reason == ReconcileReason::RetryRequired
    }

    /// True for `MultipleInstance`
    pub fn is_multiple_instance(&self) -> bool {
        self.reason == ReconcileReason::MultipleInstance
    }
}

/// Classify a manually detected programmer or configuration error
pub fn irrecoverable<E: Into<BoxError>>(
    cause: Option<E>,
    message: impl Into<String>,
) -> Option<ReconcileError> {
    cause.map(|e| ReconcileError::new(ReconcileReason::Irrecoverable, e, message))
}

/// Classify a manually detected transient condition
pub fn retry_required<E: Into<BoxError>>(
    cause: Option<E>,
    message: impl Into<String>,
) -> Option<ReconcileError> {
    cause.map(|e| ReconcileError::new(ReconcileReason::RetryRequired, e, message))
}

/// Classify a violated singleton invariant
pub fn multiple_instance<E: Into<BoxError>>(
    cause: Option<E>,
    message: impl Into<String>,
) -> Option<ReconcileError> {
    cause.map(|e| ReconcileError::new(ReconcileReason::MultipleInstance, e, message))
}

/// Classify the outcome of a store operation
pub fn from_store_error<E: Into<BoxError>>(
    err: Option<E>,
    context: impl Into<String>,
) -> Option<ReconcileError> {
    err.map(|e| classify(e.into(), context))
}

/// Map an API server response to a reason
///
/// The `reason` field wins when the server sets it; the HTTP code is the
/// fallback for proxies and aggregated APIs that leave it empty.
fn reason_for_api_status(code: u16, reason: &str) -> ReconcileReason {
    match reason {
        "NotFound" | "Conflict" | "AlreadyExists" => return ReconcileReason::RetryRequired,
        "Unauthorized" | "Forbidden" | "BadRequest" => return ReconcileReason::Irrecoverable,
        _ => {}
    }
    match code {
        404 | 409 => ReconcileReason::RetryRequired,
        400 | 401 | 403 => ReconcileReason::Irrecoverable,
        _ => ReconcileReason::RetryRequired,
    }
}

/// Reason for a store error, looking through the common error wrapper
fn store_reason(err: &(dyn StdError + 'static)) -> ReconcileReason {
    let kube_err = err
        .downcast_ref::<kube::Error>()
        .or_else(|| {
            err.downcast_ref::<warden_common::Error>()
                .and_then(warden_common::Error::as_kube)
        });
    match kube_err {
        Some(kube::Error::Api(resp)) => reason_for_api_status(resp.code, &resp.reason),
        _ => ReconcileReason::RetryRequired,
    }
}

/// Classify a non-absent store error
///
/// An error that is already a `ReconcileError` is returned unchanged, so
/// classification is idempotent.
pub fn classify(err: BoxError, context: impl Into<String>) -> ReconcileError {
    let err = match err.downcast::<ReconcileError>() {
        Ok(already) => return *already,
        Err(other) => other,
    };
    let reason = store_reason(err.as_ref());
    let message = context.into();
    debug!(%reason, %message, error = %err, "classified store error");
    ReconcileError::new(reason, err, message)
}

/// Classification at `?` call sites
pub trait ClassifyExt<T> {
    /// Classify the error side with a context message; `Ok` passes through
    fn classify(self, context: impl Into<String>) -> Result<T, ReconcileError>;

    /// Like [`ClassifyExt::classify`] with a lazily built message
    fn classify_with<F: FnOnce() -> String>(self, context: F) -> Result<T, ReconcileError>;
}

impl<T, E: Into<BoxError>> ClassifyExt<T> for Result<T, E> {
    fn classify(self, context: impl Into<String>) -> Result<T, ReconcileError> {
        self.map_err(|e| classify(e.into(), context))
    }

    fn classify_with<F: FnOnce() -> String>(self, context: F) -> Result<T, ReconcileError> {
        self.map_err(|e| classify(e.into(), context()))
    }
}

/// Find a `ReconcileError` anywhere in an error's source chain
pub fn find_reconcile_error<'a>(err: &'a (dyn StdError + 'static)) -> Option<&'a ReconcileError> {
    let mut current: Option<&(dyn StdError + 'static)> = Some(err);
    while let Some(e) = current {
        if let Some(found) = e.downcast_ref::<ReconcileError>() {
            return Some(found);
        }
        current = e.source();
    }
    None
}

/// True if the error (or one of its sources) is an Irrecoverable reconcile error
pub fn is_irrecoverable(err: &(dyn StdError + 'static)) -> bool {
    find_reconcile_error(err).is_some_and(ReconcileError::is_irrecoverable)
}

/// True if the error (or one of its sources) is a RetryRequired reconcile error
pub fn is_retry_required(err: &(dyn StdError + 'static)) -> bool {
    find_reconcile_error(err).is_some_and(ReconcileError::is_retry_required)
}

/// True if the error (or one of its sources) is a MultipleInstance reconcile error
pub fn is_multiple_instance(err: &(dyn StdError + 'static)) -> bool {
    find_reconcile_error(err).is_some_and(ReconcileError::is_multiple_instance)
}

/// Singleton cardinality violation
#[derive(Debug, Error)]
#[error("expected exactly one {kind}, found {count}")]
pub struct InstanceCountError {
    /// Kind of the singleton object
    pub kind: String,
    /// How many were observed
    pub count: usize,
}

/// Fail with `MultipleInstance` when more than one singleton is observed
///
/// Zero instances is not a cardinality violation; the caller decides whether
/// a missing singleton means "nothing to do".
pub fn ensure_single_instance<T>(items: &[T], kind: &str) -> Result<(), ReconcileError> {
    if items.len() <= 1 {
        return Ok(());
    }
    Err(ReconcileError::new(
        ReconcileReason::MultipleInstance,
        InstanceCountError {
            kind: kind.to_string(),
            count: items.len(),
        },
        format!("multiple {kind} instances found, only one is supported"),
    ))
}

/// Scheduler action for a classified failure
///
/// Logs the failure with its reason and cause, then requeues retryable
/// errors after `retry_interval` and waits for a change otherwise.
pub fn error_policy(err: &ReconcileError, retry_interval: Duration) -> Action {
    error!(
        reason = %err.reason(),
        message = %err.message(),
        cause = %err.cause(),
        retryable = err.reason().is_retryable(),
        "reconciliation failed"
    );
    if err.reason().is_retryable() {
        Action::requeue(retry_interval)
    } else {
        Action::await_change()
    }
}
