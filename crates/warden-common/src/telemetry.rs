//! Tracing initialization for Warden processes
//!
//! Installs a `tracing-subscriber` registry with an `EnvFilter` and either
//! JSON structured output (production) or human-readable output (local runs).

use thiserror::Error;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Default filter directives when `RUST_LOG` is unset
pub const DEFAULT_FILTER: &str = "info,warden=debug,kube=info,tower=warn,hyper=warn";

/// Errors that can occur during telemetry initialization
#[derive(Debug, Error)]
pub enum TelemetryError {
    /// Failed to parse filter directives
    #[error("invalid log filter: {0}")]
    Filter(String),

    /// Failed to initialize tracing subscriber
    #[error("failed to initialize tracing subscriber: {0}")]
    SubscriberInit(String),
}

/// Output format for log lines
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum LogFormat {
    /// One JSON object per line, with span context
    #[default]
    Json,
    /// Human-readable single-line output
    Pretty,
}

/// Configuration for telemetry initialization
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    /// Service name attached to every log line (e.g., "warden-controller")
    pub service_name: String,
    /// Output format
    pub format: LogFormat,
    /// Filter directives; `RUST_LOG` takes precedence when set
    pub filter: String,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        let format = match std::env::var("WARDEN_LOG_FORMAT").as_deref() {
            Ok("pretty") | Ok("text") => LogFormat::Pretty,
            _ => LogFormat::Json,
        };
        Self {
            service_name: "warden".to_string(),
            format,
            filter: DEFAULT_FILTER.to_string(),
        }
    }
}

/// Build the filter: `RUST_LOG` if present, otherwise the configured directives
fn build_filter(config: &TelemetryConfig) -> Result<EnvFilter, TelemetryError> {
    match EnvFilter::try_from_default_env() {
        Ok(filter) => Ok(filter),
        Err(_) => EnvFilter::try_new(&config.filter)
            .map_err(|e| TelemetryError::Filter(e.to_string())),
    }
}

/// Initialize the global tracing subscriber
///
/// Fails if a global subscriber is already installed.
///
/// # Example
///
/// ```ignore
/// use warden_common::telemetry::{init_telemetry, TelemetryConfig};
///
/// init_telemetry(TelemetryConfig {
///     service_name: "warden-controller".to_string(),
///     ..Default::default()
/// })?;
/// ```
pub fn init_telemetry(config: TelemetryConfig) -> Result<(), TelemetryError> {
    let env_filter = build_filter(&config)?;

    let result = match config.format {
        LogFormat::Json => {
            let fmt_layer = tracing_subscriber::fmt::layer()
                .json()
                .with_current_span(true)
                .with_span_list(false)
                .with_target(true)
                .with_file(false)
                .with_line_number(false);
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt_layer)
                .try_init()
        }
        LogFormat::Pretty => {
            let fmt_layer = tracing_subscriber::fmt::layer().with_target(true);
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt_layer)
                .try_init()
        }
    };

    result.map_err(|e| TelemetryError::SubscriberInit(e.to_string()))?;
    tracing::info!(service = %config.service_name, "telemetry initialized");
    Ok(())
}
