//! Tracing setup for hosts that want the kernel to install its subscriber.
//!
//! Embedding hosts usually bring their own subscriber; this module is for
//! binaries and tests that do not.

use crate::error::{Error, Result};
use tracing::debug;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Subscriber settings.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    /// Default filter directive, overridden by `RUST_LOG` when set.
    pub filter: String,
    /// Include the event target (module path) in output.
    pub with_target: bool,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            filter: "info".to_string(),
            with_target: true,
        }
    }
}

impl TelemetryConfig {
    pub fn with_filter(mut self, filter: impl Into<String>) -> Self {
        self.filter = filter.into();
        self
    }

    pub fn with_target(mut self, with_target: bool) -> Self {
        self.with_target = with_target;
        self
    }
}

/// Install a global fmt subscriber driven by an [`EnvFilter`].
///
/// Fails if a global subscriber is already installed.
pub fn init_telemetry(config: &TelemetryConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.filter.clone()));

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(config.with_target),
        )
        .try_init()
        .map_err(|e| Error::internal(format!("telemetry init failed: {e}")))?;

    debug!(filter = %config.filter, "telemetry installed");
    Ok(())
}
