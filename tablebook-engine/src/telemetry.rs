//! Tracing subscriber setup.

use tablebook_core::{EngineError, EngineResult};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TelemetryConfig {
    /// `EnvFilter` directive, e.g. `info` or `tablebook_storage=debug,info`.
    pub filter: String,
    /// Emit JSON lines instead of human-readable output.
    pub json: bool,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            filter: "info".to_string(),
            json: false,
        }
    }
}

impl TelemetryConfig {
    /// Load from `TABLEBOOK_LOG` and `TABLEBOOK_LOG_JSON`.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            filter: std::env::var("TABLEBOOK_LOG").unwrap_or(defaults.filter),
            json: std::env::var("TABLEBOOK_LOG_JSON")
                .map(|v| matches!(v.to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
                .unwrap_or(defaults.json),
        }
    }
}

/// Install the global subscriber.
///
/// Fails with `EngineError::Internal` if the filter does not parse or a
/// subscriber is already installed.
pub fn init_tracing(config: &TelemetryConfig) -> EngineResult<()> {
    let env_filter = EnvFilter::try_new(&config.filter)
        .map_err(|e| EngineError::Internal(format!("Invalid log filter: {}", e)))?;

    let registry = tracing_subscriber::registry().with(env_filter);
    let installed = if config.json {
        registry.with(tracing_subscriber::fmt::layer().json()).try_init()
    } else {
        registry.with(tracing_subscriber::fmt::layer()).try_init()
    };
    installed.map_err(|e| EngineError::Internal(format!("Failed to init subscriber: {}", e)))?;

    tracing::info!(filter = %config.filter, json = config.json, "Tracing initialized");
    Ok(())
}
