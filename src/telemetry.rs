use anyhow::Result;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::ObservabilitySettings;

/// Initialize structured logging. `RUST_LOG` overrides the configured level.
/// Worker loops report captured per-item failures through this sink.
pub fn init_telemetry(settings: &ObservabilitySettings) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&settings.log_level))?;
    if settings.json_logs {
        tracing_subscriber::registry()
            .with(tracing_subscriber::fmt::layer().json().with_current_span(true))
            .with(filter)
            .try_init()?;
    } else {
        tracing_subscriber::registry()
            .with(tracing_subscriber::fmt::layer().compact())
            .with(filter)
            .try_init()?;
    }
    tracing::info!("telemetry initialized");
    Ok(())
}
