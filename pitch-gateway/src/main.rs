//! Pitchmate Gateway - Main entry point.

use anyhow::Result;
use pitch_common::config::Config;
use pitch_common::logging::init_logging_with_exclusions;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration (file, then environment overrides)
    let config = Config::load_and_validate()?;

    // Initialize logging
    init_logging_with_exclusions(
        &config.observability.log_level,
        &config.observability.log_format,
        &config.observability.excluded_targets,
    );

    tracing::info!("Pitchmate Gateway v{}", env!("CARGO_PKG_VERSION"));

    pitch_gateway::start_server(&config).await
}
