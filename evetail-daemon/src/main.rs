use anyhow::Result;
use clap::Parser;

use evetail_core::config::EvetailConfig;
use evetail_core::error::{ConfigError, EvetailError};
use evetail_daemon::cli::DaemonCli;
use evetail_daemon::logging::init_tracing;
use evetail_daemon::orchestrator::Orchestrator;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = DaemonCli::parse();

    // file, then EVETAIL_* environment, then command-line flags
    let mut config = match EvetailConfig::from_file(&cli.config).await {
        Ok(config) => config,
        Err(EvetailError::Config(ConfigError::FileNotFound { .. })) if !cli.input.is_empty() => {
            EvetailConfig::default()
        }
        Err(e) => return Err(anyhow::anyhow!("failed to load config: {}", e)),
    };
    config.apply_env_overrides();
    cli.apply_to(&mut config);
    config
        .validate()
        .map_err(|e| anyhow::anyhow!("config validation failed: {}", e))?;

    if cli.validate {
        println!("configuration is valid: {}", cli.config.display());
        return Ok(());
    }

    init_tracing(&config.general)?;
    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        inputs = config.input.paths.len(),
        "evetail-daemon starting"
    );

    let mut orchestrator = Orchestrator::build_from_config(config).await?;
    orchestrator.run().await?;

    tracing::info!("evetail-daemon shut down");
    Ok(())
}
