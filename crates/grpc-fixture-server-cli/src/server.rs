use anyhow::{Context, Result};
use grpc_fixture::{load_fixture, logging, DumpReader, FixtureConfig, JsonCodec, StreamReplayEngine};
use grpc_fixture_server::FixtureServer;
use std::path::PathBuf;
use tracing::info;

use crate::args::ServerArgs;

/// Command line flags win over the config file, which wins over defaults.
fn resolve_config(args: &ServerArgs) -> Result<FixtureConfig> {
    let mut config = FixtureConfig::load(args.config.as_deref())?;

    if let Some(dump) = &args.dump {
        config.fixture.dump = Some(dump.clone());
    }
    if let Some(address) = args.address {
        config.server.address = address;
    }
    if let Some(level) = &args.log_level {
        config.logging.level = level.clone();
    }
    if let Some(dir) = &args.log_dir {
        config.logging.directory = dir.clone();
    }
    if args.log_stdout {
        config.logging.stdout = true;
    }

    Ok(config)
}

pub async fn start_server(args: &ServerArgs) -> Result<()> {
    let config = resolve_config(args)?;

    // Create the log file path
    let log_dir = shellexpand::full(&config.logging.directory)
        .map_err(|e| anyhow::anyhow!("Failed to expand log directory: {}", e))?;
    let log_path = PathBuf::from(log_dir.as_ref()).join("grpc_fixture.log");

    let log_level = config.logging.level.parse().unwrap_or_else(|_| {
        eprintln!(
            "Invalid log level: {}. Defaulting to 'info'.",
            config.logging.level
        );
        tracing::Level::INFO
    });

    logging::setup_global_logging(
        &log_path,
        &log_level,
        args.log_filter.as_deref(),
        config.logging.stdout,
    )
    .context("Failed to setup logging")?;

    info!("Logging to {}", log_path.display());

    let dump = config
        .fixture
        .dump
        .as_ref()
        .context("No dump to replay; pass --dump or set fixture.dump in the config file")?;
    let reader = DumpReader::open(dump)?;
    let fixtures = load_fixture(reader, &JsonCodec::new())
        .with_context(|| format!("Failed to load dump {}", dump.display()))?;
    let correlator = config.correlator()?;
    info!(
        "Loaded {} methods from {} ({} correlation rules)",
        fixtures.len(),
        dump.display(),
        correlator.len()
    );

    let engine = StreamReplayEngine::new(fixtures).with_correlator(correlator);

    info!("Starting fixture server on {}", config.server.address);
    let server = FixtureServer::bind(config.server.address, engine).await?;
    server.run().await?;

    Ok(())
}
