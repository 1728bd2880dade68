use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{info, warn};

use grainfield_server::{ConfigLoader, Hub, ServerConfig, Validate, transport};

/// Grainfield server: records a live stream and feeds it to the players
#[derive(Parser, Debug)]
#[command(name = "grainfield-server")]
#[command(
    version,
    about = "Grainfield: distributed granular re-synthesis server.",
    long_about = "Slices the audio of a recording client into overlapping one second\n\
    segments and hands them out to groups of player clients, together with the\n\
    parameters set from control surfaces."
)]
struct Args {
    /// Configuration file (defaults to the user config directory)
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// IP address to bind to
    #[arg(short = 'H', long, value_name = "IP_ADDRESS")]
    host: Option<String>,

    /// Port to listen on
    #[arg(short, long)]
    port: Option<u16>,

    /// Directory the segment files are written to
    #[arg(long, value_name = "DIR")]
    record_dir: Option<PathBuf>,

    /// Sample rate of the recorder stream
    #[arg(long)]
    sample_rate: Option<u32>,

    /// Number of player groups
    #[arg(long)]
    player_groups: Option<usize>,

    /// Log level
    #[arg(long, default_value = "info")]
    log_level: String,
}

impl Args {
    fn load_config(&self) -> Result<ServerConfig> {
        let loader = match &self.config {
            Some(path) => ConfigLoader::with_path(path),
            None => ConfigLoader::new()?,
        };
        let mut config = loader
            .load_or_create()
            .with_context(|| format!("Failed to load {}", loader.config_path().display()))?;
        info!("Configuration loaded from {}", loader.config_path().display());

        if let Some(host) = &self.host {
            config.host = host.clone();
        }
        if let Some(port) = self.port {
            config.port = port;
        }
        if let Some(dir) = &self.record_dir {
            config.record_dir = dir.clone();
        }
        if let Some(rate) = self.sample_rate {
            config.sample_rate = rate;
        }
        if let Some(groups) = self.player_groups {
            config.player_groups = groups;
        }
        config.validate();
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(&args.log_level)
        .init();

    info!("Starting Grainfield server v{}", env!("CARGO_PKG_VERSION"));

    let config = args.load_config()?;
    let addr = config.socket_addr()?;
    info!("Segments written to {}", config.record_dir.display());
    info!(
        "Hop of {} samples, {} buffers, {} player groups",
        config.sample_rate, config.num_buffers, config.player_groups
    );

    let hub = Arc::new(Hub::new(&config));

    tokio::select! {
        result = transport::run(hub, addr) => {
            if let Err(e) = result {
                warn!("Server error: {}", e);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down gracefully...");
        }
    }

    info!("Grainfield server stopped");
    Ok(())
}
