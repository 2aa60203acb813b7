//! Modbus register server.
//!
//! Serves holding and input registers over Modbus RTU (serial) or TCP.

use anyhow::{Context, Result};
use clap::Parser;
use modbus_regserver::config::RegisterServerConfig;
use modbus_regserver::service::shared;
use modbus_regserver::transport;
use std::path::PathBuf;
use std::time::Instant;
use tracing::{error, info};

/// Modbus server (RTU/TCP) with configurable register spaces.
#[derive(Parser, Debug)]
#[command(name = "modbus-regserver")]
#[command(about = "Serves configurable Modbus holding and input registers")]
#[command(version)]
struct Args {
    /// Path to configuration file (JSON5 format)
    #[arg(short, long, default_value = "modbus-server.json5")]
    config: PathBuf,

    /// Override log level (trace, debug, info, warn, error).
    #[arg(long)]
    log_level: Option<String>,

    /// Validate the configuration, print the register map and exit.
    #[arg(long)]
    check: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let started = Instant::now();

    // Load configuration
    let config = RegisterServerConfig::load_from_file(&args.config)
        .with_context(|| format!("Failed to load config from {:?}", args.config))?;

    // Build every register space before touching any transport
    let mut cores = Vec::with_capacity(config.servers.len());
    for server in &config.servers {
        cores.push(server.build_core(started)?);
    }

    if args.check {
        let maps: Vec<_> = config
            .servers
            .iter()
            .zip(&cores)
            .map(|(server, core)| {
                serde_json::json!({
                    "name": server.name,
                    "registers": core.snapshot(),
                })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&maps)?);
        return Ok(());
    }

    // Initialize logging
    let log_config = config
        .logging
        .clone()
        .with_level_override(args.log_level.as_deref());
    regserver_common::init_tracing(&log_config)
        .map_err(|e| anyhow::anyhow!("Failed to init tracing: {}", e))?;

    info!(version = env!("CARGO_PKG_VERSION"), "Starting modbus-regserver");
    info!("Loaded configuration from {:?}", args.config);

    // Start one task per server
    let mut tasks = Vec::new();

    for (server, core) in config.servers.iter().cloned().zip(cores) {
        info!(
            server = %server.name,
            station = server.station_address,
            holding_ranges = server.holding_registers.len(),
            input_ranges = server.input_registers.len(),
            "Starting server"
        );

        let core = shared(core);
        tasks.push(tokio::spawn(async move {
            if let Err(e) = transport::run(&server, core).await {
                error!(server = %server.name, error = %e, "Server stopped");
            }
        }));
    }

    info!("Modbus register server running with {} server(s)", tasks.len());

    // Wait for shutdown signal
    tokio::signal::ctrl_c().await?;
    info!("Received shutdown signal");

    for task in tasks {
        task.abort();
    }

    info!("Modbus register server stopped");

    Ok(())
}
