//! bcilink - Main entry point
//!
//! Connects to a BCI2000 operator, declares the configured scene and keeps
//! its states in sync until interrupted.

mod app;
mod config;
mod resolver;
mod simulation;

use anyhow::Result;
use bcilink_operator::OperatorConnection;
use clap::Parser;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{error, info, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser, Debug)]
#[command(name = "bcilink")]
#[command(about = "State and parameter bridge between a scene and a BCI2000 operator")]
#[command(version)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "bcilink.toml")]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Write an example configuration to the config path and exit
    #[arg(long)]
    write_default_config: bool,

    /// Stop after this many ticks
    #[arg(long)]
    ticks: Option<u64>,
}

fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(true)
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    info!("bcilink v{}", env!("CARGO_PKG_VERSION"));

    if args.write_default_config {
        config::save_default_config(&args.config)?;
        info!(path = %args.config.display(), "Wrote default configuration");
        return Ok(());
    }

    let config = config::load_config(&args.config)?;
    info!(
        telnet = %format!("{}:{}", config.operator.telnet_ip, config.operator.telnet_port),
        objects = config.objects.len(),
        custom = config.custom.len(),
        "Configuration loaded"
    );

    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();
    ctrlc::set_handler(move || {
        info!("Shutdown signal received");
        r.store(false, Ordering::SeqCst);
    })?;

    let connection = OperatorConnection::new(config.to_operator_settings())?;
    let mut app = app::App::new(&config, Box::new(connection))?;

    let result = app.bootstrap().and_then(|()| app.run(args.ticks, &running));
    app.shutdown();

    match result {
        Ok(ticks) => {
            info!(ticks = ticks, "Shutdown complete");
            Ok(())
        }
        Err(e) => {
            error!(error = %e, "Session failed");
            Err(e)
        }
    }
}
