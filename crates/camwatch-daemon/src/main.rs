//! Camwatch daemon entry point.
//!
//! This binary starts the WebSocket server that monitors camera devices
//! and serves snapshot/recording requests from clients.

use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

mod connection;
mod error;
mod handlers;
mod methods;
mod registry;
mod server;

use camwatch_core::Config;

/// Camwatch daemon - camera presence monitoring and media capture server
#[derive(Parser, Debug)]
#[command(name = "camwatch-daemon")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to the JSON config file (missing file means defaults)
    #[arg(long, value_name = "PATH", default_value = "camwatch.json")]
    config: PathBuf,

    /// Override the listen host
    #[arg(long, value_name = "HOST")]
    host: Option<String>,

    /// Override the listen port
    #[arg(long, value_name = "PORT")]
    port: Option<u16>,

    /// Override the media output directory
    #[arg(long, value_name = "DIR")]
    output_dir: Option<PathBuf>,
}

/// Set up logging with file output for debugging.
/// In debug builds, defaults to debug level and logs to timestamped file.
/// In release builds, defaults to info level and logs to stderr.
fn setup_logging() {
    let default_level = if cfg!(debug_assertions) {
        "debug"
    } else {
        "info"
    };

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("camwatch={default_level}")));

    if cfg!(debug_assertions) {
        let temp_dir = std::env::temp_dir();
        let timestamp = chrono::Local::now().format("%Y%m%d_%H%M%S");
        let log_filename = format!("camwatch-daemon-{timestamp}.log");
        let log_path = temp_dir.join(&log_filename);

        #[cfg(unix)]
        {
            let symlink_path = temp_dir.join("camwatch-daemon.log");
            let _ = std::fs::remove_file(&symlink_path);
            let _ = std::os::unix::fs::symlink(&log_path, &symlink_path);
        }

        let file_appender = tracing_appender::rolling::never(&temp_dir, &log_filename);
        let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

        std::mem::forget(guard);

        let file_layer = fmt::layer()
            .with_writer(non_blocking)
            .with_ansi(false)
            .with_target(true)
            .with_line_number(true);

        let stderr_layer = fmt::layer()
            .with_writer(std::io::stderr)
            .with_ansi(true)
            .with_target(true)
            .with_line_number(true);

        tracing_subscriber::registry()
            .with(file_layer)
            .with(stderr_layer)
            .with(filter)
            .init();

        eprintln!("Logging to: {} (and stderr)", log_path.display());
    } else {
        tracing_subscriber::registry()
            .with(fmt::layer())
            .with(filter)
            .init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    setup_logging();

    let mut config = Config::load(&args.config)
        .with_context(|| format!("loading config from {}", args.config.display()))?;
    if let Some(host) = args.host {
        config.server.host = host;
    }
    if let Some(port) = args.port {
        config.server.port = port;
    }
    if let Some(output_dir) = args.output_dir {
        config.media.output_dir = output_dir;
    }

    info!("Starting camwatch daemon...");

    server::run(config).await?;

    info!("Camwatch daemon stopped");
    Ok(())
}
