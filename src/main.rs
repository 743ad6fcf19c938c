//! Dualstick GW - Rust implementation
//!
//! Gateway turning a browser dual-touch virtual joystick into drone control updates.

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::oneshot;
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use dualstick_gw::config::{AppConfig, ConfigWatcher};
use dualstick_gw::server::{self, AppState};

/// Dualstick Gateway - browser dual-touch joystick to drone control
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "config.yaml")]
    config: String,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Override the listening port from the config file
    #[arg(short, long, env = "DUALSTICK_PORT")]
    port: Option<u16>,

    /// Also write daily rolling log files into this directory
    #[arg(long)]
    log_dir: Option<PathBuf>,

    /// Validate the configuration, print a summary and exit
    #[arg(long)]
    check_config: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Parse command line arguments
    let args = Args::parse();

    // Initialize logging; the guard flushes the file writer on exit
    let _log_guard = init_logging(&args.log_level, args.log_dir.as_ref())?;

    info!("Starting Dualstick GW v{}...", env!("CARGO_PKG_VERSION"));
    info!("Configuration file: {}", args.config);

    if args.check_config {
        let config = AppConfig::load(&args.config).await?;
        print_config_summary(&config);
        return Ok(());
    }

    // Load configuration with hot-reload watcher
    let (config_watcher, initial_config) = ConfigWatcher::new(args.config.clone()).await?;
    info!("Configuration loaded successfully with hot-reload enabled");

    let mut config = (*initial_config).clone();
    if let Some(port) = args.port {
        config.server.port = port;
    }

    let state = AppState::new(config);
    run_app(state, config_watcher, args.port, shutdown_signal()).await?;

    info!("Dualstick GW shutdown complete");
    Ok(())
}

async fn run_app(
    state: Arc<AppState>,
    mut config_watcher: ConfigWatcher,
    port_override: Option<u16>,
    shutdown: impl std::future::Future<Output = ()>,
) -> Result<()> {
    let (stop_tx, stop_rx) = oneshot::channel::<()>();
    let mut server = tokio::spawn(server::serve(Arc::clone(&state), async move {
        stop_rx.await.ok();
    }));

    info!("Ready for joystick input!");

    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            // Handle config reload
            Some(mut new_config) = config_watcher.next_config() => {
                info!("📝 Configuration file changed, reloading...");
                if let Some(port) = port_override {
                    new_config.server.port = port;
                }
                state.apply_config(new_config);
            }

            // Server ended on its own (bind failure, fatal error)
            result = &mut server => {
                return match result {
                    Ok(inner) => inner,
                    Err(e) => Err(anyhow::anyhow!("Server task failed: {}", e)),
                };
            }

            // Handle shutdown signal
            _ = &mut shutdown => {
                info!("Shutdown signal received, stopping server");
                break;
            }
        }
    }

    // Cleanup
    if stop_tx.send(()).is_err() {
        warn!("Server already stopped");
    }
    match server.await {
        Ok(result) => result?,
        Err(e) => warn!("Server task failed during shutdown: {}", e),
    }

    Ok(())
}

fn init_logging(level: &str, log_dir: Option<&PathBuf>) -> Result<Option<WorkerGuard>> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    let (file_layer, guard) = match log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "dualstick-gw.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_target(false)
                .with_writer(writer);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_thread_ids(false)
                .with_thread_names(false),
        )
        .with(file_layer)
        .init();

    Ok(guard)
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for CTRL+C: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}

fn print_config_summary(config: &AppConfig) {
    use colored::*;

    println!("\n{}", "=== Configuration OK ===".bold().green());

    println!("\n{}", "Server:".bold());
    println!(
        "  Listen: {}",
        format!("{}:{}", config.server.host, config.server.port).cyan()
    );
    println!("  Device buffer: {}", config.server.device_buffer.to_string().cyan());

    let joystick = &config.joystick;
    println!("\n{}", "Joystick:".bold());
    println!("  Max range: {}px", joystick.max_range.to_string().cyan());
    println!(
        "  Release: {} ms at {} fps",
        joystick.release_duration_ms.to_string().cyan(),
        joystick.frame_rate.to_string().cyan()
    );
    println!("  Origin capture: {}", format!("{:?}", joystick.origin_capture).cyan());
    let hold = |enabled: bool| if enabled { "hold".yellow() } else { "release".normal() };
    println!(
        "  Left: {}  Right: {}  (threshold {})",
        hold(joystick.hold_left),
        hold(joystick.hold_right),
        joystick.hold_threshold
    );
    println!("  Mouse drives: {}", joystick.mouse_side.to_string().cyan());

    println!("\n{}", "Control:".bold());
    println!("  Labels: {}", format!("{:?}", config.control.labels).cyan());
    println!(
        "  Log updates: {}",
        if config.control.log_updates { "yes".green() } else { "no".normal() }
    );
    println!();
}
