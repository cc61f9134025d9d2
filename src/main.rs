//! rtprof demo binary
//!
//! Profiles its own process: starts the collector and the report
//! endpoint, then runs until Ctrl-C.

use anyhow::{Context, Result};
use clap::Parser;
use env_logger::Env;
use log::info;
use std::time::Duration;

use rtprof::utils::config::{DEFAULT_HOST, DEFAULT_PORT};
use rtprof::ControllerConfig;

/// rtprof - continuous CPU profiling with a loopback-only report endpoint
#[derive(Parser, Debug)]
#[command(name = "rtprof")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Seconds between snapshot windows
    #[arg(short, long, default_value = "5", env = "RTPROF_INTERVAL_SECS")]
    interval_secs: u64,

    /// Port for the report endpoint
    #[arg(short, long, default_value_t = DEFAULT_PORT, env = "RTPROF_PORT")]
    port: u16,

    /// Bind host; any non-loopback host opens the endpoint to all peers
    #[arg(long, default_value = DEFAULT_HOST, env = "RTPROF_HOST")]
    host: String,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(Env::default().default_filter_or(log_level)).init();

    let config = ControllerConfig::new(Duration::from_secs(cli.interval_secs), cli.port)
        .with_host(cli.host);

    run(config).await
}

#[cfg(unix)]
async fn run(config: ControllerConfig) -> Result<()> {
    use rtprof::ProfilerController;

    let controller = ProfilerController::cpu();
    controller
        .start_with(config)
        .await
        .context("Failed to start profiler")?;

    if let Some(addr) = controller.local_addr().await {
        println!("Serving profile on http://{} (Ctrl-C to stop)", addr);
    }

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl-C")?;

    info!("Shutting down");
    if let Some(report) = controller.stop().await.context("Failed to stop profiler")? {
        println!(
            "Windows: {} merged, {} failed ({} total)",
            report.merged, report.failed, report.ticks
        );
    }

    Ok(())
}

#[cfg(not(unix))]
async fn run(_config: ControllerConfig) -> Result<()> {
    anyhow::bail!("CPU sampling is only supported on unix targets")
}
