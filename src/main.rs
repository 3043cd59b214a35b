mod config;
mod constants;
mod core_cli;
mod core_client;
mod core_sync;

use std::io::Write;

use anyhow::Result;
use clap::Parser;
use env_logger::{Builder, Env};
use log::info;

use crate::config::{log_config, Config};
use crate::core_cli::Cli;
use crate::core_sync::mirror::Mirror;

#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI arguments
    let args = Cli::parse();

    // Initialize the logger with a custom format
    let default_filter = if args.verbose { "debug" } else { "info" };
    Builder::from_env(Env::default().default_filter_or(default_filter))
        .format(|buf, record| {
            let timestamp = buf.timestamp();
            writeln!(
                buf,
                "[{}] [{}] {}",
                timestamp,
                record.level(),
                record.args()
            )
        })
        .init();

    // Load configuration from the TOML file
    let config = Config::load_from_file(&args.config)?;
    log_config(&config);

    let mut mirror = Mirror::new(config, args.dry_run, args.verbose).await?;
    let report = mirror.run().await?;

    info!(
        "Run finished: listed={} already={} downloaded={} failed={}",
        report.listed, report.already, report.downloaded, report.failed
    );

    Ok(())
}
