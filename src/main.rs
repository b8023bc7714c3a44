//! Backup clerk
//!
//! Keeps a local mirror of managed database backups and prunes copies the
//! provider no longer knows about.

// backupclerk/src/main.rs
mod catalog;
mod config;
mod errors;
mod export;
mod mirror;
mod remote;
mod sync;
#[cfg(test)]
mod test_support;
mod utils;

use anyhow::{Context, Result};
use config::AppConfig;
use remote::ScalewayClient;
use std::env;
use std::path::PathBuf;
use std::process::ExitCode;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

const DEFAULT_CONFIG_PATH: &str = "config.json";

#[tokio::main]
async fn main() -> ExitCode {
    utils::logging::init_tracing();
    match run_app().await {
        Ok(_) => ExitCode::SUCCESS,
        Err(e) => {
            error!("❌ Error: {:?}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run_app() -> Result<()> {
    dotenv::dotenv().ok();

    let config_path = env::var("CLERK_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_PATH));
    let app_config = AppConfig::load(&config_path)
        .context("The clerk is lost: invalid or missing configuration")?;

    let choice = env::args()
        .nth(1)
        .map(|arg| arg.trim().to_string())
        .unwrap_or_else(|| "run".to_string());

    let client = ScalewayClient::new(&app_config.api).context("Failed to build API client")?;
    info!(
        api_url = %app_config.api.api_url,
        access_key = app_config.api.access_key.as_deref().unwrap_or("-"),
        organization_id = app_config.api.organization_id.as_deref().unwrap_or("-"),
        "API client configured"
    );

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        utils::shutdown::shutdown_signal().await;
        info!("shutdown signal received, finishing current step");
        on_signal.cancel();
    });

    match choice.as_str() {
        "run" => sync::run_sync_flow(&client, &app_config.sync, cancel).await,
        "once" => {
            let summary = sync::run_once(&client, &app_config.sync, &cancel).await?;
            if summary.failed > 0 || summary.instances_skipped > 0 {
                info!(
                    failed = summary.failed,
                    skipped = summary.instances_skipped,
                    "pass finished with errors, see log above"
                );
            }
            Ok(())
        }
        _ => {
            anyhow::bail!("Invalid command {:?}. Use 'run' (default) or 'once'.", choice);
        }
    }
}
