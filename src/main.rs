//! MySQL Backup Lifecycle Manager
//!
//! Dumps configured databases, ships them to S3, enforces retention and
//! mails a run report

// mysqlbackup/src/main.rs
mod backup;
mod config;
mod errors;
mod notify;
mod utils;

use anyhow::{Context, Result};
use backup::RunReport;
use config::AppConfig;
use std::env;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Main entry point for the backup tool
#[tokio::main]
async fn main() -> ExitCode {
    init_tracing();

    match run_app().await {
        Ok(report) if !report.is_error() => {
            println!("✅ All database backups completed successfully.");
            ExitCode::SUCCESS
        }
        Ok(report) => {
            eprintln!(
                "❌ {} of {} database backups failed. Check the logs and the mailed report.",
                report.failure_count(),
                report.entries.len()
            );
            ExitCode::FAILURE
        }
        Err(e) => {
            eprintln!("❌ Error: {e:?}");
            ExitCode::FAILURE
        }
    }
}

async fn run_app() -> Result<RunReport> {
    // Config path may be given as the first CLI argument. Expects config.json
    // in the current directory otherwise.
    let config_path = env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("config.json"));
    let app_config = AppConfig::load_from_json(&config_path).with_context(|| {
        format!(
            "Failed to load application configuration from {}",
            config_path.display()
        )
    })?;

    backup::run_backup_flow(&app_config).await
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();
}
