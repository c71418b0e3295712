mod logic;
pub(crate) mod db_dump;
pub(crate) mod report;
pub(crate) mod retention;
pub(crate) mod s3_store;

use anyhow::Result;

use crate::config::AppConfig;

pub use report::RunReport;

/// Public entry point for the backup process.
///
/// Runs one pass over every configured database and returns the aggregate
/// report. Only setup problems surface as `Err`; per-database failures are
/// recorded inside the report.
pub async fn run_backup_flow(app_config: &AppConfig) -> Result<RunReport> {
    logic::perform_backup_orchestration(app_config).await
}
