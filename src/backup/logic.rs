// mysqlbackup/src/backup/logic.rs
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use std::fs;

use crate::config::AppConfig;
use crate::notify::{EmailNotifier, Notifier};
use crate::utils::setting::check_db_connection;

use super::db_dump::{DumpProducer, MysqlDumper};
use super::report::{DatabaseReport, RunReport, RunReportBuilder};
use super::retention::select_expired;
use super::s3_store::{database_prefix, RemoteStore, S3BackupStore};

/// Sets up the collaborators and runs one backup pass.
///
/// Everything up to `execute_run` is setup: a failure here (bad scratch
/// dir, unreachable MySQL server or bucket, missing mysqldump, bad mail
/// address) aborts the run before any database is attempted.
pub async fn perform_backup_orchestration(config: &AppConfig) -> Result<RunReport> {
    tracing::info!(
        databases = config.mysql.databases.len(),
        "Starting MySQL backup run"
    );

    fs::create_dir_all(&config.backup.local_dir).with_context(|| {
        format!(
            "Failed to create local backup directory {}",
            config.backup.local_dir.display()
        )
    })?;

    if !check_db_connection(&config.mysql).await {
        anyhow::bail!(
            "Cannot proceed with backup, MySQL server {}:{} is unreachable",
            config.mysql.host,
            config.mysql.port
        );
    }

    let dumper = MysqlDumper::new(&config.mysql, &config.backup)?;
    let store = S3BackupStore::connect(&config.storage).await?;
    let notifier = EmailNotifier::new(&config.email)?;

    Ok(execute_run(&dumper, &store, &notifier, config).await)
}

/// One orchestration pass: every configured database in order, one report,
/// one notification. A database failing at any step never prevents the
/// remaining databases from being attempted.
pub(crate) async fn execute_run<D, S, N>(
    dumper: &D,
    store: &S,
    notifier: &N,
    config: &AppConfig,
) -> RunReport
where
    D: DumpProducer,
    S: RemoteStore,
    N: Notifier,
{
    let mut builder = RunReportBuilder::new();
    // One cutoff for the whole run so every database sees the same policy.
    let now = Utc::now();

    // Sequential on purpose: one artifact resident on local disk at a time,
    // one consistent-snapshot dump against the server at a time.
    for database in &config.mysql.databases {
        let entry = backup_single_database(
            dumper,
            store,
            database,
            config.backup.retention_days,
            now,
        )
        .await;
        builder.record(entry);
    }

    let report = builder.finish();
    tracing::info!(
        succeeded = report.success_count(),
        failed = report.failure_count(),
        "Backup run finished"
    );

    let body = report.render(config);
    if let Err(e) = notifier
        .notify(&report.subject(), &body, report.is_error())
        .await
    {
        tracing::warn!(error = %e, "Failed to send backup report notification");
    }

    report
}

async fn backup_single_database<D, S>(
    dumper: &D,
    store: &S,
    database: &str,
    retention_days: i64,
    now: DateTime<Utc>,
) -> DatabaseReport
where
    D: DumpProducer,
    S: RemoteStore,
{
    tracing::info!(database = %database, "Backing up database");

    let artifact = match dumper.produce_dump(database).await {
        Ok(artifact) => artifact,
        Err(e) => {
            tracing::error!(database = %database, error = %e, "Backup failed");
            return DatabaseReport::failure(database, e);
        }
    };
    tracing::debug!(
        database = %artifact.database,
        file = %artifact.path.display(),
        created_at = %artifact.created_at,
        compressed = artifact.compressed,
        "Dump ready"
    );

    let upload_result = store.upload(&artifact.path, database).await;
    // Reclaim the local artifact right after the upload attempt, success or
    // not, so at most one artifact is ever resident on local disk.
    artifact.remove();

    let remote_key = match upload_result {
        Ok(key) => key,
        Err(e) => {
            tracing::error!(database = %database, error = %e, "Backup failed");
            return DatabaseReport::failure(database, e);
        }
    };

    let mut entry = DatabaseReport::success(database, remote_key);
    cleanup_expired_backups(store, database, retention_days, now, &mut entry).await;
    entry
}

/// Retention cleanup for one database. Best effort: list and delete
/// failures are logged and recorded as diagnostics on the entry, but the
/// backup that already landed stays a success.
async fn cleanup_expired_backups<S: RemoteStore>(
    store: &S,
    database: &str,
    retention_days: i64,
    now: DateTime<Utc>,
    entry: &mut DatabaseReport,
) {
    let prefix = database_prefix(database);

    let objects = match store.list_by_prefix(&prefix).await {
        Ok(objects) => objects,
        Err(e) => {
            tracing::warn!(database = %database, error = %e, "Skipping retention cleanup");
            entry.add_diagnostic(e.to_string());
            return;
        }
    };

    let expired = select_expired(&objects, retention_days, now);
    if expired.is_empty() {
        return;
    }

    let mut deleted = 0usize;
    for key in &expired {
        match store.delete(key).await {
            Ok(()) => {
                tracing::info!(key = %key, "Expired backup removed");
                deleted += 1;
            }
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "Failed to remove expired backup");
                entry.add_diagnostic(e.to_string());
            }
        }
    }

    if deleted > 0 {
        tracing::info!(database = %database, deleted, "Retention cleanup complete");
    }
}
