// mysqlbackup/src/backup/report.rs
use chrono::{DateTime, Local};
use std::fmt::Write;

use crate::config::AppConfig;
use crate::errors::BackupError;

/// Final result for one database's pipeline.
#[derive(Debug)]
pub enum BackupOutcome {
    Success { remote_key: String },
    Failure { error: BackupError },
}

/// One database's entry in the run report: the outcome plus any
/// best-effort cleanup diagnostics that did not change it.
#[derive(Debug)]
pub struct DatabaseReport {
    pub database: String,
    pub outcome: BackupOutcome,
    pub diagnostics: Vec<String>,
}

impl DatabaseReport {
    pub fn success(database: &str, remote_key: String) -> Self {
        Self {
            database: database.to_string(),
            outcome: BackupOutcome::Success { remote_key },
            diagnostics: Vec::new(),
        }
    }

    pub fn failure(database: &str, error: BackupError) -> Self {
        Self {
            database: database.to_string(),
            outcome: BackupOutcome::Failure { error },
            diagnostics: Vec::new(),
        }
    }

    pub fn add_diagnostic(&mut self, note: String) {
        self.diagnostics.push(note);
    }

    pub fn is_success(&self) -> bool {
        matches!(self.outcome, BackupOutcome::Success { .. })
    }
}

/// Accumulates per-database entries for one run; the orchestrator owns it
/// and threads it through the loop instead of mutating shared state.
pub struct RunReportBuilder {
    started_at: DateTime<Local>,
    entries: Vec<DatabaseReport>,
}

impl RunReportBuilder {
    pub fn new() -> Self {
        Self {
            started_at: Local::now(),
            entries: Vec::new(),
        }
    }

    pub fn record(&mut self, entry: DatabaseReport) {
        self.entries.push(entry);
    }

    pub fn finish(self) -> RunReport {
        RunReport {
            started_at: self.started_at,
            finished_at: Local::now(),
            entries: self.entries,
        }
    }
}

/// Aggregate record of one orchestration pass across all configured
/// databases. Handed to the notifier once and then discarded.
pub struct RunReport {
    pub started_at: DateTime<Local>,
    pub finished_at: DateTime<Local>,
    pub entries: Vec<DatabaseReport>,
}

impl RunReport {
    pub fn success_count(&self) -> usize {
        self.entries.iter().filter(|e| e.is_success()).count()
    }

    pub fn failure_count(&self) -> usize {
        self.entries.len() - self.success_count()
    }

    pub fn is_error(&self) -> bool {
        self.failure_count() > 0
    }

    pub fn subject(&self) -> String {
        if self.is_error() {
            format!("Backup finished with {} error(s)", self.failure_count())
        } else {
            "Backup completed".to_string()
        }
    }

    /// Renders the plain-text email body.
    pub fn render(&self, config: &AppConfig) -> String {
        let mut body = String::new();
        let duration = self.finished_at.signed_duration_since(self.started_at);

        let _ = writeln!(body, "MySQL Backup Report");
        let _ = writeln!(body, "===================");
        let _ = writeln!(
            body,
            "Started: {}",
            self.started_at.format("%Y-%m-%d %H:%M:%S")
        );
        let _ = writeln!(body, "Duration: {}s", duration.num_seconds());
        let _ = writeln!(body, "Databases processed: {}", self.entries.len());
        let _ = writeln!(body, "Succeeded: {}", self.success_count());
        let _ = writeln!(body, "Failed: {}", self.failure_count());
        let _ = writeln!(body);
        let _ = writeln!(body, "Details:");

        for entry in &self.entries {
            match &entry.outcome {
                BackupOutcome::Success { remote_key } => {
                    let _ = writeln!(body, "✅ {}: {}", entry.database, remote_key);
                }
                BackupOutcome::Failure { error } => {
                    let _ = writeln!(body, "❌ {}: {}", entry.database, error);
                }
            }
            for note in &entry.diagnostics {
                let _ = writeln!(body, "   ⚠ {note}");
            }
        }

        let _ = writeln!(body);
        let _ = writeln!(body, "Settings:");
        let _ = writeln!(body, "- S3 bucket: {}", config.storage.bucket_name);
        let _ = writeln!(body, "- Retention: {} days", config.backup.retention_days);
        let _ = writeln!(
            body,
            "- Local directory: {}",
            config.backup.local_dir.display()
        );

        body
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{BackupSettings, EmailConfig, MysqlConfig, StorageConfig};
    use std::path::PathBuf;
    use std::time::Duration;

    fn test_config(databases: &[&str], local_dir: PathBuf) -> AppConfig {
        AppConfig {
            mysql: MysqlConfig {
                host: "localhost".to_string(),
                port: 3306,
                user: "backup".to_string(),
                password: "secret".to_string(),
                databases: databases.iter().map(|db| db.to_string()).collect(),
            },
            storage: StorageConfig {
                bucket_name: "prod-backups".to_string(),
                region: "us-east-1".to_string(),
                endpoint_url: None,
                access_key_id: None,
                secret_access_key: None,
            },
            backup: BackupSettings {
                local_dir,
                retention_days: 30,
                dump_timeout: Duration::from_secs(60),
            },
            email: EmailConfig {
                smtp_server: "smtp.example.com".to_string(),
                smtp_port: 587,
                user: "ops@example.com".to_string(),
                password: "mailpass".to_string(),
                notification_email: "alerts@example.com".to_string(),
            },
        }
    }

    fn sample_report() -> RunReport {
        let mut builder = RunReportBuilder::new();
        builder.record(DatabaseReport::success(
            "orders",
            "backups/orders/orders_20240301_130509.sql.gz".to_string(),
        ));
        let mut failed = DatabaseReport::failure(
            "users",
            BackupError::UploadFailed {
                key: "backups/users/users_20240301_130512.sql.gz".to_string(),
                detail: "connection reset".to_string(),
            },
        );
        failed.add_diagnostic("cleanup skipped".to_string());
        builder.record(failed);
        builder.finish()
    }

    #[test]
    fn test_counts_and_error_flag() {
        let report = sample_report();
        assert_eq!(report.success_count(), 1);
        assert_eq!(report.failure_count(), 1);
        assert!(report.is_error());
        assert_eq!(report.subject(), "Backup finished with 1 error(s)");
    }

    #[test]
    fn test_all_success_subject() {
        let mut builder = RunReportBuilder::new();
        builder.record(DatabaseReport::success("orders", "k".to_string()));
        let report = builder.finish();
        assert!(!report.is_error());
        assert_eq!(report.subject(), "Backup completed");
    }

    #[test]
    fn test_render_lists_every_database_and_settings() {
        let report = sample_report();
        let config = test_config(&["orders", "users"], PathBuf::from("/tmp/mysql_backups"));
        let body = report.render(&config);

        assert!(body.contains("Databases processed: 2"));
        assert!(body.contains("✅ orders: backups/orders/orders_20240301_130509.sql.gz"));
        assert!(body.contains("❌ users:"));
        assert!(body.contains("connection reset"));
        assert!(body.contains("⚠ cleanup skipped"));
        assert!(body.contains("- S3 bucket: prod-backups"));
        assert!(body.contains("- Retention: 30 days"));
    }
}
