// mysqlbackup/src/backup/db_dump.rs
use async_trait::async_trait;
use chrono::{DateTime, Local};
use flate2::write::GzEncoder;
use flate2::Compression;
use std::fs::{self, File};
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tokio::time::timeout;

use crate::config::{BackupSettings, MysqlConfig};
use crate::errors::{BackupError, Result};
use crate::utils::find_mysqldump_executable;

/// A compressed dump file on local disk, owned by the orchestrator until
/// it is uploaded and reclaimed.
#[derive(Debug)]
pub struct DumpArtifact {
    pub path: PathBuf,
    pub database: String,
    pub created_at: DateTime<Local>,
    pub compressed: bool,
}

impl DumpArtifact {
    /// Reclaims the local disk space held by this artifact. Safe to call
    /// on every pipeline exit path; a missing file is not an error.
    pub fn remove(&self) {
        remove_file_best_effort(&self.path);
    }
}

/// Produces a consistent point-in-time dump of one database.
#[async_trait]
pub trait DumpProducer {
    async fn produce_dump(&self, database: &str) -> Result<DumpArtifact>;
}

/// Dump producer backed by the external `mysqldump` utility.
pub struct MysqlDumper {
    mysqldump_path: PathBuf,
    mysql: MysqlConfig,
    scratch_dir: PathBuf,
    dump_timeout: Duration,
}

impl MysqlDumper {
    pub fn new(mysql: &MysqlConfig, settings: &BackupSettings) -> anyhow::Result<Self> {
        let mysqldump_path = find_mysqldump_executable()?;
        tracing::debug!(path = %mysqldump_path.display(), "Found mysqldump executable");

        Ok(Self {
            mysqldump_path,
            mysql: mysql.clone(),
            scratch_dir: settings.local_dir.clone(),
            dump_timeout: settings.dump_timeout,
        })
    }
}

#[async_trait]
impl DumpProducer for MysqlDumper {
    async fn produce_dump(&self, database: &str) -> Result<DumpArtifact> {
        let created_at = Local::now();
        let raw_path = self.scratch_dir.join(dump_file_name(database, &created_at));

        let dump_file = File::create(&raw_path).map_err(|e| BackupError::DumpFailed {
            database: database.to_string(),
            detail: format!("failed to create dump file {}: {e}", raw_path.display()),
        })?;

        tracing::info!(database = %database, file = %raw_path.display(), "Running mysqldump");

        // --single-transaction takes a consistent snapshot without locking
        // the tables; routines and triggers are part of the schema we want
        // back on restore.
        let child = Command::new(&self.mysqldump_path)
            .arg(format!("--host={}", self.mysql.host))
            .arg(format!("--port={}", self.mysql.port))
            .arg(format!("--user={}", self.mysql.user))
            .arg(format!("--password={}", self.mysql.password))
            .arg("--single-transaction")
            .arg("--routines")
            .arg("--triggers")
            .arg(database)
            .stdin(Stdio::null())
            .stdout(Stdio::from(dump_file))
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn();

        let child = match child {
            Ok(child) => child,
            Err(e) => {
                remove_file_best_effort(&raw_path);
                return Err(BackupError::DumpFailed {
                    database: database.to_string(),
                    detail: format!("failed to spawn mysqldump: {e}"),
                });
            }
        };

        let output = match timeout(self.dump_timeout, child.wait_with_output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                remove_file_best_effort(&raw_path);
                return Err(BackupError::DumpFailed {
                    database: database.to_string(),
                    detail: format!("failed to wait for mysqldump: {e}"),
                });
            }
            // Dropping the timed-out future kills the child via kill_on_drop.
            Err(_) => {
                remove_file_best_effort(&raw_path);
                return Err(BackupError::DumpFailed {
                    database: database.to_string(),
                    detail: format!("timed out after {}s", self.dump_timeout.as_secs()),
                });
            }
        };

        if !output.status.success() {
            remove_file_best_effort(&raw_path);
            return Err(BackupError::DumpFailed {
                database: database.to_string(),
                detail: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        let gz_path = compress_dump_file(&raw_path)?;

        Ok(DumpArtifact {
            path: gz_path,
            database: database.to_string(),
            created_at,
            compressed: true,
        })
    }
}

pub(crate) fn dump_file_name(database: &str, created_at: &DateTime<Local>) -> String {
    format!("{}_{}.sql", database, created_at.format("%Y%m%d_%H%M%S"))
}

/// Gzips a raw dump in place: `x.sql` becomes `x.sql.gz` and the raw file
/// is removed. On error neither file is left behind.
pub(crate) fn compress_dump_file(raw_path: &Path) -> Result<PathBuf> {
    let gz_path = raw_path.with_extension("sql.gz");

    if let Err(e) = gzip_file(raw_path, &gz_path) {
        remove_file_best_effort(&gz_path);
        remove_file_best_effort(raw_path);
        return Err(BackupError::CompressionFailed {
            file: raw_path.display().to_string(),
            detail: e.to_string(),
        });
    }

    if let Err(e) = fs::remove_file(raw_path) {
        tracing::warn!(file = %raw_path.display(), error = %e, "Could not remove raw dump after compression");
    }

    Ok(gz_path)
}

fn gzip_file(src: &Path, dst: &Path) -> std::io::Result<()> {
    let input = File::open(src)?;
    let output = File::create(dst)?;
    let mut encoder = GzEncoder::new(output, Compression::default());
    std::io::copy(&mut BufReader::new(input), &mut encoder)?;
    encoder.finish()?;
    Ok(())
}

fn remove_file_best_effort(path: &Path) {
    match fs::remove_file(path) {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => {
            tracing::warn!(file = %path.display(), error = %e, "Failed to remove local dump file");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use flate2::read::GzDecoder;
    use std::io::Read;

    #[test]
    fn test_dump_file_name_has_second_resolution_timestamp() {
        let created_at = Local
            .with_ymd_and_hms(2024, 3, 1, 13, 5, 9)
            .single()
            .expect("valid local timestamp");

        assert_eq!(
            dump_file_name("orders", &created_at),
            "orders_20240301_130509.sql"
        );
    }

    #[test]
    fn test_compress_dump_file_replaces_raw_with_gz() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let raw_path = dir.path().join("orders_20240301_130509.sql");
        fs::write(&raw_path, b"CREATE TABLE orders (id INT);\n")?;

        let gz_path = compress_dump_file(&raw_path)?;

        assert_eq!(gz_path, dir.path().join("orders_20240301_130509.sql.gz"));
        assert!(!raw_path.exists(), "raw dump should be removed");

        let mut decoded = String::new();
        GzDecoder::new(File::open(&gz_path)?).read_to_string(&mut decoded)?;
        assert_eq!(decoded, "CREATE TABLE orders (id INT);\n");
        Ok(())
    }

    #[test]
    fn test_compress_dump_file_missing_input_cleans_up() {
        let dir = tempfile::tempdir().expect("tempdir");
        let raw_path = dir.path().join("missing.sql");

        let err = compress_dump_file(&raw_path).expect_err("missing input should fail");
        assert!(matches!(err, BackupError::CompressionFailed { .. }));
        assert!(!dir.path().join("missing.sql.gz").exists());
    }

    #[test]
    fn test_artifact_remove_is_idempotent() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("users_20240301_130509.sql.gz");
        fs::write(&path, b"dump")?;

        let artifact = DumpArtifact {
            path: path.clone(),
            database: "users".to_string(),
            created_at: Local::now(),
            compressed: true,
        };

        artifact.remove();
        assert!(!path.exists());
        // A second removal of the already-missing file must not panic.
        artifact.remove();
        Ok(())
    }
}
