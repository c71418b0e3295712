use thiserror::Error;

/// Errors raised while processing a single database's backup pipeline or
/// its best-effort maintenance steps.
///
/// `DumpFailed`, `CompressionFailed` and `UploadFailed` terminate the
/// pipeline for that database. `ListFailed`, `DeleteFailed` and
/// `NotifyFailed` are diagnostic only and never change an outcome.
#[derive(Error, Debug)]
pub enum BackupError {
    #[error("mysqldump for database `{database}` failed: {detail}")]
    DumpFailed { database: String, detail: String },

    #[error("Compression of `{file}` failed: {detail}")]
    CompressionFailed { file: String, detail: String },

    #[error("Upload of `{key}` failed: {detail}")]
    UploadFailed { key: String, detail: String },

    #[error("Listing remote backups under `{prefix}` failed: {detail}")]
    ListFailed { prefix: String, detail: String },

    #[error("Deleting remote backup `{key}` failed: {detail}")]
    DeleteFailed { key: String, detail: String },

    #[error("Notification delivery failed: {0}")]
    NotifyFailed(String),
}

pub type Result<T> = std::result::Result<T, BackupError>;
