// mysqlbackup/src/backup/s3_store.rs
use anyhow::Context;
use async_trait::async_trait;
use aws_sdk_s3 as s3;
use aws_smithy_types::error::display::DisplayErrorContext;
use chrono::{DateTime, Local, Utc};
use s3::config::Region;
use s3::primitives::ByteStream;
use s3::types::{Tag, Tagging};
use std::path::Path;
use std::time::Duration;

use crate::config::StorageConfig;
use crate::errors::{BackupError, Result};

/// All backup objects live under this prefix, one folder per database.
pub(crate) const REMOTE_PREFIX: &str = "backups";

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const OPERATION_TIMEOUT: Duration = Duration::from_secs(900);

/// One object in the remote store, as seen by a listing.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteObject {
    pub key: String,
    pub last_modified: DateTime<Utc>,
}

/// Blob-store operations the backup pipeline needs.
#[async_trait]
pub trait RemoteStore {
    /// Transfers a local file and returns the remote key it was stored under.
    async fn upload(&self, local_file: &Path, database: &str) -> Result<String>;

    /// Lists every object under `prefix` as one finite sequence.
    async fn list_by_prefix(&self, prefix: &str) -> Result<Vec<RemoteObject>>;

    /// Deletes `key`. Deleting a key that no longer exists is not an error.
    async fn delete(&self, key: &str) -> Result<()>;
}

pub(crate) fn object_key(database: &str, file_name: &str) -> String {
    format!("{REMOTE_PREFIX}/{database}/{file_name}")
}

pub(crate) fn database_prefix(database: &str) -> String {
    format!("{REMOTE_PREFIX}/{database}/")
}

/// Remote store backed by an S3-compatible object storage service.
pub struct S3BackupStore {
    client: s3::Client,
    bucket: String,
}

impl S3BackupStore {
    /// Builds the client and verifies the target bucket is reachable.
    pub async fn connect(storage: &StorageConfig) -> anyhow::Result<Self> {
        let timeouts = aws_config::timeout::TimeoutConfig::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .operation_timeout(OPERATION_TIMEOUT)
            .build();

        let mut loader = aws_config::defaults(s3::config::BehaviorVersion::latest())
            .region(Region::new(storage.region.clone()))
            .timeout_config(timeouts);

        if let Some(endpoint) = &storage.endpoint_url {
            loader = loader.endpoint_url(endpoint);
        }
        if let (Some(key_id), Some(secret)) = (&storage.access_key_id, &storage.secret_access_key)
        {
            loader = loader.credentials_provider(s3::config::Credentials::new(
                key_id, secret, None, // session_token
                None, // expiry
                "Static",
            ));
        }

        let sdk_config = loader.load().await;
        let client = s3::Client::new(&sdk_config);

        client
            .head_bucket()
            .bucket(&storage.bucket_name)
            .send()
            .await
            .with_context(|| {
                format!(
                    "S3 bucket `{}` is not reachable; check credentials, region and endpoint",
                    storage.bucket_name
                )
            })?;
        tracing::info!(bucket = %storage.bucket_name, "Target bucket is accessible");

        Ok(Self {
            client,
            bucket: storage.bucket_name.clone(),
        })
    }

    async fn tag_object(&self, key: &str, database: &str) -> anyhow::Result<()> {
        let tagging = Tagging::builder()
            .tag_set(Tag::builder().key("Type").value("mysql_backup").build()?)
            .tag_set(Tag::builder().key("Database").value(database).build()?)
            .tag_set(
                Tag::builder()
                    .key("Date")
                    .value(Local::now().format("%Y-%m-%d").to_string())
                    .build()?,
            )
            .build()?;

        self.client
            .put_object_tagging()
            .bucket(&self.bucket)
            .key(key)
            .tagging(tagging)
            .send()
            .await?;
        Ok(())
    }
}

#[async_trait]
impl RemoteStore for S3BackupStore {
    async fn upload(&self, local_file: &Path, database: &str) -> Result<String> {
        let file_name = local_file
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| BackupError::UploadFailed {
                key: database_prefix(database),
                detail: format!("dump path has no file name: {}", local_file.display()),
            })?;
        let key = object_key(database, file_name);

        tracing::info!(file = %local_file.display(), bucket = %self.bucket, key = %key, "Uploading backup");

        let body = ByteStream::from_path(local_file)
            .await
            .map_err(|e| BackupError::UploadFailed {
                key: key.clone(),
                detail: format!("failed to read {}: {e}", local_file.display()),
            })?;

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(&key)
            .body(body)
            .send()
            .await
            .map_err(|e| BackupError::UploadFailed {
                key: key.clone(),
                detail: DisplayErrorContext(&e).to_string(),
            })?;

        // Tags are organizational metadata; a tagging failure must not fail
        // an upload that already landed.
        if let Err(e) = self.tag_object(&key, database).await {
            tracing::warn!(key = %key, error = %e, "Failed to tag uploaded backup");
        }

        tracing::info!(key = %key, "Upload complete");
        Ok(key)
    }

    async fn list_by_prefix(&self, prefix: &str) -> Result<Vec<RemoteObject>> {
        let mut objects = Vec::new();
        let mut continuation: Option<String> = None;

        loop {
            let response = self
                .client
                .list_objects_v2()
                .bucket(&self.bucket)
                .prefix(prefix)
                .set_continuation_token(continuation.take())
                .send()
                .await
                .map_err(|e| BackupError::ListFailed {
                    prefix: prefix.to_string(),
                    detail: DisplayErrorContext(&e).to_string(),
                })?;

            for object in response.contents() {
                let (Some(key), Some(last_modified)) = (object.key(), object.last_modified())
                else {
                    continue;
                };
                let Some(last_modified) = to_utc_datetime(last_modified) else {
                    tracing::warn!(key = %key, "Skipping object with unrepresentable timestamp");
                    continue;
                };
                objects.push(RemoteObject {
                    key: key.to_string(),
                    last_modified,
                });
            }

            match response.next_continuation_token() {
                Some(token) if response.is_truncated() == Some(true) => {
                    continuation = Some(token.to_string());
                }
                _ => break,
            }
        }

        Ok(objects)
    }

    async fn delete(&self, key: &str) -> Result<()> {
        // S3 DeleteObject succeeds on a missing key, so retries and repeated
        // cleanup passes are idempotent.
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map(|_| ())
            .map_err(|e| BackupError::DeleteFailed {
                key: key.to_string(),
                detail: DisplayErrorContext(&e).to_string(),
            })
    }
}

fn to_utc_datetime(ts: &aws_smithy_types::DateTime) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp(ts.secs(), ts.subsec_nanos())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_object_key_layout() {
        assert_eq!(
            object_key("orders", "orders_20240301_130509.sql.gz"),
            "backups/orders/orders_20240301_130509.sql.gz"
        );
    }

    #[test]
    fn test_database_prefix_scopes_one_database() {
        assert_eq!(database_prefix("orders"), "backups/orders/");
        assert!(object_key("orders", "x.sql.gz").starts_with(&database_prefix("orders")));
        assert!(!object_key("orders_old", "x.sql.gz").starts_with(&database_prefix("orders")));
    }

    #[test]
    fn test_to_utc_datetime_conversion() {
        let ts = aws_smithy_types::DateTime::from_secs(1_709_251_200); // 2024-03-01T00:00:00Z
        let converted = to_utc_datetime(&ts).expect("timestamp in range");
        assert_eq!(converted.to_rfc3339(), "2024-03-01T00:00:00+00:00");
    }
}
