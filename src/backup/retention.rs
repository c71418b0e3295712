// mysqlbackup/src/backup/retention.rs
use chrono::{DateTime, Duration, Utc};

use super::s3_store::RemoteObject;

/// Selects the remote objects whose age exceeds the retention window.
///
/// An object is expired iff `now - last_modified > retention_days`; an
/// object exactly at the boundary is retained, so a run started exactly
/// `retention_days` after an upload never deletes it on clock skew alone.
/// Pure policy: issuing the deletes is the orchestrator's job.
pub fn select_expired(
    objects: &[RemoteObject],
    retention_days: i64,
    now: DateTime<Utc>,
) -> Vec<String> {
    let cutoff = now - Duration::days(retention_days);
    objects
        .iter()
        .filter(|object| object.last_modified < cutoff)
        .map(|object| object.key.clone())
        .collect()
}
