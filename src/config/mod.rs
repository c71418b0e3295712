// mysqlbackup/src/config/mod.rs
use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

const DEFAULT_MYSQL_HOST: &str = "localhost";
const DEFAULT_MYSQL_PORT: u16 = 3306;
const DEFAULT_AWS_REGION: &str = "us-east-1";
const DEFAULT_LOCAL_DIR: &str = "/tmp/mysql_backups";
const DEFAULT_RETENTION_DAYS: i64 = 30;
const DEFAULT_DUMP_TIMEOUT_SECS: u64 = 3600;
const DEFAULT_SMTP_SERVER: &str = "smtp.gmail.com";
const DEFAULT_SMTP_PORT: u16 = 587;

// Structs for deserializing config.json
#[derive(Debug, Clone, Deserialize)]
pub struct JsonMysqlConfig {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub user: Option<String>,
    pub password: Option<String>,
    pub databases: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct JsonStorageConfig {
    pub bucket_name: Option<String>,
    pub region: Option<String>,
    pub endpoint_url: Option<String>,
    pub access_key_id: Option<String>,
    pub secret_access_key: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct JsonBackupConfig {
    pub local_dir: Option<PathBuf>,
    pub retention_days: Option<i64>,
    pub dump_timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct JsonEmailConfig {
    pub smtp_server: Option<String>,
    pub smtp_port: Option<u16>,
    pub user: Option<String>,
    pub password: Option<String>,
    pub notification_email: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawJsonConfig {
    pub mysql: Option<JsonMysqlConfig>,
    pub s3_storage: Option<JsonStorageConfig>,
    pub backup: Option<JsonBackupConfig>,
    pub email: Option<JsonEmailConfig>,
}

// Application's internal configuration structs
#[derive(Debug, Clone)]
pub struct MysqlConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub databases: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct StorageConfig {
    pub bucket_name: String,
    pub region: String,
    pub endpoint_url: Option<String>,
    pub access_key_id: Option<String>,
    pub secret_access_key: Option<String>,
}

#[derive(Debug, Clone)]
pub struct BackupSettings {
    pub local_dir: PathBuf,
    pub retention_days: i64,
    pub dump_timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct EmailConfig {
    pub smtp_server: String,
    pub smtp_port: u16,
    pub user: String,
    pub password: String,
    pub notification_email: String,
}

/// Immutable configuration for one backup run, read once at startup.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub mysql: MysqlConfig,
    pub storage: StorageConfig,
    pub backup: BackupSettings,
    pub email: EmailConfig,
}

impl AppConfig {
    pub fn load_from_json(config_path: &Path) -> Result<Self> {
        let config_content = fs::read_to_string(config_path)
            .with_context(|| format!("Failed to read config file at {}", config_path.display()))?;
        let raw: RawJsonConfig = serde_json::from_str(&config_content).with_context(|| {
            format!(
                "Failed to parse JSON from config file at {}",
                config_path.display()
            )
        })?;

        Ok(AppConfig {
            mysql: load_mysql_config(&raw)?,
            storage: load_storage_config(&raw)?,
            backup: load_backup_settings(&raw)?,
            email: load_email_config(&raw)?,
        })
    }
}

pub fn load_mysql_config(raw: &RawJsonConfig) -> Result<MysqlConfig> {
    let mysql = raw
        .mysql
        .as_ref()
        .context("`mysql` section must be present in config.json")?;

    let user = mysql
        .user
        .as_ref()
        .filter(|s| !s.is_empty())
        .context("`mysql.user` must be set in config.json")?
        .clone();
    let password = mysql
        .password
        .as_ref()
        .context("`mysql.password` must be set in config.json")?
        .clone();

    let databases = parse_database_list(&mysql.databases)?;
    if databases.is_empty() {
        anyhow::bail!("`mysql.databases` in config.json does not name any database");
    }

    Ok(MysqlConfig {
        host: mysql
            .host
            .clone()
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| DEFAULT_MYSQL_HOST.to_string()),
        port: mysql.port.unwrap_or(DEFAULT_MYSQL_PORT),
        user,
        password,
        databases,
    })
}

pub fn load_storage_config(raw: &RawJsonConfig) -> Result<StorageConfig> {
    let storage = raw
        .s3_storage
        .as_ref()
        .context("`s3_storage` section must be present in config.json")?;

    let bucket_name = storage
        .bucket_name
        .as_ref()
        .filter(|s| !s.is_empty())
        .context("`s3_storage.bucket_name` must be set in config.json")?
        .clone();

    let endpoint_url = storage.endpoint_url.clone().filter(|s| !s.is_empty());
    if let Some(endpoint) = &endpoint_url {
        Url::parse(endpoint)
            .with_context(|| format!("`s3_storage.endpoint_url` is not a valid URL: {endpoint}"))?;
    }

    // Static credentials must come as a pair; with neither set the SDK's
    // default provider chain is used.
    let access_key_id = storage.access_key_id.clone().filter(|s| !s.is_empty());
    let secret_access_key = storage.secret_access_key.clone().filter(|s| !s.is_empty());
    if access_key_id.is_some() != secret_access_key.is_some() {
        anyhow::bail!(
            "`s3_storage.access_key_id` and `s3_storage.secret_access_key` must be set together in config.json"
        );
    }

    Ok(StorageConfig {
        bucket_name,
        region: storage
            .region
            .clone()
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| DEFAULT_AWS_REGION.to_string()),
        endpoint_url,
        access_key_id,
        secret_access_key,
    })
}

pub fn load_backup_settings(raw: &RawJsonConfig) -> Result<BackupSettings> {
    let backup = raw.backup.as_ref();

    let retention_days = backup
        .and_then(|b| b.retention_days)
        .unwrap_or(DEFAULT_RETENTION_DAYS);
    if retention_days < 1 {
        anyhow::bail!(
            "`backup.retention_days` must be at least 1, got {retention_days}. A shorter window would delete backups as soon as they are uploaded."
        );
    }

    let local_dir = backup
        .and_then(|b| b.local_dir.clone())
        .unwrap_or_else(|| PathBuf::from(DEFAULT_LOCAL_DIR));
    if local_dir.as_os_str().is_empty() {
        anyhow::bail!("`backup.local_dir` cannot be empty in config.json");
    }

    Ok(BackupSettings {
        local_dir,
        retention_days,
        dump_timeout: Duration::from_secs(
            backup
                .and_then(|b| b.dump_timeout_secs)
                .unwrap_or(DEFAULT_DUMP_TIMEOUT_SECS),
        ),
    })
}

pub fn load_email_config(raw: &RawJsonConfig) -> Result<EmailConfig> {
    let email = raw
        .email
        .as_ref()
        .context("`email` section must be present in config.json")?;

    let user = email
        .user
        .as_ref()
        .filter(|s| !s.is_empty())
        .context("`email.user` must be set in config.json")?
        .clone();
    let password = email
        .password
        .as_ref()
        .context("`email.password` must be set in config.json")?
        .clone();
    let notification_email = email
        .notification_email
        .as_ref()
        .filter(|s| !s.is_empty())
        .context("`email.notification_email` must be set in config.json")?
        .clone();

    Ok(EmailConfig {
        smtp_server: email
            .smtp_server
            .clone()
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| DEFAULT_SMTP_SERVER.to_string()),
        smtp_port: email.smtp_port.unwrap_or(DEFAULT_SMTP_PORT),
        user,
        password,
        notification_email,
    })
}

/// Parses the `mysql.databases` configuration value.
///
/// Accepts either a JSON array of names or a single comma-separated string.
fn parse_database_list(databases: &Option<serde_json::Value>) -> Result<Vec<String>> {
    let value = databases
        .as_ref()
        .context("`mysql.databases` must be set in config.json")?;

    let names: Vec<String> = if value.is_array() {
        serde_json::from_value(value.clone())
            .context("Failed to parse `mysql.databases` as an array of names")?
    } else if let Some(s) = value.as_str() {
        s.split(',')
            .map(|name| name.trim().to_string())
            .filter(|name| !name.is_empty())
            .collect()
    } else {
        anyhow::bail!(
            "`mysql.databases` must be either an array of database names or a comma-separated string"
        );
    };

    for name in &names {
        if name.trim().is_empty()
            || name.contains(|c: char| !c.is_alphanumeric() && c != '_' && c != '-')
        {
            anyhow::bail!("Invalid database name in `mysql.databases`: {name:?}");
        }
    }

    Ok(names)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn raw_from(value: serde_json::Value) -> RawJsonConfig {
        serde_json::from_value(value).expect("raw config should deserialize")
    }

    #[test]
    fn test_parse_database_list_array() -> anyhow::Result<()> {
        let value = Some(json!(["orders", "users", "billing"]));
        let result = parse_database_list(&value)?;

        assert_eq!(
            result,
            vec![
                "orders".to_string(),
                "users".to_string(),
                "billing".to_string()
            ]
        );
        Ok(())
    }

    #[test]
    fn test_parse_database_list_comma_string() -> anyhow::Result<()> {
        let value = Some(json!("orders, users ,billing"));
        let result = parse_database_list(&value)?;

        assert_eq!(result, vec!["orders", "users", "billing"]);
        Ok(())
    }

    #[test]
    fn test_parse_database_list_rejects_bad_names() {
        let value = Some(json!(["orders", "users; DROP TABLE"]));
        assert!(parse_database_list(&value).is_err());

        let value = Some(json!(42));
        assert!(parse_database_list(&value).is_err());
    }

    #[test]
    fn test_load_full_config() -> anyhow::Result<()> {
        let raw = raw_from(json!({
            "mysql": {
                "host": "db.internal",
                "user": "backup",
                "password": "secret",
                "databases": ["orders", "users"]
            },
            "s3_storage": {
                "bucket_name": "prod-backups",
                "region": "eu-west-1",
                "access_key_id": "AKIA123",
                "secret_access_key": "shh"
            },
            "backup": {
                "local_dir": "/var/tmp/dumps",
                "retention_days": 14,
                "dump_timeout_secs": 600
            },
            "email": {
                "user": "ops@example.com",
                "password": "mailpass",
                "notification_email": "alerts@example.com"
            }
        }));

        let mysql = load_mysql_config(&raw)?;
        assert_eq!(mysql.host, "db.internal");
        assert_eq!(mysql.port, DEFAULT_MYSQL_PORT);
        assert_eq!(mysql.databases, vec!["orders", "users"]);

        let storage = load_storage_config(&raw)?;
        assert_eq!(storage.bucket_name, "prod-backups");
        assert_eq!(storage.region, "eu-west-1");
        assert_eq!(storage.access_key_id.as_deref(), Some("AKIA123"));

        let backup = load_backup_settings(&raw)?;
        assert_eq!(backup.retention_days, 14);
        assert_eq!(backup.local_dir, PathBuf::from("/var/tmp/dumps"));
        assert_eq!(backup.dump_timeout, Duration::from_secs(600));

        let email = load_email_config(&raw)?;
        assert_eq!(email.smtp_server, DEFAULT_SMTP_SERVER);
        assert_eq!(email.smtp_port, DEFAULT_SMTP_PORT);
        assert_eq!(email.notification_email, "alerts@example.com");
        Ok(())
    }

    #[test]
    fn test_backup_settings_defaults() -> anyhow::Result<()> {
        let raw = raw_from(json!({}));
        let backup = load_backup_settings(&raw)?;

        assert_eq!(backup.retention_days, DEFAULT_RETENTION_DAYS);
        assert_eq!(backup.local_dir, PathBuf::from(DEFAULT_LOCAL_DIR));
        assert_eq!(
            backup.dump_timeout,
            Duration::from_secs(DEFAULT_DUMP_TIMEOUT_SECS)
        );
        Ok(())
    }

    #[test]
    fn test_retention_days_must_be_positive() {
        let raw = raw_from(json!({ "backup": { "retention_days": 0 } }));
        assert!(load_backup_settings(&raw).is_err());
    }

    #[test]
    fn test_storage_rejects_half_a_credential_pair() {
        let raw = raw_from(json!({
            "s3_storage": {
                "bucket_name": "prod-backups",
                "access_key_id": "AKIA123"
            }
        }));
        assert!(load_storage_config(&raw).is_err());
    }

    #[test]
    fn test_storage_rejects_invalid_endpoint() {
        let raw = raw_from(json!({
            "s3_storage": {
                "bucket_name": "prod-backups",
                "endpoint_url": "not a url"
            }
        }));
        assert!(load_storage_config(&raw).is_err());
    }

    #[test]
    fn test_mysql_requires_databases() {
        let raw = raw_from(json!({
            "mysql": { "user": "backup", "password": "secret", "databases": [] }
        }));
        assert!(load_mysql_config(&raw).is_err());
    }
}
