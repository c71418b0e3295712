use sqlx::mysql::{MySqlConnectOptions, MySqlConnection};
use sqlx::Connection;

use crate::config::MysqlConfig;

/// Checks that the MySQL server is reachable with the configured
/// credentials before any dump is attempted.
pub async fn check_db_connection(mysql: &MysqlConfig) -> bool {
    let options = MySqlConnectOptions::new()
        .host(&mysql.host)
        .port(mysql.port)
        .username(&mysql.user)
        .password(&mysql.password);

    match MySqlConnection::connect_with(&options).await {
        Ok(mut conn) => {
            let reachable = match conn.ping().await {
                Ok(()) => {
                    tracing::info!(host = %mysql.host, port = mysql.port, "Successfully connected to MySQL server");
                    true
                }
                Err(e) => {
                    tracing::error!(host = %mysql.host, port = mysql.port, error = %e, "MySQL server did not answer ping");
                    false
                }
            };
            let _ = conn.close().await;
            reachable
        }
        Err(e) => {
            tracing::error!(host = %mysql.host, port = mysql.port, error = %e, "Failed to connect to MySQL server");
            false
        }
    }
}
