// mysqlbackup/src/notify/mod.rs
use anyhow::Context;
use async_trait::async_trait;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};

use crate::config::EmailConfig;
use crate::errors::{BackupError, Result};

const SUBJECT_PREFIX: &str = "[MySQL Backup]";

/// Sends the run report to the configured recipient. Best effort: the
/// orchestrator logs a failed send and moves on, so a broken mail path
/// never masks the backup outcome.
#[async_trait]
pub trait Notifier {
    async fn notify(&self, subject: &str, body: &str, is_error: bool) -> Result<()>;
}

/// Notifier delivering one plain-text email per run over SMTP.
pub struct EmailNotifier {
    mailer: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
    to: Mailbox,
}

impl EmailNotifier {
    pub fn new(email: &EmailConfig) -> anyhow::Result<Self> {
        let from: Mailbox = email
            .user
            .parse()
            .with_context(|| format!("`email.user` is not a valid address: {}", email.user))?;
        let to: Mailbox = email.notification_email.parse().with_context(|| {
            format!(
                "`email.notification_email` is not a valid address: {}",
                email.notification_email
            )
        })?;

        let mailer = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&email.smtp_server)
            .with_context(|| format!("Failed to set up SMTP relay {}", email.smtp_server))?
            .port(email.smtp_port)
            .credentials(Credentials::new(email.user.clone(), email.password.clone()))
            .build();

        Ok(Self { mailer, from, to })
    }
}

#[async_trait]
impl Notifier for EmailNotifier {
    async fn notify(&self, subject: &str, body: &str, is_error: bool) -> Result<()> {
        let message = Message::builder()
            .from(self.from.clone())
            .to(self.to.clone())
            .subject(format_subject(subject))
            .body(decorate_body(body, is_error))
            .map_err(|e| BackupError::NotifyFailed(e.to_string()))?;

        self.mailer
            .send(message)
            .await
            .map_err(|e| BackupError::NotifyFailed(e.to_string()))?;

        tracing::info!(to = %self.to, "Backup report sent");
        Ok(())
    }
}

pub(crate) fn format_subject(subject: &str) -> String {
    format!("{SUBJECT_PREFIX} {subject}")
}

pub(crate) fn decorate_body(message: &str, is_error: bool) -> String {
    if is_error {
        format!("❌ Backup finished with errors:\n\n{message}")
    } else {
        format!("✅ Backup completed successfully:\n\n{message}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_subject_carries_the_prefix() {
        assert_eq!(
            format_subject("Backup completed"),
            "[MySQL Backup] Backup completed"
        );
    }

    #[test]
    fn test_body_banner_follows_error_flag() {
        let ok = decorate_body("report", false);
        assert!(ok.starts_with("✅"));
        assert!(ok.ends_with("report"));

        let err = decorate_body("report", true);
        assert!(err.starts_with("❌"));
        assert!(err.ends_with("report"));
    }
}
