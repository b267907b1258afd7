//! Email delivery over SMTP via lettre.
//!
//! Order emails are plain text. Without SMTP configuration the service
//! logs each message instead of sending it, so local development and tests
//! need no mail server.

use lettre::{
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
    message::{Mailbox, header::ContentType},
    transport::smtp::{Error as SmtpError, authentication::Credentials},
};
use muscle_shop_core::Email;
use secrecy::ExposeSecret;
use thiserror::Error;

use crate::config::EmailConfig;

/// Errors that can occur when sending email.
#[derive(Debug, Error)]
pub enum MailError {
    /// SMTP transport error.
    #[error("SMTP error: {0}")]
    Smtp(#[from] SmtpError),

    /// Failed to build email message.
    #[error("Failed to build message: {0}")]
    MessageBuild(#[from] lettre::error::Error),

    /// Invalid email address.
    #[error("Invalid email address: {0}")]
    InvalidAddress(String),
}

#[derive(Clone)]
enum Transport {
    Smtp {
        mailer: AsyncSmtpTransport<Tokio1Executor>,
        from: Mailbox,
    },
    Log,
}

/// Email service for sending transactional emails.
#[derive(Clone)]
pub struct EmailService {
    transport: Transport,
}

impl EmailService {
    /// Create an SMTP-backed service. `sender_name` is shown as the display
    /// name of the `From` address.
    ///
    /// # Errors
    ///
    /// Returns error if the SMTP relay cannot be configured or the sender
    /// address is invalid.
    pub fn smtp(config: &EmailConfig, sender_name: &str) -> Result<Self, MailError> {
        let credentials = Credentials::new(
            config.smtp_username.clone(),
            config.smtp_password.expose_secret().to_string(),
        );

        let mailer = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.smtp_host)?
            .port(config.smtp_port)
            .credentials(credentials)
            .build();

        let address = config
            .from_address
            .parse()
            .map_err(|_| MailError::InvalidAddress(config.from_address.clone()))?;

        Ok(Self {
            transport: Transport::Smtp {
                mailer,
                from: Mailbox::new(Some(sender_name.to_string()), address),
            },
        })
    }

    /// Create a service that only logs messages.
    #[must_use]
    pub const fn log_only() -> Self {
        Self {
            transport: Transport::Log,
        }
    }

    /// Pick SMTP when configured, logging otherwise.
    ///
    /// # Errors
    ///
    /// Returns error if SMTP is configured but invalid.
    pub fn from_config(config: Option<&EmailConfig>, sender_name: &str) -> Result<Self, MailError> {
        config.map_or_else(|| Ok(Self::log_only()), |c| Self::smtp(c, sender_name))
    }

    /// Whether messages actually leave the process.
    #[must_use]
    pub const fn is_smtp(&self) -> bool {
        matches!(self.transport, Transport::Smtp { .. })
    }

    /// Send a plain-text email.
    ///
    /// # Errors
    ///
    /// Returns error if the message cannot be built or delivered.
    pub async fn send_text(&self, to: &Email, subject: &str, body: &str) -> Result<(), MailError> {
        match &self.transport {
            Transport::Log => {
                tracing::info!(
                    to = %to,
                    subject = %subject,
                    "SMTP not configured, email logged instead of sent"
                );
                tracing::debug!(body = %body, "Unsent email body");
                Ok(())
            }
            Transport::Smtp { mailer, from } => {
                let email = Message::builder()
                    .from(from.clone())
                    .to(to
                        .as_str()
                        .parse()
                        .map_err(|_| MailError::InvalidAddress(to.to_string()))?)
                    .subject(subject)
                    .header(ContentType::TEXT_PLAIN)
                    .body(body.to_string())?;

                mailer.send(email).await?;

                tracing::info!(to = %to, subject = %subject, "Email sent successfully");
                Ok(())
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::{Arc, Mutex};

    use secrecy::SecretString;

    use super::*;

    #[tokio::test]
    async fn test_log_only_always_succeeds() {
        let service = EmailService::log_only();
        assert!(!service.is_smtp());

        let to = Email::parse("taro@example.jp").unwrap();
        assert!(service.send_text(&to, "件名", "本文").await.is_ok());
    }

    #[derive(Clone, Default)]
    struct CapturedLogs(Arc<Mutex<Vec<u8>>>);

    impl std::io::Write for CapturedLogs {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_log_only_keeps_body_out_of_info_logs() {
        let logs = CapturedLogs::default();
        let writer = logs.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::INFO)
            .with_ansi(false)
            .with_writer(move || writer.clone())
            .finish();
        let _guard = tracing::subscriber::set_default(subscriber);

        let to = Email::parse("taro@example.jp").unwrap();
        EmailService::log_only()
            .send_text(&to, "ご注文ありがとうございます", "東京都渋谷区神宮前1-2-3")
            .await
            .unwrap();

        let output = String::from_utf8(logs.0.lock().unwrap().clone()).unwrap();
        assert!(output.contains("ご注文ありがとうございます"));
        assert!(output.contains("taro@example.jp"));
        assert!(!output.contains("神宮前"));
    }

    #[test]
    fn test_from_config_without_smtp_logs() {
        let service = EmailService::from_config(None, "筋肉ショップ").unwrap();
        assert!(!service.is_smtp());
    }

    #[tokio::test]
    async fn test_smtp_rejects_bad_sender() {
        let config = EmailConfig {
            smtp_host: "smtp.mail.test".to_string(),
            smtp_port: 587,
            smtp_username: "shop".to_string(),
            smtp_password: SecretString::from("pw"),
            from_address: "not an address".to_string(),
        };
        assert!(matches!(
            EmailService::smtp(&config, "筋肉ショップ"),
            Err(MailError::InvalidAddress(_))
        ));
    }
}
