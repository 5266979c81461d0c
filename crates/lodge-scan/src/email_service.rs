use std::sync::Mutex;

use async_trait::async_trait;
use notification_services::{EmailSettings, NotificationError, SmtpMailer};
use tracing::info;

use crate::EmailService;

/// SMTP email service backed by the configured account
pub struct SmtpEmailService {
    settings: EmailSettings,
}

impl SmtpEmailService {
    /// Credentials are checked when an email is sent, not here.
    pub fn new(settings: EmailSettings) -> Self {
        Self { settings }
    }
}

#[async_trait]
impl EmailService for SmtpEmailService {
    async fn send_email(&self, subject: &str, body: &str) -> Result<(), NotificationError> {
        let mailer = SmtpMailer::new(&self.settings)?;
        mailer.send(subject, body).await
    }
}

/// Mock email service that records what would have been sent
#[derive(Default)]
pub struct MockEmailService {
    sent: Mutex<Vec<(String, String)>>,
}

impl MockEmailService {
    /// `(subject, body)` of every email so far
    pub fn sent(&self) -> Vec<(String, String)> {
        self.sent
            .lock()
            .map(|sent| sent.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl EmailService for MockEmailService {
    async fn send_email(&self, subject: &str, body: &str) -> Result<(), NotificationError> {
        info!("[MOCK EMAIL] Subject: {}", subject);
        info!("[MOCK EMAIL] Body:\n{}", body);

        if let Ok(mut sent) = self.sent.lock() {
            sent.push((subject.to_string(), body.to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_records_emails() {
        let mock = MockEmailService::default();
        mock.send_email("subject", "body").await.unwrap();

        assert_eq!(mock.sent(), vec![("subject".to_string(), "body".to_string())]);
    }

    #[tokio::test]
    async fn test_smtp_service_without_credentials() {
        let service = SmtpEmailService::new(EmailSettings::default());
        let err = service.send_email("subject", "body").await.unwrap_err();

        assert!(matches!(err, NotificationError::MissingCredentials));
    }
}
