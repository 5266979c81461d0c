use std::time::Duration;

use lettre::message::header::ContentType;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};

use crate::types::*;

/// Port used for the implicit-TLS fallback.
pub const IMPLICIT_TLS_PORT: u16 = 465;

const SMTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Sends plain-text emails through an authenticated SMTP relay.
#[derive(Debug, Clone)]
pub struct SmtpMailer {
    smtp_server: String,
    smtp_port: u16,
    username: String,
    password: String,
    from: String,
    to: String,
}

impl SmtpMailer {
    /// Creates a mailer from the configured settings.
    ///
    /// Fails with [`NotificationError::MissingCredentials`] when username or
    /// password is empty. Empty sender/recipient addresses fall back to the
    /// username.
    pub fn new(settings: &EmailSettings) -> Result<Self, NotificationError> {
        if !settings.has_credentials() {
            log::error!("Email credentials are not configured properly in config.json");
            log::info!("Please edit config.json and add your email username and password");
            return Err(NotificationError::MissingCredentials);
        }

        let (from, to) = if settings.from_address.is_empty() || settings.to_address.is_empty() {
            log::info!("Missing from_address or to_address, using username for both");
            (settings.username.clone(), settings.username.clone())
        } else {
            (settings.from_address.clone(), settings.to_address.clone())
        };

        Ok(Self {
            smtp_server: settings.smtp_server.clone(),
            smtp_port: settings.smtp_port,
            username: normalize_address(&settings.username),
            password: settings.password.clone(),
            from: normalize_address(&from),
            to: normalize_address(&to),
        })
    }

    /// Recipient address after normalization
    pub fn recipient(&self) -> &str {
        &self.to
    }

    /// Builds the plain-text message
    pub fn build_message(&self, subject: &str, body: &str) -> Result<Message, NotificationError> {
        let from: Mailbox = self
            .from
            .parse()
            .map_err(|_| NotificationError::InvalidAddress(self.from.clone()))?;
        let to: Mailbox = self
            .to
            .parse()
            .map_err(|_| NotificationError::InvalidAddress(self.to.clone()))?;

        Message::builder()
            .from(from)
            .to(to)
            .subject(subject)
            .header(ContentType::TEXT_PLAIN)
            .body(body.to_string())
            .map_err(|e| NotificationError::Message(e.to_string()))
    }

    /// Sends an email.
    ///
    /// Tries STARTTLS on the configured port first and falls back to an
    /// implicit-TLS connection on port 465.
    pub async fn send(&self, subject: &str, body: &str) -> Result<(), NotificationError> {
        let message = self.build_message(subject, body)?;
        let credentials = Credentials::new(self.username.clone(), self.password.clone());

        log::info!("Sending email from {} to {}", self.from, self.to);

        let starttls_error = match self.send_starttls(message.clone(), credentials.clone()).await {
            Ok(()) => {
                log::info!("Email sent successfully");
                return Ok(());
            }
            Err(e) => e,
        };
        log::error!("Failed to send email through STARTTLS: {}", starttls_error);

        log::info!("Trying implicit TLS connection on port {}...", IMPLICIT_TLS_PORT);
        match self.send_implicit_tls(message, credentials).await {
            Ok(()) => {
                log::info!("Email sent successfully via implicit TLS");
                Ok(())
            }
            Err(tls_error) => {
                log::error!("Implicit TLS method also failed: {}", tls_error);
                Err(NotificationError::Transport(format!(
                    "STARTTLS: {}; implicit TLS: {}",
                    starttls_error, tls_error
                )))
            }
        }
    }

    async fn send_starttls(
        &self,
        message: Message,
        credentials: Credentials,
    ) -> Result<(), lettre::transport::smtp::Error> {
        let transport = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&self.smtp_server)?
            .port(self.smtp_port)
            .credentials(credentials)
            .timeout(Some(SMTP_TIMEOUT))
            .build();

        log::info!("Logging in as {}", self.username);
        transport.send(message).await?;
        Ok(())
    }

    async fn send_implicit_tls(
        &self,
        message: Message,
        credentials: Credentials,
    ) -> Result<(), lettre::transport::smtp::Error> {
        let transport = AsyncSmtpTransport::<Tokio1Executor>::relay(&self.smtp_server)?
            .port(IMPLICIT_TLS_PORT)
            .credentials(credentials)
            .timeout(Some(SMTP_TIMEOUT))
            .build();

        log::info!("Logging in with implicit TLS as {}", self.username);
        transport.send(message).await?;
        Ok(())
    }
}

/// Appends `@gmail.com` to bare account names.
pub fn normalize_address(address: &str) -> String {
    if address.contains('@') {
        address.to_string()
    } else {
        let normalized = format!("{}@gmail.com", address);
        log::info!("Adding @gmail.com to {}: {}", address, normalized);
        normalized
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings() -> EmailSettings {
        EmailSettings {
            username: "lodge.watcher".to_string(),
            password: "app-password".to_string(),
            ..EmailSettings::default()
        }
    }

    #[test]
    fn test_normalize_address() {
        assert_eq!(normalize_address("someone"), "someone@gmail.com");
        assert_eq!(normalize_address("a@example.com"), "a@example.com");
    }

    #[test]
    fn test_mailer_requires_credentials() {
        let err = SmtpMailer::new(&EmailSettings::default()).unwrap_err();
        assert!(matches!(err, NotificationError::MissingCredentials));
    }

    #[test]
    fn test_addresses_fall_back_to_username() {
        let mailer = SmtpMailer::new(&settings()).unwrap();
        assert_eq!(mailer.recipient(), "lodge.watcher@gmail.com");
        assert_eq!(mailer.from, "lodge.watcher@gmail.com");
    }

    #[test]
    fn test_explicit_addresses_are_kept() {
        let mailer = SmtpMailer::new(&EmailSettings {
            from_address: "alerts@example.com".to_string(),
            to_address: "me@example.com".to_string(),
            ..settings()
        })
        .unwrap();
        assert_eq!(mailer.from, "alerts@example.com");
        assert_eq!(mailer.recipient(), "me@example.com");
    }

    #[test]
    fn test_build_message_sets_headers() {
        let mailer = SmtpMailer::new(&settings()).unwrap();
        let message = mailer.build_message("Lodge open", "body text").unwrap();
        let raw = String::from_utf8(message.formatted()).unwrap();

        assert!(raw.contains("Subject: Lodge open"));
        assert!(raw.contains("To: lodge.watcher@gmail.com"));
        assert!(raw.contains("text/plain"));
    }

    #[test]
    fn test_build_message_rejects_bad_address() {
        let mailer = SmtpMailer::new(&EmailSettings {
            from_address: "alerts@".to_string(),
            to_address: "me@example.com".to_string(),
            ..settings()
        })
        .unwrap();
        let err = mailer.build_message("s", "b").unwrap_err();
        assert!(matches!(err, NotificationError::InvalidAddress(_)));
    }
}
