use serde::{Deserialize, Serialize};

/// Errors raised while preparing or delivering an email.
#[derive(Debug, thiserror::Error)]
pub enum NotificationError {
    /// Username or password is not configured.
    #[error("Email credentials are not configured")]
    MissingCredentials,

    /// A sender or recipient address could not be parsed.
    #[error("Invalid email address {0}")]
    InvalidAddress(String),

    /// The message could not be assembled.
    #[error("Failed to build message: {0}")]
    Message(String),

    /// Every delivery attempt failed.
    #[error("SMTP delivery failed: {0}")]
    Transport(String),
}

/// Email settings as stored under the `email` key of the configuration file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmailSettings {
    /// Whether alert emails are sent at all
    pub enabled: bool,
    /// SMTP server host name
    pub smtp_server: String,
    /// Submission port used for the STARTTLS attempt
    pub smtp_port: u16,
    /// SMTP login
    pub username: String,
    /// SMTP password (an app password for Gmail)
    pub password: String,
    /// Sender address, defaults to the username when empty
    pub from_address: String,
    /// Recipient address, defaults to the username when empty
    pub to_address: String,
    /// Subject used when consecutive weekend nights are available
    pub consecutive_subject: String,
    /// Subject used when only single nights are available
    pub single_day_subject: String,
}

impl Default for EmailSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            smtp_server: "smtp.gmail.com".to_string(),
            smtp_port: 587,
            username: String::new(),
            password: String::new(),
            from_address: String::new(),
            to_address: String::new(),
            consecutive_subject: "Consecutive Weekend Available at Yosemite Valley Lodge!"
                .to_string(),
            single_day_subject: "Weekend Day Available at Yosemite Valley Lodge".to_string(),
        }
    }
}

impl EmailSettings {
    /// Whether both username and password are present
    pub fn has_credentials(&self) -> bool {
        !self.username.is_empty() && !self.password.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_settings_fill_in_defaults() {
        let settings: EmailSettings =
            serde_json::from_str(r#"{"username": "me", "password": "secret"}"#).unwrap();

        assert!(settings.enabled);
        assert!(settings.has_credentials());
        assert_eq!(settings.smtp_server, "smtp.gmail.com");
        assert_eq!(settings.smtp_port, 587);
    }

    #[test]
    fn test_missing_password_is_not_credentials() {
        let settings = EmailSettings {
            username: "me".to_string(),
            ..EmailSettings::default()
        };
        assert!(!settings.has_credentials());
    }
}
