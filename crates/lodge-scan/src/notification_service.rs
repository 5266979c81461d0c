use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::{Local, NaiveDate, NaiveDateTime};
use notification_services::{EmailSettings, NotificationError};
use reservation_site::format_date_for_display;
use tracing::{error, info};

use crate::config::CheckerConfig;
use crate::scan_types::{ConsecutivePair, DatePair};

/// Trait for email service implementations
#[async_trait::async_trait]
pub trait EmailService: Send + Sync {
    /// Sends one plain-text message to the configured recipient
    async fn send_email(&self, subject: &str, body: &str) -> Result<(), NotificationError>;
}

/// Formats availability alerts and hands them to an [`EmailService`].
pub struct Notifier {
    settings: EmailSettings,
    base_url: String,
    adults: u32,
    children: u32,
    email_service: Arc<dyn EmailService>,
}

impl Notifier {
    /// Takes the email settings and booking link parameters from `config`
    pub fn new(config: &CheckerConfig, email_service: Arc<dyn EmailService>) -> Self {
        Self {
            settings: config.email.clone(),
            base_url: config.urls.base_url.clone(),
            adults: config.adults,
            children: config.children,
            email_service,
        }
    }

    /// Emails an alert for `dates`.
    ///
    /// Does nothing when email is disabled or there are no dates. Missing
    /// credentials are logged and returned as an error without sending.
    pub async fn notify(
        &self,
        dates: &BTreeSet<NaiveDate>,
        pairs: &[ConsecutivePair],
    ) -> Result<(), NotificationError> {
        if !self.settings.enabled {
            info!("Email notifications are disabled");
            return Ok(());
        }

        if dates.is_empty() {
            info!("No available dates to notify about");
            return Ok(());
        }

        if !self.settings.has_credentials() {
            error!("Email credentials are not configured properly in config.json");
            return Err(NotificationError::MissingCredentials);
        }

        let (subject, body) = self.compose(dates, pairs, Local::now().naive_local());
        info!("Sending availability alert: {}", subject);
        self.email_service.send_email(&subject, &body).await
    }

    /// Subject and plain-text body of an alert.
    pub fn compose(
        &self,
        dates: &BTreeSet<NaiveDate>,
        pairs: &[ConsecutivePair],
        generated_at: NaiveDateTime,
    ) -> (String, String) {
        let subject = if pairs.is_empty() {
            self.settings.single_day_subject.clone()
        } else {
            self.settings.consecutive_subject.clone()
        };

        let mut body = String::from("Yosemite Valley Lodge Availability Alert\n\n");

        if !pairs.is_empty() {
            body.push_str("Consecutive weekend days available:\n");
            for (first, second) in pairs {
                body.push_str(&format!(
                    "* {} - {}\n",
                    format_date_for_display(*first),
                    format_date_for_display(*second)
                ));
            }
            body.push('\n');
        }

        body.push_str("All available weekend days:\n");
        for date in dates {
            body.push_str(&format!("* {}\n", format_date_for_display(*date)));
        }

        body.push_str("\nDirect booking links:\n");
        for date in dates {
            let url = DatePair::new(*date)
                .search_query(self.adults, self.children)
                .url(&self.base_url);
            body.push_str(&format!("* {}: {}\n", format_date_for_display(*date), url));
        }

        body.push_str(&format!(
            "\nThis alert was generated on {}\n",
            generated_at.format("%Y-%m-%d %H:%M:%S")
        ));

        (subject, body)
    }
}
