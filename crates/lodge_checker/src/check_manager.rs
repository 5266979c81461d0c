use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::{Datelike, Days, NaiveDate, Weekday};
use log::{error, info};
use notification_services::NotificationError;
use tokio::sync::watch;

use lodge_scan::{
    AvailabilityProbe, BrowserProbe, CheckExecutor, CheckerConfig, DatePair, EmailService,
    HttpProbe, Notifier, ProbeMethod, ResultStore, RunMode, ScanError, SmtpEmailService,
    check_single_pair, find_consecutive_pairs,
};

/// Days between today and the earliest Friday used for a test alert.
const TEST_EMAIL_LEAD_DAYS: u64 = 3;

/// Wires configuration, probe, notifier and result store together for the
/// command line entry points.
pub struct CheckManager {
    config: CheckerConfig,
    email_service: Arc<dyn EmailService>,
}

impl CheckManager {
    /// Manager sending real email through the configured SMTP account
    pub fn new(config: CheckerConfig) -> Self {
        let email_service = Arc::new(SmtpEmailService::new(config.email.clone()));
        Self::with_email_service(config, email_service)
    }

    /// Manager with a custom email service
    pub fn with_email_service(config: CheckerConfig, email_service: Arc<dyn EmailService>) -> Self {
        Self {
            config,
            email_service,
        }
    }

    fn notifier(&self, config: &CheckerConfig) -> Notifier {
        Notifier::new(config, self.email_service.clone())
    }

    /// Runs the scheduler until it finishes or Ctrl-C is pressed.
    pub async fn run(self, mode: RunMode) -> Result<(), ScanError> {
        let probe = build_probe(&self.config)?;
        let notifier = self.notifier(&self.config);
        let store = ResultStore::new(&self.config.results_file);

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_err() {
                return;
            }
            info!("Interrupt received, closing the browser session and stopping");
            let _ = shutdown_tx.send(true);

            if tokio::signal::ctrl_c().await.is_ok() {
                error!("Second interrupt received, exiting immediately");
                std::process::exit(130);
            }
        });

        let mut executor = CheckExecutor::new(self.config, probe, notifier, store, shutdown_rx, None);
        executor.run(mode).await
    }

    /// Sends a sample alert for a made-up Friday/Saturday opening.
    pub async fn send_test_email(&self, today: NaiveDate) -> Result<(), NotificationError> {
        let friday = test_email_friday(today);
        let saturday = friday + Days::new(1);
        info!("Sending test email for {} and {}", friday, saturday);

        let dates: BTreeSet<NaiveDate> = [friday, saturday].into_iter().collect();
        let pairs = find_consecutive_pairs(&dates);

        self.notifier(&self.config).notify(&dates, &pairs).await?;
        info!("Test email sent successfully");
        Ok(())
    }

    /// Checks one night and emails if it is available.
    ///
    /// Returns whether the night was available.
    pub async fn check_date(&self, date: NaiveDate) -> Result<bool, ScanError> {
        let mut config = self.config.clone();
        config.screenshots = true;

        let pair = DatePair::new(date);
        info!("Checking availability for {} to {}", pair.check_in(), pair.check_out());

        let mut probe = build_probe(&config)?;
        let verdict = check_single_pair(probe.as_mut(), &pair, &config.classifier).await?;

        if !verdict.is_available() {
            info!("No availability for {}", date);
            return Ok(false);
        }

        info!("Availability found for {}", date);
        let dates: BTreeSet<NaiveDate> = [date].into_iter().collect();
        let pairs = find_consecutive_pairs(&dates);
        if let Err(e) = self.notifier(&config).notify(&dates, &pairs).await {
            error!("Failed to send notification: {}", e);
        }
        Ok(true)
    }
}

/// Probe selected by the configured method
pub fn build_probe(config: &CheckerConfig) -> Result<Box<dyn AvailabilityProbe>, ScanError> {
    match config.probe_method() {
        ProbeMethod::Browser => {
            info!("Using browser probe ({})", config.browser);
            Ok(Box::new(BrowserProbe::new(config)?))
        }
        ProbeMethod::Http => {
            info!("Using HTTP probe");
            Ok(Box::new(HttpProbe::new(config)?))
        }
    }
}

/// First Friday at least three days after `today`.
pub fn test_email_friday(today: NaiveDate) -> NaiveDate {
    let earliest = today + Days::new(TEST_EMAIL_LEAD_DAYS);
    let offset = (7 + Weekday::Fri.num_days_from_monday()
        - earliest.weekday().num_days_from_monday())
        % 7;
    earliest + Days::new(u64::from(offset))
}
