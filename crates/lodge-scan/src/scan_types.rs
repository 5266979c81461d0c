use std::collections::BTreeSet;

use chrono::{Datelike, Local, NaiveDate, NaiveDateTime, TimeDelta, Weekday};
use reservation_site::{SearchQuery, SiteError};
use serde::{Deserialize, Serialize};

/// Two adjacent available dates `(first, second)` with `second == first + 1 day`
pub type ConsecutivePair = (NaiveDate, NaiveDate);

/// A one-night stay to probe: check in on `check_in`, leave the next day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DatePair {
    check_in: NaiveDate,
    check_out: NaiveDate,
}

impl DatePair {
    /// One-night stay starting on `check_in`
    pub fn new(check_in: NaiveDate) -> Self {
        Self {
            check_in,
            check_out: check_in + TimeDelta::days(1),
        }
    }

    /// Arrival date
    pub fn check_in(&self) -> NaiveDate {
        self.check_in
    }

    /// Departure date, always the day after check-in
    pub fn check_out(&self) -> NaiveDate {
        self.check_out
    }

    /// Friday-to-Saturday night
    pub fn is_friday_night(&self) -> bool {
        self.check_in.weekday() == Weekday::Fri
    }

    /// Saturday-to-Sunday night
    pub fn is_saturday_night(&self) -> bool {
        self.check_in.weekday() == Weekday::Sat
    }

    /// Search query for this stay
    pub fn search_query(&self, adults: u32, children: u32) -> SearchQuery {
        SearchQuery {
            arrival: self.check_in,
            departure: self.check_out,
            adults,
            children,
        }
    }
}

/// Outcome of one complete probe pass, as persisted between runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckResult {
    /// Local time the pass finished; the load time for older files without one
    #[serde(default = "now")]
    pub timestamp: NaiveDateTime,
    /// Check-in dates the classifier judged available
    #[serde(default)]
    pub available_dates: BTreeSet<NaiveDate>,
    /// Adjacent pairs within `available_dates`
    #[serde(default)]
    pub consecutive_pairs: Vec<ConsecutivePair>,
}

fn now() -> NaiveDateTime {
    Local::now().naive_local()
}

impl CheckResult {
    /// Builds a result and derives its consecutive pairs
    pub fn new(timestamp: NaiveDateTime, available_dates: BTreeSet<NaiveDate>) -> Self {
        let consecutive_pairs = crate::find_consecutive_pairs(&available_dates);
        Self {
            timestamp,
            available_dates,
            consecutive_pairs,
        }
    }

    /// Empty result stamped with the current local time
    pub fn empty() -> Self {
        Self::new(now(), BTreeSet::new())
    }

    /// No date was available
    pub fn is_empty(&self) -> bool {
        self.available_dates.is_empty()
    }
}

/// What a check cycle produced after retries.
#[derive(Debug)]
pub enum CycleOutcome {
    /// A probe pass completed
    Completed(CheckResult),
    /// Every attempt failed
    Exhausted {
        /// Attempts made
        attempts: u32,
        /// Error of the final attempt
        last_error: ScanError,
    },
}

impl CycleOutcome {
    /// Result to act upon; an exhausted cycle counts as "nothing available"
    pub fn into_result(self) -> CheckResult {
        match self {
            CycleOutcome::Completed(result) => result,
            CycleOutcome::Exhausted { .. } => CheckResult::empty(),
        }
    }
}

/// Custom error type for availability checks
#[derive(thiserror::Error, Debug)]
pub enum ScanError {
    /// Network error
    #[error("Network error: {0}")]
    Network(String),

    /// Unexpected response from the booking site
    #[error("API error: {0}")]
    ApiError(String),

    /// Data format error
    #[error("Data format error: {0}")]
    DataFormat(String),

    /// WebDriver session or command failure
    #[error("Browser error: {0}")]
    Browser(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// A date given on the command line could not be parsed
    #[error("Invalid date format: {0}. Please use MM-DD-YYYY format.")]
    InvalidDate(String),

    /// File system error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Shutdown was requested while a check was running
    #[error("Check interrupted")]
    Interrupted,
}

impl ScanError {
    /// Whether retrying the cycle can help. Configuration errors are fatal.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, ScanError::ConfigError(_) | ScanError::Interrupted)
    }
}

impl From<SiteError> for ScanError {
    fn from(err: SiteError) -> Self {
        match err {
            SiteError::Http(e) => ScanError::Network(e.to_string()),
            SiteError::Status { status, url } => {
                ScanError::ApiError(format!("HTTP {} from {}", status, url))
            }
            SiteError::Widget(msg) => ScanError::DataFormat(msg),
        }
    }
}

impl From<reqwest::Error> for ScanError {
    fn from(err: reqwest::Error) -> Self {
        ScanError::Network(err.to_string())
    }
}
