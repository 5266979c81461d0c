use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use notification_services::EmailSettings;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{error, info, warn};

use crate::classifier::ClassifierRules;
use crate::scan_types::ScanError;

/// Overrides `email.username` when set.
pub const SMTP_USERNAME_ENV: &str = "LODGE_SMTP_USERNAME";
/// Overrides `email.password` when set.
pub const SMTP_PASSWORD_ENV: &str = "LODGE_SMTP_PASSWORD";

/// Booking site endpoints.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UrlSettings {
    /// Lodge page; search parameters are appended to it
    pub base_url: String,
    /// JSONP widget configuration endpoint
    pub widget_config_url: String,
}

impl Default for UrlSettings {
    fn default() -> Self {
        Self {
            base_url: "https://reservations.ahlsmsworld.com/Yosemite/Plan-Your-Trip/Accommodations/Yosemite-Valley-Lodge/".to_string(),
            widget_config_url: "https://reservations.ahlsmsworld.com/Yosemite/Search/GetWidgetConfigData".to_string(),
        }
    }
}

/// Which probe implementation fetches pages
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeMethod {
    /// Real browser driven over WebDriver
    Browser,
    /// Plain HTTP client
    Http,
}

/// Browsers the WebDriver probe knows how to configure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BrowserKind {
    /// Chrome through chromedriver
    Chrome,
    /// Firefox through geckodriver
    Firefox,
}

/// Checker configuration, stored as `config.json`.
///
/// Unknown keys are kept in `extra` so rewriting the file does not lose them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CheckerConfig {
    /// `"selenium"` or `"browser"` selects the browser probe, anything else HTTP
    pub method: String,
    /// `chrome` or `firefox`
    pub browser: String,
    /// Run the browser without a window
    pub headless: bool,
    /// Mean hours between cycles
    pub check_interval_hours: f64,
    /// Uniform jitter applied to the interval, in percent
    pub interval_variation_percent: f64,
    /// Look-ahead in 30-day months
    pub months_ahead: i64,
    /// Only weekend nights are ever probed; kept for file compatibility
    pub weekends_only: bool,
    /// Probe Friday check-ins
    pub check_friday_saturday: bool,
    /// Probe Saturday check-ins
    pub check_saturday_sunday: bool,
    /// Alert email settings
    pub email: EmailSettings,
    /// Booking site endpoints
    pub urls: UrlSettings,
    /// Attempts per cycle
    pub max_retries: u32,
    /// Pause between attempts
    pub retry_delay_seconds: u64,
    /// Adults in the party
    pub adults: u32,
    /// Children in the party
    pub children: u32,
    /// WebDriver server for the browser probe
    pub webdriver_url: String,
    /// Where the last completed result is kept
    pub results_file: PathBuf,
    /// Save browser screenshots of search and results pages
    pub screenshots: bool,
    /// Classifier phrase and keyword lists
    pub classifier: ClassifierRules,
    /// Keys this version does not know about
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Default for CheckerConfig {
    fn default() -> Self {
        Self {
            method: "selenium".to_string(),
            browser: "chrome".to_string(),
            headless: true,
            check_interval_hours: 3.0,
            interval_variation_percent: 20.0,
            months_ahead: 6,
            weekends_only: true,
            check_friday_saturday: true,
            check_saturday_sunday: true,
            email: EmailSettings::default(),
            urls: UrlSettings::default(),
            max_retries: 3,
            retry_delay_seconds: 60,
            adults: 1,
            children: 0,
            webdriver_url: "http://localhost:4444".to_string(),
            results_file: PathBuf::from("last_results.json"),
            screenshots: false,
            classifier: ClassifierRules::default(),
            extra: Map::new(),
        }
    }
}

impl CheckerConfig {
    /// Probe implementation selected by `method`
    pub fn probe_method(&self) -> ProbeMethod {
        match self.method.to_lowercase().as_str() {
            "selenium" | "browser" => ProbeMethod::Browser,
            _ => ProbeMethod::Http,
        }
    }

    /// Browser selected by `browser`; anything unknown is a configuration error
    pub fn browser_kind(&self) -> Result<BrowserKind, ScanError> {
        match self.browser.to_lowercase().as_str() {
            "chrome" => Ok(BrowserKind::Chrome),
            "firefox" => Ok(BrowserKind::Firefox),
            other => Err(ScanError::ConfigError(format!(
                "Unsupported browser: {}",
                other
            ))),
        }
    }

    /// Writes the configuration as pretty JSON
    pub fn write_to(&self, path: &Path) -> Result<(), ScanError> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        Ok(())
    }

    /// Applies SMTP credential overrides from the environment
    pub fn apply_env_overrides(&mut self) {
        if let Ok(username) = env::var(SMTP_USERNAME_ENV) {
            self.email.username = username;
        }
        if let Ok(password) = env::var(SMTP_PASSWORD_ENV) {
            self.email.password = password;
        }
    }
}

/// Loads the configuration file, creating it with defaults if it is missing.
///
/// A file that cannot be read or parsed is logged and replaced by defaults
/// in memory; the file itself is left untouched.
pub fn load_config(path: &Path) -> CheckerConfig {
    let mut config = if path.exists() {
        match read_config(path) {
            Ok(config) => {
                info!("Loaded configuration from {}", path.display());
                config
            }
            Err(e) => {
                error!("Error loading config: {}", e);
                info!("Using default configuration");
                CheckerConfig::default()
            }
        }
    } else {
        let defaults = CheckerConfig::default();
        match defaults.write_to(path) {
            Ok(()) => info!("Created default config file at {}", path.display()),
            Err(e) => error!("Could not write default config to {}: {}", path.display(), e),
        }
        info!("Please edit the config file to add your email credentials");
        defaults
    };

    config.apply_env_overrides();

    if !config.weekends_only {
        warn!("weekends_only is false, but only weekend nights are probed");
    }

    config
}

/// Reads `path` and fills missing keys from the defaults.
///
/// A value of the wrong type keeps its default; every other key is still
/// taken from the file.
pub fn read_config(path: &Path) -> Result<CheckerConfig, ScanError> {
    let contents = fs::read_to_string(path)?;
    let user: Value = serde_json::from_str(&contents)?;
    let defaults = serde_json::to_value(CheckerConfig::default())?;
    let merged = merge_with_defaults(defaults.clone(), user.clone())?;

    match serde_json::from_value(merged) {
        Ok(config) => Ok(config),
        Err(e) => {
            warn!("Invalid values in {}: {}", path.display(), e);
            let merged = merge_valid_keys(defaults, user)?;
            Ok(serde_json::from_value(merged)?)
        }
    }
}

/// Shallow merge of user settings over defaults; nested objects are merged
/// one level deep.
pub fn merge_with_defaults(defaults: Value, user: Value) -> Result<Value, ScanError> {
    let Value::Object(mut base) = defaults else {
        return Err(ScanError::DataFormat(
            "default configuration is not an object".to_string(),
        ));
    };
    let Value::Object(user) = user else {
        return Err(ScanError::DataFormat(
            "configuration root must be a JSON object".to_string(),
        ));
    };

    for (key, value) in user {
        if let (Some(Value::Object(existing)), Value::Object(incoming)) = (base.get_mut(&key), &value) {
            existing.extend(incoming.clone());
            continue;
        }
        base.insert(key, value);
    }

    Ok(Value::Object(base))
}

/// Same merge as [`merge_with_defaults`], applied one key at a time so a
/// value that does not fit its field is dropped on its own.
fn merge_valid_keys(defaults: Value, user: Value) -> Result<Value, ScanError> {
    let Value::Object(user) = user else {
        return Err(ScanError::DataFormat(
            "configuration root must be a JSON object".to_string(),
        ));
    };
    let mut accepted = defaults;

    for (key, value) in user {
        let nested = matches!(accepted.get(&key), Some(Value::Object(_)));
        match value {
            Value::Object(incoming) if nested => {
                for (field, field_value) in incoming {
                    let mut candidate = accepted.clone();
                    candidate[key.as_str()][field.as_str()] = field_value;
                    accept_if_valid(&mut accepted, candidate, &format!("{}.{}", key, field));
                }
            }
            value => {
                let mut candidate = accepted.clone();
                candidate[key.as_str()] = value;
                accept_if_valid(&mut accepted, candidate, &key);
            }
        }
    }

    Ok(accepted)
}

fn accept_if_valid(accepted: &mut Value, candidate: Value, key: &str) {
    match serde_json::from_value::<CheckerConfig>(candidate.clone()) {
        Ok(_) => *accepted = candidate,
        Err(e) => warn!("Ignoring config value for {} and using the default: {}", key, e),
    }
}
