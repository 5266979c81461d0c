use std::time::Duration;

use async_trait::async_trait;
use chrono::Local;
use fantoccini::error::NewSessionError;
use fantoccini::{Client, ClientBuilder, Locator};
use rand::Rng;
use reservation_site::{BROWSER_USER_AGENT, site_root};
use serde_json::{Map, Value, json};
use tokio::time::{Instant, sleep};
use tracing::{debug, info, warn};

use crate::classifier::{
    ClassifierRules, Evidence, PageSignals, RESULTS_HEADING_XPATH, has_dollar_amount, page_text,
};
use crate::config::{BrowserKind, CheckerConfig};
use crate::probe::AvailabilityProbe;
use crate::scan_types::*;

const WINDOW_WIDTH: u32 = 1920;
const WINDOW_HEIGHT: u32 = 1080;

const PAGE_LOAD_TIMEOUT: Duration = Duration::from_secs(20);
const INTERSTITIAL_TIMEOUT: Duration = Duration::from_secs(30);
const SCRIPT_SETTLE_DELAY: Duration = Duration::from_secs(8);
const RESULTS_SETTLE_DELAY: Duration = Duration::from_secs(7);

/// URL fragment of the site's queueing page.
const INTERSTITIAL_MARKER: &str = "PleaseWait";
/// Page text shown when the site rejects the session.
const BLOCKED_MARKER: &str = "action not allowed";

/// Tried in order until one of them finds the search button.
const SUBMIT_XPATHS: [&str; 5] = [
    "//button[contains(text(), 'Check Availability')]",
    "//input[@value='Check Availability']",
    "//input[contains(@class, 'wxa-form-button')]",
    "//form[contains(@class, 'wxa-form')]//input[@type='submit']",
    "//button[contains(@class, 'btn-primary')]",
];

const ARRIVAL_INPUT_XPATH: &str =
    "//input[contains(@id, 'Arrival') or contains(@name, 'Arrival')]";
const DEPARTURE_INPUT_XPATH: &str =
    "//input[contains(@id, 'Departure') or contains(@name, 'Departure')]";
const BOOKING_LINK_XPATH: &str =
    "//a[contains(@href, 'Plan-Your-Trip') or contains(text(), 'Book') or contains(text(), 'Reserve')]";

const SUBMIT_FIRST_FORM_JS: &str =
    "const form = document.querySelector('form'); if (form) { form.submit(); return true; } return false;";
const HIDE_WEBDRIVER_JS: &str =
    "Object.defineProperty(navigator, 'webdriver', {get: () => undefined});";

fn browser_error(err: impl std::fmt::Display) -> ScanError {
    ScanError::Browser(err.to_string())
}

/// Random delay between `min_secs` and `max_secs`
fn jitter(min_secs: f64, max_secs: f64) -> Duration {
    Duration::from_secs_f64(rand::rng().random_range(min_secs..max_secs))
}

/// Probe that drives a real browser through a WebDriver server.
pub struct BrowserProbe {
    kind: BrowserKind,
    headless: bool,
    webdriver_url: String,
    base_url: String,
    adults: u32,
    children: u32,
    screenshots: bool,
    rules: ClassifierRules,
    client: Option<Client>,
}

impl BrowserProbe {
    /// Fails with [`ScanError::ConfigError`] for browsers other than Chrome and Firefox.
    pub fn new(config: &CheckerConfig) -> Result<Self, ScanError> {
        Ok(Self {
            kind: config.browser_kind()?,
            headless: config.headless,
            webdriver_url: config.webdriver_url.clone(),
            base_url: config.urls.base_url.clone(),
            adults: config.adults,
            children: config.children,
            screenshots: config.screenshots,
            rules: config.classifier.clone(),
            client: None,
        })
    }

    /// WebDriver capabilities for the configured browser
    pub fn capabilities(&self) -> Map<String, Value> {
        let mut caps = Map::new();

        match self.kind {
            BrowserKind::Chrome => {
                let mut args = vec![
                    format!("--window-size={},{}", WINDOW_WIDTH, WINDOW_HEIGHT),
                    "--disable-gpu".to_string(),
                    "--no-sandbox".to_string(),
                    "--disable-dev-shm-usage".to_string(),
                    "--disable-blink-features=AutomationControlled".to_string(),
                    "--lang=en-US".to_string(),
                    format!("--user-agent={}", BROWSER_USER_AGENT),
                ];
                if self.headless {
                    args.insert(0, "--headless=new".to_string());
                }

                caps.insert("browserName".to_string(), json!("chrome"));
                caps.insert(
                    "goog:chromeOptions".to_string(),
                    json!({
                        "args": args,
                        "excludeSwitches": ["enable-automation"],
                        "useAutomationExtension": false,
                        "prefs": {
                            "credentials_enable_service": false,
                            "profile.password_manager_enabled": false
                        }
                    }),
                );
            }
            BrowserKind::Firefox => {
                let mut args = vec![
                    format!("--width={}", WINDOW_WIDTH),
                    format!("--height={}", WINDOW_HEIGHT),
                ];
                if self.headless {
                    args.insert(0, "-headless".to_string());
                }

                caps.insert("browserName".to_string(), json!("firefox"));
                caps.insert(
                    "moz:firefoxOptions".to_string(),
                    json!({
                        "args": args,
                        "prefs": {
                            "general.useragent.override": BROWSER_USER_AGENT,
                            "dom.webdriver.enabled": false
                        }
                    }),
                );
            }
        }

        caps
    }

    fn session(&self) -> Result<Client, ScanError> {
        self.client
            .clone()
            .ok_or_else(|| ScanError::Browser("browser session not started".to_string()))
    }

    async fn wait_out_interstitial(client: &Client) {
        let deadline = Instant::now() + INTERSTITIAL_TIMEOUT;
        loop {
            let on_wait_page = client
                .current_url()
                .await
                .map(|url| url.as_str().contains(INTERSTITIAL_MARKER))
                .unwrap_or(false);
            if !on_wait_page {
                return;
            }
            if Instant::now() >= deadline {
                warn!("Still on the wait page after {:?}", INTERSTITIAL_TIMEOUT);
                return;
            }
            debug!("Waiting for the PleaseWait page to pass...");
            sleep(Duration::from_secs(1)).await;
        }
    }

    async fn on_results_page(&self, client: &Client) -> bool {
        let url = match client.current_url().await {
            Ok(url) => url.to_string(),
            Err(_) => return false,
        };
        let title = client.title().await.unwrap_or_default();
        let heading = has_match(client, Some(RESULTS_HEADING_XPATH)).await;
        let text = client
            .source()
            .await
            .map(|source| page_text(&source))
            .unwrap_or_default();
        self.rules.is_results_page(&url, &title, heading, &text)
    }

    async fn fill_dates_if_empty(&self, client: &Client, pair: &DatePair) {
        let fields = [
            (ARRIVAL_INPUT_XPATH, pair.check_in()),
            (DEPARTURE_INPUT_XPATH, pair.check_out()),
        ];

        for (xpath, date) in fields {
            let Ok(input) = client.find(Locator::XPath(xpath)).await else {
                continue;
            };
            let current = input.attr("value").await.ok().flatten().unwrap_or_default();
            if !current.is_empty() {
                continue;
            }

            let value = date.format("%m/%d/%Y").to_string();
            debug!("Filling empty date field with {}", value);
            if let Err(e) = input.clear().await {
                debug!("Could not clear date field: {}", e);
            }
            if let Err(e) = input.send_keys(&value).await {
                warn!("Could not fill date field: {}", e);
            }
        }
    }

    async fn submit_search_form(&self, client: &Client) -> bool {
        for xpath in SUBMIT_XPATHS {
            let Ok(button) = client.find(Locator::XPath(xpath)).await else {
                continue;
            };
            info!("Found search button with selector: {}", xpath);
            match button.click().await {
                Ok(()) => return true,
                Err(e) => debug!("Click on {} failed: {}", xpath, e),
            }
        }

        match client.execute(SUBMIT_FIRST_FORM_JS, vec![]).await {
            Ok(Value::Bool(true)) => {
                info!("Submitted the search form via JavaScript");
                true
            }
            Ok(_) => {
                warn!("No search form found on the page");
                false
            }
            Err(e) => {
                warn!("Error submitting the search form: {}", e);
                false
            }
        }
    }

    async fn save_screenshot(&self, client: &Client, file_name: String) {
        if !self.screenshots {
            return;
        }
        match client.screenshot().await {
            Ok(png) => match tokio::fs::write(&file_name, png).await {
                Ok(()) => info!("Saved screenshot to {}", file_name),
                Err(e) => warn!("Could not write screenshot {}: {}", file_name, e),
            },
            Err(e) => warn!("Could not take screenshot: {}", e),
        }
    }

    async fn collect_evidence(&self, client: &Client) -> Result<Evidence, ScanError> {
        let source = client.source().await.map_err(browser_error)?;
        let current_url = client.current_url().await.map_err(browser_error)?.to_string();
        let title = client.title().await.unwrap_or_default();
        let text = page_text(&source);

        let signals = PageSignals {
            booking_control: has_match(client, self.rules.booking_control_xpath().as_deref()).await,
            dollar_amount: has_dollar_amount(&text),
            price_element: has_match(client, self.rules.price_element_xpath().as_deref()).await,
            rate_or_room: has_match(client, self.rules.listing_element_xpath().as_deref()).await,
            results_heading: has_match(client, Some(RESULTS_HEADING_XPATH)).await,
        };
        let results_page =
            self.rules
                .is_results_page(&current_url, &title, signals.results_heading, &text);
        debug!(
            "Page {} (title {:?}): results page {}, signals {:?}",
            current_url, title, results_page, signals
        );

        Ok(Evidence {
            page_text: text,
            title,
            current_url: Some(current_url),
            signals,
            results_page: Some(results_page),
        })
    }

    /// Clears cookies and re-enters the site from its root page.
    async fn recover_from_block(&self, client: &Client) {
        warn!("Detected 'Action Not Allowed' page, attempting to recover");
        self.save_screenshot(
            client,
            format!("action_not_allowed_{}.png", Local::now().format("%Y%m%d_%H%M%S")),
        )
        .await;

        if let Err(e) = client.delete_all_cookies().await {
            warn!("Could not clear cookies: {}", e);
        }
        sleep(jitter(5.0, 10.0)).await;

        let root = site_root(&self.base_url);
        info!("Revisiting {}", root);
        if let Err(e) = client.goto(root).await {
            warn!("Recovery navigation failed: {}", e);
            return;
        }
        sleep(jitter(4.0, 8.0)).await;

        if let Ok(link) = client.find(Locator::XPath(BOOKING_LINK_XPATH)).await {
            if let Err(e) = link.click().await {
                debug!("Could not follow booking link: {}", e);
            }
            sleep(jitter(3.0, 6.0)).await;
        }
    }
}

async fn has_match(client: &Client, xpath: Option<&str>) -> bool {
    let Some(xpath) = xpath else {
        return false;
    };
    match client.find_all(Locator::XPath(xpath)).await {
        Ok(elements) => !elements.is_empty(),
        Err(e) => {
            debug!("Lookup of {} failed: {}", xpath, e);
            false
        }
    }
}

#[async_trait]
impl AvailabilityProbe for BrowserProbe {
    fn name(&self) -> &'static str {
        "browser"
    }

    async fn begin(&mut self) -> Result<(), ScanError> {
        if self.client.is_some() {
            return Ok(());
        }

        info!(
            "Starting {:?} session at {} (headless: {})",
            self.kind, self.webdriver_url, self.headless
        );
        let mut builder = ClientBuilder::native();
        builder.capabilities(self.capabilities());
        let client = builder
            .connect(&self.webdriver_url)
            .await
            .map_err(|e| match e {
                NewSessionError::BadWebdriverUrl(_) | NewSessionError::SessionNotCreated(_) => {
                    ScanError::ConfigError(format!("WebDriver rejected the session: {}", e))
                }
                other => ScanError::Browser(format!("could not start browser: {}", other)),
            })?;

        if let Err(e) = client.execute(HIDE_WEBDRIVER_JS, vec![]).await {
            debug!("Could not hide navigator.webdriver: {}", e);
        }

        self.client = Some(client);
        info!("Browser {:?} initialized successfully", self.kind);
        Ok(())
    }

    async fn fetch_evidence(&mut self, pair: &DatePair) -> Result<Evidence, ScanError> {
        let client = self.session()?;
        let url = pair.search_query(self.adults, self.children).url(&self.base_url);

        info!("Navigating to {}", url);
        client.goto(&url).await.map_err(browser_error)?;
        client
            .wait()
            .at_most(PAGE_LOAD_TIMEOUT)
            .for_element(Locator::Css("body"))
            .await
            .map_err(browser_error)?;

        Self::wait_out_interstitial(&client).await;
        sleep(SCRIPT_SETTLE_DELAY).await;
        self.save_screenshot(&client, format!("search_{}.png", pair.check_in().format("%Y%m%d")))
            .await;

        if !self.on_results_page(&client).await {
            self.fill_dates_if_empty(&client, pair).await;
            if !self.submit_search_form(&client).await {
                warn!("Could not submit the search form for {}", pair.check_in());
            }
            sleep(RESULTS_SETTLE_DELAY).await;
            Self::wait_out_interstitial(&client).await;
        }

        if let Err(e) = client.execute("window.scrollBy(0, 300);", vec![]).await {
            debug!("Scroll failed: {}", e);
        }
        sleep(jitter(2.0, 4.0)).await;
        self.save_screenshot(
            &client,
            format!("availability_{}.png", pair.check_in().format("%Y%m%d")),
        )
        .await;

        let evidence = self.collect_evidence(&client).await?;
        if evidence.page_text.contains(BLOCKED_MARKER) {
            self.recover_from_block(&client).await;
        }
        Ok(evidence)
    }

    async fn finish(&mut self) {
        if let Some(client) = self.client.take() {
            match client.close().await {
                Ok(()) => info!("Browser closed"),
                Err(e) => warn!("Error closing browser: {}", e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn probe(browser: &str, headless: bool) -> BrowserProbe {
        BrowserProbe::new(&CheckerConfig {
            browser: browser.to_string(),
            headless,
            ..CheckerConfig::default()
        })
        .unwrap()
    }

    #[test]
    fn test_chrome_capabilities() {
        let caps = probe("chrome", true).capabilities();
        assert_eq!(caps["browserName"], "chrome");

        let args = caps["goog:chromeOptions"]["args"].as_array().unwrap();
        assert_eq!(args[0], "--headless=new");
        assert!(args.iter().any(|a| a == "--window-size=1920,1080"));
        assert!(
            args.iter()
                .any(|a| a.as_str().unwrap().starts_with("--user-agent="))
        );
    }

    #[test]
    fn test_firefox_capabilities_with_window() {
        let caps = probe("Firefox", false).capabilities();
        assert_eq!(caps["browserName"], "firefox");

        let args = caps["moz:firefoxOptions"]["args"].as_array().unwrap();
        assert!(!args.iter().any(|a| a == "-headless"));
        assert_eq!(
            caps["moz:firefoxOptions"]["prefs"]["general.useragent.override"],
            BROWSER_USER_AGENT
        );
    }

    #[test]
    fn test_unsupported_browser_fails_at_setup() {
        let result = BrowserProbe::new(&CheckerConfig {
            browser: "safari".to_string(),
            ..CheckerConfig::default()
        });
        assert!(matches!(result, Err(ScanError::ConfigError(_))));
    }

    #[tokio::test]
    async fn test_fetch_without_session_fails() {
        let mut probe = probe("chrome", true);
        let pair = DatePair::new(NaiveDate::from_ymd_opt(2025, 4, 4).unwrap());

        let result = probe.fetch_evidence(&pair).await;
        assert!(matches!(result, Err(ScanError::Browser(_))));

        // finishing without a session is a no-op
        probe.finish().await;
    }
}
