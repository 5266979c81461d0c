use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use reservation_site::{fetch_widget_config, site_client};
use tracing::{debug, error, info};

use crate::classifier::{ClassifierRules, Evidence};
use crate::config::CheckerConfig;
use crate::probe::AvailabilityProbe;
use crate::scan_types::*;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Probe that requests search pages with a plain HTTP client.
///
/// The booking engine renders results with JavaScript, so this probe mostly
/// sees the search form; it is the lightweight fallback to the browser probe.
pub struct HttpProbe {
    client: Client,
    base_url: String,
    widget_config_url: String,
    adults: u32,
    children: u32,
    rules: ClassifierRules,
}

impl HttpProbe {
    /// Builds the probe and its cookie-keeping client
    pub fn new(config: &CheckerConfig) -> Result<Self, ScanError> {
        Ok(Self {
            client: site_client(REQUEST_TIMEOUT)?,
            base_url: config.urls.base_url.clone(),
            widget_config_url: config.urls.widget_config_url.clone(),
            adults: config.adults,
            children: config.children,
            rules: config.classifier.clone(),
        })
    }

    async fn get(&self, url: &str) -> Result<(String, String), ScanError> {
        let response = self.client.get(url).send().await?;

        if !response.status().is_success() {
            return Err(ScanError::ApiError(format!(
                "HTTP {} from {}",
                response.status(),
                url
            )));
        }

        let final_url = response.url().to_string();
        let body = response.text().await?;
        Ok((final_url, body))
    }
}

#[async_trait]
impl AvailabilityProbe for HttpProbe {
    fn name(&self) -> &'static str {
        "http"
    }

    async fn begin(&mut self) -> Result<(), ScanError> {
        info!("Visiting {} to establish a session", self.base_url);
        self.get(&self.base_url).await?;

        match fetch_widget_config(&self.client, &self.widget_config_url).await {
            Ok(widget) => debug!(
                "Widget config loaded ({} top-level keys)",
                widget.as_object().map_or(0, |o| o.len())
            ),
            Err(e) => error!("Error getting widget config: {}", e),
        }
        Ok(())
    }

    async fn fetch_evidence(&mut self, pair: &DatePair) -> Result<Evidence, ScanError> {
        let url = pair.search_query(self.adults, self.children).url(&self.base_url);
        debug!("Requesting {}", url);

        let (final_url, body) = self.get(&url).await?;
        Ok(Evidence::from_html(&body, Some(final_url), &self.rules))
    }

    async fn finish(&mut self) {
        debug!("HTTP probe pass finished");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_http_probe_from_config() {
        let config = CheckerConfig {
            method: "requests".to_string(),
            adults: 2,
            ..CheckerConfig::default()
        };
        let probe = HttpProbe::new(&config).unwrap();

        assert_eq!(probe.name(), "http");
        assert_eq!(probe.adults, 2);
        assert_eq!(probe.base_url, config.urls.base_url);
    }
}
