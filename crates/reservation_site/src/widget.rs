use std::sync::LazyLock;

use log::debug;
use regex::Regex;
use reqwest::Client;
use serde_json::Value;

use crate::SiteError;

/// Callback name sent to the JSONP endpoint.
pub const JSONP_CALLBACK: &str = "jQuery_callback";

static JSONP_PAYLOAD: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)jQuery_callback\((.*)\)").expect("JSONP pattern is valid")
});

/// URL of the widget configuration request; `timestamp_ms` busts caches
/// the same way jQuery does.
pub fn widget_config_request_url(widget_config_url: &str, timestamp_ms: i64) -> String {
    format!(
        "{}?callback={}&_={}",
        widget_config_url, JSONP_CALLBACK, timestamp_ms
    )
}

/// Extract the JSON payload from a `jQuery_callback(...)` response body
pub fn parse_jsonp(body: &str) -> Result<Value, SiteError> {
    let payload = JSONP_PAYLOAD
        .captures(body)
        .and_then(|captures| captures.get(1))
        .ok_or_else(|| {
            SiteError::Widget("could not extract JSON data from widget config response".to_string())
        })?;

    serde_json::from_str(payload.as_str()).map_err(|e| SiteError::Widget(e.to_string()))
}

/// Fetch the lodge widget configuration (lodge names, booking limits, ...)
pub async fn fetch_widget_config(
    client: &Client,
    widget_config_url: &str,
) -> Result<Value, SiteError> {
    let url = widget_config_request_url(
        widget_config_url,
        chrono::Utc::now().timestamp_millis(),
    );
    debug!("Fetching widget config from {}", url);

    let response = client.get(&url).send().await?;

    if !response.status().is_success() {
        return Err(SiteError::Status {
            status: response.status().as_u16(),
            url,
        });
    }

    let body = response.text().await?;
    parse_jsonp(&body)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_widget_config_request_url() {
        assert_eq!(
            widget_config_request_url("https://example.com/GetWidgetConfigData", 1700000000000),
            "https://example.com/GetWidgetConfigData?callback=jQuery_callback&_=1700000000000"
        );
    }

    #[test]
    fn test_parse_jsonp() {
        let body = "jQuery_callback({\"Lodges\":[{\"Name\":\"Yosemite Valley Lodge\",\"Code\":\"YVL\"}]});";
        let value = parse_jsonp(body).unwrap();
        assert_eq!(value["Lodges"][0]["Code"], "YVL");
    }

    #[test]
    fn test_parse_jsonp_multiline_payload() {
        let body = "jQuery_callback({\n  \"MaxNights\": 14,\n  \"Note\": \"(none)\"\n})";
        let value = parse_jsonp(body).unwrap();
        assert_eq!(value["MaxNights"], 14);
        assert_eq!(value["Note"], "(none)");
    }

    #[test]
    fn test_parse_jsonp_rejects_plain_html() {
        let err = parse_jsonp("<html>Access Denied</html>").unwrap_err();
        assert!(matches!(err, SiteError::Widget(_)));
    }
}
