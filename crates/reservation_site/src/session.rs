use std::time::Duration;

use reqwest::Client;
use reqwest::header::{ACCEPT, ACCEPT_LANGUAGE, CONNECTION, HeaderMap, HeaderValue};

use crate::SiteError;

/// User agent presented by the plain HTTP client.
pub const HTTP_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// User agent presented by the automated browser.
pub const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/122.0.0.0 Safari/537.36";

/// Headers a desktop browser sends with a top-level navigation
pub fn browser_headers() -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(
        ACCEPT,
        HeaderValue::from_static(
            "text/html,application/xhtml+xml,application/xml;q=0.9,image/avif,image/webp,image/apng,*/*;q=0.8",
        ),
    );
    headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("en-US,en;q=0.9"));
    headers.insert(CONNECTION, HeaderValue::from_static("keep-alive"));
    headers
}

/// Build an HTTP client that keeps cookies across requests and looks like a browser
pub fn site_client(timeout: Duration) -> Result<Client, SiteError> {
    let client = Client::builder()
        .user_agent(HTTP_USER_AGENT)
        .default_headers(browser_headers())
        .cookie_store(true)
        .timeout(timeout)
        .build()?;

    Ok(client)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_browser_headers() {
        let headers = browser_headers();
        assert_eq!(headers.get(ACCEPT_LANGUAGE).unwrap(), "en-US,en;q=0.9");
        assert_eq!(headers.get(CONNECTION).unwrap(), "keep-alive");
    }

    #[test]
    fn test_site_client_builds() {
        assert!(site_client(Duration::from_secs(30)).is_ok());
    }
}
