use chrono::NaiveDate;

/// Query parameters for a single availability search on the booking engine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SearchQuery {
    /// Arrival (check-in) date
    pub arrival: NaiveDate,
    /// Departure (check-out) date
    pub departure: NaiveDate,
    /// Number of adults in the party
    pub adults: u32,
    /// Number of children in the party
    pub children: u32,
}

impl SearchQuery {
    /// Deep link into the search results for this query
    pub fn url(&self, base_url: &str) -> String {
        format!(
            "{}?ArrivalDate={}&DepartureDate={}&Adults={}&Children={}",
            base_url,
            format_date_for_url(self.arrival),
            format_date_for_url(self.departure),
            self.adults,
            self.children
        )
    }
}

/// Format a date the way the booking engine's query string expects it
/// (`Apr+04%2C+2025`).
pub fn format_date_for_url(date: NaiveDate) -> String {
    format!(
        "{}+{}%2C+{}",
        date.format("%b"),
        date.format("%d"),
        date.format("%Y")
    )
}

/// Human readable date used in logs and emails (`Friday, April 04, 2025`).
pub fn format_date_for_display(date: NaiveDate) -> String {
    date.format("%A, %B %d, %Y").to_string()
}

/// Root of the booking site for a lodge page URL.
///
/// Visiting the root first gives the site a chance to hand out session cookies
/// before a deep link is requested.
pub fn site_root(base_url: &str) -> &str {
    base_url
        .split("/Plan-Your-Trip")
        .next()
        .unwrap_or(base_url)
}
