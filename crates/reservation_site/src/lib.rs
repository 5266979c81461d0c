//! # Reservation Site
//!
//! This crate knows how to talk to the lodge booking engine: how search deep
//! links are built, which headers make a request look like a desktop browser,
//! and how the JSONP widget configuration endpoint is read.

/// Search deep links and the date formats the booking engine expects.
mod search;
pub use search::*;

/// Browser-like request headers shared by every client of the site.
mod session;
pub use session::*;

/// JSONP widget configuration endpoint.
mod widget;
pub use widget::*;

/// Errors raised while talking to the booking site.
#[derive(Debug, thiserror::Error)]
pub enum SiteError {
    /// Transport-level failure.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The site answered with a non-success status.
    #[error("HTTP {status} from {url}")]
    Status {
        /// Status code returned by the site
        status: u16,
        /// URL that was requested
        url: String,
    },

    /// The widget endpoint returned something that is not JSONP.
    #[error("Malformed widget config: {0}")]
    Widget(String),
}
