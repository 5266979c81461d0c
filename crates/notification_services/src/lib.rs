//! # Notification Services
//!
//! This crate delivers plain-text alert emails over SMTP.
//! It owns the email settings shape, address normalization and the
//! STARTTLS-then-implicit-TLS delivery strategy.

/// SMTP mailer and delivery fallback.
pub mod service;
/// Email settings and notification error types.
pub mod types;

pub use service::{SmtpMailer, normalize_address};
pub use types::{EmailSettings, NotificationError};
