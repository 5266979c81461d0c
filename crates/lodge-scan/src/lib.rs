//! # Lodge Scan
//!
//! Weekend availability checks for Yosemite Valley Lodge: which nights to
//! probe, how a fetched page is judged, what changed since the last check,
//! and the scheduler that ties it together and emails new openings.

/// Types shared by the checker
mod scan_types;
pub use scan_types::*;

/// Checker configuration file
pub mod config;
pub use config::{CheckerConfig, ProbeMethod, load_config};

/// Candidate weekend dates and consecutive pairs
pub mod dates;
pub use dates::*;

/// Previous vs. current availability
pub mod differ;
pub use differ::*;

/// Page evidence and the availability heuristics
pub mod classifier;
pub use classifier::{ClassifierRules, Evidence, PageSignals, Verdict};

/// Probe trait and probe passes
pub mod probe;
pub use probe::{AvailabilityProbe, PauseRange, check_single_pair, run_probe_pass};

/// Plain HTTP probe
pub mod http_probe;
pub use http_probe::HttpProbe;

/// WebDriver browser probe
pub mod browser_probe;
pub use browser_probe::BrowserProbe;

/// Last completed result on disk
pub mod result_store;
pub use result_store::ResultStore;

/// Alert formatting
pub mod notification_service;
pub use notification_service::*;

/// Email service implementations
pub mod email_service;
pub use email_service::*;

/// Scheduler
pub mod executor;
pub use executor::{
    CheckExecutor, CheckExecutorConfig, MAX_CHECK_INTERVAL, RunMode, next_check_interval,
};
