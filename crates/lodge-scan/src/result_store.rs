use std::fs;
use std::path::{Path, PathBuf};

use tracing::{error, info, warn};

use crate::scan_types::*;

/// Keeps the last completed check result in a JSON file.
#[derive(Debug, Clone)]
pub struct ResultStore {
    path: PathBuf,
}

impl ResultStore {
    /// Store backed by `path`
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Backing file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Overwrites the stored result. Failures are logged, never returned.
    pub fn save(&self, result: &CheckResult) {
        match self.try_save(result) {
            Ok(()) => info!("Results saved to {}", self.path.display()),
            Err(e) => error!("Error saving results: {}", e),
        }
    }

    /// Previous result, or an empty one when there is nothing usable on disk.
    pub fn load(&self) -> CheckResult {
        match self.try_load() {
            Ok(Some(result)) => {
                info!(
                    "Loaded previous results from {} ({} available dates)",
                    result.timestamp,
                    result.available_dates.len()
                );
                result
            }
            Ok(None) => {
                info!("No previous results found");
                CheckResult::empty()
            }
            Err(e) => {
                warn!("Error loading previous results: {}", e);
                CheckResult::empty()
            }
        }
    }

    /// Writes `result` as pretty JSON
    pub fn try_save(&self, result: &CheckResult) -> Result<(), ScanError> {
        let json = serde_json::to_string_pretty(result)?;
        fs::write(&self.path, json)?;
        Ok(())
    }

    /// Reads the stored result; `Ok(None)` when the file does not exist
    pub fn try_load(&self) -> Result<Option<CheckResult>, ScanError> {
        if !self.path.exists() {
            return Ok(None);
        }
        let contents = fs::read_to_string(&self.path)?;
        Ok(Some(serde_json::from_str(&contents)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use tempfile::tempdir;

    fn sample() -> CheckResult {
        let d = |day| NaiveDate::from_ymd_opt(2025, 4, day).unwrap();
        CheckResult::new(
            d(1).and_hms_opt(8, 15, 0).unwrap(),
            [d(4), d(5), d(12)].into_iter().collect(),
        )
    }

    #[test]
    fn test_missing_file_loads_empty() {
        let dir = tempdir().unwrap();
        let store = ResultStore::new(dir.path().join("last_results.json"));

        assert!(store.try_load().unwrap().is_none());
        assert!(store.load().is_empty());
    }

    #[test]
    fn test_corrupt_file_loads_empty() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("last_results.json");
        fs::write(&path, "{\"available_dates\": [\"not a date\"").unwrap();

        let store = ResultStore::new(&path);
        assert!(store.try_load().is_err());
        assert!(store.load().is_empty());
    }

    #[test]
    fn test_file_without_timestamp_keeps_baseline() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("last_results.json");
        fs::write(&path, r#"{"available_dates": ["2025-04-04", "2025-04-12"]}"#).unwrap();

        let loaded = ResultStore::new(&path).load();
        assert_eq!(loaded.available_dates.len(), 2);
    }

    #[test]
    fn test_save_then_load() {
        let dir = tempdir().unwrap();
        let store = ResultStore::new(dir.path().join("last_results.json"));
        let result = sample();

        store.save(&result);
        assert_eq!(store.load(), result);
    }

    #[test]
    fn test_save_overwrites() {
        let dir = tempdir().unwrap();
        let store = ResultStore::new(dir.path().join("last_results.json"));

        store.save(&sample());
        let later = CheckResult::new(sample().timestamp, Default::default());
        store.save(&later);

        assert!(store.load().is_empty());
    }

    #[test]
    fn test_save_into_missing_directory_is_logged() {
        let dir = tempdir().unwrap();
        let store = ResultStore::new(dir.path().join("missing").join("last_results.json"));

        store.save(&sample());
        assert!(store.try_save(&sample()).is_err());
        assert!(!store.path().exists());
    }
}
