use std::collections::BTreeSet;
use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use rand::Rng;
use reservation_site::format_date_for_display;
use tokio::sync::watch;
use tokio::time::sleep;
use tracing::{error, info};

use crate::classifier::{ClassifierRules, Evidence, Verdict};
use crate::scan_types::*;

/// Fetches search pages for date pairs and reduces them to [`Evidence`].
#[async_trait]
pub trait AvailabilityProbe: Send {
    /// Short name for logs
    fn name(&self) -> &'static str;

    /// Acquires the session. A failure here fails the whole attempt.
    async fn begin(&mut self) -> Result<(), ScanError>;

    /// Loads the search page for `pair`. A failure only affects this date.
    async fn fetch_evidence(&mut self, pair: &DatePair) -> Result<Evidence, ScanError>;

    /// Releases the session. Called after every `begin`, successful or not.
    async fn finish(&mut self);
}

/// Random pause between two probes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PauseRange {
    /// Shortest pause
    pub min: Duration,
    /// Longest pause
    pub max: Duration,
}

impl Default for PauseRange {
    fn default() -> Self {
        Self {
            min: Duration::from_secs(2),
            max: Duration::from_secs(5),
        }
    }
}

impl PauseRange {
    /// No pause at all
    pub const NONE: PauseRange = PauseRange {
        min: Duration::ZERO,
        max: Duration::ZERO,
    };

    /// Uniformly random duration within the range
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> Duration {
        if self.max <= self.min {
            return self.min;
        }
        rng.random_range(self.min..=self.max)
    }
}

/// Probes every pair in order and collects the available check-in dates.
///
/// Per-date failures are logged and skipped; only a failing `begin` makes the
/// pass fail. Raising `shutdown` abandons the pass with
/// [`ScanError::Interrupted`]. The probe is finished on every path.
pub async fn run_probe_pass(
    probe: &mut dyn AvailabilityProbe,
    pairs: &[DatePair],
    rules: &ClassifierRules,
    pause: PauseRange,
    shutdown: &mut watch::Receiver<bool>,
) -> Result<BTreeSet<NaiveDate>, ScanError> {
    let outcome = match probe.begin().await {
        Ok(()) => probe_each(probe, pairs, rules, pause, shutdown).await,
        Err(e) => Err(e),
    };
    probe.finish().await;
    outcome
}

async fn probe_each(
    probe: &mut dyn AvailabilityProbe,
    pairs: &[DatePair],
    rules: &ClassifierRules,
    pause: PauseRange,
    shutdown: &mut watch::Receiver<bool>,
) -> Result<BTreeSet<NaiveDate>, ScanError> {
    let mut available = BTreeSet::new();

    for (index, pair) in pairs.iter().enumerate() {
        if index > 0 {
            let delay = pause.sample(&mut rand::rng());
            tokio::select! {
                biased;
                _ = shutdown_signal(shutdown) => return Err(ScanError::Interrupted),
                _ = sleep(delay) => {}
            }
        }

        info!(
            "Checking {} to {} ({})",
            pair.check_in(),
            pair.check_out(),
            probe.name()
        );

        let fetched = tokio::select! {
            biased;
            _ = shutdown_signal(shutdown) => return Err(ScanError::Interrupted),
            fetched = probe.fetch_evidence(pair) => fetched,
        };

        match fetched {
            Ok(evidence) => {
                let verdict = rules.classify(&evidence);
                log_verdict(pair, &verdict);
                if verdict.is_available() {
                    available.insert(pair.check_in());
                }
            }
            Err(e) => error!("Error checking date {}: {}", pair.check_in(), e),
        }
    }

    Ok(available)
}

/// Resolves once shutdown is requested; never if the sender is gone.
async fn shutdown_signal(shutdown: &mut watch::Receiver<bool>) {
    let closed = shutdown.wait_for(|stop| *stop).await.is_err();
    if closed {
        std::future::pending::<()>().await;
    }
}

/// Probes a single pair in its own session.
pub async fn check_single_pair(
    probe: &mut dyn AvailabilityProbe,
    pair: &DatePair,
    rules: &ClassifierRules,
) -> Result<Verdict, ScanError> {
    let outcome = match probe.begin().await {
        Ok(()) => probe
            .fetch_evidence(pair)
            .await
            .map(|evidence| rules.classify(&evidence)),
        Err(e) => Err(e),
    };
    probe.finish().await;

    if let Ok(verdict) = &outcome {
        log_verdict(pair, verdict);
    }
    outcome
}

fn log_verdict(pair: &DatePair, verdict: &Verdict) {
    let day = format_date_for_display(pair.check_in());
    match verdict {
        Verdict::Available => info!("Availability found for {}", day),
        Verdict::Blocked(_) => info!("Blocked page returned for {}", day),
        Verdict::NoAvailability(phrase) => info!("No availability for {} ({})", day, phrase),
        Verdict::NotResultsPage => info!("Did not reach a results page for {}", day),
        Verdict::NoPositiveSignal => info!("No availability indicators found for {}", day),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::PageSignals;
    use chrono::{Datelike, Weekday};
    use std::sync::{Arc, Mutex};

    #[derive(Default)]
    struct Calls {
        begins: u32,
        fetches: Vec<NaiveDate>,
        finishes: u32,
    }

    /// Friday nights are bookable, Saturdays sold out, the 12th errors.
    struct FridayProbe {
        calls: Arc<Mutex<Calls>>,
        fail_begin: bool,
    }

    #[async_trait]
    impl AvailabilityProbe for FridayProbe {
        fn name(&self) -> &'static str {
            "test"
        }

        async fn begin(&mut self) -> Result<(), ScanError> {
            self.calls.lock().unwrap().begins += 1;
            if self.fail_begin {
                return Err(ScanError::Browser("could not start session".to_string()));
            }
            Ok(())
        }

        async fn fetch_evidence(&mut self, pair: &DatePair) -> Result<Evidence, ScanError> {
            self.calls.lock().unwrap().fetches.push(pair.check_in());
            if pair.check_in().day() == 12 {
                return Err(ScanError::Network("connection reset".to_string()));
            }
            if pair.check_in().weekday() == Weekday::Fri {
                Ok(Evidence {
                    page_text: "standard room $249".to_string(),
                    signals: PageSignals {
                        dollar_amount: true,
                        ..PageSignals::default()
                    },
                    ..Evidence::default()
                })
            } else {
                Ok(Evidence {
                    page_text: "sold out".to_string(),
                    ..Evidence::default()
                })
            }
        }

        async fn finish(&mut self) {
            self.calls.lock().unwrap().finishes += 1;
        }
    }

    /// Raises the shutdown flag while the first page loads.
    struct StopAfterFirstFetch {
        inner: FridayProbe,
        shutdown: watch::Sender<bool>,
    }

    #[async_trait]
    impl AvailabilityProbe for StopAfterFirstFetch {
        fn name(&self) -> &'static str {
            "stopping"
        }

        async fn begin(&mut self) -> Result<(), ScanError> {
            self.inner.begin().await
        }

        async fn fetch_evidence(&mut self, pair: &DatePair) -> Result<Evidence, ScanError> {
            let _ = self.shutdown.send(true);
            self.inner.fetch_evidence(pair).await
        }

        async fn finish(&mut self) {
            self.inner.finish().await
        }
    }

    /// Every page takes an hour to load.
    struct SlowProbe {
        finished: bool,
    }

    #[async_trait]
    impl AvailabilityProbe for SlowProbe {
        fn name(&self) -> &'static str {
            "slow"
        }

        async fn begin(&mut self) -> Result<(), ScanError> {
            Ok(())
        }

        async fn fetch_evidence(&mut self, _pair: &DatePair) -> Result<Evidence, ScanError> {
            sleep(Duration::from_secs(3600)).await;
            Ok(Evidence::default())
        }

        async fn finish(&mut self) {
            self.finished = true;
        }
    }

    fn running() -> (watch::Sender<bool>, watch::Receiver<bool>) {
        watch::channel(false)
    }

    fn pairs() -> Vec<DatePair> {
        [4, 5, 11, 12]
            .into_iter()
            .map(|d| DatePair::new(NaiveDate::from_ymd_opt(2025, 4, d).unwrap()))
            .collect()
    }

    #[tokio::test(start_paused = true)]
    async fn test_probe_pass_collects_available_dates() {
        let calls = Arc::new(Mutex::new(Calls::default()));
        let mut probe = FridayProbe {
            calls: calls.clone(),
            fail_begin: false,
        };

        let (_tx, mut rx) = running();
        let available = run_probe_pass(
            &mut probe,
            &pairs(),
            &ClassifierRules::default(),
            PauseRange::default(),
            &mut rx,
        )
        .await
        .unwrap();

        let expected: BTreeSet<_> = [4, 11]
            .into_iter()
            .map(|d| NaiveDate::from_ymd_opt(2025, 4, d).unwrap())
            .collect();
        assert_eq!(available, expected);

        let calls = calls.lock().unwrap();
        assert_eq!(calls.begins, 1);
        assert_eq!(calls.fetches.len(), 4);
        assert_eq!(calls.finishes, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_pauses_between_probes() {
        let calls = Arc::new(Mutex::new(Calls::default()));
        let mut probe = FridayProbe {
            calls,
            fail_begin: false,
        };
        let pause = PauseRange {
            min: Duration::from_secs(3),
            max: Duration::from_secs(3),
        };

        let (_tx, mut rx) = running();
        let start = tokio::time::Instant::now();
        run_probe_pass(&mut probe, &pairs(), &ClassifierRules::default(), pause, &mut rx)
            .await
            .unwrap();

        assert_eq!(start.elapsed(), Duration::from_secs(9));
    }

    #[tokio::test]
    async fn test_failed_begin_still_finishes() {
        let calls = Arc::new(Mutex::new(Calls::default()));
        let mut probe = FridayProbe {
            calls: calls.clone(),
            fail_begin: true,
        };

        let (_tx, mut rx) = running();
        let result = run_probe_pass(
            &mut probe,
            &pairs(),
            &ClassifierRules::default(),
            PauseRange::NONE,
            &mut rx,
        )
        .await;

        assert!(matches!(result, Err(ScanError::Browser(_))));
        let calls = calls.lock().unwrap();
        assert!(calls.fetches.is_empty());
        assert_eq!(calls.finishes, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_stops_pass_between_dates() {
        let calls = Arc::new(Mutex::new(Calls::default()));
        let (tx, mut rx) = running();
        let mut probe = StopAfterFirstFetch {
            inner: FridayProbe {
                calls: calls.clone(),
                fail_begin: false,
            },
            shutdown: tx,
        };

        let start = tokio::time::Instant::now();
        let result = run_probe_pass(
            &mut probe,
            &pairs(),
            &ClassifierRules::default(),
            PauseRange::default(),
            &mut rx,
        )
        .await;

        assert!(matches!(result, Err(ScanError::Interrupted)));
        assert_eq!(start.elapsed(), Duration::ZERO);
        let calls = calls.lock().unwrap();
        assert_eq!(calls.fetches.len(), 1);
        assert_eq!(calls.finishes, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_cancels_slow_fetch() {
        let (tx, mut rx) = running();
        let mut probe = SlowProbe { finished: false };

        tokio::spawn(async move {
            sleep(Duration::from_secs(5)).await;
            let _ = tx.send(true);
        });

        let start = tokio::time::Instant::now();
        let result = run_probe_pass(
            &mut probe,
            &pairs(),
            &ClassifierRules::default(),
            PauseRange::NONE,
            &mut rx,
        )
        .await;

        assert!(matches!(result, Err(ScanError::Interrupted)));
        assert_eq!(start.elapsed(), Duration::from_secs(5));
        assert!(probe.finished);
    }

    #[tokio::test]
    async fn test_check_single_pair() {
        let calls = Arc::new(Mutex::new(Calls::default()));
        let mut probe = FridayProbe {
            calls: calls.clone(),
            fail_begin: false,
        };
        let rules = ClassifierRules::default();

        let friday = DatePair::new(NaiveDate::from_ymd_opt(2025, 4, 4).unwrap());
        assert!(check_single_pair(&mut probe, &friday, &rules).await.unwrap().is_available());

        let broken = DatePair::new(NaiveDate::from_ymd_opt(2025, 4, 12).unwrap());
        assert!(check_single_pair(&mut probe, &broken, &rules).await.is_err());
        assert_eq!(calls.lock().unwrap().finishes, 2);
    }

    #[test]
    fn test_pause_range_sample() {
        let mut rng = rand::rng();
        let range = PauseRange::default();
        for _ in 0..100 {
            let pause = range.sample(&mut rng);
            assert!(pause >= range.min && pause <= range.max);
        }
        assert_eq!(PauseRange::NONE.sample(&mut rng), Duration::ZERO);
    }
}
