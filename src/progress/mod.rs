//! Rate-limited export progress reporting
//!
//! Percent-complete is derived from uncompressed bytes written against the
//! original source size, deduplicated against the last emitted value and
//! throttled by a token bucket (one emission per 100 ms, burst of 1).
//! Emissions go to a watch side channel and to the log.

use governor::clock::DefaultClock;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};
use std::num::NonZeroU32;
use std::time::Duration;
use tokio::sync::watch;
use tracing::info;

/// Minimum interval between progress emissions
const EMIT_INTERVAL: Duration = Duration::from_millis(100);

/// Per-engine progress state: percent computation, dedup, rate limit,
/// and the watch side channel
pub struct ProgressReporter {
    total: u64,
    last_percent: Option<u32>,
    limiter: RateLimiter<NotKeyed, InMemoryState, DefaultClock>,
    sender: watch::Sender<u32>,
}

impl ProgressReporter {
    /// Create a reporter for a source of `total` bytes
    pub fn new(total: u64) -> Self {
        let quota = Quota::with_period(EMIT_INTERVAL)
            .expect("non-zero interval")
            .allow_burst(NonZeroU32::MIN);
        let (sender, _) = watch::channel(0);

        Self {
            total,
            last_percent: None,
            limiter: RateLimiter::direct(quota),
            sender,
        }
    }

    /// Subscribe to the progress side channel
    pub fn subscribe(&self) -> watch::Receiver<u32> {
        self.sender.subscribe()
    }

    /// Percent complete for `written` uncompressed bytes, saturating at 100
    pub fn percent(&self, written: u64) -> u32 {
        if written >= self.total {
            100
        } else {
            // total > written >= 0, so total is non-zero here
            (written * 100 / self.total) as u32
        }
    }

    /// Last percent actually emitted, if any
    pub fn last_percent(&self) -> Option<u32> {
        self.last_percent
    }

    /// Report progress, subject to dedup and the rate limiter
    pub fn report(&mut self, written: u64) {
        let percent = self.percent(written);
        if self.last_percent == Some(percent) {
            return;
        }
        if self.limiter.check().is_err() {
            return;
        }
        self.emit(percent);
    }

    /// Report terminal progress, subject to dedup only
    ///
    /// The final emission must always be observable, even for exports that
    /// complete well inside the limiter interval.
    pub fn report_final(&mut self, written: u64) {
        let percent = self.percent(written);
        if self.last_percent == Some(percent) {
            return;
        }
        self.emit(percent);
    }

    fn emit(&mut self, percent: u32) {
        self.sender.send_replace(percent);
        info!("Exported {percent}%.");
        self.last_percent = Some(percent);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_percent_math() {
        let reporter = ProgressReporter::new(1000);
        assert_eq!(reporter.percent(0), 0);
        assert_eq!(reporter.percent(5), 0);
        assert_eq!(reporter.percent(500), 50);
        assert_eq!(reporter.percent(999), 99);
        assert_eq!(reporter.percent(1000), 100);
        assert_eq!(reporter.percent(2000), 100);
    }

    #[test]
    fn test_zero_size_source_is_immediately_complete() {
        let reporter = ProgressReporter::new(0);
        assert_eq!(reporter.percent(0), 100);
    }

    #[test]
    fn test_same_percent_never_emitted_twice() {
        let mut reporter = ProgressReporter::new(100);
        let receiver = reporter.subscribe();

        reporter.report(10);
        assert_eq!(reporter.last_percent(), Some(10));
        assert_eq!(*receiver.borrow(), 10);

        reporter.report(10);
        assert_eq!(reporter.last_percent(), Some(10));
    }

    #[test]
    fn test_limiter_denies_rapid_emissions() {
        let mut reporter = ProgressReporter::new(100);

        reporter.report(10);
        reporter.report(20);
        // Second distinct percent arrives inside the 100 ms window.
        assert_eq!(reporter.last_percent(), Some(10));
    }

    #[test]
    fn test_limiter_replenishes() {
        let mut reporter = ProgressReporter::new(100);

        reporter.report(10);
        std::thread::sleep(Duration::from_millis(120));
        reporter.report(20);
        assert_eq!(reporter.last_percent(), Some(20));
    }

    #[test]
    fn test_final_report_bypasses_limiter_but_not_dedup() {
        let mut reporter = ProgressReporter::new(100);
        let receiver = reporter.subscribe();

        reporter.report(50);
        reporter.report_final(100);
        assert_eq!(*receiver.borrow(), 100);

        // A second terminal report for the same percent is swallowed.
        reporter.report_final(100);
        assert_eq!(reporter.last_percent(), Some(100));
    }
}
