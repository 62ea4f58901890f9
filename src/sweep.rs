//! Periodic background update sweeps.
//!
//! Runs an update over every feed at a fixed interval until the shutdown
//! future resolves.

use std::future::Future;
use std::time::Duration;

use tokio::time::{interval, MissedTickBehavior};
use tracing::{error, info, warn};

use crate::domain::FeedScope;
use crate::updater::Updater;

#[derive(Debug, Clone)]
pub struct SweepConfig {
    /// Seconds between sweeps (default: 3600 = 1 hour)
    pub interval_secs: u64,
    /// Whether to sweep immediately on start
    pub update_on_start: bool,
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            interval_secs: 3600,
            update_on_start: true,
        }
    }
}

impl SweepConfig {
    /// Parse interval string like "1h", "30m", "6h", "1d"
    pub fn parse_interval(s: &str) -> Result<u64, String> {
        let s = s.trim().to_lowercase();

        let (digits, unit) = match s.char_indices().last() {
            Some((i, c)) if c.is_ascii_alphabetic() => (&s[..i], Some(c)),
            _ => (s.as_str(), None),
        };

        let multiplier = match unit {
            Some('d') => 86400,
            Some('h') => 3600,
            Some('m') => 60,
            Some('s') | None => 1,
            Some(other) => {
                return Err(format!(
                    "Unknown interval unit '{}'. Use format like '1h', '30m', '1d'",
                    other
                ))
            }
        };

        let value = digits
            .parse::<u64>()
            .map_err(|_| format!("Invalid interval: {}. Use format like '1h', '30m', '1d'", s))?;

        match value.checked_mul(multiplier) {
            Some(0) => Err("Interval must be greater than zero".to_string()),
            Some(secs) => Ok(secs),
            None => Err(format!("Interval too large: {}", s)),
        }
    }

    /// Format interval for display
    pub fn format_interval(secs: u64) -> String {
        if secs >= 86400 && secs.is_multiple_of(86400) {
            format!("{}d", secs / 86400)
        } else if secs >= 3600 && secs.is_multiple_of(3600) {
            format!("{}h", secs / 3600)
        } else if secs >= 60 && secs.is_multiple_of(60) {
            format!("{}m", secs / 60)
        } else {
            format!("{}s", secs)
        }
    }
}

pub struct Sweeper {
    updater: Updater,
    config: SweepConfig,
}

impl Sweeper {
    pub fn new(updater: Updater, config: SweepConfig) -> Self {
        Self { updater, config }
    }

    /// Sweeps until `shutdown` resolves. A sweep in progress at shutdown is
    /// dropped, which aborts its in-flight fetches.
    pub async fn run<F>(&self, shutdown: F) -> usize
    where
        F: Future<Output = ()>,
    {
        info!(
            interval = %SweepConfig::format_interval(self.config.interval_secs),
            "sweeper started"
        );

        let mut ticker = interval(Duration::from_secs(self.config.interval_secs.max(1)));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        if !self.config.update_on_start {
            // The first tick completes immediately.
            ticker.tick().await;
        }

        let mut sweeps = 0;
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                _ = ticker.tick() => {}
            }

            tokio::select! {
                _ = &mut shutdown => break,
                _ = self.sweep() => sweeps += 1,
            }
        }

        info!(sweeps, "sweeper stopped");
        sweeps
    }

    async fn sweep(&self) {
        match self.updater.update_all(&FeedScope::all()).await {
            Ok(report) if report.is_success() => {}
            Ok(report) => {
                for failure in &report.failures {
                    warn!(feed = %failure.url, error = %failure.error, "feed not updated");
                }
            }
            Err(e) => error!(error = %e, "sweep failed"),
        }
    }
}
