//! Per-hour poll-cycle accounting.
//!
//! Each fully successful cycle credits the current calendar hour. The ratio
//! of completed to expected cycles is the data-quality signal for that
//! hour's arrival counts; there is no other observability for missed cycles.

use crate::store::Store;
use anyhow::Result;
use chrono::{DateTime, Local};
use std::sync::Arc;

#[derive(Clone)]
pub struct UptimeTracker {
    store: Arc<Store>,
    expected_cycles: i64,
}

impl UptimeTracker {
    pub fn new(store: Arc<Store>, poll_interval_ms: u64) -> Self {
        Self {
            store,
            expected_cycles: (3_600_000 / poll_interval_ms) as i64,
        }
    }

    pub async fn record_completed_cycle(&self, now: DateTime<Local>) -> Result<()> {
        self.store
            .record_cycle(&hour_key(now), self.expected_cycles)
            .await
    }

    /// Raw completed/expected ratio for one hour key. Missing hours count as
    /// zero. Can exceed 1.0 when more cycles ran than expected (interval
    /// drift); consumers clamp.
    pub async fn ratio_for(&self, hour_key: &str) -> Result<f64> {
        match self.store.uptime_for_hour(hour_key).await? {
            Some((completed, expected)) => Ok(ratio(completed, expected)),
            None => Ok(0.0),
        }
    }

    /// The 24 hourly ratios for a `YYYYMMDD` date key, clamped to 1.0.
    pub async fn daily_ratios(&self, date_key: &str) -> Result<Vec<f64>> {
        let mut ratios = Vec::with_capacity(24);
        for hour in 0..24 {
            let raw = self.ratio_for(&hour_key_at(date_key, hour)).await?;
            ratios.push(raw.min(1.0));
        }
        Ok(ratios)
    }
}

/// Hour key for a timestamp: `YYYYMMDD-HH00`.
pub fn hour_key(at: DateTime<Local>) -> String {
    at.format("%Y%m%d-%H00").to_string()
}

/// Hour key for an hour of a `YYYYMMDD` date key.
pub fn hour_key_at(date_key: &str, hour: u32) -> String {
    format!("{date_key}-{hour:02}00")
}

pub fn ratio(completed: i64, expected: i64) -> f64 {
    if expected <= 0 {
        0.0
    } else {
        completed as f64 / expected as f64
    }
}
