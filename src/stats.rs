//! Daily on-time-performance aggregation.
//!
//! For a `YYYYMMDD` date key: join that day's reconciled arrivals with the
//! published schedule for the matching day of week, per stop and per hour,
//! and attach the hourly uptime ratios as the data-quality signal. Days that
//! are fully in the past are snapshotted to disk and served verbatim from
//! the snapshot afterwards; the current day is always computed live.

use crate::clock::Clock;
use crate::config::Config;
use crate::schedule::{ScheduleEntry, ScheduleLoader};
use crate::store::{ArrivalEvent, Store};
use crate::uptime::UptimeTracker;
use anyhow::{Context, Result};
use chrono::{DateTime, Datelike, Duration, Local, NaiveDate, TimeZone, Timelike};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info};

/// Actual versus scheduled arrivals for one hour of one direction.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HourlyPerformance {
    pub scheduled: u32,
    pub actual_arrivals: usize,
}

/// Full stats payload for one calendar date, keyed by stop id where
/// per-direction. Timestamps serialize with the local UTC offset.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DailyStats {
    pub date: DateTime<Local>,
    pub arrivals: BTreeMap<String, Vec<ArrivalEvent>>,
    /// Arrival count per stop id, plus a `"total"` entry.
    pub arrival_ct: BTreeMap<String, usize>,
    pub scheduled: BTreeMap<String, ScheduleEntry>,
    pub on_time_performance: BTreeMap<String, BTreeMap<u32, HourlyPerformance>>,
    /// Clamped uptime ratio per hour of day.
    pub uptime_log: BTreeMap<u32, f64>,
}

pub struct Aggregator {
    store: Arc<Store>,
    schedules: ScheduleLoader,
    uptime: UptimeTracker,
    clock: Arc<dyn Clock>,
    stop_ids: [String; 2],
    snapshots_dir: PathBuf,
}

impl Aggregator {
    pub fn new(
        store: Arc<Store>,
        schedules: ScheduleLoader,
        uptime: UptimeTracker,
        clock: Arc<dyn Clock>,
        config: &Config,
    ) -> Self {
        Self {
            store,
            schedules,
            uptime,
            clock,
            stop_ids: config.stop_ids(),
            snapshots_dir: PathBuf::from(&config.snapshots_dir),
        }
    }

    /// Serves the stats JSON for a date key. A closed date (strictly before
    /// today) is answered from its snapshot when one exists, and snapshotted
    /// after the first computation, so repeated requests are byte-identical.
    /// Today and future dates are computed live and never cached.
    #[tracing::instrument(skip(self))]
    pub async fn stats_for_date(&self, date_key: &str) -> Result<String> {
        let date = parse_date_key(date_key)?;
        let closed = date < self.clock.now().date_naive();
        let snapshot = self.snapshots_dir.join(format!("{date_key}.json"));

        if closed && snapshot.exists() {
            debug!(path = %snapshot.display(), "Serving closed-day snapshot");
            return std::fs::read_to_string(&snapshot)
                .with_context(|| format!("failed to read snapshot {}", snapshot.display()));
        }

        let stats = self.compute_daily_stats(date_key).await?;
        let body = serde_json::to_string(&stats)?;

        if closed {
            std::fs::create_dir_all(&self.snapshots_dir)?;
            std::fs::write(&snapshot, &body)
                .with_context(|| format!("failed to write snapshot {}", snapshot.display()))?;
            info!(date = date_key, "Closed-day snapshot written");
        }

        Ok(body)
    }

    pub async fn compute_daily_stats(&self, date_key: &str) -> Result<DailyStats> {
        let date = parse_date_key(date_key)?;
        let dow = day_of_week(date);

        let midnight = date.and_hms_opt(0, 0, 0).context("invalid midnight")?;
        let start = Local
            .from_local_datetime(&midnight)
            .earliest()
            .context("could not resolve local start of day")?;
        let end = start + Duration::days(1);

        let events = self.store.arrivals_between(start, end).await?;
        debug!(date = date_key, events = events.len(), "Arrivals queried");

        let mut arrivals = BTreeMap::new();
        let mut arrival_ct = BTreeMap::new();
        let mut scheduled = BTreeMap::new();
        let mut on_time_performance = BTreeMap::new();
        let mut total = 0;

        for stop_id in &self.stop_ids {
            let for_stop: Vec<ArrivalEvent> = events
                .iter()
                .filter(|e| &e.stop_id == stop_id)
                .cloned()
                .collect();
            let entry = self.schedules.load(stop_id, dow)?;

            let mut hours = BTreeMap::new();
            for hour in 0..24u32 {
                hours.insert(
                    hour,
                    HourlyPerformance {
                        scheduled: entry.count_for_hour(hour),
                        actual_arrivals: for_stop
                            .iter()
                            .filter(|e| e.estimated_arrival.hour() == hour)
                            .count(),
                    },
                );
            }

            total += for_stop.len();
            arrival_ct.insert(stop_id.clone(), for_stop.len());
            arrivals.insert(stop_id.clone(), for_stop);
            scheduled.insert(stop_id.clone(), entry);
            on_time_performance.insert(stop_id.clone(), hours);
        }
        arrival_ct.insert("total".to_string(), total);

        let uptime_log = self
            .uptime
            .daily_ratios(date_key)
            .await?
            .into_iter()
            .enumerate()
            .map(|(hour, ratio)| (hour as u32, ratio))
            .collect();

        Ok(DailyStats {
            date: start,
            arrivals,
            arrival_ct,
            scheduled,
            on_time_performance,
            uptime_log,
        })
    }
}

/// Parses an 8-digit `YYYYMMDD` date key.
pub fn parse_date_key(date_key: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(date_key, "%Y%m%d")
        .with_context(|| format!("invalid date key {date_key:?}, expected YYYYMMDD"))
}

/// Day of week with Monday = 0 through Sunday = 6.
pub fn day_of_week(date: NaiveDate) -> u32 {
    date.weekday().num_days_from_monday()
}
