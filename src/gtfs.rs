//! Offline builder for the schedule artifacts, from static GTFS data.
//!
//! Reads `trips.txt`, `calendar.txt` and `stop_times.txt`, extracts every
//! departure for the tracked stops on the target route, and writes one
//! artifact per stop and day of week: `{out_dir}/{stop_id}_{day}.json`,
//! Monday = 0. Departure times are deduplicated per stop/day; GTFS
//! past-midnight hours of "24" are folded into hour "00".

use crate::schedule::ScheduleEntry;
use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::Path;
use tracing::info;

#[derive(Debug, Deserialize)]
struct TripRow {
    route_id: String,
    service_id: String,
    trip_id: String,
}

#[derive(Debug, Deserialize)]
struct CalendarRow {
    service_id: String,
    monday: u8,
    tuesday: u8,
    wednesday: u8,
    thursday: u8,
    friday: u8,
    saturday: u8,
    sunday: u8,
}

impl CalendarRow {
    fn days(&self) -> [bool; 7] {
        [
            self.monday == 1,
            self.tuesday == 1,
            self.wednesday == 1,
            self.thursday == 1,
            self.friday == 1,
            self.saturday == 1,
            self.sunday == 1,
        ]
    }
}

#[derive(Debug, Deserialize)]
struct StopTimeRow {
    trip_id: String,
    departure_time: String,
    stop_id: String,
}

/// Builds all artifacts; returns the number of files written (one per stop
/// and day of week, empty days included).
pub fn build_schedules(
    gtfs_dir: &Path,
    out_dir: &Path,
    route: &str,
    stop_ids: &[String],
) -> Result<usize> {
    let trips_to_services = trips_for_route(gtfs_dir, route)?;
    let services_to_days = days_for_services(gtfs_dir, &trips_to_services)?;

    // (stop, day) -> deduplicated departure times
    let mut departures: HashMap<(String, usize), BTreeSet<String>> = HashMap::new();

    let stop_times_path = gtfs_dir.join("stop_times.txt");
    let mut reader = csv::Reader::from_path(&stop_times_path)
        .with_context(|| format!("failed to open {}", stop_times_path.display()))?;
    for row in reader.deserialize() {
        let row: StopTimeRow = row?;
        if !stop_ids.contains(&row.stop_id) {
            continue;
        }
        let Some(service_id) = trips_to_services.get(&row.trip_id) else {
            continue;
        };
        let Some(days) = services_to_days.get(service_id) else {
            continue;
        };
        for (day, active) in days.iter().enumerate() {
            if *active {
                departures
                    .entry((row.stop_id.clone(), day))
                    .or_default()
                    .insert(row.departure_time.clone());
            }
        }
    }

    std::fs::create_dir_all(out_dir)
        .with_context(|| format!("failed to create {}", out_dir.display()))?;

    let mut written = 0;
    for stop_id in stop_ids {
        for day in 0..7 {
            let times = departures
                .remove(&(stop_id.clone(), day))
                .unwrap_or_default();
            let entry = schedule_entry(times);
            let path = out_dir.join(format!("{stop_id}_{day}.json"));
            std::fs::write(&path, serde_json::to_string(&entry)?)
                .with_context(|| format!("failed to write {}", path.display()))?;
            info!(
                stop_id = %stop_id,
                day,
                departures = entry.total_per_day,
                "Schedule artifact written"
            );
            written += 1;
        }
    }

    Ok(written)
}

/// trip id -> service id, for trips on the target route.
fn trips_for_route(gtfs_dir: &Path, route: &str) -> Result<HashMap<String, String>> {
    let path = gtfs_dir.join("trips.txt");
    let mut reader = csv::Reader::from_path(&path)
        .with_context(|| format!("failed to open {}", path.display()))?;

    let mut trips = HashMap::new();
    for row in reader.deserialize() {
        let row: TripRow = row?;
        if row.route_id.starts_with(route) {
            trips.insert(row.trip_id, row.service_id);
        }
    }
    Ok(trips)
}

/// service id -> active-day flags (Monday first), for referenced services.
fn days_for_services(
    gtfs_dir: &Path,
    trips_to_services: &HashMap<String, String>,
) -> Result<HashMap<String, [bool; 7]>> {
    let path = gtfs_dir.join("calendar.txt");
    let mut reader = csv::Reader::from_path(&path)
        .with_context(|| format!("failed to open {}", path.display()))?;

    let mut services = HashMap::new();
    for row in reader.deserialize() {
        let row: CalendarRow = row?;
        if trips_to_services.values().any(|s| *s == row.service_id) {
            services.insert(row.service_id.clone(), row.days());
        }
    }
    Ok(services)
}

fn schedule_entry(times: BTreeSet<String>) -> ScheduleEntry {
    let mut hourly: BTreeMap<String, u32> = BTreeMap::new();
    for time in &times {
        *hourly.entry(hour_bucket(time)).or_insert(0) += 1;
    }
    ScheduleEntry {
        total_per_day: times.len(),
        all_departures: times.into_iter().collect(),
        hourly_train_count: hourly,
    }
}

/// Hour key for a GTFS `HH:MM:SS` time; hour "24" folds into "00".
fn hour_bucket(time: &str) -> String {
    if time.starts_with("24") {
        "00".to_string()
    } else {
        time.chars().take(2).collect()
    }
}
