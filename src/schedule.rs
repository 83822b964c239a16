//! Loader for the per-stop, per-day schedule artifacts.
//!
//! Artifacts live at `{dir}/{stop_id}_{day}.json` with `day` zero-indexed
//! from Monday, and are produced offline from static GTFS data (see
//! [`crate::gtfs`]). A missing artifact is a hard error for the requesting
//! stats call.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Scheduled departures for one stop on one day of the week.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleEntry {
    pub total_per_day: usize,
    /// Sorted, deduplicated `HH:MM:SS` departure times.
    pub all_departures: Vec<String>,
    /// Departure count per zero-padded hour key, `"00"` through `"23"`.
    pub hourly_train_count: BTreeMap<String, u32>,
}

impl ScheduleEntry {
    pub fn count_for_hour(&self, hour: u32) -> u32 {
        self.hourly_train_count
            .get(&format!("{hour:02}"))
            .copied()
            .unwrap_or(0)
    }
}

pub struct ScheduleLoader {
    dir: PathBuf,
}

impl ScheduleLoader {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Loads the artifact for a stop and day of week (Monday = 0).
    pub fn load(&self, stop_id: &str, day_of_week: u32) -> Result<ScheduleEntry> {
        let path = self.dir.join(format!("{stop_id}_{day_of_week}.json"));
        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("missing schedule artifact {}", path.display()))?;
        serde_json::from_str(&content)
            .with_context(|| format!("malformed schedule artifact {}", path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_artifact() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("30111_2.json"),
            r#"{
                "totalPerDay": 3,
                "allDepartures": ["08:05:00", "08:25:00", "09:10:00"],
                "hourlyTrainCount": { "08": 2, "09": 1 }
            }"#,
        )
        .unwrap();

        let loader = ScheduleLoader::new(dir.path());
        let entry = loader.load("30111", 2).unwrap();
        assert_eq!(entry.total_per_day, 3);
        assert_eq!(entry.count_for_hour(8), 2);
        assert_eq!(entry.count_for_hour(9), 1);
        assert_eq!(entry.count_for_hour(10), 0);
    }

    #[test]
    fn test_missing_artifact_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let loader = ScheduleLoader::new(dir.path());

        let err = loader.load("30111", 0).unwrap_err();
        assert!(err.to_string().contains("30111_0.json"));
    }
}
