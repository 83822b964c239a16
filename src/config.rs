//! Runtime configuration.
//!
//! One explicit struct handed to every component at construction. Defaults
//! describe the CTA Blue Line stop at California: station marker code 40570,
//! platform 30111 northbound and 30112 southbound.

use anyhow::{Context, Result};
use chrono::Duration;
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Prediction feed endpoint polled on every cycle.
    pub feed_url: String,
    /// Station code the feed uses in prediction entries. The feed reports
    /// this as a decimal number.
    pub target_station_code: f64,
    pub stop_id_northbound: String,
    pub stop_id_southbound: String,
    /// Terminal names whose prefix on a destination marks a train as
    /// northbound. Anything else is southbound.
    pub northbound_destinations: Vec<String>,
    /// Poll interval in milliseconds.
    pub poll_interval_ms: u64,
    /// Two predictions for the same run and stop within this window are the
    /// same physical arrival.
    pub tolerance_minutes: i64,
    /// Hard cap on a single feed fetch, in seconds. An exceeded fetch aborts
    /// the cycle.
    pub fetch_timeout_secs: u64,
    pub db_path: String,
    pub schedules_dir: String,
    pub snapshots_dir: String,
    pub public_dir: String,
    pub port: u16,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            feed_url:
                "https://www.transitchicago.com/traintracker/PredictionMap/tmTrains.aspx?line=B&MaxPredictions=6"
                    .to_string(),
            target_station_code: 40570.0,
            stop_id_northbound: "30111".to_string(),
            stop_id_southbound: "30112".to_string(),
            northbound_destinations: vec![
                "O'Hare".to_string(),
                "Rosemont".to_string(),
                "Jefferson Park".to_string(),
            ],
            poll_interval_ms: 2 * 60 * 1000,
            tolerance_minutes: 30,
            fetch_timeout_secs: 5,
            db_path: "station_tracker.db".to_string(),
            schedules_dir: "schedules".to_string(),
            snapshots_dir: "history".to_string(),
            public_dir: "public".to_string(),
            port: 3000,
        }
    }
}

impl Config {
    /// Loads the config from a JSON file, or returns the defaults when no
    /// path is given. Absent fields fall back to their defaults.
    pub fn load(path: Option<&str>) -> Result<Self> {
        match path {
            Some(path) => {
                let content = std::fs::read_to_string(path)
                    .with_context(|| format!("failed to read config file {path}"))?;
                serde_json::from_str(&content)
                    .with_context(|| format!("failed to parse config file {path}"))
            }
            None => Ok(Self::default()),
        }
    }

    pub fn tolerance(&self) -> Duration {
        Duration::minutes(self.tolerance_minutes)
    }

    /// Poll cycles expected per calendar hour at the configured interval.
    pub fn expected_cycles_per_hour(&self) -> i64 {
        (3_600_000 / self.poll_interval_ms) as i64
    }

    pub fn stop_ids(&self) -> [String; 2] {
        [
            self.stop_id_northbound.clone(),
            self.stop_id_southbound.clone(),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_cycles_per_hour() {
        let config = Config::default();
        // 2 minute interval -> 30 cycles per hour
        assert_eq!(config.expected_cycles_per_hour(), 30);
    }

    #[test]
    fn test_load_partial_file_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{ "port": 8080, "tolerance_minutes": 45 }"#).unwrap();

        let config = Config::load(path.to_str()).unwrap();
        assert_eq!(config.port, 8080);
        assert_eq!(config.tolerance_minutes, 45);
        assert_eq!(config.stop_id_northbound, "30111");
    }

    #[test]
    fn test_load_missing_file_fails() {
        assert!(Config::load(Some("does-not-exist.json")).is_err());
    }
}
