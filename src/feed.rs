//! Wire model of the prediction feed and prediction-text parsing.
//!
//! The feed is JSON with a top-level `status` and one data object carrying
//! vehicle markers. Each marker reports a destination name, a run number,
//! and per-station predictions of the form `[stationCode, stationName,
//! predictionText]` where the text is `"Due"` or `"N min"`.

use crate::config::Config;
use chrono::{DateTime, Duration, Local};
use serde::{Deserialize, Deserializer};

#[derive(Debug, Deserialize)]
pub struct FeedResponse {
    pub status: String,
    #[serde(rename = "dataObject", default)]
    pub data_object: Vec<DataObject>,
}

impl FeedResponse {
    /// Markers of the first data object; the feed only ever populates one.
    pub fn markers(&self) -> &[Marker] {
        self.data_object
            .first()
            .map(|d| d.markers.as_slice())
            .unwrap_or(&[])
    }
}

#[derive(Debug, Deserialize)]
pub struct DataObject {
    #[serde(rename = "Markers", default)]
    pub markers: Vec<Marker>,
}

#[derive(Debug, Deserialize)]
pub struct Marker {
    #[serde(rename = "DestName")]
    pub dest_name: String,
    /// Opaque identifier of the physical train run. The feed emits it as a
    /// number or a string depending on the line; normalized to a string.
    #[serde(rename = "RunNumber", deserialize_with = "run_number")]
    pub run_number: String,
    #[serde(rename = "Predictions", default)]
    pub predictions: Vec<Vec<serde_json::Value>>,
}

impl Marker {
    /// Prediction text this marker reports for `station_code`, if any.
    pub fn prediction_for(&self, station_code: f64) -> Option<&str> {
        self.predictions
            .iter()
            .find(|p| p.first().and_then(|v| v.as_f64()) == Some(station_code))
            .and_then(|p| p.get(2))
            .and_then(|v| v.as_str())
    }
}

fn run_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::String(s) => Ok(s),
        serde_json::Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "run number must be a string or number, got {other}"
        ))),
    }
}

/// Converts prediction text to an absolute arrival estimate relative to
/// `now`. `"Due"` means one minute out; otherwise the first run of digits is
/// the minute count. Text with no digits yields `None` and the train is
/// skipped.
pub fn parse_prediction(text: &str, now: DateTime<Local>) -> Option<DateTime<Local>> {
    if text.contains("Due") {
        return Some(now + Duration::minutes(1));
    }
    let digits: String = text
        .chars()
        .skip_while(|c| !c.is_ascii_digit())
        .take_while(|c| c.is_ascii_digit())
        .collect();
    let minutes: i64 = digits.parse().ok()?;
    Some(now + Duration::minutes(minutes))
}

/// Resolves a marker's destination to one of the two platform ids: a
/// destination starting with a known northbound terminal name is northbound,
/// anything else is southbound.
pub fn resolve_stop_id<'a>(dest_name: &str, config: &'a Config) -> &'a str {
    if config
        .northbound_destinations
        .iter()
        .any(|terminal| dest_name.starts_with(terminal.as_str()))
    {
        &config.stop_id_northbound
    } else {
        &config.stop_id_southbound
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t() -> DateTime<Local> {
        Local.with_ymd_and_hms(2026, 3, 10, 10, 0, 0).unwrap()
    }

    #[test]
    fn test_due_is_one_minute_out() {
        assert_eq!(parse_prediction("Due", t()), Some(t() + Duration::minutes(1)));
    }

    #[test]
    fn test_minutes_prediction() {
        assert_eq!(
            parse_prediction("7 min", t()),
            Some(t() + Duration::minutes(7))
        );
    }

    #[test]
    fn test_unparseable_prediction_is_skipped() {
        assert_eq!(parse_prediction("Delayed", t()), None);
        assert_eq!(parse_prediction("", t()), None);
    }

    #[test]
    fn test_direction_resolution() {
        let config = Config::default();
        assert_eq!(resolve_stop_id("O'Hare", &config), "30111");
        assert_eq!(resolve_stop_id("Rosemont via Loop", &config), "30111");
        assert_eq!(resolve_stop_id("Forest Park", &config), "30112");
        assert_eq!(resolve_stop_id("UIC-Halsted", &config), "30112");
    }

    #[test]
    fn test_feed_deserialization() {
        let body = r#"{
            "status": "OK",
            "dataObject": [{ "Markers": [
                { "DestName": "O'Hare", "RunNumber": 101,
                  "Predictions": [[40570.0, "California", "7 min"]] },
                { "DestName": "Forest Park", "RunNumber": "202",
                  "Predictions": [[40120.0, "Elsewhere", "Due"]] }
            ]}]
        }"#;

        let feed: FeedResponse = serde_json::from_str(body).unwrap();
        assert_eq!(feed.status, "OK");

        let markers = feed.markers();
        assert_eq!(markers.len(), 2);
        // numeric run numbers are normalized to strings
        assert_eq!(markers[0].run_number, "101");
        assert_eq!(markers[1].run_number, "202");

        assert_eq!(markers[0].prediction_for(40570.0), Some("7 min"));
        assert_eq!(markers[1].prediction_for(40570.0), None);
    }

    #[test]
    fn test_feed_without_data_object() {
        let feed: FeedResponse = serde_json::from_str(r#"{ "status": "Error" }"#).unwrap();
        assert!(feed.markers().is_empty());
    }
}
