//! End-to-end pipeline test: canned feed -> poller -> reconciler -> store ->
//! aggregator, with a manual clock and an in-memory database.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Local, TimeZone};
use std::sync::Arc;

use station_tracker::{
    clock::ManualClock,
    config::Config,
    fetch::HttpClient,
    poller::Poller,
    reconcile::Reconciler,
    schedule::ScheduleLoader,
    stats::{Aggregator, day_of_week, parse_date_key},
    store::Store,
    uptime::UptimeTracker,
};

// 2026-03-10, a Tuesday
const DATE_KEY: &str = "20260310";

struct StubFeed(std::sync::Mutex<String>);

impl StubFeed {
    fn new(body: &str) -> Self {
        Self(std::sync::Mutex::new(body.to_string()))
    }

    fn set(&self, body: &str) {
        *self.0.lock().unwrap() = body.to_string();
    }
}

#[async_trait]
impl HttpClient for StubFeed {
    async fn get(&self, _url: &str) -> Result<Vec<u8>> {
        Ok(self.0.lock().unwrap().clone().into_bytes())
    }
}

fn feed_body(north_prediction: &str, south_prediction: &str) -> String {
    format!(
        r#"{{
            "status": "OK",
            "dataObject": [{{ "Markers": [
                {{ "DestName": "O'Hare", "RunNumber": 101,
                   "Predictions": [[40570.0, "California", "{north_prediction}"]] }},
                {{ "DestName": "Forest Park", "RunNumber": "202",
                   "Predictions": [[40570.0, "California", "{south_prediction}"]] }},
                {{ "DestName": "O'Hare", "RunNumber": 303,
                   "Predictions": [[40120.0, "Elsewhere", "2 min"]] }}
            ]}}]
        }}"#
    )
}

fn t(hour: u32, min: u32) -> DateTime<Local> {
    Local.with_ymd_and_hms(2026, 3, 10, hour, min, 0).unwrap()
}

struct Pipeline {
    store: Arc<Store>,
    clock: Arc<ManualClock>,
    poller: Poller<Arc<StubFeed>>,
    aggregator: Aggregator,
    snapshots_dir: std::path::PathBuf,
    _schedules: tempfile::TempDir,
    _snapshots: tempfile::TempDir,
}

fn pipeline(feed: Arc<StubFeed>) -> Pipeline {
    let schedules = tempfile::tempdir().unwrap();
    let snapshots = tempfile::tempdir().unwrap();

    let dow = day_of_week(parse_date_key(DATE_KEY).unwrap());
    for stop in ["30111", "30112"] {
        std::fs::write(
            schedules.path().join(format!("{stop}_{dow}.json")),
            r#"{ "totalPerDay": 6, "allDepartures": [], "hourlyTrainCount": { "10": 6 } }"#,
        )
        .unwrap();
    }

    let config = Config {
        schedules_dir: schedules.path().to_string_lossy().into_owned(),
        snapshots_dir: snapshots.path().to_string_lossy().into_owned(),
        ..Config::default()
    };

    let store = Arc::new(Store::open_in_memory().unwrap());
    let clock = Arc::new(ManualClock::new(t(10, 0)));

    let poller = Poller::new(
        config.clone(),
        feed,
        Reconciler::new(store.clone(), config.tolerance()),
        UptimeTracker::new(store.clone(), config.poll_interval_ms),
        clock.clone(),
    );
    let aggregator = Aggregator::new(
        store.clone(),
        ScheduleLoader::new(&config.schedules_dir),
        UptimeTracker::new(store.clone(), config.poll_interval_ms),
        clock.clone(),
        &config,
    );

    Pipeline {
        store,
        clock,
        poller,
        aggregator,
        snapshots_dir: snapshots.path().to_path_buf(),
        _schedules: schedules,
        _snapshots: snapshots,
    }
}

#[tokio::test]
async fn test_full_pipeline() {
    let feed = Arc::new(StubFeed::new(&feed_body("7 min", "Due")));
    let pipeline = pipeline(feed.clone());

    // first cycle at 10:00: run 101 -> 10:07 northbound, run 202 -> 10:01
    // southbound, run 303 reports another station and is ignored
    pipeline.poller.run_cycle().await.unwrap();

    // two minutes later both trains are closer; the estimates move but no
    // new events appear
    pipeline.clock.advance(Duration::minutes(2));
    feed.set(&feed_body("5 min", "Due"));
    pipeline.poller.run_cycle().await.unwrap();

    let events = pipeline
        .store
        .arrivals_between(t(10, 0), t(11, 0))
        .await
        .unwrap();
    assert_eq!(events.len(), 2);

    let north = events.iter().find(|e| e.stop_id == "30111").unwrap();
    assert_eq!(north.run, "101");
    assert_eq!(north.estimated_arrival, t(10, 7));
    assert_eq!(north.initial_prediction, t(10, 7));

    let south = events.iter().find(|e| e.stop_id == "30112").unwrap();
    assert_eq!(south.run, "202");
    assert_eq!(south.estimated_arrival, t(10, 3));
    assert_eq!(south.initial_prediction, t(10, 1));

    // live stats for the open day
    let body = pipeline.aggregator.stats_for_date(DATE_KEY).await.unwrap();
    let stats: serde_json::Value = serde_json::from_str(&body).unwrap();

    assert_eq!(stats["arrivalCt"]["30111"], 1);
    assert_eq!(stats["arrivalCt"]["30112"], 1);
    assert_eq!(stats["arrivalCt"]["total"], 2);
    assert_eq!(stats["onTimePerformance"]["30111"]["10"]["scheduled"], 6);
    assert_eq!(
        stats["onTimePerformance"]["30111"]["10"]["actualArrivals"],
        1
    );
    // two completed cycles of thirty expected
    let uptime = stats["uptimeLog"]["10"].as_f64().unwrap();
    assert!((uptime - 2.0 / 30.0).abs() < 1e-9);

    // the open day is never snapshotted
    assert!(!pipeline.snapshots_dir.join(format!("{DATE_KEY}.json")).exists());
}

#[tokio::test]
async fn test_closed_day_is_served_from_snapshot() {
    let feed = Arc::new(StubFeed::new(&feed_body("Due", "Due")));
    let pipeline = pipeline(feed);

    pipeline.poller.run_cycle().await.unwrap();

    // next day: the requested date is closed
    pipeline.clock.set(Local.with_ymd_and_hms(2026, 3, 11, 8, 0, 0).unwrap());

    let first = pipeline.aggregator.stats_for_date(DATE_KEY).await.unwrap();
    assert!(pipeline.snapshots_dir.join(format!("{DATE_KEY}.json")).exists());

    let second = pipeline.aggregator.stats_for_date(DATE_KEY).await.unwrap();
    assert_eq!(first, second);
}

#[tokio::test]
async fn test_timestamps_serialize_with_local_offset() {
    let feed = Arc::new(StubFeed::new(&feed_body("Due", "Due")));
    let pipeline = pipeline(feed);
    pipeline.poller.run_cycle().await.unwrap();

    let body = pipeline.aggregator.stats_for_date(DATE_KEY).await.unwrap();
    let stats: serde_json::Value = serde_json::from_str(&body).unwrap();

    let arrival = stats["arrivals"]["30111"][0]["estimatedArrival"]
        .as_str()
        .unwrap();
    // local-offset ISO-8601, never the "Z" suffix
    assert!(!arrival.ends_with('Z'));
    let parsed = DateTime::parse_from_rfc3339(arrival).unwrap();
    assert_eq!(parsed.with_timezone(&Local), t(10, 1));
}
