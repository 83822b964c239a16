//! Arrival reconciliation: collapsing a noisy stream of repeated predictions
//! into one event per physical passage.
//!
//! Every poll cycle re-reports the same approaching train with a fresher
//! estimate. Two predictions for the same run and stop whose estimates fall
//! within the tolerance window are the same physical arrival: the existing
//! event keeps its identity and first prediction, only the estimate moves.
//! A prediction outside every window is a genuinely new passage and gets its
//! own event, keyed by the predicted minute of that first sighting, so one
//! run yields at most one event per minute bucket.

use crate::store::{ArrivalEvent, Store, Upsert};
use anyhow::Result;
use chrono::{DateTime, Duration, Local};
use std::sync::Arc;
use tracing::debug;

pub struct Reconciler {
    store: Arc<Store>,
    tolerance: Duration,
}

impl Reconciler {
    pub fn new(store: Arc<Store>, tolerance: Duration) -> Self {
        Self { store, tolerance }
    }

    /// Merges one observed prediction into the arrivals store. Storage errors
    /// propagate to the caller, which fails the whole cycle.
    pub async fn reconcile(
        &self,
        run: &str,
        stop_id: &str,
        estimated_arrival: DateTime<Local>,
        now: DateTime<Local>,
    ) -> Result<Upsert> {
        let earliest = estimated_arrival - self.tolerance;
        let candidate = ArrivalEvent {
            id: event_id(stop_id, run, estimated_arrival),
            run: run.to_string(),
            stop_id: stop_id.to_string(),
            estimated_arrival,
            initial_prediction: estimated_arrival,
            recorded_at: now,
        };

        let result = self.store.upsert_within_window(&candidate, earliest).await?;
        match &result {
            Upsert::Created(id) => debug!(run, stop_id, id = %id, "New arrival event"),
            Upsert::Updated(id) => debug!(run, stop_id, id = %id, "Arrival estimate updated"),
        }
        Ok(result)
    }
}

/// Deterministic event key from stop, run, and the predicted minute of the
/// first sighting.
fn event_id(stop_id: &str, run: &str, first_sighting: DateTime<Local>) -> String {
    format!("{stop_id}_{run}_{}", first_sighting.format("%Y%m%d-%H%M"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t(hour: u32, min: u32) -> DateTime<Local> {
        Local.with_ymd_and_hms(2026, 3, 10, hour, min, 0).unwrap()
    }

    fn reconciler(store: &Arc<Store>) -> Reconciler {
        Reconciler::new(store.clone(), Duration::minutes(30))
    }

    #[test]
    fn test_event_id_format() {
        assert_eq!(event_id("30111", "101", t(10, 7)), "30111_101_20260310-1007");
    }

    #[tokio::test]
    async fn test_repeated_predictions_converge_to_one_event() {
        let store = Arc::new(Store::open_in_memory().unwrap());
        let reconciler = reconciler(&store);

        let first = reconciler
            .reconcile("101", "30111", t(10, 0), t(9, 50))
            .await
            .unwrap();
        assert_eq!(first, Upsert::Created("30111_101_20260310-1000".to_string()));

        let second = reconciler
            .reconcile("101", "30111", t(10, 5), t(9, 52))
            .await
            .unwrap();
        assert_eq!(second, Upsert::Updated("30111_101_20260310-1000".to_string()));

        let event = store
            .get_arrival("30111_101_20260310-1000")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(event.estimated_arrival, t(10, 5));
        assert_eq!(event.initial_prediction, t(10, 0));
        assert_eq!(event.recorded_at, t(9, 50));
    }

    #[tokio::test]
    async fn test_distinct_trips_of_same_run_get_distinct_events() {
        let store = Arc::new(Store::open_in_memory().unwrap());
        let reconciler = reconciler(&store);

        reconciler
            .reconcile("101", "30111", t(10, 0), t(9, 55))
            .await
            .unwrap();

        // same run again, 40 minutes later than the tracked estimate
        let second = reconciler
            .reconcile("101", "30111", t(10, 40), t(10, 35))
            .await
            .unwrap();
        assert_eq!(second, Upsert::Created("30111_101_20260310-1040".to_string()));
    }

    #[tokio::test]
    async fn test_directions_are_reconciled_independently() {
        let store = Arc::new(Store::open_in_memory().unwrap());
        let reconciler = reconciler(&store);

        let north = reconciler
            .reconcile("101", "30111", t(10, 0), t(9, 55))
            .await
            .unwrap();
        let south = reconciler
            .reconcile("101", "30112", t(10, 2), t(9, 55))
            .await
            .unwrap();

        assert!(matches!(north, Upsert::Created(_)));
        assert!(matches!(south, Upsert::Created(_)));
    }
}
