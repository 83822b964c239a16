//! The poll cycle: fetch the feed, reconcile every prediction for the target
//! station, then credit uptime.
//!
//! Cycles are serialized: the loop awaits the interval tick and runs the
//! cycle body to completion before awaiting the next one, so a slow fetch
//! delays the following cycle instead of overlapping it. A failed cycle is
//! logged and dropped with no uptime credit; the next tick simply tries
//! again. A feed that answers with a non-OK status is a quiet empty cycle,
//! also without uptime credit.

use crate::clock::Clock;
use crate::config::Config;
use crate::feed::{self, FeedResponse};
use crate::fetch::{HttpClient, fetch_json};
use crate::reconcile::Reconciler;
use crate::uptime::UptimeTracker;
use anyhow::Result;
use std::sync::Arc;
use tracing::{debug, error};

pub struct Poller<C: HttpClient> {
    config: Config,
    client: C,
    reconciler: Reconciler,
    uptime: UptimeTracker,
    clock: Arc<dyn Clock>,
}

impl<C: HttpClient> Poller<C> {
    pub fn new(
        config: Config,
        client: C,
        reconciler: Reconciler,
        uptime: UptimeTracker,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            config,
            client,
            reconciler,
            uptime,
            clock,
        }
    }

    /// Runs cycles forever on the configured interval. The first cycle fires
    /// immediately.
    pub async fn run(self) {
        let period = std::time::Duration::from_millis(self.config.poll_interval_ms);
        let mut ticker = tokio::time::interval(period);
        loop {
            ticker.tick().await;
            if let Err(error) = self.run_cycle().await {
                error!(error = %error, "Poll cycle failed");
            }
        }
    }

    /// One poll cycle. Uptime is credited only when the whole cycle — fetch,
    /// parse and every reconciliation — succeeded.
    #[tracing::instrument(skip(self))]
    pub async fn run_cycle(&self) -> Result<()> {
        let response: FeedResponse = fetch_json(&self.client, &self.config.feed_url).await?;
        if response.status != "OK" {
            debug!(status = %response.status, "Feed status not OK, skipping cycle");
            return Ok(());
        }

        let mut reconciled = 0;
        for marker in response.markers() {
            let Some(text) = marker.prediction_for(self.config.target_station_code) else {
                continue;
            };
            let now = self.clock.now();
            let Some(estimated) = feed::parse_prediction(text, now) else {
                debug!(run = %marker.run_number, text, "Unparseable prediction, skipping train");
                continue;
            };
            let stop_id = feed::resolve_stop_id(&marker.dest_name, &self.config);
            self.reconciler
                .reconcile(&marker.run_number, stop_id, estimated, now)
                .await?;
            reconciled += 1;
        }

        self.uptime.record_completed_cycle(self.clock.now()).await?;
        debug!(reconciled, "Cycle complete");
        Ok(())
    }
}
