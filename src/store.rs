//! SQLite persistence for arrival events and uptime counters.
//!
//! Arrivals are append-only: an event is created once per physical passage
//! and only its `estimated_arrival` is ever rewritten. The tolerance-window
//! upsert and the uptime increment are the two write paths, both atomic:
//! the upsert runs its lookup and write under one connection guard, and the
//! uptime counter uses SQL `ON CONFLICT` increment so overlapping writers
//! cannot lose updates.

use anyhow::{Context, Result};
use chrono::{DateTime, Local, TimeZone};
use rusqlite::{Connection, OptionalExtension, params};
use serde::Serialize;
use tokio::sync::Mutex;

/// One physical train's passage estimate at a platform.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ArrivalEvent {
    /// Derived key: `{stop}_{run}_{YYYYMMDD-HHMM}` of the first sighting's
    /// predicted minute.
    pub id: String,
    pub run: String,
    pub stop_id: String,
    /// Latest prediction seen for this passage. Rewritten on every sighting
    /// inside the tolerance window.
    pub estimated_arrival: DateTime<Local>,
    /// First prediction ever seen for this passage. Immutable.
    pub initial_prediction: DateTime<Local>,
    pub recorded_at: DateTime<Local>,
}

/// Outcome of a tolerance-window upsert.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Upsert {
    Created(String),
    Updated(String),
}

pub struct Store {
    conn: Mutex<Connection>,
}

type RawEvent = (String, String, String, i64, i64, i64);

impl Store {
    pub fn open(path: &str) -> Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("failed to open database at {path}"))?;
        Self::init(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Fresh in-memory database, used by tests.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::init(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn init(conn: &Connection) -> Result<()> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS arrivals (
                id                 TEXT PRIMARY KEY,
                run                TEXT NOT NULL,
                stop_id            TEXT NOT NULL,
                estimated_arrival  INTEGER NOT NULL,
                initial_prediction INTEGER NOT NULL,
                recorded_at        INTEGER NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_arrivals_run_stop
                ON arrivals (run, stop_id, estimated_arrival);
            CREATE INDEX IF NOT EXISTS idx_arrivals_estimated
                ON arrivals (estimated_arrival);
            CREATE TABLE IF NOT EXISTS uptime (
                hour_key         TEXT PRIMARY KEY,
                completed_cycles INTEGER NOT NULL,
                expected_cycles  INTEGER NOT NULL
            );",
        )?;
        Ok(())
    }

    /// Atomically merges `candidate` into the arrivals table: if an event for
    /// the same run and stop has an estimate strictly later than `earliest`,
    /// only that event's `estimated_arrival` is rewritten; otherwise the
    /// candidate is inserted as a new event. When several events fall inside
    /// the window, the one with the latest estimate wins the tie-break.
    pub async fn upsert_within_window(
        &self,
        candidate: &ArrivalEvent,
        earliest: DateTime<Local>,
    ) -> Result<Upsert> {
        let conn = self.conn.lock().await;
        match Self::find_within_window(&conn, &candidate.run, &candidate.stop_id, earliest)? {
            Some(existing) => {
                conn.execute(
                    "UPDATE arrivals SET estimated_arrival = ?1 WHERE id = ?2",
                    params![candidate.estimated_arrival.timestamp(), existing.id],
                )?;
                Ok(Upsert::Updated(existing.id))
            }
            None => {
                conn.execute(
                    "INSERT INTO arrivals
                        (id, run, stop_id, estimated_arrival, initial_prediction, recorded_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                    params![
                        candidate.id,
                        candidate.run,
                        candidate.stop_id,
                        candidate.estimated_arrival.timestamp(),
                        candidate.initial_prediction.timestamp(),
                        candidate.recorded_at.timestamp(),
                    ],
                )?;
                Ok(Upsert::Created(candidate.id.clone()))
            }
        }
    }

    fn find_within_window(
        conn: &Connection,
        run: &str,
        stop_id: &str,
        earliest: DateTime<Local>,
    ) -> Result<Option<ArrivalEvent>> {
        let raw = conn
            .query_row(
                "SELECT id, run, stop_id, estimated_arrival, initial_prediction, recorded_at
                 FROM arrivals
                 WHERE run = ?1 AND stop_id = ?2 AND estimated_arrival > ?3
                 ORDER BY estimated_arrival DESC
                 LIMIT 1",
                params![run, stop_id, earliest.timestamp()],
                Self::raw_event,
            )
            .optional()?;
        raw.map(Self::event_from_raw).transpose()
    }

    pub async fn get_arrival(&self, id: &str) -> Result<Option<ArrivalEvent>> {
        let conn = self.conn.lock().await;
        let raw = conn
            .query_row(
                "SELECT id, run, stop_id, estimated_arrival, initial_prediction, recorded_at
                 FROM arrivals WHERE id = ?1",
                params![id],
                Self::raw_event,
            )
            .optional()?;
        raw.map(Self::event_from_raw).transpose()
    }

    /// All events with an estimate inside `[start, end]`, ascending.
    pub async fn arrivals_between(
        &self,
        start: DateTime<Local>,
        end: DateTime<Local>,
    ) -> Result<Vec<ArrivalEvent>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare(
            "SELECT id, run, stop_id, estimated_arrival, initial_prediction, recorded_at
             FROM arrivals
             WHERE estimated_arrival >= ?1 AND estimated_arrival <= ?2
             ORDER BY estimated_arrival ASC",
        )?;
        let rows = stmt.query_map(params![start.timestamp(), end.timestamp()], Self::raw_event)?;

        let mut events = Vec::new();
        for raw in rows {
            events.push(Self::event_from_raw(raw?)?);
        }
        Ok(events)
    }

    /// Credits one completed poll cycle to `hour_key`, creating the record
    /// with `expected_cycles` on first sight of the hour.
    pub async fn record_cycle(&self, hour_key: &str, expected_cycles: i64) -> Result<()> {
        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT INTO uptime (hour_key, completed_cycles, expected_cycles)
             VALUES (?1, 1, ?2)
             ON CONFLICT(hour_key) DO UPDATE SET completed_cycles = completed_cycles + 1",
            params![hour_key, expected_cycles],
        )?;
        Ok(())
    }

    /// `(completed_cycles, expected_cycles)` for an hour key, if recorded.
    pub async fn uptime_for_hour(&self, hour_key: &str) -> Result<Option<(i64, i64)>> {
        let conn = self.conn.lock().await;
        let row = conn
            .query_row(
                "SELECT completed_cycles, expected_cycles FROM uptime WHERE hour_key = ?1",
                params![hour_key],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;
        Ok(row)
    }

    fn raw_event(row: &rusqlite::Row<'_>) -> rusqlite::Result<RawEvent> {
        Ok((
            row.get(0)?,
            row.get(1)?,
            row.get(2)?,
            row.get(3)?,
            row.get(4)?,
            row.get(5)?,
        ))
    }

    fn event_from_raw(
        (id, run, stop_id, estimated, initial, recorded): RawEvent,
    ) -> Result<ArrivalEvent> {
        Ok(ArrivalEvent {
            id,
            run,
            stop_id,
            estimated_arrival: local_timestamp(estimated)?,
            initial_prediction: local_timestamp(initial)?,
            recorded_at: local_timestamp(recorded)?,
        })
    }
}

fn local_timestamp(secs: i64) -> Result<DateTime<Local>> {
    Local
        .timestamp_opt(secs, 0)
        .single()
        .context("timestamp out of range")
}
