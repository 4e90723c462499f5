//! Append-only event log backed by the `events` table.
//!
//! Event ids come from an AUTOINCREMENT column, so they are unique across
//! the store and strictly increasing. That makes the last seen id a
//! resumable cursor: `list(run, after_id)` returns exactly the events a
//! reader missed, and `tail` is that same query repeated on a timer.

use std::time::Duration;

use futures::Stream;
use rusqlite::{params, Connection};
use tokio::time::Instant;
use uuid::Uuid;

use super::database::{now_timestamp, parse_timestamp, parse_uuid, Database, StoreError};
use crate::domain::Event;

/// Insert one event on an open connection or transaction.
///
/// Never commits. Callers pair it with a status write inside the same
/// transaction when both must become visible together.
pub fn append(
    conn: &Connection,
    run_id: &Uuid,
    event_type: &str,
    payload: &str,
) -> Result<Event, StoreError> {
    let created_at = now_timestamp();
    conn.execute(
        "INSERT INTO events (run_id, type, payload, created_at) VALUES (?1, ?2, ?3, ?4)",
        params![run_id.to_string(), event_type, payload, created_at],
    )?;

    Ok(Event {
        id: conn.last_insert_rowid(),
        run_id: *run_id,
        event_type: event_type.to_string(),
        payload: payload.to_string(),
        created_at: parse_timestamp(&created_at)?,
    })
}

/// Events with id greater than `after_id`, ascending
pub fn list_after(conn: &Connection, run_id: &Uuid, after_id: i64) -> Result<Vec<Event>, StoreError> {
    let mut stmt = conn.prepare(
        "SELECT id, run_id, type, payload, created_at FROM events
         WHERE run_id = ?1 AND id > ?2
         ORDER BY id ASC",
    )?;

    let rows = stmt.query_map(params![run_id.to_string(), after_id], |row| {
        Ok((
            row.get::<_, i64>(0)?,
            row.get::<_, String>(1)?,
            row.get::<_, String>(2)?,
            row.get::<_, String>(3)?,
            row.get::<_, String>(4)?,
        ))
    })?;

    let mut events = Vec::new();
    for row in rows {
        let (id, run_id, event_type, payload, created_at) = row?;
        events.push(Event {
            id,
            run_id: parse_uuid(&run_id)?,
            event_type,
            payload,
            created_at: parse_timestamp(&created_at)?,
        });
    }
    Ok(events)
}

/// Item produced by a live tail
#[derive(Debug, Clone, PartialEq)]
pub enum TailItem {
    Event(Event),

    /// Nothing new for a keepalive interval
    KeepAlive,
}

/// Timing for a live tail
#[derive(Debug, Clone, Copy)]
pub struct TailOptions {
    /// Sleep between queries
    pub poll_interval: Duration,

    /// Quiet period after which a keepalive marker is produced
    pub keepalive_interval: Duration,
}

impl Default for TailOptions {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(500),
            keepalive_interval: Duration::from_secs(15),
        }
    }
}

/// Read side of the event log, plus standalone appends
#[derive(Debug, Clone)]
pub struct EventLog {
    db: Database,
}

impl EventLog {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Append and commit a single event that accompanies no status change
    pub fn record(&self, run_id: &Uuid, event_type: &str, payload: &str) -> Result<Event, StoreError> {
        self.db.write(|tx| append(tx, run_id, event_type, payload))
    }

    /// Append and commit several events in one transaction
    pub fn record_all(&self, run_id: &Uuid, events: &[(&str, &str)]) -> Result<Vec<Event>, StoreError> {
        self.db.write(|tx| {
            events
                .iter()
                .map(|(event_type, payload)| append(tx, run_id, event_type, payload))
                .collect()
        })
    }

    /// All events for a run after `after_id` (default 0), in append order
    pub fn list(&self, run_id: &Uuid, after_id: Option<i64>) -> Result<Vec<Event>, StoreError> {
        self.db
            .read(|conn| list_after(conn, run_id, after_id.unwrap_or(0)))
    }

    /// Follow a run's events from `from_id` onwards.
    ///
    /// The stream never ends on its own, even after a terminal event; the
    /// consumer decides when to stop by dropping it. A storage error is
    /// yielded once and ends the stream.
    pub fn tail(
        &self,
        run_id: Uuid,
        from_id: i64,
        options: TailOptions,
    ) -> impl Stream<Item = Result<TailItem, StoreError>> + Send + 'static {
        let db = self.db.clone();

        async_stream::stream! {
            let mut cursor = from_id;
            let mut quiet_since = Instant::now();

            loop {
                match db.read(|conn| list_after(conn, &run_id, cursor)) {
                    Ok(events) if !events.is_empty() => {
                        for event in events {
                            cursor = event.id;
                            yield Ok(TailItem::Event(event));
                        }
                        quiet_since = Instant::now();
                    }
                    Ok(_) => {
                        if quiet_since.elapsed() >= options.keepalive_interval {
                            quiet_since = Instant::now();
                            yield Ok(TailItem::KeepAlive);
                        }
                    }
                    Err(e) => {
                        yield Err(e);
                        break;
                    }
                }

                tokio::time::sleep(options.poll_interval).await;
            }
        }
    }
}
