//! Persisted run records and their status transitions.
//!
//! Every status write is a conditional UPDATE committed in the same
//! transaction as the event that describes it.

use rusqlite::{params, Connection, OptionalExtension, Row};
use uuid::Uuid;

use super::database::{format_timestamp, now_utc, parse_timestamp, parse_uuid, Database, StoreError};
use super::event_log;
use crate::domain::{kinds, Event, Run, RunOptions, RunStatus, RunType};

const RUN_COLUMNS: &str = "id, project_id, goal, name, run_type, status, current_iteration, options, metadata, created_at";

/// Result of an attempt to claim a queued run
#[derive(Debug)]
pub enum ClaimOutcome {
    /// This caller won; the run as re-read after the claim
    Claimed(Run),

    /// The claim committed but the run could not be read back.
    /// The run is RUNNING and belongs to this caller.
    ClaimedUnreadable(StoreError),

    /// Another worker got there first, or the run was never queued
    NotClaimed,
}

impl ClaimOutcome {
    pub fn is_claimed(&self) -> bool {
        matches!(self, Self::Claimed(_) | Self::ClaimedUnreadable(_))
    }
}

/// Filter for listing runs
#[derive(Debug, Clone, Default)]
pub struct RunFilter {
    pub status: Option<RunStatus>,
    pub project_id: Option<i64>,
    pub limit: Option<usize>,
}

#[derive(Debug, Clone)]
pub struct RunStore {
    db: Database,
}

impl RunStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Insert a new run together with its `RUN_CREATED` event
    pub fn create(&self, run: &Run) -> Result<Event, StoreError> {
        self.db.write(|tx| {
            insert(tx, run)?;
            event_log::append(tx, &run.id, kinds::RUN_CREATED, &run.goal)
        })
    }

    pub fn find(&self, id: &Uuid) -> Result<Option<Run>, StoreError> {
        self.db.read(|conn| find(conn, id))
    }

    pub fn get(&self, id: &Uuid) -> Result<Run, StoreError> {
        self.find(id)?.ok_or(StoreError::RunNotFound(*id))
    }

    /// Newest first
    pub fn list(&self, filter: &RunFilter) -> Result<Vec<Run>, StoreError> {
        self.db.read(|conn| {
            let mut sql = format!("SELECT {RUN_COLUMNS} FROM runs WHERE 1 = 1");
            let mut args: Vec<rusqlite::types::Value> = Vec::new();

            if let Some(status) = filter.status {
                args.push(status.as_str().to_string().into());
                sql.push_str(&format!(" AND status = ?{}", args.len()));
            }
            if let Some(project_id) = filter.project_id {
                args.push(project_id.into());
                sql.push_str(&format!(" AND project_id = ?{}", args.len()));
            }
            sql.push_str(" ORDER BY created_at DESC, rowid DESC");
            if let Some(limit) = filter.limit {
                sql.push_str(&format!(" LIMIT {limit}"));
            }

            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map(rusqlite::params_from_iter(args), RawRun::from_row)?;

            let mut runs = Vec::new();
            for row in rows {
                runs.push(row?.into_run()?);
            }
            Ok(runs)
        })
    }

    /// Ids of up to `limit` queued runs, oldest first
    pub fn queued_ids(&self, limit: usize) -> Result<Vec<Uuid>, StoreError> {
        self.db.read(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id FROM runs WHERE status = 'QUEUED'
                 ORDER BY created_at ASC, rowid ASC LIMIT ?1",
            )?;
            let rows = stmt.query_map([limit as i64], |row| row.get::<_, String>(0))?;

            let mut ids = Vec::new();
            for row in rows {
                ids.push(parse_uuid(&row?)?);
            }
            Ok(ids)
        })
    }

    /// Atomically move a run from QUEUED to RUNNING.
    ///
    /// The conditional update and the `RUN_STARTED` event commit together.
    /// Losing the race is not an error.
    pub fn claim(&self, id: &Uuid) -> Result<ClaimOutcome, StoreError> {
        let claimed = self.db.write(|tx| {
            let affected = tx.execute(
                "UPDATE runs SET status = 'RUNNING', current_iteration = 0
                 WHERE id = ?1 AND status = 'QUEUED'",
                [id.to_string()],
            )?;

            match affected {
                0 => Ok(false),
                1 => {
                    event_log::append(tx, id, kinds::RUN_STARTED, "Run claimed by worker")?;
                    Ok(true)
                }
                n => Err(StoreError::ClaimInvariant {
                    run_id: *id,
                    affected: n,
                }),
            }
        })?;

        if !claimed {
            return Ok(ClaimOutcome::NotClaimed);
        }

        match self.get(id) {
            Ok(run) => Ok(ClaimOutcome::Claimed(run)),
            Err(e) => Ok(ClaimOutcome::ClaimedUnreadable(e)),
        }
    }

    /// Bump the progress counter and append the event describing the new phase
    pub fn record_progress(
        &self,
        id: &Uuid,
        iteration: u32,
        event_type: &str,
        payload: &str,
    ) -> Result<Event, StoreError> {
        self.db.write(|tx| {
            tx.execute(
                "UPDATE runs SET current_iteration = ?1 WHERE id = ?2",
                params![iteration, id.to_string()],
            )?;
            event_log::append(tx, id, event_type, payload)
        })
    }

    /// Bump the progress counter without an accompanying event
    pub fn set_iteration(&self, id: &Uuid, iteration: u32) -> Result<(), StoreError> {
        self.db.write(|tx| {
            tx.execute(
                "UPDATE runs SET current_iteration = ?1 WHERE id = ?2",
                params![iteration, id.to_string()],
            )?;
            Ok(())
        })
    }

    /// Write the terminal status of an executed run.
    ///
    /// Applies only while the run is still RUNNING or PAUSED; an externally
    /// stopped run keeps its state and no event is written. Returns whether
    /// the status was applied.
    pub fn finalize(
        &self,
        id: &Uuid,
        status: RunStatus,
        event_type: &str,
        payload: &str,
    ) -> Result<bool, StoreError> {
        self.db.write(|tx| {
            let affected = update_status(tx, id, &[RunStatus::Running, RunStatus::Paused], status)?;
            if affected == 0 {
                return Ok(false);
            }
            event_log::append(tx, id, event_type, payload)?;
            Ok(true)
        })
    }

    /// Control-surface transition (pause, resume, stop).
    ///
    /// Fails with `InvalidTransition` when the run is not in one of `from`,
    /// in which case nothing is written.
    pub fn transition(
        &self,
        id: &Uuid,
        from: &[RunStatus],
        to: RunStatus,
        event_type: &str,
        payload: &str,
    ) -> Result<Run, StoreError> {
        self.db.write(|tx| {
            let affected = update_status(tx, id, from, to)?;
            if affected == 0 {
                let current = find(tx, id)?.ok_or(StoreError::RunNotFound(*id))?;
                return Err(StoreError::InvalidTransition {
                    run_id: *id,
                    from: current.status,
                    to,
                });
            }
            event_log::append(tx, id, event_type, payload)?;
            Ok(())
        })?;

        self.get(id)
    }
}

/// Insert a run row without committing
pub fn insert(conn: &Connection, run: &Run) -> Result<(), StoreError> {
    conn.execute(
        "INSERT INTO runs (id, project_id, goal, name, run_type, status, current_iteration, options, metadata, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
        params![
            run.id.to_string(),
            run.project_id,
            run.goal,
            run.name,
            run.run_type.as_str(),
            run.status.as_str(),
            run.current_iteration,
            serde_json::to_string(&run.options)?,
            serde_json::to_string(&run.metadata)?,
            format_timestamp(&run.created_at),
        ],
    )?;
    Ok(())
}

fn find(conn: &Connection, id: &Uuid) -> Result<Option<Run>, StoreError> {
    let raw = conn
        .query_row(
            &format!("SELECT {RUN_COLUMNS} FROM runs WHERE id = ?1"),
            [id.to_string()],
            RawRun::from_row,
        )
        .optional()?;

    raw.map(RawRun::into_run).transpose()
}

fn update_status(
    conn: &Connection,
    id: &Uuid,
    from: &[RunStatus],
    to: RunStatus,
) -> Result<usize, StoreError> {
    // Status names are fixed identifiers, safe to inline
    let allowed = from
        .iter()
        .map(|s| format!("'{}'", s.as_str()))
        .collect::<Vec<_>>()
        .join(", ");

    let affected = conn.execute(
        &format!("UPDATE runs SET status = ?1 WHERE id = ?2 AND status IN ({allowed})"),
        params![to.as_str(), id.to_string()],
    )?;
    Ok(affected)
}

/// Row as stored, before parsing
struct RawRun {
    id: String,
    project_id: Option<i64>,
    goal: String,
    name: Option<String>,
    run_type: String,
    status: String,
    current_iteration: u32,
    options: String,
    metadata: String,
    created_at: String,
}

impl RawRun {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            project_id: row.get(1)?,
            goal: row.get(2)?,
            name: row.get(3)?,
            run_type: row.get(4)?,
            status: row.get(5)?,
            current_iteration: row.get(6)?,
            options: row.get(7)?,
            metadata: row.get(8)?,
            created_at: row.get(9)?,
        })
    }

    fn into_run(self) -> Result<Run, StoreError> {
        let run_type: RunType = self.run_type.parse().map_err(StoreError::Corrupt)?;
        let status: RunStatus = self.status.parse().map_err(StoreError::Corrupt)?;
        let options: RunOptions = serde_json::from_str(&self.options)?;

        Ok(Run {
            id: parse_uuid(&self.id)?,
            project_id: self.project_id,
            goal: self.goal,
            name: self.name,
            run_type,
            status,
            current_iteration: self.current_iteration,
            options,
            metadata: serde_json::from_str(&self.metadata)?,
            created_at: parse_timestamp(&self.created_at)?,
        })
    }
}

/// Build a fresh QUEUED run
pub fn new_run(goal: impl Into<String>, run_type: RunType) -> Run {
    Run {
        id: Uuid::new_v4(),
        project_id: None,
        goal: goal.into(),
        name: None,
        run_type,
        status: RunStatus::Queued,
        current_iteration: 0,
        options: RunOptions::default(),
        metadata: serde_json::Map::new(),
        created_at: now_utc(),
    }
}
