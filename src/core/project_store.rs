//! Projects: named workspaces, created through the control surface and
//! read-only to execution.

use std::path::PathBuf;

use rusqlite::{params, Connection, OptionalExtension};

use super::database::{now_timestamp, parse_timestamp, Database, StoreError};
use crate::domain::Project;

#[derive(Debug, Clone)]
pub struct ProjectStore {
    db: Database,
}

impl ProjectStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Register a project; names are unique
    pub fn create(&self, name: &str, local_path: PathBuf) -> Result<Project, StoreError> {
        self.db.write(|tx| {
            let exists: bool = tx.query_row(
                "SELECT EXISTS(SELECT 1 FROM projects WHERE name = ?1)",
                [name],
                |row| row.get(0),
            )?;
            if exists {
                return Err(StoreError::ProjectExists(name.to_string()));
            }

            tx.execute(
                "INSERT INTO projects (name, local_path, created_at) VALUES (?1, ?2, ?3)",
                params![name, local_path.to_string_lossy(), now_timestamp()],
            )?;
            let id = tx.last_insert_rowid();
            find(tx, id)?.ok_or(StoreError::ProjectNotFound(id))
        })
    }

    pub fn find(&self, id: i64) -> Result<Option<Project>, StoreError> {
        self.db.read(|conn| find(conn, id))
    }

    pub fn get(&self, id: i64) -> Result<Project, StoreError> {
        self.find(id)?.ok_or(StoreError::ProjectNotFound(id))
    }

    pub fn list(&self) -> Result<Vec<Project>, StoreError> {
        self.db.read(|conn| {
            let mut stmt =
                conn.prepare("SELECT id, name, local_path, created_at FROM projects ORDER BY id")?;
            let rows = stmt.query_map([], raw_project)?;

            let mut projects = Vec::new();
            for row in rows {
                projects.push(into_project(row?)?);
            }
            Ok(projects)
        })
    }
}

type RawProject = (i64, String, String, String);

fn raw_project(row: &rusqlite::Row<'_>) -> rusqlite::Result<RawProject> {
    Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?))
}

fn into_project((id, name, local_path, created_at): RawProject) -> Result<Project, StoreError> {
    Ok(Project {
        id,
        name,
        local_path: PathBuf::from(local_path),
        created_at: parse_timestamp(&created_at)?,
    })
}

fn find(conn: &Connection, id: i64) -> Result<Option<Project>, StoreError> {
    conn.query_row(
        "SELECT id, name, local_path, created_at FROM projects WHERE id = ?1",
        [id],
        raw_project,
    )
    .optional()?
    .map(into_project)
    .transpose()
}
