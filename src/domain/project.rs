//! Projects: named workspaces that host workflow execution.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Project {
    pub id: i64,

    /// Unique name
    pub name: String,

    /// Execution root for workflow runs
    pub local_path: PathBuf,

    pub created_at: DateTime<Utc>,
}
