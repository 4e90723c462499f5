//! runkeeper - Run-tracking service
//!
//! Clients submit a goal, a background worker claims and executes it, and
//! every step of progress lands in an append-only event log that clients
//! can poll or follow live.
//!
//! # Architecture
//!
//! The event log is the source of truth for run progress:
//! - Runs are created QUEUED and claimed atomically, so no run executes twice
//! - Every status change is committed together with the event describing it
//! - Event ids are strictly increasing and double as resumable cursors
//!
//! # Modules
//!
//! - `adapters`: Step executors (text generation providers, shell commands)
//! - `core`: Persistence, scheduling, workflow orchestration, control surface
//! - `domain`: Data structures (Run, Event, Project, Artifact)
//! - `config`: Layered configuration
//! - `http`: JSON API and SSE live tail
//! - `cli`: Command-line interface
//!
//! # Usage
//!
//! ```bash
//! # Queue a simulated run and follow it
//! runkeeper run create "Write a haiku"
//! runkeeper tail <run-id>
//!
//! # Serve the API with a background worker
//! runkeeper serve --bind 127.0.0.1:8000
//! ```

pub mod adapters;
pub mod app;
pub mod cli;
pub mod config;
pub mod core;
pub mod domain;
pub mod http;

// Re-export main types at crate root for convenience
pub use app::App;
pub use config::ResolvedConfig;
pub use core::{Database, EventLog, Orchestrator, RunScheduler, RunService, RunStore};
pub use domain::{Event, Project, Run, RunStatus, RunType};
