//! Backend-agnostic persistence traits for jobs and outputs.
//!
//! `Database` is the long-lived handle injected into the job manager.
//! `Session` is a short-lived unit of access: each execution task opens one
//! at start and drops it on every exit path.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::DatabaseError;
use crate::jobs::model::{Job, Output};

/// Store handle shared across the process.
#[async_trait]
pub trait Database: Send + Sync {
    /// Run all pending schema migrations.
    async fn run_migrations(&self) -> Result<(), DatabaseError>;

    /// Open a session. The session is released when dropped.
    async fn session(&self) -> Result<Box<dyn Session>, DatabaseError>;
}

/// Record-level operations. No deletes: jobs and outputs are never removed.
#[async_trait]
pub trait Session: Send + Sync {
    // ── Jobs ────────────────────────────────────────────────────────

    /// Insert a new job row exactly as given.
    async fn insert_job(&self, job: &Job) -> Result<(), DatabaseError>;

    /// Get a job by ID.
    async fn get_job(&self, id: Uuid) -> Result<Option<Job>, DatabaseError>;

    /// All jobs, newest `created_at` first.
    async fn list_jobs(&self) -> Result<Vec<Job>, DatabaseError>;

    /// QUEUED → RUNNING, stamping `started_at`.
    /// Returns `false` if no queued job with that ID exists.
    async fn mark_job_running(&self, id: Uuid, at: DateTime<Utc>) -> Result<bool, DatabaseError>;

    /// RUNNING → SUCCEEDED and insert the Output, in one transaction.
    /// Returns `None` (and writes nothing) if no running job with that ID exists.
    async fn complete_job(
        &self,
        id: Uuid,
        output_type: &str,
        content_text: &str,
        content_type: &str,
        at: DateTime<Utc>,
    ) -> Result<Option<Output>, DatabaseError>;

    /// Non-terminal → FAILED with `error_text`, stamping `finished_at`.
    /// A job that never got marked running is stamped `started_at` at the
    /// same instant, so only QUEUED jobs ever lack it.
    /// Returns `false` if the job does not exist or is already terminal.
    async fn fail_job(
        &self,
        id: Uuid,
        error_text: &str,
        at: DateTime<Utc>,
    ) -> Result<bool, DatabaseError>;

    // ── Outputs ─────────────────────────────────────────────────────

    /// The output owned by a job (first by id if several exist).
    async fn get_output_for_job(&self, job_id: Uuid) -> Result<Option<Output>, DatabaseError>;

    /// Most recent output of the given type across all jobs.
    async fn get_latest_output(&self, output_type: &str) -> Result<Option<Output>, DatabaseError>;
}
