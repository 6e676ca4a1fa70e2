//! libSQL implementation of the `Database` trait.
//!
//! Supports local file and in-memory databases. File databases hand each
//! session its own connection. In-memory databases share one connection,
//! since every `connect()` on `:memory:` opens a separate empty database.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use libsql::{Connection, Database as LibSqlDatabase, params};
use tokio::sync::Mutex;
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::DatabaseError;
use crate::jobs::model::{Job, JobStatus, Output};
use crate::store::migrations;
use crate::store::traits::{Database, Session};

/// libSQL database backend.
pub struct LibSqlBackend {
    db: Arc<LibSqlDatabase>,
    shared: Option<Connection>,
    /// SQLite allows one writer at a time; writes queue here instead of
    /// surfacing `SQLITE_BUSY` to execution tasks.
    write_lock: Arc<Mutex<()>>,
}

impl LibSqlBackend {
    /// Open (or create) a local database file and run migrations.
    pub async fn new_local(path: &Path) -> Result<Self, DatabaseError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                DatabaseError::Pool(format!("Failed to create database directory: {e}"))
            })?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| DatabaseError::Pool(format!("Failed to open libSQL database: {e}")))?;

        let backend = Self {
            db: Arc::new(db),
            shared: None,
            write_lock: Arc::new(Mutex::new(())),
        };

        let conn = backend.connect()?;
        // WAL lets readers proceed while an execution task commits.
        pragma(&conn, "PRAGMA journal_mode = WAL").await?;
        migrations::run_migrations(&conn).await?;
        info!(path = %path.display(), "Database opened");
        Ok(backend)
    }

    /// Create an in-memory database (for tests).
    pub async fn new_memory() -> Result<Self, DatabaseError> {
        let db = libsql::Builder::new_local(":memory:")
            .build()
            .await
            .map_err(|e| {
                DatabaseError::Pool(format!("Failed to create in-memory database: {e}"))
            })?;

        let conn = db
            .connect()
            .map_err(|e| DatabaseError::Pool(format!("Failed to create connection: {e}")))?;

        let backend = Self {
            db: Arc::new(db),
            shared: Some(conn),
            write_lock: Arc::new(Mutex::new(())),
        };
        backend.run_migrations().await?;
        Ok(backend)
    }

    /// Raw connection, bypassing the session write lock.
    pub(crate) fn connect(&self) -> Result<Connection, DatabaseError> {
        match &self.shared {
            Some(conn) => Ok(conn.clone()),
            None => self
                .db
                .connect()
                .map_err(|e| DatabaseError::Pool(format!("Failed to create connection: {e}"))),
        }
    }
}

#[async_trait]
impl Database for LibSqlBackend {
    async fn run_migrations(&self) -> Result<(), DatabaseError> {
        let conn = self.connect()?;
        migrations::run_migrations(&conn).await
    }

    async fn session(&self) -> Result<Box<dyn Session>, DatabaseError> {
        let conn = self.connect()?;
        if self.shared.is_none() {
            pragma(&conn, "PRAGMA busy_timeout = 5000").await?;
        }
        Ok(Box::new(LibSqlSession {
            conn,
            write_lock: Arc::clone(&self.write_lock),
        }))
    }
}

/// Run a PRAGMA, discarding whatever row it reports back.
async fn pragma(conn: &Connection, sql: &str) -> Result<(), DatabaseError> {
    conn.query(sql, ())
        .await
        .map_err(|e| DatabaseError::Pool(format!("{sql}: {e}")))?;
    Ok(())
}

// ── Helper functions ────────────────────────────────────────────────

/// Canonical timestamp format: fixed-width so TEXT ordering is chronological.
fn to_db_time(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Parse an RFC 3339 or SQLite datetime string into DateTime<Utc>.
fn parse_datetime(s: &str) -> DateTime<Utc> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return dt.with_timezone(&Utc);
    }
    // Rows written by earlier deployments use SQLite's datetime layout
    if let Ok(ndt) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f") {
        return ndt.and_utc();
    }
    if let Ok(ndt) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
        return ndt.and_utc();
    }
    DateTime::<Utc>::MIN_UTC
}

fn parse_optional_datetime(s: &Option<String>) -> Option<DateTime<Utc>> {
    s.as_ref().map(|s| parse_datetime(s))
}

/// Convert `Option<String>` to libsql Value.
fn opt_text_owned(s: Option<String>) -> libsql::Value {
    match s {
        Some(s) => libsql::Value::Text(s),
        None => libsql::Value::Null,
    }
}

/// Read a nullable TEXT column.
fn opt_column(row: &libsql::Row, idx: i32) -> Result<Option<String>, libsql::Error> {
    match row.get_value(idx)? {
        libsql::Value::Text(s) => Ok(Some(s)),
        _ => Ok(None),
    }
}

const JOB_COLUMNS: &str =
    "id, type, status, params_json, created_at, updated_at, started_at, finished_at, error_text";

const OUTPUT_COLUMNS: &str = "id, job_id, type, content_text, content_type, created_at";

/// Map a libsql Row to a Job. Column order matches JOB_COLUMNS.
fn row_to_job(row: &libsql::Row) -> Result<Job, DatabaseError> {
    let read = |e: libsql::Error| DatabaseError::Query(format!("row parse: {e}"));

    let id_str: String = row.get(0).map_err(read)?;
    let type_str: String = row.get(1).map_err(read)?;
    let status_str: String = row.get(2).map_err(read)?;
    let params_json: String = row.get(3).map_err(read)?;
    let created_str: String = row.get(4).map_err(read)?;
    let updated_str: String = row.get(5).map_err(read)?;
    let started_str = opt_column(row, 6).map_err(read)?;
    let finished_str = opt_column(row, 7).map_err(read)?;
    let error_text = opt_column(row, 8).map_err(read)?;

    let status: JobStatus = status_str
        .parse()
        .map_err(DatabaseError::Serialization)?;

    Ok(Job {
        id: Uuid::parse_str(&id_str)
            .map_err(|e| DatabaseError::Serialization(format!("job id {id_str}: {e}")))?,
        job_type: type_str,
        status,
        params_json,
        created_at: parse_datetime(&created_str),
        updated_at: parse_datetime(&updated_str),
        started_at: parse_optional_datetime(&started_str),
        finished_at: parse_optional_datetime(&finished_str),
        error_text,
    })
}

/// Map a libsql Row to an Output. Column order matches OUTPUT_COLUMNS.
fn row_to_output(row: &libsql::Row) -> Result<Output, DatabaseError> {
    let read = |e: libsql::Error| DatabaseError::Query(format!("row parse: {e}"));

    let job_id_str: String = row.get(1).map_err(read)?;
    let created_str: String = row.get(5).map_err(read)?;

    Ok(Output {
        id: row.get(0).map_err(read)?,
        job_id: Uuid::parse_str(&job_id_str)
            .map_err(|e| DatabaseError::Serialization(format!("output job_id {job_id_str}: {e}")))?,
        output_type: row.get(2).map_err(read)?,
        content_text: row.get(3).map_err(read)?,
        content_type: row.get(4).map_err(read)?,
        created_at: parse_datetime(&created_str),
    })
}

// ── Session ─────────────────────────────────────────────────────────

/// A single connection checked out for one unit of work.
struct LibSqlSession {
    conn: Connection,
    write_lock: Arc<Mutex<()>>,
}

impl LibSqlSession {
    async fn query_one_output(
        &self,
        op: &str,
        sql: &str,
        value: String,
    ) -> Result<Option<Output>, DatabaseError> {
        let mut rows = self
            .conn
            .query(sql, params![value])
            .await
            .map_err(|e| DatabaseError::Query(format!("{op}: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => Ok(Some(row_to_output(&row)?)),
            Ok(None) => Ok(None),
            Err(e) => Err(DatabaseError::Query(format!("{op}: {e}"))),
        }
    }
}

#[async_trait]
impl Session for LibSqlSession {
    // ── Jobs ────────────────────────────────────────────────────────

    async fn insert_job(&self, job: &Job) -> Result<(), DatabaseError> {
        let _guard = self.write_lock.lock().await;
        self.conn
            .execute(
                &format!(
                    "INSERT INTO jobs ({JOB_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)"
                ),
                params![
                    job.id.to_string(),
                    job.job_type.as_str(),
                    job.status.as_str(),
                    job.params_json.clone(),
                    to_db_time(&job.created_at),
                    to_db_time(&job.updated_at),
                    opt_text_owned(job.started_at.as_ref().map(to_db_time)),
                    opt_text_owned(job.finished_at.as_ref().map(to_db_time)),
                    opt_text_owned(job.error_text.clone()),
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("insert_job: {e}")))?;

        debug!(job_id = %job.id, job_type = %job.job_type, "Job inserted into DB");
        Ok(())
    }

    async fn get_job(&self, id: Uuid) -> Result<Option<Job>, DatabaseError> {
        let mut rows = self
            .conn
            .query(
                &format!("SELECT {JOB_COLUMNS} FROM jobs WHERE id = ?1"),
                params![id.to_string()],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("get_job: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => Ok(Some(row_to_job(&row)?)),
            Ok(None) => Ok(None),
            Err(e) => Err(DatabaseError::Query(format!("get_job: {e}"))),
        }
    }

    async fn list_jobs(&self) -> Result<Vec<Job>, DatabaseError> {
        let mut rows = self
            .conn
            .query(
                &format!("SELECT {JOB_COLUMNS} FROM jobs ORDER BY created_at DESC, rowid DESC"),
                (),
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("list_jobs: {e}")))?;

        let mut jobs = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| DatabaseError::Query(format!("list_jobs: {e}")))?
        {
            jobs.push(row_to_job(&row)?);
        }
        Ok(jobs)
    }

    async fn mark_job_running(&self, id: Uuid, at: DateTime<Utc>) -> Result<bool, DatabaseError> {
        let _guard = self.write_lock.lock().await;
        let now = to_db_time(&at);
        let count = self
            .conn
            .execute(
                "UPDATE jobs SET status = 'running', started_at = ?1, updated_at = ?1
                 WHERE id = ?2 AND status = 'queued'",
                params![now, id.to_string()],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("mark_job_running: {e}")))?;
        Ok(count > 0)
    }

    async fn complete_job(
        &self,
        id: Uuid,
        output_type: &str,
        content_text: &str,
        content_type: &str,
        at: DateTime<Utc>,
    ) -> Result<Option<Output>, DatabaseError> {
        let _guard = self.write_lock.lock().await;
        let now = to_db_time(&at);

        let tx = self
            .conn
            .transaction()
            .await
            .map_err(|e| DatabaseError::Query(format!("complete_job begin: {e}")))?;

        let updated = tx
            .execute(
                "UPDATE jobs SET status = 'succeeded', finished_at = ?1, updated_at = ?1
                 WHERE id = ?2 AND status = 'running'",
                params![now.clone(), id.to_string()],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("complete_job update: {e}")))?;

        if updated == 0 {
            tx.rollback()
                .await
                .map_err(|e| DatabaseError::Query(format!("complete_job rollback: {e}")))?;
            return Ok(None);
        }

        tx.execute(
            "INSERT INTO outputs (job_id, type, content_text, content_type, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![id.to_string(), output_type, content_text, content_type, now],
        )
        .await
        .map_err(|e| DatabaseError::Query(format!("complete_job insert output: {e}")))?;
        let output_id = tx.last_insert_rowid();

        tx.commit()
            .await
            .map_err(|e| DatabaseError::Query(format!("complete_job commit: {e}")))?;

        debug!(job_id = %id, output_id, "Output stored and job succeeded");
        Ok(Some(Output {
            id: output_id,
            job_id: id,
            output_type: output_type.to_string(),
            content_text: content_text.to_string(),
            content_type: content_type.to_string(),
            created_at: parse_datetime(&to_db_time(&at)),
        }))
    }

    async fn fail_job(
        &self,
        id: Uuid,
        error_text: &str,
        at: DateTime<Utc>,
    ) -> Result<bool, DatabaseError> {
        let _guard = self.write_lock.lock().await;
        let now = to_db_time(&at);
        let count = self
            .conn
            .execute(
                "UPDATE jobs SET status = 'failed', error_text = ?1,
                     started_at = COALESCE(started_at, ?2), finished_at = ?2, updated_at = ?2
                 WHERE id = ?3 AND status IN ('queued', 'running')",
                params![error_text, now, id.to_string()],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("fail_job: {e}")))?;
        Ok(count > 0)
    }

    // ── Outputs ─────────────────────────────────────────────────────

    async fn get_output_for_job(&self, job_id: Uuid) -> Result<Option<Output>, DatabaseError> {
        self.query_one_output(
            "get_output_for_job",
            &format!("SELECT {OUTPUT_COLUMNS} FROM outputs WHERE job_id = ?1 ORDER BY id ASC LIMIT 1"),
            job_id.to_string(),
        )
        .await
    }

    async fn get_latest_output(&self, output_type: &str) -> Result<Option<Output>, DatabaseError> {
        self.query_one_output(
            "get_latest_output",
            &format!(
                "SELECT {OUTPUT_COLUMNS} FROM outputs WHERE type = ?1
                 ORDER BY created_at DESC, id DESC LIMIT 1"
            ),
            output_type.to_string(),
        )
        .await
    }
}
