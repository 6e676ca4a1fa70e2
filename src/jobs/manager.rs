//! Job lifecycle manager.
//!
//! `create` persists a QUEUED job and spawns one execution task for it. The
//! task owns every status transition of its job:
//!
//! ```text
//! QUEUED --(task starts)--> RUNNING --(generator ok)--> SUCCEEDED
//!                           RUNNING --(any error)-----> FAILED
//! ```
//!
//! Task handles are tracked so callers can wait for a job and so shutdown can
//! drain in-flight work.

use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::error::{DatabaseError, Error, GeneratorError, JobError};
use crate::generators::ContentGenerator;
use crate::jobs::model::{self, CONTENT_TYPE_MARKDOWN, Job, JobStatus, JobType, Output};
use crate::store::{Database, Session};

/// Tracked execution task.
#[derive(Debug)]
struct TrackedJob {
    handle: JoinHandle<()>,
}

/// Creates jobs, runs them in the background and serves their records.
pub struct JobManager {
    db: Arc<dyn Database>,
    generator: Arc<dyn ContentGenerator>,
    /// Execution tasks by job id. Finished entries are pruned on create.
    jobs: Arc<RwLock<HashMap<Uuid, TrackedJob>>>,
}

impl JobManager {
    pub fn new(db: Arc<dyn Database>, generator: Arc<dyn ContentGenerator>) -> Self {
        Self {
            db,
            generator,
            jobs: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub(crate) fn generator(&self) -> &dyn ContentGenerator {
        self.generator.as_ref()
    }

    pub(crate) fn database(&self) -> &dyn Database {
        self.db.as_ref()
    }

    /// Persist a QUEUED job and start executing it in the background.
    ///
    /// Returns the job as persisted; execution has not been awaited.
    pub async fn create(&self, job_type: JobType, params: serde_json::Value) -> Result<Job, Error> {
        let job = Job::new(job_type, &params);
        {
            let session = self.db.session().await?;
            session.insert_job(&job).await?;
        }
        tracing::info!(job_id = %job.id, job_type = %job.job_type, "Job queued");

        let handle = tokio::spawn(execute(
            Arc::clone(&self.db),
            Arc::clone(&self.generator),
            job.id,
        ));

        let mut jobs = self.jobs.write().await;
        jobs.retain(|_, tracked| !tracked.handle.is_finished());
        jobs.insert(job.id, TrackedJob { handle });

        Ok(job)
    }

    /// Latest persisted snapshot of a job.
    pub async fn get(&self, id: Uuid) -> Result<Option<Job>, Error> {
        let session = self.db.session().await?;
        Ok(session.get_job(id).await?)
    }

    /// All jobs, newest first.
    pub async fn list(&self) -> Result<Vec<Job>, Error> {
        let session = self.db.session().await?;
        Ok(session.list_jobs().await?)
    }

    /// The output produced by a job, if it succeeded.
    pub async fn get_output(&self, job_id: Uuid) -> Result<Option<Output>, Error> {
        let session = self.db.session().await?;
        Ok(session.get_output_for_job(job_id).await?)
    }

    /// Most recent output of the given type.
    pub async fn get_latest_output(&self, output_type: &str) -> Result<Option<Output>, Error> {
        let session = self.db.session().await?;
        Ok(session.get_latest_output(output_type).await?)
    }

    /// Wait for a job's execution task, then return its persisted status.
    ///
    /// Jobs without a tracked task (already pruned, or created by another
    /// process) just report their current status.
    pub async fn wait(&self, id: Uuid) -> Result<Option<JobStatus>, Error> {
        let tracked = self.jobs.write().await.remove(&id);
        if let Some(tracked) = tracked {
            if let Err(e) = tracked.handle.await {
                tracing::error!(job_id = %id, error = %e, "Execution task did not complete");
            }
        }
        Ok(self.get(id).await?.map(|job| job.status))
    }

    /// Wait for every in-flight execution task.
    pub async fn shutdown(&self) {
        let drained: Vec<(Uuid, TrackedJob)> = self.jobs.write().await.drain().collect();
        let pending = drained
            .iter()
            .filter(|(_, tracked)| !tracked.handle.is_finished())
            .count();
        if pending > 0 {
            tracing::info!(pending, "Waiting for in-flight jobs");
        }
        for (id, tracked) in drained {
            if let Err(e) = tracked.handle.await {
                tracing::error!(job_id = %id, error = %e, "Execution task did not complete");
            }
        }
    }

    /// Number of tracked tasks still running.
    pub async fn active_count(&self) -> usize {
        self.jobs
            .read()
            .await
            .values()
            .filter(|tracked| !tracked.handle.is_finished())
            .count()
    }
}

/// Execution task body. Never panics out and never returns an error: every
/// failure ends up on the job record.
async fn execute(db: Arc<dyn Database>, generator: Arc<dyn ContentGenerator>, id: Uuid) {
    let session = match db.session().await {
        Ok(session) => session,
        Err(e) => {
            tracing::error!(job_id = %id, error = %e, "Could not open store session for job");
            return;
        }
    };

    let outcome = AssertUnwindSafe(run(session.as_ref(), generator.as_ref(), id))
        .catch_unwind()
        .await;

    let error_text = match outcome {
        Ok(Ok(())) => return,
        Ok(Err(e)) => e.detail(),
        Err(panic) => JobError::Panicked {
            id,
            reason: panic_message(panic.as_ref()),
        }
        .to_string(),
    };

    record_failure(session.as_ref(), id, &error_text).await;
}

async fn run(session: &dyn Session, generator: &dyn ContentGenerator, id: Uuid) -> Result<(), Error> {
    if !session.mark_job_running(id, model::now()).await? {
        return Err(match session.get_job(id).await? {
            None => JobError::NotFound { id },
            Some(job) => JobError::InvalidTransition {
                id,
                state: job.status.to_string(),
                target: JobStatus::Running.to_string(),
            },
        }
        .into());
    }

    let job = session
        .get_job(id)
        .await?
        .ok_or(JobError::NotFound { id })?;
    tracing::info!(job_id = %id, job_type = %job.job_type, "Job running");

    let job_type = job.kind()?;
    let params = job
        .params()
        .map_err(|e| DatabaseError::Serialization(format!("job params: {e}")))?;
    let content = generator.generate(job_type, &params).await?;
    if content.trim().is_empty() {
        return Err(GeneratorError::EmptyOutput(job_type).into());
    }

    let output = session
        .complete_job(
            id,
            job_type.as_str(),
            &content,
            CONTENT_TYPE_MARKDOWN,
            model::now(),
        )
        .await?
        .ok_or_else(|| JobError::InvalidTransition {
            id,
            state: "not running".to_string(),
            target: JobStatus::Succeeded.to_string(),
        })?;

    tracing::info!(
        job_id = %id,
        output_id = output.id,
        chars = content.chars().count(),
        "Job succeeded"
    );
    Ok(())
}

async fn record_failure(session: &dyn Session, id: Uuid, error_text: &str) {
    match session.fail_job(id, error_text, model::now()).await {
        Ok(true) => tracing::warn!(job_id = %id, error = %error_text, "Job failed"),
        Ok(false) => tracing::debug!(
            job_id = %id,
            error = %error_text,
            "Failure not recorded: job missing or already finished"
        ),
        Err(e) => tracing::error!(
            job_id = %id,
            error = %e,
            reason = %error_text,
            "Failed to record job failure"
        ),
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::LlmError;
    use crate::store::LibSqlBackend;
    use async_trait::async_trait;
    use serde_json::{Value, json};
    use std::time::Duration;
    use tokio::sync::Notify;

    /// Scripted generator: output depends on the `mode` param.
    struct ScriptedGenerator {
        release: Arc<Notify>,
    }

    impl ScriptedGenerator {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                release: Arc::new(Notify::new()),
            })
        }
    }

    #[async_trait]
    impl ContentGenerator for ScriptedGenerator {
        async fn generate(&self, job_type: JobType, params: &Value) -> Result<String, GeneratorError> {
            match params.get("mode").and_then(Value::as_str) {
                Some("fail") => Err(GeneratorError::Failed {
                    kind: "research brief",
                    source: LlmError::RateLimited {
                        provider: "stub".to_string(),
                    },
                }),
                Some("empty") => Ok("  \n".to_string()),
                Some("panic") => panic!("generator exploded"),
                Some("hold") => {
                    self.release.notified().await;
                    Ok(format!("# {job_type} released"))
                }
                _ => {
                    let topic = params.get("topic").and_then(Value::as_str).unwrap_or("none");
                    Ok(format!("# {job_type}\n\nTopic: {topic}"))
                }
            }
        }

        async fn complete(&self, _system: &str, user: &str) -> Result<String, LlmError> {
            Ok(format!("echo: {user}"))
        }
    }

    async fn test_manager() -> (JobManager, Arc<ScriptedGenerator>) {
        let db = LibSqlBackend::new_memory().await.unwrap();
        let generator = ScriptedGenerator::new();
        let manager = JobManager::new(Arc::new(db), generator.clone());
        (manager, generator)
    }

    #[tokio::test]
    async fn successful_job_produces_one_output() {
        let (manager, _generator) = test_manager().await;

        let job = manager
            .create(JobType::ResearchBrief, json!({"topic": "X"}))
            .await
            .unwrap();
        assert_eq!(job.status, JobStatus::Queued);
        assert!(job.started_at.is_none());

        let status = manager.wait(job.id).await.unwrap();
        assert_eq!(status, Some(JobStatus::Succeeded));

        let stored = manager.get(job.id).await.unwrap().unwrap();
        let started = stored.started_at.unwrap();
        let finished = stored.finished_at.unwrap();
        assert!(stored.created_at <= started);
        assert!(started <= finished);
        assert!(stored.error_text.is_none());

        let output = manager.get_output(job.id).await.unwrap().unwrap();
        assert_eq!(output.job_id, job.id);
        assert_eq!(output.output_type, "research_brief");
        assert_eq!(output.content_type, CONTENT_TYPE_MARKDOWN);
        assert!(output.content_text.contains("Topic: X"));
    }

    #[tokio::test]
    async fn generator_failure_marks_job_failed() {
        let (manager, _generator) = test_manager().await;

        let job = manager
            .create(JobType::ResearchBrief, json!({"mode": "fail"}))
            .await
            .unwrap();
        assert_eq!(manager.wait(job.id).await.unwrap(), Some(JobStatus::Failed));

        let stored = manager.get(job.id).await.unwrap().unwrap();
        let error_text = stored.error_text.unwrap();
        assert!(error_text.starts_with("Failed to generate research brief:"));
        assert!(stored.started_at.is_some());
        assert!(stored.finished_at.is_some());
        assert!(manager.get_output(job.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn empty_output_is_a_failure() {
        let (manager, _generator) = test_manager().await;

        let job = manager
            .create(JobType::PromptPack, json!({"mode": "empty"}))
            .await
            .unwrap();
        assert_eq!(manager.wait(job.id).await.unwrap(), Some(JobStatus::Failed));
        let stored = manager.get(job.id).await.unwrap().unwrap();
        assert!(stored.error_text.unwrap().contains("empty"));
        assert!(manager.get_output(job.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn panic_is_contained_to_its_job() {
        let (manager, _generator) = test_manager().await;

        let bad = manager
            .create(JobType::ResearchBrief, json!({"mode": "panic"}))
            .await
            .unwrap();
        let good = manager
            .create(JobType::ResearchBrief, json!({"topic": "ok"}))
            .await
            .unwrap();

        assert_eq!(manager.wait(bad.id).await.unwrap(), Some(JobStatus::Failed));
        assert_eq!(manager.wait(good.id).await.unwrap(), Some(JobStatus::Succeeded));

        let stored = manager.get(bad.id).await.unwrap().unwrap();
        assert!(stored.error_text.unwrap().contains("generator exploded"));
    }

    #[tokio::test]
    async fn failure_of_one_job_leaves_another_untouched() {
        let (manager, generator) = test_manager().await;

        let held = manager
            .create(JobType::WeeklyPilotMemo, json!({"mode": "hold"}))
            .await
            .unwrap();
        let failing = manager
            .create(JobType::ResearchBrief, json!({"mode": "fail"}))
            .await
            .unwrap();

        assert_eq!(manager.wait(failing.id).await.unwrap(), Some(JobStatus::Failed));

        // The held job is still running and unaffected.
        let snapshot = loop {
            let job = manager.get(held.id).await.unwrap().unwrap();
            if job.status == JobStatus::Running {
                break job;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        };
        assert!(snapshot.error_text.is_none());
        assert!(snapshot.finished_at.is_none());

        generator.release.notify_one();
        assert_eq!(manager.wait(held.id).await.unwrap(), Some(JobStatus::Succeeded));
    }

    #[tokio::test]
    async fn list_is_newest_first() {
        let (manager, _generator) = test_manager().await;

        let first = manager.create(JobType::PromptPack, json!({})).await.unwrap();
        tokio::time::sleep(Duration::from_millis(2)).await;
        let second = manager.create(JobType::ResearchBrief, json!({})).await.unwrap();
        manager.shutdown().await;

        let jobs = manager.list().await.unwrap();
        let ids: Vec<Uuid> = jobs.iter().map(|j| j.id).collect();
        assert_eq!(ids, vec![second.id, first.id]);
    }

    #[tokio::test]
    async fn latest_output_tracks_newest_job_of_type() {
        let (manager, _generator) = test_manager().await;

        let a = manager
            .create(JobType::ResearchBrief, json!({"topic": "A"}))
            .await
            .unwrap();
        manager.wait(a.id).await.unwrap();
        let b = manager
            .create(JobType::ResearchBrief, json!({"topic": "B"}))
            .await
            .unwrap();
        manager.wait(b.id).await.unwrap();

        let latest = manager.get_latest_output("research_brief").await.unwrap().unwrap();
        assert_eq!(latest.job_id, b.id);
        assert!(manager.get_latest_output("prompt_pack").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn unknown_ids_are_none() {
        let (manager, _generator) = test_manager().await;
        let id = Uuid::new_v4();
        assert!(manager.get(id).await.unwrap().is_none());
        assert!(manager.get_output(id).await.unwrap().is_none());
        assert_eq!(manager.wait(id).await.unwrap(), None);
    }

    #[tokio::test]
    async fn shutdown_drains_running_jobs() {
        let (manager, generator) = test_manager().await;

        let job = manager
            .create(JobType::PromptPack, json!({"mode": "hold"}))
            .await
            .unwrap();
        assert_eq!(manager.active_count().await, 1);

        let release = generator.release.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            release.notify_one();
        });
        manager.shutdown().await;

        assert_eq!(manager.active_count().await, 0);
        let stored = manager.get(job.id).await.unwrap().unwrap();
        assert_eq!(stored.status, JobStatus::Succeeded);
    }

    async fn insert_raw_job(db: &LibSqlBackend, id: Uuid, job_type: &str) {
        db.connect()
            .unwrap()
            .execute(
                "INSERT INTO jobs (id, type, status, params_json, created_at, updated_at)
                 VALUES (?1, ?2, 'queued', '{}', '2026-01-01T00:00:00.000000Z', '2026-01-01T00:00:00.000000Z')",
                libsql::params![id.to_string(), job_type],
            )
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn stored_unknown_type_fails_the_job() {
        let db = Arc::new(LibSqlBackend::new_memory().await.unwrap());
        let id = Uuid::new_v4();
        insert_raw_job(&db, id, "podcast").await;

        execute(db.clone(), ScriptedGenerator::new(), id).await;

        let manager = JobManager::new(db, ScriptedGenerator::new());
        let stored = manager.get(id).await.unwrap().unwrap();
        assert_eq!(stored.status, JobStatus::Failed);
        assert_eq!(stored.job_type, "podcast");
        assert_eq!(stored.error_text.as_deref(), Some("Unknown job type: podcast"));
        assert!(stored.started_at.is_some());
        assert!(stored.finished_at.is_some());
    }

    #[tokio::test]
    async fn list_serves_jobs_of_unknown_type() {
        let db = Arc::new(LibSqlBackend::new_memory().await.unwrap());
        let legacy = Uuid::new_v4();
        insert_raw_job(&db, legacy, "podcast").await;

        let manager = JobManager::new(db, ScriptedGenerator::new());
        let job = manager
            .create(JobType::ResearchBrief, json!({"topic": "X"}))
            .await
            .unwrap();
        manager.wait(job.id).await.unwrap();

        let jobs = manager.list().await.unwrap();
        let ids: Vec<Uuid> = jobs.iter().map(|j| j.id).collect();
        assert_eq!(ids, vec![job.id, legacy]);
        assert_eq!(jobs[1].job_type, "podcast");
        assert!(manager.get(legacy).await.unwrap().is_some());
    }

    /// Store whose sessions cannot mark jobs running.
    struct BrokenStartDatabase {
        inner: LibSqlBackend,
    }

    struct BrokenStartSession {
        inner: Box<dyn Session>,
    }

    #[async_trait]
    impl Database for BrokenStartDatabase {
        async fn run_migrations(&self) -> Result<(), DatabaseError> {
            self.inner.run_migrations().await
        }

        async fn session(&self) -> Result<Box<dyn Session>, DatabaseError> {
            Ok(Box::new(BrokenStartSession {
                inner: self.inner.session().await?,
            }))
        }
    }

    #[async_trait]
    impl Session for BrokenStartSession {
        async fn insert_job(&self, job: &Job) -> Result<(), DatabaseError> {
            self.inner.insert_job(job).await
        }

        async fn get_job(&self, id: Uuid) -> Result<Option<Job>, DatabaseError> {
            self.inner.get_job(id).await
        }

        async fn list_jobs(&self) -> Result<Vec<Job>, DatabaseError> {
            self.inner.list_jobs().await
        }

        async fn mark_job_running(
            &self,
            _id: Uuid,
            _at: chrono::DateTime<chrono::Utc>,
        ) -> Result<bool, DatabaseError> {
            Err(DatabaseError::Query("disk I/O error".to_string()))
        }

        async fn complete_job(
            &self,
            id: Uuid,
            output_type: &str,
            content_text: &str,
            content_type: &str,
            at: chrono::DateTime<chrono::Utc>,
        ) -> Result<Option<Output>, DatabaseError> {
            self.inner
                .complete_job(id, output_type, content_text, content_type, at)
                .await
        }

        async fn fail_job(
            &self,
            id: Uuid,
            error_text: &str,
            at: chrono::DateTime<chrono::Utc>,
        ) -> Result<bool, DatabaseError> {
            self.inner.fail_job(id, error_text, at).await
        }

        async fn get_output_for_job(&self, job_id: Uuid) -> Result<Option<Output>, DatabaseError> {
            self.inner.get_output_for_job(job_id).await
        }

        async fn get_latest_output(&self, output_type: &str) -> Result<Option<Output>, DatabaseError> {
            self.inner.get_latest_output(output_type).await
        }
    }

    #[tokio::test]
    async fn store_error_before_running_still_stamps_started_at() {
        let db = BrokenStartDatabase {
            inner: LibSqlBackend::new_memory().await.unwrap(),
        };
        let manager = JobManager::new(Arc::new(db), ScriptedGenerator::new());

        let job = manager
            .create(JobType::ResearchBrief, json!({"topic": "X"}))
            .await
            .unwrap();
        assert_eq!(manager.wait(job.id).await.unwrap(), Some(JobStatus::Failed));

        let stored = manager.get(job.id).await.unwrap().unwrap();
        assert_eq!(stored.error_text.as_deref(), Some("Query failed: disk I/O error"));
        let started = stored.started_at.expect("failed job must have started_at");
        let finished = stored.finished_at.unwrap();
        assert!(started <= finished);
        assert!(manager.get_output(job.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn missing_job_failure_is_dropped() {
        let db = Arc::new(LibSqlBackend::new_memory().await.unwrap());
        // No row for this id: the task logs and exits without writing.
        execute(db.clone(), ScriptedGenerator::new(), Uuid::new_v4()).await;
        let session = db.session().await.unwrap();
        assert!(session.list_jobs().await.unwrap().is_empty());
    }

    #[test]
    fn panic_messages() {
        let boxed: Box<dyn std::any::Any + Send> = Box::new("static");
        assert_eq!(panic_message(boxed.as_ref()), "static");
        let boxed: Box<dyn std::any::Any + Send> = Box::new(String::from("owned"));
        assert_eq!(panic_message(boxed.as_ref()), "owned");
        let boxed: Box<dyn std::any::Any + Send> = Box::new(7_u8);
        assert_eq!(panic_message(boxed.as_ref()), "unknown panic");
    }
}
