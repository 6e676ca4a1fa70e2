//! Follow-up questions about a finished job.
//!
//! Nothing is remembered between calls: each question rebuilds its context
//! from the stored job and output, and nothing new is persisted.

use uuid::Uuid;

use crate::error::{Error, JobError};
use crate::generators::excerpt;
use crate::jobs::manager::JobManager;
use crate::jobs::model::{Job, Output};

/// Characters of the stored output quoted back to the model.
pub const OUTPUT_EXCERPT_CHARS: usize = 2000;

/// Build the system prompt describing a job and its output.
pub fn context_prompt(job: &Job, output: &Output) -> String {
    let params = job
        .params()
        .ok()
        .and_then(|value| serde_json::to_string_pretty(&value).ok())
        .unwrap_or_else(|| job.params_json.clone());

    format!(
        "You are continuing a conversation about a {kind} that was previously generated.\n\n\
         The user is asking a follow-up question about this output. Provide a helpful response based on the context.\n\n\
         Original Job Type: {kind}\n\
         Original Parameters: {params}\n\
         Generated Output: {content}",
        kind = job.job_type,
        content = excerpt(&output.content_text, OUTPUT_EXCERPT_CHARS),
    )
}

/// User prompt for a follow-up question.
pub fn question_prompt(message: &str) -> String {
    format!("Follow-up question: {message}")
}

impl JobManager {
    /// Answer a follow-up question about a job's output.
    ///
    /// Fails with a not-found error when the job or its output is missing.
    /// Generation errors surface as `Error::Llm`.
    pub async fn chat(&self, job_id: Uuid, message: &str) -> Result<String, Error> {
        let (job, output) = {
            let session = self.database().session().await?;
            let job = session
                .get_job(job_id)
                .await?
                .ok_or(JobError::NotFound { id: job_id })?;
            let output = session
                .get_output_for_job(job_id)
                .await?
                .ok_or(JobError::OutputNotFound { job_id })?;
            (job, output)
        };

        let system_prompt = context_prompt(&job, &output);
        let reply = self
            .generator()
            .complete(&system_prompt, &question_prompt(message))
            .await?;
        tracing::info!(job_id = %job_id, chars = reply.chars().count(), "Chat reply generated");
        Ok(reply)
    }
}
