//! Job and Output records.

use std::io;
use std::str::FromStr;

use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use serde_json::ser::Formatter;
use uuid::Uuid;

use crate::error::JobError;

/// Content type tag stored on every generated Output.
pub const CONTENT_TYPE_MARKDOWN: &str = "text/markdown";

/// Current time at the store's microsecond precision.
pub fn now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(6)
}

/// Status of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Persisted, execution task not started yet.
    Queued,
    /// Execution task is generating content.
    Running,
    /// Output persisted.
    Succeeded,
    /// Generation or persistence failed; see `error_text`.
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Running => "running",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "queued" => Ok(Self::Queued),
            "running" => Ok(Self::Running),
            "succeeded" => Ok(Self::Succeeded),
            "failed" => Ok(Self::Failed),
            other => Err(format!("unknown job status: {other}")),
        }
    }
}

/// Kind of work a job performs; selects the prompt template.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobType {
    /// Deprecated. Kept so old clients still get a response.
    LeadList,
    PromptPack,
    WeeklyPilotMemo,
    ResearchBrief,
}

impl JobType {
    pub const ALL: [JobType; 4] = [
        JobType::LeadList,
        JobType::PromptPack,
        JobType::WeeklyPilotMemo,
        JobType::ResearchBrief,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::LeadList => "lead_list",
            Self::PromptPack => "prompt_pack",
            Self::WeeklyPilotMemo => "weekly_pilot_memo",
            Self::ResearchBrief => "research_brief",
        }
    }
}

impl std::fmt::Display for JobType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobType {
    type Err = JobError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        JobType::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| JobError::UnknownType(s.to_string()))
    }
}

/// A persisted research job.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Job {
    pub id: Uuid,
    /// Stored type name. Rows written by other deployments may carry a name
    /// this build does not know; see [`Job::kind`].
    #[serde(rename = "type")]
    pub job_type: String,
    pub status: JobStatus,
    /// Request parameters, serialized once at creation.
    pub params_json: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub error_text: Option<String>,
}

impl Job {
    /// Build a fresh QUEUED job. Nothing is persisted here.
    pub fn new(job_type: JobType, params: &serde_json::Value) -> Self {
        let created = now();
        Self {
            id: Uuid::new_v4(),
            job_type: job_type.as_str().to_string(),
            status: JobStatus::Queued,
            params_json: encode_params(params),
            created_at: created,
            updated_at: created,
            started_at: None,
            finished_at: None,
            error_text: None,
        }
    }

    /// The job type, if this build knows it.
    pub fn kind(&self) -> Result<JobType, JobError> {
        self.job_type.parse()
    }

    /// Deserialize the stored parameters.
    pub fn params(&self) -> Result<serde_json::Value, serde_json::Error> {
        serde_json::from_str(&self.params_json)
    }
}

/// Serialize params with `", "` and `": "` separators and non-ASCII escaped
/// as `\uXXXX`, the layout existing rows and clients already use.
fn encode_params(params: &serde_json::Value) -> String {
    let mut buf = Vec::new();
    let mut ser = serde_json::Serializer::with_formatter(&mut buf, SpacedAsciiFormatter);
    match params.serialize(&mut ser) {
        Ok(()) => String::from_utf8_lossy(&buf).into_owned(),
        Err(_) => params.to_string(),
    }
}

struct SpacedAsciiFormatter;

impl Formatter for SpacedAsciiFormatter {
    fn begin_array_value<W: ?Sized + io::Write>(&mut self, writer: &mut W, first: bool) -> io::Result<()> {
        if first { Ok(()) } else { writer.write_all(b", ") }
    }

    fn begin_object_key<W: ?Sized + io::Write>(&mut self, writer: &mut W, first: bool) -> io::Result<()> {
        if first { Ok(()) } else { writer.write_all(b", ") }
    }

    fn begin_object_value<W: ?Sized + io::Write>(&mut self, writer: &mut W) -> io::Result<()> {
        writer.write_all(b": ")
    }

    fn write_string_fragment<W: ?Sized + io::Write>(
        &mut self,
        writer: &mut W,
        fragment: &str,
    ) -> io::Result<()> {
        for ch in fragment.chars() {
            if ch.is_ascii() {
                writer.write_all(&[ch as u8])?;
            } else {
                let mut units = [0u16; 2];
                for unit in ch.encode_utf16(&mut units) {
                    write!(writer, "\\u{unit:04x}")?;
                }
            }
        }
        Ok(())
    }
}

/// A generated artifact owned by a job. Immutable once stored.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Output {
    pub id: i64,
    pub job_id: Uuid,
    #[serde(rename = "type")]
    pub output_type: String,
    pub content_text: String,
    pub content_type: String,
    pub created_at: DateTime<Utc>,
}
