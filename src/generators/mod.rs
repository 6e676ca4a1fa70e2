//! Report generation for each job type.
//!
//! `ContentGenerator` is the seam the job manager depends on. The production
//! implementation, `PromptGenerator`, builds a system/user prompt pair per
//! job type, pulls in sandbox files, system docs and business metrics, and
//! hands the pair to the `TextGenerator`.

pub mod prompts;

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::{GeneratorError, LlmError, MetricsError};
use crate::jobs::model::JobType;
use crate::llm::TextGenerator;
use crate::metrics::{self, MetricsSource};
use crate::sandbox::{LoadedFile, Sandbox};

use prompts::{
    INPUTS_PLACEHOLDER, LEAD_LIST_DEPRECATED, PROMPT_PACK_SYSTEM, RESEARCH_BRIEF_SYSTEM,
    WEEKLY_PILOT_MEMO_SYSTEM,
};

const SYSTEM_DOCS_UNAVAILABLE: &str = "System documentation not available.";
const PROMPT_PACK_EXCERPT_CHARS: usize = 2000;
const REPORT_EXCERPT_CHARS: usize = 3000;
const MAX_RESEARCH_QUESTIONS: usize = 5;
const DEFAULT_RANGE_DAYS: u32 = 7;

/// Produces report content for jobs and answers follow-up questions.
#[async_trait]
pub trait ContentGenerator: Send + Sync {
    /// Generate the report for a job.
    async fn generate(&self, job_type: JobType, params: &Value) -> Result<String, GeneratorError>;

    /// Single-turn completion used for follow-up chat.
    async fn complete(&self, system_prompt: &str, user_prompt: &str) -> Result<String, LlmError>;
}

/// A prompt pair ready to send, plus the inputs that fed it.
#[derive(Debug, Clone)]
pub struct PromptParts {
    pub system: &'static str,
    pub user: String,
    pub inputs: Vec<String>,
}

/// Template-driven generator backed by an LLM.
pub struct PromptGenerator {
    text: TextGenerator,
    sandbox: Sandbox,
    metrics: Option<Arc<dyn MetricsSource>>,
    system_docs_path: PathBuf,
}

impl PromptGenerator {
    pub fn new(text: TextGenerator, sandbox: Sandbox, system_docs_path: PathBuf) -> Self {
        Self {
            text,
            sandbox,
            metrics: None,
            system_docs_path,
        }
    }

    /// Attach a business metrics source for weekly memos.
    pub fn with_metrics(mut self, metrics: Arc<dyn MetricsSource>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    async fn system_docs(&self) -> String {
        match tokio::fs::read_to_string(&self.system_docs_path).await {
            Ok(docs) => docs,
            Err(e) => {
                tracing::warn!(
                    path = %self.system_docs_path.display(),
                    error = %e,
                    "Failed to load system docs"
                );
                SYSTEM_DOCS_UNAVAILABLE.to_string()
            }
        }
    }

    async fn business_snapshot(&self, days_back: u32) -> String {
        let Some(source) = &self.metrics else {
            return metrics::unavailable_banner(&MetricsError::NotConfigured.to_string());
        };
        match source.memo_snapshot(days_back).await {
            Ok(snapshot) => {
                tracing::info!("Fetched business data for weekly memo");
                snapshot
            }
            Err(e) => {
                tracing::warn!(error = %e, "Failed to fetch business data");
                metrics::unavailable_banner(&e.to_string())
            }
        }
    }

    async fn run(&self, kind: &'static str, parts: PromptParts) -> Result<String, GeneratorError> {
        let result = self
            .text
            .generate(parts.system, &parts.user)
            .await
            .map_err(|source| GeneratorError::Failed { kind, source })?;
        Ok(fill_inputs(result, &parts.inputs))
    }
}

#[async_trait]
impl ContentGenerator for PromptGenerator {
    async fn generate(&self, job_type: JobType, params: &Value) -> Result<String, GeneratorError> {
        match job_type {
            JobType::LeadList => Ok(LEAD_LIST_DEPRECATED.to_string()),
            JobType::PromptPack => {
                let files = self.sandbox.load_references(params).await;
                self.run("prompt pack", prompt_pack(params, &files)).await
            }
            JobType::WeeklyPilotMemo => {
                let files = self.sandbox.load_references(params).await;
                let docs = self.system_docs().await;
                let snapshot = self.business_snapshot(range_days(params)).await;
                self.run(
                    "weekly pilot memo",
                    weekly_pilot_memo(params, &files, &docs, &snapshot),
                )
                .await
            }
            JobType::ResearchBrief => {
                let files = self.sandbox.load_references(params).await;
                let docs = self.system_docs().await;
                self.run("research brief", research_brief(params, &files, &docs))
                    .await
            }
        }
    }

    async fn complete(&self, system_prompt: &str, user_prompt: &str) -> Result<String, LlmError> {
        self.text.generate(system_prompt, user_prompt).await
    }
}

/// Build the prompt-pack prompt. `source_context` switches it from feature
/// planning to turning memo suggestions into coding-agent prompts.
pub fn prompt_pack(params: &Value, files: &[LoadedFile]) -> PromptParts {
    let feature_name = str_param(params, "feature_name").unwrap_or_else(|| "Unnamed Feature".into());
    let description = str_param(params, "feature_description")
        .unwrap_or_else(|| "No description provided".into());
    let notes = str_param(params, "notes");
    let source_context = str_param(params, "source_context");

    let mut inputs = vec![format!("Feature: {feature_name}")];
    let mut user = match &source_context {
        Some(context) => {
            inputs.push("Source context from memo/research".to_string());
            format!(
                "Turn the following memo/research suggestions into concrete prompts for: {feature_name}\n\n\
                 ## Source Context (Memo/Research Output):\n{context}\n\n\
                 Feature Description: {description}\n"
            )
        }
        None => {
            inputs.push(format!("Description: {description}"));
            format!("Create an implementation plan for: {feature_name}\n\nDescription: {description}\n")
        }
    };
    if let Some(notes) = &notes {
        inputs.push(format!("Additional notes: {notes}"));
        user.push_str(&format!("\nAdditional Context: {notes}\n"));
    }

    append_files(
        &mut user,
        &mut inputs,
        files,
        "Available Context Files",
        "File",
        PROMPT_PACK_EXCERPT_CHARS,
    );

    PromptParts {
        system: PROMPT_PACK_SYSTEM,
        user,
        inputs,
    }
}

/// Build the weekly memo prompt around the business snapshot.
pub fn weekly_pilot_memo(
    params: &Value,
    files: &[LoadedFile],
    system_docs: &str,
    snapshot: &str,
) -> PromptParts {
    let pilot_name = str_param(params, "pilot_name").unwrap_or_else(|| "Slush Operations".into());
    let week_start = str_param(params, "week_start_date")
        .unwrap_or_else(|| chrono::Local::now().format("%Y-%m-%d").to_string());
    let notes = str_param(params, "notes");

    let mut inputs = vec![
        format!("Pilot: {pilot_name}"),
        format!("Week of: {week_start}"),
        "Real Slush business data".to_string(),
        "System documentation".to_string(),
    ];

    let mut user = format!("Analyze the weekly performance for: {pilot_name}\nWeek starting: {week_start}\n");
    if let Some(notes) = &notes {
        inputs.push(format!("Context notes: {notes}"));
        user.push_str(&format!("\nAdditional Context: {notes}\n"));
    }
    user.push_str(&format!("\n## System Documentation:\n{system_docs}\n"));
    user.push_str(&format!("\n## Real Business Data from Slush API:\n{snapshot}\n"));

    append_files(
        &mut user,
        &mut inputs,
        files,
        "Additional Data Files",
        "Data file",
        REPORT_EXCERPT_CHARS,
    );

    user.push_str(
        "\nIMPORTANT: Base your analysis on the REAL business data provided above. \
         Use actual metrics, identify real funnel drop-offs, and propose experiments \
         based on the actual data patterns you see.",
    );

    PromptParts {
        system: WEEKLY_PILOT_MEMO_SYSTEM,
        user,
        inputs,
    }
}

/// Build the research brief prompt.
pub fn research_brief(params: &Value, files: &[LoadedFile], system_docs: &str) -> PromptParts {
    let topic = str_param(params, "topic").unwrap_or_else(|| "Research Topic".into());
    let context_notes = str_param(params, "context_notes");
    let questions = research_questions(params);

    let mut inputs = vec![format!("Topic: {topic}"), "System documentation".to_string()];
    if let Some(notes) = &context_notes {
        inputs.push(format!("Context notes: {notes}"));
    }

    let mut user = format!("Research analysis for: {topic}\n\n");
    user.push_str(&format!("## System Documentation:\n{system_docs}\n\n"));

    if !questions.is_empty() {
        user.push_str("Research Questions:\n");
        for (i, question) in questions.iter().take(MAX_RESEARCH_QUESTIONS).enumerate() {
            user.push_str(&format!("{}. {question}\n", i + 1));
        }
        user.push('\n');
    }

    if let Some(notes) = &context_notes {
        user.push_str(&format!("Context: {notes}\n\n"));
    }

    if !files.is_empty() {
        user.push_str("## Available Research Materials:\n");
    }
    for file in files {
        inputs.push(format!("Research file: {}", file.slot.param_name()));
        user.push_str(&format!(
            "\n### {}:\n{}\n",
            file.slot.label(),
            excerpt(&file.content, REPORT_EXCERPT_CHARS)
        ));
    }

    PromptParts {
        system: RESEARCH_BRIEF_SYSTEM,
        user,
        inputs,
    }
}

/// Replace the echoed placeholder with the actual inputs list.
pub fn fill_inputs(result: String, inputs: &[String]) -> String {
    if !result.contains(INPUTS_PLACEHOLDER) {
        return result;
    }
    let list = inputs
        .iter()
        .map(|input| format!("- {input}"))
        .collect::<Vec<_>>()
        .join("\n");
    result.replace(INPUTS_PLACEHOLDER, &format!("## Inputs Used\n{list}"))
}

/// First `max` characters of `text`, with `...` when cut.
pub fn excerpt(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}

fn append_files(
    user: &mut String,
    inputs: &mut Vec<String>,
    files: &[LoadedFile],
    heading: &str,
    input_label: &str,
    max_chars: usize,
) {
    if files.is_empty() {
        return;
    }
    user.push_str(&format!("\n## {heading}:\n"));
    for file in files {
        inputs.push(format!("{input_label}: {}", file.slot.param_name()));
        user.push_str(&format!(
            "\n### {}:\n{}\n",
            file.slot.label(),
            excerpt(&file.content, max_chars)
        ));
    }
}

/// Non-empty parameter rendered as text. Non-string values use their JSON form.
fn str_param(params: &Value, key: &str) -> Option<String> {
    match params.get(key)? {
        Value::Null => None,
        Value::String(s) if s.is_empty() => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

fn range_days(params: &Value) -> u32 {
    if params.get("range").and_then(Value::as_str) == Some("last_7_days") {
        return DEFAULT_RANGE_DAYS;
    }
    params
        .get("range_days")
        .and_then(Value::as_u64)
        .and_then(|d| u32::try_from(d).ok())
        .unwrap_or(DEFAULT_RANGE_DAYS)
}

/// Questions given as a list or as newline-separated text.
fn research_questions(params: &Value) -> Vec<String> {
    match params.get("questions") {
        Some(Value::String(text)) => text
            .lines()
            .map(str::trim)
            .filter(|q| !q.is_empty())
            .map(str::to_string)
            .collect(),
        Some(Value::Array(items)) => items
            .iter()
            .map(|item| match item {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            })
            .collect(),
        _ => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{CompletionRequest, CompletionResponse, LlmConfig, LlmProvider};
    use crate::sandbox::Slot;
    use serde_json::json;
    use std::sync::Mutex;

    /// Echoes a canned reply and records the prompts it saw.
    struct RecordingProvider {
        reply: Result<String, ()>,
        seen: Mutex<Vec<CompletionRequest>>,
    }

    impl RecordingProvider {
        fn replying(reply: &str) -> Arc<Self> {
            Arc::new(Self {
                reply: Ok(reply.to_string()),
                seen: Mutex::new(Vec::new()),
            })
        }

        fn failing() -> Arc<Self> {
            Arc::new(Self {
                reply: Err(()),
                seen: Mutex::new(Vec::new()),
            })
        }

        fn last_user_prompt(&self) -> String {
            let seen = self.seen.lock().unwrap();
            seen.last().unwrap().messages.last().unwrap().content.clone()
        }
    }

    #[async_trait]
    impl LlmProvider for RecordingProvider {
        fn model_name(&self) -> &str {
            "recording"
        }

        async fn complete(
            &self,
            request: CompletionRequest,
        ) -> Result<CompletionResponse, LlmError> {
            self.seen.lock().unwrap().push(request);
            match &self.reply {
                Ok(content) => Ok(CompletionResponse {
                    content: content.clone(),
                }),
                Err(()) => Err(LlmError::RateLimited {
                    provider: "recording".to_string(),
                }),
            }
        }
    }

    struct FixedMetrics;

    #[async_trait]
    impl MetricsSource for FixedMetrics {
        async fn memo_snapshot(&self, days_back: u32) -> Result<String, MetricsError> {
            Ok(format!("orders over {days_back} days: 42"))
        }
    }

    fn generator(provider: Arc<RecordingProvider>) -> PromptGenerator {
        let text = TextGenerator::new(provider, &LlmConfig::default());
        PromptGenerator::new(
            text,
            Sandbox::new("/nonexistent/agent-ops-sandbox"),
            PathBuf::from("/nonexistent/system_docs.md"),
        )
    }

    fn loaded(slot: Slot, content: &str) -> LoadedFile {
        LoadedFile {
            slot,
            key: "file.txt".to_string(),
            content: content.to_string(),
        }
    }

    #[tokio::test]
    async fn lead_list_skips_the_model() {
        let provider = RecordingProvider::replying("unused");
        let generator = generator(provider.clone());

        let text = generator.generate(JobType::LeadList, &json!({})).await.unwrap();
        assert!(text.contains("DEPRECATED"));
        assert!(provider.seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn inputs_placeholder_is_replaced() {
        let reply = "# Research Brief - X\n\n## Goal\nG\n\n## Inputs Used\n[List each input source explicitly]\n\n## Research Questions";
        let provider = RecordingProvider::replying(reply);
        let generator = generator(provider.clone());

        let text = generator
            .generate(JobType::ResearchBrief, &json!({"topic": "X", "context_notes": "n"}))
            .await
            .unwrap();
        assert!(text.contains("## Inputs Used\n- Topic: X\n- System documentation\n- Context notes: n\n"));
        assert!(!text.contains("[List each input source explicitly]"));
    }

    #[tokio::test]
    async fn llm_failure_is_wrapped_with_kind() {
        let generator = generator(RecordingProvider::failing());
        let err = generator
            .generate(JobType::PromptPack, &json!({"feature_name": "F"}))
            .await
            .unwrap_err();
        assert!(err.to_string().starts_with("Failed to generate prompt pack:"));
    }

    #[tokio::test]
    async fn research_brief_falls_back_without_system_docs() {
        let provider = RecordingProvider::replying("# Brief");
        let generator = generator(provider.clone());

        generator
            .generate(JobType::ResearchBrief, &json!({"topic": "X"}))
            .await
            .unwrap();
        let user = provider.last_user_prompt();
        assert!(user.starts_with("Research analysis for: X\n\n"));
        assert!(user.contains(SYSTEM_DOCS_UNAVAILABLE));
    }

    #[tokio::test]
    async fn weekly_memo_uses_metrics_source() {
        let provider = RecordingProvider::replying("# Memo");
        let generator = generator(provider.clone()).with_metrics(Arc::new(FixedMetrics));

        generator
            .generate(
                JobType::WeeklyPilotMemo,
                &json!({"pilot_name": "P", "week_start_date": "2026-02-02", "range_days": 14}),
            )
            .await
            .unwrap();
        let user = provider.last_user_prompt();
        assert!(user.contains("Week starting: 2026-02-02"));
        assert!(user.contains("orders over 14 days: 42"));
        assert!(user.ends_with("based on the actual data patterns you see."));
    }

    #[tokio::test]
    async fn weekly_memo_without_metrics_uses_banner() {
        let provider = RecordingProvider::replying("# Memo");
        let generator = generator(provider.clone());

        generator
            .generate(JobType::WeeklyPilotMemo, &json!({}))
            .await
            .unwrap();
        let user = provider.last_user_prompt();
        assert!(user.contains("Analyze the weekly performance for: Slush Operations"));
        assert!(user.contains("=== SLUSH DATA UNAVAILABLE ==="));
    }

    #[tokio::test]
    async fn complete_passes_prompts_through() {
        let provider = RecordingProvider::replying("answer");
        let generator = generator(provider.clone());

        let reply = generator.complete("sys", "Follow-up question: why?").await.unwrap();
        assert_eq!(reply, "answer");
        assert_eq!(provider.last_user_prompt(), "Follow-up question: why?");
    }

    #[test]
    fn prompt_pack_with_source_context() {
        let params = json!({
            "feature_name": "Checkout",
            "feature_description": "Faster checkout",
            "source_context": "Memo says cut steps",
            "notes": "mobile first"
        });
        let parts = prompt_pack(&params, &[]);
        assert!(parts.user.starts_with(
            "Turn the following memo/research suggestions into concrete prompts for: Checkout"
        ));
        assert!(parts.user.contains("Memo says cut steps"));
        assert_eq!(
            parts.inputs,
            vec![
                "Feature: Checkout",
                "Source context from memo/research",
                "Additional notes: mobile first"
            ]
        );
    }

    #[test]
    fn prompt_pack_defaults_and_file_excerpts() {
        let long = "y".repeat(2500);
        let parts = prompt_pack(&json!({}), &[loaded(Slot::RepoSnapshots, &long)]);
        assert!(parts.user.starts_with("Create an implementation plan for: Unnamed Feature"));
        assert!(parts.user.contains("Description: No description provided"));
        assert!(parts.user.contains("## Available Context Files:\n\n### Repo Snapshot:\n"));
        assert!(parts.user.contains(&format!("{}...", "y".repeat(2000))));
        assert!(!parts.user.contains(&"y".repeat(2001)));
        assert_eq!(parts.inputs.last().unwrap(), "File: repo_snapshot_key");
    }

    #[test]
    fn research_questions_from_string_or_list() {
        let from_text = research_questions(&json!({"questions": "a\n\n b \nc"}));
        assert_eq!(from_text, vec!["a", "b", "c"]);

        let from_list = research_questions(&json!({"questions": ["q1", "q2"]}));
        assert_eq!(from_list, vec!["q1", "q2"]);

        assert!(research_questions(&json!({"questions": 3})).is_empty());
    }

    #[test]
    fn research_brief_caps_questions() {
        let params = json!({"topic": "T", "questions": ["1", "2", "3", "4", "5", "6"]});
        let parts = research_brief(&params, &[], "docs");
        assert!(parts.user.contains("5. 5\n"));
        assert!(!parts.user.contains("6. 6"));
    }

    #[test]
    fn range_days_handles_legacy_param() {
        assert_eq!(range_days(&json!({})), 7);
        assert_eq!(range_days(&json!({"range_days": 30})), 30);
        assert_eq!(range_days(&json!({"range": "last_7_days", "range_days": 30})), 7);
    }

    #[test]
    fn fill_inputs_leaves_other_text_alone() {
        let text = fill_inputs("no placeholder here".to_string(), &["a".to_string()]);
        assert_eq!(text, "no placeholder here");
    }

    #[test]
    fn excerpt_marks_truncation() {
        assert_eq!(excerpt("abc", 5), "abc");
        assert_eq!(excerpt("abcdef", 3), "abc...");
    }
}
