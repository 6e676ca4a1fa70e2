//! Read-only access to reference files under the sandbox directory.
//!
//! Job parameters may name a file in one of three slots:
//! - `repo_snapshot_key`: `repo_snapshots/`
//! - `data_export_key`: `pilot_data_exports/`
//! - `notes_key`: `outputs/`
//!
//! File keys are bare file names. Anything that could walk out of the slot
//! directory is rejected before the filesystem is touched, and the resolved
//! path is checked again after canonicalization.

use std::path::PathBuf;
use std::sync::LazyLock;

use regex::Regex;
use tokio::fs;

use crate::error::SandboxError;

/// Largest file that will be loaded.
pub const MAX_FILE_SIZE: u64 = 2 * 1024 * 1024;

static FORBIDDEN_KEY: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\.\.|[/\\]").unwrap());

/// A sandbox sub-directory that job parameters can reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Slot {
    RepoSnapshots,
    PilotDataExports,
    Outputs,
}

impl Slot {
    pub const ALL: [Slot; 3] = [Slot::RepoSnapshots, Slot::PilotDataExports, Slot::Outputs];

    /// Directory name under the sandbox root.
    pub fn dir_name(&self) -> &'static str {
        match self {
            Self::RepoSnapshots => "repo_snapshots",
            Self::PilotDataExports => "pilot_data_exports",
            Self::Outputs => "outputs",
        }
    }

    /// Job parameter that selects a file in this slot.
    pub fn param_name(&self) -> &'static str {
        match self {
            Self::RepoSnapshots => "repo_snapshot_key",
            Self::PilotDataExports => "data_export_key",
            Self::Outputs => "notes_key",
        }
    }

    /// Heading used when the file is embedded in a prompt.
    pub fn label(&self) -> &'static str {
        match self {
            Self::RepoSnapshots => "Repo Snapshot",
            Self::PilotDataExports => "Data Export",
            Self::Outputs => "Notes",
        }
    }
}

/// A reference file loaded for a job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadedFile {
    pub slot: Slot,
    pub key: String,
    pub content: String,
}

/// Sandbox rooted at a directory on disk.
#[derive(Debug, Clone)]
pub struct Sandbox {
    root: PathBuf,
}

impl Sandbox {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Load one file. `Ok(None)` when it does not exist.
    pub async fn load_file(&self, slot: Slot, key: &str) -> Result<Option<String>, SandboxError> {
        if key.is_empty() || FORBIDDEN_KEY.is_match(key) {
            return Err(SandboxError::InvalidKey);
        }

        let base = self.root.join(slot.dir_name());
        let path = base.join(key);

        if !fs::try_exists(&path).await? {
            tracing::info!(path = %path.display(), "Sandbox file not found");
            return Ok(None);
        }

        let resolved = fs::canonicalize(&path).await?;
        let base_canonical = fs::canonicalize(&base).await?;
        if !resolved.starts_with(&base_canonical) {
            return Err(SandboxError::Escape(key.to_string()));
        }

        let metadata = fs::metadata(&resolved).await?;
        if !metadata.is_file() {
            return Err(SandboxError::NotAFile(key.to_string()));
        }
        if metadata.len() > MAX_FILE_SIZE {
            return Err(SandboxError::TooLarge {
                size: metadata.len(),
                max: MAX_FILE_SIZE,
            });
        }

        let bytes = fs::read(&resolved).await?;
        let content = String::from_utf8(bytes).map_err(|_| SandboxError::NotUtf8)?;
        tracing::info!(
            path = %resolved.display(),
            chars = content.chars().count(),
            "Loaded sandbox file"
        );
        Ok(Some(content))
    }

    /// Load every slot referenced by `params`.
    ///
    /// Errors are logged and skipped so one bad reference never fails a job.
    /// Empty files are skipped as well.
    pub async fn load_references(&self, params: &serde_json::Value) -> Vec<LoadedFile> {
        let mut loaded = Vec::new();
        for slot in Slot::ALL {
            let Some(key) = params.get(slot.param_name()).and_then(|v| v.as_str()) else {
                continue;
            };
            if key.is_empty() {
                continue;
            }
            match self.load_file(slot, key).await {
                Ok(Some(content)) if !content.is_empty() => {
                    tracing::info!(param = slot.param_name(), key, "Loaded reference file");
                    loaded.push(LoadedFile {
                        slot,
                        key: key.to_string(),
                        content,
                    });
                }
                Ok(_) => {
                    tracing::info!(param = slot.param_name(), key, "Reference file not found");
                }
                Err(e) => {
                    tracing::warn!(
                        param = slot.param_name(),
                        key,
                        error = %e,
                        "Failed to load reference file"
                    );
                }
            }
        }
        loaded
    }
}
