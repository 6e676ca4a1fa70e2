//! Configuration types, read from the environment at startup.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use secrecy::SecretString;

use crate::error::ConfigError;
use crate::llm::LlmConfig;
use crate::metrics::MetricsConfig;

const DEFAULT_API_KEY: &str = "dev-key-12345";
const DEFAULT_ORIGINS: &str = "http://localhost:3000,http://localhost:8080";

/// HTTP server settings.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub port: u16,
    /// Bearer token every authenticated route expects.
    pub api_key: SecretString,
    pub allowed_origins: Vec<String>,
}

/// Full service configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub db_path: PathBuf,
    pub llm: LlmConfig,
    /// Root of the reference-file sandbox.
    pub sandbox_dir: PathBuf,
    /// Markdown file embedded in memo and brief prompts.
    pub system_docs_path: PathBuf,
    /// Business metrics API. `None` disables live metrics.
    pub metrics: Option<MetricsConfig>,
    /// Directory for the daily rolling log file. `None` logs to stderr only.
    pub log_dir: Option<PathBuf>,
}

impl AppConfig {
    /// Read configuration from process environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let port = parse_or(&var, "PORT", 8080u16)?;
        let api_key = var("AGENT_OPS_API_KEY").unwrap_or_else(|| DEFAULT_API_KEY.to_string());
        let allowed_origins = var("ALLOWED_ORIGINS")
            .unwrap_or_else(|| DEFAULT_ORIGINS.to_string())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        let defaults = LlmConfig::default();
        let max_output_chars = parse_or(&var, "LLM_MAX_OUTPUT_CHARS", defaults.max_output_chars)?;
        if max_output_chars == 0 {
            return Err(ConfigError::InvalidValue {
                key: "LLM_MAX_OUTPUT_CHARS".to_string(),
                message: "must be greater than zero".to_string(),
            });
        }
        let timeout = match var("LLM_TIMEOUT_SECS") {
            Some(raw) => Some(Duration::from_secs(parse_value("LLM_TIMEOUT_SECS", &raw)?)),
            None => None,
        };
        let llm = LlmConfig {
            api_key: var("ANTHROPIC_API_KEY").map(SecretString::from),
            model: var("ANTHROPIC_MODEL").unwrap_or(defaults.model),
            max_output_chars,
            temperature: defaults.temperature,
            timeout,
        };

        let metrics = match (var("SLUSH_SNAPSHOT_BASE_URL"), var("SLUSH_SNAPSHOT_TOKEN")) {
            (Some(base_url), Some(token)) => Some(MetricsConfig {
                base_url,
                token: SecretString::from(token),
            }),
            _ => None,
        };

        Ok(Self {
            server: ServerConfig {
                port,
                api_key: SecretString::from(api_key),
                allowed_origins,
            },
            db_path: var("AGENT_OPS_DB_PATH")
                .unwrap_or_else(|| "./data/agent_ops.db".to_string())
                .into(),
            llm,
            sandbox_dir: var("AGENT_OPS_SANDBOX_DIR")
                .unwrap_or_else(|| "../ai_sandbox".to_string())
                .into(),
            system_docs_path: var("AGENT_OPS_SYSTEM_DOCS")
                .unwrap_or_else(|| "./system_docs.md".to_string())
                .into(),
            metrics,
            log_dir: var("AGENT_OPS_LOG_DIR").map(PathBuf::from),
        })
    }
}

fn parse_or<T, F>(var: &F, key: &str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    match var(key) {
        Some(raw) => parse_value(key, &raw),
        None => Ok(default),
    }
}

fn parse_value<T>(key: &str, raw: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    raw.trim().parse().map_err(|e: T::Err| ConfigError::InvalidValue {
        key: key.to_string(),
        message: format!("{raw:?}: {e}"),
    })
}
