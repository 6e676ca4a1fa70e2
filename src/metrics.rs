//! Business metrics snapshot client.
//!
//! Fetches the internal insights snapshot and renders it as markdown for the
//! weekly pilot memo prompt.

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use secrecy::{ExposeSecret, SecretString};
use serde_json::{Map, Value};

use crate::error::MetricsError;

const SNAPSHOT_PATH: &str = "/internal/insights/snapshot";
const TOKEN_HEADER: &str = "X-Internal-Agent-Token";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const VALUE_PREVIEW_CHARS: usize = 500;

/// Source of business metrics for memo generation.
#[async_trait]
pub trait MetricsSource: Send + Sync {
    /// Markdown summary of the last `days_back` days.
    async fn memo_snapshot(&self, days_back: u32) -> Result<String, MetricsError>;
}

/// Connection settings for the snapshot API.
#[derive(Debug, Clone)]
pub struct MetricsConfig {
    pub base_url: String,
    pub token: SecretString,
}

/// HTTP client for the snapshot endpoint.
pub struct SnapshotClient {
    base_url: String,
    token: SecretString,
    client: reqwest::Client,
}

impl SnapshotClient {
    pub fn new(config: MetricsConfig) -> Result<Self, MetricsError> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| MetricsError::Network(e.to_string()))?;

        Ok(Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            token: config.token,
            client,
        })
    }

    /// Fetch the raw snapshot JSON.
    pub async fn fetch_snapshot(&self, days_back: u32) -> Result<Map<String, Value>, MetricsError> {
        let end = Utc::now().date_naive();
        let start = end - chrono::Duration::days(i64::from(days_back));
        tracing::info!(%start, %end, "Fetching business snapshot");

        // The endpoint only serves a fixed seven-day window.
        let response = self
            .client
            .get(format!("{}{}", self.base_url, SNAPSHOT_PATH))
            .header(TOKEN_HEADER, self.token.expose_secret())
            .query(&[("range", "last_7_days")])
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    MetricsError::Timeout
                } else {
                    MetricsError::Network(e.to_string())
                }
            })?;

        let status = response.status();
        match status.as_u16() {
            200 => {}
            401 => return Err(MetricsError::Unauthorized),
            404 => return Err(MetricsError::EndpointNotFound),
            code => {
                let body = response.text().await.unwrap_or_default();
                return Err(MetricsError::Status { status: code, body });
            }
        }

        let data: Map<String, Value> = response
            .json()
            .await
            .map_err(|e| MetricsError::Decode(e.to_string()))?;
        tracing::info!(keys = data.len(), "Fetched business snapshot");
        Ok(data)
    }
}

#[async_trait]
impl MetricsSource for SnapshotClient {
    async fn memo_snapshot(&self, days_back: u32) -> Result<String, MetricsError> {
        let data = self.fetch_snapshot(days_back).await?;
        Ok(format_for_memo(&data))
    }
}

/// Render snapshot JSON as markdown sections.
pub fn format_for_memo(data: &Map<String, Value>) -> String {
    let mut lines = vec![
        "=== SLUSH BUSINESS DATA ===".to_string(),
        format!("Data fetched: {}", Utc::now().format("%Y-%m-%d %H:%M:%S")),
        String::new(),
    ];

    if let Some(metrics) = data.get("metrics") {
        lines.push("## Key Metrics".to_string());
        if let Some(map) = metrics.as_object() {
            for (key, value) in map {
                match value.as_object() {
                    Some(nested) => {
                        lines.push(format!("### {}", title_case(key)));
                        for (sub_key, sub_value) in nested {
                            lines.push(format!("- {sub_key}: {}", scalar(sub_value)));
                        }
                    }
                    None => lines.push(format!("- {key}: {}", scalar(value))),
                }
            }
        }
        lines.push(String::new());
    }

    if let Some(funnel) = data.get("funnel") {
        lines.push("## Funnel Performance".to_string());
        if let Some(map) = funnel.as_object() {
            for (stage, value) in map {
                lines.push(format!("### {}", title_case(stage)));
                match value.as_object() {
                    Some(nested) => {
                        for (key, v) in nested {
                            lines.push(format!("- {key}: {}", scalar(v)));
                        }
                    }
                    None => lines.push(format!("- Count: {}", scalar(value))),
                }
            }
        }
        lines.push(String::new());
    }

    for (key, value) in data {
        if key == "metrics" || key == "funnel" {
            continue;
        }
        lines.push(format!("## {}", title_case(key)));
        if value.is_object() || value.is_array() {
            lines.push(preview(&value.to_string(), VALUE_PREVIEW_CHARS));
        } else {
            lines.push(scalar(value));
        }
        lines.push(String::new());
    }

    lines.join("\n")
}

/// Banner used in place of the snapshot when it cannot be fetched.
pub fn unavailable_banner(reason: &str) -> String {
    format!(
        "=== SLUSH DATA UNAVAILABLE ===\nError: {reason}\nMemo will be generated without real business data."
    )
}

fn scalar(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn preview(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}

fn title_case(key: &str) -> String {
    key.split(['_', ' '])
        .filter(|w| !w.is_empty())
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<String>>()
        .join(" ")
}
