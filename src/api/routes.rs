//! REST handlers for jobs, outputs and chat.

use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, Query, State};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use uuid::Uuid;

use super::AppState;
use super::error::ApiError;
use crate::jobs::{Job, JobType, Output};

#[derive(Debug, Deserialize)]
pub struct CreateJobRequest {
    #[serde(rename = "type")]
    pub job_type: JobType,
    pub params: Map<String, Value>,
}

#[derive(Debug, Deserialize)]
pub struct LatestOutputQuery {
    #[serde(rename = "type")]
    pub output_type: String,
}

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct ChatResponse {
    pub reply: String,
}

/// GET /health
pub async fn health() -> Json<Value> {
    Json(json!({"status": "healthy", "timestamp": Utc::now()}))
}

/// POST /jobs
///
/// Persists the job and returns it immediately, usually still QUEUED.
pub async fn create_job(
    State(state): State<AppState>,
    body: Result<Json<CreateJobRequest>, JsonRejection>,
) -> Result<Json<Job>, ApiError> {
    let Json(request) = body.map_err(|e| ApiError::Unprocessable(e.body_text()))?;
    let job = state
        .manager
        .create(request.job_type, Value::Object(request.params))
        .await?;
    Ok(Json(job))
}

/// GET /jobs
pub async fn list_jobs(State(state): State<AppState>) -> Result<Json<Vec<Job>>, ApiError> {
    Ok(Json(state.manager.list().await?))
}

/// GET /jobs/{job_id}
pub async fn get_job(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> Result<Json<Job>, ApiError> {
    let id = parse_id(&job_id).ok_or(ApiError::NotFound("Job not found"))?;
    state
        .manager
        .get(id)
        .await?
        .map(Json)
        .ok_or(ApiError::NotFound("Job not found"))
}

/// GET /jobs/{job_id}/output
pub async fn get_job_output(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> Result<Json<Output>, ApiError> {
    let id = parse_id(&job_id).ok_or(ApiError::NotFound("Output not found"))?;
    state
        .manager
        .get_output(id)
        .await?
        .map(Json)
        .ok_or(ApiError::NotFound("Output not found"))
}

/// GET /outputs/latest?type=...
pub async fn get_latest_output(
    State(state): State<AppState>,
    query: Result<Query<LatestOutputQuery>, axum::extract::rejection::QueryRejection>,
) -> Result<Json<Output>, ApiError> {
    let Query(query) = query.map_err(|e| ApiError::Unprocessable(e.body_text()))?;
    state
        .manager
        .get_latest_output(&query.output_type)
        .await?
        .map(Json)
        .ok_or(ApiError::NotFound("Output not found"))
}

/// POST /jobs/{job_id}/chat
pub async fn chat_with_job(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
    body: Result<Json<ChatRequest>, JsonRejection>,
) -> Result<Json<ChatResponse>, ApiError> {
    let Json(request) = body.map_err(|e| ApiError::Unprocessable(e.body_text()))?;
    let id = parse_id(&job_id).ok_or(ApiError::NotFound("Job not found"))?;
    let reply = state.manager.chat(id, &request.message).await?;
    Ok(Json(ChatResponse { reply }))
}

/// Malformed ids cannot name a stored job, so they read as not found.
fn parse_id(raw: &str) -> Option<Uuid> {
    Uuid::parse_str(raw).ok()
}
