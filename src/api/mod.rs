//! HTTP API.
//!
//! `/health` is open; every other route requires
//! `Authorization: Bearer <api key>`.

pub mod error;
pub mod routes;

use std::sync::Arc;

use axum::extract::{Request, State};
use axum::http::{HeaderValue, header};
use axum::middleware::{self, Next};
use axum::response::Response;
use axum::routing::{get, post};
use axum::Router;
use secrecy::{ExposeSecret, SecretString};
use tower_http::cors::{AllowHeaders, AllowMethods, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::jobs::JobManager;
use error::ApiError;

/// Shared state for API routes.
#[derive(Clone)]
pub struct AppState {
    pub manager: Arc<JobManager>,
    pub api_key: SecretString,
}

/// Build the full application router.
pub fn router(state: AppState, allowed_origins: &[String]) -> Router {
    let protected = Router::new()
        .route("/jobs", post(routes::create_job).get(routes::list_jobs))
        .route("/jobs/{job_id}", get(routes::get_job))
        .route("/jobs/{job_id}/output", get(routes::get_job_output))
        .route("/jobs/{job_id}/chat", post(routes::chat_with_job))
        .route("/outputs/latest", get(routes::get_latest_output))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_api_key));

    Router::new()
        .route("/health", get(routes::health))
        .merge(protected)
        .with_state(state)
        .layer(cors_layer(allowed_origins))
        .layer(TraceLayer::new_for_http())
}

/// Reject requests whose bearer token does not match the configured key.
async fn require_api_key(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim);

    match token {
        Some(token) if token == state.api_key.expose_secret() => Ok(next.run(request).await),
        _ => Err(ApiError::Unauthorized),
    }
}

fn cors_layer(allowed_origins: &[String]) -> CorsLayer {
    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(origin = %origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_credentials(true)
        .allow_methods(AllowMethods::mirror_request())
        .allow_headers(AllowHeaders::mirror_request())
}
