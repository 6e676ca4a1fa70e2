//! HTTP error responses. Every error body is `{"detail": "..."}`.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

use crate::error::{Error, JobError};

/// Error returned by API handlers.
#[derive(Debug)]
pub enum ApiError {
    Unauthorized,
    NotFound(&'static str),
    Unprocessable(String),
    /// The model call behind a chat reply failed.
    Generation(String),
    Internal,
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Unprocessable(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Self::Generation(_) | Self::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn detail(&self) -> String {
        match self {
            Self::Unauthorized => "Invalid API key".to_string(),
            Self::NotFound(what) => (*what).to_string(),
            Self::Unprocessable(message) => message.clone(),
            Self::Generation(reason) => format!("Error generating response: {reason}"),
            Self::Internal => "Internal server error".to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status(), Json(json!({ "detail": self.detail() }))).into_response()
    }
}

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        match err {
            Error::Job(JobError::NotFound { .. }) => ApiError::NotFound("Job not found"),
            Error::Job(JobError::OutputNotFound { .. }) => ApiError::NotFound("Job output not found"),
            Error::Llm(e) => ApiError::Generation(e.to_string()),
            other => {
                tracing::error!(error = %other, "Request failed");
                ApiError::Internal
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{DatabaseError, LlmError};
    use uuid::Uuid;

    #[test]
    fn maps_domain_errors() {
        let id = Uuid::new_v4();
        let not_found = ApiError::from(Error::from(JobError::OutputNotFound { job_id: id }));
        assert_eq!(not_found.status(), StatusCode::NOT_FOUND);
        assert_eq!(not_found.detail(), "Job output not found");

        let llm = ApiError::from(Error::from(LlmError::RateLimited {
            provider: "anthropic".into(),
        }));
        assert_eq!(llm.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(llm.detail().starts_with("Error generating response: "));

        let db = ApiError::from(Error::from(DatabaseError::Query("disk I/O".into())));
        assert_eq!(db.detail(), "Internal server error");
    }

    #[test]
    fn unauthorized_detail() {
        assert_eq!(ApiError::Unauthorized.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(ApiError::Unauthorized.detail(), "Invalid API key");
    }
}
