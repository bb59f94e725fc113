use axum::{http::StatusCode, response::{IntoResponse, Response}, Json};
use serde_json::json;
use thiserror::Error;
use uuid::Uuid;

use crate::guard::GuardError;

pub const GENERIC_FAILURE: &str = "Error generating the carousel";

/// Failures of the remote text/image models.
#[derive(Debug, Error)]
pub enum UpstreamError {
    #[error("HTTP error: {0}")]
    Http(String),
    #[error("status={status} message={message}")]
    Status { status: u16, message: String },
    #[error("parse error: {0}")]
    Parse(String),
    #[error("unexpected shape: {0}")]
    Shape(String),
    #[error("timed out after {0}s")]
    Timeout(u64),
    #[error("{0}")]
    Other(String),
}

impl From<reqwest::Error> for UpstreamError {
    fn from(e: reqwest::Error) -> Self {
        UpstreamError::Http(e.to_string())
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("carousel {0} not found")]
    CarouselNotFound(Uuid),
    #[error("slide {slide} not found in carousel {carousel}")]
    SlideNotFound { carousel: Uuid, slide: u32 },
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    StyleAnalysis,
    Narrative,
    Image,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Stage::StyleAnalysis => "style analysis",
            Stage::Narrative => "narrative generation",
            Stage::Image => "image generation",
        })
    }
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("{0}")]
    Validation(String),
    #[error(transparent)]
    Guard(#[from] GuardError),
    #[error("{stage} failed on slide {slide:?}: {source}")]
    Upstream { stage: Stage, slide: Option<u32>, #[source] source: UpstreamError },
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("generation cancelled")]
    Cancelled,
}

/// Errors surfaced over HTTP. The status mapping lives in one place:
/// see [`AppError::status`].
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Unauthorized")]
    Unauthorized,
    #[error("Forbidden")]
    Forbidden,
    #[error("{0}")]
    BadRequest(String),
    #[error("Not found")]
    NotFound,
    #[error("{0}")]
    Upstream(String),
    #[error("{0}")]
    Internal(String),
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Unauthorized => StatusCode::UNAUTHORIZED,
            AppError::Forbidden => StatusCode::FORBIDDEN,
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound => StatusCode::NOT_FOUND,
            AppError::Upstream(_) => StatusCode::BAD_GATEWAY,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<PipelineError> for AppError {
    fn from(e: PipelineError) -> Self {
        match e {
            PipelineError::Validation(msg) => AppError::BadRequest(msg),
            PipelineError::Guard(g) => AppError::BadRequest(g.to_string()),
            PipelineError::Upstream { source, .. } => AppError::Upstream(source.to_string()),
            PipelineError::Store(StoreError::CarouselNotFound(_)) => AppError::NotFound,
            PipelineError::Store(s) => AppError::Internal(s.to_string()),
            PipelineError::Cancelled => AppError::Internal("generation cancelled".into()),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = self.to_string();
        let message = if message.trim().is_empty() { GENERIC_FAILURE.to_string() } else { message };
        (status, Json(json!({ "error": message }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_kinds_map_to_statuses() {
        let guard = PipelineError::Guard(GuardError::ForbiddenToken { token: "neon".into(), rule: "neon".into() });
        assert_eq!(AppError::from(guard).status(), StatusCode::BAD_REQUEST);
        let upstream = PipelineError::Upstream { stage: Stage::Image, slide: Some(2), source: UpstreamError::Timeout(5) };
        assert_eq!(AppError::from(upstream).status(), StatusCode::BAD_GATEWAY);
        assert_eq!(AppError::Unauthorized.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(AppError::from(PipelineError::Cancelled).status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn empty_messages_fall_back_to_generic_text() {
        let response = AppError::Upstream(String::new()).into_response();
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
        let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(value["error"], GENERIC_FAILURE);
    }
}
