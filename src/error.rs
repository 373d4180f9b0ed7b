use axum::{
    Json,
    response::{IntoResponse, Response},
};
use http::StatusCode;
use serde::Serialize;

#[derive(Serialize)]
pub struct ErrorResponse {
    error: String,
}

#[derive(Debug, thiserror::Error)]
pub enum NovelError {
    #[error("Novel not found: {0}")]
    NovelNotFound(String),

    #[error("Chapter {chapter} not found in volume {volume}")]
    ChapterNotFound { volume: String, chapter: String },

    #[error("AI generation failed: {0}")]
    AiGenerationFailed(String),

    #[error("AI provider error: {0}")]
    AiProvider(String),

    #[error("Background queue is full")]
    QueueFull,

    #[error("Job not found: {0}")]
    JobNotFound(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl NovelError {
    pub fn chapter_not_found(volume: &str, chapter: &str) -> Self {
        NovelError::ChapterNotFound {
            volume: volume.to_string(),
            chapter: chapter.to_string(),
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            NovelError::NovelNotFound(_)
            | NovelError::ChapterNotFound { .. }
            | NovelError::JobNotFound(_) => StatusCode::NOT_FOUND,
            NovelError::BadRequest(_) => StatusCode::BAD_REQUEST,
            NovelError::AiProvider(_) => StatusCode::BAD_GATEWAY,
            NovelError::AiGenerationFailed(_) => StatusCode::UNPROCESSABLE_ENTITY,
            NovelError::QueueFull => StatusCode::SERVICE_UNAVAILABLE,
            NovelError::Io(_) | NovelError::Json(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for NovelError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!("{}", self);
        }

        let body = Json(ErrorResponse {
            error: self.to_string(),
        });

        (status, body).into_response()
    }
}

pub type Result<T> = std::result::Result<T, NovelError>;
