use axum::extract::multipart::MultipartError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use emotion_timeline_pipeline::{DecodeError, InferenceError, PipelineError};
use serde::Serialize;
use tracing::{error, warn};

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    MissingInput(&'static str),
    #[error("unsupported file format: {0}")]
    UnsupportedFormat(String),
    #[error("failed to read upload: {}", .0.body_text())]
    Upload(#[from] MultipartError),
    #[error("No face detected")]
    NoFaceDetected,
    #[error("could not decode upload: {0}")]
    Decode(#[from] DecodeError),
    #[error("emotion model unavailable: {0}")]
    Inference(#[from] InferenceError),
    #[error("internal error: {0}")]
    Internal(String),
}

impl From<PipelineError> for ApiError {
    fn from(e: PipelineError) -> Self {
        match e {
            PipelineError::NoFaceDetected => ApiError::NoFaceDetected,
            PipelineError::Decode(e) => ApiError::Decode(e),
            PipelineError::Inference(e) => ApiError::Inference(e),
        }
    }
}

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::MissingInput(_) | ApiError::NoFaceDetected => StatusCode::BAD_REQUEST,
            ApiError::UnsupportedFormat(_) => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            ApiError::Upload(e) => e.status(),
            ApiError::Decode(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::Inference(_) => StatusCode::BAD_GATEWAY,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            error!(error = %self, status = status.as_u16(), "request failed");
        } else {
            warn!(error = %self, status = status.as_u16(), "request rejected");
        }
        let body = ErrorBody {
            error: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_mapping() {
        assert_eq!(
            ApiError::MissingInput("No file uploaded").status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(ApiError::NoFaceDetected.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(
            ApiError::UnsupportedFormat("x.gif".into()).status_code(),
            StatusCode::UNSUPPORTED_MEDIA_TYPE
        );
        assert_eq!(
            ApiError::from(PipelineError::Decode(DecodeError::NoVideoStream)).status_code(),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            ApiError::from(PipelineError::Inference(InferenceError::InvalidResponse(
                "bad".into()
            )))
            .status_code(),
            StatusCode::BAD_GATEWAY
        );
    }

    #[test]
    fn no_face_message_matches_wire_contract() {
        assert_eq!(ApiError::NoFaceDetected.to_string(), "No face detected");
        assert_eq!(
            ApiError::MissingInput("No video uploaded").to_string(),
            "No video uploaded"
        );
    }
}
