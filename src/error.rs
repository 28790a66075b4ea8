use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

use crate::types::{ErrorEnvelope, RequestKind};

/// Failures of a single call to the inference service.
#[derive(Debug, Error)]
pub enum InferenceError {
    #[error("429 {message}")]
    RateLimited { message: String },

    #[error("{status} {message}")]
    Service { status: u16, message: String },

    #[error("request to inference service failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("malformed inference response: {0}")]
    MalformedResponse(String),
}

impl InferenceError {
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, InferenceError::RateLimited { .. })
    }
}

#[derive(Debug, Error)]
pub enum ClassifyError {
    #[error("{0}")]
    InvalidInput(&'static str),

    #[error("Request body too large")]
    PayloadTooLarge,

    #[error("model output is not a JSON object: {0}")]
    UpstreamFormat(String),

    #[error(transparent)]
    Inference(#[from] InferenceError),
}

impl ClassifyError {
    pub fn status(&self) -> StatusCode {
        match self {
            ClassifyError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            ClassifyError::PayloadTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            ClassifyError::UpstreamFormat(_) | ClassifyError::Inference(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Label used for the failure counter.
    pub fn reason(&self) -> &'static str {
        match self {
            ClassifyError::InvalidInput(_) => "invalid_input",
            ClassifyError::PayloadTooLarge => "payload_too_large",
            ClassifyError::UpstreamFormat(_) => "upstream_format",
            ClassifyError::Inference(InferenceError::RateLimited { .. }) => "rate_limited",
            ClassifyError::Inference(_) => "service",
        }
    }

    pub fn missing_field(kind: RequestKind) -> Self {
        match kind {
            RequestKind::Text => ClassifyError::InvalidInput("Label is required"),
            RequestKind::Image => ClassifyError::InvalidInput("Image is required"),
        }
    }
}

/// A gateway failure bound to the endpoint that produced it, rendered as the
/// public error envelope.
#[derive(Debug)]
pub struct ApiError {
    pub kind: RequestKind,
    pub source: ClassifyError,
}

impl ApiError {
    pub fn new(kind: RequestKind, source: ClassifyError) -> Self {
        Self { kind, source }
    }

    fn envelope(&self) -> ErrorEnvelope {
        match &self.source {
            ClassifyError::InvalidInput(message) => ErrorEnvelope {
                error: (*message).to_string(),
                details: None,
            },
            ClassifyError::PayloadTooLarge => ErrorEnvelope {
                error: self.source.to_string(),
                details: None,
            },
            other => ErrorEnvelope {
                error: match self.kind {
                    RequestKind::Text => "Text classification failed".to_string(),
                    RequestKind::Image => "Image classification failed".to_string(),
                },
                details: Some(other.to_string()),
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.source.status(), Json(self.envelope())).into_response()
    }
}
