use std::path::PathBuf;

use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};
use thiserror::Error;

/// Errors surfaced by the classification service and its handler.
#[derive(Error, Debug)]
pub enum ServiceError {
    /// No network was configured on the pipeline before initialization
    #[error("network not configured: {0}")]
    NotConfigured(String),

    /// A required model artifact is missing from the model directory
    #[error("file not found: {}", .0.display())]
    FileNotFound(PathBuf),

    /// The request payload carries no usable image buffer
    #[error("invalid parameter given: {0}")]
    InvalidParameter(String),

    #[error("invalid signature: {0}")]
    InvalidSignature(String),

    #[error("can't find labels, did you put synset.txt into the model directory?")]
    MissingLabels,

    /// Label line does not follow the `<synset-id> <name>` layout
    #[error("label {index} is not in '<id> <name>' format: {label:?}")]
    MalformedLabel { index: usize, label: String },

    #[error("output index {index} has no label ({labels} labels loaded)")]
    LabelIndexOutOfRange { index: usize, labels: usize },

    #[error("unexpected tensor shape {shape:?}: {reason}")]
    ShapeMismatch { shape: Vec<usize>, reason: String },

    #[error("failed to decode image: {0}")]
    Decode(#[from] image::ImageError),

    #[error("model error: {0}")]
    Model(#[source] anyhow::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, ServiceError>;

impl ResponseError for ServiceError {
    fn status_code(&self) -> StatusCode {
        match self {
            ServiceError::InvalidParameter(_) | ServiceError::Decode(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).json(serde_json::json!({ "error": self.to_string() }))
    }
}
