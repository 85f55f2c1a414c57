use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

use crate::image::loader::ALLOWED_EXTENSIONS;

#[derive(Error, Debug)]
pub enum ClassifyError {
    #[error("Model not loaded. Please check server logs.")]
    ModelNotLoaded,

    #[error("Model loading failed: {0}")]
    ModelLoad(String),

    #[error("No file uploaded")]
    MissingFile,

    #[error("No file selected")]
    EmptyFilename,

    #[error("Invalid file type. Allowed types: {}", ALLOWED_EXTENSIONS.join(", "))]
    InvalidFileType,

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// 流式读取超限时实际大小未知，只携带上限
    #[error("File too large: max allowed {0} bytes")]
    FileTooLarge(usize),

    #[error("Image processing failed: {0}")]
    ImageProcessing(String),

    #[error("Inference failed: {0}")]
    Inference(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Image decode error: {0}")]
    ImageDecode(#[from] image::ImageError),

    #[error("ORT error: {0}")]
    Ort(#[from] ort::Error),

    #[error("Internal server error: {0}")]
    Internal(String),
}

impl ClassifyError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ClassifyError::MissingFile
            | ClassifyError::EmptyFilename
            | ClassifyError::InvalidFileType
            | ClassifyError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            ClassifyError::FileTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// 请求处理阶段（解码、推理）的失败，响应体带 `success: false`
    pub fn is_prediction_failure(&self) -> bool {
        matches!(
            self,
            ClassifyError::ImageProcessing(_)
                | ClassifyError::Inference(_)
                | ClassifyError::Io(_)
                | ClassifyError::ImageDecode(_)
                | ClassifyError::Ort(_)
                | ClassifyError::Internal(_)
        )
    }

    pub fn body(&self) -> serde_json::Value {
        if self.is_prediction_failure() {
            serde_json::json!({
                "success": false,
                "error": format!("Prediction failed: {}", self),
            })
        } else {
            serde_json::json!({ "error": self.to_string() })
        }
    }
}

impl IntoResponse for ClassifyError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        if status.is_server_error() {
            tracing::error!("Request failed: {} ({})", self, status);
        } else {
            tracing::warn!("Request rejected: {} ({})", self, status);
        }

        (status, axum::Json(self.body())).into_response()
    }
}
