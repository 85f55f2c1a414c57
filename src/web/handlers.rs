use crate::{
    image::ImageLoader,
    prediction::{ClassPercentages, PredictionPipeline, PredictionResult},
    utils::{error::ClassifyError, ScratchFile},
    web::AppState,
    Result,
};
use axum::{
    body::Bytes,
    extract::{multipart::MultipartError, multipart::MultipartRejection, Multipart, State},
    http::{header, HeaderMap, StatusCode},
    response::Json,
};
use serde::Serialize;
use serde_json::{json, Value};

/// `POST /predict` 成功响应
#[derive(Debug, Serialize)]
pub struct PredictResponse {
    pub success: bool,
    pub prediction: String,
    pub confidence: f32,
    pub all_probabilities: ClassPercentages,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uncertainty: Option<ClassPercentages>,
    pub message: String,
}

impl From<PredictionResult> for PredictResponse {
    fn from(result: PredictionResult) -> Self {
        let message = result.message();
        Self {
            success: true,
            prediction: result.label,
            confidence: result.confidence,
            all_probabilities: result.probabilities,
            uncertainty: result.uncertainty,
            message,
        }
    }
}

/// 健康检查
pub async fn health_handler(State(state): State<AppState>) -> (StatusCode, Json<Value>) {
    (
        StatusCode::OK,
        Json(json!({
            "status": "healthy",
            "model_loaded": state.model.is_loaded(),
            "message": "Breast Cancer Detection API is running"
        })),
    )
}

/// 服务信息
pub async fn info_handler(State(state): State<AppState>) -> Json<Value> {
    let config = &state.config;
    Json(json!({
        "service": "BUSI Classification Service",
        "version": env!("CARGO_PKG_VERSION"),
        "description": env!("CARGO_PKG_DESCRIPTION"),
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "model": state.model.stats(config),
        "inference": config.inference,
        "max_upload_size": config.server_config.max_upload_size,
    }))
}

/// Multipart文件上传预测
///
/// 检查顺序：模型已加载 → 请求体大小 → 存在 `file` 部分 → 文件名非空 → 扩展名合法。
/// 上传内容写入临时目录，处理结束后（无论成功失败）删除。
pub async fn predict_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    multipart: std::result::Result<Multipart, MultipartRejection>,
) -> Result<Json<PredictResponse>> {
    let classifier = state.model.classifier()?;
    let request_id = uuid::Uuid::new_v4().to_string();

    let max_upload_size = state.config.server_config.max_upload_size;
    if let Some(length) = content_length(&headers) {
        if length > max_upload_size {
            tracing::warn!("Rejecting upload: content-length {} bytes", length);
            return Err(ClassifyError::FileTooLarge(max_upload_size));
        }
    }

    let mut multipart = multipart.map_err(|e| {
        tracing::debug!("Not a multipart request: {}", e);
        ClassifyError::MissingFile
    })?;

    let (file_name, data) = read_upload(&mut multipart, max_upload_size).await?;

    if file_name.is_empty() {
        return Err(ClassifyError::EmptyFilename);
    }
    if !ImageLoader::is_allowed_file(&file_name) {
        return Err(ClassifyError::InvalidFileType);
    }

    tracing::info!(
        "Processing prediction request: request_id={}, file={}, size={} bytes",
        request_id,
        file_name,
        data.len()
    );

    let scratch = ScratchFile::new(
        &state.config.upload_dir,
        &format!("{}_{}", request_id, ImageLoader::secure_filename(&file_name)),
    );
    tokio::fs::write(scratch.path(), &data).await?;

    let pipeline = PredictionPipeline::new(classifier, state.config.inference.clone());
    let result = tokio::task::spawn_blocking(move || {
        let result = pipeline.predict_path(scratch.path());
        drop(scratch);
        result
    })
    .await
    .map_err(|e| ClassifyError::Internal(format!("Prediction task failed: {}", e)))??;

    tracing::info!(
        "Prediction completed: request_id={}, label={}, confidence={:.2}, mode={:?}, time={:.3}s",
        request_id,
        result.label,
        result.confidence,
        result.mode,
        result.processing_time
    );

    Ok(Json(PredictResponse::from(result)))
}

/// 读取第一个带文件名的 `file` 部分
///
/// 没有文件名的同名部分按普通表单字段处理，不算上传文件。
async fn read_upload(multipart: &mut Multipart, max_upload_size: usize) -> Result<(String, Bytes)> {
    let mut upload = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| multipart_error(e, max_upload_size))?
    {
        let field_name = field.name().unwrap_or("unknown").to_string();
        if field_name != "file" {
            tracing::debug!("Ignoring unknown field: {}", field_name);
            continue;
        }

        let Some(file_name) = field.file_name().map(str::to_string) else {
            tracing::debug!("Field 'file' has no filename, ignoring");
            continue;
        };

        let data = field
            .bytes()
            .await
            .map_err(|e| multipart_error(e, max_upload_size))?;

        if upload.is_none() {
            upload = Some((file_name, data));
        }
    }

    upload.ok_or(ClassifyError::MissingFile)
}

fn content_length(headers: &HeaderMap) -> Option<usize> {
    headers
        .get(header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse().ok())
}

/// 没有 Content-Length 时，超限在读取流时才暴露
fn multipart_error(e: MultipartError, max_upload_size: usize) -> ClassifyError {
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        ClassifyError::FileTooLarge(max_upload_size)
    } else {
        ClassifyError::InvalidInput(format!("Failed to read multipart data: {}", e.body_text()))
    }
}
