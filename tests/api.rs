use axum::{
    body::Body,
    http::{header, Request, StatusCode},
    Router,
};
use busi_serve::{
    config::InferenceMode,
    models::{ImageClassifier, ModelHandle},
    web::{create_app, AppState},
    Config, Result,
};
use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use ndarray::Array4;
use serde_json::Value;
use std::io::Cursor;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tower::ServiceExt;

const BOUNDARY: &str = "busi-test-boundary";

struct StubModel {
    scores: Vec<f32>,
    calls: AtomicUsize,
}

impl StubModel {
    fn new(scores: Vec<f32>) -> Arc<Self> {
        Arc::new(Self {
            scores,
            calls: AtomicUsize::new(0),
        })
    }
}

impl ImageClassifier for StubModel {
    fn predict(&self, _input: &Array4<f32>) -> Result<Vec<f32>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.scores.clone())
    }

    fn name(&self) -> &str {
        "stub"
    }
}

struct Part<'a> {
    name: &'a str,
    file_name: Option<&'a str>,
    data: &'a [u8],
}

fn multipart_body(parts: &[Part]) -> Vec<u8> {
    let mut body = Vec::new();
    for part in parts {
        body.extend_from_slice(format!("--{}\r\n", BOUNDARY).as_bytes());
        match part.file_name {
            Some(file_name) => body.extend_from_slice(
                format!(
                    "Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\n\
                     Content-Type: application/octet-stream\r\n\r\n",
                    part.name, file_name
                )
                .as_bytes(),
            ),
            None => body.extend_from_slice(
                format!("Content-Disposition: form-data; name=\"{}\"\r\n\r\n", part.name)
                    .as_bytes(),
            ),
        }
        body.extend_from_slice(part.data);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{}--\r\n", BOUNDARY).as_bytes());
    body
}

fn predict_request(parts: &[Part]) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/predict")
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={}", BOUNDARY),
        )
        .body(Body::from(multipart_body(parts)))
        .unwrap()
}

fn file_part<'a>(file_name: &'a str, data: &'a [u8]) -> Part<'a> {
    Part {
        name: "file",
        file_name: Some(file_name),
        data,
    }
}

fn png_bytes(width: u32, height: u32) -> Vec<u8> {
    let image = DynamicImage::ImageRgb8(RgbImage::from_fn(width, height, |x, y| {
        Rgb([(x % 256) as u8, (y % 256) as u8, 90])
    }));
    let mut buffer = Cursor::new(Vec::new());
    image.write_to(&mut buffer, ImageFormat::Png).unwrap();
    buffer.into_inner()
}

fn app(upload_dir: &Path, model: ModelHandle, mode: InferenceMode) -> Router {
    let mut config = Config::new(
        "127.0.0.1:0".to_string(),
        "model.onnx".to_string(),
        upload_dir.to_string_lossy().into_owned(),
        Some(1),
        false,
    )
    .unwrap();
    config.inference.mode = mode;
    create_app(AppState::new(config, model))
}

async fn send(app: Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, body)
}

fn scratch_is_empty(dir: &Path) -> bool {
    std::fs::read_dir(dir).unwrap().next().is_none()
}

#[tokio::test]
async fn health_reports_model_state() {
    let dir = tempfile::tempdir().unwrap();

    let loaded = app(
        dir.path(),
        ModelHandle::loaded(StubModel::new(vec![0.2, 0.3, 0.5])),
        InferenceMode::Single,
    );
    let (status, body) = send(loaded, Request::get("/").body(Body::empty()).unwrap()).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["model_loaded"], true);
    assert_eq!(body["message"], "Breast Cancer Detection API is running");

    let missing = app(
        dir.path(),
        ModelHandle::unavailable("file not found"),
        InferenceMode::Single,
    );
    let (status, body) = send(missing, Request::get("/").body(Body::empty()).unwrap()).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["model_loaded"], false);
}

#[tokio::test]
async fn predict_without_model_is_500() {
    let dir = tempfile::tempdir().unwrap();
    let app = app(
        dir.path(),
        ModelHandle::unavailable("file not found"),
        InferenceMode::Single,
    );
    let png = png_bytes(32, 32);

    let (status, body) = send(app, predict_request(&[file_part("scan.png", &png)])).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["error"], "Model not loaded. Please check server logs.");
    assert!(scratch_is_empty(dir.path()));
}

#[tokio::test]
async fn missing_file_field_is_400() {
    let dir = tempfile::tempdir().unwrap();
    let model = ModelHandle::loaded(StubModel::new(vec![0.2, 0.3, 0.5]));

    let other_field = Part {
        name: "comment",
        file_name: None,
        data: b"hello",
    };
    let (status, body) = send(
        app(dir.path(), model.clone(), InferenceMode::Single),
        predict_request(&[other_field]),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("No file uploaded"));

    // `file` 字段没有文件名，视为普通表单字段
    let plain_file_field = Part {
        name: "file",
        file_name: None,
        data: b"scan.png",
    };
    let (status, body) = send(
        app(dir.path(), model.clone(), InferenceMode::Single),
        predict_request(&[plain_file_field]),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "No file uploaded");

    // 不是 multipart 请求
    let request = Request::post("/predict").body(Body::from("{}")).unwrap();
    let (status, body) = send(app(dir.path(), model, InferenceMode::Single), request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "No file uploaded");
}

#[tokio::test]
async fn empty_filename_is_400() {
    let dir = tempfile::tempdir().unwrap();
    let app = app(
        dir.path(),
        ModelHandle::loaded(StubModel::new(vec![0.2, 0.3, 0.5])),
        InferenceMode::Single,
    );

    let (status, body) = send(app, predict_request(&[file_part("", b"")])).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "No file selected");
}

#[tokio::test]
async fn disallowed_extensions_are_400() {
    let dir = tempfile::tempdir().unwrap();
    let model = ModelHandle::loaded(StubModel::new(vec![0.2, 0.3, 0.5]));
    let png = png_bytes(16, 16);

    for file_name in ["notes.txt", "scan", "scan.gif"] {
        let (status, body) = send(
            app(dir.path(), model.clone(), InferenceMode::Single),
            predict_request(&[file_part(file_name, &png)]),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{}", file_name);
        let error = body["error"].as_str().unwrap();
        assert!(error.contains("Invalid file type"), "{}", error);
        assert!(error.contains("png, jpg, jpeg"));
    }
    assert!(scratch_is_empty(dir.path()));
}

#[tokio::test]
async fn successful_prediction_cleans_up() {
    let dir = tempfile::tempdir().unwrap();
    let model = StubModel::new(vec![0.1, 0.7, 0.2]);
    let app = app(
        dir.path(),
        ModelHandle::loaded(model.clone()),
        InferenceMode::Single,
    );
    let png = png_bytes(300, 200);

    let (status, body) = send(app, predict_request(&[file_part("My Scan.PNG", &png)])).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["prediction"], "malignant");
    assert_eq!(model.calls.load(Ordering::SeqCst), 1);
    assert!(body.get("uncertainty").is_none());

    let probabilities = body["all_probabilities"].as_object().unwrap();
    assert_eq!(probabilities.len(), 3);
    let total: f64 = probabilities.values().map(|v| v.as_f64().unwrap()).sum();
    assert!((total - 100.0).abs() < 1e-3);

    let (best, best_value) = probabilities
        .iter()
        .map(|(k, v)| (k.clone(), v.as_f64().unwrap()))
        .max_by(|a, b| a.1.total_cmp(&b.1))
        .unwrap();
    assert_eq!(body["prediction"], best.as_str());

    let confidence = body["confidence"].as_f64().unwrap();
    assert!((confidence - best_value).abs() < 1e-4);
    assert!((0.0..=100.0).contains(&confidence));

    let message = body["message"].as_str().unwrap();
    assert!(message.starts_with("Image classified as malignant with "));

    assert!(scratch_is_empty(dir.path()));
}

#[tokio::test]
async fn tta_prediction_reports_uncertainty() {
    let dir = tempfile::tempdir().unwrap();
    let model = StubModel::new(vec![0.6, 0.3, 0.1]);
    let app = app(dir.path(), ModelHandle::loaded(model.clone()), InferenceMode::Tta);
    let png = png_bytes(120, 90);

    let (status, body) = send(app, predict_request(&[file_part("scan.jpeg", &png)])).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["prediction"], "benign");
    assert_eq!(model.calls.load(Ordering::SeqCst), 8);
    assert!(body["message"].as_str().unwrap().ends_with("(TTA enhanced)"));

    let uncertainty = body["uncertainty"].as_object().unwrap();
    assert_eq!(uncertainty.len(), 3);
    assert!(scratch_is_empty(dir.path()));
}

#[tokio::test]
async fn undecodable_image_is_prediction_failure() {
    let dir = tempfile::tempdir().unwrap();
    let app = app(
        dir.path(),
        ModelHandle::loaded(StubModel::new(vec![0.2, 0.3, 0.5])),
        InferenceMode::Single,
    );

    let (status, body) = send(
        app,
        predict_request(&[file_part("scan.jpg", b"this is not a jpeg")]),
    )
    .await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["success"], false);
    assert!(body["error"]
        .as_str()
        .unwrap()
        .starts_with("Prediction failed: "));
    assert!(scratch_is_empty(dir.path()));
}

#[tokio::test]
async fn wrong_model_output_is_prediction_failure() {
    let dir = tempfile::tempdir().unwrap();
    let app = app(
        dir.path(),
        ModelHandle::loaded(StubModel::new(vec![1.0, 0.0])),
        InferenceMode::Single,
    );
    let png = png_bytes(20, 20);

    let (status, body) = send(app, predict_request(&[file_part("scan.png", &png)])).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["success"], false);
    assert!(scratch_is_empty(dir.path()));
}

#[tokio::test]
async fn oversized_upload_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = Config::new(
        "127.0.0.1:0".to_string(),
        "model.onnx".to_string(),
        dir.path().to_string_lossy().into_owned(),
        Some(1),
        false,
    )
    .unwrap();
    config.server_config.max_upload_size = 1024;
    let app = create_app(AppState::new(
        config,
        ModelHandle::loaded(StubModel::new(vec![0.2, 0.3, 0.5])),
    ));

    let payload = vec![0u8; 4096];
    let body = multipart_body(&[file_part("big.png", &payload)]);

    // 声明了 Content-Length：读取前拒绝
    let declared = Request::post("/predict")
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={}", BOUNDARY),
        )
        .header(header::CONTENT_LENGTH, body.len())
        .body(Body::from(body.clone()))
        .unwrap();
    // 未声明：读取 multipart 时超限
    let undeclared = Request::post("/predict")
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={}", BOUNDARY),
        )
        .body(Body::from(body))
        .unwrap();

    for request in [declared, undeclared] {
        let (status, body) = send(app.clone(), request).await;
        assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
        assert_eq!(body["error"], "File too large: max allowed 1024 bytes");
        assert!(body.get("success").is_none());
        assert!(scratch_is_empty(dir.path()));
    }
}

#[tokio::test]
async fn health_is_unaffected_by_failed_predictions() {
    let dir = tempfile::tempdir().unwrap();
    let model = ModelHandle::loaded(StubModel::new(vec![0.2, 0.3, 0.5]));

    let _ = send(
        app(dir.path(), model.clone(), InferenceMode::Single),
        predict_request(&[file_part("scan.png", b"garbage")]),
    )
    .await;

    let (status, body) = send(
        app(dir.path(), model, InferenceMode::Single),
        Request::get("/").body(Body::empty()).unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["model_loaded"], true);
}

#[tokio::test]
async fn info_describes_service() {
    let dir = tempfile::tempdir().unwrap();
    let app = app(
        dir.path(),
        ModelHandle::loaded(StubModel::new(vec![0.2, 0.3, 0.5])),
        InferenceMode::Tta,
    );

    let (status, body) = send(app, Request::get("/api/info").body(Body::empty()).unwrap()).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["model"]["loaded"], true);
    assert_eq!(body["model"]["name"], "stub");
    assert_eq!(body["inference"]["mode"], "tta");
    assert_eq!(body["inference"]["input_size"], 224);
    assert_eq!(
        body["inference"]["class_names"],
        serde_json::json!(["benign", "malignant", "normal"])
    );
}
