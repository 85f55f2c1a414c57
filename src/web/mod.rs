pub mod handlers;
pub mod middleware;

use crate::{
    models::{ModelHandle, ModelManager},
    utils::error::ClassifyError,
    Config, Result,
};
use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tower_http::{cors::CorsLayer, timeout::TimeoutLayer};

/// 处理器共享状态：配置和只读的模型句柄
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub model: ModelHandle,
}

impl AppState {
    pub fn new(config: Config, model: ModelHandle) -> Self {
        Self {
            config: Arc::new(config),
            model,
        }
    }
}

pub async fn serve(config: Config) -> Result<()> {
    config.ensure_upload_dir()?;

    // 模型只在启动时加载一次
    let model = ModelManager::load(&config);

    let addr: SocketAddr = config.bind_addr.parse().map_err(|e| {
        ClassifyError::Config(format!("Invalid bind address {}: {}", config.bind_addr, e))
    })?;

    tracing::info!("Server starting on http://{}", addr);
    tracing::info!("Inference mode: {:?}", config.inference.mode);
    tracing::info!("API endpoints:");
    tracing::info!("  GET  /          - Health check");
    tracing::info!("  POST /predict   - Multipart image upload");
    tracing::info!("  GET  /api/info  - Service information");

    let app = create_app(AppState::new(config, model));

    let listener = TcpListener::bind(&addr).await.map_err(|e| {
        ClassifyError::Internal(format!("Failed to bind to address {}: {}", addr, e))
    })?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| ClassifyError::Internal(format!("Server failed: {}", e)))?;

    tracing::info!("Server stopped");
    Ok(())
}

pub fn create_app(state: AppState) -> Router {
    let server_config = &state.config.server_config;
    let body_limit = server_config.max_upload_size;
    let timeout = Duration::from_secs(server_config.request_timeout);

    Router::new()
        .route("/", get(handlers::health_handler))
        .route("/predict", post(handlers::predict_handler))
        .route("/api/info", get(handlers::info_handler))
        // 超限由 multipart 读取报错，处理器转换为 JSON 413
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TimeoutLayer::new(timeout))
        .layer(axum::middleware::from_fn(middleware::request_logging))
        .layer(CorsLayer::permissive()) // 前端跨域调用
        .with_state(state)
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
