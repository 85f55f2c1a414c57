use crate::models::{ImageClassifier, OnnxClassifier};
use crate::utils::error::ClassifyError;
use crate::{Config, Result};
use serde::Serialize;
use std::sync::Arc;

/// 进程内唯一的模型句柄，启动时加载一次，之后只读
///
/// 加载失败不会让进程退出，而是记录为 `Unavailable`，预测请求统一返回 500。
#[derive(Clone)]
pub enum ModelHandle {
    Loaded(Arc<dyn ImageClassifier>),
    Unavailable { reason: String },
}

impl ModelHandle {
    pub fn loaded(classifier: Arc<dyn ImageClassifier>) -> Self {
        ModelHandle::Loaded(classifier)
    }

    pub fn unavailable(reason: impl Into<String>) -> Self {
        ModelHandle::Unavailable {
            reason: reason.into(),
        }
    }

    pub fn is_loaded(&self) -> bool {
        matches!(self, ModelHandle::Loaded(_))
    }

    /// 获取分类器，未加载时返回 `ModelNotLoaded`
    pub fn classifier(&self) -> Result<Arc<dyn ImageClassifier>> {
        match self {
            ModelHandle::Loaded(classifier) => Ok(Arc::clone(classifier)),
            ModelHandle::Unavailable { .. } => Err(ClassifyError::ModelNotLoaded),
        }
    }

    pub fn stats(&self, config: &Config) -> ModelStats {
        let (loaded, name, error) = match self {
            ModelHandle::Loaded(classifier) => (true, Some(classifier.name().to_string()), None),
            ModelHandle::Unavailable { reason } => (false, None, Some(reason.clone())),
        };

        ModelStats {
            loaded,
            name,
            error,
            model_path: config.model_path.display().to_string(),
            intra_threads: config.onnx_config.intra_threads,
            optimization_level: config.onnx_config.optimization_level,
        }
    }
}

impl std::fmt::Debug for ModelHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ModelHandle::Loaded(classifier) => {
                f.debug_tuple("Loaded").field(&classifier.name()).finish()
            }
            ModelHandle::Unavailable { reason } => f
                .debug_struct("Unavailable")
                .field("reason", reason)
                .finish(),
        }
    }
}

pub struct ModelManager;

impl ModelManager {
    /// 加载模型，失败时降级为不可用状态
    pub fn load(config: &Config) -> ModelHandle {
        tracing::info!("Initializing classification model...");

        match OnnxClassifier::new(config) {
            Ok(classifier) => {
                tracing::info!("Model loaded successfully from {}", config.model_path.display());
                ModelHandle::loaded(Arc::new(classifier))
            }
            Err(e) => {
                tracing::error!("Error loading model: {}", e);
                tracing::warn!("Service starting without a model; /predict will return 500");
                ModelHandle::unavailable(e.to_string())
            }
        }
    }
}

/// 模型统计信息
#[derive(Debug, Clone, Serialize)]
pub struct ModelStats {
    pub loaded: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub model_path: String,
    pub intra_threads: usize,
    pub optimization_level: i32,
}
