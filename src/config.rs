use crate::utils::error::ClassifyError;
use crate::Result;
use serde::Serialize;
use std::path::PathBuf;

/// 模型输出的类别，顺序与训练时的标签索引一致
pub const CLASS_NAMES: [&str; 3] = ["benign", "malignant", "normal"];

/// 模型输入边长
pub const INPUT_SIZE: u32 = 224;

#[derive(Debug, Clone)]
pub struct Config {
    /// 服务器绑定地址
    pub bind_addr: String,

    /// ONNX模型文件路径
    pub model_path: PathBuf,

    /// 上传临时目录
    pub upload_dir: PathBuf,

    /// 工作线程数量
    pub workers: usize,

    /// 开发模式
    pub dev_mode: bool,

    /// ONNX Runtime配置
    pub onnx_config: OnnxConfig,

    /// 服务器配置
    pub server_config: ServerConfig,

    /// 推理配置
    pub inference: InferenceOptions,
}

#[derive(Debug, Clone)]
pub struct OnnxConfig {
    /// CPU线程数
    pub intra_threads: usize,

    /// 优化级别
    pub optimization_level: i32,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// 请求超时时间（秒）
    pub request_timeout: u64,

    /// 最大上传大小（字节）
    pub max_upload_size: usize,
}

/// 推理路径：单次前向或测试时增强
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum InferenceMode {
    #[default]
    Single,
    Tta,
}

/// 像素缩放方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum PixelRange {
    /// 除以255，落在 [0, 1]
    #[default]
    Unit,
    /// 保持 [0, 255]
    Raw,
}

impl PixelRange {
    pub fn divisor(self) -> f32 {
        match self {
            PixelRange::Unit => 255.0,
            PixelRange::Raw => 1.0,
        }
    }
}

/// 模型输出的归一化方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ScoreNormalization {
    #[default]
    Softmax,
    Identity,
}

#[derive(Debug, Clone, Serialize)]
pub struct InferenceOptions {
    pub mode: InferenceMode,
    pub pixel_range: PixelRange,
    pub normalization: ScoreNormalization,
    /// NCHW 输入（默认 NHWC，与 Keras 导出一致）
    pub channels_first: bool,
    pub input_size: u32,
    pub class_names: Vec<String>,
}

impl Default for InferenceOptions {
    fn default() -> Self {
        Self {
            mode: InferenceMode::default(),
            pixel_range: PixelRange::default(),
            normalization: ScoreNormalization::default(),
            channels_first: false,
            input_size: INPUT_SIZE,
            class_names: CLASS_NAMES.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl Config {
    pub fn new(
        bind_addr: String,
        model_path: String,
        upload_dir: String,
        workers: Option<usize>,
        dev_mode: bool,
    ) -> Result<Self> {
        let cpu_cores = num_cpus::get();
        let workers = workers.unwrap_or(cpu_cores);

        if workers == 0 {
            return Err(ClassifyError::Config(
                "Worker thread count must be at least 1".to_string(),
            ));
        }

        let onnx_config = OnnxConfig {
            intra_threads: (cpu_cores * 3 / 4).max(1), // 使用75%的CPU核心
            optimization_level: 3,
        };

        let server_config = ServerConfig {
            request_timeout: if dev_mode { 300 } else { 60 },
            max_upload_size: 10 * 1024 * 1024, // 10MB
        };

        Ok(Self {
            bind_addr,
            model_path: PathBuf::from(model_path),
            upload_dir: PathBuf::from(upload_dir),
            workers,
            dev_mode,
            onnx_config,
            server_config,
            inference: InferenceOptions::default(),
        })
    }

    /// 创建上传目录（已存在时不做任何事）
    pub fn ensure_upload_dir(&self) -> Result<()> {
        std::fs::create_dir_all(&self.upload_dir)?;
        Ok(())
    }
}
