use anyhow::{Context, Result};
use busi_serve::{
    config::{InferenceMode, PixelRange, ScoreNormalization},
    web::serve,
    Config,
};
use clap::Parser;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "busi-serve")]
#[command(about = "Breast ultrasound image classification service")]
struct Args {
    /// Server bind address
    #[arg(long, default_value = "0.0.0.0:5000")]
    bind: String,

    /// Path to the ONNX model file
    #[arg(long, env = "MODEL_PATH", default_value = "best_wehshi_model.onnx")]
    model_path: String,

    /// Scratch directory for uploaded files
    #[arg(long, default_value = "uploads")]
    upload_dir: String,

    /// Number of worker threads
    #[arg(long)]
    workers: Option<usize>,

    /// Log level
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Enable development mode
    #[arg(long)]
    dev: bool,

    /// Average predictions over eight flipped/rotated copies of the image
    #[arg(long)]
    tta: bool,

    /// Pixel scaling applied before inference
    #[arg(long, value_enum, default_value_t = PixelRange::Unit)]
    pixel_range: PixelRange,

    /// Normalization applied to model outputs
    #[arg(long, value_enum, default_value_t = ScoreNormalization::Softmax)]
    score_normalization: ScoreNormalization,

    /// Feed the model NCHW tensors instead of NHWC
    #[arg(long)]
    channels_first: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();

    // 初始化日志系统
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level)),
        )
        .with_target(false)
        .init();

    tracing::info!("Starting breast ultrasound classification service...");
    tracing::info!("Bind address: {}", args.bind);
    tracing::info!("Model path: {}", args.model_path);

    let mut config = Config::new(
        args.bind,
        args.model_path,
        args.upload_dir,
        args.workers,
        args.dev,
    )?;
    config.inference.mode = if args.tta {
        InferenceMode::Tta
    } else {
        InferenceMode::Single
    };
    config.inference.pixel_range = args.pixel_range;
    config.inference.normalization = args.score_normalization;
    config.inference.channels_first = args.channels_first;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(config.workers)
        .enable_all()
        .build()
        .context("Failed to build tokio runtime")?;

    runtime.block_on(serve(config))?;

    Ok(())
}
