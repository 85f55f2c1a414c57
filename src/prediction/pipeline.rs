use crate::{
    config::{InferenceMode, InferenceOptions},
    image::{Augmentation, ImageLoader, ImagePreprocessor, ImageTransforms},
    models::ImageClassifier,
    prediction::{
        aggregator::{argmax, normalize, ProbabilityStats, TtaAggregator},
        ClassPercentages, PredictionResult,
    },
    utils::error::ClassifyError,
    Result,
};
use image::DynamicImage;
use ndarray::Array4;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

/// 预测流水线：解码 → 预处理/增强 → 推理 → 聚合 → 归一化
pub struct PredictionPipeline {
    classifier: Arc<dyn ImageClassifier>,
    options: InferenceOptions,
}

impl PredictionPipeline {
    pub fn new(classifier: Arc<dyn ImageClassifier>, options: InferenceOptions) -> Self {
        Self {
            classifier,
            options,
        }
    }

    /// 从磁盘上的图像文件预测
    pub fn predict_path(&self, path: &Path) -> Result<PredictionResult> {
        let start_time = Instant::now();
        let image = ImageLoader::from_path(path)?;
        self.run(&image, start_time)
    }

    pub fn predict_image(&self, image: &DynamicImage) -> Result<PredictionResult> {
        self.run(image, Instant::now())
    }

    /// 测试时增强：8个变换各自推理，返回逐元素均值和标准差
    pub fn predict_with_tta(&self, image: &DynamicImage) -> Result<ProbabilityStats> {
        let size = self.options.input_size;
        let base = ImageTransforms::base_image(image, size);

        let mut all_predictions = Vec::with_capacity(Augmentation::ALL.len());
        for (augmentation, variant) in ImageTransforms::augmentations(&base, size) {
            let tensor = ImagePreprocessor::to_tensor(&variant, &self.options)?;
            let scores = self.infer(&tensor)?;
            tracing::debug!("TTA {}: {:?}", augmentation.name(), scores);
            all_predictions.push(scores);
        }

        TtaAggregator::aggregate(&all_predictions)
    }

    fn run(&self, image: &DynamicImage, start_time: Instant) -> Result<PredictionResult> {
        let (raw_scores, spread, forward_passes) = match self.options.mode {
            InferenceMode::Single => {
                let tensor = ImagePreprocessor::prepare(image, &self.options)?;
                (self.infer(&tensor)?, None, 1)
            }
            InferenceMode::Tta => {
                let stats = self.predict_with_tta(image)?;
                // 标准差取自原始输出，不经过归一化
                (stats.mean, Some(stats.std), Augmentation::ALL.len())
            }
        };

        let scores = normalize(&raw_scores, self.options.normalization);
        let best = argmax(&scores)
            .ok_or_else(|| ClassifyError::Inference("Model returned no scores".to_string()))?;

        let label = self.options.class_names[best].clone();
        let confidence = 100.0 * scores[best];

        Ok(PredictionResult {
            label,
            confidence,
            probabilities: self.percentages(&scores),
            uncertainty: spread.map(|std| self.percentages(&std)),
            mode: self.options.mode,
            forward_passes,
            processing_time: start_time.elapsed().as_secs_f32(),
        })
    }

    /// 单次前向，并校验输出长度与类别数一致
    fn infer(&self, tensor: &Array4<f32>) -> Result<Vec<f32>> {
        let scores = self.classifier.predict(tensor)?;
        let expected = self.options.class_names.len();

        if scores.len() != expected {
            return Err(ClassifyError::Inference(format!(
                "Expected {} class scores, got {}",
                expected,
                scores.len()
            )));
        }
        if scores.iter().any(|s| !s.is_finite()) {
            return Err(ClassifyError::Inference(format!(
                "Model returned non-finite scores: {:?}",
                scores
            )));
        }

        Ok(scores)
    }

    fn percentages(&self, values: &[f32]) -> ClassPercentages {
        self.options
            .class_names
            .iter()
            .zip(values)
            .map(|(name, &v)| (name.clone(), v * 100.0))
            .collect()
    }
}
