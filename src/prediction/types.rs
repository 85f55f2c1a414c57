use crate::config::InferenceMode;
use serde::Serialize;
use std::collections::BTreeMap;

/// 类别名 → 百分比
pub type ClassPercentages = BTreeMap<String, f32>;

/// 一次预测的结果，不持久化
#[derive(Debug, Clone, Serialize)]
pub struct PredictionResult {
    /// 预测类别
    pub label: String,
    /// 最大概率 × 100
    pub confidence: f32,
    /// 每个类别的百分比
    pub probabilities: ClassPercentages,
    /// TTA 下各类别的标准差 × 100
    ///
    /// 取自模型原始输出（归一化之前），启用 softmax 时与 `probabilities`
    /// 不在同一尺度上，只用于比较各类别的相对波动。
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uncertainty: Option<ClassPercentages>,
    pub mode: InferenceMode,
    /// 前向推理次数
    pub forward_passes: usize,
    /// 处理耗时（秒）
    pub processing_time: f32,
}

impl PredictionResult {
    pub fn message(&self) -> String {
        let mut message = format!(
            "Image classified as {} with {:.2}% confidence",
            self.label, self.confidence
        );
        if self.mode == InferenceMode::Tta {
            message.push_str(" (TTA enhanced)");
        }
        message
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(mode: InferenceMode) -> PredictionResult {
        PredictionResult {
            label: "benign".to_string(),
            confidence: 87.654,
            probabilities: BTreeMap::new(),
            uncertainty: None,
            mode,
            forward_passes: 1,
            processing_time: 0.01,
        }
    }

    #[test]
    fn message_formats_confidence_with_two_decimals() {
        assert_eq!(
            result(InferenceMode::Single).message(),
            "Image classified as benign with 87.65% confidence"
        );
    }

    #[test]
    fn tta_message_is_marked() {
        assert!(result(InferenceMode::Tta).message().ends_with("(TTA enhanced)"));
    }
}
