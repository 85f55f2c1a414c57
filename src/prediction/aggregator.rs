//! TTA 概率聚合与得分归一化

use crate::config::ScoreNormalization;
use crate::utils::error::ClassifyError;
use crate::Result;

/// 多次前向结果的逐元素统计
#[derive(Debug, Clone, PartialEq)]
pub struct ProbabilityStats {
    /// 逐元素算术平均（作为置信度来源）
    pub mean: Vec<f32>,
    /// 逐元素总体标准差（不确定性）
    pub std: Vec<f32>,
}

pub struct TtaAggregator;

impl TtaAggregator {
    /// 计算逐元素均值和总体标准差，不做重新归一化
    pub fn aggregate(predictions: &[Vec<f32>]) -> Result<ProbabilityStats> {
        let first = predictions.first().ok_or_else(|| {
            ClassifyError::Inference("No predictions to aggregate".to_string())
        })?;
        let num_classes = first.len();

        if let Some(bad) = predictions.iter().find(|p| p.len() != num_classes) {
            return Err(ClassifyError::Inference(format!(
                "Inconsistent prediction lengths: {} vs {}",
                num_classes,
                bad.len()
            )));
        }

        let n = predictions.len() as f32;
        let mut mean = vec![0.0f32; num_classes];
        for prediction in predictions {
            for (acc, &p) in mean.iter_mut().zip(prediction) {
                *acc += p;
            }
        }
        mean.iter_mut().for_each(|m| *m /= n);

        let mut std = vec![0.0f32; num_classes];
        for prediction in predictions {
            for ((acc, &p), &m) in std.iter_mut().zip(prediction).zip(&mean) {
                *acc += (p - m).powi(2);
            }
        }
        std.iter_mut().for_each(|s| *s = (*s / n).sqrt());

        Ok(ProbabilityStats { mean, std })
    }
}

/// 数值稳定的 softmax
pub fn softmax(scores: &[f32]) -> Vec<f32> {
    let max = scores.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let exps: Vec<f32> = scores.iter().map(|&s| (s - max).exp()).collect();
    let sum: f32 = exps.iter().sum();
    exps.into_iter().map(|e| e / sum).collect()
}

/// 最大值的下标，并列时取第一个
pub fn argmax(scores: &[f32]) -> Option<usize> {
    let mut best: Option<(usize, f32)> = None;
    for (i, &s) in scores.iter().enumerate() {
        match best {
            Some((_, b)) if s <= b => {}
            _ => best = Some((i, s)),
        }
    }
    best.map(|(i, _)| i)
}

pub fn normalize(scores: &[f32], normalization: ScoreNormalization) -> Vec<f32> {
    match normalization {
        ScoreNormalization::Softmax => softmax(scores),
        ScoreNormalization::Identity => scores.to_vec(),
    }
}
