use crate::config::InferenceOptions;
use crate::utils::error::ClassifyError;
use crate::Result;
use image::imageops::{self, FilterType};
use image::{DynamicImage, RgbImage};
use ndarray::{Array3, Array4, Axis};

/// 单次推理路径的缩放滤波器（与 Keras `load_img` 默认的最近邻一致）
pub const SINGLE_PASS_FILTER: FilterType = FilterType::Nearest;

pub struct ImagePreprocessor;

impl ImagePreprocessor {
    /// 单次推理预处理：强制RGB → 缩放到输入尺寸 → 像素缩放 → 添加batch维度
    pub fn prepare(image: &DynamicImage, options: &InferenceOptions) -> Result<Array4<f32>> {
        let rgb = image.to_rgb8();
        let resized = Self::resize(&rgb, options.input_size, SINGLE_PASS_FILTER);
        Self::to_tensor(&resized, options)
    }

    /// 缩放到 size×size，不保持宽高比
    pub fn resize(image: &RgbImage, size: u32, filter: FilterType) -> RgbImage {
        if image.dimensions() == (size, size) {
            return image.clone();
        }
        imageops::resize(image, size, size, filter)
    }

    /// RGB图像转换为模型输入张量
    ///
    /// NHWC 时形状为 `(1, H, W, 3)`，NCHW 时为 `(1, 3, H, W)`。
    pub fn to_tensor(image: &RgbImage, options: &InferenceOptions) -> Result<Array4<f32>> {
        let (width, height) = image.dimensions();
        if (width, height) != (options.input_size, options.input_size) {
            return Err(ClassifyError::ImageProcessing(format!(
                "Expected {size}x{size} image, got {width}x{height}",
                size = options.input_size
            )));
        }

        let divisor = options.pixel_range.divisor();
        let data: Vec<f32> = image
            .as_raw()
            .iter()
            .map(|&v| v as f32 / divisor)
            .collect();

        let hwc = Array3::from_shape_vec((height as usize, width as usize, 3), data)
            .map_err(|e| ClassifyError::ImageProcessing(e.to_string()))?;

        let tensor = if options.channels_first {
            hwc.permuted_axes([2, 0, 1]).as_standard_layout().into_owned()
        } else {
            hwc
        };

        Ok(tensor.insert_axis(Axis(0)))
    }
}
