use crate::image::preprocessing::ImagePreprocessor;
use image::imageops::{self, FilterType};
use image::{DynamicImage, RgbImage};

/// TTA 基准图的缩放滤波器（双三次）
pub const TTA_BASE_FILTER: FilterType = FilterType::CatmullRom;

/// 测试时增强使用的几何变换，顺序固定
///
/// 旋转角度按逆时针计。90°/270° 旋转会扩展画布后重新缩放到输入尺寸；
/// 180° 旋转保持原画布，基准图是正方形所以尺寸不变。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Augmentation {
    Identity,
    FlipHorizontal,
    FlipVertical,
    Rotate90,
    Rotate180,
    Rotate270,
    FlipHorizontalRotate90,
    FlipVerticalRotate90,
}

impl Augmentation {
    pub const ALL: [Augmentation; 8] = [
        Augmentation::Identity,
        Augmentation::FlipHorizontal,
        Augmentation::FlipVertical,
        Augmentation::Rotate90,
        Augmentation::Rotate180,
        Augmentation::Rotate270,
        Augmentation::FlipHorizontalRotate90,
        Augmentation::FlipVerticalRotate90,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Augmentation::Identity => "identity",
            Augmentation::FlipHorizontal => "flip_horizontal",
            Augmentation::FlipVertical => "flip_vertical",
            Augmentation::Rotate90 => "rotate_90",
            Augmentation::Rotate180 => "rotate_180",
            Augmentation::Rotate270 => "rotate_270",
            Augmentation::FlipHorizontalRotate90 => "flip_horizontal_rotate_90",
            Augmentation::FlipVerticalRotate90 => "flip_vertical_rotate_90",
        }
    }

    pub fn apply(self, image: &RgbImage, size: u32) -> RgbImage {
        match self {
            Augmentation::Identity => image.clone(),
            Augmentation::FlipHorizontal => imageops::flip_horizontal(image),
            Augmentation::FlipVertical => imageops::flip_vertical(image),
            Augmentation::Rotate90 => ImageTransforms::rotate_ccw_90(image, size),
            Augmentation::Rotate180 => imageops::rotate180(image),
            Augmentation::Rotate270 => ImageTransforms::rotate_ccw_270(image, size),
            Augmentation::FlipHorizontalRotate90 => {
                ImageTransforms::rotate_ccw_90(&imageops::flip_horizontal(image), size)
            }
            Augmentation::FlipVerticalRotate90 => {
                ImageTransforms::rotate_ccw_90(&imageops::flip_vertical(image), size)
            }
        }
    }
}

/// 图像变换工具集
pub struct ImageTransforms;

impl ImageTransforms {
    /// TTA 基准图：强制RGB并缩放到 size×size
    pub fn base_image(image: &DynamicImage, size: u32) -> RgbImage {
        ImagePreprocessor::resize(&image.to_rgb8(), size, TTA_BASE_FILTER)
    }

    /// 生成全部增强版本，对同一输入结果确定
    pub fn augmentations(base: &RgbImage, size: u32) -> Vec<(Augmentation, RgbImage)> {
        Augmentation::ALL
            .iter()
            .map(|&aug| (aug, aug.apply(base, size)))
            .collect()
    }

    /// 逆时针旋转90°（扩展画布）后缩放回 size×size
    fn rotate_ccw_90(image: &RgbImage, size: u32) -> RgbImage {
        ImagePreprocessor::resize(&imageops::rotate270(image), size, TTA_BASE_FILTER)
    }

    /// 逆时针旋转270°（扩展画布）后缩放回 size×size
    fn rotate_ccw_270(image: &RgbImage, size: u32) -> RgbImage {
        ImagePreprocessor::resize(&imageops::rotate90(image), size, TTA_BASE_FILTER)
    }
}
