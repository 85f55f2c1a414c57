pub mod loader;
pub mod preprocessing;
pub mod transforms;

pub use loader::ImageLoader;
pub use preprocessing::ImagePreprocessor;
pub use transforms::{Augmentation, ImageTransforms};
