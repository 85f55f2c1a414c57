pub mod classifier;
pub mod manager;

pub use classifier::{ImageClassifier, OnnxClassifier};
pub use manager::{ModelHandle, ModelManager, ModelStats};
