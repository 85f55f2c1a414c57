pub mod error;
pub mod scratch;

pub use error::ClassifyError;
pub use scratch::ScratchFile;
