pub mod aggregator;
pub mod pipeline;
pub mod types;

pub use aggregator::{ProbabilityStats, TtaAggregator};
pub use pipeline::PredictionPipeline;
pub use types::{ClassPercentages, PredictionResult};
