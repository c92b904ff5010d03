mod core;
mod stats;
mod worker;

pub use core::CapturePipeline;
pub use stats::PipelineStats;
