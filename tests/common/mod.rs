mod fixtures;
pub use fixtures::*;

// Re-export commonly used types from starstreak for tests
pub use starstreak::{
    Annotation, DetectionParams, DetectionPipeline, ImageDetections, ImageSummary, ObjectRecord,
    ObjectType, OutputLayout, ResultAccumulator,
};
