pub mod batch;
pub mod convert;
pub mod detection;
pub mod error;
pub mod export;
pub mod models;
pub mod padding;
pub mod pipeline;
pub mod tiling;

pub use models::{Annotation, BoundingBox, Detection, ImageSummary, ObjectRecord, ObjectType, Region};
pub use detection::{DetectionParams, DetectionPipeline, ImageDetections};
pub use error::{Error, Result};
pub use export::{OutputLayout, ResultAccumulator};
pub use pipeline::{Pipeline, PipelineContext, PipelineStep, DebugConfig};
