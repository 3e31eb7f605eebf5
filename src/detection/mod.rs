pub mod preprocessing;
pub mod regions;
pub mod filters;
pub mod steps;

use std::sync::Arc;
use image::{DynamicImage, GrayImage};
use crate::models::{Detection, ImageSummary, ObjectRecord, ObjectType};
use crate::pipeline::Pipeline;
use steps::{BlurStep, ClaheStep, ThresholdStep};

/// Tunable parameters of the detection pipeline.
///
/// The defaults are the values the dataset was built with; the eccentricity
/// cut-off in particular is a chosen design parameter, not a physical
/// constant.
#[derive(Debug, Clone)]
pub struct DetectionParams {
    /// Regions with fewer pixels are treated as noise
    pub min_area: u32,
    /// Regions at or above this eccentricity are streaks
    pub eccentricity_threshold: f64,
    /// Centroids closer than this to an accepted region are duplicates
    pub min_centroid_distance: f64,
    /// Post-equalisation intensity at which a pixel is foreground
    pub binary_threshold: u8,
    pub blur_kernel: usize,
    pub clahe_grid: u32,
    pub clahe_clip_limit: f32,
}

impl Default for DetectionParams {
    fn default() -> Self {
        Self {
            min_area: 50,
            eccentricity_threshold: 0.85,
            min_centroid_distance: 10.0,
            binary_threshold: 10,
            blur_kernel: 5,
            clahe_grid: 8,
            clahe_clip_limit: 2.0,
        }
    }
}

/// Everything detected in one image.
///
/// `mask` is kept so crops can be cut from it after classification.
#[derive(Debug, Clone)]
pub struct ImageDetections {
    pub image_name: String,
    pub mask: GrayImage,
    /// Connected components found before filtering
    pub raw_region_count: usize,
    pub detections: Vec<Detection>,
}

impl ImageDetections {
    /// File stem used in crop names
    pub fn image_stem(&self) -> &str {
        std::path::Path::new(&self.image_name)
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or(self.image_name.as_str())
    }

    /// `{type}_{stem}_{row}_{col}.{ext}` for one detection
    pub fn crop_name(&self, detection: &Detection, extension: &str) -> String {
        let (row, col) = detection.pixel_centroid();
        crop_file_name(self.image_stem(), detection.object_type, row, col, extension)
    }

    pub fn count(&self, object_type: ObjectType) -> usize {
        self.detections.iter().filter(|d| d.object_type == object_type).count()
    }

    pub fn summary(&self) -> ImageSummary {
        ImageSummary {
            image_name: self.image_name.clone(),
            no_of_stars: self.count(ObjectType::Star),
            no_of_streaks: self.count(ObjectType::Streak),
        }
    }

    /// One record per detection, in detection order
    pub fn records(&self, extension: &str) -> Vec<ObjectRecord> {
        self.detections
            .iter()
            .map(|d| ObjectRecord {
                image: self.image_name.clone(),
                object_type: d.object_type,
                object_name: self.crop_name(d, extension),
                eccentricity: d.eccentricity,
            })
            .collect()
    }
}

pub fn crop_file_name(stem: &str, object_type: ObjectType, row: u32, col: u32, extension: &str) -> String {
    format!("{}_{}_{}_{}.{}", object_type, stem, row, col, extension)
}

/// Main detection pipeline orchestrator
#[derive(Clone)]
pub struct DetectionPipeline {
    pub params: DetectionParams,
    pipeline: Pipeline,
}

impl DetectionPipeline {
    pub fn new(params: DetectionParams) -> Self {
        let pipeline = build_standard_pipeline(&params);
        Self { params, pipeline }
    }

    /// Enable saving of every intermediate image under `dir`
    pub fn with_debug(mut self, dir: std::path::PathBuf) -> anyhow::Result<Self> {
        self.pipeline = self.pipeline.with_debug(dir)?;
        Ok(self)
    }

    /// Rescale, blur, equalise and threshold a raw image into a binary mask
    pub fn build_mask(&self, image_name: &str, img: &DynamicImage) -> anyhow::Result<GrayImage> {
        let gray = preprocessing::normalize_intensity(img);
        self.pipeline.run(image_name, gray)
    }

    /// Run the full detection pipeline on one raw image
    pub fn process_image(&self, image_name: &str, img: &DynamicImage) -> anyhow::Result<ImageDetections> {
        let mask = self.build_mask(image_name, img)?;
        Ok(self.detect_in_mask(image_name, mask))
    }

    /// Segment, filter and classify the regions of an existing binary mask
    pub fn detect_in_mask(&self, image_name: &str, mask: GrayImage) -> ImageDetections {
        let regions = regions::label_regions(&mask);
        let raw_region_count = regions.len();

        let sized = filters::filter_by_area(regions, self.params.min_area);
        let sized_count = sized.len();
        let accepted = filters::dedup_by_centroid(sized, self.params.min_centroid_distance);

        log::debug!(
            "{}: {} components, {} after area filter, {} after dedup",
            image_name, raw_region_count, sized_count, accepted.len()
        );

        let detections = accepted
            .into_iter()
            .map(|region| {
                let eccentricity = region.eccentricity();
                let object_type = filters::classify(eccentricity, self.params.eccentricity_threshold);
                log::debug!(
                    "{}: region {} area={} ecc={:.4} -> {}",
                    image_name, region.label, region.area, eccentricity, object_type
                );
                Detection { region, object_type, eccentricity }
            })
            .collect();

        ImageDetections {
            image_name: image_name.to_string(),
            mask,
            raw_region_count,
            detections,
        }
    }
}

impl Default for DetectionPipeline {
    fn default() -> Self {
        Self::new(DetectionParams::default())
    }
}

/// Build the standard blur -> CLAHE -> threshold chain
pub fn build_standard_pipeline(params: &DetectionParams) -> Pipeline {
    Pipeline::new()
        .add_step(Arc::new(BlurStep { kernel_size: params.blur_kernel }))
        .add_step(Arc::new(ClaheStep {
            grid: params.clahe_grid,
            clip_limit: params.clahe_clip_limit,
        }))
        .add_step(Arc::new(ThresholdStep { threshold: params.binary_threshold }))
}
