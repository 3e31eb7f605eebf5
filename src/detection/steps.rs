use crate::pipeline::{PipelineContext, PipelineStep};
use crate::detection::preprocessing;
use anyhow::Result;
use image::GrayImage;

/// Apply a fixed-size Gaussian blur
pub struct BlurStep {
    pub kernel_size: usize,
}

impl PipelineStep for BlurStep {
    fn process(&self, image: GrayImage, _context: &PipelineContext) -> Result<GrayImage> {
        if self.kernel_size % 2 == 0 {
            anyhow::bail!("Blur kernel size must be odd, got {}", self.kernel_size);
        }
        Ok(preprocessing::apply_blur(&image, self.kernel_size))
    }

    fn name(&self) -> &str {
        "Gaussian Blur"
    }
}

/// Local contrast enhancement (CLAHE)
pub struct ClaheStep {
    pub grid: u32,
    pub clip_limit: f32,
}

impl PipelineStep for ClaheStep {
    fn process(&self, image: GrayImage, _context: &PipelineContext) -> Result<GrayImage> {
        Ok(preprocessing::clahe(&image, self.grid, self.clip_limit))
    }

    fn name(&self) -> &str {
        "Adaptive Equalization"
    }
}

/// Fixed global threshold producing a 0/255 mask
pub struct ThresholdStep {
    pub threshold: u8,
}

impl PipelineStep for ThresholdStep {
    fn process(&self, image: GrayImage, context: &PipelineContext) -> Result<GrayImage> {
        let mask = preprocessing::binarize(&image, self.threshold);
        let foreground = mask.pixels().filter(|p| p[0] > 0).count();
        log::debug!("{}: {} foreground pixels after threshold {}", context.image_name, foreground, self.threshold);
        Ok(mask)
    }

    fn name(&self) -> &str {
        "Threshold"
    }
}
