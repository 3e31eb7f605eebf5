use anyhow::Result;
use image::GrayImage;
use std::path::PathBuf;
use std::sync::Arc;

/// Debug configuration for pipeline execution
#[derive(Clone, Debug)]
pub struct DebugConfig {
    /// Root directory for debug outputs
    pub output_dir: PathBuf,
}

/// Context available to all pipeline steps
#[derive(Clone, Debug, Default)]
pub struct PipelineContext {
    /// Name of the image being processed, used to group debug outputs
    pub image_name: String,
    pub debug: Option<DebugConfig>,
}

impl PipelineContext {
    pub fn for_image(&self, image_name: impl Into<String>) -> Self {
        Self {
            image_name: image_name.into(),
            debug: self.debug.clone(),
        }
    }
}

/// Trait that all image stages must implement
pub trait PipelineStep: Send + Sync {
    /// Transform one single-channel image into another of the same size
    fn process(&self, image: GrayImage, context: &PipelineContext) -> Result<GrayImage>;

    /// Human-readable name for this step (used in log output and debug paths)
    fn name(&self) -> &str;
}

/// Composable pipeline of image stages
#[derive(Clone)]
pub struct Pipeline {
    steps: Vec<Arc<dyn PipelineStep>>,
    context: PipelineContext,
}

impl Pipeline {
    /// Create a new empty pipeline
    pub fn new() -> Self {
        Self {
            steps: Vec::new(),
            context: PipelineContext::default(),
        }
    }

    /// Enable debug mode with output directory
    /// The directory must be empty or non-existent
    pub fn with_debug(mut self, output_dir: PathBuf) -> Result<Self> {
        if output_dir.exists() {
            let entries = std::fs::read_dir(&output_dir)?;
            if entries.count() > 0 {
                return Err(anyhow::anyhow!(
                    "Debug directory is not empty: {}",
                    output_dir.display()
                ));
            }
        } else {
            std::fs::create_dir_all(&output_dir)?;
        }

        self.context.debug = Some(DebugConfig { output_dir });

        Ok(self)
    }

    /// Add a processing step to the pipeline
    pub fn add_step(mut self, step: Arc<dyn PipelineStep>) -> Self {
        self.steps.push(step);
        self
    }

    pub fn step_names(&self) -> Vec<&str> {
        self.steps.iter().map(|s| s.name()).collect()
    }

    /// Run every step in order on one image
    pub fn run(&self, image_name: &str, input: GrayImage) -> Result<GrayImage> {
        let context = self.context.for_image(image_name);
        save_debug_image(&context, 0, "input", &input)?;

        let mut image = input;
        for (step_idx, step) in self.steps.iter().enumerate() {
            log::debug!("{}: running step {}", image_name, step.name());
            image = step.process(image, &context)?;
            save_debug_image(&context, step_idx + 1, step.name(), &image)?;
        }

        Ok(image)
    }
}

impl Default for Pipeline {
    fn default() -> Self {
        Self::new()
    }
}

/// Save a step's output as `<debug>/<image>/NN_step_name.png`
fn save_debug_image(context: &PipelineContext, index: usize, step_name: &str, image: &GrayImage) -> Result<()> {
    let Some(debug_config) = &context.debug else {
        return Ok(());
    };

    let image_dir = debug_config.output_dir.join(&context.image_name);
    std::fs::create_dir_all(&image_dir)?;

    let filename = format!("{:02}_{}.png", index, step_name.to_lowercase().replace(' ', "_"));
    let output_path = image_dir.join(&filename);
    image
        .save(&output_path)
        .map_err(|e| anyhow::anyhow!("Failed to save debug image: {}", e))?;

    log::debug!("Debug: saved {}/{}", context.image_name, filename);
    Ok(())
}
