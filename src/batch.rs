//! Running the detection pipeline over a directory of images.

use std::path::{Path, PathBuf};
use image::{DynamicImage, ImageReader};
use rayon::prelude::*;
use crate::detection::DetectionPipeline;
use crate::error::{Error, Result};
use crate::export::{self, OutputLayout, ResultAccumulator};

/// File extensions picked up from the input directory (case-insensitive)
pub const IMAGE_EXTENSIONS: &[&str] = &["tif", "tiff", "png", "jpg", "jpeg", "bmp"];

#[derive(Debug, Clone)]
pub struct BatchConfig {
    pub input_dir: PathBuf,
    pub layout: OutputLayout,
    /// Worker threads; 1 runs sequentially on the calling thread
    pub jobs: usize,
}

/// Outcome of a batch run
#[derive(Debug, Default)]
pub struct BatchReport {
    pub results: ResultAccumulator,
    /// Files that could not be decoded, with the reason
    pub skipped: Vec<(PathBuf, String)>,
}

impl BatchReport {
    pub fn processed(&self) -> usize {
        self.results.image_count()
    }

    fn absorb(&mut self, outcome: ImageOutcome) {
        match outcome {
            ImageOutcome::Done(acc) => self.results.merge(acc),
            ImageOutcome::Skipped(path, reason) => self.skipped.push((path, reason)),
        }
    }
}

/// Image files in `dir`, sorted by file name
pub fn list_images(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_file() && has_image_extension(&path) {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

pub fn has_image_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| IMAGE_EXTENSIONS.iter().any(|known| e.eq_ignore_ascii_case(known)))
        .unwrap_or(false)
}

/// Decode one image, keeping its native bit depth
pub fn load_image(path: &Path) -> Result<DynamicImage> {
    let unreadable = |source: std::io::Error| Error::Decode {
        path: path.to_path_buf(),
        source: image::ImageError::IoError(source),
    };
    let reader = ImageReader::open(path)
        .map_err(unreadable)?
        .with_guessed_format()
        .map_err(unreadable)?;
    reader.decode().map_err(|source| Error::Decode {
        path: path.to_path_buf(),
        source,
    })
}

enum ImageOutcome {
    Done(ResultAccumulator),
    Skipped(PathBuf, String),
}

fn process_file(
    path: &Path,
    pipeline: &DetectionPipeline,
    layout: &OutputLayout,
) -> anyhow::Result<ImageOutcome> {
    let image_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();

    let img = match load_image(path) {
        Ok(img) => img,
        Err(e) if e.is_recoverable() => {
            log::warn!("Skipping {}: {}", path.display(), e);
            return Ok(ImageOutcome::Skipped(path.to_path_buf(), e.to_string()));
        }
        Err(e) => return Err(e.into()),
    };

    log::info!("Processing: {} ({}x{})", image_name, img.width(), img.height());
    let result = pipeline.process_image(&image_name, &img)?;
    export::write_crops(&result, layout)?;

    let summary = result.summary();
    if summary.total() == 0 {
        log::warn!(
            "{}: no objects left after filtering ({} raw regions)",
            image_name, result.raw_region_count
        );
    } else {
        log::info!(
            "{}: {} stars, {} streaks",
            image_name, summary.no_of_stars, summary.no_of_streaks
        );
    }

    let mut acc = ResultAccumulator::new();
    acc.push(&result, &layout.extension);
    Ok(ImageOutcome::Done(acc))
}

/// Process a list of files and collect their results in input order.
///
/// Undecodable files are skipped; any write failure aborts the run.
pub fn process_files(
    files: &[PathBuf],
    pipeline: &DetectionPipeline,
    layout: &OutputLayout,
    jobs: usize,
) -> anyhow::Result<BatchReport> {
    let (report, failure) = collect_outcomes(files, pipeline, layout, jobs)?;
    match failure {
        Some(e) => Err(e),
        None => Ok(report),
    }
}

/// Gather every completed image, stopping at the first fatal error.
///
/// The report holds the images that finished before the failure (in a
/// parallel run, every image that finished at all), so the caller can
/// still flush their rows.
fn collect_outcomes(
    files: &[PathBuf],
    pipeline: &DetectionPipeline,
    layout: &OutputLayout,
    jobs: usize,
) -> anyhow::Result<(BatchReport, Option<anyhow::Error>)> {
    let mut report = BatchReport::default();

    if jobs <= 1 {
        for path in files {
            match process_file(path, pipeline, layout) {
                Ok(outcome) => report.absorb(outcome),
                Err(e) => return Ok((report, Some(e))),
            }
        }
        return Ok((report, None));
    }

    let pool = rayon::ThreadPoolBuilder::new().num_threads(jobs).build()?;
    let outcomes: Vec<anyhow::Result<ImageOutcome>> = pool.install(|| {
        files
            .par_iter()
            .map(|path| process_file(path, pipeline, layout))
            .collect()
    });

    let mut failure = None;
    for outcome in outcomes {
        match outcome {
            Ok(outcome) => report.absorb(outcome),
            Err(e) => {
                if failure.is_none() {
                    failure = Some(e);
                }
            }
        }
    }
    Ok((report, failure))
}

/// Run a whole directory: prepare outputs, process, write the tables.
///
/// When an image fails to write, the rows of every image completed so far
/// are still written before the error is returned.
pub fn run_batch(config: &BatchConfig, pipeline: &DetectionPipeline) -> anyhow::Result<BatchReport> {
    config.layout.prepare()?;

    let files = list_images(&config.input_dir)?;
    log::info!("Found {} images in {}", files.len(), config.input_dir.display());

    let (report, failure) = collect_outcomes(&files, pipeline, &config.layout, config.jobs)?;
    if let Some(e) = failure {
        log::error!(
            "Aborting after {} image(s); writing their rows before exiting",
            report.processed()
        );
        if let Err(flush_err) = report.results.finalize(&config.layout) {
            log::error!("Could not write partial tables: {}", flush_err);
        }
        return Err(e);
    }
    report.results.finalize(&config.layout)?;

    if !report.skipped.is_empty() {
        log::warn!("{} file(s) could not be decoded", report.skipped.len());
    }
    Ok(report)
}
