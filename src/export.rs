//! Writing detection results: per-object crops and the two summary tables.

use std::path::{Path, PathBuf};
use serde::Serialize;
use crate::detection::{regions, ImageDetections};
use crate::error::{Error, Result};
use crate::models::{Annotation, ImageSummary, ObjectRecord, ObjectType};

/// Where a run puts its artifacts
#[derive(Debug, Clone)]
pub struct OutputLayout {
    pub stars_dir: PathBuf,
    pub streaks_dir: PathBuf,
    pub objects_csv: PathBuf,
    pub stats_csv: PathBuf,
    /// Optional bounding-box table for the tiler
    pub annotations_csv: Option<PathBuf>,
    /// Crop image extension, which also picks the encoder
    pub extension: String,
}

impl OutputLayout {
    /// Standard layout under `root`
    pub fn under(root: &Path) -> Self {
        Self {
            stars_dir: root.join("stars-images"),
            streaks_dir: root.join("streaks-images"),
            objects_csv: root.join("eccentricity_data.csv"),
            stats_csv: root.join("image_stats.csv"),
            annotations_csv: None,
            extension: "png".to_string(),
        }
    }

    pub fn with_annotations(mut self, path: PathBuf) -> Self {
        self.annotations_csv = Some(path);
        self
    }

    pub fn with_extension(mut self, extension: impl Into<String>) -> Self {
        self.extension = extension.into();
        self
    }

    pub fn dir_for(&self, object_type: ObjectType) -> &Path {
        match object_type {
            ObjectType::Star => &self.stars_dir,
            ObjectType::Streak => &self.streaks_dir,
        }
    }

    /// Create every output directory. Failure here is fatal for a run.
    pub fn prepare(&self) -> Result<()> {
        let mut dirs = vec![self.stars_dir.as_path(), self.streaks_dir.as_path()];
        for table in [Some(&self.objects_csv), Some(&self.stats_csv), self.annotations_csv.as_ref()]
            .into_iter()
            .flatten()
        {
            if let Some(parent) = table.parent() {
                dirs.push(parent);
            }
        }
        for dir in dirs {
            if dir.as_os_str().is_empty() {
                continue;
            }
            std::fs::create_dir_all(dir).map_err(|e| Error::write(dir, e))?;
        }
        Ok(())
    }
}

/// Save the mask crop of every detection into its class directory.
///
/// Returns the paths written, in detection order. A crop whose name is
/// already taken in this run overwrites the earlier file.
pub fn write_crops(result: &ImageDetections, layout: &OutputLayout) -> Result<Vec<PathBuf>> {
    let mut written = Vec::with_capacity(result.detections.len());
    for detection in &result.detections {
        let name = result.crop_name(detection, &layout.extension);
        let path = layout.dir_for(detection.object_type).join(&name);
        let crop = regions::crop_region(&result.mask, &detection.region);
        crop.save(&path).map_err(|e| Error::write(&path, e))?;
        written.push(path);
    }
    Ok(written)
}

/// Collects the output tables of a run.
///
/// Each image contributes its records and exactly one summary. Workers may
/// fill their own accumulators and `merge` them afterwards.
#[derive(Debug, Clone, Default)]
pub struct ResultAccumulator {
    pub records: Vec<ObjectRecord>,
    pub summaries: Vec<ImageSummary>,
    pub annotations: Vec<Annotation>,
}

impl ResultAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add one image's results
    pub fn push(&mut self, result: &ImageDetections, extension: &str) {
        for detection in &result.detections {
            let name = result.crop_name(detection, extension);
            self.annotations.push(Annotation::from_detection(&result.image_name, &name, detection));
        }
        self.records.extend(result.records(extension));
        self.summaries.push(result.summary());
    }

    /// Append another accumulator's rows after this one's
    pub fn merge(&mut self, other: ResultAccumulator) {
        self.records.extend(other.records);
        self.summaries.extend(other.summaries);
        self.annotations.extend(other.annotations);
    }

    pub fn image_count(&self) -> usize {
        self.summaries.len()
    }

    pub fn total(&self, object_type: ObjectType) -> usize {
        self.summaries
            .iter()
            .map(|s| match object_type {
                ObjectType::Star => s.no_of_stars,
                ObjectType::Streak => s.no_of_streaks,
            })
            .sum()
    }

    /// Write the tables described by `layout`
    pub fn finalize(&self, layout: &OutputLayout) -> Result<()> {
        write_table(&layout.objects_csv, &self.records)?;
        write_table(&layout.stats_csv, &self.summaries)?;
        if let Some(path) = &layout.annotations_csv {
            write_table(path, &self.annotations)?;
        }
        log::info!(
            "Wrote {} object rows and {} image rows",
            self.records.len(),
            self.summaries.len()
        );
        Ok(())
    }
}

/// A row type with a fixed column header
pub trait TableRow: Serialize {
    const HEADER: &'static [&'static str];
}

impl TableRow for ObjectRecord {
    const HEADER: &'static [&'static str] = &["image", "object_type", "object_name", "eccentricity"];
}

impl TableRow for ImageSummary {
    const HEADER: &'static [&'static str] = &["image_name", "no_of_stars", "no_of_streaks"];
}

impl TableRow for Annotation {
    const HEADER: &'static [&'static str] = &[
        "image", "object_type", "object_name", "bbox_x", "bbox_y",
        "bbox_width", "bbox_height", "centroid_x", "centroid_y",
    ];
}

/// Write rows with a header line, even when there are no rows
pub fn write_table<T: TableRow>(path: &Path, rows: &[T]) -> Result<()> {
    let mut wtr = csv::Writer::from_path(path).map_err(|e| Error::write(path, e))?;
    if rows.is_empty() {
        wtr.write_record(T::HEADER)?;
    }
    for row in rows {
        wtr.serialize(row)?;
    }
    wtr.flush().map_err(|e| Error::write(path, e))?;
    Ok(())
}

/// Read a table written by `write_table`
pub fn read_table<T: serde::de::DeserializeOwned>(path: &Path) -> Result<Vec<T>> {
    let mut rdr = csv::Reader::from_path(path)?;
    let rows = rdr.deserialize().collect::<std::result::Result<Vec<T>, _>>()?;
    Ok(rows)
}
