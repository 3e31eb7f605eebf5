use serde::{Deserialize, Serialize};
use std::fmt;

/// Half-open pixel rectangle: rows `min_row..max_row`, cols `min_col..max_col`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoundingBox {
    pub min_row: u32,
    pub min_col: u32,
    pub max_row: u32,
    pub max_col: u32,
}

impl BoundingBox {
    pub fn width(&self) -> u32 {
        self.max_col - self.min_col
    }

    pub fn height(&self) -> u32 {
        self.max_row - self.min_row
    }
}

/// A connected set of foreground pixels with its raw moment sums.
///
/// Moments are accumulated as plain sums so that centroid and
/// eccentricity are pure functions of the pixel membership.
#[derive(Debug, Clone)]
pub struct Region {
    /// Label assigned by the connected component pass (1-based)
    pub label: u32,
    pub area: u32,
    pub bbox: BoundingBox,
    pub(crate) sum_row: f64,
    pub(crate) sum_col: f64,
    pub(crate) sum_row2: f64,
    pub(crate) sum_col2: f64,
    pub(crate) sum_row_col: f64,
}

impl Region {
    pub fn new(label: u32, row: u32, col: u32) -> Self {
        let mut region = Self {
            label,
            area: 0,
            bbox: BoundingBox {
                min_row: row,
                min_col: col,
                max_row: row + 1,
                max_col: col + 1,
            },
            sum_row: 0.0,
            sum_col: 0.0,
            sum_row2: 0.0,
            sum_col2: 0.0,
            sum_row_col: 0.0,
        };
        region.add_pixel(row, col);
        region
    }

    pub fn add_pixel(&mut self, row: u32, col: u32) {
        let (r, c) = (row as f64, col as f64);
        self.area += 1;
        self.sum_row += r;
        self.sum_col += c;
        self.sum_row2 += r * r;
        self.sum_col2 += c * c;
        self.sum_row_col += r * c;

        self.bbox.min_row = self.bbox.min_row.min(row);
        self.bbox.min_col = self.bbox.min_col.min(col);
        self.bbox.max_row = self.bbox.max_row.max(row + 1);
        self.bbox.max_col = self.bbox.max_col.max(col + 1);
    }

    /// Centroid as (row, col)
    pub fn centroid(&self) -> (f64, f64) {
        let n = self.area as f64;
        (self.sum_row / n, self.sum_col / n)
    }

    /// Eccentricity of the ellipse with the same second central moments.
    ///
    /// 0 for a circle (or a single pixel), approaching 1 for a line.
    pub fn eccentricity(&self) -> f64 {
        let n = self.area as f64;
        let (cr, cc) = self.centroid();
        let mu_rr = (self.sum_row2 / n - cr * cr).max(0.0);
        let mu_cc = (self.sum_col2 / n - cc * cc).max(0.0);
        let mu_rc = self.sum_row_col / n - cr * cc;

        let half_trace = (mu_rr + mu_cc) / 2.0;
        let spread = (((mu_rr - mu_cc) / 2.0).powi(2) + mu_rc * mu_rc).sqrt();
        let major = half_trace + spread;
        let minor = (half_trace - spread).max(0.0);

        if major <= f64::EPSILON {
            return 0.0;
        }
        (1.0 - minor / major).max(0.0).sqrt()
    }

    /// Euclidean distance between two centroids
    pub fn centroid_distance(&self, other: &Region) -> f64 {
        let (r1, c1) = self.centroid();
        let (r2, c2) = other.centroid();
        ((r1 - r2).powi(2) + (c1 - c2).powi(2)).sqrt()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ObjectType {
    Star,
    Streak,
}

impl ObjectType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ObjectType::Star => "star",
            ObjectType::Streak => "streak",
        }
    }
}

impl fmt::Display for ObjectType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A region that survived filtering, with its label
#[derive(Debug, Clone)]
pub struct Detection {
    pub region: Region,
    pub object_type: ObjectType,
    pub eccentricity: f64,
}

impl Detection {
    /// Centroid truncated to whole pixels, as used in crop names
    pub fn pixel_centroid(&self) -> (u32, u32) {
        let (row, col) = self.region.centroid();
        (row as u32, col as u32)
    }
}

/// One row of the per-object table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObjectRecord {
    pub image: String,
    pub object_type: ObjectType,
    pub object_name: String,
    pub eccentricity: f64,
}

/// One row of the per-image table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageSummary {
    pub image_name: String,
    pub no_of_stars: usize,
    pub no_of_streaks: usize,
}

impl ImageSummary {
    pub fn total(&self) -> usize {
        self.no_of_stars + self.no_of_streaks
    }
}

/// Object location in `x`/`y` (column/row) pixel terms, consumed by the tiler
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Annotation {
    pub image: String,
    pub object_type: ObjectType,
    #[serde(default)]
    pub object_name: String,
    pub bbox_x: u32,
    pub bbox_y: u32,
    pub bbox_width: u32,
    pub bbox_height: u32,
    #[serde(default)]
    pub centroid_x: f64,
    #[serde(default)]
    pub centroid_y: f64,
}

impl Annotation {
    pub fn from_detection(image: &str, object_name: &str, detection: &Detection) -> Self {
        let bbox = detection.region.bbox;
        let (bbox_x, bbox_y) = (bbox.min_col, bbox.min_row);
        let (bbox_width, bbox_height) = (bbox.width(), bbox.height());
        Self {
            image: image.to_string(),
            object_type: detection.object_type,
            object_name: object_name.to_string(),
            bbox_x,
            bbox_y,
            bbox_width,
            bbox_height,
            centroid_x: bbox_x as f64 + bbox_width as f64 / 2.0,
            centroid_y: bbox_y as f64 + bbox_height as f64 / 2.0,
        }
    }
}
