//! Slicing full frames into fixed-size tiles and carrying annotations along,
//! plus zero-padded fixed-size patches for model input.

use std::path::{Path, PathBuf};
use image::DynamicImage;
use crate::batch::{list_images, load_image, IMAGE_EXTENSIONS};
use crate::error::{Error, Result};
use crate::export::{read_table, write_table};
use crate::models::Annotation;
use crate::padding::place_on_canvas;

/// Pixel rectangle in `x`/`y` terms, `right`/`bottom` exclusive
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TileRect {
    pub left: u32,
    pub top: u32,
    pub right: u32,
    pub bottom: u32,
}

#[derive(Debug, Clone)]
pub struct Tile {
    pub name: String,
    pub rect: TileRect,
    pub image: DynamicImage,
    pub annotations: Vec<Annotation>,
}

/// Tile grid for an image; tiles on the right and bottom edges are truncated
pub fn tile_grid(width: u32, height: u32, tile_size: u32, stride: u32) -> Vec<TileRect> {
    if tile_size == 0 || stride == 0 {
        return Vec::new();
    }
    let mut rects = Vec::new();
    for top in (0..height).step_by(stride as usize) {
        for left in (0..width).step_by(stride as usize) {
            rects.push(TileRect {
                left,
                top,
                right: (left + tile_size).min(width),
                bottom: (top + tile_size).min(height),
            });
        }
    }
    rects
}

/// Clip an annotation's box to a tile and move it into tile coordinates.
///
/// Returns `None` when the box misses the tile or the clipped box is one
/// pixel or less in either direction.
pub fn reproject_box(annotation: &Annotation, tile: &TileRect, tile_name: &str) -> Option<Annotation> {
    let x1 = annotation.bbox_x;
    let y1 = annotation.bbox_y;
    let x2 = x1 + annotation.bbox_width;
    let y2 = y1 + annotation.bbox_height;

    if x2 <= tile.left || x1 >= tile.right || y2 <= tile.top || y1 >= tile.bottom {
        return None;
    }

    let new_x1 = x1.max(tile.left) - tile.left;
    let new_y1 = y1.max(tile.top) - tile.top;
    let new_x2 = x2.min(tile.right) - tile.left;
    let new_y2 = y2.min(tile.bottom) - tile.top;

    let width = new_x2 - new_x1;
    let height = new_y2 - new_y1;
    if width <= 1 || height <= 1 {
        return None;
    }

    Some(Annotation {
        image: tile_name.to_string(),
        object_type: annotation.object_type,
        object_name: annotation.object_name.clone(),
        bbox_x: new_x1,
        bbox_y: new_y1,
        bbox_width: width,
        bbox_height: height,
        centroid_x: new_x1 as f64 + width as f64 / 2.0,
        centroid_y: new_y1 as f64 + height as f64 / 2.0,
    })
}

/// Cut `img` into tiles named `{stem}_{top}_{left}.{extension}`
pub fn tile_image(
    img: &DynamicImage,
    stem: &str,
    extension: &str,
    annotations: &[Annotation],
    tile_size: u32,
    stride: u32,
) -> Vec<Tile> {
    tile_grid(img.width(), img.height(), tile_size, stride)
        .into_iter()
        .map(|rect| {
            let name = format!("{}_{}_{}.{}", stem, rect.top, rect.left, extension);
            let image = img.crop_imm(rect.left, rect.top, rect.right - rect.left, rect.bottom - rect.top);
            let annotations = annotations
                .iter()
                .filter_map(|a| reproject_box(a, &rect, &name))
                .collect();
            Tile { name, rect, image, annotations }
        })
        .collect()
}

#[derive(Debug, Clone)]
pub struct TileConfig {
    pub input_dir: PathBuf,
    pub annotations_csv: PathBuf,
    pub output_dir: PathBuf,
    pub output_csv: PathBuf,
    pub tile_size: u32,
    pub stride: u32,
    /// Appended to the annotation's image stem when looking up the source file
    pub image_suffix: String,
    pub extension: String,
}

#[derive(Debug, Default)]
pub struct TileReport {
    pub tiles_written: usize,
    pub annotations: Vec<Annotation>,
    pub skipped: Vec<(String, String)>,
}

/// Find the frame an annotation refers to
fn resolve_image(dir: &Path, image_name: &str, suffix: &str) -> Option<PathBuf> {
    let stem = Path::new(image_name).file_stem()?.to_str()?;
    let direct = dir.join(image_name);
    if suffix.is_empty() && direct.is_file() {
        return Some(direct);
    }
    IMAGE_EXTENSIONS
        .iter()
        .map(|ext| dir.join(format!("{}{}.{}", stem, suffix, ext)))
        .find(|p| p.is_file())
}

/// Tile every annotated frame and write the re-projected annotation table
pub fn run_tiling(config: &TileConfig) -> Result<TileReport> {
    if config.tile_size == 0 || config.stride == 0 {
        return Err(Error::InvalidInput("tile size and stride must be positive".to_string()));
    }
    std::fs::create_dir_all(&config.output_dir).map_err(|e| Error::write(&config.output_dir, e))?;

    let source: Vec<Annotation> = read_table(&config.annotations_csv)?;

    // Unique image names in order of first appearance
    let mut image_names: Vec<&str> = Vec::new();
    for a in &source {
        if !image_names.contains(&a.image.as_str()) {
            image_names.push(&a.image);
        }
    }

    let mut report = TileReport::default();
    for image_name in image_names {
        let Some(path) = resolve_image(&config.input_dir, image_name, &config.image_suffix) else {
            log::warn!("No source image found for {}", image_name);
            report.skipped.push((image_name.to_string(), "not found".to_string()));
            continue;
        };
        let img = match load_image(&path) {
            Ok(img) => img,
            Err(e) if e.is_recoverable() => {
                log::warn!("Skipping {}: {}", path.display(), e);
                report.skipped.push((image_name.to_string(), e.to_string()));
                continue;
            }
            Err(e) => return Err(e),
        };

        let records: Vec<Annotation> = source.iter().filter(|a| a.image == image_name).cloned().collect();
        let stem = Path::new(image_name)
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or(image_name);

        let tiles = tile_image(&img, stem, &config.extension, &records, config.tile_size, config.stride);
        log::info!("{}: {} tiles", image_name, tiles.len());
        for tile in tiles {
            let out = config.output_dir.join(&tile.name);
            tile.image.save(&out).map_err(|e| Error::write(&out, e))?;
            report.tiles_written += 1;
            report.annotations.extend(tile.annotations);
        }
    }

    write_table(&config.output_csv, &report.annotations)?;
    log::info!(
        "Wrote {} tiles and {} annotations to {}",
        report.tiles_written,
        report.annotations.len(),
        config.output_csv.display()
    );
    Ok(report)
}

/// Zero-pad `img` on the right and bottom up to the next multiple of
/// `patch_size` in each direction. Bit depth and colour type are kept.
pub fn pad_to_multiple(img: &DynamicImage, patch_size: u32) -> DynamicImage {
    if patch_size == 0 {
        return img.clone();
    }
    let width = img.width().div_ceil(patch_size) * patch_size;
    let height = img.height().div_ceil(patch_size) * patch_size;
    if width == img.width() && height == img.height() {
        return img.clone();
    }
    place_on_canvas(img, width, height, 0, 0)
}

/// Cut `img` into full-size square patches named `patch_{n}.{extension}`.
///
/// The frame is zero-padded first, so every patch is exactly
/// `patch_size` square. Patches are numbered row by row from zero.
pub fn patch_image(img: &DynamicImage, patch_size: u32, extension: &str) -> Vec<Tile> {
    let padded = pad_to_multiple(img, patch_size);
    tile_grid(padded.width(), padded.height(), patch_size, patch_size)
        .into_iter()
        .enumerate()
        .map(|(n, rect)| Tile {
            name: format!("patch_{}.{}", n, extension),
            rect,
            image: padded.crop_imm(rect.left, rect.top, patch_size, patch_size),
            annotations: Vec::new(),
        })
        .collect()
}

#[derive(Debug, Clone)]
pub struct PatchConfig {
    pub input_dir: PathBuf,
    /// Patches of each frame go to `<output_dir>/<stem>/`
    pub output_dir: PathBuf,
    pub patch_size: u32,
    pub extension: String,
}

#[derive(Debug, Default)]
pub struct PatchReport {
    pub patches_written: usize,
    pub images: usize,
    pub skipped: Vec<(PathBuf, String)>,
}

/// Split every image in a directory into zero-padded patches
pub fn run_patching(config: &PatchConfig) -> Result<PatchReport> {
    if config.patch_size == 0 {
        return Err(Error::InvalidInput("patch size must be positive".to_string()));
    }
    std::fs::create_dir_all(&config.output_dir).map_err(|e| Error::write(&config.output_dir, e))?;

    let mut report = PatchReport::default();
    for path in list_images(&config.input_dir)? {
        let img = match load_image(&path) {
            Ok(img) => img,
            Err(e) if e.is_recoverable() => {
                log::warn!("Skipping {}: {}", path.display(), e);
                report.skipped.push((path, e.to_string()));
                continue;
            }
            Err(e) => return Err(e),
        };

        let stem = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let image_dir = config.output_dir.join(&stem);
        std::fs::create_dir_all(&image_dir).map_err(|e| Error::write(&image_dir, e))?;

        let patches = patch_image(&img, config.patch_size, &config.extension);
        for patch in &patches {
            let out = image_dir.join(&patch.name);
            patch.image.save(&out).map_err(|e| Error::write(&out, e))?;
        }
        log::info!("Saved {} patches for {} in {}", patches.len(), stem, image_dir.display());
        report.patches_written += patches.len();
        report.images += 1;
    }
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ObjectType;

    fn annotation(x: u32, y: u32, w: u32, h: u32) -> Annotation {
        Annotation {
            image: "frame.tiff".to_string(),
            object_type: ObjectType::Streak,
            object_name: String::new(),
            bbox_x: x,
            bbox_y: y,
            bbox_width: w,
            bbox_height: h,
            centroid_x: 0.0,
            centroid_y: 0.0,
        }
    }

    const TILE: TileRect = TileRect { left: 128, top: 0, right: 256, bottom: 128 };

    #[test]
    fn test_grid_truncates_edges() {
        let rects = tile_grid(300, 130, 128, 128);
        assert_eq!(rects.len(), 6);
        assert_eq!(rects[2], TileRect { left: 256, top: 0, right: 300, bottom: 128 });
        assert_eq!(rects[5], TileRect { left: 256, top: 128, right: 300, bottom: 130 });
    }

    #[test]
    fn test_box_outside_tile_is_skipped() {
        assert!(reproject_box(&annotation(10, 10, 20, 20), &TILE, "t").is_none());
        // touching the left edge only
        assert!(reproject_box(&annotation(100, 10, 28, 20), &TILE, "t").is_none());
    }

    #[test]
    fn test_box_is_clipped_into_tile_coordinates() {
        let clipped = reproject_box(&annotation(120, 100, 20, 40), &TILE, "t").unwrap();
        assert_eq!((clipped.bbox_x, clipped.bbox_y), (0, 100));
        assert_eq!((clipped.bbox_width, clipped.bbox_height), (12, 28));
        assert_eq!(clipped.image, "t");
        assert_eq!(clipped.object_type, ObjectType::Streak);
    }

    #[test]
    fn test_slivers_are_dropped() {
        // one pixel of overlap horizontally
        assert!(reproject_box(&annotation(127, 10, 2, 20), &TILE, "t").is_none());
        // two pixels survive
        assert!(reproject_box(&annotation(126, 10, 4, 20), &TILE, "t").is_some());
    }

    #[test]
    fn test_tile_image_names_and_sizes() {
        let img = DynamicImage::new_luma8(200, 100);
        let tiles = tile_image(&img, "frame", "tiff", &[annotation(60, 20, 80, 10)], 128, 128);
        assert_eq!(tiles.len(), 2);
        assert_eq!(tiles[0].name, "frame_0_0.tiff");
        assert_eq!(tiles[1].name, "frame_0_128.tiff");
        assert_eq!((tiles[1].image.width(), tiles[1].image.height()), (72, 100));
        assert_eq!(tiles[0].annotations.len(), 1);
        assert_eq!(tiles[1].annotations[0].bbox_width, 12);
    }

    #[test]
    fn test_pad_to_multiple_fills_right_and_bottom() {
        let img = DynamicImage::ImageLuma8(image::GrayImage::from_pixel(70, 64, image::Luma([9])));
        let padded = pad_to_multiple(&img, 64).to_luma8();
        assert_eq!(padded.dimensions(), (128, 64));
        assert_eq!(padded.get_pixel(69, 63)[0], 9);
        assert_eq!(padded.get_pixel(70, 0)[0], 0);
        assert_eq!(padded.get_pixel(127, 63)[0], 0);
    }

    #[test]
    fn test_patches_are_full_size_and_numbered() {
        let raw = image::ImageBuffer::<image::Luma<u16>, _>::from_pixel(100, 50, image::Luma([1234u16]));
        let patches = patch_image(&DynamicImage::ImageLuma16(raw), 32, "tiff");

        // 100x50 pads to 128x64: four columns, two rows
        assert_eq!(patches.len(), 8);
        assert_eq!(patches[0].name, "patch_0.tiff");
        assert_eq!(patches[7].name, "patch_7.tiff");
        assert!(patches.iter().all(|p| (p.image.width(), p.image.height()) == (32, 32)));
        assert_eq!(patches[4].rect, TileRect { left: 0, top: 32, right: 32, bottom: 64 });

        let DynamicImage::ImageLuma16(last) = &patches[7].image else {
            panic!("expected a 16-bit patch");
        };
        // columns 96..100 and rows 32..50 carry data, the rest is padding
        assert_eq!(last.get_pixel(3, 17)[0], 1234);
        assert_eq!(last.get_pixel(4, 17)[0], 0);
        assert_eq!(last.get_pixel(3, 18)[0], 0);
    }

    #[test]
    fn test_run_patching_writes_per_frame_directories() {
        let dir = tempfile::TempDir::new().unwrap();
        let input = dir.path().join("raw");
        std::fs::create_dir_all(&input).unwrap();
        image::GrayImage::new(64, 40).save(input.join("obs1.png")).unwrap();
        image::GrayImage::new(20, 20).save(input.join("obs2.png")).unwrap();
        std::fs::write(input.join("junk.tiff"), b"not an image").unwrap();

        let config = PatchConfig {
            input_dir: input,
            output_dir: dir.path().join("patches"),
            patch_size: 32,
            extension: "png".to_string(),
        };
        let report = run_patching(&config).unwrap();

        assert_eq!(report.images, 2);
        assert_eq!(report.patches_written, 5);
        assert_eq!(report.skipped.len(), 1);
        assert!(config.output_dir.join("obs1/patch_3.png").exists());
        assert!(config.output_dir.join("obs2/patch_0.png").exists());
        let patch = image::open(config.output_dir.join("obs1/patch_3.png")).unwrap();
        assert_eq!((patch.width(), patch.height()), (32, 32));
    }
}
