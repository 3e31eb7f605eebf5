//! Normalising crops onto a fixed-size canvas.

use std::path::{Path, PathBuf};
use image::{imageops::FilterType, DynamicImage, ImageBuffer, Pixel};
use crate::batch::{list_images, load_image};
use crate::error::{Error, Result};

/// Scale `img` to fit inside `width x height` keeping its aspect ratio, then
/// centre it on a black canvas of exactly that size.
///
/// Nearest-neighbour sampling keeps binary masks binary.
pub fn pad_to_canvas(img: &DynamicImage, width: u32, height: u32) -> DynamicImage {
    if img.width() == 0 || img.height() == 0 || width == 0 || height == 0 {
        return DynamicImage::new(width, height, img.color());
    }

    let fitted = img.resize(width, height, FilterType::Nearest);
    let x = ((width - fitted.width()) / 2) as i64;
    let y = ((height - fitted.height()) / 2) as i64;
    place_on_canvas(&fitted, width, height, x, y)
}

/// Copy `img` onto a black `width x height` canvas with its top-left corner
/// at (`x`, `y`), keeping the native bit depth of 8- and 16-bit images.
pub(crate) fn place_on_canvas(img: &DynamicImage, width: u32, height: u32, x: i64, y: i64) -> DynamicImage {
    match img {
        DynamicImage::ImageLuma8(buf) => DynamicImage::ImageLuma8(place(buf, width, height, x, y)),
        DynamicImage::ImageLuma16(buf) => DynamicImage::ImageLuma16(place(buf, width, height, x, y)),
        DynamicImage::ImageRgb8(buf) => DynamicImage::ImageRgb8(place(buf, width, height, x, y)),
        DynamicImage::ImageRgb16(buf) => DynamicImage::ImageRgb16(place(buf, width, height, x, y)),
        other => {
            let mut canvas = DynamicImage::new(width, height, other.color());
            image::imageops::replace(&mut canvas, other, x, y);
            canvas
        }
    }
}

fn place<P: Pixel>(
    img: &ImageBuffer<P, Vec<P::Subpixel>>,
    width: u32,
    height: u32,
    x: i64,
    y: i64,
) -> ImageBuffer<P, Vec<P::Subpixel>> {
    let mut canvas = ImageBuffer::new(width, height);
    image::imageops::replace(&mut canvas, img, x, y);
    canvas
}

#[derive(Debug, Default)]
pub struct PadReport {
    pub padded: Vec<PathBuf>,
    pub skipped: Vec<(PathBuf, String)>,
}

/// Pad every image in `input_dir` into `output_dir` under the same name.
///
/// `output_dir` may equal `input_dir`, in which case files are replaced.
pub fn pad_directory(input_dir: &Path, output_dir: &Path, width: u32, height: u32) -> Result<PadReport> {
    std::fs::create_dir_all(output_dir).map_err(|e| Error::write(output_dir, e))?;

    let mut report = PadReport::default();
    for path in list_images(input_dir)? {
        let img = match load_image(&path) {
            Ok(img) => img,
            Err(e) if e.is_recoverable() => {
                log::warn!("Skipping {}: {}", path.display(), e);
                report.skipped.push((path, e.to_string()));
                continue;
            }
            Err(e) => return Err(e),
        };

        let padded = pad_to_canvas(&img, width, height);
        let Some(file_name) = path.file_name() else {
            continue;
        };
        let out = output_dir.join(file_name);
        padded.save(&out).map_err(|e| Error::write(&out, e))?;
        log::debug!("Padded image saved to: {}", out.display());
        report.padded.push(out);
    }

    log::info!("Padded {} images to {}x{}", report.padded.len(), width, height);
    Ok(report)
}
