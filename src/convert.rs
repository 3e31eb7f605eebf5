//! Re-encoding TIFF frames as PNG.

use std::path::{Path, PathBuf};
use image::{DynamicImage, ImageFormat};
use crate::batch::{list_images, load_image};
use crate::error::{Error, Result};

/// Extensions picked up by `convert_directory`
pub const TIFF_EXTENSIONS: &[&str] = &["tif", "tiff"];

#[derive(Debug, Default)]
pub struct ConvertReport {
    pub converted: Vec<PathBuf>,
    pub skipped: Vec<(PathBuf, String)>,
}

pub fn is_tiff(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| TIFF_EXTENSIONS.iter().any(|known| e.eq_ignore_ascii_case(known)))
        .unwrap_or(false)
}

/// PNG has no floating point sample formats; those frames go to 16 bit.
fn png_compatible(img: DynamicImage) -> DynamicImage {
    match img {
        DynamicImage::ImageRgb32F(_) => DynamicImage::ImageRgb16(img.to_rgb16()),
        DynamicImage::ImageRgba32F(_) => DynamicImage::ImageRgba16(img.to_rgba16()),
        other => other,
    }
}

/// Write every `.tif`/`.tiff` file in `input_dir` to `output_dir` as
/// `{stem}.png`, keeping its bit depth. Files that fail to decode are skipped.
pub fn convert_directory(input_dir: &Path, output_dir: &Path) -> Result<ConvertReport> {
    std::fs::create_dir_all(output_dir).map_err(|e| Error::write(output_dir, e))?;

    let mut report = ConvertReport::default();
    for path in list_images(input_dir)?.into_iter().filter(|p| is_tiff(p)) {
        let img = match load_image(&path) {
            Ok(img) => png_compatible(img),
            Err(e) if e.is_recoverable() => {
                log::warn!("Failed to convert {}: {}", path.display(), e);
                report.skipped.push((path, e.to_string()));
                continue;
            }
            Err(e) => return Err(e),
        };

        let Some(stem) = path.file_stem() else {
            continue;
        };
        let out = output_dir.join(format!("{}.png", stem.to_string_lossy()));
        img.save_with_format(&out, ImageFormat::Png)
            .map_err(|e| Error::write(&out, e))?;
        log::info!("Converted: {} -> {}", path.display(), out.display());
        report.converted.push(out);
    }
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageBuffer, Luma};

    #[test]
    fn test_only_tiff_files_are_converted() {
        let dir = tempfile::TempDir::new().unwrap();
        let input = dir.path().join("in");
        std::fs::create_dir_all(&input).unwrap();
        let frame = ImageBuffer::<Luma<u16>, _>::from_pixel(6, 4, Luma([50000u16]));
        frame.save(input.join("a.tif")).unwrap();
        frame.save(input.join("b.TIFF")).unwrap();
        image::GrayImage::new(4, 4).save(input.join("c.png")).unwrap();
        std::fs::write(input.join("d.tiff"), b"truncated").unwrap();

        let output = dir.path().join("out");
        let report = convert_directory(&input, &output).unwrap();

        assert_eq!(report.converted.len(), 2);
        assert_eq!(report.skipped.len(), 1);
        assert!(report.skipped[0].0.ends_with("d.tiff"));
        assert!(!output.join("c.png").exists());

        let DynamicImage::ImageLuma16(png) = image::open(output.join("a.png")).unwrap() else {
            panic!("expected 16-bit grayscale PNG");
        };
        assert_eq!(png.dimensions(), (6, 4));
        assert_eq!(png.get_pixel(5, 3)[0], 50000);
        assert!(output.join("b.png").exists());
    }

    #[test]
    fn test_tiff_extension_check() {
        assert!(is_tiff(Path::new("x.tif")));
        assert!(is_tiff(Path::new("x.TiFf")));
        assert!(!is_tiff(Path::new("x.png")));
        assert!(!is_tiff(Path::new("tiff")));
    }
}
