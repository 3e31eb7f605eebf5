use image::{DynamicImage, ImageBuffer, Luma};
use std::path::{Path, PathBuf};

pub type Frame16 = ImageBuffer<Luma<u16>, Vec<u16>>;

/// Full-scale 16-bit value used for synthetic objects
pub const BRIGHT: u16 = u16::MAX;

/// Creates a black 16-bit frame with solid rectangles given as (row, col, height, width).
pub fn synthetic_frame(width: u32, height: u32, blocks: &[(u32, u32, u32, u32)]) -> Frame16 {
    let mut frame = Frame16::new(width, height);
    for &(row, col, h, w) in blocks {
        for y in row..row + h {
            for x in col..col + w {
                frame.put_pixel(x, y, Luma([BRIGHT]));
            }
        }
    }
    frame
}

pub fn as_dynamic(frame: Frame16) -> DynamicImage {
    DynamicImage::ImageLuma16(frame)
}

/// Saves a frame into `dir` and returns its path.
pub fn write_frame(dir: &Path, name: &str, frame: &Frame16) -> PathBuf {
    let path = dir.join(name);
    frame.save(&path).expect("Failed to save test frame");
    path
}

/// Writes bytes that carry an image extension but are not an image.
pub fn write_corrupt(dir: &Path, name: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, b"\x00\x01 this is not image data").expect("Failed to write corrupt file");
    path
}

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}
