use image::{DynamicImage, GrayImage, ImageBuffer, Luma};
use imageproc::filter::separable_filter_equal;

/// Sigma used for a 5-tap Gaussian when none is given: 0.3 * ((5 - 1) / 2 - 1) + 0.8
pub const BLUR_SIGMA_5X5: f32 = 1.1;

const BINS: usize = 256;

/// Bring any decoded image down to 8-bit intensity.
///
/// 16-bit data is mapped linearly from 0..=65535 to 0..=255 with rounding.
/// 8-bit grayscale passes through untouched; colour input is reduced to luma.
pub fn normalize_intensity(img: &DynamicImage) -> GrayImage {
    match img {
        DynamicImage::ImageLuma8(gray) => gray.clone(),
        DynamicImage::ImageLuma16(gray) => rescale_16_to_8(gray),
        DynamicImage::ImageLumaA16(_)
        | DynamicImage::ImageRgb16(_)
        | DynamicImage::ImageRgba16(_)
        | DynamicImage::ImageRgb32F(_)
        | DynamicImage::ImageRgba32F(_) => rescale_16_to_8(&img.to_luma16()),
        _ => img.to_luma8(),
    }
}

fn rescale_16_to_8(img: &ImageBuffer<Luma<u16>, Vec<u16>>) -> GrayImage {
    let scale = 255.0 / 65535.0;
    let (width, height) = img.dimensions();
    GrayImage::from_fn(width, height, |x, y| {
        let value = img.get_pixel(x, y)[0] as f64 * scale;
        Luma([value.round().clamp(0.0, 255.0) as u8])
    })
}

/// Normalised 1-D Gaussian kernel with `size` taps (size must be odd)
pub fn gaussian_kernel(size: usize, sigma: f32) -> Vec<f32> {
    let radius = (size / 2) as i32;
    let denom = 2.0 * sigma * sigma;
    let mut kernel: Vec<f32> = (-radius..=radius)
        .map(|i| (-((i * i) as f32) / denom).exp())
        .collect();
    let sum: f32 = kernel.iter().sum();
    kernel.iter_mut().for_each(|k| *k /= sum);
    kernel
}

/// Blur with a fixed 5x5 Gaussian to stop equalisation from amplifying pixel noise
pub fn apply_blur(img: &GrayImage, kernel_size: usize) -> GrayImage {
    if img.width() == 0 || img.height() == 0 {
        return img.clone();
    }
    let kernel = gaussian_kernel(kernel_size, sigma_for_kernel(kernel_size));
    separable_filter_equal(img, &kernel)
}

/// Sigma derived from an odd kernel size
pub fn sigma_for_kernel(kernel_size: usize) -> f32 {
    0.3 * ((kernel_size as f32 - 1.0) * 0.5 - 1.0) + 0.8
}

/// Contrast limited adaptive histogram equalisation.
///
/// The image is split into `grid x grid` tiles (padded by mirroring when the
/// size does not divide evenly). Each tile's histogram is clipped at
/// `clip_limit * tile_area / 256`, the excess spread back over all bins, and
/// the resulting CDF used as a lookup table. Output pixels blend the four
/// nearest tile tables bilinearly.
pub fn clahe(img: &GrayImage, grid: u32, clip_limit: f32) -> GrayImage {
    let (width, height) = img.dimensions();
    if width == 0 || height == 0 || grid == 0 {
        return img.clone();
    }

    let tiles_x = grid as usize;
    let tiles_y = grid as usize;
    let tile_w = width.div_ceil(grid) as usize;
    let tile_h = height.div_ceil(grid) as usize;
    let tile_area = tile_w * tile_h;

    let clip = if clip_limit > 0.0 {
        ((clip_limit * tile_area as f32 / BINS as f32) as usize).max(1)
    } else {
        usize::MAX
    };
    let lut_scale = 255.0 / tile_area as f32;

    let mut luts = vec![[0u8; BINS]; tiles_x * tiles_y];
    for ty in 0..tiles_y {
        for tx in 0..tiles_x {
            let mut hist = [0usize; BINS];
            for y in ty * tile_h..(ty + 1) * tile_h {
                let sy = reflect_101(y, height as usize);
                for x in tx * tile_w..(tx + 1) * tile_w {
                    let sx = reflect_101(x, width as usize);
                    hist[img.get_pixel(sx as u32, sy as u32)[0] as usize] += 1;
                }
            }

            clip_histogram(&mut hist, clip);

            let lut = &mut luts[ty * tiles_x + tx];
            let mut sum = 0usize;
            for (bin, count) in hist.iter().enumerate() {
                sum += count;
                lut[bin] = (sum as f32 * lut_scale).round().clamp(0.0, 255.0) as u8;
            }
        }
    }

    let inv_tw = 1.0 / tile_w as f32;
    let inv_th = 1.0 / tile_h as f32;

    GrayImage::from_fn(width, height, |x, y| {
        let (tx1, tx2, xa) = neighbour_tiles(x as f32 * inv_tw - 0.5, tiles_x);
        let (ty1, ty2, ya) = neighbour_tiles(y as f32 * inv_th - 0.5, tiles_y);
        let v = img.get_pixel(x, y)[0] as usize;

        let top = luts[ty1 * tiles_x + tx1][v] as f32 * (1.0 - xa) + luts[ty1 * tiles_x + tx2][v] as f32 * xa;
        let bottom = luts[ty2 * tiles_x + tx1][v] as f32 * (1.0 - xa) + luts[ty2 * tiles_x + tx2][v] as f32 * xa;
        let res = top * (1.0 - ya) + bottom * ya;

        Luma([res.round().clamp(0.0, 255.0) as u8])
    })
}

/// Clip bins at `limit` and hand the excess back: an even share to every
/// bin, then single counts spread at a fixed stride.
fn clip_histogram(hist: &mut [usize; BINS], limit: usize) {
    let mut excess = 0usize;
    for count in hist.iter_mut() {
        if *count > limit {
            excess += *count - limit;
            *count = limit;
        }
    }

    let batch = excess / BINS;
    let mut residual = excess - batch * BINS;
    for count in hist.iter_mut() {
        *count += batch;
    }

    if residual > 0 {
        let step = (BINS / residual).max(1);
        let mut bin = 0;
        while bin < BINS && residual > 0 {
            hist[bin] += 1;
            residual -= 1;
            bin += step;
        }
    }
}

/// Lower/upper tile index and blend weight for a fractional tile coordinate
fn neighbour_tiles(pos: f32, tiles: usize) -> (usize, usize, f32) {
    let lower = pos.floor();
    let weight = pos - lower;
    let lower = lower as i64;
    let t1 = lower.max(0) as usize;
    let t2 = ((lower + 1).max(0) as usize).min(tiles - 1);
    (t1.min(tiles - 1), t2, weight)
}

/// Mirror an index past the edge without repeating the border pixel
fn reflect_101(i: usize, len: usize) -> usize {
    if len == 1 {
        return 0;
    }
    let period = 2 * (len - 1);
    let m = i % period;
    if m < len { m } else { period - m }
}

/// Pixels at or above `threshold` become 255, everything else 0
pub fn binarize(img: &GrayImage, threshold: u8) -> GrayImage {
    let (width, height) = img.dimensions();
    GrayImage::from_fn(width, height, |x, y| {
        if img.get_pixel(x, y)[0] >= threshold {
            Luma([255])
        } else {
            Luma([0])
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_normalize_16_bit_full_range() {
        let img = ImageBuffer::<Luma<u16>, _>::from_fn(3, 1, |x, _| Luma([[0u16, 32768, 65535][x as usize]]));
        let out = normalize_intensity(&DynamicImage::ImageLuma16(img));
        assert_eq!(out.get_pixel(0, 0)[0], 0);
        assert_eq!(out.get_pixel(1, 0)[0], 128);
        assert_eq!(out.get_pixel(2, 0)[0], 255);
    }

    #[test]
    fn test_normalize_8_bit_is_identity() {
        let img = GrayImage::from_fn(4, 4, |x, y| Luma([(x * 16 + y) as u8]));
        let out = normalize_intensity(&DynamicImage::ImageLuma8(img.clone()));
        assert_eq!(out, img);
    }

    #[test]
    fn test_gaussian_kernel_is_normalised_and_symmetric() {
        let kernel = gaussian_kernel(5, BLUR_SIGMA_5X5);
        assert_eq!(kernel.len(), 5);
        assert_relative_eq!(kernel.iter().sum::<f32>(), 1.0, epsilon = 1e-6);
        assert_relative_eq!(kernel[0], kernel[4]);
        assert_relative_eq!(kernel[1], kernel[3]);
        assert!(kernel[2] > kernel[1] && kernel[1] > kernel[0]);
        assert_relative_eq!(sigma_for_kernel(5), BLUR_SIGMA_5X5, epsilon = 1e-6);
    }

    #[test]
    fn test_blur_keeps_flat_image_flat() {
        let img = GrayImage::from_pixel(12, 9, Luma([90]));
        let out = apply_blur(&img, 5);
        assert!(out.pixels().all(|p| (p[0] as i32 - 90).abs() <= 1));
    }

    #[test]
    fn test_clahe_keeps_dark_background_below_threshold() {
        let img = GrayImage::new(128, 128);
        let out = clahe(&img, 8, 2.0);
        assert!(out.pixels().all(|p| p[0] < 10));
    }

    #[test]
    fn test_clahe_lifts_faint_signal() {
        let mut img = GrayImage::new(64, 64);
        for x in 10..40 {
            img.put_pixel(x, 20, Luma([6]));
        }
        let out = clahe(&img, 8, 2.0);
        assert!(out.get_pixel(20, 20)[0] >= 10);
        assert!(out.get_pixel(20, 40)[0] < 10);
    }

    #[test]
    fn test_clahe_handles_tiny_images() {
        let img = GrayImage::from_pixel(3, 2, Luma([200]));
        let out = clahe(&img, 8, 2.0);
        assert_eq!(out.dimensions(), (3, 2));
    }

    #[test]
    fn test_clip_histogram_preserves_total() {
        let mut hist = [0usize; BINS];
        hist[0] = 256;
        hist[255] = 40;
        clip_histogram(&mut hist, 2);
        assert_eq!(hist.iter().sum::<usize>(), 296);
        assert!(hist.iter().all(|&c| c <= 4));
    }

    #[test]
    fn test_binarize_is_inclusive() {
        let img = GrayImage::from_fn(3, 1, |x, _| Luma([[9u8, 10, 11][x as usize]]));
        let out = binarize(&img, 10);
        assert_eq!(out.get_pixel(0, 0)[0], 0);
        assert_eq!(out.get_pixel(1, 0)[0], 255);
        assert_eq!(out.get_pixel(2, 0)[0], 255);
    }

    #[test]
    fn test_reflect_101() {
        assert_eq!(reflect_101(5, 5), 3);
        assert_eq!(reflect_101(6, 5), 2);
        assert_eq!(reflect_101(7, 1), 0);
    }
}
