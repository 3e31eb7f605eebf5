use image::{GrayImage, Luma};
use imageproc::region_labelling::{connected_components, Connectivity};
use crate::models::Region;

/// Find 8-connected foreground regions in a binary mask.
///
/// Regions come back in raster order of their first pixel (top row first,
/// left to right within a row) and are relabelled 1..=n in that order, so
/// the ordering never depends on how the labeller numbers its components.
pub fn label_regions(mask: &GrayImage) -> Vec<Region> {
    if mask.width() == 0 || mask.height() == 0 {
        return Vec::new();
    }
    let labeled = connected_components(mask, Connectivity::Eight, Luma([0u8]));

    // Indexed by the labeller's id; filled in raster order
    let mut by_label: Vec<Option<Region>> = Vec::new();
    let mut discovery: Vec<u32> = Vec::new();

    for (x, y, label) in labeled.enumerate_pixels() {
        let label_val = label[0] as usize;
        if label_val == 0 {
            continue;
        }
        if by_label.len() <= label_val {
            by_label.resize_with(label_val + 1, || None);
        }
        if let Some(region) = by_label[label_val].as_mut() {
            region.add_pixel(y, x);
        } else {
            by_label[label_val] = Some(Region::new(label_val as u32, y, x));
            discovery.push(label_val as u32);
        }
    }

    discovery
        .into_iter()
        .enumerate()
        .filter_map(|(idx, label)| {
            by_label[label as usize].take().map(|mut region| {
                region.label = idx as u32 + 1;
                region
            })
        })
        .collect()
}

/// Cut a region's bounding box out of the mask
pub fn crop_region(mask: &GrayImage, region: &Region) -> GrayImage {
    let bbox = region.bbox;
    image::imageops::crop_imm(mask, bbox.min_col, bbox.min_row, bbox.width(), bbox.height()).to_image()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fill(mask: &mut GrayImage, row: u32, col: u32, h: u32, w: u32) {
        for y in row..row + h {
            for x in col..col + w {
                mask.put_pixel(x, y, Luma([255]));
            }
        }
    }

    #[test]
    fn test_regions_follow_raster_order() {
        let mut mask = GrayImage::new(40, 40);
        fill(&mut mask, 20, 2, 3, 3); // lower-left
        fill(&mut mask, 2, 30, 3, 3); // upper-right
        fill(&mut mask, 2, 10, 3, 3); // upper-middle

        let regions = label_regions(&mask);
        assert_eq!(regions.len(), 3);
        let firsts: Vec<_> = regions.iter().map(|r| (r.bbox.min_row, r.bbox.min_col)).collect();
        assert_eq!(firsts, vec![(2, 10), (2, 30), (20, 2)]);
        assert_eq!(regions.iter().map(|r| r.label).collect::<Vec<_>>(), vec![1, 2, 3]);
    }

    #[test]
    fn test_diagonal_pixels_are_connected() {
        let mut mask = GrayImage::new(10, 10);
        for i in 0..5 {
            mask.put_pixel(i, i, Luma([255]));
        }
        let regions = label_regions(&mask);
        assert_eq!(regions.len(), 1);
        assert_eq!(regions[0].area, 5);
    }

    #[test]
    fn test_empty_mask_has_no_regions() {
        assert!(label_regions(&GrayImage::new(16, 16)).is_empty());
        assert!(label_regions(&GrayImage::new(0, 0)).is_empty());
    }

    #[test]
    fn test_crop_matches_bbox() {
        let mut mask = GrayImage::new(32, 32);
        fill(&mut mask, 4, 6, 5, 9);
        let regions = label_regions(&mask);
        let crop = crop_region(&mask, &regions[0]);
        assert_eq!(crop.dimensions(), (9, 5));
        assert!(crop.pixels().all(|p| p[0] == 255));
    }
}
