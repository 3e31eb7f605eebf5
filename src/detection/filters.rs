use crate::models::{ObjectType, Region};

/// Drop regions smaller than `min_area` pixels
pub fn filter_by_area(regions: Vec<Region>, min_area: u32) -> Vec<Region> {
    regions.into_iter().filter(|r| r.area >= min_area).collect()
}

/// Greedy, order-dependent duplicate removal.
///
/// Regions are visited in the order given; a region is kept only if its
/// centroid is at least `min_distance` away from every region kept so far.
/// The first region of a close cluster wins.
pub fn dedup_by_centroid(regions: Vec<Region>, min_distance: f64) -> Vec<Region> {
    let mut accepted: Vec<Region> = Vec::with_capacity(regions.len());
    for region in regions {
        if accepted.iter().any(|kept| kept.centroid_distance(&region) < min_distance) {
            log::debug!("dropping region {} as duplicate", region.label);
            continue;
        }
        accepted.push(region);
    }
    accepted
}

/// Eccentricity below the threshold is a star, anything else a streak
pub fn classify(eccentricity: f64, threshold: f64) -> ObjectType {
    if eccentricity < threshold {
        ObjectType::Star
    } else {
        ObjectType::Streak
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strip(label: u32, row: u32, col: u32, len: u32) -> Region {
        let mut region = Region::new(label, row, col);
        for c in col + 1..col + len {
            region.add_pixel(row, c);
        }
        region
    }

    #[test]
    fn test_area_filter_boundary() {
        let regions = vec![strip(1, 0, 0, 49), strip(2, 5, 0, 50)];
        let kept = filter_by_area(regions, 50);
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].area, 50);
    }

    #[test]
    fn test_classify_boundary() {
        assert_eq!(classify(0.85, 0.85), ObjectType::Streak);
        assert_eq!(classify(0.8499999, 0.85), ObjectType::Star);
        assert_eq!(classify(0.0, 0.85), ObjectType::Star);
        assert_eq!(classify(0.99, 0.85), ObjectType::Streak);
    }

    #[test]
    fn test_dedup_keeps_first_of_close_pair() {
        // Single pixels make centroid placement exact: (7, 7) is 9.90 from the origin
        let first = Region::new(1, 0, 0);
        let near = Region::new(2, 7, 7);
        let kept = dedup_by_centroid(vec![first, near], 10.0);
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].label, 1);
    }

    #[test]
    fn test_dedup_distance_boundary() {
        let a = Region::new(1, 0, 0);
        let close = Region::new(2, 7, 7);
        let far = Region::new(3, 1, 10);
        assert!(a.centroid_distance(&close) < 10.0);
        assert!(a.centroid_distance(&far) > 10.0);

        assert_eq!(dedup_by_centroid(vec![a.clone(), close], 10.0).len(), 1);
        assert_eq!(dedup_by_centroid(vec![a, far], 10.0).len(), 2);
    }

    #[test]
    fn test_dedup_compares_against_accepted_only() {
        // b is close to a (dropped), c is close to b but far from a (kept)
        let a = Region::new(1, 0, 0);
        let b = Region::new(2, 0, 8);
        let c = Region::new(3, 0, 16);
        let kept = dedup_by_centroid(vec![a, b, c], 10.0);
        let labels: Vec<_> = kept.iter().map(|r| r.label).collect();
        assert_eq!(labels, vec![1, 3]);
    }

    #[test]
    fn test_exactly_min_distance_is_kept() {
        let a = Region::new(1, 0, 0);
        let b = Region::new(2, 0, 10);
        assert_eq!(dedup_by_centroid(vec![a, b], 10.0).len(), 2);
    }
}
