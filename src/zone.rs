use tracing::debug;

use crate::analysis::RasterImage;
use crate::classifier::classify;
use crate::cone::PixelSet;
use crate::models::{ColorHistogram, ZoneResult};

/// Ring of pixels with `inner < distance <= outer` around the center.
/// With `inner == 0` this is the full disc minus the center pixel itself;
/// use [`disc`] to include it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Annulus {
    pub inner: Option<u32>,
    pub outer: u32,
}

pub fn disc(radius: u32) -> Annulus {
    Annulus { inner: None, outer: radius }
}

pub fn ring(inner: u32, outer: u32) -> Annulus {
    Annulus { inner: Some(inner), outer }
}

impl Annulus {
    fn contains(&self, distance: f64) -> bool {
        let within_outer = distance <= self.outer as f64;
        match self.inner {
            Some(inner) => (inner as f64) < distance && within_outer,
            None => within_outer,
        }
    }
}

pub fn analyze_zone(
    image: &RasterImage,
    center: (u32, u32),
    zone: Annulus,
    name: &str,
    excluded: &PixelSet,
) -> ZoneResult {
    let (width, height) = image.dimensions();
    let (cx, cy) = (center.0 as i64, center.1 as i64);
    let outer = zone.outer as i64;

    let y_range = (cy - outer).max(0)..(cy + outer + 1).min(height as i64);
    let x_range = (cx - outer).max(0)..(cx + outer + 1).min(width as i64);

    let mut colors = ColorHistogram::new();
    let mut pixels = 0usize;
    let mut severity_sum = 0u64;
    let mut scored = 0usize;

    for y in y_range {
        for x in x_range.clone() {
            let (dx, dy) = ((x - cx) as f64, (y - cy) as f64);
            let distance = (dx * dx + dy * dy).sqrt();
            let (px, py) = (x as u32, y as u32);
            if !zone.contains(distance) || excluded.contains(&(px, py)) {
                continue;
            }

            let category = classify(image.get_pixel(px, py).0);
            *colors.entry(category).or_insert(0) += 1;
            pixels += 1;
            if !category.is_neutral() {
                severity_sum += category.severity() as u64;
                scored += 1;
            }
        }
    }

    // Neutral pixels mean "no data", not free-flowing traffic.
    let score = if scored > 0 {
        severity_sum as f64 / scored as f64
    } else {
        0.0
    };

    debug!("analyzed {} zone: score={}, pixels={}", name, score, pixels);
    ZoneResult {
        name: name.to_string(),
        score,
        pixels,
        colors,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::CongestionCategory;
    use crate::cone::find_storefront_traffic;
    use crate::models::CompassDirection;
    use image::Rgb;

    const GRAY: Rgb<u8> = Rgb([180, 190, 200]);
    const DARK_RED: Rgb<u8> = Rgb([170, 30, 30]);
    const YELLOW: Rgb<u8> = Rgb([240, 200, 60]);
    const GREEN: Rgb<u8> = Rgb([30, 220, 150]);

    #[test]
    fn all_neutral_zone_scores_zero_but_counts_pixels() {
        let image = RasterImage::from_pixel(21, 21, GRAY);
        let result = analyze_zone(&image, (10, 10), disc(3), "50m", &PixelSet::new());
        assert_eq!(result.score, 0.0);
        // 29 lattice points lie within radius 3
        assert_eq!(result.pixels, 29);
        assert_eq!(result.colors.get(&CongestionCategory::Neutral), Some(&29));
    }

    #[test]
    fn mean_ignores_neutral_pixels() {
        let mut image = RasterImage::from_pixel(21, 21, GRAY);
        image.put_pixel(10, 9, YELLOW);
        image.put_pixel(10, 11, GREEN);

        let result = analyze_zone(&image, (10, 10), disc(2), "50m", &PixelSet::new());
        assert_eq!(result.score, 50.0);
        assert_eq!(result.colors.get(&CongestionCategory::Yellow), Some(&1));
        assert_eq!(result.colors.get(&CongestionCategory::Green), Some(&1));
    }

    #[test]
    fn rings_partition_the_plane() {
        let image = RasterImage::from_pixel(41, 41, DARK_RED);
        let none = PixelSet::new();
        let inner = analyze_zone(&image, (20, 20), disc(5), "50m", &none);
        let middle = analyze_zone(&image, (20, 20), ring(5, 10), "100m", &none);
        let whole = analyze_zone(&image, (20, 20), disc(10), "all", &none);
        assert_eq!(inner.pixels + middle.pixels, whole.pixels);
        assert_eq!(middle.score, 100.0);
    }

    #[test]
    fn ring_excludes_its_inner_edge() {
        let band = ring(5, 10);
        assert!(!band.contains(5.0));
        assert!(band.contains(5.01));
        assert!(band.contains(10.0));
        assert!(!band.contains(10.01));
        assert!(disc(5).contains(0.0));
        assert!(disc(5).contains(5.0));
    }

    #[test]
    fn zone_is_clipped_to_the_image() {
        let image = RasterImage::from_pixel(5, 5, GRAY);
        let result = analyze_zone(&image, (0, 0), disc(10), "50m", &PixelSet::new());
        assert_eq!(result.pixels, 25);
    }

    #[test]
    fn cone_pixels_never_reach_the_histogram() {
        let mut image = RasterImage::from_pixel(61, 61, GRAY);
        // A green strip inside the north cone, so every checked pixel before the hit is gray.
        for x in 20..=40 {
            image.put_pixel(x, 10, GREEN);
        }
        let (storefront, checked) = find_storefront_traffic(&image, (30, 30), CompassDirection::North, 25);
        assert!(storefront.found);

        let with_exclusion = analyze_zone(&image, (30, 30), disc(25), "50m", &checked);
        let without = analyze_zone(&image, (30, 30), disc(25), "50m", &PixelSet::new());
        assert_eq!(without.pixels - with_exclusion.pixels, checked.len());
        // The hit pixel itself was checked, so one fewer green pixel is counted.
        let greens = |r: &ZoneResult| r.colors.get(&CongestionCategory::Green).copied().unwrap_or(0);
        assert_eq!(greens(&without) - greens(&with_exclusion), 1);
    }
}
