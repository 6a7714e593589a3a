use std::collections::HashSet;
use tracing::debug;

use crate::analysis::RasterImage;
use crate::classifier::{classify, CongestionCategory};
use crate::models::{CompassDirection, StorefrontResult};

pub const CONE_HALF_WIDTH_DEG: i32 = 30;
pub const CONE_STEP_DEG: usize = 5;

pub type PixelSet = HashSet<(u32, u32)>;

/// Bearings swept by the cone, starting at `direction - 30`.
pub fn cone_angles(direction: CompassDirection) -> Vec<i32> {
    let bearing = direction.degrees();
    let min_angle = (bearing - CONE_HALF_WIDTH_DEG).rem_euclid(360);
    let max_angle = (bearing + CONE_HALF_WIDTH_DEG).rem_euclid(360);

    if min_angle < max_angle {
        (min_angle..=max_angle).step_by(CONE_STEP_DEG).collect()
    } else {
        (min_angle..360)
            .step_by(CONE_STEP_DEG)
            .chain((0..=max_angle).step_by(CONE_STEP_DEG))
            .collect()
    }
}

/// Walks outward from the center and stops at the first non-neutral pixel
/// inside the facing cone. Every in-bounds pixel looked at is returned so
/// the 50m zone can skip it.
pub fn find_storefront_traffic(
    image: &RasterImage,
    center: (u32, u32),
    direction: CompassDirection,
    max_distance: u32,
) -> (StorefrontResult, PixelSet) {
    let (width, height) = image.dimensions();
    let (cx, cy) = (center.0 as f64, center.1 as f64);
    let angles = cone_angles(direction);
    let mut checked = PixelSet::new();

    for distance in 1..=max_distance {
        let d = distance as f64;
        for &angle in &angles {
            let rad = (angle as f64).to_radians();
            // Image y grows downward, bearings grow clockwise from north.
            let x = (cx + d * rad.sin()).trunc();
            let y = (cy - d * rad.cos()).trunc();
            if x < 0.0 || y < 0.0 || x >= width as f64 || y >= height as f64 {
                continue;
            }
            let (x, y) = (x as u32, y as u32);
            checked.insert((x, y));

            let category = classify(image.get_pixel(x, y).0);
            if !category.is_neutral() {
                debug!("storefront traffic found: {:?} at {}px facing {:?}", category, distance, direction);
                let result = StorefrontResult {
                    found: true,
                    color: category,
                    distance,
                    score: category.severity(),
                };
                return (result, checked);
            }
        }
    }

    let result = StorefrontResult {
        found: false,
        color: CongestionCategory::Neutral,
        distance: max_distance,
        score: 0,
    };
    (result, checked)
}
