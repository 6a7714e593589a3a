use std::io::Cursor;

use image::{ImageFormat, RgbImage};
use tracing::info;

use crate::classifier::CongestionCategory;
use crate::cone::{find_storefront_traffic, PixelSet};
use crate::error::AnalysisError;
use crate::models::{ColorHistogram, CompassDirection, RawAnalysis, ScoreBreakdown};
use crate::scoring::final_score;
use crate::zone::{analyze_zone, disc, ring};

/// Captured viewport, alpha dropped.
pub type RasterImage = RgbImage;

// Scale of a zoom-18 map tile.
pub const PIXELS_PER_METER: f64 = 1.5;

pub fn meters_to_pixels(meters: f64) -> u32 {
    (meters * PIXELS_PER_METER) as u32
}

pub fn decode_png(bytes: &[u8]) -> Result<RasterImage, AnalysisError> {
    let img = image::load_from_memory(bytes)?;
    Ok(img.to_rgb8())
}

pub fn encode_png(image: &RasterImage) -> Result<Vec<u8>, AnalysisError> {
    let mut cursor = Cursor::new(Vec::new());
    image.write_to(&mut cursor, ImageFormat::Png)?;
    Ok(cursor.into_inner())
}

pub fn image_center(image: &RasterImage) -> (u32, u32) {
    (image.width() / 2, image.height() / 2)
}

/// Runs the cone search and the three area zones over one capture.
pub fn analyze_image(
    image: &RasterImage,
    direction: CompassDirection,
    lat: f64,
    lng: f64,
) -> Result<RawAnalysis, AnalysisError> {
    if image.width() == 0 || image.height() == 0 {
        return Err(AnalysisError::Analysis {
            lat,
            lng,
            reason: "screenshot is empty".to_string(),
        });
    }

    let center = image_center(image);
    let cone_radius = meters_to_pixels(50.0);
    let r50 = meters_to_pixels(50.0);
    let r100 = meters_to_pixels(100.0);
    let r150 = meters_to_pixels(150.0);

    let (storefront, cone_pixels) = find_storefront_traffic(image, center, direction, cone_radius);

    let zones = vec![
        analyze_zone(image, center, disc(r50), "50m", &cone_pixels),
        analyze_zone(image, center, ring(r50, r100), "100m", &PixelSet::new()),
        analyze_zone(image, center, ring(r100, r150), "150m", &PixelSet::new()),
    ];

    let mut color_distribution: ColorHistogram = CongestionCategory::ALL.iter().map(|c| (*c, 0)).collect();
    if storefront.found {
        *color_distribution.entry(storefront.color).or_insert(0) += 1;
    }
    for zone in &zones {
        for (category, count) in &zone.colors {
            *color_distribution.entry(*category).or_insert(0) += count;
        }
    }
    let total_pixels_analyzed = color_distribution.values().sum();

    Ok(RawAnalysis {
        storefront,
        zones,
        color_distribution,
        total_pixels_analyzed,
    })
}

/// Cone, zones and weighting over one decoded capture.
pub fn score_image(
    image: &RasterImage,
    direction: CompassDirection,
    lat: f64,
    lng: f64,
) -> Result<(RawAnalysis, ScoreBreakdown), AnalysisError> {
    let raw = analyze_image(image, direction, lat, lng)?;
    let breakdown = final_score(&raw.storefront, &raw.zones);
    info!("traffic score for {}, {}: {}", lat, lng, breakdown.score);
    Ok((raw, breakdown))
}

/// Decodes a captured PNG, tagging failures with the location.
pub fn decode_capture(png: &[u8], lat: f64, lng: f64) -> Result<RasterImage, AnalysisError> {
    decode_png(png).map_err(|e| AnalysisError::Analysis {
        lat,
        lng,
        reason: e.to_string(),
    })
}
