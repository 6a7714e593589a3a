use tracing::debug;

use crate::models::{ScoreBreakdown, StorefrontResult, ZoneResult};

// Facade orientation is a guess, so the directional hit counts for little.
pub const STOREFRONT_WEIGHT: f64 = 0.1;
pub const AREA_WEIGHT: f64 = 0.9;

pub const ZONE_MULTIPLIERS: [(&str, f64); 3] = [("50m", 1.0), ("100m", 0.5), ("150m", 0.25)];

pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Pixel-weighted mean of the zone scores, nearer zones counting more.
pub fn area_score(zones: &[ZoneResult]) -> f64 {
    let mut weighted = 0.0;
    let mut total_weight = 0.0;

    for (name, multiplier) in ZONE_MULTIPLIERS {
        let Some(zone) = zones.iter().find(|z| z.name == name) else {
            continue;
        };
        let pixels = zone.pixels as f64;
        let contribution = zone.score * multiplier * pixels;
        debug!(
            "zone '{}': score={}, pixels={}, multiplier={}, contribution={}",
            name, zone.score, zone.pixels, multiplier, contribution
        );
        weighted += contribution;
        total_weight += pixels * multiplier;
    }

    if total_weight > 0.0 {
        weighted / total_weight
    } else {
        0.0
    }
}

pub fn final_score(storefront: &StorefrontResult, zones: &[ZoneResult]) -> ScoreBreakdown {
    let storefront_score = storefront.score as f64;
    let area = area_score(zones);
    let score = storefront_score * STOREFRONT_WEIGHT + area * AREA_WEIGHT;
    debug!(
        "final score: ({} * {}) + ({} * {}) = {}",
        storefront_score, STOREFRONT_WEIGHT, area, AREA_WEIGHT, score
    );

    ScoreBreakdown {
        score: round2(score),
        storefront_score,
        area_score: round2(area),
        storefront_weight: STOREFRONT_WEIGHT,
        area_weight: AREA_WEIGHT,
    }
}
