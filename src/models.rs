use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;

use crate::classifier::CongestionCategory;

pub const MAX_BATCH_LOCATIONS: usize = 20;

/// Facing of a storefront. Sixteen labels collapse onto eight bearings.
#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum CompassDirection {
    #[default]
    North,
    Northeast,
    East,
    Southeast,
    South,
    Southwest,
    West,
    Northwest,
}

impl CompassDirection {
    pub fn from_label(label: &str) -> Option<Self> {
        let direction = match label.trim().to_lowercase().as_str() {
            "north" | "n" => CompassDirection::North,
            "northeast" | "ne" => CompassDirection::Northeast,
            "east" | "e" => CompassDirection::East,
            "southeast" | "se" => CompassDirection::Southeast,
            "south" | "s" => CompassDirection::South,
            "southwest" | "sw" => CompassDirection::Southwest,
            "west" | "w" => CompassDirection::West,
            "northwest" | "nw" => CompassDirection::Northwest,
            _ => return None,
        };
        Some(direction)
    }

    /// Bearing in degrees, clockwise from north.
    pub fn degrees(self) -> i32 {
        match self {
            CompassDirection::North => 0,
            CompassDirection::Northeast => 45,
            CompassDirection::East => 90,
            CompassDirection::Southeast => 135,
            CompassDirection::South => 180,
            CompassDirection::Southwest => 225,
            CompassDirection::West => 270,
            CompassDirection::Northwest => 315,
        }
    }
}

// Unknown labels face north rather than rejecting the request.
impl<'de> Deserialize<'de> for CompassDirection {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let label = String::deserialize(deserializer)?;
        Ok(CompassDirection::from_label(&label).unwrap_or_default())
    }
}

fn default_zoom() -> u8 {
    18
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct LocationRequest {
    pub lat: f64,
    pub lng: f64,
    #[serde(default)]
    pub storefront_direction: CompassDirection,
    #[serde(default)]
    pub day: Option<String>,
    #[serde(default)]
    pub time: Option<String>,
    #[serde(default = "default_zoom")]
    pub zoom: u8,
}

impl LocationRequest {
    pub fn new(lat: f64, lng: f64) -> Self {
        Self {
            lat,
            lng,
            storefront_direction: CompassDirection::North,
            day: None,
            time: None,
            zoom: default_zoom(),
        }
    }

    pub fn facing(mut self, direction: CompassDirection) -> Self {
        self.storefront_direction = direction;
        self
    }

    pub fn on_day(mut self, day: impl Into<String>) -> Self {
        self.day = Some(day.into());
        self
    }

    pub fn at_time(mut self, time: impl Into<String>) -> Self {
        self.time = Some(time.into());
        self
    }

    pub fn validate(&self) -> Result<(), String> {
        if !(-90.0..=90.0).contains(&self.lat) {
            return Err(format!("latitude {} is outside [-90, 90]", self.lat));
        }
        if !(-180.0..=180.0).contains(&self.lng) {
            return Err(format!("longitude {} is outside [-180, 180]", self.lng));
        }
        Ok(())
    }

    pub fn wants_typical_traffic(&self) -> bool {
        self.day.is_some() || self.time.is_some()
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TrafficMode {
    Live,
    Typical,
}

/// What happened when historical-typical rendering was requested.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ModeSwitchOutcome {
    /// Typical mode is showing; `day`/`slider_percent` are set when those controls were applied.
    Typical {
        day: Option<usize>,
        slider_percent: Option<f64>,
    },
    LiveFallback { reason: String },
}

impl ModeSwitchOutcome {
    pub fn mode(&self) -> TrafficMode {
        match self {
            ModeSwitchOutcome::Typical { .. } => TrafficMode::Typical,
            ModeSwitchOutcome::LiveFallback { .. } => TrafficMode::Live,
        }
    }
}

pub type ColorHistogram = BTreeMap<CongestionCategory, usize>;

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ZoneResult {
    pub name: String,
    pub score: f64,
    pub pixels: usize,
    pub colors: ColorHistogram,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct StorefrontResult {
    pub found: bool,
    pub color: CongestionCategory,
    pub distance: u32,
    pub score: u32,
}

/// Cone hit plus the 50m/100m/150m zones, before weighting.
#[derive(Debug, Clone, PartialEq)]
pub struct RawAnalysis {
    pub storefront: StorefrontResult,
    pub zones: Vec<ZoneResult>,
    pub color_distribution: ColorHistogram,
    pub total_pixels_analyzed: usize,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ScoreBreakdown {
    pub score: f64,
    pub storefront_score: f64,
    pub area_score: f64,
    pub storefront_weight: f64,
    pub area_weight: f64,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct Coordinates {
    pub lat: f64,
    pub lng: f64,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct TrafficAnalysisResult {
    pub score: f64,
    pub storefront_score: f64,
    pub area_score: f64,
    pub storefront_weight: f64,
    pub area_weight: f64,
    pub total_pixels_analyzed: usize,
    pub color_distribution: ColorHistogram,
    pub area_details: Vec<ZoneResult>,
    pub storefront_details: StorefrontResult,
    pub method: String,
    pub coordinates: Coordinates,
    pub analysis_timestamp: DateTime<Utc>,
    pub traffic_type: TrafficMode,
    pub mode_switch: Option<ModeSwitchOutcome>,
    pub screenshot_path: Option<String>,
    pub screenshot_url: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct SingleLocationRequest {
    #[serde(default)]
    pub save_to_static: bool,
    pub location: LocationRequest,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct MultiLocationRequest {
    #[serde(default)]
    pub save_to_static: bool,
    pub locations: Vec<LocationRequest>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct MultiLocationResponse {
    pub request_id: String,
    pub locations_count: usize,
    pub completed: usize,
    pub result: Vec<TrafficAnalysisResult>,
    pub saved_to_static: bool,
    pub error: Option<String>,
}
