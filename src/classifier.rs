use serde::{Deserialize, Serialize};

/// Congestion level read off a rendered traffic overlay pixel.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum CongestionCategory {
    DarkRed,
    Red,
    Yellow,
    Green,
    /// No traffic rendered at this pixel (map background, labels, roads without data).
    #[serde(rename = "gray")]
    Neutral,
}

type Rgb = [u8; 3];

/// Inclusive RGB boxes, in match priority order.
const COLOR_RANGES: [(CongestionCategory, Rgb, Rgb); 5] = [
    (CongestionCategory::DarkRed, [140, 0, 0], [200, 70, 70]),
    (CongestionCategory::Red, [220, 50, 40], [255, 110, 90]),
    (CongestionCategory::Yellow, [230, 170, 40], [255, 230, 100]),
    (CongestionCategory::Green, [0, 180, 120], [60, 255, 190]),
    (CongestionCategory::Neutral, [160, 170, 180], [200, 210, 220]),
];

impl CongestionCategory {
    pub const ALL: [CongestionCategory; 5] = [
        CongestionCategory::DarkRed,
        CongestionCategory::Red,
        CongestionCategory::Yellow,
        CongestionCategory::Green,
        CongestionCategory::Neutral,
    ];

    pub fn severity(self) -> u32 {
        match self {
            CongestionCategory::DarkRed | CongestionCategory::Red => 100,
            CongestionCategory::Yellow => 70,
            CongestionCategory::Green => 30,
            CongestionCategory::Neutral => 0,
        }
    }

    pub fn is_neutral(self) -> bool {
        self == CongestionCategory::Neutral
    }

    pub fn bounds(self) -> (Rgb, Rgb) {
        COLOR_RANGES
            .iter()
            .find(|(category, _, _)| *category == self)
            .map(|(_, min, max)| (*min, *max))
            .unwrap_or(([0, 0, 0], [255, 255, 255]))
    }
}

/// Total over the 24-bit space: anything outside every box is neutral.
pub fn classify(rgb: Rgb) -> CongestionCategory {
    COLOR_RANGES
        .iter()
        .find(|(_, min, max)| (0..3).all(|i| min[i] <= rgb[i] && rgb[i] <= max[i]))
        .map(|(category, _, _)| *category)
        .unwrap_or(CongestionCategory::Neutral)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn midpoint(category: CongestionCategory) -> Rgb {
        let (min, max) = category.bounds();
        [
            ((min[0] as u16 + max[0] as u16) / 2) as u8,
            ((min[1] as u16 + max[1] as u16) / 2) as u8,
            ((min[2] as u16 + max[2] as u16) / 2) as u8,
        ]
    }

    #[test]
    fn box_interiors_classify_to_their_category() {
        for category in CongestionCategory::ALL {
            assert_eq!(classify(midpoint(category)), category, "{category:?}");
        }
    }

    #[test]
    fn box_edges_are_inclusive() {
        assert_eq!(classify([140, 0, 0]), CongestionCategory::DarkRed);
        assert_eq!(classify([200, 70, 70]), CongestionCategory::DarkRed);
        assert_eq!(classify([255, 110, 90]), CongestionCategory::Red);
        assert_eq!(classify([60, 255, 190]), CongestionCategory::Green);
    }

    #[test]
    fn colors_outside_every_box_are_neutral() {
        assert_eq!(classify([255, 255, 255]), CongestionCategory::Neutral);
        assert_eq!(classify([0, 0, 0]), CongestionCategory::Neutral);
        assert_eq!(classify([210, 60, 60]), CongestionCategory::Neutral);
        assert_eq!(classify([100, 100, 255]), CongestionCategory::Neutral);
    }

    #[test]
    fn severities_match_table() {
        let scores: Vec<u32> = CongestionCategory::ALL.iter().map(|c| c.severity()).collect();
        assert_eq!(scores, vec![100, 100, 70, 30, 0]);
    }

    #[test]
    fn serializes_with_overlay_names() {
        let json = serde_json::to_string(&CongestionCategory::ALL).unwrap();
        assert_eq!(json, r#"["dark_red","red","yellow","green","gray"]"#);
    }
}
