use std::fmt;

/// Failure scoped to a single location; never aborts a batch.
#[derive(Debug, thiserror::Error)]
pub enum AnalysisError {
    #[error("navigation failed for location ({lat}, {lng}): {reason}")]
    Navigation { lat: f64, lng: f64, reason: String },
    #[error("failed to capture screenshot for location ({lat}, {lng}): {reason}")]
    Capture { lat: f64, lng: f64, reason: String },
    #[error("timed out during {stage} for location ({lat}, {lng})")]
    Timeout { lat: f64, lng: f64, stage: Stage },
    #[error("failed to analyze traffic in screenshot for location ({lat}, {lng}): {reason}")]
    Analysis { lat: f64, lng: f64, reason: String },
    #[error("invalid location: {0}")]
    InvalidLocation(String),
    #[error("invalid batch: {0}")]
    InvalidBatch(String),
    #[error("browser context unavailable: {0}")]
    Unavailable(String),
    #[error("image decoding error: {0}")]
    Decode(#[from] image::ImageError),
    #[error("screenshot artifact error: {0}")]
    Artifact(#[from] std::io::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Navigation,
    Capture,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Navigation => f.write_str("navigation"),
            Stage::Capture => f.write_str("capture"),
        }
    }
}

/// Errors raised by a browsing backend.
#[derive(Debug, thiserror::Error)]
pub enum BrowserError {
    #[error("webdriver transport error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("webdriver returned {error}: {message}")]
    Protocol { error: String, message: String },
    #[error("element not found: {0}")]
    NotFound(String),
    #[error("unexpected webdriver response: {0}")]
    Malformed(String),
    #[error("screenshot payload is not valid base64: {0}")]
    Base64(#[from] base64::DecodeError),
}
