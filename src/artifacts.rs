use std::fs;
use std::path::{Path, PathBuf};

use tracing::{info, warn};
use url::Url;

use crate::analysis::{encode_png, RasterImage};
use crate::error::AnalysisError;
use crate::models::LocationRequest;
use crate::pin::annotate;

/// Where screenshots land on disk.
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    screenshots_dir: PathBuf,
    static_dir: PathBuf,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PublishedArtifact {
    pub path: PathBuf,
    pub url: Option<String>,
}

/// Shortest round-trip float text with a signed, two-digit exponent
/// (`40.0`, `1e-05`, `1.5e+16`), the form existing artifact names use.
fn float_label(value: f64) -> String {
    let text = format!("{value:?}");
    match text.split_once('e') {
        Some((mantissa, exponent)) => {
            let (sign, digits) = match exponent.strip_prefix('-') {
                Some(digits) => ('-', digits),
                None => ('+', exponent),
            };
            format!("{mantissa}e{sign}{digits:0>2}")
        }
        None => text,
    }
}

/// `traffic_{lat}_{lng}_{day}_{time}.png`; whole coordinates keep their `.0`.
pub fn artifact_name(location: &LocationRequest) -> String {
    let day = location
        .day
        .as_deref()
        .map(|d| d.replace(' ', "_"))
        .unwrap_or_else(|| "no_day".to_string());
    let time = location
        .time
        .as_deref()
        .map(|t| t.replace(':', "-"))
        .unwrap_or_else(|| "no_time".to_string());
    format!(
        "traffic_{}_{}_{}_{}.png",
        float_label(location.lat),
        float_label(location.lng),
        day,
        time
    )
}

pub fn pinned_name(name: &str) -> String {
    match name.strip_suffix(".png") {
        Some(stem) => format!("{stem}_pinned.png"),
        None => format!("{name}_pinned.png"),
    }
}

impl ArtifactStore {
    pub fn new(screenshots_dir: PathBuf, static_dir: PathBuf) -> std::io::Result<Self> {
        for dir in [&screenshots_dir, &static_dir] {
            if !dir.exists() {
                fs::create_dir_all(dir)?;
            }
        }
        Ok(Self { screenshots_dir, static_dir })
    }

    /// Writes the capture, derives the pinned copy and drops the raw file.
    /// Returns the path of the file that remains.
    pub fn save(&self, location: &LocationRequest, png: &[u8], image: &RasterImage) -> Result<PathBuf, AnalysisError> {
        let name = artifact_name(location);
        let raw_path = self.screenshots_dir.join(&name);
        fs::write(&raw_path, png)?;

        let pinned_path = self.screenshots_dir.join(pinned_name(&name));
        let pinned = encode_png(&annotate(image, location.storefront_direction))
            .and_then(|bytes| fs::write(&pinned_path, bytes).map_err(AnalysisError::from));

        match pinned {
            Ok(()) => {
                info!("pin and directional cone added to image: {}", pinned_path.display());
                if let Err(e) = fs::remove_file(&raw_path) {
                    warn!("failed to remove raw screenshot {}: {}", raw_path.display(), e);
                }
                Ok(pinned_path)
            }
            Err(e) => {
                warn!("failed to add pin to image: {}", e);
                Ok(raw_path)
            }
        }
    }

    /// Copies an artifact into the static directory and, given the request's
    /// base URL, derives the public URL for it.
    pub fn publish(&self, artifact: &Path, base_url: Option<&str>) -> Result<PublishedArtifact, AnalysisError> {
        let file_name = artifact
            .file_name()
            .ok_or_else(|| std::io::Error::new(std::io::ErrorKind::InvalidInput, "artifact has no file name"))?;
        let static_path = self.static_dir.join(file_name);
        fs::copy(artifact, &static_path)?;

        let url = base_url.and_then(|base| match self.public_url(base, &static_path) {
            Ok(url) => {
                info!("generated screenshot url: {}", url);
                Some(url)
            }
            Err(e) => {
                warn!("failed to generate screenshot url: {}", e);
                None
            }
        });

        Ok(PublishedArtifact { path: static_path, url })
    }

    /// Saves, publishes, then drops the transient copy.
    pub fn persist(
        &self,
        location: &LocationRequest,
        png: &[u8],
        image: &RasterImage,
        base_url: Option<&str>,
    ) -> Result<PublishedArtifact, AnalysisError> {
        let transient = self.save(location, png, image)?;
        let published = self.publish(&transient, base_url)?;
        if let Err(e) = fs::remove_file(&transient) {
            warn!("failed to remove transient screenshot {}: {}", transient.display(), e);
        }
        Ok(published)
    }

    fn public_url(&self, base: &str, static_path: &Path) -> anyhow::Result<String> {
        // static_dir sits two levels below the served root, e.g. static/images/traffic_screenshots
        let root = self
            .static_dir
            .parent()
            .and_then(Path::parent)
            .ok_or_else(|| anyhow::anyhow!("static dir has no served root"))?;
        let relative = static_path.strip_prefix(root)?;

        let mut url = Url::parse(base)?;
        {
            let mut segments = url
                .path_segments_mut()
                .map_err(|_| anyhow::anyhow!("base url cannot carry a path: {}", base))?;
            segments.pop_if_empty().push("static");
            for part in relative.iter() {
                segments.push(&part.to_string_lossy());
            }
        }
        Ok(url.to_string())
    }
}
