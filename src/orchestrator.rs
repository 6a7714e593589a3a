use std::sync::Arc;

use chrono::Utc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{error, info, warn};

use crate::analysis::{decode_capture, score_image};
use crate::artifacts::ArtifactStore;
use crate::browser::BrowserContext;
use crate::error::AnalysisError;
use crate::models::{Coordinates, LocationRequest, TrafficAnalysisResult, MAX_BATCH_LOCATIONS};
use crate::pool::SessionPool;
use crate::session::{capture_location, Capture, SessionSettings};

pub const METHOD: &str = "google_maps_screenshot";

#[derive(Debug, Clone, Default)]
pub struct AnalyzeOptions {
    pub save_to_static: bool,
    /// Base of the public URL for published screenshots.
    pub base_url: Option<String>,
    /// Per-batch cap on in-flight locations, on top of the pool bound.
    pub concurrency: Option<usize>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LocationFailure {
    pub index: usize,
    pub message: String,
}

#[derive(Debug, Clone)]
pub struct BatchOutcome {
    pub requested: usize,
    pub completed: usize,
    /// Successful results in submission order.
    pub results: Vec<TrafficAnalysisResult>,
    pub failures: Vec<LocationFailure>,
}

impl BatchOutcome {
    pub fn error_summary(&self) -> Option<String> {
        if self.failures.is_empty() {
            return None;
        }
        Some(
            self.failures
                .iter()
                .map(|f| f.message.as_str())
                .collect::<Vec<_>>()
                .join("\n"),
        )
    }
}

/// Owns the browsing context for its whole life and fans location requests
/// out through the tab pool.
pub struct AnalysisOrchestrator<B: BrowserContext> {
    pool: Arc<SessionPool<B>>,
    settings: Arc<SessionSettings>,
    artifacts: Option<ArtifactStore>,
}

impl<B: BrowserContext> Clone for AnalysisOrchestrator<B> {
    fn clone(&self) -> Self {
        Self {
            pool: self.pool.clone(),
            settings: self.settings.clone(),
            artifacts: self.artifacts.clone(),
        }
    }
}

impl<B: BrowserContext> AnalysisOrchestrator<B> {
    pub fn new(browser: B, concurrent_tabs: usize, settings: SessionSettings) -> Self {
        Self {
            pool: Arc::new(SessionPool::new(browser, concurrent_tabs)),
            settings: Arc::new(settings),
            artifacts: None,
        }
    }

    pub fn with_artifacts(mut self, store: ArtifactStore) -> Self {
        self.artifacts = Some(store);
        self
    }

    pub fn pool(&self) -> &SessionPool<B> {
        &self.pool
    }

    pub async fn analyze_location(
        &self,
        location: &LocationRequest,
        options: &AnalyzeOptions,
    ) -> Result<TrafficAnalysisResult, AnalysisError> {
        location.validate().map_err(AnalysisError::InvalidLocation)?;
        let (lat, lng) = (location.lat, location.lng);

        let slot = self
            .pool
            .acquire()
            .await
            .map_err(|e| AnalysisError::Unavailable(e.to_string()))?;

        // Detached so a dropped caller cannot strand the tab; the slot is
        // held until the tab is closed.
        let pool = self.pool.clone();
        let settings = self.settings.clone();
        let target = location.clone();
        let capture = tokio::spawn(async move {
            let capture = capture_location(pool.browser(), &target, &settings).await;
            slot.release();
            capture
        })
        .await
        .map_err(|e| AnalysisError::Capture { lat, lng, reason: e.to_string() })??;

        let artifacts = if options.save_to_static { self.artifacts.clone() } else { None };
        let owned_location = location.clone();
        let base_url = options.base_url.clone();
        let result = tokio::task::spawn_blocking(move || {
            build_result(&owned_location, capture, artifacts.as_ref(), base_url.as_deref())
        })
        .await
        .map_err(|e| AnalysisError::Analysis { lat, lng, reason: e.to_string() })??;

        info!("traffic analysis completed for {}, {}: score {}", lat, lng, result.score);
        Ok(result)
    }

    /// Runs every location to completion; one location failing never stops the rest.
    pub async fn analyze_batch(
        &self,
        locations: Vec<LocationRequest>,
        options: AnalyzeOptions,
    ) -> Result<BatchOutcome, AnalysisError> {
        if locations.is_empty() {
            return Err(AnalysisError::InvalidBatch("no locations provided".into()));
        }
        if locations.len() > MAX_BATCH_LOCATIONS {
            return Err(AnalysisError::InvalidBatch(format!(
                "max {} locations per request",
                MAX_BATCH_LOCATIONS
            )));
        }

        let requested = locations.len();
        let limit = Arc::new(Semaphore::new(options.concurrency.unwrap_or(requested).max(1)));
        let options = Arc::new(options);
        let mut tasks = JoinSet::new();

        for (index, location) in locations.into_iter().enumerate() {
            let this = self.clone();
            let limit = limit.clone();
            let options = options.clone();
            tasks.spawn(async move {
                let outcome = match limit.acquire_owned().await {
                    Ok(_permit) => this.analyze_location(&location, &options).await,
                    Err(e) => Err(AnalysisError::Unavailable(e.to_string())),
                };
                (index, outcome)
            });
        }

        let mut slots: Vec<Option<Result<TrafficAnalysisResult, String>>> = vec![None; requested];
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((index, Ok(result))) => slots[index] = Some(Ok(result)),
                Ok((index, Err(err))) => {
                    error!("{}", err);
                    slots[index] = Some(Err(err.to_string()));
                }
                Err(e) => error!("location task aborted: {}", e),
            }
        }

        let mut results = Vec::new();
        let mut failures = Vec::new();
        for (index, slot) in slots.into_iter().enumerate() {
            match slot {
                Some(Ok(result)) => results.push(result),
                Some(Err(message)) => failures.push(LocationFailure { index, message }),
                None => failures.push(LocationFailure {
                    index,
                    message: format!("location {index} did not finish"),
                }),
            }
        }

        info!("batch finished: {}/{} locations analyzed", results.len(), requested);
        Ok(BatchOutcome {
            requested,
            completed: results.len(),
            results,
            failures,
        })
    }

    /// Stops accepting work and disposes the browsing context. Teardown
    /// errors are returned for reporting, never raised.
    pub async fn shutdown(&self) -> Vec<String> {
        self.pool.close();
        let mut errors = Vec::new();
        if let Err(e) = self.pool.browser().dispose().await {
            warn!("failed to dispose browser context: {}", e);
            errors.push(format!("browser context: {e}"));
        }
        if errors.is_empty() {
            info!("cleanup completed successfully");
        } else {
            warn!("cleanup completed with errors: {:?}", errors);
        }
        errors
    }
}

fn build_result(
    location: &LocationRequest,
    capture: Capture,
    artifacts: Option<&ArtifactStore>,
    base_url: Option<&str>,
) -> Result<TrafficAnalysisResult, AnalysisError> {
    let (lat, lng) = (location.lat, location.lng);
    let image = decode_capture(&capture.png, lat, lng)?;
    let (raw, breakdown) = score_image(&image, location.storefront_direction, lat, lng)?;

    let published = match artifacts {
        Some(store) => Some(store.persist(location, &capture.png, &image, base_url)?),
        None => None,
    };

    Ok(TrafficAnalysisResult {
        score: breakdown.score,
        storefront_score: breakdown.storefront_score,
        area_score: breakdown.area_score,
        storefront_weight: breakdown.storefront_weight,
        area_weight: breakdown.area_weight,
        total_pixels_analyzed: raw.total_pixels_analyzed,
        color_distribution: raw.color_distribution,
        area_details: raw.zones,
        storefront_details: raw.storefront,
        method: METHOD.to_string(),
        coordinates: Coordinates { lat, lng },
        analysis_timestamp: Utc::now(),
        traffic_type: capture.traffic_mode(),
        mode_switch: capture.mode_switch,
        screenshot_path: published.as_ref().map(|p| p.path.display().to_string()),
        screenshot_url: published.and_then(|p| p.url),
    })
}
