//! HTTP surface over an [`AnalysisOrchestrator`].

use axum::{
    extract::{Json, State},
    http::{HeaderMap, Request, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use serde_json::json;
use std::sync::Arc;
use tracing::{error, info};

use crate::browser::BrowserContext;
use crate::error::AnalysisError;
use crate::models::{MultiLocationRequest, MultiLocationResponse, SingleLocationRequest, MAX_BATCH_LOCATIONS};
use crate::orchestrator::{AnalysisOrchestrator, AnalyzeOptions};

pub struct AppState<B: BrowserContext> {
    pub concurrent_tabs: usize,
    /// `None` when the browser context failed to start.
    pub orchestrator: Option<AnalysisOrchestrator<B>>,
}

pub fn router<B: BrowserContext>(state: Arc<AppState<B>>) -> Router {
    Router::new()
        .route("/analyze", post(analyze::<B>))
        .route("/process-locations", post(process_locations::<B>))
        .route("/health", get(health::<B>))
        .layer(middleware::from_fn(log_request_response))
        .with_state(state)
}

async fn log_request_response(req: Request<axum::body::Body>, next: Next) -> Response {
    let path = req.uri().path().to_string();
    let method = req.method().to_string();
    info!("incoming request: {} {}", method, path);
    let response = next.run(req).await;
    info!("request result: {} for {} {}", response.status(), method, path);
    response
}

// --- Handlers ---

async fn health<B: BrowserContext>(State(state): State<Arc<AppState<B>>>) -> Response {
    Json(json!({
        "status": "ok",
        "browser_ready": state.orchestrator.is_some(),
        "concurrent_tabs": state.concurrent_tabs,
    }))
    .into_response()
}

async fn analyze<B: BrowserContext>(
    State(state): State<Arc<AppState<B>>>,
    headers: HeaderMap,
    Json(req): Json<SingleLocationRequest>,
) -> Response {
    let Some(orchestrator) = &state.orchestrator else {
        return unavailable();
    };
    let options = AnalyzeOptions {
        save_to_static: req.save_to_static,
        base_url: base_url(&headers),
        concurrency: None,
    };

    match orchestrator.analyze_location(&req.location, &options).await {
        Ok(result) => Json(result).into_response(),
        Err(e) => {
            error!("analysis error: {}", e);
            let status = match e {
                AnalysisError::InvalidLocation(_) => StatusCode::UNPROCESSABLE_ENTITY,
                AnalysisError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            };
            error_response(status, e.to_string())
        }
    }
}

async fn process_locations<B: BrowserContext>(
    State(state): State<Arc<AppState<B>>>,
    headers: HeaderMap,
    Json(req): Json<MultiLocationRequest>,
) -> Response {
    if req.locations.is_empty() {
        return error_response(StatusCode::BAD_REQUEST, "no locations provided".to_string());
    }
    if req.locations.len() > MAX_BATCH_LOCATIONS {
        return error_response(
            StatusCode::BAD_REQUEST,
            format!("max {} locations per request", MAX_BATCH_LOCATIONS),
        );
    }
    for (index, location) in req.locations.iter().enumerate() {
        if let Err(e) = location.validate() {
            return error_response(StatusCode::UNPROCESSABLE_ENTITY, format!("location {index}: {e}"));
        }
    }
    let Some(orchestrator) = &state.orchestrator else {
        return unavailable();
    };

    let request_id = uuid::Uuid::new_v4().simple().to_string();
    let locations_count = req.locations.len();
    info!("request {}: processing {} locations", request_id, locations_count);

    let options = AnalyzeOptions {
        save_to_static: req.save_to_static,
        base_url: base_url(&headers),
        concurrency: None,
    };

    match orchestrator.analyze_batch(req.locations, options).await {
        Ok(outcome) => {
            let error = outcome.error_summary();
            Json(MultiLocationResponse {
                request_id,
                locations_count,
                completed: outcome.completed,
                result: outcome.results,
                saved_to_static: req.save_to_static,
                error,
            })
            .into_response()
        }
        Err(e) => {
            error!("request {} failed: {}", request_id, e);
            let status = match e {
                AnalysisError::InvalidBatch(_) => StatusCode::BAD_REQUEST,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            };
            error_response(status, e.to_string())
        }
    }
}

// --- Helper Functions ---

fn error_response(status: StatusCode, message: String) -> Response {
    (status, Json(json!({ "error": message }))).into_response()
}

fn unavailable() -> Response {
    error_response(StatusCode::SERVICE_UNAVAILABLE, "browser context is not available".to_string())
}

fn base_url(headers: &HeaderMap) -> Option<String> {
    headers
        .get("host")
        .and_then(|v| v.to_str().ok())
        .map(|host| format!("http://{host}/"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Timings;
    use crate::fake_browser::{solid_frame, FakeBrowser, DARK_RED, GRAY};
    use crate::session::SessionSettings;
    use axum::body::Body;
    use serde_json::Value;
    use std::time::Duration;
    use tower::ServiceExt;

    fn app(browser: Option<FakeBrowser>) -> Router {
        let settings = SessionSettings {
            timings: Timings::immediate(),
            navigation_timeout: Duration::from_secs(5),
            capture_timeout: Duration::from_secs(5),
        };
        let orchestrator = browser.map(|b| AnalysisOrchestrator::new(b, 3, settings));
        router(Arc::new(AppState { concurrent_tabs: 3, orchestrator }))
    }

    async fn call(app: Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let body = body.map(|b| Body::from(b.to_string())).unwrap_or_else(Body::empty);
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json")
            .header("host", "api.local")
            .body(body)
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    fn locations(count: usize) -> Value {
        let list: Vec<Value> = (0..count).map(|i| json!({ "lat": i as f64, "lng": 1.0 })).collect();
        json!({ "locations": list })
    }

    #[tokio::test]
    async fn health_reports_browser_state() {
        let (status, body) = call(app(Some(FakeBrowser::new())), "GET", "/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["browser_ready"], true);
        assert_eq!(body["concurrent_tabs"], 3);

        let (_, body) = call(app(None), "GET", "/health", None).await;
        assert_eq!(body["browser_ready"], false);
    }

    #[tokio::test]
    async fn batch_size_outside_limits_is_rejected() {
        let (status, body) = call(app(Some(FakeBrowser::new())), "POST", "/process-locations", Some(locations(0))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "no locations provided");

        let (status, body) = call(app(Some(FakeBrowser::new())), "POST", "/process-locations", Some(locations(21))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "max 20 locations per request");
    }

    #[tokio::test]
    async fn out_of_range_coordinates_are_unprocessable() {
        let browser = FakeBrowser::new();
        let batch = json!({ "locations": [{ "lat": 1.0, "lng": 2.0 }, { "lat": 91.0, "lng": 2.0 }] });
        let (status, body) = call(app(Some(browser)), "POST", "/process-locations", Some(batch)).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert!(body["error"].as_str().unwrap().starts_with("location 1:"));

        let single = json!({ "location": { "lat": 0.0, "lng": 181.0 } });
        let (status, _) = call(app(Some(FakeBrowser::new())), "POST", "/analyze", Some(single)).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[tokio::test]
    async fn missing_browser_is_unavailable() {
        let (status, _) = call(app(None), "POST", "/process-locations", Some(locations(2))).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);

        let single = json!({ "location": { "lat": 1.0, "lng": 2.0 } });
        let (status, _) = call(app(None), "POST", "/analyze", Some(single)).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn batch_response_carries_results_and_errors() {
        let browser = FakeBrowser::new()
            .with_default_frame(solid_frame(100, 100, GRAY))
            .with_frame("@0,", solid_frame(100, 100, DARK_RED))
            .failing_navigation("@1,");
        let (status, body) = call(app(Some(browser)), "POST", "/process-locations", Some(locations(3))).await;
        assert_eq!(status, StatusCode::OK);

        let request_id = body["request_id"].as_str().unwrap();
        assert_eq!(request_id.len(), 32);
        assert!(request_id.chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(body["locations_count"], 3);
        assert_eq!(body["completed"], 2);
        assert_eq!(body["saved_to_static"], false);

        let results = body["result"].as_array().unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0]["coordinates"]["lat"], 0.0);
        assert_eq!(results[0]["score"], 100.0);
        assert_eq!(results[1]["coordinates"]["lat"], 2.0);
        assert!(body["error"].as_str().unwrap().contains("(1, 1)"));
    }

    #[tokio::test]
    async fn single_location_returns_its_result() {
        let single = json!({ "location": { "lat": 4.0, "lng": 5.0, "storefront_direction": "east" } });
        let (status, body) = call(app(Some(FakeBrowser::new())), "POST", "/analyze", Some(single)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["method"], "google_maps_screenshot");
        assert_eq!(body["traffic_type"], "live");
        assert_eq!(body["score"], 0.0);
    }
}
