//! In-memory browsing context that serves canned frames and records calls.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use image::Rgb;

use crate::analysis::{encode_png, RasterImage};
use crate::browser::{BoundingBox, BrowserContext, MapPage};
use crate::error::BrowserError;

pub const GRAY: Rgb<u8> = Rgb([180, 190, 200]);
pub const DARK_RED: Rgb<u8> = Rgb([170, 30, 30]);

pub fn solid_frame(width: u32, height: u32, color: Rgb<u8>) -> Vec<u8> {
    encode_png(&RasterImage::from_pixel(width, height, color)).unwrap()
}

#[derive(Default)]
struct Shared {
    calls: Mutex<Vec<String>>,
    open: AtomicUsize,
    peak: AtomicUsize,
    closed: AtomicUsize,
}

pub struct FakeBrowser {
    shared: Arc<Shared>,
    frames: HashMap<String, Vec<u8>>,
    default_frame: Vec<u8>,
    fail_navigation: Vec<String>,
    fail_capture: Vec<String>,
    missing_roles: Vec<String>,
    slider: Option<BoundingBox>,
    fail_scripts: bool,
    fail_close: bool,
    latency: Duration,
}

impl FakeBrowser {
    pub fn new() -> Self {
        Self {
            shared: Arc::new(Shared::default()),
            frames: HashMap::new(),
            default_frame: solid_frame(400, 400, GRAY),
            fail_navigation: Vec::new(),
            fail_capture: Vec::new(),
            missing_roles: Vec::new(),
            slider: Some(BoundingBox { x: 100.0, y: 700.0, width: 400.0, height: 20.0 }),
            fail_scripts: false,
            fail_close: false,
            latency: Duration::ZERO,
        }
    }

    /// Frame served for any URL containing `fragment`.
    pub fn with_frame(mut self, fragment: &str, png: Vec<u8>) -> Self {
        self.frames.insert(fragment.to_string(), png);
        self
    }

    pub fn with_default_frame(mut self, png: Vec<u8>) -> Self {
        self.default_frame = png;
        self
    }

    pub fn failing_navigation(mut self, fragment: &str) -> Self {
        self.fail_navigation.push(fragment.to_string());
        self
    }

    pub fn failing_capture(mut self, fragment: &str) -> Self {
        self.fail_capture.push(fragment.to_string());
        self
    }

    pub fn without_role(mut self, name: &str) -> Self {
        self.missing_roles.push(name.to_string());
        self
    }

    pub fn without_slider(mut self) -> Self {
        self.slider = None;
        self
    }

    pub fn failing_scripts(mut self) -> Self {
        self.fail_scripts = true;
        self
    }

    pub fn failing_close(mut self) -> Self {
        self.fail_close = true;
        self
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.shared.calls.lock().unwrap().clone()
    }

    pub fn peak_open_pages(&self) -> usize {
        self.shared.peak.load(Ordering::SeqCst)
    }

    pub fn open_pages(&self) -> usize {
        self.shared.open.load(Ordering::SeqCst)
    }

    pub fn closed_pages(&self) -> usize {
        self.shared.closed.load(Ordering::SeqCst)
    }
}

pub struct FakePage {
    shared: Arc<Shared>,
    frames: HashMap<String, Vec<u8>>,
    default_frame: Vec<u8>,
    fail_navigation: Vec<String>,
    fail_capture: Vec<String>,
    missing_roles: Vec<String>,
    slider: Option<BoundingBox>,
    fail_scripts: bool,
    fail_close: bool,
    latency: Duration,
    url: String,
    closed: bool,
}

impl FakePage {
    fn record(&self, call: String) {
        self.shared.calls.lock().unwrap().push(call);
    }

    fn url_matches(&self, fragments: &[String]) -> bool {
        fragments.iter().any(|f| self.url.contains(f.as_str()))
    }

    async fn pause(&self) {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
    }
}

impl BrowserContext for FakeBrowser {
    type Page = FakePage;

    async fn open_page(&self) -> Result<FakePage, BrowserError> {
        let now = self.shared.open.fetch_add(1, Ordering::SeqCst) + 1;
        self.shared.peak.fetch_max(now, Ordering::SeqCst);
        self.shared.calls.lock().unwrap().push("open".to_string());
        Ok(FakePage {
            shared: self.shared.clone(),
            frames: self.frames.clone(),
            default_frame: self.default_frame.clone(),
            fail_navigation: self.fail_navigation.clone(),
            fail_capture: self.fail_capture.clone(),
            missing_roles: self.missing_roles.clone(),
            slider: self.slider,
            fail_scripts: self.fail_scripts,
            fail_close: self.fail_close,
            latency: self.latency,
            url: String::new(),
            closed: false,
        })
    }

    fn viewport(&self) -> (u32, u32) {
        (1200, 800)
    }

    async fn dispose(&self) -> Result<(), BrowserError> {
        self.shared.calls.lock().unwrap().push("dispose".to_string());
        if self.fail_close {
            return Err(BrowserError::Malformed("session already gone".into()));
        }
        Ok(())
    }
}

impl MapPage for FakePage {
    async fn navigate(&mut self, url: &str) -> Result<(), BrowserError> {
        self.url = url.to_string();
        self.record(format!("navigate {url}"));
        self.pause().await;
        if self.url_matches(&self.fail_navigation) {
            return Err(BrowserError::Protocol {
                error: "unknown error".into(),
                message: "net::ERR_CONNECTION_RESET".into(),
            });
        }
        Ok(())
    }

    async fn evaluate_script(&mut self, script: &str) -> Result<serde_json::Value, BrowserError> {
        let first_line = script.trim().lines().next().unwrap_or_default().to_string();
        self.record(format!("script {first_line}"));
        if self.fail_scripts {
            return Err(BrowserError::Protocol {
                error: "javascript error".into(),
                message: "script failed".into(),
            });
        }
        Ok(serde_json::Value::Null)
    }

    async fn click_by_role(&mut self, role: &str, name: &str) -> Result<(), BrowserError> {
        self.record(format!("click_role {role} {name}"));
        if self.missing_roles.iter().any(|r| r == name) {
            return Err(BrowserError::NotFound(format!("{role} named '{name}'")));
        }
        Ok(())
    }

    async fn click_at(&mut self, x: f64, y: f64) -> Result<(), BrowserError> {
        self.record(format!("click_at {x} {y}"));
        Ok(())
    }

    async fn move_mouse(&mut self, x: f64, y: f64) -> Result<(), BrowserError> {
        self.record(format!("move {x} {y}"));
        Ok(())
    }

    async fn wheel(&mut self, delta_y: f64) -> Result<(), BrowserError> {
        self.record(format!("wheel {delta_y}"));
        Ok(())
    }

    async fn bounding_box(&mut self, selector: &str) -> Result<Option<BoundingBox>, BrowserError> {
        self.record(format!("bbox {selector}"));
        Ok(self.slider)
    }

    async fn screenshot(&mut self) -> Result<Vec<u8>, BrowserError> {
        self.record("screenshot".to_string());
        self.pause().await;
        if self.url_matches(&self.fail_capture) {
            return Err(BrowserError::Malformed("renderer crashed".into()));
        }
        let frame = self
            .frames
            .iter()
            .find(|(fragment, _)| self.url.contains(fragment.as_str()))
            .map(|(_, png)| png.clone())
            .unwrap_or_else(|| self.default_frame.clone());
        Ok(frame)
    }

    async fn close(&mut self) -> Result<(), BrowserError> {
        self.record("close".to_string());
        if !self.closed {
            self.closed = true;
            self.shared.open.fetch_sub(1, Ordering::SeqCst);
            self.shared.closed.fetch_add(1, Ordering::SeqCst);
        }
        if self.fail_close {
            return Err(BrowserError::Malformed("window already gone".into()));
        }
        Ok(())
    }
}
