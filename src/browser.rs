//! Capability seam between the engine and whatever drives the browser.
//!
//! The engine only needs a handful of page operations; everything else about
//! browser control stays behind these two traits so the scoring path can run
//! against canned frames.

use serde::{Deserialize, Serialize};
use std::future::Future;

use crate::error::BrowserError;

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl BoundingBox {
    pub fn point_at(&self, horizontal_percent: f64) -> (f64, f64) {
        (
            self.x + (horizontal_percent / 100.0) * self.width,
            self.y + self.height / 2.0,
        )
    }
}

/// Shared, already-consented browsing context. Each page is an independent tab.
pub trait BrowserContext: Send + Sync + 'static {
    type Page: MapPage + 'static;

    fn open_page(&self) -> impl Future<Output = Result<Self::Page, BrowserError>> + Send;

    /// Viewport size in CSS pixels.
    fn viewport(&self) -> (u32, u32);

    /// Tears the context down; called once at shutdown.
    fn dispose(&self) -> impl Future<Output = Result<(), BrowserError>> + Send;
}

pub trait MapPage: Send {
    /// Resolves once the DOM is parsed; subresources may still be loading.
    fn navigate(&mut self, url: &str) -> impl Future<Output = Result<(), BrowserError>> + Send;

    fn evaluate_script(
        &mut self,
        script: &str,
    ) -> impl Future<Output = Result<serde_json::Value, BrowserError>> + Send;

    fn click_by_role(
        &mut self,
        role: &str,
        name: &str,
    ) -> impl Future<Output = Result<(), BrowserError>> + Send;

    fn click_at(&mut self, x: f64, y: f64) -> impl Future<Output = Result<(), BrowserError>> + Send;

    fn move_mouse(&mut self, x: f64, y: f64) -> impl Future<Output = Result<(), BrowserError>> + Send;

    /// Scrolls at the current pointer position; positive `delta_y` zooms the map out.
    fn wheel(&mut self, delta_y: f64) -> impl Future<Output = Result<(), BrowserError>> + Send;

    fn bounding_box(
        &mut self,
        selector: &str,
    ) -> impl Future<Output = Result<Option<BoundingBox>, BrowserError>> + Send;

    /// PNG bytes of the current viewport.
    fn screenshot(&mut self) -> impl Future<Output = Result<Vec<u8>, BrowserError>> + Send;

    fn close(&mut self) -> impl Future<Output = Result<(), BrowserError>> + Send;
}
