use std::time::Duration;

use tracing::{debug, info, warn};

use crate::browser::{BrowserContext, MapPage};
use crate::config::{Config, Timings};
use crate::error::{AnalysisError, BrowserError, Stage};
use crate::models::{LocationRequest, ModeSwitchOutcome, TrafficMode};

const LIVE_TRAFFIC_BUTTON: &str = "Live traffic";
const TYPICAL_TRAFFIC_ITEM: &str = "Typical traffic";
const SLIDER_TRACK_SELECTOR: &str = r#"div[jsaction="layer.timeClicked"]"#;

const OBSTRUCTIVE_SELECTORS: [&str; 6] = [
    "#assistive-chips",
    "#omnibox-container",
    "#vasquette",
    ".app-viewcard-strip",
    ".scene-footer-container",
    ".XltNde",
];

const DAYS: [&str; 7] = [
    "sunday",
    "monday",
    "tuesday",
    "wednesday",
    "thursday",
    "friday",
    "saturday",
];

/// Slider anchors as percent of the track width.
const TIME_ANCHORS: [(&str, f64); 3] = [("8:30AM", 16.0), ("6PM", 75.0), ("10PM", 99.9)];
const DEFAULT_SLIDER_PERCENT: f64 = 19.0;

const WHEEL_DELTA: f64 = 100.0;

pub fn google_map_url(lat: f64, lng: f64, zoom: u8) -> String {
    format!("https://www.google.com/maps/@{lat},{lng},{zoom}z/data=!5m1!1e1?hl=en&gl=us")
}

/// Sunday is 0; anything unrecognised falls back to Sunday.
pub fn day_index(label: &str) -> usize {
    let label = label.trim().to_lowercase();
    DAYS.iter().position(|d| *d == label).unwrap_or(0)
}

/// Normalises `H[:MM](AM|PM)` (hour 1-12), dropping a `:00` minute part.
pub fn normalize_time(label: &str) -> Option<String> {
    let label = label.trim().to_uppercase();
    let (clock, meridiem) = if let Some(clock) = label.strip_suffix("AM") {
        (clock, "AM")
    } else {
        (label.strip_suffix("PM")?, "PM")
    };

    let (hour, minutes) = match clock.split_once(':') {
        Some((hour, minutes)) => (hour, Some(minutes)),
        None => (clock, None),
    };

    let valid_hour = match hour.as_bytes() {
        [h] => (b'1'..=b'9').contains(h),
        [b'1', h] => (b'0'..=b'2').contains(h),
        _ => false,
    };
    if !valid_hour {
        return None;
    }

    match minutes {
        None | Some("00") => Some(format!("{hour}{meridiem}")),
        Some(m) => match m.as_bytes() {
            [tens, ones] if (b'0'..=b'5').contains(tens) && ones.is_ascii_digit() => {
                Some(format!("{hour}:{m}{meridiem}"))
            }
            _ => None,
        },
    }
}

pub fn slider_position(label: &str) -> f64 {
    normalize_time(label)
        .and_then(|time| {
            TIME_ANCHORS
                .iter()
                .find(|(anchor, _)| *anchor == time)
                .map(|(_, pos)| *pos)
        })
        .unwrap_or(DEFAULT_SLIDER_PERCENT)
}

fn cleanup_script() -> String {
    let selectors = OBSTRUCTIVE_SELECTORS
        .iter()
        .map(|s| format!("'{s}'"))
        .collect::<Vec<_>>()
        .join(", ");
    format!(
        "let removed = 0;\n\
         [{selectors}].forEach(sel => {{ const el = document.querySelector(sel); if (el) {{ el.remove(); removed++; }} }});\n\
         return removed;"
    )
}

fn day_script(index: usize) -> String {
    format!(
        "const days = document.querySelectorAll('#layer button');\n\
         if (days[{index}]) {{ days[{index}].click(); return true; }}\n\
         return false;"
    )
}

#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub timings: Timings,
    pub navigation_timeout: Duration,
    pub capture_timeout: Duration,
}

impl From<&Config> for SessionSettings {
    fn from(config: &Config) -> Self {
        Self {
            timings: config.timings.clone(),
            navigation_timeout: config.navigation_timeout(),
            capture_timeout: config.capture_timeout(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Created,
    Navigated,
    ModeSelected,
    Cleaned,
    Captured,
    Failed,
    Closed,
}

#[derive(Debug, Clone)]
pub struct Capture {
    pub png: Vec<u8>,
    /// `None` when neither day nor time was requested.
    pub mode_switch: Option<ModeSwitchOutcome>,
}

impl Capture {
    pub fn traffic_mode(&self) -> TrafficMode {
        self.mode_switch
            .as_ref()
            .map(ModeSwitchOutcome::mode)
            .unwrap_or(TrafficMode::Live)
    }
}

/// One browser tab, from navigation to screenshot. The tab is closed on
/// every path through [`capture_location`].
pub struct ScreenshotSession<'a, P: MapPage> {
    page: P,
    settings: &'a SessionSettings,
    viewport: (u32, u32),
    state: SessionState,
    history: Vec<SessionState>,
}

impl<'a, P: MapPage> ScreenshotSession<'a, P> {
    pub fn new(page: P, settings: &'a SessionSettings, viewport: (u32, u32)) -> Self {
        Self {
            page,
            settings,
            viewport,
            state: SessionState::Created,
            history: vec![SessionState::Created],
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn history(&self) -> &[SessionState] {
        &self.history
    }

    fn enter(&mut self, state: SessionState) {
        debug!("session {:?} -> {:?}", self.state, state);
        self.state = state;
        self.history.push(state);
    }

    pub async fn run(&mut self, location: &LocationRequest) -> Result<Capture, AnalysisError> {
        match self.drive(location).await {
            Ok(capture) => Ok(capture),
            Err(err) => {
                self.enter(SessionState::Failed);
                Err(err)
            }
        }
    }

    async fn drive(&mut self, location: &LocationRequest) -> Result<Capture, AnalysisError> {
        let (lat, lng) = (location.lat, location.lng);

        self.navigate(location).await?;
        self.nudge_viewport().await;

        let mode_switch = if location.wants_typical_traffic() {
            tokio::time::sleep(self.settings.timings.pre_mode()).await;
            let outcome = self.select_typical(location).await;
            if let ModeSwitchOutcome::LiveFallback { reason } = &outcome {
                info!("using live traffic for {}, {}: {}", lat, lng, reason);
            } else {
                self.enter(SessionState::ModeSelected);
            }
            Some(outcome)
        } else {
            None
        };

        self.clean_up().await;

        let png = match tokio::time::timeout(self.settings.capture_timeout, self.page.screenshot()).await {
            Err(_) => return Err(AnalysisError::Timeout { lat, lng, stage: Stage::Capture }),
            Ok(Err(e)) => {
                return Err(AnalysisError::Capture { lat, lng, reason: e.to_string() });
            }
            Ok(Ok(png)) => png,
        };
        self.enter(SessionState::Captured);
        info!("screenshot captured for {}, {} ({} bytes)", lat, lng, png.len());

        Ok(Capture { png, mode_switch })
    }

    async fn navigate(&mut self, location: &LocationRequest) -> Result<(), AnalysisError> {
        let (lat, lng) = (location.lat, location.lng);
        let url = google_map_url(lat, lng, location.zoom);
        info!("loading map url: {}", url);

        let nav = self.page.navigate(&url);
        match tokio::time::timeout(self.settings.navigation_timeout, nav).await {
            Err(_) => Err(AnalysisError::Timeout { lat, lng, stage: Stage::Navigation }),
            Ok(Err(e)) => Err(AnalysisError::Navigation { lat, lng, reason: e.to_string() }),
            Ok(Ok(())) => {
                self.enter(SessionState::Navigated);
                Ok(())
            }
        }
    }

    /// The traffic layer is populated lazily; a zoom in/out pair forces it to draw.
    async fn nudge_viewport(&mut self) {
        let (width, height) = self.viewport;
        if let Err(e) = self.page.move_mouse((width / 2) as f64, (height / 2) as f64).await {
            warn!("failed to position pointer: {}", e);
            return;
        }
        for i in 0..3 {
            let delta = if i == 0 { -WHEEL_DELTA } else { WHEEL_DELTA };
            if let Err(e) = self.page.wheel(delta).await {
                warn!("failed to nudge viewport: {}", e);
                return;
            }
            tokio::time::sleep(self.settings.timings.wheel()).await;
        }
    }

    async fn select_typical(&mut self, location: &LocationRequest) -> ModeSwitchOutcome {
        if let Err(e) = self.switch_to_typical().await {
            return ModeSwitchOutcome::LiveFallback {
                reason: format!("failed to select typical traffic mode: {e}"),
            };
        }
        info!("typical traffic mode selected");

        let mut day = None;
        if let Some(label) = &location.day {
            let index = day_index(label);
            match self.select_day(index).await {
                Ok(true) => {
                    info!("selected day {} ({}) for typical mode", index, label);
                    day = Some(index);
                }
                Ok(false) => warn!("day control {} not present", index),
                Err(e) => warn!("failed to select the traffic day of week: {}", e),
            }
        }

        let mut slider_percent = None;
        if let Some(label) = &location.time {
            let pos = slider_position(label);
            match self.select_time(pos).await {
                Ok(true) => {
                    info!("moved time slider to {}% for {}", pos, label);
                    slider_percent = Some(pos);
                }
                Ok(false) => warn!("time slider not present"),
                Err(e) => warn!("failed to adjust the traffic time: {}", e),
            }
        }

        ModeSwitchOutcome::Typical { day, slider_percent }
    }

    async fn switch_to_typical(&mut self) -> Result<(), BrowserError> {
        self.page.click_by_role("button", LIVE_TRAFFIC_BUTTON).await?;
        tokio::time::sleep(self.settings.timings.menu()).await;
        self.page.click_by_role("menuitemradio", TYPICAL_TRAFFIC_ITEM).await?;
        tokio::time::sleep(self.settings.timings.menu()).await;
        Ok(())
    }

    async fn select_day(&mut self, index: usize) -> Result<bool, BrowserError> {
        let clicked = self.page.evaluate_script(&day_script(index)).await?;
        Ok(clicked != serde_json::Value::Bool(false))
    }

    async fn select_time(&mut self, percent: f64) -> Result<bool, BrowserError> {
        let Some(track) = self.page.bounding_box(SLIDER_TRACK_SELECTOR).await? else {
            return Ok(false);
        };
        let (x, y) = track.point_at(percent);
        self.page.click_at(x, y).await?;
        Ok(true)
    }

    async fn clean_up(&mut self) {
        match self.page.evaluate_script(&cleanup_script()).await {
            Ok(removed) => debug!("removed {} overlay elements", removed),
            Err(e) => warn!("failed to clean up UI elements: {}", e),
        }
        self.enter(SessionState::Cleaned);
    }

    /// Closes the tab. A failed close is reported, never raised.
    pub async fn close(&mut self) -> Option<BrowserError> {
        if self.state == SessionState::Closed {
            return None;
        }
        let result = self.page.close().await;
        self.enter(SessionState::Closed);
        match result {
            Ok(()) => None,
            Err(e) => {
                warn!("failed to close tab: {}", e);
                Some(e)
            }
        }
    }
}

impl<P: MapPage> Drop for ScreenshotSession<'_, P> {
    fn drop(&mut self) {
        if self.state != SessionState::Closed {
            warn!("screenshot session dropped in state {:?} without closing its tab", self.state);
        }
    }
}

/// Opens a tab, captures the location and always closes the tab again.
pub async fn capture_location<B: BrowserContext>(
    browser: &B,
    location: &LocationRequest,
    settings: &SessionSettings,
) -> Result<Capture, AnalysisError> {
    let page = browser.open_page().await.map_err(|e| AnalysisError::Navigation {
        lat: location.lat,
        lng: location.lng,
        reason: format!("failed to open tab: {e}"),
    })?;

    let mut session = ScreenshotSession::new(page, settings, browser.viewport());
    let result = session.run(location).await;
    session.close().await;
    result
}
