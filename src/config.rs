use serde::Deserialize;
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Deserialize, Clone, Debug)]
pub struct ProxyConfig {
    pub server: String,
    pub bypass: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
}

/// UI settle delays, in milliseconds.
#[derive(Deserialize, Clone, Debug)]
#[serde(default)]
pub struct Timings {
    pub wheel_ms: u64,
    pub pre_mode_ms: u64,
    pub menu_ms: u64,
    pub consent_ms: u64,
}

impl Default for Timings {
    fn default() -> Self {
        Self {
            wheel_ms: 500,
            pre_mode_ms: 5000,
            menu_ms: 1000,
            consent_ms: 5000,
        }
    }
}

impl Timings {
    pub fn wheel(&self) -> Duration {
        Duration::from_millis(self.wheel_ms)
    }

    pub fn pre_mode(&self) -> Duration {
        Duration::from_millis(self.pre_mode_ms)
    }

    pub fn menu(&self) -> Duration {
        Duration::from_millis(self.menu_ms)
    }

    pub fn consent(&self) -> Duration {
        Duration::from_millis(self.consent_ms)
    }

    /// No waiting at all; used where the page is not a real browser.
    pub fn immediate() -> Self {
        Self { wheel_ms: 0, pre_mode_ms: 0, menu_ms: 0, consent_ms: 0 }
    }
}

#[derive(Deserialize, Clone, Debug)]
pub struct Config {
    pub webdriver_url: String,
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,
    pub thread_count: Option<usize>,
    #[serde(default = "default_concurrent_tabs")]
    pub concurrent_tabs: usize,
    #[serde(default = "default_zoom")]
    pub zoom: u8,
    #[serde(default = "default_viewport_width")]
    pub viewport_width: u32,
    #[serde(default = "default_viewport_height")]
    pub viewport_height: u32,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    #[serde(default = "default_locale")]
    pub locale: String,
    #[serde(default = "default_timeout_secs")]
    pub navigation_timeout_secs: u64,
    #[serde(default = "default_timeout_secs")]
    pub capture_timeout_secs: u64,
    #[serde(default = "default_screenshots_dir")]
    pub screenshots_dir: PathBuf,
    #[serde(default = "default_static_dir")]
    pub static_dir: PathBuf,
    #[serde(default = "default_headless")]
    pub headless: bool,
    pub proxy: Option<ProxyConfig>,
    #[serde(default)]
    pub timings: Timings,
}

fn default_listen_addr() -> String {
    "0.0.0.0:3001".to_string()
}

fn default_concurrent_tabs() -> usize {
    5
}

fn default_zoom() -> u8 {
    18
}

fn default_viewport_width() -> u32 {
    1200
}

fn default_viewport_height() -> u32 {
    800
}

fn default_user_agent() -> String {
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36".to_string()
}

fn default_locale() -> String {
    "en-US".to_string()
}

fn default_timeout_secs() -> u64 {
    10
}

fn default_screenshots_dir() -> PathBuf {
    PathBuf::from("traffic_screenshots")
}

fn default_static_dir() -> PathBuf {
    PathBuf::from("static/images/traffic_screenshots")
}

fn default_headless() -> bool {
    true
}

impl Config {
    pub fn load() -> anyhow::Result<Self> {
        let path = if std::path::Path::new("traffic.toml").exists() {
            "traffic.toml"
        } else if std::path::Path::new("traffic.example.toml").exists() {
            "traffic.example.toml"
        } else {
            return Err(anyhow::anyhow!("Configuration file not found. Please create traffic.toml or provide traffic.example.toml."));
        };

        let content = fs::read_to_string(path)?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> anyhow::Result<Self> {
        let config: Config = toml::from_str(content)?;
        if config.concurrent_tabs == 0 {
            return Err(anyhow::anyhow!("concurrent_tabs must be at least 1"));
        }
        Ok(config)
    }

    /// Configuration with every default filled in.
    pub fn default_for(webdriver_url: &str) -> Self {
        Self {
            webdriver_url: webdriver_url.to_string(),
            listen_addr: default_listen_addr(),
            thread_count: None,
            concurrent_tabs: default_concurrent_tabs(),
            zoom: default_zoom(),
            viewport_width: default_viewport_width(),
            viewport_height: default_viewport_height(),
            user_agent: default_user_agent(),
            locale: default_locale(),
            navigation_timeout_secs: default_timeout_secs(),
            capture_timeout_secs: default_timeout_secs(),
            screenshots_dir: default_screenshots_dir(),
            static_dir: default_static_dir(),
            headless: default_headless(),
            proxy: None,
            timings: Timings::default(),
        }
    }

    pub fn navigation_timeout(&self) -> Duration {
        Duration::from_secs(self.navigation_timeout_secs)
    }

    pub fn capture_timeout(&self) -> Duration {
        Duration::from_secs(self.capture_timeout_secs)
    }
}
