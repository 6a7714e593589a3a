pub mod analysis;
pub mod artifacts;
pub mod browser;
pub mod classifier;
pub mod config;
pub mod cone;
pub mod error;
pub mod models;
pub mod orchestrator;
pub mod pin;
pub mod pool;
pub mod scoring;
pub mod server;
pub mod session;
pub mod webdriver;
pub mod zone;

#[cfg(test)]
mod fake_browser;
