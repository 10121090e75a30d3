//! # Game Configuration
//!
//! Runtime settings for a [`Game`](crate::game::Game): logging, frame pacing,
//! the scene tick interval and where assets are fetched from.
//!
//! ## Example
//!
//! ```toml
//! log_level = "debug"
//! target_fps = 60
//! asset_root = "assets"
//! max_update_rate_ms = 16.666
//! ```

use crate::ecs::MAX_UPDATE_RATE;
use serde::{Deserialize, Serialize};

pub use crate::config::{Config, ConfigError};

/// # Game Configuration
///
/// Missing fields take their default values when loading from a file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GameConfig {
    /// Log level used when the game initialises logging
    pub log_level: String,
    /// Frames per second requested from the realtime frame scheduler
    pub target_fps: u32,
    /// Directory assets are fetched from
    pub asset_root: String,
    /// Minimum interval between scene ticks in milliseconds
    pub max_update_rate_ms: f64,
}

impl GameConfig {
    /// Create a configuration with default values
    pub fn new() -> Self {
        Self {
            log_level: "info".to_string(),
            target_fps: 60,
            asset_root: "assets".to_string(),
            max_update_rate_ms: MAX_UPDATE_RATE,
        }
    }

    /// Set log level
    pub fn with_log_level(mut self, level: impl Into<String>) -> Self {
        self.log_level = level.into();
        self
    }

    /// Set target FPS
    pub fn with_target_fps(mut self, fps: u32) -> Self {
        self.target_fps = fps;
        self
    }

    /// Set the asset root directory
    pub fn with_asset_root(mut self, root: impl Into<String>) -> Self {
        self.asset_root = root.into();
        self
    }

    /// Set the minimum scene tick interval
    pub fn with_max_update_rate(mut self, interval_ms: f64) -> Self {
        self.max_update_rate_ms = interval_ms;
        self
    }

    /// Parsed log level filter
    pub fn level_filter(&self) -> Option<log::LevelFilter> {
        self.log_level.parse().ok()
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.level_filter().is_none() {
            return Err(format!("Unknown log level: {}", self.log_level));
        }

        if self.target_fps == 0 {
            return Err("Target FPS must be at least 1".to_string());
        }

        if !self.max_update_rate_ms.is_finite() || self.max_update_rate_ms < 0.0 {
            return Err(format!(
                "Update interval must be a non-negative number of milliseconds, got {}",
                self.max_update_rate_ms
            ));
        }

        if self.asset_root.is_empty() {
            return Err("Asset root cannot be empty".to_string());
        }

        Ok(())
    }
}

impl Default for GameConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl Config for GameConfig {}
