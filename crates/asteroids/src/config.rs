//! Demo configuration
//!
//! Wraps the engine's [`GameConfig`] with gameplay settings so both live in
//! one file:
//!
//! ```toml
//! [game]
//! log_level = "debug"
//! target_fps = 60
//!
//! [gameplay]
//! max_frames = 300
//! asteroid_count = 8
//! ```

use ecs_engine::core::{Config, GameConfig};
use serde::{Deserialize, Serialize};

/// Complete demo configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AsteroidsConfig {
    /// Engine settings
    pub game: GameConfig,

    /// Gameplay settings
    pub gameplay: GameplayConfig,
}

impl Default for AsteroidsConfig {
    fn default() -> Self {
        Self {
            game: GameConfig::new().with_asset_root(concat!(env!("CARGO_MANIFEST_DIR"), "/levels")),
            gameplay: GameplayConfig::default(),
        }
    }
}

impl Config for AsteroidsConfig {}

impl AsteroidsConfig {
    /// Check engine and gameplay settings
    pub fn validate(&self) -> Result<(), String> {
        self.game.validate()?;
        if self.gameplay.max_frames == 0 {
            return Err("max_frames must be at least 1".to_string());
        }
        if !(self.gameplay.max_speed.is_finite() && self.gameplay.max_speed >= 0.0) {
            return Err(format!("Invalid max_speed: {}", self.gameplay.max_speed));
        }
        Ok(())
    }
}

/// Gameplay configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GameplayConfig {
    /// Frames to run before the demo stops itself
    pub max_frames: u32,

    /// Random asteroids spawned on top of the level's own
    pub asteroid_count: u32,

    /// Seed for the random spawner
    pub seed: u64,

    /// Upper bound for a random asteroid's speed, field units per second
    pub max_speed: f64,
}

impl Default for GameplayConfig {
    fn default() -> Self {
        Self {
            max_frames: 180,
            asteroid_count: 4,
            seed: 42,
            max_speed: 60.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config_is_valid() {
        let config = AsteroidsConfig::default();
        assert!(config.validate().is_ok());
        assert!(config.game.asset_root.ends_with("levels"));
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("asteroids.toml");
        std::fs::write(&path, "[gameplay]\nmax_frames = 10\n").unwrap();

        let config = AsteroidsConfig::load_from_file(&path).unwrap();
        assert_eq!(config.gameplay.max_frames, 10);
        assert_eq!(config.gameplay.seed, 42);
        assert_eq!(config.game.target_fps, 60);
    }

    #[test]
    fn test_zero_frames_rejected() {
        let mut config = AsteroidsConfig::default();
        config.gameplay.max_frames = 0;
        assert!(config.validate().is_err());
    }
}
