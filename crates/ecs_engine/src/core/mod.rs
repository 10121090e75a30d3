//! # Core Engine Module
//!
//! Shared settings used to put a game together.
//!
//! ## Organization
//!
//! - **Config**: Game configuration with file persistence

pub mod config;

pub use config::{Config, ConfigError, GameConfig};
