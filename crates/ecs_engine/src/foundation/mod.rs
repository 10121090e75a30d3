//! Foundation module - Core utilities and types
//!
//! This module provides fundamental utilities used throughout the engine:
//! - Collections with incrementally maintained indexes
//! - Time management
//! - Logging utilities

pub mod collections;
pub mod time;
pub mod logging;
