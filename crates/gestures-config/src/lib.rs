//! Configuration tables for the gesture sensor subsystem
//!
//! Gesture sensors are pure configuration: a poll path, an enable control,
//! an identity, and optional screen coordinates. This crate owns the TOML
//! representation of that table and the built-in defaults for the fts
//! touchscreen controller.

mod gestures;

pub use gestures::{
    DEVICE_PRIVATE_BASE, FTS_BASE, GestureSensor, GestureTable, fts_gestures_path,
};

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration file not found: {0}")]
    NotFound(PathBuf),

    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),
}

/// Standard configuration paths
pub const CONFIG_DIR: &str = "/etc/gestures";
pub const CONFIG_FILE: &str = "sensors.toml";
