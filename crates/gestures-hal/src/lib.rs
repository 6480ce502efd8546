//! One-shot gesture sensor abstraction layer
//!
//! Bridges kernel-exposed gesture sensors (sysfs poll/enable nodes) to a
//! higher-level event consumer. Every sensor is an independently
//! schedulable polling unit: a dedicated worker thread blocks on the
//! hardware node and an interrupt pipe, and activation, operation mode, and
//! teardown are coordinated through a shared condition variable.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use gestures_hal::mock::MockSink;
//! use gestures_hal::sysfs::build_gesture_sensor;
//! use gestures_config::GestureTable;
//!
//! fn main() -> anyhow::Result<()> {
//!     let table = GestureTable::load_default()?;
//!     let sink = Arc::new(MockSink::new());
//!
//!     let mut sensors = Vec::new();
//!     for cfg in &table.sensors {
//!         sensors.push(build_gesture_sensor(cfg, sink.clone())?);
//!     }
//!
//!     for sensor in &mut sensors {
//!         sensor.activate(true)?;
//!     }
//!     Ok(())
//! }
//! ```

pub mod event;
pub mod mock;
pub mod sensor;
pub mod sysfs;

pub use event::{Event, EventCallback, EventPayload, SensorInfo, SensorType};
pub use sensor::{Capabilities, EventSource, OperationMode, Sensor};
pub use sysfs::{EnableControl, SysfsPoller, build_gesture_sensor};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SensorError {
    /// Operation not supported by this sensor shape
    #[error("bad value: {0}")]
    BadValue(&'static str),

    /// Operation invalid in the current mode or activation state
    #[error("invalid state: {0}")]
    InvalidState(&'static str),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("system call failed: {0}")]
    Sys(#[from] nix::Error),
}

/// HAL Result type
pub type Result<T> = std::result::Result<T, SensorError>;
