//! Sensor descriptors and typed events
//!
//! The descriptor is immutable after construction; everything the runtime
//! needs to know about a sensor's identity lives here.

use serde::{Deserialize, Serialize};

/// Numeric sensor type, including vendor-private codes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SensorType(pub i32);

impl SensorType {
    /// First code reserved for vendor-private sensor types
    pub const DEVICE_PRIVATE_BASE: i32 = 65536;

    /// A vendor-private type at the given offset above the base
    pub fn device_private(offset: i32) -> Self {
        Self(Self::DEVICE_PRIVATE_BASE + offset)
    }

    pub fn is_device_private(&self) -> bool {
        self.0 >= Self::DEVICE_PRIVATE_BASE
    }
}

/// What a produced event carries
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventPayload {
    /// Discrete gesture trigger with no location
    Trigger,
    /// Gesture carrying a screen location (e.g. under-display fingerprint)
    Screen { x: i32, y: i32 },
    /// Flush acknowledgment meta event
    FlushComplete,
}

/// A single typed sensor event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Event {
    pub handle: i32,
    pub sensor_type: SensorType,
    /// CLOCK_BOOTTIME nanoseconds at production
    pub timestamp_ns: i64,
    pub payload: EventPayload,
}

impl Event {
    /// A trigger event stamped with the current time
    pub fn trigger(handle: i32, sensor_type: SensorType) -> Self {
        Self {
            handle,
            sensor_type,
            timestamp_ns: now_boottime_ns(),
            payload: EventPayload::Trigger,
        }
    }

    /// A located trigger event stamped with the current time
    pub fn at_screen(handle: i32, sensor_type: SensorType, x: i32, y: i32) -> Self {
        Self {
            handle,
            sensor_type,
            timestamp_ns: now_boottime_ns(),
            payload: EventPayload::Screen { x, y },
        }
    }

    /// The flush acknowledgment for a sensor
    pub fn flush_complete(handle: i32, sensor_type: SensorType) -> Self {
        Self {
            handle,
            sensor_type,
            timestamp_ns: now_boottime_ns(),
            payload: EventPayload::FlushComplete,
        }
    }
}

/// Immutable sensor descriptor
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SensorInfo {
    pub handle: i32,
    pub name: String,
    pub vendor: String,
    /// Reverse-domain vendor type string
    pub type_string: String,
    pub sensor_type: SensorType,
    /// Whether events from this sensor rouse the host from low power
    pub wake_up: bool,
    #[serde(default)]
    pub supports_injection: bool,
    #[serde(default)]
    pub max_range: f32,
    #[serde(default)]
    pub resolution: f32,
    #[serde(default)]
    pub power_ma: f32,
}

/// Consumer of produced event batches
///
/// Called concurrently from every active sensor's worker thread; the sink
/// serializes delivery if it needs to.
pub trait EventCallback: Send + Sync {
    fn post_events(&self, events: Vec<Event>, wakeup: bool);
}

/// Current CLOCK_BOOTTIME in nanoseconds
pub fn now_boottime_ns() -> i64 {
    use nix::time::{ClockId, clock_gettime};

    clock_gettime(ClockId::CLOCK_BOOTTIME)
        .or_else(|_| clock_gettime(ClockId::CLOCK_MONOTONIC))
        .map(|ts| ts.tv_sec() * 1_000_000_000 + ts.tv_nsec())
        .unwrap_or(0)
}
