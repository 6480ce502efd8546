//! The gesture sensor table
//!
//! One record per sensor instead of one subclass per sensor: handle,
//! identity, sysfs paths, and an optional gesture token for controllers that
//! multiplex several gestures behind a single control node.

use crate::ConfigError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// First sensor type code reserved for vendor-private sensors.
pub const DEVICE_PRIVATE_BASE: i32 = 65536;

/// Sysfs directory of the fts touchscreen controller.
pub const FTS_BASE: &str = "/sys/class/spi_master/spi0/spi0.0";

/// Shared gesture control node under [`FTS_BASE`].
pub fn fts_gestures_path() -> PathBuf {
    Path::new(FTS_BASE).join("fts_gestures")
}

/// One gesture sensor definition
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GestureSensor {
    /// Stable integer id, unique within the table
    pub handle: i32,
    /// Human-readable display name
    pub name: String,
    #[serde(default = "default_vendor")]
    pub vendor: String,
    /// Vendor type string, reverse-domain style
    pub type_string: String,
    /// Numeric sensor type code, vendor-private range
    pub type_code: i32,
    /// File whose readability signals the gesture
    pub poll_path: PathBuf,
    /// Enable control file; shared between gestures when `gesture` is set
    pub control_path: PathBuf,
    /// Token written to a shared control file, `None` for plain 0/1 controls
    #[serde(default)]
    pub gesture: Option<String>,
    #[serde(default)]
    pub screen_x: Option<i32>,
    #[serde(default)]
    pub screen_y: Option<i32>,
    #[serde(default = "default_wake_up")]
    pub wake_up: bool,
    #[serde(default)]
    pub supports_injection: bool,
}

fn default_vendor() -> String {
    "Derp".into()
}

fn default_wake_up() -> bool {
    true
}

impl GestureSensor {
    /// Screen coordinates, if this gesture carries a location
    pub fn screen_pos(&self) -> Option<(i32, i32)> {
        match (self.screen_x, self.screen_y) {
            (Some(x), Some(y)) => Some((x, y)),
            _ => None,
        }
    }
}

/// The full gesture sensor table
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GestureTable {
    #[serde(default, rename = "sensor")]
    pub sensors: Vec<GestureSensor>,
}

impl GestureTable {
    /// Load a table from a TOML file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::NotFound(path.to_path_buf()));
        }
        let contents = std::fs::read_to_string(path)?;
        let table: Self = toml::from_str(&contents)?;
        table.validate()?;
        Ok(table)
    }

    /// Load from the standard location, falling back to the built-in table
    pub fn load_default() -> Result<Self, ConfigError> {
        let path = Path::new(crate::CONFIG_DIR).join(crate::CONFIG_FILE);
        if path.exists() {
            return Self::load(&path);
        }

        tracing::warn!("No gesture table at {}, using built-in", path.display());
        Ok(Self::builtin())
    }

    /// Save the table as TOML
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let contents = toml::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    /// The built-in table for the fts touchscreen controller
    pub fn builtin() -> Self {
        let base = Path::new(FTS_BASE);
        Self {
            sensors: vec![
                GestureSensor {
                    handle: 1,
                    name: "UDFPS Sensor".into(),
                    vendor: default_vendor(),
                    type_string: "org.derp.sensor.udfps".into(),
                    type_code: DEVICE_PRIVATE_BASE + 1,
                    poll_path: base.join("fts_gesture_fod_pressed"),
                    control_path: fts_gestures_path(),
                    gesture: Some("fod".into()),
                    screen_x: Some(540),
                    screen_y: Some(1761),
                    wake_up: true,
                    supports_injection: false,
                },
                GestureSensor {
                    handle: 2,
                    name: "Single Tap Sensor".into(),
                    vendor: default_vendor(),
                    type_string: "org.derp.sensor.single_tap".into(),
                    type_code: DEVICE_PRIVATE_BASE + 2,
                    poll_path: base.join("fts_gesture_single_tap_pressed"),
                    control_path: fts_gestures_path(),
                    gesture: Some("single_click".into()),
                    screen_x: None,
                    screen_y: None,
                    wake_up: true,
                    supports_injection: false,
                },
                // The kernel driver exposes no dedicated double-tap node;
                // both tap sensors poll the single-tap node and are told
                // apart by their enable token.
                GestureSensor {
                    handle: 3,
                    name: "Double Tap Sensor".into(),
                    vendor: default_vendor(),
                    type_string: "org.derp.sensor.double_tap".into(),
                    type_code: DEVICE_PRIVATE_BASE + 2,
                    poll_path: base.join("fts_gesture_single_tap_pressed"),
                    control_path: fts_gestures_path(),
                    gesture: Some("double_click".into()),
                    screen_x: None,
                    screen_y: None,
                    wake_up: true,
                    supports_injection: false,
                },
            ],
        }
    }

    /// Check table consistency
    ///
    /// Duplicate handles are an error. Distinct sensors polling the same
    /// node are legal (the built-in table does it) but worth a warning.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut seen = HashMap::new();
        for sensor in &self.sensors {
            if let Some(other) = seen.insert(sensor.handle, &sensor.name) {
                return Err(ConfigError::Invalid(format!(
                    "handle {} used by both '{}' and '{}'",
                    sensor.handle, other, sensor.name
                )));
            }
            if sensor.gesture.is_none() && sensor.control_path == fts_gestures_path() {
                return Err(ConfigError::Invalid(format!(
                    "'{}' uses the shared gesture control file without a gesture token",
                    sensor.name
                )));
            }
        }

        // Any control file claimed by several sensors needs a token per
        // sensor, or a plain 0/1 write would clobber its co-residents.
        let mut by_control: HashMap<&Path, Vec<&GestureSensor>> = HashMap::new();
        for sensor in &self.sensors {
            by_control
                .entry(&sensor.control_path)
                .or_default()
                .push(sensor);
        }
        for (path, group) in &by_control {
            if group.len() > 1
                && let Some(missing) = group.iter().find(|s| s.gesture.is_none())
            {
                return Err(ConfigError::Invalid(format!(
                    "'{}' shares control file {} with {} other sensor(s) but has no gesture token",
                    missing.name,
                    path.display(),
                    group.len() - 1
                )));
            }
        }

        for (path, names) in self.shared_poll_paths() {
            tracing::warn!(
                "Sensors {:?} share poll path {}; triggers will fan out to all of them",
                names,
                path.display()
            );
        }

        Ok(())
    }

    /// Poll paths claimed by more than one sensor, with the claimants' names
    pub fn shared_poll_paths(&self) -> Vec<(PathBuf, Vec<String>)> {
        let mut by_path: HashMap<&Path, Vec<String>> = HashMap::new();
        for sensor in &self.sensors {
            by_path
                .entry(&sensor.poll_path)
                .or_default()
                .push(sensor.name.clone());
        }

        let mut shared: Vec<(PathBuf, Vec<String>)> = by_path
            .into_iter()
            .filter(|(_, names)| names.len() > 1)
            .map(|(path, names)| (path.to_path_buf(), names))
            .collect();
        shared.sort();
        shared
    }

    /// Look up a sensor by handle
    pub fn find(&self, handle: i32) -> Option<&GestureSensor> {
        self.sensors.iter().find(|s| s.handle == handle)
    }
}

impl Default for GestureTable {
    fn default() -> Self {
        Self::builtin()
    }
}
