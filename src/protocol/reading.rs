//! # Reading Types
//!
//! A [`Reading`] is one decoded telemetry update. It is a partial update:
//! only the categories a record actually carried are `Some`, and the store
//! leaves every other category at its last-known value.

use std::fmt;

/// Semantic sensor grouping carried by a record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Category {
    /// Euler angles (heading, roll, pitch) in degrees
    Orientation,
    /// Orientation quaternion (w, x, y, z), unitless
    Quaternion,
    /// Accelerometer vector
    Accelerometer,
    /// Magnetometer vector (µT)
    Magnetometer,
    /// Gyroscope vector (dps)
    Gyroscope,
    /// Linear acceleration vector (gravity removed)
    LinearAcceleration,
    /// Gravity vector
    Gravity,
    /// Temperature, pressure and altitude from the barometer
    Environment,
}

impl Category {
    /// Every category, in snapshot field order
    pub const ALL: [Category; 8] = [
        Category::Orientation,
        Category::Quaternion,
        Category::Accelerometer,
        Category::Magnetometer,
        Category::Gyroscope,
        Category::LinearAcceleration,
        Category::Gravity,
        Category::Environment,
    ];

    /// Stable lower-camel-case name used in JSON output
    pub fn name(self) -> &'static str {
        match self {
            Category::Orientation => "orientation",
            Category::Quaternion => "quaternion",
            Category::Accelerometer => "accelerometer",
            Category::Magnetometer => "magnetometer",
            Category::Gyroscope => "gyroscope",
            Category::LinearAcceleration => "linearAcceleration",
            Category::Gravity => "gravity",
            Category::Environment => "environment",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Three-axis vector
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Vector3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Vector3 {
    pub const fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }
}

/// Euler angles in degrees
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Euler {
    pub heading: f64,
    pub roll: f64,
    pub pitch: f64,
}

impl Euler {
    pub const fn new(heading: f64, roll: f64, pitch: f64) -> Self {
        Self { heading, roll, pitch }
    }
}

/// Orientation quaternion
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Quaternion {
    pub w: f64,
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Quaternion {
    pub const fn new(w: f64, x: f64, y: f64, z: f64) -> Self {
        Self { w, x, y, z }
    }
}

/// Barometer values: temperature (°C), pressure (Pa), altitude (m)
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Environment {
    pub temperature: f64,
    pub pressure: f64,
    pub altitude: f64,
}

/// Partial telemetry update
///
/// # Examples
///
/// ```
/// use imu_bridge::protocol::reading::{Category, Reading, Vector3};
///
/// let delta = Reading {
///     acceleration: Some(Vector3::new(-1.23, 4.56, 0.0)),
///     ..Reading::default()
/// };
/// assert_eq!(delta.categories(), vec![Category::Accelerometer]);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Reading {
    pub orientation: Option<Euler>,
    pub quaternion: Option<Quaternion>,
    pub acceleration: Option<Vector3>,
    pub magnetometer: Option<Vector3>,
    pub gyroscope: Option<Vector3>,
    pub linear_acceleration: Option<Vector3>,
    pub gravity: Option<Vector3>,
    pub environment: Option<Environment>,
}

impl Reading {
    /// Categories present in this update
    pub fn categories(&self) -> Vec<Category> {
        Category::ALL
            .into_iter()
            .filter(|&category| self.has(category))
            .collect()
    }

    /// Whether the update carries the given category
    pub fn has(&self, category: Category) -> bool {
        match category {
            Category::Orientation => self.orientation.is_some(),
            Category::Quaternion => self.quaternion.is_some(),
            Category::Accelerometer => self.acceleration.is_some(),
            Category::Magnetometer => self.magnetometer.is_some(),
            Category::Gyroscope => self.gyroscope.is_some(),
            Category::LinearAcceleration => self.linear_acceleration.is_some(),
            Category::Gravity => self.gravity.is_some(),
            Category::Environment => self.environment.is_some(),
        }
    }

    /// Number of scalar fields the update sets
    pub fn field_count(&self) -> usize {
        self.categories()
            .into_iter()
            .map(|category| match category {
                Category::Quaternion => 4,
                _ => 3,
            })
            .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.categories().is_empty()
    }
}
