//! # Telemetry Store
//!
//! Holds exactly one merged [`Snapshot`] of the latest value of every
//! category. Partial updates overwrite only the categories they carry.

use serde::Serialize;
use std::collections::BTreeSet;
use std::sync::{PoisonError, RwLock};

use crate::protocol::reading::{Category, Reading};

/// Last-known value of every telemetry field
///
/// Serializes to the flat lower-camel-case object pushed to dashboards:
///
/// ```json
/// {"timestamp":1718000000000,"heading":12.5,"roll":-3.2,"pitch":0.1,
///  "temperature":0.0,"pressure":0.0,"altitude":0.0,"accX":0.0, ...}
/// ```
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    /// Milliseconds since the Unix epoch of the last applied update (0 = never)
    pub timestamp: i64,

    pub heading: f64,
    pub roll: f64,
    pub pitch: f64,

    pub temperature: f64,
    pub pressure: f64,
    pub altitude: f64,

    pub acc_x: f64,
    pub acc_y: f64,
    pub acc_z: f64,

    pub mag_x: f64,
    pub mag_y: f64,
    pub mag_z: f64,

    pub gyr_x: f64,
    pub gyr_y: f64,
    pub gyr_z: f64,

    pub lia_x: f64,
    pub lia_y: f64,
    pub lia_z: f64,

    pub grv_x: f64,
    pub grv_y: f64,
    pub grv_z: f64,

    pub qua_w: f64,
    pub qua_x: f64,
    pub qua_y: f64,
    pub qua_z: f64,

    #[serde(skip)]
    seen: BTreeSet<Category>,
}

impl Snapshot {
    /// Overwrite every category present in `delta`
    pub fn merge(&mut self, delta: &Reading) {
        if let Some(e) = delta.orientation {
            (self.heading, self.roll, self.pitch) = (e.heading, e.roll, e.pitch);
        }
        if let Some(env) = delta.environment {
            (self.temperature, self.pressure, self.altitude) =
                (env.temperature, env.pressure, env.altitude);
        }
        if let Some(v) = delta.acceleration {
            (self.acc_x, self.acc_y, self.acc_z) = (v.x, v.y, v.z);
        }
        if let Some(v) = delta.magnetometer {
            (self.mag_x, self.mag_y, self.mag_z) = (v.x, v.y, v.z);
        }
        if let Some(v) = delta.gyroscope {
            (self.gyr_x, self.gyr_y, self.gyr_z) = (v.x, v.y, v.z);
        }
        if let Some(v) = delta.linear_acceleration {
            (self.lia_x, self.lia_y, self.lia_z) = (v.x, v.y, v.z);
        }
        if let Some(v) = delta.gravity {
            (self.grv_x, self.grv_y, self.grv_z) = (v.x, v.y, v.z);
        }
        if let Some(q) = delta.quaternion {
            (self.qua_w, self.qua_x, self.qua_y, self.qua_z) = (q.w, q.x, q.y, q.z);
        }
        self.seen.extend(delta.categories());
    }

    /// Categories received at least once
    pub fn categories_seen(&self) -> Vec<Category> {
        self.seen.iter().copied().collect()
    }

    /// Whether every category in `expected` has been received
    pub fn is_complete(&self, expected: &[Category]) -> bool {
        expected.iter().all(|c| self.seen.contains(c))
    }

    /// Whether any update has been applied
    pub fn has_data(&self) -> bool {
        !self.seen.is_empty()
    }
}

/// Shared store for the current snapshot
///
/// The lock is only held for the merge or the clone, never across I/O.
#[derive(Debug, Default)]
pub struct TelemetryStore {
    current: RwLock<Snapshot>,
}

impl TelemetryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge `delta` stamped with the current time; returns the merged snapshot
    pub fn apply_update(&self, delta: &Reading) -> Snapshot {
        self.apply_update_at(delta, chrono::Utc::now().timestamp_millis())
    }

    /// Merge `delta` stamped with `timestamp_ms`; returns the merged snapshot
    ///
    /// An empty delta leaves the snapshot (and its timestamp) untouched.
    pub fn apply_update_at(&self, delta: &Reading, timestamp_ms: i64) -> Snapshot {
        let mut current = self.current.write().unwrap_or_else(PoisonError::into_inner);
        if !delta.is_empty() {
            current.merge(delta);
            current.timestamp = timestamp_ms;
        }
        current.clone()
    }

    /// Copy of the current snapshot
    pub fn snapshot(&self) -> Snapshot {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::reading::{Environment, Euler, Quaternion, Vector3};

    fn euler(heading: f64, roll: f64, pitch: f64) -> Reading {
        Reading {
            orientation: Some(Euler::new(heading, roll, pitch)),
            ..Reading::default()
        }
    }

    #[test]
    fn test_partial_update_keeps_other_fields() {
        let store = TelemetryStore::new();
        store.apply_update_at(
            &Reading {
                acceleration: Some(Vector3::new(1.0, 2.0, 3.0)),
                environment: Some(Environment { temperature: 21.0, pressure: 101000.0, altitude: 5.0 }),
                ..Reading::default()
            },
            1,
        );

        let snapshot = store.apply_update_at(&euler(12.5, -3.2, 0.1), 2);
        assert_eq!((snapshot.heading, snapshot.roll, snapshot.pitch), (12.5, -3.2, 0.1));
        assert_eq!((snapshot.acc_x, snapshot.acc_y, snapshot.acc_z), (1.0, 2.0, 3.0));
        assert_eq!(snapshot.temperature, 21.0);
        assert_eq!(snapshot.timestamp, 2);
    }

    #[test]
    fn test_zero_is_a_real_value() {
        let store = TelemetryStore::new();
        store.apply_update_at(&euler(10.0, 20.0, 30.0), 1);
        let snapshot = store.apply_update_at(&euler(0.0, 0.0, 0.0), 2);
        assert_eq!((snapshot.heading, snapshot.roll, snapshot.pitch), (0.0, 0.0, 0.0));
    }

    #[test]
    fn test_apply_is_idempotent() {
        let delta = Reading {
            quaternion: Some(Quaternion::new(1.0, 0.0, 0.0, 0.0)),
            gravity: Some(Vector3::new(0.0, 0.0, 9.8)),
            ..Reading::default()
        };

        let once = TelemetryStore::new();
        once.apply_update_at(&delta, 42);

        let twice = TelemetryStore::new();
        twice.apply_update_at(&delta, 42);
        twice.apply_update_at(&delta, 42);

        assert_eq!(once.snapshot(), twice.snapshot());
    }

    #[test]
    fn test_empty_delta_changes_nothing() {
        let store = TelemetryStore::new();
        store.apply_update_at(&euler(1.0, 2.0, 3.0), 7);
        let before = store.snapshot();

        let after = store.apply_update_at(&Reading::default(), 99);
        assert_eq!(before, after);
        assert_eq!(after.timestamp, 7);
    }

    #[test]
    fn test_apply_update_stamps_wall_clock() {
        let store = TelemetryStore::new();
        let snapshot = store.apply_update(&euler(1.0, 2.0, 3.0));
        assert!(snapshot.timestamp > 0);
    }

    #[test]
    fn test_categories_seen() {
        let store = TelemetryStore::new();
        assert!(!store.snapshot().has_data());

        store.apply_update_at(&euler(1.0, 2.0, 3.0), 1);
        store.apply_update_at(
            &Reading { magnetometer: Some(Vector3::default()), ..Reading::default() },
            2,
        );

        let snapshot = store.snapshot();
        assert!(snapshot.has_data());
        assert_eq!(
            snapshot.categories_seen(),
            vec![Category::Orientation, Category::Magnetometer]
        );
        assert!(snapshot.is_complete(&[Category::Orientation]));
        assert!(!snapshot.is_complete(&Category::ALL));
    }

    #[test]
    fn test_json_field_names() {
        let store = TelemetryStore::new();
        let snapshot = store.apply_update_at(
            &Reading {
                acceleration: Some(Vector3::new(-1.23, 4.56, 0.0)),
                ..Reading::default()
            },
            1000,
        );

        let json = serde_json::to_value(&snapshot).unwrap();
        assert_eq!(json["timestamp"], 1000);
        assert_eq!(json["accX"], -1.23);
        assert_eq!(json["accY"], 4.56);
        assert_eq!(json["quaW"], 0.0);
        assert!(json.get("linAccX").is_none());
        assert!(json.get("seen").is_none());
        assert_eq!(json.as_object().unwrap().len(), 26);
    }
}
