// One decoded telemetry instant.
// Invariants: produced at most once per unique package id; never mutated after the transport stamps it.

use serde::{Deserialize, Serialize};

use crate::constants::POSITION_ZERO_EPS;

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct VehicleSample {
    /// Receive time on the consumer's monotonic clock.
    pub timestamp_ms: u64,
    pub package_id: u32,
    pub lap: i16,
    pub total_laps: i16,
    pub best_lap_ms: i32,
    pub last_lap_ms: i32,
    pub time_on_track_ms: i32,
    pub speed_kmh: f32,
    pub rpm: f32,
    /// 0..100
    pub throttle: f32,
    /// 0..100
    pub brake: f32,
    pub gear: u8,
    pub suggested_gear: u8,
    pub fuel: f32,
    pub fuel_capacity: f32,
    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub in_race: bool,
    pub paused: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub car_id: Option<i32>,
}

impl VehicleSample {
    pub fn has_position(&self) -> bool {
        self.x.abs() > POSITION_ZERO_EPS || self.z.abs() > POSITION_ZERO_EPS
    }

    pub fn position_xz(&self) -> (f64, f64) {
        (self.x as f64, self.z as f64)
    }

    pub fn fuel_pct(&self) -> Option<f32> {
        if self.fuel_capacity > 0.0 {
            Some(self.fuel / self.fuel_capacity * 100.0)
        } else {
            None
        }
    }
}
