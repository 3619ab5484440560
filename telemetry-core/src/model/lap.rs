// Finalized lap: coordinate-valid samples plus their distance-indexed polyline.
// Invariants: points and cumdist have equal length; cumdist is monotone non-decreasing.

use serde::{Deserialize, Serialize};

use super::VehicleSample;
use crate::geometry::{cumulative_distance, start_gate};

/// Perpendicular marker segment through the first lap point.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct StartGate {
    pub a: (f64, f64),
    pub b: (f64, f64),
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LapData {
    pub lap_num: i16,
    pub samples: Vec<VehicleSample>,
    pub points: Vec<(f64, f64)>,
    pub cumdist: Vec<f64>,
    /// Time reported by the protocol at the lap boundary; `None` when it was not positive.
    pub lap_time_ms: Option<i32>,
    pub start_gate: Option<StartGate>,
}

impl LapData {
    /// Builds a lap from buffered samples, keeping only coordinate-valid ones.
    /// Returns `None` when fewer than `min_points` remain.
    pub fn from_samples(
        lap_num: i16,
        samples: Vec<VehicleSample>,
        last_lap_ms: i32,
        min_points: usize,
    ) -> Option<Self> {
        let samples: Vec<VehicleSample> =
            samples.into_iter().filter(VehicleSample::has_position).collect();
        if samples.len() < min_points.max(1) {
            return None;
        }

        let points: Vec<(f64, f64)> = samples.iter().map(VehicleSample::position_xz).collect();
        let cumdist = cumulative_distance(&points);
        let start_gate = start_gate(&points);

        Some(Self {
            lap_num,
            samples,
            points,
            cumdist,
            lap_time_ms: (last_lap_ms > 0).then_some(last_lap_ms),
            start_gate,
        })
    }

    pub fn total_distance(&self) -> f64 {
        self.cumdist.last().copied().unwrap_or(0.0)
    }

    /// Per-point series over coordinate-valid samples; `None` on any length disagreement.
    pub fn series<F>(&self, f: F) -> Option<Vec<f64>>
    where
        F: Fn(&VehicleSample) -> f64,
    {
        let values: Vec<f64> = self
            .samples
            .iter()
            .filter(|sample| sample.has_position())
            .map(f)
            .collect();
        if values.is_empty() || values.len() != self.cumdist.len() {
            return None;
        }
        Some(values)
    }

    /// Seconds since the first sample of the lap.
    pub fn elapsed_s(&self) -> Option<Vec<f64>> {
        let t0 = self.samples.first()?.timestamp_ms;
        self.series(|sample| sample.timestamp_ms.saturating_sub(t0) as f64 / 1000.0)
    }

    pub fn speed_kmh(&self) -> Option<Vec<f64>> {
        self.series(|sample| sample.speed_kmh as f64)
    }

    pub fn throttle(&self) -> Option<Vec<f64>> {
        self.series(|sample| sample.throttle as f64)
    }

    pub fn brake(&self) -> Option<Vec<f64>> {
        self.series(|sample| sample.brake as f64)
    }
}
