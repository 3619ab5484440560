// Corner segments on the resampled distance axis and the coaching rows derived from them.

use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct CornerSegment {
    pub start_idx: usize,
    /// Inclusive.
    pub end_idx: usize,
    /// Sign of the mean heading change: +1 right (`R`), -1 left (`L`), 0 unknown.
    pub direction: i8,
    /// Mean absolute smoothed curvature over the segment (rad per bin).
    pub strength: f64,
}

impl CornerSegment {
    pub fn len(&self) -> usize {
        (self.end_idx + 1).saturating_sub(self.start_idx)
    }

    pub fn direction_label(&self) -> &'static str {
        match self.direction {
            d if d > 0 => "R",
            d if d < 0 => "L",
            _ => "?",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CoachingRow {
    pub segment: CornerSegment,
    /// Δt(exit) − Δt(entry), positive when the compared lap lost time.
    pub loss_ms: f64,
    /// Positive when the compared lap started braking later.
    pub brake_start_delta_m: Option<f64>,
    /// Positive when the compared lap went back to throttle later.
    pub throttle_on_delta_m: Option<f64>,
    pub min_speed_delta_kmh: f64,
    pub exit_speed_delta_kmh: f64,
}
