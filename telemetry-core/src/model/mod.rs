// Core data models for decoded samples, finalized laps and derived analysis rows.

mod corner;
mod lap;
mod sample;
mod state;

pub use corner::{CoachingRow, CornerSegment};
pub use lap::{LapData, StartGate};
pub use sample::VehicleSample;
pub use state::{format_lap_time, RaceState};
