// Flat race state consumed by the event engine and status displays.

use serde::Serialize;

use super::VehicleSample;

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct RaceState {
    pub connected: bool,
    pub lap: i16,
    pub total_laps: i16,
    pub speed_kmh: f32,
    pub rpm: f32,
    pub throttle: f32,
    pub brake: f32,
    pub gear: u8,
    pub suggested_gear: u8,
    pub fuel: f32,
    pub fuel_capacity: f32,
    pub fuel_pct: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub in_race: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub paused: Option<bool>,
    pub best_lap_ms: i32,
    pub last_lap_ms: i32,
}

impl RaceState {
    pub fn update_from(&mut self, sample: Option<&VehicleSample>, connected: bool) {
        self.connected = connected;
        let Some(sample) = sample else {
            return;
        };

        self.lap = sample.lap;
        self.total_laps = sample.total_laps;
        self.speed_kmh = sample.speed_kmh;
        self.rpm = sample.rpm;
        self.throttle = sample.throttle;
        self.brake = sample.brake;
        self.gear = sample.gear;
        self.suggested_gear = sample.suggested_gear;
        self.fuel = sample.fuel;
        self.fuel_capacity = sample.fuel_capacity;
        self.fuel_pct = sample.fuel_pct().unwrap_or(0.0);
        self.in_race = Some(sample.in_race);
        self.paused = Some(sample.paused);
        self.best_lap_ms = sample.best_lap_ms;
        self.last_lap_ms = sample.last_lap_ms;
    }

    pub fn best_lap_str(&self) -> String {
        format_lap_time(self.best_lap_ms)
    }

    pub fn last_lap_str(&self) -> String {
        format_lap_time(self.last_lap_ms)
    }
}

/// `m:ss.mmm`, or `--:--.---` for missing times.
pub fn format_lap_time(ms: i32) -> String {
    if ms <= 0 {
        return "--:--.---".to_string();
    }
    let minutes = ms / 60_000;
    let rest_ms = ms % 60_000;
    format!("{}:{:02}.{:03}", minutes, rest_ms / 1000, rest_ms % 1000)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_lap_times() {
        assert_eq!(format_lap_time(0), "--:--.---");
        assert_eq!(format_lap_time(-1), "--:--.---");
        assert_eq!(format_lap_time(83_456), "1:23.456");
        assert_eq!(format_lap_time(9_005), "0:09.005");
    }

    #[test]
    fn keeps_fields_when_no_sample() {
        let mut state = RaceState::default();
        let sample = VehicleSample {
            lap: 4,
            fuel: 25.0,
            fuel_capacity: 100.0,
            ..VehicleSample::default()
        };
        state.update_from(Some(&sample), true);
        assert_eq!(state.fuel_pct, 25.0);

        state.update_from(None, false);
        assert!(!state.connected);
        assert_eq!(state.lap, 4);
    }
}
