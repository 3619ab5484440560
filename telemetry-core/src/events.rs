// Race-engineer callouts derived from successive race states.
// Invariants: each lap time and each fuel-bucket drop is announced once.

use serde::Serialize;

use crate::constants::FUEL_BUCKETS_PCT;
use crate::model::{format_lap_time, RaceState};

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct EngineerEvent {
    /// Stable key, e.g. `lap:3:91234` or `fuel:25`.
    pub id: String,
    pub title: String,
    pub speech: String,
    pub should_speak: bool,
}

#[derive(Clone, Copy, Debug, Default)]
pub struct EventEngine {
    prev_last_lap_ms: i32,
    prev_bucket: Option<u8>,
}

impl EventEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn consume(&mut self, state: &RaceState) -> Vec<EngineerEvent> {
        let mut events = Vec::new();

        if state.connected && state.lap > 0 {
            if state.last_lap_ms > 0 && state.last_lap_ms != self.prev_last_lap_ms {
                events.push(lap_complete(state));
            }
            self.prev_last_lap_ms = state.last_lap_ms;
        }

        if state.fuel_capacity > 0.0 {
            let bucket = fuel_bucket(state.fuel_pct);
            match self.prev_bucket {
                None => self.prev_bucket = Some(bucket),
                Some(prev) if bucket != prev => {
                    if bucket < prev {
                        events.push(EngineerEvent {
                            id: format!("fuel:{bucket}"),
                            title: "Fuel warning".to_string(),
                            speech: format!("Fuel at {bucket} percent."),
                            should_speak: true,
                        });
                    }
                    self.prev_bucket = Some(bucket);
                }
                Some(_) => {}
            }
        }

        events
    }
}

fn lap_complete(state: &RaceState) -> EngineerEvent {
    let lap = (state.lap - 1).max(0);
    let time = format_lap_time(state.last_lap_ms);
    let speech = if state.fuel_capacity > 0.0 {
        format!(
            "Lap {lap}. {time}. Fuel {} percent.",
            state.fuel_pct.round() as i32
        )
    } else {
        format!("Lap {lap}. {time}.")
    };
    EngineerEvent {
        id: format!("lap:{lap}:{}", state.last_lap_ms),
        title: format!("Lap {lap} complete"),
        speech,
        should_speak: true,
    }
}

/// Smallest bucket the percentage still fits under; 100 above the highest one.
fn fuel_bucket(pct: f32) -> u8 {
    FUEL_BUCKETS_PCT
        .iter()
        .copied()
        .find(|bucket| pct <= *bucket as f32)
        .unwrap_or(100)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn racing(lap: i16, last_lap_ms: i32, fuel_pct: f32) -> RaceState {
        RaceState {
            connected: true,
            lap,
            last_lap_ms,
            fuel: fuel_pct,
            fuel_capacity: 100.0,
            fuel_pct,
            ..RaceState::default()
        }
    }

    #[test]
    fn announces_each_lap_time_once() {
        let mut engine = EventEngine::new();
        assert!(engine.consume(&racing(1, -1, 90.0)).is_empty());

        let events = engine.consume(&racing(2, 83_456, 80.0));
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].id, "lap:1:83456");
        assert_eq!(events[0].title, "Lap 1 complete");
        assert_eq!(events[0].speech, "Lap 1. 1:23.456. Fuel 80 percent.");

        assert!(engine.consume(&racing(2, 83_456, 79.0)).is_empty());
    }

    #[test]
    fn ignores_laps_while_disconnected() {
        let mut engine = EventEngine::new();
        let mut state = racing(2, 83_456, 80.0);
        state.connected = false;
        assert!(engine.consume(&state).is_empty());
    }

    #[test]
    fn warns_when_fuel_drops_a_bucket() {
        let mut engine = EventEngine::new();
        assert!(engine.consume(&racing(1, 0, 60.0)).is_empty());
        assert!(engine.consume(&racing(1, 0, 55.0)).is_empty());

        let events = engine.consume(&racing(1, 0, 49.0));
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].id, "fuel:50");

        // Refuelling moves the bucket up silently.
        assert!(engine.consume(&racing(1, 0, 100.0)).is_empty());
        let events = engine.consume(&racing(1, 0, 9.0));
        assert_eq!(events[0].speech, "Fuel at 10 percent.");
    }

    #[test]
    fn buckets() {
        assert_eq!(fuel_bucket(100.0), 100);
        assert_eq!(fuel_bucket(50.0), 50);
        assert_eq!(fuel_bucket(25.5), 50);
        assert_eq!(fuel_bucket(0.0), 10);
    }
}
