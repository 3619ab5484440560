// Reference-lap selection.
// Invariants: the stored index is re-validated against the live lap list on every read.

use crate::model::LapData;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ReferenceManager {
    index: Option<usize>,
    locked: bool,
}

impl ReferenceManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_locked(&self) -> bool {
        self.locked
    }

    pub fn lock(&mut self) {
        self.locked = true;
    }

    pub fn unlock(&mut self) {
        self.locked = false;
    }

    pub fn clear(&mut self) {
        self.index = None;
        self.locked = false;
    }

    /// Auto policy, skipped while locked. Returns whether the selection changed.
    pub fn recompute(&mut self, laps: &[LapData]) -> bool {
        if self.locked {
            return false;
        }
        let next = auto_reference_index(laps);
        let changed = next != self.index;
        self.index = next;
        changed
    }

    /// Manual selection by lap number; works regardless of the lock. A repeated lap number
    /// resolves to its most recent completion.
    pub fn select_lap_number(&mut self, laps: &[LapData], lap_num: i16) -> bool {
        match laps.iter().rposition(|lap| lap.lap_num == lap_num) {
            Some(idx) => {
                self.index = Some(idx);
                true
            }
            None => false,
        }
    }

    /// Manual selection of the fastest valid lap; works regardless of the lock.
    pub fn select_best_time(&mut self, laps: &[LapData]) -> bool {
        match best_time_index(laps) {
            Some(idx) => {
                self.index = Some(idx);
                true
            }
            None => false,
        }
    }

    pub fn index(&self, laps: &[LapData]) -> Option<usize> {
        self.index.filter(|idx| *idx < laps.len())
    }

    pub fn reference<'a>(&self, laps: &'a [LapData]) -> Option<&'a LapData> {
        self.index(laps).and_then(|idx| laps.get(idx))
    }
}

/// Smallest positive lap time; falls back to the longest lap by distance.
pub fn auto_reference_index(laps: &[LapData]) -> Option<usize> {
    best_time_index(laps).or_else(|| longest_lap_index(laps))
}

fn best_time_index(laps: &[LapData]) -> Option<usize> {
    let mut best: Option<(usize, i32)> = None;
    for (idx, lap) in laps.iter().enumerate() {
        let Some(time_ms) = lap.lap_time_ms.filter(|ms| *ms > 0) else {
            continue;
        };
        match best {
            Some((_, best_ms)) if time_ms >= best_ms => {}
            _ => best = Some((idx, time_ms)),
        }
    }
    best.map(|(idx, _)| idx)
}

fn longest_lap_index(laps: &[LapData]) -> Option<usize> {
    let mut best: Option<(usize, f64)> = None;
    for (idx, lap) in laps.iter().enumerate() {
        let distance = lap.total_distance();
        match best {
            Some((_, best_distance)) if distance <= best_distance => {}
            _ => best = Some((idx, distance)),
        }
    }
    best.map(|(idx, _)| idx)
}
