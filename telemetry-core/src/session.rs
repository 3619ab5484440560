// Lap segmentation and session state.
// Invariants: single writer; at most one current-lap buffer; laps are immutable once finalized.

use serde::{Deserialize, Serialize};

use crate::buffers::RingBuffer;
use crate::constants::{
    FREEZE_MOVE_EPS_SQ, FREEZE_PEDAL_IDLE_PCT, FREEZE_SPEED_IDLE_KMH, FREEZE_TIMEOUT_MS,
    MIN_LAP_POINTS, SAMPLE_RING_CAP, SESSION_RESET_REGRESSION_MS,
};
use crate::corners::{detect_corners, CornerConfig};
use crate::delta::{corner_coaching_rows, delta_profile_time_ms, CoachingConfig};
use crate::model::{CoachingRow, CornerSegment, LapData, VehicleSample};
use crate::reference::ReferenceManager;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FreezeConfig {
    /// No movement, pedal or speed activity for longer than this counts as paused.
    pub timeout_ms: u64,
    pub move_eps_sq: f32,
    pub pedal_idle_pct: f32,
    pub speed_idle_kmh: f32,
}

impl Default for FreezeConfig {
    fn default() -> Self {
        Self {
            timeout_ms: FREEZE_TIMEOUT_MS,
            move_eps_sq: FREEZE_MOVE_EPS_SQ,
            pedal_idle_pct: FREEZE_PEDAL_IDLE_PCT,
            speed_idle_kmh: FREEZE_SPEED_IDLE_KMH,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SessionConfig {
    pub max_samples: usize,
    pub min_lap_points: usize,
    /// Backward jump of time-on-track (ms) that starts a new session.
    pub reset_regression_ms: i64,
    pub freeze: FreezeConfig,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_samples: SAMPLE_RING_CAP,
            min_lap_points: MIN_LAP_POINTS,
            reset_regression_ms: SESSION_RESET_REGRESSION_MS,
            freeze: FreezeConfig::default(),
        }
    }
}

impl SessionConfig {
    pub fn with_max_samples(max_samples: usize) -> Self {
        Self {
            max_samples,
            ..Self::default()
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum LapState {
    NoLap,
    InLap(i16),
}

/// What a single `ingest` call changed.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SessionEvents {
    pub finalized_lap: Option<i16>,
    /// Lap boundary seen, but too few valid points were buffered.
    pub dropped_lap: Option<i16>,
    pub reset: bool,
    pub reference_changed: bool,
}

impl SessionEvents {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

pub type LapHook = Box<dyn FnMut(&LapData, &Session) + Send>;

#[derive(Clone, Copy, Debug, Default)]
struct FreezeTracker {
    last_moving_ms: Option<u64>,
    last_pos: Option<(f32, f32, f32)>,
}

impl FreezeTracker {
    /// Records activity and reports whether the car has looked frozen for too long.
    fn observe(&mut self, sample: &VehicleSample, config: &FreezeConfig) -> bool {
        let pos = (sample.x, sample.y, sample.z);
        let moved = match self.last_pos {
            Some(prev) => {
                let dist_sq =
                    (pos.0 - prev.0).powi(2) + (pos.1 - prev.1).powi(2) + (pos.2 - prev.2).powi(2);
                dist_sq > config.move_eps_sq
            }
            None => true,
        };
        let pedals = sample.throttle > config.pedal_idle_pct || sample.brake > config.pedal_idle_pct;
        let rolling = sample.speed_kmh > config.speed_idle_kmh;
        self.last_pos = Some(pos);

        if moved || pedals || rolling || self.last_moving_ms.is_none() {
            self.last_moving_ms = Some(sample.timestamp_ms);
        }
        self.last_moving_ms
            .is_some_and(|last| sample.timestamp_ms.saturating_sub(last) > config.timeout_ms)
    }
}

pub struct Session {
    config: SessionConfig,
    recent: RingBuffer<VehicleSample>,
    laps: Vec<LapData>,
    current: Vec<VehicleSample>,
    lap_state: LapState,
    reference: ReferenceManager,
    generation: u64,
    latest: Option<VehicleSample>,
    last_time_on_track_ms: Option<i32>,
    freeze: FreezeTracker,
    effectively_paused: bool,
    on_lap: Option<LapHook>,
}

impl Default for Session {
    fn default() -> Self {
        Self::new(SessionConfig::default())
    }
}

impl Session {
    pub fn new(config: SessionConfig) -> Self {
        Self {
            recent: RingBuffer::new(config.max_samples),
            config,
            laps: Vec::new(),
            current: Vec::new(),
            lap_state: LapState::NoLap,
            reference: ReferenceManager::new(),
            generation: 0,
            latest: None,
            last_time_on_track_ms: None,
            freeze: FreezeTracker::default(),
            effectively_paused: false,
            on_lap: None,
        }
    }

    /// Installs the callback fired once per finalized lap, replacing any previous one.
    pub fn set_lap_hook<F>(&mut self, hook: F)
    where
        F: FnMut(&LapData, &Session) + Send + 'static,
    {
        self.on_lap = Some(Box::new(hook));
    }

    pub fn clear_lap_hook(&mut self) {
        self.on_lap = None;
    }

    pub fn ingest(&mut self, sample: VehicleSample) -> SessionEvents {
        let mut events = SessionEvents::default();

        if let Some(prev) = self.last_time_on_track_ms {
            let regression = prev as i64 - sample.time_on_track_ms as i64;
            if regression > self.config.reset_regression_ms {
                self.reset();
                events.reset = true;
            }
        }
        self.last_time_on_track_ms = Some(sample.time_on_track_ms);

        self.recent.push(sample.clone());
        let frozen = self.freeze.observe(&sample, &self.config.freeze);
        self.effectively_paused = sample.paused || frozen;

        match self.lap_state {
            LapState::NoLap => self.lap_state = LapState::InLap(sample.lap),
            LapState::InLap(lap_num) if lap_num != sample.lap => {
                self.finalize(lap_num, sample.last_lap_ms, &mut events);
                self.lap_state = LapState::InLap(sample.lap);
            }
            LapState::InLap(_) => {}
        }

        if sample.has_position() && !self.effectively_paused {
            self.current.push(sample.clone());
        }
        self.latest = Some(sample);
        events
    }

    /// Drops laps, the current buffer and the reference; the recent-sample view is kept.
    pub fn reset(&mut self) {
        self.laps.clear();
        self.current.clear();
        self.lap_state = LapState::NoLap;
        self.reference.clear();
        self.freeze = FreezeTracker::default();
        self.effectively_paused = false;
        self.generation = self.generation.wrapping_add(1);
    }

    fn finalize(&mut self, lap_num: i16, last_lap_ms: i32, events: &mut SessionEvents) {
        let buffered = std::mem::take(&mut self.current);
        let Some(lap) =
            LapData::from_samples(lap_num, buffered, last_lap_ms, self.config.min_lap_points)
        else {
            events.dropped_lap = Some(lap_num);
            return;
        };

        self.laps.push(lap);
        events.finalized_lap = Some(lap_num);
        events.reference_changed = self.reference.recompute(&self.laps);

        if let Some(mut hook) = self.on_lap.take() {
            if let Some(lap) = self.laps.last() {
                hook(lap, self);
            }
            self.on_lap = Some(hook);
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn lap_state(&self) -> LapState {
        self.lap_state
    }

    pub fn latest(&self) -> Option<&VehicleSample> {
        self.latest.as_ref()
    }

    pub fn is_effectively_paused(&self) -> bool {
        self.effectively_paused
    }

    /// Oldest first.
    pub fn recent_samples(&self) -> Vec<VehicleSample> {
        self.recent.to_vec_ordered()
    }

    pub fn recent_len(&self) -> usize {
        self.recent.len()
    }

    pub fn laps(&self) -> &[LapData] {
        &self.laps
    }

    pub fn lap(&self, lap_num: i16) -> Option<&LapData> {
        self.laps.iter().rev().find(|lap| lap.lap_num == lap_num)
    }

    pub fn last_lap(&self) -> Option<&LapData> {
        self.laps.last()
    }

    pub fn current_lap_points(&self) -> Vec<(f64, f64)> {
        self.current.iter().map(VehicleSample::position_xz).collect()
    }

    pub fn current_lap_len(&self) -> usize {
        self.current.len()
    }

    pub fn reference_lap(&self) -> Option<&LapData> {
        self.reference.reference(&self.laps)
    }

    pub fn reference_index(&self) -> Option<usize> {
        self.reference.index(&self.laps)
    }

    pub fn is_reference_locked(&self) -> bool {
        self.reference.is_locked()
    }

    pub fn lock_reference(&mut self) {
        self.reference.lock();
    }

    pub fn unlock_reference(&mut self) {
        self.reference.unlock();
    }

    pub fn recompute_reference(&mut self) -> bool {
        self.reference.recompute(&self.laps)
    }

    pub fn select_reference_lap(&mut self, lap_num: i16) -> bool {
        self.reference.select_lap_number(&self.laps, lap_num)
    }

    pub fn select_best_reference(&mut self) -> bool {
        self.reference.select_best_time(&self.laps)
    }

    pub fn reference_corners(&self, config: &CornerConfig) -> Vec<CornerSegment> {
        self.reference_lap()
            .map(|reference| detect_corners(reference, config))
            .unwrap_or_default()
    }

    /// Time delta of `lap` against the reference lap, per distance bin.
    pub fn delta_to_reference(&self, lap: &LapData, n: usize) -> Option<Vec<f64>> {
        delta_profile_time_ms(lap, self.reference_lap()?, n)
    }

    pub fn coaching_against_reference(
        &self,
        lap: &LapData,
        corners: &[CornerSegment],
        n: usize,
        config: &CoachingConfig,
    ) -> Option<Vec<CoachingRow>> {
        corner_coaching_rows(corners, lap, self.reference_lap()?, n, config)
    }
}
