// Curvature-based corner detection on a reference lap.
// Invariants: deterministic; segments are emitted in ascending start order and never overlap.

use std::f64::consts::PI;

use crate::constants::{
    CORNER_MAX_GAP, CORNER_MIN_LEN, CURVATURE_SMOOTH_WINDOW, CURVATURE_THRESHOLD, DEFAULT_BINS,
    DIRECTION_BALANCE_EPS, MIN_LAP_POINTS,
};
use crate::geometry::resample_points_by_distance;
use crate::model::{CornerSegment, LapData};

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CornerConfig {
    pub n: usize,
    pub smooth_window: usize,
    pub threshold: f64,
    pub max_gap: usize,
    pub min_len: usize,
}

impl Default for CornerConfig {
    fn default() -> Self {
        Self {
            n: DEFAULT_BINS,
            smooth_window: CURVATURE_SMOOTH_WINDOW,
            threshold: CURVATURE_THRESHOLD,
            max_gap: CORNER_MAX_GAP,
            min_len: CORNER_MIN_LEN,
        }
    }
}

impl CornerConfig {
    pub fn with_bins(n: usize) -> Self {
        Self {
            n,
            ..Self::default()
        }
    }

    fn clamped(&self) -> Self {
        Self {
            n: self.n.max(3),
            smooth_window: self.smooth_window.max(1),
            threshold: self.threshold.abs(),
            max_gap: self.max_gap,
            min_len: self.min_len.max(1),
        }
    }
}

pub fn detect_corners(lap: &LapData, config: &CornerConfig) -> Vec<CornerSegment> {
    if lap.points.len() < MIN_LAP_POINTS {
        return Vec::new();
    }
    let config = config.clamped();
    let Some(resampled) = resample_points_by_distance(&lap.points, &lap.cumdist, config.n) else {
        return Vec::new();
    };

    let curvature = signed_curvature(&resampled);
    let smoothed = trailing_mean(&curvature, config.smooth_window);
    let strong: Vec<bool> = smoothed
        .iter()
        .map(|value| value.abs() > config.threshold)
        .collect();

    merge_runs(&strong, config.max_gap, config.min_len)
        .into_iter()
        .map(|(start_idx, end_idx)| segment_from_run(&smoothed, start_idx, end_idx))
        .collect()
}

/// Detected corners for the current reference, keyed by (session generation, reference lap, bins).
#[derive(Clone, Debug, Default)]
pub struct CornerCache {
    key: Option<(u64, i16, usize)>,
    corners: Vec<CornerSegment>,
}

impl CornerCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_or_detect(
        &mut self,
        generation: u64,
        reference: &LapData,
        config: &CornerConfig,
    ) -> &[CornerSegment] {
        let key = (generation, reference.lap_num, config.n);
        if self.key != Some(key) {
            self.corners = detect_corners(reference, config);
            self.key = Some(key);
        }
        &self.corners
    }

    pub fn invalidate(&mut self) {
        self.key = None;
        self.corners.clear();
    }
}

/// Heading change per bin, wrapped to [-pi, pi]. Aligned with the input points: the first and
/// last entries are zero because they have no turn.
pub fn signed_curvature(points: &[(f64, f64)]) -> Vec<f64> {
    let mut out = vec![0.0; points.len()];
    if points.len() < 3 {
        return out;
    }
    let headings: Vec<f64> = points
        .windows(2)
        .map(|pair| (pair[1].1 - pair[0].1).atan2(pair[1].0 - pair[0].0))
        .collect();
    for idx in 1..headings.len() {
        out[idx] = wrap_angle(headings[idx] - headings[idx - 1]);
    }
    out
}

pub fn trailing_mean(values: &[f64], window: usize) -> Vec<f64> {
    let window = window.max(1);
    let mut out = Vec::with_capacity(values.len());
    let mut sum = 0.0;
    for (idx, value) in values.iter().enumerate() {
        sum += value;
        if idx >= window {
            sum -= values[idx - window];
        }
        let count = (idx + 1).min(window);
        out.push(sum / count as f64);
    }
    out
}

fn wrap_angle(angle: f64) -> f64 {
    let mut wrapped = angle;
    while wrapped > PI {
        wrapped -= 2.0 * PI;
    }
    while wrapped < -PI {
        wrapped += 2.0 * PI;
    }
    wrapped
}

/// Greedy merge of strong bins, bridging up to `max_gap` weak bins. Runs are trimmed to their
/// last strong bin and dropped when shorter than `min_len`.
fn merge_runs(strong: &[bool], max_gap: usize, min_len: usize) -> Vec<(usize, usize)> {
    let mut runs = Vec::new();
    let mut current: Option<(usize, usize)> = None;
    let mut gap = 0usize;

    for (idx, is_strong) in strong.iter().enumerate() {
        match (current, *is_strong) {
            (None, true) => {
                current = Some((idx, idx));
                gap = 0;
            }
            (Some((start, _)), true) => {
                current = Some((start, idx));
                gap = 0;
            }
            (Some(run), false) => {
                gap += 1;
                if gap > max_gap {
                    runs.push(run);
                    current = None;
                    gap = 0;
                }
            }
            (None, false) => {}
        }
    }
    if let Some(run) = current {
        runs.push(run);
    }

    runs.retain(|(start, end)| end + 1 - start >= min_len);
    runs
}

fn segment_from_run(smoothed: &[f64], start_idx: usize, end_idx: usize) -> CornerSegment {
    let window = &smoothed[start_idx..=end_idx];
    let count = window.len() as f64;
    let mean = window.iter().sum::<f64>() / count;
    let strength = window.iter().map(|value| value.abs()).sum::<f64>() / count;
    let direction = if mean > DIRECTION_BALANCE_EPS {
        1
    } else if mean < -DIRECTION_BALANCE_EPS {
        -1
    } else {
        0
    };
    CornerSegment {
        start_idx,
        end_idx,
        direction,
        strength,
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::model::VehicleSample;

    /// Straight along +x, a half circle of radius 50, then straight back along -x.
    pub(crate) fn hairpin_points() -> Vec<(f64, f64)> {
        let mut points = Vec::new();
        for i in 0..100 {
            points.push((1.0 + i as f64 * 10.0, 100.0));
        }
        let center = (991.0, 150.0);
        for i in 1..40 {
            let angle = -PI / 2.0 + PI * i as f64 / 40.0;
            points.push((center.0 + 50.0 * angle.cos(), center.1 + 50.0 * angle.sin()));
        }
        for i in 0..100 {
            points.push((991.0 - i as f64 * 10.0, 200.0));
        }
        points
    }

    pub(crate) fn lap_from_points(lap_num: i16, points: &[(f64, f64)]) -> LapData {
        let samples = points
            .iter()
            .enumerate()
            .map(|(idx, (x, z))| VehicleSample {
                timestamp_ms: idx as u64 * 50,
                x: *x as f32,
                z: *z as f32,
                speed_kmh: 120.0,
                ..VehicleSample::default()
            })
            .collect();
        LapData::from_samples(lap_num, samples, 60_000, MIN_LAP_POINTS).expect("lap")
    }

    #[test]
    fn straight_line_has_no_corners() {
        let points: Vec<_> = (0..200).map(|i| (1.0 + i as f64 * 5.0, 3.0)).collect();
        let lap = lap_from_points(1, &points);
        assert!(detect_corners(&lap, &CornerConfig::default()).is_empty());
    }

    #[test]
    fn short_lap_has_no_corners() {
        let points: Vec<_> = (0..10).map(|i| (1.0 + i as f64, 3.0)).collect();
        let mut lap = lap_from_points(1, &points);
        lap.points.truncate(9);
        lap.cumdist.truncate(9);
        assert!(detect_corners(&lap, &CornerConfig::default()).is_empty());
    }

    #[test]
    fn hairpin_is_one_right_hand_corner() {
        let lap = lap_from_points(1, &hairpin_points());
        let corners = detect_corners(&lap, &CornerConfig::default());
        assert_eq!(corners.len(), 1, "{corners:?}");

        let corner = corners[0];
        assert_eq!(corner.direction, 1);
        assert!(corner.len() >= CORNER_MIN_LEN);
        assert!(corner.strength > CURVATURE_THRESHOLD);
        // The arc sits in the middle third of the distance axis.
        assert!(corner.start_idx > 100 && corner.end_idx < 200, "{corner:?}");
    }

    #[test]
    fn detection_is_idempotent() {
        let lap = lap_from_points(1, &hairpin_points());
        let config = CornerConfig::default();
        assert_eq!(detect_corners(&lap, &config), detect_corners(&lap, &config));
    }

    #[test]
    fn segments_are_ordered_and_disjoint() {
        let mut points = hairpin_points();
        // Second half circle from (1, 200) to (1, 300), bulging towards -x.
        let center = (1.0, 250.0);
        for i in 1..=40 {
            let theta = PI * i as f64 / 40.0;
            points.push((center.0 - 50.0 * theta.sin(), center.1 - 50.0 * theta.cos()));
        }
        let lap = lap_from_points(1, &points);
        let corners = detect_corners(&lap, &CornerConfig::default());
        assert_eq!(corners.len(), 2, "{corners:?}");
        assert_eq!(corners[0].direction, 1);
        assert_eq!(corners[1].direction, -1);
        for pair in corners.windows(2) {
            assert!(pair[0].end_idx < pair[1].start_idx);
        }
    }

    #[test]
    fn cache_recomputes_on_new_key_only() {
        let hairpin = lap_from_points(1, &hairpin_points());
        let straight: Vec<_> = (0..200).map(|i| (1.0 + i as f64 * 5.0, 3.0)).collect();
        let straight = lap_from_points(2, &straight);
        let config = CornerConfig::default();
        let mut cache = CornerCache::new();

        assert_eq!(cache.get_or_detect(0, &hairpin, &config).len(), 1);
        // Same key: the cached hairpin corners come back even for another lap.
        let mut stale = straight.clone();
        stale.lap_num = 1;
        assert_eq!(cache.get_or_detect(0, &stale, &config).len(), 1);

        assert!(cache.get_or_detect(0, &straight, &config).is_empty());
        assert_eq!(cache.get_or_detect(1, &hairpin, &config).len(), 1);
        cache.invalidate();
        assert!(cache.get_or_detect(1, &stale, &config).is_empty());
    }

    #[test]
    fn wraps_heading_across_pi() {
        let points = [(0.0, 0.0), (-1.0, 0.01), (-2.0, -0.01)];
        let curvature = signed_curvature(&points);
        assert!(curvature[1].abs() < 0.1);
    }

    #[test]
    fn merge_bridges_small_gaps_only() {
        let strong = [true, true, false, false, true, true, false, false, false, true];
        assert_eq!(merge_runs(&strong, 2, 1), vec![(0, 5), (9, 9)]);
        assert_eq!(merge_runs(&strong, 2, 3), vec![(0, 5)]);
    }

    #[test]
    fn trailing_mean_warms_up() {
        assert_eq!(trailing_mean(&[3.0, 3.0, 6.0], 2), vec![3.0, 3.0, 4.5]);
    }
}
