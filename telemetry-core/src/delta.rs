// Cross-lap comparison on a shared distance axis.
// Invariants: every profile is `a - b` per bin; any series/distance length disagreement yields `None`.

use crate::constants::{
    BRAKE_ONSET_PCT, DEGENERATE_DISTANCE_EPS, ONSET_HOLD_BINS, ONSET_PAD_BINS, THROTTLE_ONSET_PCT,
};
use crate::geometry::{interpolate_at, resample_by_distance};
use crate::model::{CoachingRow, CornerSegment, LapData};

/// Onset detection thresholds for coaching rows.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CoachingConfig {
    pub brake_onset_pct: f64,
    pub throttle_onset_pct: f64,
    /// Consecutive bins the signal must stay at or above the threshold.
    pub hold_bins: usize,
    /// Bins searched before corner entry (brake) and after corner exit (throttle).
    pub pad_bins: usize,
}

impl Default for CoachingConfig {
    fn default() -> Self {
        Self {
            brake_onset_pct: BRAKE_ONSET_PCT,
            throttle_onset_pct: THROTTLE_ONSET_PCT,
            hold_bins: ONSET_HOLD_BINS,
            pad_bins: ONSET_PAD_BINS,
        }
    }
}

/// Elapsed-time difference in milliseconds per distance bin.
pub fn delta_profile_time_ms(a: &LapData, b: &LapData, n: usize) -> Option<Vec<f64>> {
    let n = n.max(2);
    let ta = resample_by_distance(&a.elapsed_s()?, &a.cumdist, n)?;
    let tb = resample_by_distance(&b.elapsed_s()?, &b.cumdist, n)?;
    Some(ta.iter().zip(&tb).map(|(ta, tb)| (ta - tb) * 1000.0).collect())
}

/// Speed difference in km/h per distance bin.
pub fn delta_profile_speed(a: &LapData, b: &LapData, n: usize) -> Option<Vec<f64>> {
    let n = n.max(2);
    let va = resample_by_distance(&a.speed_kmh()?, &a.cumdist, n)?;
    let vb = resample_by_distance(&b.speed_kmh()?, &b.cumdist, n)?;
    Some(va.iter().zip(&vb).map(|(va, vb)| va - vb).collect())
}

/// Three distance-equal sectors, timed by interpolating elapsed time at each split.
pub fn sector_times_ms(lap: &LapData) -> Option<[f64; 3]> {
    let elapsed = lap.elapsed_s()?;
    let total = lap.total_distance();
    if total <= DEGENERATE_DISTANCE_EPS {
        return None;
    }

    let at = |fraction: f64| interpolate_at(&elapsed, &lap.cumdist, total * fraction);
    let (t0, t1, t2, t3) = (at(0.0)?, at(1.0 / 3.0)?, at(2.0 / 3.0)?, at(1.0)?);
    Some([
        (t1 - t0) * 1000.0,
        (t2 - t1) * 1000.0,
        (t3 - t2) * 1000.0,
    ])
}

/// Time lost by `a` against `b` inside each corner: delta at exit minus delta at entry.
pub fn corner_time_losses_ms(
    corners: &[CornerSegment],
    a: &LapData,
    b: &LapData,
    n: usize,
) -> Option<Vec<f64>> {
    let delta = delta_profile_time_ms(a, b, n)?;
    Some(
        corners
            .iter()
            .map(|corner| {
                let (start, end) = clamp_window(corner, delta.len());
                delta[end] - delta[start]
            })
            .collect(),
    )
}

/// Per-corner coaching rows for `a` against `b`, largest time loss first.
pub fn corner_coaching_rows(
    corners: &[CornerSegment],
    a: &LapData,
    b: &LapData,
    n: usize,
    config: &CoachingConfig,
) -> Option<Vec<CoachingRow>> {
    let n = n.max(2);
    let losses = corner_time_losses_ms(corners, a, b, n)?;
    let a = ResampledLap::new(a, n)?;
    let b = ResampledLap::new(b, n)?;
    let hold = config.hold_bins.max(1);

    let mut rows: Vec<CoachingRow> = corners
        .iter()
        .zip(losses)
        .map(|(corner, loss_ms)| {
            let (start, end) = clamp_window(corner, n);
            let brake_lo = start.saturating_sub(config.pad_bins);
            let throttle_hi = (end + config.pad_bins).min(n - 1);

            let brake_start_delta_m = onset_delta_m(
                &a,
                &b,
                |lap| &lap.brake,
                brake_lo,
                end,
                config.brake_onset_pct,
                hold,
            );
            let throttle_on_delta_m = onset_delta_m(
                &a,
                &b,
                |lap| &lap.throttle,
                start,
                throttle_hi,
                config.throttle_onset_pct,
                hold,
            );

            CoachingRow {
                segment: *corner,
                loss_ms,
                brake_start_delta_m,
                throttle_on_delta_m,
                min_speed_delta_kmh: window_min(&a.speed, start, end)
                    - window_min(&b.speed, start, end),
                exit_speed_delta_kmh: a.speed[end] - b.speed[end],
            }
        })
        .collect();

    rows.sort_by(|x, y| y.loss_ms.total_cmp(&x.loss_ms));
    Some(rows)
}

/// First bin in `[lo, hi]` where `values` crosses up to `threshold` and stays there for `hold`
/// bins, all inside the window. A window that opens above the threshold counts its first bin as
/// the crossing.
pub fn first_onset(
    values: &[f64],
    lo: usize,
    hi: usize,
    threshold: f64,
    hold: usize,
) -> Option<usize> {
    let hold = hold.max(1);
    let hi = hi.min(values.len().checked_sub(1)?);
    (lo..=hi).find(|&idx| {
        let crossed = idx == lo || values[idx - 1] < threshold;
        crossed
            && idx + hold <= hi + 1
            && values
                .get(idx..idx + hold)
                .is_some_and(|run| run.iter().all(|value| *value >= threshold))
    })
}

struct ResampledLap {
    total: f64,
    speed: Vec<f64>,
    throttle: Vec<f64>,
    brake: Vec<f64>,
}

impl ResampledLap {
    fn new(lap: &LapData, n: usize) -> Option<Self> {
        Some(Self {
            total: lap.total_distance(),
            speed: resample_by_distance(&lap.speed_kmh()?, &lap.cumdist, n)?,
            throttle: resample_by_distance(&lap.throttle()?, &lap.cumdist, n)?,
            brake: resample_by_distance(&lap.brake()?, &lap.cumdist, n)?,
        })
    }

    fn distance_at(&self, idx: usize) -> f64 {
        let bins = self.speed.len();
        if bins < 2 {
            return 0.0;
        }
        self.total * idx as f64 / (bins - 1) as f64
    }
}

fn onset_delta_m<F>(
    a: &ResampledLap,
    b: &ResampledLap,
    signal: F,
    lo: usize,
    hi: usize,
    threshold: f64,
    hold: usize,
) -> Option<f64>
where
    F: Fn(&ResampledLap) -> &Vec<f64>,
{
    let onset_a = first_onset(signal(a), lo, hi, threshold, hold)?;
    let onset_b = first_onset(signal(b), lo, hi, threshold, hold)?;
    Some(a.distance_at(onset_a) - b.distance_at(onset_b))
}

fn clamp_window(corner: &CornerSegment, n: usize) -> (usize, usize) {
    let last = n.saturating_sub(1);
    let end = corner.end_idx.min(last);
    (corner.start_idx.min(end), end)
}

fn window_min(values: &[f64], start: usize, end: usize) -> f64 {
    values[start..=end]
        .iter()
        .copied()
        .fold(f64::INFINITY, f64::min)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::MIN_LAP_POINTS;
    use crate::corners::tests::{hairpin_points, lap_from_points};
    use crate::corners::{detect_corners, CornerConfig};
    use crate::model::VehicleSample;

    /// 101 points along a 1000 m straight; `shape` gives (timestamp_ms, speed, throttle, brake).
    fn straight_lap<F>(shape: F) -> LapData
    where
        F: Fn(usize) -> (u64, f32, f32, f32),
    {
        let samples = (0..=100)
            .map(|i| {
                let (timestamp_ms, speed_kmh, throttle, brake) = shape(i);
                VehicleSample {
                    timestamp_ms,
                    speed_kmh,
                    throttle,
                    brake,
                    x: 1.0 + i as f32 * 10.0,
                    z: 5.0,
                    ..VehicleSample::default()
                }
            })
            .collect();
        LapData::from_samples(1, samples, 60_000, MIN_LAP_POINTS).expect("lap")
    }

    #[test]
    fn identical_laps_lose_nothing_in_any_corner() {
        let lap = lap_from_points(1, &hairpin_points());
        let corners = detect_corners(&lap, &CornerConfig::default());
        assert!(!corners.is_empty());

        let losses = corner_time_losses_ms(&corners, &lap, &lap, 300).expect("losses");
        assert_eq!(losses.len(), corners.len());
        assert!(losses.iter().all(|loss| loss.abs() < 1e-9));
    }

    #[test]
    fn slower_lap_has_positive_time_delta() {
        let fast = straight_lap(|i| (i as u64 * 100, 100.0, 100.0, 0.0));
        let slow = straight_lap(|i| (i as u64 * 110, 90.0, 100.0, 0.0));

        let delta = delta_profile_time_ms(&slow, &fast, 11).expect("delta");
        assert_eq!(delta.len(), 11);
        assert!(delta[0].abs() < 1e-9);
        assert!((delta[10] - 1_000.0).abs() < 1e-6);

        let speed = delta_profile_speed(&slow, &fast, 11).expect("speed");
        assert!(speed.iter().all(|dv| (dv + 10.0).abs() < 1e-6));
    }

    #[test]
    fn mismatched_lap_yields_no_profile() {
        let good = straight_lap(|i| (i as u64 * 100, 100.0, 0.0, 0.0));
        let mut broken = good.clone();
        broken.cumdist.pop();
        assert!(delta_profile_time_ms(&good, &broken, 50).is_none());
        assert!(delta_profile_speed(&broken, &good, 50).is_none());
        assert!(sector_times_ms(&broken).is_none());
    }

    #[test]
    fn constant_pace_splits_into_equal_sectors() {
        let lap = straight_lap(|i| (i as u64 * 300, 120.0, 100.0, 0.0));
        let sectors = sector_times_ms(&lap).expect("sectors");
        for sector in sectors {
            assert!((sector - 10_000.0).abs() < 1e-6, "{sectors:?}");
        }
    }

    #[test]
    fn onset_requires_hold() {
        let values = [0.0, 50.0, 0.0, 50.0, 50.0, 50.0, 0.0];
        assert_eq!(first_onset(&values, 0, 6, 10.0, 3), Some(3));
        assert_eq!(first_onset(&values, 0, 6, 10.0, 1), Some(1));
        assert_eq!(first_onset(&values, 0, 6, 60.0, 1), None);
        assert_eq!(first_onset(&values, 4, 6, 10.0, 2), Some(4));
        assert_eq!(first_onset(&[], 0, 6, 10.0, 1), None);
    }

    #[test]
    fn onset_hold_stays_inside_window() {
        let values = [0.0, 0.0, 0.0, 50.0, 50.0, 50.0];
        assert_eq!(first_onset(&values, 0, 3, 10.0, 3), None);
        assert_eq!(first_onset(&values, 0, 5, 10.0, 3), Some(3));
        assert_eq!(first_onset(&values, 0, 4, 10.0, 2), Some(3));
    }

    #[test]
    fn coaching_rows_report_later_braking_and_sort_by_loss() {
        fn braking_lap(from_bin: usize) -> LapData {
            straight_lap(|i| {
                let brake: f32 = if (from_bin..from_bin + 20).contains(&i) { 80.0 } else { 0.0 };
                (i as u64 * 100, 150.0, 100.0 - brake, brake)
            })
        }
        let reference = braking_lap(40);
        let late = braking_lap(45);

        let corners = [
            CornerSegment {
                start_idx: 10,
                end_idx: 20,
                direction: 1,
                strength: 0.1,
            },
            CornerSegment {
                start_idx: 50,
                end_idx: 60,
                direction: -1,
                strength: 0.1,
            },
        ];
        let rows = corner_coaching_rows(&corners, &late, &reference, 101, &CoachingConfig::default())
            .expect("rows");
        assert_eq!(rows.len(), 2);
        assert!(rows[0].loss_ms >= rows[1].loss_ms);

        let braking = rows
            .iter()
            .find(|row| row.segment.start_idx == 50)
            .expect("second corner");
        let brake_delta = braking.brake_start_delta_m.expect("both laps brake");
        assert!((brake_delta - 50.0).abs() < 1e-6, "{brake_delta}");
        assert!(braking.min_speed_delta_kmh.abs() < 1e-9);
    }

    #[test]
    fn clamps_corner_window_to_axis() {
        let lap = straight_lap(|i| (i as u64 * 100, 100.0, 0.0, 0.0));
        let corner = CornerSegment {
            start_idx: 250,
            end_idx: 400,
            direction: 0,
            strength: 0.0,
        };
        let losses = corner_time_losses_ms(&[corner], &lap, &lap, 100).expect("losses");
        assert_eq!(losses, vec![0.0]);
    }
}
