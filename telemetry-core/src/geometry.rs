// Distance geometry: cumulative distance, start gate and distance resampling.
// Invariants: pure functions; length-mismatched or empty inputs yield `None`, never a guess.

use crate::constants::{DEGENERATE_DISTANCE_EPS, START_GATE_HALF_LEN, START_GATE_LOOKAHEAD};
use crate::model::StartGate;

/// Running 2D (x, z) path length, starting at 0.
pub fn cumulative_distance(points: &[(f64, f64)]) -> Vec<f64> {
    let mut out = Vec::with_capacity(points.len());
    let mut total = 0.0;
    for (idx, point) in points.iter().enumerate() {
        if idx > 0 {
            let prev = points[idx - 1];
            total += ((point.0 - prev.0).powi(2) + (point.1 - prev.1).powi(2)).sqrt();
        }
        out.push(total);
    }
    out
}

/// Visual start marker: a fixed-length segment through point 0, perpendicular to the
/// direction from point 0 to point 5.
pub fn start_gate(points: &[(f64, f64)]) -> Option<StartGate> {
    if points.len() <= START_GATE_LOOKAHEAD {
        return None;
    }
    let origin = points[0];
    let ahead = points[START_GATE_LOOKAHEAD];
    let (dx, dz) = (ahead.0 - origin.0, ahead.1 - origin.1);
    let norm = (dx * dx + dz * dz).sqrt();
    if norm <= DEGENERATE_DISTANCE_EPS {
        return None;
    }
    let (fx, fz) = (dx / norm, dz / norm);
    let (nx, nz) = (-fz, fx);
    Some(StartGate {
        a: (origin.0 - nx * START_GATE_HALF_LEN, origin.1 - nz * START_GATE_HALF_LEN),
        b: (origin.0 + nx * START_GATE_HALF_LEN, origin.1 + nz * START_GATE_HALF_LEN),
    })
}

/// `n` evenly distance-spaced values by linear interpolation between bracketing source points.
/// A zero-length path yields `n` copies of the first value.
pub fn resample_by_distance(values: &[f64], cumdist: &[f64], n: usize) -> Option<Vec<f64>> {
    if values.is_empty() || values.len() != cumdist.len() {
        return None;
    }

    let start = cumdist[0];
    let total = cumdist[cumdist.len() - 1] - start;
    if total <= DEGENERATE_DISTANCE_EPS {
        return Some(vec![values[0]; n]);
    }

    let last = cumdist.len() - 1;
    let mut out = Vec::with_capacity(n);
    let mut j = 0usize;
    for i in 0..n {
        let target = if n == 1 {
            start
        } else {
            start + total * i as f64 / (n - 1) as f64
        };
        while j + 1 < last && cumdist[j + 1] < target {
            j += 1;
        }
        out.push(lerp_segment(values, cumdist, j, target));
    }
    Some(out)
}

pub fn resample_points_by_distance(
    points: &[(f64, f64)],
    cumdist: &[f64],
    n: usize,
) -> Option<Vec<(f64, f64)>> {
    let xs: Vec<f64> = points.iter().map(|point| point.0).collect();
    let zs: Vec<f64> = points.iter().map(|point| point.1).collect();
    let xs = resample_by_distance(&xs, cumdist, n)?;
    let zs = resample_by_distance(&zs, cumdist, n)?;
    Some(xs.into_iter().zip(zs).collect())
}

/// Value at an arbitrary distance along the path, clamped to the path ends.
pub fn interpolate_at(values: &[f64], cumdist: &[f64], target: f64) -> Option<f64> {
    if values.is_empty() || values.len() != cumdist.len() {
        return None;
    }
    if values.len() == 1 {
        return Some(values[0]);
    }
    let last = cumdist.len() - 1;
    let upper = cumdist.partition_point(|d| *d < target).clamp(1, last);
    Some(lerp_segment(values, cumdist, upper - 1, target))
}

/// Bin positions (meters from lap start) of an `n`-point distance axis.
pub fn distance_axis(total: f64, n: usize) -> Vec<f64> {
    match n {
        0 => Vec::new(),
        1 => vec![0.0],
        _ => (0..n)
            .map(|i| total * i as f64 / (n - 1) as f64)
            .collect(),
    }
}

fn lerp_segment(values: &[f64], cumdist: &[f64], j: usize, target: f64) -> f64 {
    let Some(&d1) = cumdist.get(j + 1) else {
        return values[j];
    };
    let d0 = cumdist[j];
    let span = d1 - d0;
    if span <= DEGENERATE_DISTANCE_EPS {
        return values[j];
    }
    let frac = ((target - d0) / span).clamp(0.0, 1.0);
    values[j] + (values[j + 1] - values[j]) * frac
}
