// src/geometry.rs - Windowed tangents, signed curvature and global descriptors

use nalgebra::Vector3;
use serde::Serialize;

use crate::objects::CenterlinePath;
use crate::skeleton::TreeStats;

/// Centerline descriptors of one object, in calibrated units
#[derive(Debug, Clone, Serialize)]
pub struct GeometrySummary {
    pub arc_length: f64,
    pub chord_length: f64,
    /// Last point minus first point
    pub orientation: Vector3<f64>,
    /// Arc length over chord; `None` for a closed path
    pub bending_index: Option<f64>,
    pub mean_abs_curvature: f64,
    pub max_abs_curvature: f64,
    pub branch_count: Option<usize>,
    pub average_branch_length: Option<f64>,
}

/// Window bounds around point `i` for a reference distance `d`.
///
/// `i2` is the farthest forward index within `d` of arc length; `i1` is the
/// nearest backward index at least `d` away, or 0.
pub fn tangent_window(arc: &[f64], i: usize, d: f64) -> (usize, usize) {
    let n = arc.len();

    let mut i2 = i;
    while i2 + 1 < n && arc[i2 + 1] - arc[i] <= d {
        i2 += 1;
    }

    let mut i1 = i;
    while i1 > 0 && arc[i] - arc[i1] < d {
        i1 -= 1;
    }

    (i1, i2)
}

fn normalize_or_zero(v: Vector3<f64>) -> Vector3<f64> {
    let norm = v.norm();
    if norm > 0.0 {
        v / norm
    } else {
        Vector3::zeros()
    }
}

/// Unit tangent at every point of the path
pub fn calculate_tangents(path: &CenterlinePath, d: f64) -> Vec<Vector3<f64>> {
    let points = path.points();
    let arc = path.arc_length();
    let n = points.len();

    (0..n)
        .map(|i| {
            let (mut i1, mut i2) = tangent_window(arc, i, d);
            if i1 == i2 {
                // Window collapsed, use the immediate neighbours
                i1 = i.saturating_sub(1);
                i2 = (i + 1).min(n - 1);
            }
            normalize_or_zero(points[i2] - points[i1])
        })
        .collect()
}

/// Signed curvature at every point from the tangents at the window bounds
pub fn calculate_curvature(path: &CenterlinePath, tangents: &[Vector3<f64>], d: f64) -> Vec<f64> {
    let arc = path.arc_length();

    (0..arc.len())
        .map(|i| {
            let (i1, i2) = tangent_window(arc, i, d);
            let al = arc[i2] - arc[i1];
            if al <= 0.0 {
                return 0.0;
            }
            let t1 = tangents[i1];
            let t2 = tangents[i2];
            let turn = t2.cross(&t1).z;
            if turn == 0.0 {
                // No turn about z, e.g. bending in an x-z or y-z plane
                return 0.0;
            }
            turn.signum() * (t2 - t1).norm() / (2.0 * al)
        })
        .collect()
}

/// Fill in tangents and curvature of a path
pub fn apply_geometry(path: &mut CenterlinePath, d: f64) {
    let tangents = calculate_tangents(path, d);
    let curvature = calculate_curvature(path, &tangents, d);
    path.tangents = tangents;
    path.curvature = curvature;
}

/// Global descriptors of a path whose geometry has been applied
pub fn summarize_geometry(path: &CenterlinePath, trees: &[TreeStats]) -> GeometrySummary {
    let orientation = path.last() - path.first();
    let chord_length = orientation.norm();
    let arc_length = path.total_length();

    let abs: Vec<f64> = path.curvature.iter().map(|k| k.abs()).collect();
    let mean_abs_curvature = if abs.is_empty() {
        0.0
    } else {
        abs.iter().sum::<f64>() / abs.len() as f64
    };
    let max_abs_curvature = abs.iter().fold(0.0f64, |a, &b| a.max(b));

    let tree = trees.first();

    GeometrySummary {
        arc_length,
        chord_length,
        orientation,
        bending_index: (chord_length > 0.0).then(|| arc_length / chord_length),
        mean_abs_curvature,
        max_abs_curvature,
        branch_count: tree.map(|t| t.branch_count),
        average_branch_length: tree.map(|t| t.average_branch_length),
    }
}
