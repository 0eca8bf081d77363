// src/profile.rs - Channel intensities sampled along a centerline

use nalgebra::Vector3;

use crate::objects::{CenterlinePath, ChannelProfile};
use crate::threshold::ThresholdTable;
use crate::voxel_grid::VoxelGrid;

/// Which channels to profile and how
#[derive(Debug, Clone)]
pub struct ProfileParams {
    pub channels: Vec<usize>,
    /// Divide each sample by this channel's sample at the same position
    pub normalize_by: Option<usize>,
}

/// Intensity at a calibrated position.
///
/// Bilinear in x/y on the nearest slice; nearest neighbour, clamped into the
/// grid, when the bilinear footprint would leave it.
pub fn sample_intensity(grid: &VoxelGrid, channel: usize, frame: usize, position: &Vector3<f64>) -> f64 {
    let (lx, ly, lz) = grid.calibration().to_lattice(position);
    let clamp = |v: f64, len: usize| v.round().clamp(0.0, (len - 1) as f64) as usize;
    let z = clamp(lz, grid.depth());

    let x0 = lx.floor();
    let y0 = ly.floor();
    let inside = x0 >= 0.0
        && y0 >= 0.0
        && (x0 as usize) + 1 < grid.width()
        && (y0 as usize) + 1 < grid.height();

    if !inside {
        let x = clamp(lx, grid.width());
        let y = clamp(ly, grid.height());
        return grid.get(x, y, z, frame, channel) as f64;
    }

    let (x0, y0) = (x0 as usize, y0 as usize);
    let fx = lx - x0 as f64;
    let fy = ly - y0 as f64;
    let v = |x: usize, y: usize| grid.get(x, y, z, frame, channel) as f64;

    let top = v(x0, y0) * (1.0 - fx) + v(x0 + 1, y0) * fx;
    let bottom = v(x0, y0 + 1) * (1.0 - fx) + v(x0 + 1, y0 + 1) * fx;
    top * (1.0 - fy) + bottom * fy
}

/// Piecewise-linear interpolation of `values` at arc position `s`
fn interpolate(arc: &[f64], values: &[f64], s: f64) -> f64 {
    let last = arc.len() - 1;
    if s <= arc[0] {
        return values[0];
    }
    if s >= arc[last] {
        return values[last];
    }
    let upper = arc.partition_point(|a| *a <= s).min(last);
    let lower = upper - 1;
    let span = arc[upper] - arc[lower];
    if span <= 0.0 {
        return values[lower];
    }
    let f = (s - arc[lower]) / span;
    values[lower] * (1.0 - f) + values[upper] * f
}

/// Integral of the piecewise-linear profile over [lo, hi]
fn integrate(arc: &[f64], values: &[f64], lo: f64, hi: f64) -> f64 {
    let mut total = 0.0;
    for i in 0..arc.len() - 1 {
        let a = arc[i].max(lo);
        let b = arc[i + 1].min(hi);
        if b > a {
            total += (b - a) * (interpolate(arc, values, a) + interpolate(arc, values, b)) / 2.0;
        }
    }
    total
}

/// Redistribute a per-point profile onto bins of width `step`.
///
/// Bin `k` is centred at `k * step`; its value is the occupancy-weighted
/// mean of the profile over the part of the bin inside [0, L]. A bin with no
/// overlap takes the profile value at its clamped centre.
pub fn resample_profile(arc: &[f64], values: &[f64], step: f64) -> Vec<f64> {
    if arc.is_empty() || arc.len() != values.len() || step <= 0.0 {
        return Vec::new();
    }
    let total = arc[arc.len() - 1];
    let bins = (total / step).ceil() as usize + 1;

    (0..bins)
        .map(|k| {
            let centre = k as f64 * step;
            let lo = (centre - step / 2.0).max(0.0);
            let hi = (centre + step / 2.0).min(total);
            if hi > lo {
                integrate(arc, values, lo, hi) / (hi - lo)
            } else {
                interpolate(arc, values, centre.min(total))
            }
        })
        .collect()
}

/// Bins above `threshold` as (length, percentage of bins)
pub fn colocalized_extent(resampled: &[f64], step: f64, threshold: f64) -> (f64, f64) {
    if resampled.is_empty() {
        return (0.0, 0.0);
    }
    let above = resampled.iter().filter(|v| **v > threshold).count();
    (
        above as f64 * step,
        100.0 * above as f64 / resampled.len() as f64,
    )
}

/// Profile of one channel along a path
pub fn channel_profile(
    path: &CenterlinePath,
    grid: &VoxelGrid,
    frame: usize,
    channel: usize,
    normalize_by: Option<usize>,
    threshold: Option<f64>,
) -> ChannelProfile {
    let samples: Vec<f64> = path
        .points()
        .iter()
        .map(|p| sample_intensity(grid, channel, frame, p))
        .collect();

    let normalized = normalize_by.map(|reference| {
        path.points()
            .iter()
            .zip(samples.iter())
            .map(|(p, value)| {
                let denominator = sample_intensity(grid, reference, frame, p);
                if denominator == 0.0 {
                    0.0
                } else {
                    value / denominator
                }
            })
            .collect()
    });

    let step = grid.calibration().pixel_width;
    let resampled = resample_profile(path.arc_length(), &samples, step);
    let extent = threshold.map(|t| colocalized_extent(&resampled, step, t));

    ChannelProfile {
        channel,
        samples,
        normalized,
        resampled,
        step,
        threshold,
        colocalized_length: extent.map(|e| e.0),
        colocalized_percentage: extent.map(|e| e.1),
    }
}

/// Attach a profile for every available channel to the path
pub fn apply_profiles(
    path: &mut CenterlinePath,
    grid: &VoxelGrid,
    frame: usize,
    params: &ProfileParams,
    thresholds: &ThresholdTable,
) {
    let normalize_by = params
        .normalize_by
        .filter(|c| grid.check_channel(*c).is_ok());

    let profiles = params
        .channels
        .iter()
        .filter(|c| grid.check_channel(**c).is_ok())
        .map(|&channel| {
            channel_profile(path, grid, frame, channel, normalize_by, thresholds.get(channel))
        })
        .collect();
    path.profiles = profiles;
}
