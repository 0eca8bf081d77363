// src/skeleton.rs - Centerline reconstruction from a labeled object

use std::collections::HashSet;
use std::ops::Range;

use nalgebra::Vector3;

use crate::image_utils::{binarize_half_max, gaussian_smooth, upscale_nearest, SubVolume, FOREGROUND};
use crate::notify::{ProgressSink, Severity};
use crate::objects::{CenterlinePath, ReconstructedObject, SkeletonQuality};
use crate::voxel_grid::VoxelGrid;

/// Integer position inside a sub-volume
pub type LatticePoint = [i64; 3];

/// Largest squared lattice step still considered adjacent (corner neighbour)
const MAX_CHAIN_STEP_SQ: i64 = 3;

/// Branch statistics of one skeleton tree
#[derive(Debug, Clone, PartialEq)]
pub struct TreeStats {
    pub branch_count: usize,
    pub average_branch_length: f64,
}

/// Output of a thinning + shortest-path run
#[derive(Debug, Clone, Default)]
pub struct SkeletonAnalysis {
    /// One entry per disjoint tree
    pub trees: Vec<TreeStats>,
    /// Shortest-path points of the tree holding the longest path, any order
    pub longest_path: Vec<LatticePoint>,
    /// Where the reported path starts
    pub path_start: Option<LatticePoint>,
    /// Junction voxels of the skeleton
    pub junctions: Vec<LatticePoint>,
}

/// Thinning and shortest-path collaborator, treated as an opaque oracle
pub trait SkeletonOracle: Send + Sync {
    fn analyze(&self, volume: &SubVolume) -> SkeletonAnalysis;
}

/// Parameters of the skeleton stage
#[derive(Debug, Clone)]
pub struct SkeletonParams {
    /// Lateral Gaussian sigma in original pixels
    pub sigma_xy: f64,
    /// Axial Gaussian sigma in original slices
    pub sigma_z: f64,
    pub upscale_factor: usize,
    pub landmark_channel: Option<usize>,
    /// Radius of the landmark integration sphere, calibrated
    pub landmark_radius: f64,
}

impl Default for SkeletonParams {
    fn default() -> Self {
        Self {
            sigma_xy: 1.0,
            sigma_z: 1.0,
            upscale_factor: 3,
            landmark_channel: None,
            landmark_radius: 3.0,
        }
    }
}

/// What the skeleton stage produced for one object
#[derive(Debug, Clone)]
pub struct SkeletonResult {
    pub quality: SkeletonQuality,
    pub centerline: Option<CenterlinePath>,
    pub trees: Vec<TreeStats>,
}

impl SkeletonResult {
    fn failed(quality: SkeletonQuality, trees: Vec<TreeStats>) -> Self {
        Self {
            quality,
            centerline: None,
            trees,
        }
    }
}

/// Placement of a (possibly upscaled) sub-volume inside the grid
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SubVolumePlacement {
    /// Grid coordinate of sub-volume voxel (0, 0, 0) before upscaling
    pub origin: [i64; 3],
    pub factors: [usize; 3],
}

impl SubVolumePlacement {
    /// Fractional grid coordinates of an upscaled lattice point
    pub fn to_grid(&self, p: &LatticePoint) -> [f64; 3] {
        let mut out = [0.0; 3];
        for axis in 0..3 {
            let f = self.factors[axis] as f64;
            out[axis] = self.origin[axis] as f64 + (p[axis] as f64 + 0.5) / f - 0.5;
        }
        out
    }
}

/// Padded binary volume around an object, before upscaling
pub fn build_sub_volume(
    object: &ReconstructedObject,
    params: &SkeletonParams,
) -> Option<(SubVolume, SubVolumePlacement)> {
    let first = object.points.first()?;
    let mut min = [first.coord.x, first.coord.y, first.coord.z];
    let mut max = min;
    for p in &object.points {
        let c = [p.coord.x, p.coord.y, p.coord.z];
        for axis in 0..3 {
            min[axis] = min[axis].min(c[axis]);
            max[axis] = max[axis].max(c[axis]);
        }
    }

    let multi_slice = max[2] > min[2];
    let margin_xy = (3.0 * params.sigma_xy.max(0.0)).ceil() as usize + 1;
    let margin_z = if multi_slice {
        (3.0 * params.sigma_z.max(0.0)).ceil() as usize + 1
    } else {
        0
    };
    let margin = [margin_xy, margin_xy, margin_z];

    let factor = params.upscale_factor.max(1);
    let placement = SubVolumePlacement {
        origin: [
            min[0] as i64 - margin[0] as i64,
            min[1] as i64 - margin[1] as i64,
            min[2] as i64 - margin[2] as i64,
        ],
        factors: [factor, factor, if multi_slice { factor } else { 1 }],
    };

    let mut volume = SubVolume::new(
        max[0] - min[0] + 1 + 2 * margin[0],
        max[1] - min[1] + 1 + 2 * margin[1],
        max[2] - min[2] + 1 + 2 * margin[2],
    );
    for p in &object.points {
        volume.set(
            p.coord.x - min[0] + margin[0],
            p.coord.y - min[1] + margin[1],
            p.coord.z - min[2] + margin[2],
            FOREGROUND,
        );
    }

    Some((volume, placement))
}

#[inline]
fn distance_sq(a: &LatticePoint, b: &LatticePoint) -> i64 {
    (a[0] - b[0]).pow(2) + (a[1] - b[1]).pow(2) + (a[2] - b[2]).pow(2)
}

/// Order unordered shortest-path points into one chain.
///
/// Starts at `start` and repeatedly appends the nearest remaining point,
/// first found on ties. When the nearest point is farther than a corner
/// step, chaining stops if everything left is a junction voxel and
/// otherwise continues through the gap.
pub fn order_centerline(
    points: &[LatticePoint],
    start: LatticePoint,
    junctions: &[LatticePoint],
) -> Vec<LatticePoint> {
    let mut seen = HashSet::new();
    seen.insert(start);
    let mut remaining: Vec<LatticePoint> = points.iter().copied().filter(|p| seen.insert(*p)).collect();
    let junctions: HashSet<LatticePoint> = junctions.iter().copied().collect();

    let mut chain = Vec::with_capacity(remaining.len() + 1);
    chain.push(start);

    while !remaining.is_empty() {
        let last = chain[chain.len() - 1];
        let mut best_idx = 0;
        let mut best_dist = i64::MAX;
        for (idx, p) in remaining.iter().enumerate() {
            let d = distance_sq(&last, p);
            if d < best_dist {
                best_idx = idx;
                best_dist = d;
            }
        }

        if best_dist > MAX_CHAIN_STEP_SQ && remaining.iter().all(|p| junctions.contains(p)) {
            // Leftovers are pruning artifacts
            break;
        }
        chain.push(remaining.remove(best_idx));
    }

    chain
}

/// Sum of `channel` inside a sphere around a calibrated position
pub fn landmark_intensity(
    grid: &VoxelGrid,
    channel: usize,
    frame: usize,
    center: &Vector3<f64>,
    radius: f64,
) -> f64 {
    let cal = grid.calibration();
    let lo = cal.to_lattice(&(center - Vector3::repeat(radius)));
    let hi = cal.to_lattice(&(center + Vector3::repeat(radius)));

    let clamped = |lo: f64, hi: f64, len: usize| -> Range<usize> {
        let start = lo.floor().max(0.0) as usize;
        let end = (hi.ceil() + 1.0).clamp(0.0, len as f64) as usize;
        start..end.max(start)
    };

    let mut sum = 0.0;
    for z in clamped(lo.2, hi.2, grid.depth()) {
        for y in clamped(lo.1, hi.1, grid.height()) {
            for x in clamped(lo.0, hi.0, grid.width()) {
                let p = cal.to_physical(x as f64, y as f64, z as f64);
                if (p - center).norm() <= radius {
                    sum += grid.get(x, y, z, frame, channel) as f64;
                }
            }
        }
    }
    sum
}

/// Reconstruct the ordered, calibrated centerline of one object.
///
/// Failures to find exactly one skeleton tree are reported through the
/// returned quality flag; they are not errors.
pub fn reconstruct_skeleton(
    object: &ReconstructedObject,
    grid: &VoxelGrid,
    params: &SkeletonParams,
    oracle: &dyn SkeletonOracle,
    sink: &dyn ProgressSink,
) -> SkeletonResult {
    if !object.is_single_frame() {
        sink.notify(
            &format!(
                "Object {} mixes time indices; using frame {}",
                object.id,
                object.frame()
            ),
            Severity::Warning,
        );
    }
    let frame = object.frame();

    let Some((volume, placement)) = build_sub_volume(object, params) else {
        return SkeletonResult::failed(SkeletonQuality::NoTree, Vec::new());
    };

    let [fx, fy, fz] = placement.factors;
    let upscaled = upscale_nearest(&volume, fx, fy, fz);
    let sigma_z = if fz > 1 { params.sigma_z * fz as f64 } else { 0.0 };
    let smoothed = gaussian_smooth(&upscaled, params.sigma_xy * fx as f64, sigma_z);
    let binary = binarize_half_max(&smoothed);

    let analysis = oracle.analyze(&binary);
    match analysis.trees.len() {
        0 => return SkeletonResult::failed(SkeletonQuality::NoTree, analysis.trees),
        1 => {}
        n => {
            log::debug!("Object {}: {} skeleton trees, no centerline", object.id, n);
            return SkeletonResult::failed(SkeletonQuality::MultipleTrees, analysis.trees);
        }
    }

    let Some(start) = analysis.path_start.or_else(|| analysis.longest_path.first().copied()) else {
        return SkeletonResult::failed(SkeletonQuality::NoTree, analysis.trees);
    };

    let ordered = order_centerline(&analysis.longest_path, start, &analysis.junctions);
    let cal = grid.calibration();
    let points: Vec<Vector3<f64>> = ordered
        .iter()
        .map(|p| {
            let [x, y, z] = placement.to_grid(p);
            cal.to_physical(x, y, z)
        })
        .collect();

    let Some(mut path) = CenterlinePath::new(points) else {
        return SkeletonResult::failed(SkeletonQuality::TooShort, analysis.trees);
    };

    if let Some(channel) = params.landmark_channel {
        if grid.check_channel(channel).is_ok() {
            let at_first = landmark_intensity(grid, channel, frame, path.first(), params.landmark_radius);
            let at_last = landmark_intensity(grid, channel, frame, path.last(), params.landmark_radius);
            if at_last > at_first {
                path = path.reversed();
            }
        } else {
            sink.notify(
                &format!("Landmark channel {} unavailable; keeping reported start", channel),
                Severity::Warning,
            );
        }
    }

    SkeletonResult {
        quality: SkeletonQuality::Available,
        centerline: Some(path),
        trees: analysis.trees,
    }
}
