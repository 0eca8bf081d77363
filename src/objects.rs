// src/objects.rs - Value types shared by the reconstruction stages

use nalgebra::Vector3;
use serde::Serialize;

use crate::geometry::GeometrySummary;
use crate::shape_analysis::ShapeMetrics;
use crate::voxel_grid::VoxelCoordinate;

/// Number of background 6-neighbours of a voxel, split by face normal
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ExposedFaces {
    pub x: u8,
    pub y: u8,
    pub z: u8,
}

/// One voxel of a reconstructed object
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ObjectPoint {
    pub coord: VoxelCoordinate,
    pub intensity: f32,
    pub faces: ExposedFaces,
}

/// Outcome of the skeleton stage for one object
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SkeletonQuality {
    NotAttempted,
    Available,
    /// The thinning step produced nothing usable
    NoTree,
    /// More than one disjoint tree; no reliable centerline
    MultipleTrees,
    /// Fewer than two distinct points after ordering
    TooShort,
}

/// Per-channel intensity along a centerline
#[derive(Debug, Clone, Serialize)]
pub struct ChannelProfile {
    pub channel: usize,
    /// One sample per centerline point
    pub samples: Vec<f64>,
    /// Samples divided by the reconstruction channel, when requested
    pub normalized: Option<Vec<f64>>,
    /// Samples redistributed onto a fixed arc-length step
    pub resampled: Vec<f64>,
    pub step: f64,
    pub threshold: Option<f64>,
    pub colocalized_length: Option<f64>,
    pub colocalized_percentage: Option<f64>,
}

/// Ordered centerline in calibrated coordinates.
///
/// Arc length is strictly increasing; the first point is the base of the
/// structure once directionality has been resolved.
#[derive(Debug, Clone, Serialize)]
pub struct CenterlinePath {
    points: Vec<Vector3<f64>>,
    arc_length: Vec<f64>,
    pub tangents: Vec<Vector3<f64>>,
    pub curvature: Vec<f64>,
    pub profiles: Vec<ChannelProfile>,
}

impl CenterlinePath {
    /// Build a path, dropping points that repeat their predecessor.
    /// Returns `None` when fewer than two distinct points remain.
    pub fn new(points: Vec<Vector3<f64>>) -> Option<Self> {
        let mut kept: Vec<Vector3<f64>> = Vec::with_capacity(points.len());
        let mut arc_length = Vec::with_capacity(points.len());

        for p in points {
            match kept.last() {
                None => {
                    kept.push(p);
                    arc_length.push(0.0);
                }
                Some(prev) => {
                    let step = (p - prev).norm();
                    if step > 0.0 {
                        let total = arc_length[arc_length.len() - 1] + step;
                        kept.push(p);
                        arc_length.push(total);
                    }
                }
            }
        }

        if kept.len() < 2 {
            return None;
        }

        Some(Self {
            points: kept,
            arc_length,
            tangents: Vec::new(),
            curvature: Vec::new(),
            profiles: Vec::new(),
        })
    }

    pub fn points(&self) -> &[Vector3<f64>] {
        &self.points
    }

    pub fn arc_length(&self) -> &[f64] {
        &self.arc_length
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn total_length(&self) -> f64 {
        self.arc_length[self.arc_length.len() - 1]
    }

    pub fn first(&self) -> &Vector3<f64> {
        &self.points[0]
    }

    pub fn last(&self) -> &Vector3<f64> {
        &self.points[self.points.len() - 1]
    }

    /// Flip the direction. Derived per-point data is cleared.
    pub fn reversed(mut self) -> Self {
        let total = self.total_length();
        self.points.reverse();
        self.arc_length = self.arc_length.iter().rev().map(|a| total - a).collect();
        self.tangents.clear();
        self.curvature.clear();
        self.profiles.clear();
        self
    }
}

/// Fraction of an object's voxels above an auxiliary channel threshold
#[derive(Debug, Clone, Serialize)]
pub struct ChannelColocalization {
    pub channel: usize,
    pub mean_intensity: f64,
    pub threshold: f64,
    pub colocalized_fraction: f64,
}

/// One connected component and everything measured on it
#[derive(Debug, Clone, Serialize)]
pub struct ReconstructedObject {
    pub id: usize,
    pub channel: usize,
    pub points: Vec<ObjectPoint>,
    pub shape: Option<ShapeMetrics>,
    pub colocalization: Vec<ChannelColocalization>,
    pub skeleton: SkeletonQuality,
    pub centerline: Option<CenterlinePath>,
    pub geometry: Option<GeometrySummary>,
    /// Failed the border policy: kept for display, skipped in aggregation
    pub excluded: bool,
}

impl ReconstructedObject {
    pub fn new(id: usize, channel: usize, points: Vec<ObjectPoint>) -> Self {
        Self {
            id,
            channel,
            points,
            shape: None,
            colocalization: Vec::new(),
            skeleton: SkeletonQuality::NotAttempted,
            centerline: None,
            geometry: None,
            excluded: false,
        }
    }

    pub fn voxel_count(&self) -> usize {
        self.points.len()
    }

    pub fn skeleton_available(&self) -> bool {
        self.skeleton == SkeletonQuality::Available && self.centerline.is_some()
    }

    /// Frame of the first point
    pub fn frame(&self) -> usize {
        self.points.first().map(|p| p.coord.t).unwrap_or(0)
    }

    /// True if all points share a single time index
    pub fn is_single_frame(&self) -> bool {
        let t = self.frame();
        self.points.iter().all(|p| p.coord.t == t)
    }
}
