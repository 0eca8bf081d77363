// src/shape_analysis.rs - Volume, surface and shape descriptors of labeled objects

use std::collections::BTreeMap;
use std::f64::consts::PI;

use nalgebra::Vector3;
use serde::{Deserialize, Serialize};

use crate::objects::{ChannelColocalization, ReconstructedObject};
use crate::threshold::ThresholdTable;
use crate::voxel_grid::{Calibration, VoxelGrid};

/// Which grid borders disqualify an object from aggregation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BorderExclusion {
    None,
    /// Touching the lateral (x/y) boundary
    Xy,
    /// Touching the lateral boundary or the first/last slice
    XyZ,
    /// Touching the lateral boundary, or the most populated slice is a boundary slice
    XyDominantZ,
}

/// Integer bounding box of an object, inclusive
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BoundingBox {
    pub min: [usize; 3],
    pub max: [usize; 3],
}

impl BoundingBox {
    /// Number of voxels spanned along each axis
    pub fn span(&self) -> [usize; 3] {
        [
            self.max[0] - self.min[0] + 1,
            self.max[1] - self.min[1] + 1,
            self.max[2] - self.min[2] + 1,
        ]
    }
}

/// Scalar shape descriptors of one object, in calibrated units
#[derive(Debug, Clone, Serialize)]
pub struct ShapeMetrics {
    pub voxel_count: usize,
    pub volume: f64,
    pub surface: f64,
    pub centroid: Vector3<f64>,
    pub bounding_box: BoundingBox,
    /// Calibrated extent along x, y and z
    pub extent: Vector3<f64>,
    pub sphere_radius: f64,
    pub shape_complexity: f64,
    pub min_intensity: f64,
    pub max_intensity: f64,
    pub mean_intensity: f64,
}

/// Radius of the sphere with the given volume
pub fn sphere_equivalent_radius(volume: f64) -> f64 {
    (3.0 * volume / (4.0 * PI)).cbrt()
}

/// Surface relative to the sphere of equal volume; 1.0 for a sphere.
/// Returns NaN for a zero volume.
pub fn shape_complexity_index(volume: f64, surface: f64) -> f64 {
    let radius = sphere_equivalent_radius(volume);
    let sphere_surface = 4.0 * PI * radius * radius;
    if sphere_surface <= 0.0 {
        return f64::NAN;
    }
    surface / sphere_surface
}

/// Calculate shape descriptors of a labeled object.
/// Returns `None` for an object without points.
pub fn calculate_shape_metrics(
    object: &ReconstructedObject,
    calibration: &Calibration,
) -> Option<ShapeMetrics> {
    let first = object.points.first()?;

    let mut min = [first.coord.x, first.coord.y, first.coord.z];
    let mut max = min;
    let mut sum = Vector3::zeros();
    let mut surface = 0.0;
    let mut min_intensity = f64::INFINITY;
    let mut max_intensity = f64::NEG_INFINITY;
    let mut sum_intensity = 0.0;

    for point in &object.points {
        let c = [point.coord.x, point.coord.y, point.coord.z];
        for axis in 0..3 {
            min[axis] = min[axis].min(c[axis]);
            max[axis] = max[axis].max(c[axis]);
        }
        sum += point.coord.calibrated(calibration);

        surface += point.faces.x as f64 * calibration.x_face_area()
            + point.faces.y as f64 * calibration.y_face_area()
            + point.faces.z as f64 * calibration.z_face_area();

        let intensity = point.intensity as f64;
        min_intensity = min_intensity.min(intensity);
        max_intensity = max_intensity.max(intensity);
        sum_intensity += intensity;
    }

    let n = object.points.len();
    let volume = n as f64 * calibration.voxel_volume();
    let bounding_box = BoundingBox { min, max };
    let span = bounding_box.span();

    Some(ShapeMetrics {
        voxel_count: n,
        volume,
        surface,
        centroid: sum / n as f64,
        bounding_box,
        extent: calibration.to_physical(span[0] as f64, span[1] as f64, span[2] as f64),
        sphere_radius: sphere_equivalent_radius(volume),
        shape_complexity: shape_complexity_index(volume, surface),
        min_intensity,
        max_intensity,
        mean_intensity: sum_intensity / n as f64,
    })
}

/// Slice holding the most object voxels (lowest index on ties)
pub fn dominant_slice(object: &ReconstructedObject) -> Option<usize> {
    let mut per_slice: BTreeMap<usize, usize> = BTreeMap::new();
    for point in &object.points {
        *per_slice.entry(point.coord.z).or_insert(0) += 1;
    }
    let mut best: Option<(usize, usize)> = None;
    for (z, count) in per_slice {
        if best.map_or(true, |(_, c)| count > c) {
            best = Some((z, count));
        }
    }
    best.map(|(z, _)| z)
}

/// Decide whether an object touches a border under the given policy
pub fn touches_border(object: &ReconstructedObject, grid: &VoxelGrid, mode: BorderExclusion) -> bool {
    if mode == BorderExclusion::None {
        return false;
    }

    let lateral = object.points.iter().any(|p| grid.on_lateral_border(&p.coord));
    if lateral {
        return true;
    }

    match mode {
        BorderExclusion::None | BorderExclusion::Xy => false,
        BorderExclusion::XyZ => {
            grid.depth() > 1
                && object
                    .points
                    .iter()
                    .any(|p| grid.is_axial_border_slice(p.coord.z))
        }
        BorderExclusion::XyDominantZ => {
            grid.depth() > 1
                && dominant_slice(object).map_or(false, |z| grid.is_axial_border_slice(z))
        }
    }
}

/// Colocalization of an object's voxels with each thresholded auxiliary channel
pub fn calculate_colocalization(
    object: &ReconstructedObject,
    grid: &VoxelGrid,
    thresholds: &ThresholdTable,
) -> Vec<ChannelColocalization> {
    let n = object.points.len();
    if n == 0 {
        return Vec::new();
    }

    thresholds
        .iter()
        .map(|(channel, threshold)| {
            let mut sum = 0.0;
            let mut above = 0usize;
            for point in &object.points {
                let value = grid.get_at(&point.coord, channel) as f64;
                sum += value;
                if value > threshold {
                    above += 1;
                }
            }
            ChannelColocalization {
                channel,
                mean_intensity: sum / n as f64,
                threshold,
                colocalized_fraction: above as f64 / n as f64,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::labeling::{label_components, Connectivity, LabelingParams};
    use assert_approx_eq::assert_approx_eq;

    fn label(grid: &mut VoxelGrid) -> Vec<ReconstructedObject> {
        let params = LabelingParams {
            channel: 0,
            connectivity: Connectivity::FaceOnly,
            min_size: 1,
            timelapse: false,
        };
        label_components(grid, &params).unwrap()
    }

    fn calibration(lateral: f64, axial: f64) -> Calibration {
        Calibration {
            pixel_width: lateral,
            pixel_height: lateral,
            voxel_depth: axial,
            ..Calibration::default()
        }
    }

    #[test]
    fn complexity_is_one_for_ideal_sphere() {
        let r: f64 = 2.5;
        let volume = 4.0 / 3.0 * PI * r.powi(3);
        let surface = 4.0 * PI * r * r;
        assert_approx_eq!(sphere_equivalent_radius(volume), r, 1e-12);
        assert_approx_eq!(shape_complexity_index(volume, surface), 1.0, 1e-12);
    }

    #[test]
    fn complexity_is_nan_without_volume() {
        assert!(shape_complexity_index(0.0, 0.0).is_nan());
    }

    #[test]
    fn single_voxel_metrics_use_anisotropic_calibration() {
        let mut grid = VoxelGrid::new(3, 3, 3, 1, 1, calibration(0.5, 2.0)).unwrap();
        grid.set(1, 1, 1, 0, 0, 10.0);
        let objects = label(&mut grid);
        let metrics = calculate_shape_metrics(&objects[0], grid.calibration()).unwrap();

        assert_approx_eq!(metrics.volume, 0.5 * 0.5 * 2.0);
        // 4 lateral faces of 0.5 x 2.0, 2 axial faces of 0.5 x 0.5
        assert_approx_eq!(metrics.surface, 4.0 * 1.0 + 2.0 * 0.25);
        assert_approx_eq!(metrics.centroid.z, 2.0);
        assert_approx_eq!(metrics.extent.z, 2.0);
    }

    #[test]
    fn filament_is_more_complex_than_compact_blob() {
        let mut filament = VoxelGrid::new(3, 3, 30, 1, 1, Calibration::default()).unwrap();
        for z in 1..29 {
            filament.set(1, 1, z, 0, 0, 1.0);
        }
        let mut blob = VoxelGrid::new(7, 7, 7, 1, 1, Calibration::default()).unwrap();
        for x in 1..4 {
            for y in 1..4 {
                for z in 1..4 {
                    blob.set(x, y, z, 0, 0, 1.0);
                }
            }
        }

        let f = calculate_shape_metrics(&label(&mut filament)[0], &Calibration::default()).unwrap();
        let b = calculate_shape_metrics(&label(&mut blob)[0], &Calibration::default()).unwrap();
        assert!(f.shape_complexity > 1.0);
        assert!(b.shape_complexity > 1.0);
        assert!(f.shape_complexity > b.shape_complexity);
    }

    #[test]
    fn border_policies() {
        let mut grid = VoxelGrid::new(5, 5, 4, 1, 1, Calibration::default()).unwrap();
        // Touches slice 0 only, lateral interior; most voxels on slice 1
        grid.set(2, 2, 0, 0, 0, 1.0);
        grid.set(2, 2, 1, 0, 0, 1.0);
        grid.set(2, 3, 1, 0, 0, 1.0);
        let objects = label(&mut grid);
        let object = &objects[0];

        assert!(!touches_border(object, &grid, BorderExclusion::None));
        assert!(!touches_border(object, &grid, BorderExclusion::Xy));
        assert!(touches_border(object, &grid, BorderExclusion::XyZ));
        assert!(!touches_border(object, &grid, BorderExclusion::XyDominantZ));
        assert_eq!(dominant_slice(object), Some(1));
    }

    #[test]
    fn lateral_border_always_excludes() {
        let mut grid = VoxelGrid::new(4, 4, 1, 1, 1, Calibration::default()).unwrap();
        grid.set(0, 2, 0, 0, 0, 1.0);
        let objects = label(&mut grid);
        assert!(touches_border(&objects[0], &grid, BorderExclusion::Xy));
        assert!(touches_border(&objects[0], &grid, BorderExclusion::XyDominantZ));
    }

    #[test]
    fn colocalization_fraction_counts_voxels_above_threshold() {
        let mut grid = VoxelGrid::new(4, 3, 1, 1, 2, Calibration::default()).unwrap();
        grid.set(1, 1, 0, 0, 0, 1.0);
        grid.set(2, 1, 0, 0, 0, 1.0);
        grid.set(1, 1, 0, 0, 1, 10.0);
        grid.set(2, 1, 0, 0, 1, 2.0);
        let objects = label(&mut grid);

        let mut table = ThresholdTable::default();
        table.insert(1, 5.0);
        let coloc = calculate_colocalization(&objects[0], &grid, &table);
        assert_eq!(coloc.len(), 1);
        assert_approx_eq!(coloc[0].colocalized_fraction, 0.5);
        assert_approx_eq!(coloc[0].mean_intensity, 6.0);
    }
}
