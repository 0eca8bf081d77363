// src/pipeline.rs - One reconstruction pass over a volume

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};

use rayon::prelude::*;
use serde::Serialize;

use crate::config::Config;
use crate::errors::{CiliaError, Result};
use crate::geometry::{apply_geometry, summarize_geometry};
use crate::labeling::label_components;
use crate::notify::{ProgressSink, Severity};
use crate::objects::ReconstructedObject;
use crate::profile::{apply_profiles, ProfileParams};
use crate::shape_analysis::{calculate_colocalization, calculate_shape_metrics, touches_border};
use crate::skeleton::{reconstruct_skeleton, SkeletonOracle, SkeletonParams};
use crate::threshold::{estimate_thresholds, ThresholdTable};
use crate::timelapse::{build_entity, split_by_frame, TimelapseEntity};
use crate::voxel_grid::VoxelGrid;

/// Everything measured in one pass
#[derive(Debug, Clone, Default, Serialize)]
pub struct AnalysisResult {
    /// Single-frame objects; empty in timelapse mode
    pub objects: Vec<ReconstructedObject>,
    /// Tracked objects; empty unless timelapse mode is on
    pub entities: Vec<TimelapseEntity>,
    pub thresholds: ThresholdTable,
}

impl AnalysisResult {
    /// Every per-frame object, including the members of tracked entities
    pub fn all_objects(&self) -> impl Iterator<Item = &ReconstructedObject> {
        self.objects
            .iter()
            .chain(self.entities.iter().flat_map(|e| e.frames.iter()))
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty() && self.entities.is_empty()
    }
}

/// Per-object stage parameters, derived once from the config
struct ObjectStages<'a> {
    grid: &'a VoxelGrid,
    config: &'a Config,
    skeleton: SkeletonParams,
    profile: ProfileParams,
    thresholds: &'a ThresholdTable,
    oracle: &'a dyn SkeletonOracle,
    sink: &'a dyn ProgressSink,
}

impl ObjectStages<'_> {
    /// Shape, border policy, colocalization, centerline, geometry and profiles
    fn enrich(&self, object: &mut ReconstructedObject) {
        let grid = self.grid;
        object.shape = calculate_shape_metrics(object, grid.calibration());
        object.excluded = touches_border(object, grid, self.config.border_exclusion);
        object.colocalization = calculate_colocalization(object, grid, self.thresholds);

        let result = reconstruct_skeleton(object, grid, &self.skeleton, self.oracle, self.sink);
        object.skeleton = result.quality;
        if let Some(mut path) = result.centerline {
            apply_geometry(&mut path, self.config.tangent_window);
            apply_profiles(&mut path, grid, object.frame(), &self.profile, self.thresholds);
            object.geometry = Some(summarize_geometry(&path, &result.trees));
            object.centerline = Some(path);
        }
    }
}

/// Reconstruct and measure every object of the configured channel.
///
/// The reconstruction channel of `grid` is rewritten so that only retained
/// objects remain. Degenerate input is reported through `sink` and yields an
/// empty result. Setting `cancel` stops the pass before the next object.
///
/// # Arguments
/// * `grid` - Calibrated 4D volume
/// * `config` - Analysis parameters
/// * `oracle` - Thinning and shortest-path collaborator
/// * `sink` - Receives progress and warnings
/// * `cancel` - Optional cooperative cancellation flag
///
/// # Returns
/// Objects (or timelapse entities) with all descriptors, and the thresholds used
pub fn analyze_volume(
    grid: &mut VoxelGrid,
    config: &Config,
    oracle: &dyn SkeletonOracle,
    sink: &dyn ProgressSink,
    cancel: Option<&AtomicBool>,
) -> Result<AnalysisResult> {
    let components = match label_components(grid, &config.labeling_params()) {
        Ok(components) => components,
        Err(e @ (CiliaError::DegenerateInput { .. } | CiliaError::ChannelOutOfRange { .. })) => {
            sink.notify(&format!("Skipping volume: {}", e), Severity::Error);
            return Ok(AnalysisResult::default());
        }
        Err(e) => return Err(e),
    };

    if components.is_empty() {
        sink.notify(
            &format!("No objects found in channel {}", config.reconstruction_channel),
            Severity::Warning,
        );
        return Ok(AnalysisResult::default());
    }
    sink.notify(&format!("Labeled {} objects", components.len()), Severity::Info);

    let grid: &VoxelGrid = grid;
    let (thresholds, failures) = estimate_thresholds(grid, &config.colocalization_channels, &components);
    for (channel, e) in failures {
        sink.notify(&format!("No threshold for channel {}: {}", channel, e), Severity::Warning);
    }

    let mut objects: Vec<ReconstructedObject> = if config.timelapse {
        components.iter().flat_map(split_by_frame).collect()
    } else {
        components
    };

    let stages = ObjectStages {
        grid,
        config,
        skeleton: config.skeleton_params(),
        profile: config.profile_params(),
        thresholds: &thresholds,
        oracle,
        sink,
    };
    let cancelled = || cancel.map_or(false, |flag| flag.load(Ordering::Relaxed));

    if config.use_parallel {
        objects.par_iter_mut().for_each(|object| {
            if !cancelled() {
                stages.enrich(object);
            }
        });
    } else {
        for object in objects.iter_mut() {
            if cancelled() {
                break;
            }
            stages.enrich(object);
        }
    }

    if cancelled() {
        sink.notify("Analysis cancelled", Severity::Warning);
        return Err(CiliaError::Cancelled);
    }

    let with_centerline = objects.iter().filter(|o| o.skeleton_available()).count();
    sink.notify(
        &format!("Centerlines reconstructed for {}/{} objects", with_centerline, objects.len()),
        Severity::Info,
    );

    if !config.timelapse {
        return Ok(AnalysisResult {
            objects,
            entities: Vec::new(),
            thresholds,
        });
    }

    let mut grouped: BTreeMap<usize, Vec<ReconstructedObject>> = BTreeMap::new();
    for object in objects {
        grouped.entry(object.id).or_default().push(object);
    }
    let entities = grouped
        .into_iter()
        .map(|(id, frames)| build_entity(id, frames))
        .collect();

    Ok(AnalysisResult {
        objects: Vec::new(),
        entities,
        thresholds,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::CollectingSink;
    use crate::objects::SkeletonQuality;
    use crate::path_algorithms::GeodesicPathOracle;
    use crate::shape_analysis::BorderExclusion;
    use crate::voxel_grid::Calibration;

    fn config() -> Config {
        Config {
            min_size: 1,
            border_exclusion: BorderExclusion::Xy,
            use_parallel: false,
            gauss_sigma_xy: 0.0,
            gauss_sigma_z: 0.0,
            upscale_factor: 1,
            ..Config::default()
        }
    }

    fn two_bars() -> VoxelGrid {
        let mut grid = VoxelGrid::new(16, 8, 1, 1, 2, Calibration::default()).unwrap();
        for x in 2..10 {
            grid.set(x, 2, 0, 0, 0, 80.0);
        }
        // Second bar touches the lateral border
        for x in 10..16 {
            grid.set(x, 6, 0, 0, 0, 80.0);
        }
        grid
    }

    #[test]
    fn objects_are_fully_enriched() {
        let mut grid = two_bars();
        let mut config = config();
        config.colocalization_channels = vec![1];
        let sink = CollectingSink::new();
        let result = analyze_volume(&mut grid, &config, &GeodesicPathOracle, &sink, None).unwrap();

        assert_eq!(result.objects.len(), 2);
        assert!(result.entities.is_empty());
        assert_eq!(result.thresholds.get(1), Some(0.0));

        let inner = &result.objects[0];
        assert!(!inner.excluded);
        assert_eq!(inner.skeleton, SkeletonQuality::Available);
        assert!(inner.shape.is_some());
        assert_eq!(inner.colocalization.len(), 1);
        let path = inner.centerline.as_ref().unwrap();
        assert_eq!(path.profiles.len(), 1);
        assert_eq!(path.curvature.len(), path.len());
        assert!((inner.geometry.as_ref().unwrap().arc_length - 7.0).abs() < 1e-9);

        assert!(result.objects[1].excluded);
    }

    #[test]
    fn parallel_pass_matches_sequential() {
        let sink = CollectingSink::new();
        let mut sequential = two_bars();
        let a = analyze_volume(&mut sequential, &config(), &GeodesicPathOracle, &sink, None).unwrap();

        let mut parallel = two_bars();
        let parallel_config = Config {
            use_parallel: true,
            ..config()
        };
        let b = analyze_volume(&mut parallel, &parallel_config, &GeodesicPathOracle, &sink, None).unwrap();

        let lengths = |r: &AnalysisResult| -> Vec<Option<f64>> {
            r.objects.iter().map(|o| o.geometry.as_ref().map(|g| g.arc_length)).collect()
        };
        assert_eq!(lengths(&a), lengths(&b));
    }

    #[test]
    fn degenerate_input_is_reported_not_fatal() {
        let mut grid = VoxelGrid::new(3, 3, 1, 1, 1, Calibration::default()).unwrap();
        grid.channel_data_mut(0).iter_mut().for_each(|v| *v = 1.0);
        let sink = CollectingSink::new();
        let result = analyze_volume(&mut grid, &config(), &GeodesicPathOracle, &sink, None).unwrap();
        assert!(result.is_empty());
        assert_eq!(sink.count(Severity::Error), 1);
    }

    #[test]
    fn missing_channel_is_reported_not_fatal() {
        let mut grid = two_bars();
        let config = Config {
            reconstruction_channel: 5,
            ..config()
        };
        let sink = CollectingSink::new();
        let result = analyze_volume(&mut grid, &config, &GeodesicPathOracle, &sink, None).unwrap();
        assert!(result.is_empty());
        assert_eq!(sink.count(Severity::Error), 1);
    }

    #[test]
    fn empty_channel_warns() {
        let mut grid = VoxelGrid::new(4, 4, 1, 1, 1, Calibration::default()).unwrap();
        let sink = CollectingSink::new();
        let result = analyze_volume(&mut grid, &config(), &GeodesicPathOracle, &sink, None).unwrap();
        assert!(result.is_empty());
        assert_eq!(sink.count(Severity::Warning), 1);
    }

    #[test]
    fn cancellation_stops_between_objects() {
        let mut grid = two_bars();
        let cancel = AtomicBool::new(true);
        let sink = CollectingSink::new();
        let result = analyze_volume(&mut grid, &config(), &GeodesicPathOracle, &sink, Some(&cancel));
        assert!(matches!(result, Err(CiliaError::Cancelled)));
    }

    #[test]
    fn timelapse_builds_entities() {
        let mut grid = VoxelGrid::new(12, 6, 1, 2, 1, Calibration::default()).unwrap();
        for t in 0..2 {
            for x in 2..9 {
                grid.set(x, 3, 0, t, 0, 60.0);
            }
        }
        let config = Config {
            timelapse: true,
            ..config()
        };
        let sink = CollectingSink::new();
        let result = analyze_volume(&mut grid, &config, &GeodesicPathOracle, &sink, None).unwrap();

        assert!(result.objects.is_empty());
        assert_eq!(result.entities.len(), 1);
        let entity = &result.entities[0];
        assert_eq!(entity.frames.len(), 2);
        assert!(entity.skl_available_in_all_frames);
        assert!(!entity.excluded);
        assert!((entity.averages.arc_length.unwrap() - 6.0).abs() < 1e-9);
        assert_eq!(result.all_objects().count(), 2);
    }
}
