// tests/end_to_end.rs - Full pipeline runs on synthetic volumes

use assert_approx_eq::assert_approx_eq;

use cilia_recon_lib::{
    analyze_volume, AnalysisResult, BorderExclusion, Calibration, CollectingSink, Config, Connectivity,
    GeodesicPathOracle, SkeletonQuality, VoxelGrid,
};

fn exact_config() -> Config {
    Config {
        min_size: 1,
        gauss_sigma_xy: 0.0,
        gauss_sigma_z: 0.0,
        upscale_factor: 1,
        use_parallel: false,
        ..Config::default()
    }
}

fn run(grid: &mut VoxelGrid, config: &Config) -> AnalysisResult {
    let sink = CollectingSink::new();
    analyze_volume(grid, config, &GeodesicPathOracle, &sink, None).unwrap()
}

#[test]
fn straight_axial_line() {
    let mut grid = VoxelGrid::new(5, 5, 24, 1, 1, Calibration::default()).unwrap();
    for z in 2..22 {
        grid.set(2, 2, z, 0, 0, 200.0);
    }
    let result = run(&mut grid, &exact_config());

    assert_eq!(result.objects.len(), 1);
    let object = &result.objects[0];
    assert_eq!(object.voxel_count(), 20);
    assert!(!object.excluded);
    assert_eq!(object.skeleton, SkeletonQuality::Available);

    let geometry = object.geometry.as_ref().unwrap();
    assert_approx_eq!(geometry.arc_length, 19.0);
    assert_approx_eq!(geometry.bending_index.unwrap(), 1.0);
    assert!(geometry.max_abs_curvature < 1e-9);
}

#[test]
fn straight_lateral_line_with_default_smoothing() {
    let mut grid = VoxelGrid::new(30, 15, 1, 1, 1, Calibration::default()).unwrap();
    for x in 5..25 {
        grid.set(x, 7, 0, 0, 0, 200.0);
    }
    let config = Config {
        use_parallel: false,
        ..Config::default()
    };
    let result = run(&mut grid, &config);

    let object = &result.objects[0];
    assert_eq!(object.skeleton, SkeletonQuality::Available);
    let geometry = object.geometry.as_ref().unwrap();
    assert!(geometry.arc_length > 17.0 && geometry.arc_length < 21.0);
    assert!(geometry.bending_index.unwrap() >= 1.0);
}

#[test]
fn calibrated_line_scales_with_pixel_size() {
    let calibration = Calibration {
        pixel_width: 0.2,
        pixel_height: 0.2,
        voxel_depth: 0.5,
        ..Calibration::default()
    };
    let mut grid = VoxelGrid::new(30, 6, 1, 1, 1, calibration).unwrap();
    for x in 3..23 {
        grid.set(x, 3, 0, 0, 0, 200.0);
    }
    let result = run(&mut grid, &exact_config());

    let object = &result.objects[0];
    assert_approx_eq!(object.geometry.as_ref().unwrap().arc_length, 19.0 * 0.2);
    assert_approx_eq!(object.shape.as_ref().unwrap().volume, 20.0 * 0.2 * 0.2 * 0.5);
}

#[test]
fn gap_separates_face_connected_voxels() {
    let mut grid = VoxelGrid::new(5, 3, 1, 1, 1, Calibration::default()).unwrap();
    grid.set(1, 1, 0, 0, 0, 10.0);
    grid.set(3, 1, 0, 0, 0, 10.0);
    let config = Config {
        connectivity: Connectivity::FaceOnly,
        ..exact_config()
    };
    let result = run(&mut grid, &config);
    assert_eq!(result.objects.len(), 2);
    assert!(result.objects.iter().all(|o| o.voxel_count() == 1));
    assert!(result.objects.iter().all(|o| o.skeleton == SkeletonQuality::TooShort));
}

#[test]
fn diagonal_voxels_merge_with_diagonal_connectivity() {
    let mut grid = VoxelGrid::new(4, 4, 2, 1, 1, Calibration::default()).unwrap();
    grid.set(1, 1, 0, 0, 0, 10.0);
    grid.set(2, 2, 1, 0, 0, 10.0);

    let mut diagonal_grid = grid.clone();
    let merged = run(
        &mut diagonal_grid,
        &Config {
            connectivity: Connectivity::FaceDiagonal,
            ..exact_config()
        },
    );
    assert_eq!(merged.objects.len(), 1);
    assert_eq!(merged.objects[0].voxel_count(), 2);

    let split = run(
        &mut grid,
        &Config {
            connectivity: Connectivity::FaceOnly,
            ..exact_config()
        },
    );
    assert_eq!(split.objects.len(), 2);
}

#[test]
fn small_components_are_erased() {
    let mut grid = VoxelGrid::new(6, 6, 1, 1, 1, Calibration::default()).unwrap();
    grid.set(1, 1, 0, 0, 0, 10.0);
    grid.set(2, 1, 0, 0, 0, 10.0);
    let config = Config {
        min_size: 3,
        ..exact_config()
    };
    let result = run(&mut grid, &config);
    assert!(result.objects.is_empty());
    assert!(grid.channel_data(0).iter().all(|v| *v == 0.0));
}

#[test]
fn single_background_voxel_is_the_threshold() {
    let mut grid = VoxelGrid::new(2, 1, 1, 1, 2, Calibration::default()).unwrap();
    grid.set(0, 0, 0, 0, 0, 1.0);
    grid.set(0, 0, 0, 0, 1, 900.0);
    grid.set(1, 0, 0, 0, 1, 42.0);
    let config = Config {
        colocalization_channels: vec![1],
        border_exclusion: BorderExclusion::None,
        ..exact_config()
    };
    let result = run(&mut grid, &config);
    assert_eq!(result.thresholds.get(1), Some(42.0));

    let coloc = &result.objects[0].colocalization[0];
    assert_approx_eq!(coloc.colocalized_fraction, 1.0);
}

#[test]
fn landmark_channel_sets_the_base() {
    let mut grid = VoxelGrid::new(20, 6, 1, 1, 2, Calibration::default()).unwrap();
    for x in 3..15 {
        grid.set(x, 3, 0, 0, 0, 100.0);
    }
    grid.set(14, 3, 0, 0, 1, 1000.0);
    let config = Config {
        landmark_channel: Some(1),
        landmark_radius: 1.5,
        ..exact_config()
    };
    let result = run(&mut grid, &config);

    let path = result.objects[0].centerline.as_ref().unwrap();
    assert_approx_eq!(path.first().x, 14.0);
    assert_approx_eq!(path.last().x, 3.0);
    assert_approx_eq!(result.objects[0].geometry.as_ref().unwrap().orientation.x, -11.0);
}

#[test]
fn colocalized_profile_along_a_partially_stained_line() {
    let mut grid = VoxelGrid::new(20, 6, 1, 1, 2, Calibration::default()).unwrap();
    for x in 4..14 {
        grid.set(x, 3, 0, 0, 0, 100.0);
    }
    // Stain the first half of the line only
    for x in 4..9 {
        grid.set(x, 3, 0, 0, 1, 500.0);
    }
    grid.set(0, 0, 0, 0, 1, 5.0);
    let config = Config {
        colocalization_channels: vec![1],
        ..exact_config()
    };
    let result = run(&mut grid, &config);

    let profile = &result.objects[0].centerline.as_ref().unwrap().profiles[0];
    let percentage = profile.colocalized_percentage.unwrap();
    assert!((0.0..=100.0).contains(&percentage));
    assert!(percentage > 30.0 && percentage < 70.0);
}

#[test]
fn filament_is_more_complex_than_blob() {
    let mut grid = VoxelGrid::new(40, 12, 6, 1, 1, Calibration::default()).unwrap();
    for x in 2..32 {
        grid.set(x, 2, 2, 0, 0, 50.0);
    }
    for z in 1..5 {
        for y in 5..9 {
            for x in 5..9 {
                grid.set(x, y, z, 0, 0, 50.0);
            }
        }
    }
    let config = Config {
        border_exclusion: BorderExclusion::None,
        ..exact_config()
    };
    let result = run(&mut grid, &config);
    assert_eq!(result.objects.len(), 2);

    let complexity = |n: usize| -> f64 {
        result
            .objects
            .iter()
            .find(|o| o.voxel_count() == n)
            .and_then(|o| o.shape.as_ref())
            .map(|s| s.shape_complexity)
            .unwrap()
    };
    assert!(complexity(30) > complexity(64));
    assert!(complexity(64) > 1.0);
}

#[test]
fn timelapse_entity_spans_frames() {
    let mut grid = VoxelGrid::new(20, 8, 1, 3, 1, Calibration::default()).unwrap();
    for t in 0..3 {
        for x in 3..10 + t {
            grid.set(x, 4, 0, t, 0, 70.0);
        }
    }
    let config = Config {
        timelapse: true,
        ..exact_config()
    };
    let result = run(&mut grid, &config);

    assert_eq!(result.entities.len(), 1);
    let entity = &result.entities[0];
    assert_eq!(entity.frames.len(), 3);
    assert!(entity.skl_available_in_all_frames);
    // Arc lengths 6, 7 and 8
    assert_approx_eq!(entity.averages.arc_length.unwrap(), 7.0);
}
