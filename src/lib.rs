// src/lib.rs - Library interface for cilia_recon

pub mod config;
pub mod errors;
pub mod geometry;
pub mod image_io;
pub mod image_utils;
pub mod labeling;
pub mod notify;
pub mod objects;
pub mod output;
pub mod path_algorithms;
pub mod pipeline;
pub mod profile;
pub mod shape_analysis;
pub mod skeleton;
pub mod threshold;
pub mod timelapse;
pub mod voxel_grid;

// Re-export commonly used types and functions
pub use config::Config;
pub use errors::{CiliaError, Result};
pub use image_io::load_stack;
pub use notify::{CollectingSink, LogSink, ProgressSink, Severity};
pub use output::{write_filtered_stack, write_results};
pub use path_algorithms::GeodesicPathOracle;
pub use pipeline::{analyze_volume, AnalysisResult};
pub use voxel_grid::{Calibration, VoxelCoordinate, VoxelGrid};

// Re-export per-stage entry points
pub use labeling::{label_components, Connectivity, LabelingParams};
pub use shape_analysis::{
    calculate_colocalization,
    calculate_shape_metrics,
    shape_complexity_index,
    sphere_equivalent_radius,
    touches_border,
    BorderExclusion,
    ShapeMetrics,
};
pub use threshold::{estimate_threshold, estimate_thresholds, ThresholdTable};
pub use skeleton::{
    reconstruct_skeleton,
    order_centerline,
    SkeletonAnalysis,
    SkeletonOracle,
    SkeletonParams,
    TreeStats,
};
pub use geometry::{apply_geometry, summarize_geometry, GeometrySummary};
pub use profile::{apply_profiles, resample_profile, ProfileParams};
pub use timelapse::{build_entity, split_by_frame, TimelapseEntity};
pub use objects::{CenterlinePath, ChannelProfile, ObjectPoint, ReconstructedObject, SkeletonQuality};
