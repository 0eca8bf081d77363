// src/config.rs - Analysis parameters loaded from TOML

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::errors::{CiliaError, Result};
use crate::labeling::{Connectivity, LabelingParams};
use crate::profile::ProfileParams;
use crate::shape_analysis::BorderExclusion;
use crate::skeleton::SkeletonParams;
use crate::voxel_grid::Calibration;

/// Configuration for one reconstruction run
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Config {
    pub input_path: String,
    pub output_base_dir: String,

    /// Channel holding the segmented objects
    #[serde(default)]
    pub reconstruction_channel: usize,

    /// Channel marking the base of each object (e.g. basal body)
    #[serde(default)]
    pub landmark_channel: Option<usize>,

    /// Auxiliary channels for thresholds, colocalization and profiles
    #[serde(default)]
    pub colocalization_channels: Vec<usize>,

    #[serde(default = "default_connectivity")]
    pub connectivity: Connectivity,

    #[serde(default = "default_min_size")]
    pub min_size: usize,

    #[serde(default = "default_border_exclusion")]
    pub border_exclusion: BorderExclusion,

    #[serde(default)]
    pub timelapse: bool,

    /// Slices per time point when a flat stack holds several frames
    #[serde(default)]
    pub slices_per_frame: Option<usize>,

    // Skeleton stage
    #[serde(default = "default_sigma_xy")]
    pub gauss_sigma_xy: f64,

    #[serde(default = "default_sigma_z")]
    pub gauss_sigma_z: f64,

    #[serde(default = "default_upscale_factor")]
    pub upscale_factor: usize,

    #[serde(default = "default_landmark_radius")]
    pub landmark_radius: f64,

    // Geometry stage
    #[serde(default = "default_tangent_window")]
    pub tangent_window: f64,

    #[serde(default)]
    pub normalize_profiles: bool,

    #[serde(default = "default_write_profiles")]
    pub write_profiles: bool,

    /// Export the reconstruction channel with discarded components removed
    #[serde(default)]
    pub write_filtered_stack: bool,

    #[serde(default = "default_parallel")]
    pub use_parallel: bool,

    #[serde(default)]
    pub calibration: Calibration,
}

fn default_connectivity() -> Connectivity {
    Connectivity::FaceDiagonal
}

fn default_min_size() -> usize {
    5
}

fn default_border_exclusion() -> BorderExclusion {
    BorderExclusion::XyDominantZ
}

fn default_sigma_xy() -> f64 {
    1.0
}

fn default_sigma_z() -> f64 {
    1.0
}

fn default_upscale_factor() -> usize {
    3
}

fn default_landmark_radius() -> f64 {
    3.0 // calibrated units (µm)
}

fn default_tangent_window() -> f64 {
    1.0
}

fn default_write_profiles() -> bool {
    true
}

fn default_parallel() -> bool {
    true
}

impl Default for Config {
    fn default() -> Self {
        Self {
            input_path: "./input".to_string(),
            output_base_dir: "./output".to_string(),
            reconstruction_channel: 0,
            landmark_channel: None,
            colocalization_channels: Vec::new(),
            connectivity: default_connectivity(),
            min_size: default_min_size(),
            border_exclusion: default_border_exclusion(),
            timelapse: false,
            slices_per_frame: None,
            gauss_sigma_xy: default_sigma_xy(),
            gauss_sigma_z: default_sigma_z(),
            upscale_factor: default_upscale_factor(),
            landmark_radius: default_landmark_radius(),
            tangent_window: default_tangent_window(),
            normalize_profiles: false,
            write_profiles: default_write_profiles(),
            write_filtered_stack: false,
            use_parallel: default_parallel(),
            calibration: Calibration::default(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| {
            CiliaError::Config(format!("Failed to read config file '{}': {}", path.display(), e))
        })?;

        toml::from_str(&content).map_err(|source| CiliaError::ConfigLoad {
            source,
            path: path.to_path_buf(),
        })
    }

    /// Check parameter ranges
    pub fn validate(&self) -> Result<()> {
        if self.min_size == 0 {
            return Err(CiliaError::Config("min_size must be > 0".to_string()));
        }

        if self.gauss_sigma_xy < 0.0 || self.gauss_sigma_z < 0.0 {
            return Err(CiliaError::Config(
                "gauss_sigma_xy and gauss_sigma_z must be >= 0.0".to_string(),
            ));
        }

        if self.upscale_factor == 0 {
            return Err(CiliaError::Config("upscale_factor must be > 0".to_string()));
        }

        if self.landmark_radius <= 0.0 {
            return Err(CiliaError::Config("landmark_radius must be > 0.0".to_string()));
        }

        if self.tangent_window <= 0.0 {
            return Err(CiliaError::Config("tangent_window must be > 0.0".to_string()));
        }

        if self.slices_per_frame == Some(0) {
            return Err(CiliaError::Config("slices_per_frame must be > 0".to_string()));
        }

        let cal = &self.calibration;
        if cal.pixel_width <= 0.0 || cal.pixel_height <= 0.0 || cal.voxel_depth <= 0.0 {
            return Err(CiliaError::Config(
                "calibration sizes must be > 0.0".to_string(),
            ));
        }

        if self.landmark_channel == Some(self.reconstruction_channel) {
            return Err(CiliaError::Config(
                "landmark_channel must differ from reconstruction_channel".to_string(),
            ));
        }

        Ok(())
    }

    /// Check that the input exists and create the output directory
    pub fn prepare_paths(&self) -> Result<()> {
        let input_path = PathBuf::from(&self.input_path);
        if !input_path.exists() {
            return Err(CiliaError::InvalidPath(input_path));
        }
        fs::create_dir_all(&self.output_base_dir)?;
        Ok(())
    }

    /// Save configuration to a TOML file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| CiliaError::Config(format!("Failed to serialize config: {}", e)))?;

        fs::write(path, content)?;

        Ok(())
    }

    pub fn labeling_params(&self) -> LabelingParams {
        LabelingParams {
            channel: self.reconstruction_channel,
            connectivity: self.connectivity,
            min_size: self.min_size,
            timelapse: self.timelapse,
        }
    }

    pub fn skeleton_params(&self) -> SkeletonParams {
        SkeletonParams {
            sigma_xy: self.gauss_sigma_xy,
            sigma_z: self.gauss_sigma_z,
            upscale_factor: self.upscale_factor,
            landmark_channel: self.landmark_channel,
            landmark_radius: self.landmark_radius,
        }
    }

    pub fn profile_params(&self) -> ProfileParams {
        ProfileParams {
            channels: self.colocalization_channels.clone(),
            normalize_by: self.normalize_profiles.then_some(self.reconstruction_channel),
        }
    }
}
