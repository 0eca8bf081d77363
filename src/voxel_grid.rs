// src/voxel_grid.rs - Calibrated 4D multi-channel intensity grid

use nalgebra::Vector3;
use serde::{Deserialize, Serialize};

use crate::errors::{CiliaError, Result};

/// Physical calibration of the grid axes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Calibration {
    /// Lateral size of one pixel along x (e.g. µm)
    pub pixel_width: f64,
    /// Lateral size of one pixel along y
    pub pixel_height: f64,
    /// Axial distance between two slices
    pub voxel_depth: f64,
    /// Time between two frames
    pub frame_interval: f64,
    #[serde(default = "default_unit")]
    pub unit: String,
    #[serde(default = "default_time_unit")]
    pub time_unit: String,
}

fn default_unit() -> String {
    "micron".to_string()
}

fn default_time_unit() -> String {
    "sec".to_string()
}

impl Default for Calibration {
    fn default() -> Self {
        Self {
            pixel_width: 1.0,
            pixel_height: 1.0,
            voxel_depth: 1.0,
            frame_interval: 1.0,
            unit: default_unit(),
            time_unit: default_time_unit(),
        }
    }
}

impl Calibration {
    /// Physical volume of one voxel
    pub fn voxel_volume(&self) -> f64 {
        self.pixel_width * self.pixel_height * self.voxel_depth
    }

    /// Area of a voxel face whose normal points along x
    pub fn x_face_area(&self) -> f64 {
        self.pixel_height * self.voxel_depth
    }

    /// Area of a voxel face whose normal points along y
    pub fn y_face_area(&self) -> f64 {
        self.pixel_width * self.voxel_depth
    }

    /// Area of a voxel face whose normal points along z
    pub fn z_face_area(&self) -> f64 {
        self.pixel_width * self.pixel_height
    }

    /// Convert (possibly fractional) lattice coordinates into physical space
    pub fn to_physical(&self, x: f64, y: f64, z: f64) -> Vector3<f64> {
        Vector3::new(x * self.pixel_width, y * self.pixel_height, z * self.voxel_depth)
    }

    /// Convert a physical position back into fractional lattice coordinates
    pub fn to_lattice(&self, p: &Vector3<f64>) -> (f64, f64, f64) {
        (p.x / self.pixel_width, p.y / self.pixel_height, p.z / self.voxel_depth)
    }
}

/// Integer position of one voxel in the 4D grid
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct VoxelCoordinate {
    pub x: usize,
    pub y: usize,
    pub z: usize,
    pub t: usize,
}

impl VoxelCoordinate {
    pub fn new(x: usize, y: usize, z: usize, t: usize) -> Self {
        Self { x, y, z, t }
    }

    /// Physical position of the voxel centre
    pub fn calibrated(&self, calibration: &Calibration) -> Vector3<f64> {
        calibration.to_physical(self.x as f64, self.y as f64, self.z as f64)
    }
}

/// Dense intensity grid, channel-major then frame, slice, row, column.
#[derive(Debug, Clone)]
pub struct VoxelGrid {
    width: usize,
    height: usize,
    depth: usize,
    frames: usize,
    channels: usize,
    calibration: Calibration,
    data: Vec<f32>,
}

impl VoxelGrid {
    /// Create an all-zero grid
    pub fn new(
        width: usize,
        height: usize,
        depth: usize,
        frames: usize,
        channels: usize,
        calibration: Calibration,
    ) -> Result<Self> {
        if width == 0 || height == 0 || depth == 0 || frames == 0 || channels == 0 {
            return Err(CiliaError::Grid(format!(
                "grid dimensions must be non-zero, got {}x{}x{}x{} with {} channels",
                width, height, depth, frames, channels
            )));
        }
        if calibration.pixel_width <= 0.0
            || calibration.pixel_height <= 0.0
            || calibration.voxel_depth <= 0.0
        {
            return Err(CiliaError::Grid("calibration must be strictly positive".to_string()));
        }

        Ok(Self {
            width,
            height,
            depth,
            frames,
            channels,
            calibration,
            data: vec![0.0; width * height * depth * frames * channels],
        })
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    pub fn frames(&self) -> usize {
        self.frames
    }

    pub fn channels(&self) -> usize {
        self.channels
    }

    pub fn calibration(&self) -> &Calibration {
        &self.calibration
    }

    /// Number of voxels in one channel across all frames
    pub fn channel_len(&self) -> usize {
        self.width * self.height * self.depth * self.frames
    }

    /// Fail with `ChannelOutOfRange` unless `channel` exists
    pub fn check_channel(&self, channel: usize) -> Result<()> {
        if channel >= self.channels {
            return Err(CiliaError::ChannelOutOfRange {
                channel,
                available: self.channels,
            });
        }
        Ok(())
    }

    /// Offset of a voxel inside its channel block
    #[inline]
    pub fn offset(&self, x: usize, y: usize, z: usize, t: usize) -> usize {
        ((t * self.depth + z) * self.height + y) * self.width + x
    }

    /// Inverse of [`VoxelGrid::offset`]
    #[inline]
    pub fn coordinate_of(&self, offset: usize) -> VoxelCoordinate {
        let x = offset % self.width;
        let rest = offset / self.width;
        let y = rest % self.height;
        let rest = rest / self.height;
        let z = rest % self.depth;
        let t = rest / self.depth;
        VoxelCoordinate { x, y, z, t }
    }

    #[inline]
    pub fn get(&self, x: usize, y: usize, z: usize, t: usize, channel: usize) -> f32 {
        self.data[channel * self.channel_len() + self.offset(x, y, z, t)]
    }

    #[inline]
    pub fn set(&mut self, x: usize, y: usize, z: usize, t: usize, channel: usize, value: f32) {
        let idx = channel * self.channel_len() + self.offset(x, y, z, t);
        self.data[idx] = value;
    }

    #[inline]
    pub fn get_at(&self, coord: &VoxelCoordinate, channel: usize) -> f32 {
        self.get(coord.x, coord.y, coord.z, coord.t, channel)
    }

    /// Bounds-checked access with signed lattice coordinates
    pub fn get_checked(&self, x: i64, y: i64, z: i64, t: usize, channel: usize) -> Option<f32> {
        if x < 0 || y < 0 || z < 0 {
            return None;
        }
        let (x, y, z) = (x as usize, y as usize, z as usize);
        if x >= self.width || y >= self.height || z >= self.depth || t >= self.frames {
            return None;
        }
        Some(self.get(x, y, z, t, channel))
    }

    /// All voxels of one channel, indexed by [`VoxelGrid::offset`]
    pub fn channel_data(&self, channel: usize) -> &[f32] {
        let len = self.channel_len();
        &self.data[channel * len..(channel + 1) * len]
    }

    pub fn channel_data_mut(&mut self, channel: usize) -> &mut [f32] {
        let len = self.channel_len();
        &mut self.data[channel * len..(channel + 1) * len]
    }

    /// True if the coordinate lies on the lateral (x/y) grid boundary
    pub fn on_lateral_border(&self, coord: &VoxelCoordinate) -> bool {
        coord.x == 0 || coord.y == 0 || coord.x + 1 == self.width || coord.y + 1 == self.height
    }

    /// True if the slice index is the first or last slice of a stack
    pub fn is_axial_border_slice(&self, z: usize) -> bool {
        z == 0 || z + 1 == self.depth
    }
}
