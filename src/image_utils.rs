// src/image_utils.rs - Sub-volume buffers, upscaling, smoothing and binarisation

use image::{GrayImage, ImageBuffer};
use imageproc::filter::gaussian_blur_f32;

/// Foreground value written into binary sub-volumes
pub const FOREGROUND: f32 = 255.0;

/// Small dense 3D volume used around a single object
#[derive(Debug, Clone, PartialEq)]
pub struct SubVolume {
    width: usize,
    height: usize,
    depth: usize,
    values: Vec<f32>,
}

impl SubVolume {
    /// Create an all-background volume
    pub fn new(width: usize, height: usize, depth: usize) -> Self {
        Self {
            width,
            height,
            depth,
            values: vec![0.0; width * height * depth],
        }
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

    #[inline]
    fn index(&self, x: usize, y: usize, z: usize) -> usize {
        (z * self.height + y) * self.width + x
    }

    #[inline]
    pub fn get(&self, x: usize, y: usize, z: usize) -> f32 {
        self.values[self.index(x, y, z)]
    }

    #[inline]
    pub fn set(&mut self, x: usize, y: usize, z: usize, value: f32) {
        let idx = self.index(x, y, z);
        self.values[idx] = value;
    }

    /// Bounds-checked foreground test with signed coordinates
    #[inline]
    pub fn is_foreground(&self, x: i64, y: i64, z: i64) -> bool {
        if x < 0 || y < 0 || z < 0 {
            return false;
        }
        let (x, y, z) = (x as usize, y as usize, z as usize);
        x < self.width && y < self.height && z < self.depth && self.get(x, y, z) > 0.0
    }

    pub fn count_foreground(&self) -> usize {
        self.values.iter().filter(|v| **v > 0.0).count()
    }

    pub fn max_value(&self) -> f32 {
        self.values.iter().fold(0.0f32, |a, &b| a.max(b))
    }

    /// All foreground lattice positions in x-fastest order
    pub fn foreground_points(&self) -> Vec<[i64; 3]> {
        let mut points = Vec::new();
        for z in 0..self.depth {
            for y in 0..self.height {
                for x in 0..self.width {
                    if self.get(x, y, z) > 0.0 {
                        points.push([x as i64, y as i64, z as i64]);
                    }
                }
            }
        }
        points
    }

    fn slice_to_gray(&self, z: usize) -> GrayImage {
        let start = self.index(0, 0, z);
        let raw: Vec<u8> = self.values[start..start + self.width * self.height]
            .iter()
            .map(|v| v.round().clamp(0.0, 255.0) as u8)
            .collect();
        ImageBuffer::from_fn(self.width as u32, self.height as u32, |x, y| {
            image::Luma([raw[y as usize * self.width + x as usize]])
        })
    }
}

/// Nearest-neighbour upscaling by an integer factor per axis
pub fn upscale_nearest(volume: &SubVolume, fx: usize, fy: usize, fz: usize) -> SubVolume {
    let mut result = SubVolume::new(volume.width * fx, volume.height * fy, volume.depth * fz);
    for z in 0..result.depth {
        for y in 0..result.height {
            for x in 0..result.width {
                result.set(x, y, z, volume.get(x / fx, y / fy, z / fz));
            }
        }
    }
    result
}

/// Normalised 1D Gaussian kernel truncated at 3 sigma
fn gaussian_kernel(sigma: f64) -> Vec<f32> {
    let radius = (3.0 * sigma).ceil() as i64;
    let weights: Vec<f64> = (-radius..=radius)
        .map(|i| (-(i * i) as f64 / (2.0 * sigma * sigma)).exp())
        .collect();
    let sum: f64 = weights.iter().sum();
    weights.into_iter().map(|w| (w / sum) as f32).collect()
}

/// Gaussian smoothing: lateral pass per slice, then an axial pass when
/// `sigma_z` is positive and the volume has more than one slice.
/// Sigmas are in sub-volume voxels; non-positive sigmas skip that pass.
pub fn gaussian_smooth(volume: &SubVolume, sigma_xy: f64, sigma_z: f64) -> SubVolume {
    let mut result = volume.clone();

    if sigma_xy > 0.0 {
        for z in 0..volume.depth {
            let blurred = gaussian_blur_f32(&volume.slice_to_gray(z), sigma_xy as f32);
            for (x, y, pixel) in blurred.enumerate_pixels() {
                result.set(x as usize, y as usize, z, pixel[0] as f32);
            }
        }
    }

    if sigma_z > 0.0 && volume.depth > 1 {
        let kernel = gaussian_kernel(sigma_z);
        let radius = (kernel.len() / 2) as i64;
        let lateral = result.clone();

        for z in 0..volume.depth {
            for y in 0..volume.height {
                for x in 0..volume.width {
                    let mut acc = 0.0f32;
                    for (k, weight) in kernel.iter().enumerate() {
                        let zz = z as i64 + k as i64 - radius;
                        // Outside the volume counts as background
                        if zz >= 0 && (zz as usize) < volume.depth {
                            acc += weight * lateral.get(x, y, zz as usize);
                        }
                    }
                    result.set(x, y, z, acc);
                }
            }
        }
    }

    result
}

/// Binarise at half of the volume maximum; an empty volume stays empty
pub fn binarize_half_max(volume: &SubVolume) -> SubVolume {
    let level = volume.max_value() / 2.0;
    let mut result = SubVolume::new(volume.width, volume.height, volume.depth);
    if level <= 0.0 {
        return result;
    }
    for (out, v) in result.values.iter_mut().zip(volume.values.iter()) {
        if *v >= level {
            *out = FOREGROUND;
        }
    }
    result
}
