// src/threshold.rs - Block-local background ceiling per auxiliary channel

use std::collections::BTreeMap;

use serde::Serialize;

use crate::errors::{CiliaError, Result};
use crate::objects::ReconstructedObject;
use crate::voxel_grid::VoxelGrid;

/// Number of blocks along x and along y
pub const BLOCKS_PER_AXIS: usize = 5;

/// Fraction of the brightest background values kept per block
pub const TOP_FRACTION: f64 = 0.1;

/// Standard deviations above the pooled mean
pub const STDEV_FACTOR: f64 = 1.5;

/// Intensity threshold per channel
#[derive(Debug, Clone, Default, Serialize)]
pub struct ThresholdTable {
    thresholds: BTreeMap<usize, f64>,
}

impl ThresholdTable {
    pub fn insert(&mut self, channel: usize, threshold: f64) {
        self.thresholds.insert(channel, threshold);
    }

    pub fn get(&self, channel: usize) -> Option<f64> {
        self.thresholds.get(&channel).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (usize, f64)> + '_ {
        self.thresholds.iter().map(|(c, t)| (*c, *t))
    }

    pub fn len(&self) -> usize {
        self.thresholds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.thresholds.is_empty()
    }
}

/// Mark every voxel (per channel offset) owned by one of the objects
pub fn object_mask(grid: &VoxelGrid, objects: &[ReconstructedObject]) -> Vec<bool> {
    let mut mask = vec![false; grid.channel_len()];
    for object in objects {
        for point in &object.points {
            let c = point.coord;
            mask[grid.offset(c.x, c.y, c.z, c.t)] = true;
        }
    }
    mask
}

/// mean + 1.5 * sample stdev; the value itself for one sample, 0.0 for none
pub fn pooled_threshold(samples: &[f64]) -> f64 {
    match samples.len() {
        0 => 0.0,
        1 => samples[0],
        n => {
            let mean = samples.iter().sum::<f64>() / n as f64;
            let variance = samples.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1) as f64;
            mean + STDEV_FACTOR * variance.sqrt()
        }
    }
}

/// Brightest `ceil(n * TOP_FRACTION)` values of a block
fn top_fraction(mut block: Vec<f64>) -> Vec<f64> {
    if block.is_empty() {
        return block;
    }
    block.sort_by(|a, b| b.total_cmp(a));
    let keep = ((block.len() as f64) * TOP_FRACTION).ceil() as usize;
    block.truncate(keep.max(1));
    block
}

/// Estimate the threshold of one channel from voxels outside `mask`.
pub fn estimate_threshold(grid: &VoxelGrid, channel: usize, mask: &[bool]) -> Result<f64> {
    grid.check_channel(channel)?;

    let data = grid.channel_data(channel);
    let mut blocks: Vec<Vec<f64>> = vec![Vec::new(); BLOCKS_PER_AXIS * BLOCKS_PER_AXIS];

    for t in 0..grid.frames() {
        for z in 0..grid.depth() {
            for y in 0..grid.height() {
                let by = y * BLOCKS_PER_AXIS / grid.height();
                for x in 0..grid.width() {
                    let offset = grid.offset(x, y, z, t);
                    if mask[offset] {
                        continue;
                    }
                    let bx = x * BLOCKS_PER_AXIS / grid.width();
                    blocks[by * BLOCKS_PER_AXIS + bx].push(data[offset] as f64);
                }
            }
        }
    }

    let pooled: Vec<f64> = blocks.into_iter().flat_map(top_fraction).collect();
    Ok(pooled_threshold(&pooled))
}

/// Estimate thresholds for several channels, sharing one object mask.
/// Channels that cannot be processed are returned with their error.
pub fn estimate_thresholds(
    grid: &VoxelGrid,
    channels: &[usize],
    objects: &[ReconstructedObject],
) -> (ThresholdTable, Vec<(usize, CiliaError)>) {
    let mask = object_mask(grid, objects);
    let mut table = ThresholdTable::default();
    let mut failures = Vec::new();

    for &channel in channels {
        match estimate_threshold(grid, channel, &mask) {
            Ok(threshold) => {
                log::debug!("Channel {} threshold: {:.3}", channel, threshold);
                table.insert(channel, threshold);
            }
            Err(e) => failures.push((channel, e)),
        }
    }

    (table, failures)
}
