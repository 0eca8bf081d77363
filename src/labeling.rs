// src/labeling.rs - Connected-component labeling over a 4D grid

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::errors::{CiliaError, Result};
use crate::objects::{ExposedFaces, ObjectPoint, ReconstructedObject};
use crate::voxel_grid::{VoxelCoordinate, VoxelGrid};

/// Which neighbours count as connected
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Connectivity {
    /// Neighbours differing by one step along exactly one axis
    FaceOnly,
    /// Full 3x3x3 neighbourhood, including edge and corner diagonals
    FaceDiagonal,
}

impl Connectivity {
    /// Neighbour offsets as (dx, dy, dz, dt).
    ///
    /// With `with_time`, face-only adds the same voxel in the previous and
    /// next frame; face+diagonal adds the whole spatial neighbourhood there.
    pub fn offsets(&self, with_time: bool) -> Vec<[i64; 4]> {
        let time_range: &[i64] = if with_time { &[-1, 0, 1] } else { &[0] };
        let mut offsets = Vec::new();

        for &dt in time_range {
            for dz in -1..=1i64 {
                for dx in -1..=1i64 {
                    for dy in -1..=1i64 {
                        if dx == 0 && dy == 0 && dz == 0 && dt == 0 {
                            continue;
                        }
                        let steps = [dx, dy, dz, dt].iter().filter(|d| **d != 0).count();
                        let keep = match self {
                            Connectivity::FaceOnly => steps == 1,
                            Connectivity::FaceDiagonal => true,
                        };
                        if keep {
                            offsets.push([dx, dy, dz, dt]);
                        }
                    }
                }
            }
        }

        offsets
    }
}

/// Parameters of one labeling pass
#[derive(Debug, Clone)]
pub struct LabelingParams {
    pub channel: usize,
    pub connectivity: Connectivity,
    pub min_size: usize,
    /// Treat time as a fourth connectivity axis
    pub timelapse: bool,
}

/// Signed step from `coord`, or `None` when it leaves the grid
#[inline]
fn step(grid: &VoxelGrid, coord: &VoxelCoordinate, d: &[i64; 4]) -> Option<usize> {
    let x = coord.x as i64 + d[0];
    let y = coord.y as i64 + d[1];
    let z = coord.z as i64 + d[2];
    let t = coord.t as i64 + d[3];
    if x < 0 || y < 0 || z < 0 || t < 0 {
        return None;
    }
    let (x, y, z, t) = (x as usize, y as usize, z as usize, t as usize);
    if x >= grid.width() || y >= grid.height() || z >= grid.depth() || t >= grid.frames() {
        return None;
    }
    Some(grid.offset(x, y, z, t))
}

/// Count the background 6-neighbours of a voxel; outside the grid is background.
fn exposed_faces(grid: &VoxelGrid, data: &[f32], coord: &VoxelCoordinate) -> ExposedFaces {
    let is_background = |d: [i64; 4]| match step(grid, coord, &d) {
        Some(offset) => data[offset] <= 0.0,
        None => true,
    };

    let mut faces = ExposedFaces::default();
    for d in [[-1, 0, 0, 0], [1, 0, 0, 0]] {
        if is_background(d) {
            faces.x += 1;
        }
    }
    for d in [[0, -1, 0, 0], [0, 1, 0, 0]] {
        if is_background(d) {
            faces.y += 1;
        }
    }
    for d in [[0, 0, -1, 0], [0, 0, 1, 0]] {
        if is_background(d) {
            faces.z += 1;
        }
    }
    faces
}

/// Flood fill from `start`, consuming visited voxels in `work`.
fn flood_fill(
    grid: &VoxelGrid,
    work: &mut [f32],
    start: usize,
    offsets: &[[i64; 4]],
) -> Vec<usize> {
    let mut members = Vec::new();
    let mut stack = vec![start];
    work[start] = 0.0;

    while let Some(current) = stack.pop() {
        members.push(current);
        let coord = grid.coordinate_of(current);

        for d in offsets {
            if let Some(next) = step(grid, &coord, d) {
                if work[next] > 0.0 {
                    work[next] = 0.0;
                    stack.push(next);
                }
            }
        }
    }

    members
}

/// Whether a tentative component survives the size filter
fn meets_min_size(grid: &VoxelGrid, members: &[usize], params: &LabelingParams) -> bool {
    if members.len() < params.min_size {
        return false;
    }
    if !params.timelapse {
        return true;
    }

    // Every occupied frame must be large enough on its own
    let mut per_frame: BTreeMap<usize, usize> = BTreeMap::new();
    for &offset in members {
        *per_frame.entry(grid.coordinate_of(offset).t).or_insert(0) += 1;
    }
    per_frame.values().all(|&count| count >= params.min_size)
}

/// Label the connected foreground components of one channel.
///
/// Components smaller than `min_size` are dropped and their voxels are erased
/// from the grid channel; retained voxels keep their original intensity.
/// An empty channel yields an empty list. A channel without any background
/// voxel is rejected as `DegenerateInput`.
pub fn label_components(
    grid: &mut VoxelGrid,
    params: &LabelingParams,
) -> Result<Vec<ReconstructedObject>> {
    grid.check_channel(params.channel)?;

    let original: Vec<f32> = grid.channel_data(params.channel).to_vec();
    let foreground = original.iter().filter(|v| **v > 0.0).count();

    if foreground == 0 {
        return Ok(Vec::new());
    }
    if foreground == original.len() {
        return Err(CiliaError::DegenerateInput {
            channel: params.channel,
        });
    }

    let offsets = params.connectivity.offsets(params.timelapse);
    let mut work = original.clone();
    let mut retained: Vec<Vec<usize>> = Vec::new();
    let mut discarded = 0usize;

    for t in 0..grid.frames() {
        for z in 0..grid.depth() {
            for x in 0..grid.width() {
                for y in 0..grid.height() {
                    let offset = grid.offset(x, y, z, t);
                    if work[offset] <= 0.0 {
                        continue;
                    }

                    let members = flood_fill(grid, &mut work, offset, &offsets);
                    if meets_min_size(grid, &members, params) {
                        retained.push(members);
                    } else {
                        discarded += 1;
                    }
                }
            }
        }
    }

    log::debug!(
        "Channel {}: {} components kept, {} below minimum size {}",
        params.channel,
        retained.len(),
        discarded,
        params.min_size
    );

    // Rewrite the channel so that only retained voxels remain
    let channel_data = grid.channel_data_mut(params.channel);
    channel_data.iter_mut().for_each(|v| *v = 0.0);
    for members in &retained {
        for &offset in members {
            channel_data[offset] = original[offset];
        }
    }

    let grid: &VoxelGrid = grid;
    let objects = retained
        .into_iter()
        .enumerate()
        .map(|(idx, members)| {
            let points = members
                .into_iter()
                .map(|offset| {
                    let coord = grid.coordinate_of(offset);
                    ObjectPoint {
                        coord,
                        intensity: original[offset],
                        faces: exposed_faces(grid, &original, &coord),
                    }
                })
                .collect();
            ReconstructedObject::new(idx + 1, params.channel, points)
        })
        .collect();

    Ok(objects)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::voxel_grid::Calibration;
    use std::collections::HashSet;

    fn grid(w: usize, h: usize, d: usize, frames: usize) -> VoxelGrid {
        VoxelGrid::new(w, h, d, frames, 1, Calibration::default()).unwrap()
    }

    fn params(connectivity: Connectivity, min_size: usize) -> LabelingParams {
        LabelingParams {
            channel: 0,
            connectivity,
            min_size,
            timelapse: false,
        }
    }

    fn membership(objects: &[ReconstructedObject]) -> Vec<HashSet<VoxelCoordinate>> {
        let mut sets: Vec<HashSet<VoxelCoordinate>> = objects
            .iter()
            .map(|o| o.points.iter().map(|p| p.coord).collect())
            .collect();
        sets.sort_by_key(|s| s.iter().min().copied());
        sets
    }

    #[test]
    fn neighbourhood_sizes() {
        assert_eq!(Connectivity::FaceOnly.offsets(false).len(), 6);
        assert_eq!(Connectivity::FaceDiagonal.offsets(false).len(), 26);
        assert_eq!(Connectivity::FaceOnly.offsets(true).len(), 8);
        assert_eq!(Connectivity::FaceDiagonal.offsets(true).len(), 80);
    }

    #[test]
    fn straight_line_is_one_component() {
        let mut g = grid(3, 3, 22, 1);
        for z in 1..21 {
            g.set(1, 1, z, 0, 0, 100.0);
        }
        let objects = label_components(&mut g, &params(Connectivity::FaceOnly, 1)).unwrap();
        assert_eq!(objects.len(), 1);
        assert_eq!(objects[0].voxel_count(), 20);
    }

    #[test]
    fn separated_voxels_stay_apart() {
        let mut g = grid(5, 3, 1, 1);
        g.set(1, 1, 0, 0, 0, 10.0);
        g.set(3, 1, 0, 0, 0, 10.0);
        let objects = label_components(&mut g, &params(Connectivity::FaceOnly, 1)).unwrap();
        assert_eq!(objects.len(), 2);
        assert!(objects.iter().all(|o| o.voxel_count() == 1));
    }

    #[test]
    fn diagonal_neighbours_merge_only_with_diagonal_connectivity() {
        let mut g = grid(4, 4, 1, 1);
        g.set(1, 1, 0, 0, 0, 10.0);
        g.set(2, 2, 0, 0, 0, 10.0);

        let mut face = g.clone();
        let objects = label_components(&mut face, &params(Connectivity::FaceOnly, 1)).unwrap();
        assert_eq!(objects.len(), 2);

        let objects = label_components(&mut g, &params(Connectivity::FaceDiagonal, 1)).unwrap();
        assert_eq!(objects.len(), 1);
        assert_eq!(objects[0].voxel_count(), 2);
    }

    #[test]
    fn small_components_are_erased() {
        let mut g = grid(5, 5, 1, 1);
        g.set(1, 1, 0, 0, 0, 10.0);
        g.set(1, 2, 0, 0, 0, 12.0);
        let objects = label_components(&mut g, &params(Connectivity::FaceOnly, 3)).unwrap();
        assert!(objects.is_empty());
        assert!(g.channel_data(0).iter().all(|v| *v == 0.0));
    }

    #[test]
    fn union_matches_large_foreground_and_intensities_survive() {
        let mut g = grid(8, 8, 2, 1);
        // 4-voxel blob
        for (x, y) in [(1, 1), (1, 2), (2, 1), (2, 2)] {
            g.set(x, y, 0, 0, 0, 50.0 + x as f32);
        }
        // isolated noise voxel
        g.set(6, 6, 1, 0, 0, 9.0);
        // 2-voxel blob across slices
        g.set(5, 1, 0, 0, 0, 20.0);
        g.set(5, 1, 1, 0, 0, 21.0);

        let objects = label_components(&mut g, &params(Connectivity::FaceOnly, 2)).unwrap();
        let sets = membership(&objects);
        assert_eq!(sets.len(), 2);
        let total: usize = sets.iter().map(|s| s.len()).sum();
        let union: HashSet<VoxelCoordinate> = sets.iter().flatten().copied().collect();
        assert_eq!(total, union.len());
        assert_eq!(union.len(), 6);

        assert_eq!(g.get(6, 6, 1, 0, 0), 0.0);
        assert_eq!(g.get(2, 2, 0, 0, 0), 52.0);
        let remaining = g.channel_data(0).iter().filter(|v| **v > 0.0).count();
        assert_eq!(remaining, 6);
    }

    #[test]
    fn relabeling_a_copy_gives_the_same_membership() {
        let mut g = grid(6, 6, 3, 1);
        for (x, y, z) in [(0, 0, 0), (1, 1, 1), (2, 2, 2), (4, 4, 0), (5, 5, 0), (4, 5, 1)] {
            g.set(x, y, z, 0, 0, 1.0);
        }
        let mut first = g.clone();
        let mut second = g.clone();
        let p = params(Connectivity::FaceDiagonal, 1);
        let a = label_components(&mut first, &p).unwrap();
        let b = label_components(&mut second, &p).unwrap();
        assert_eq!(membership(&a), membership(&b));
    }

    #[test]
    fn empty_channel_yields_nothing() {
        let mut g = grid(3, 3, 1, 1);
        let objects = label_components(&mut g, &params(Connectivity::FaceOnly, 1)).unwrap();
        assert!(objects.is_empty());
    }

    #[test]
    fn fully_foreground_channel_is_rejected() {
        let mut g = grid(2, 2, 1, 1);
        g.channel_data_mut(0).iter_mut().for_each(|v| *v = 1.0);
        let err = label_components(&mut g, &params(Connectivity::FaceOnly, 1)).unwrap_err();
        assert!(matches!(err, CiliaError::DegenerateInput { channel: 0 }));
    }

    #[test]
    fn unknown_channel_is_rejected() {
        let mut g = grid(2, 2, 1, 1);
        let mut p = params(Connectivity::FaceOnly, 1);
        p.channel = 3;
        assert!(matches!(
            label_components(&mut g, &p),
            Err(CiliaError::ChannelOutOfRange { channel: 3, available: 1 })
        ));
    }

    #[test]
    fn isolated_voxel_exposes_all_faces() {
        let mut g = grid(3, 3, 3, 1);
        g.set(1, 1, 1, 0, 0, 5.0);
        let objects = label_components(&mut g, &params(Connectivity::FaceOnly, 1)).unwrap();
        let faces = objects[0].points[0].faces;
        assert_eq!((faces.x, faces.y, faces.z), (2, 2, 2));
    }

    #[test]
    fn timelapse_links_frames_and_rejects_thin_frames() {
        let mut g = grid(4, 4, 1, 2);
        // frame 0: two voxels, frame 1: one voxel at the same spot
        g.set(1, 1, 0, 0, 0, 5.0);
        g.set(2, 1, 0, 0, 0, 5.0);
        g.set(1, 1, 0, 1, 0, 5.0);

        let mut p = params(Connectivity::FaceOnly, 1);
        p.timelapse = true;
        let mut linked = g.clone();
        let objects = label_components(&mut linked, &p).unwrap();
        assert_eq!(objects.len(), 1);
        assert_eq!(objects[0].voxel_count(), 3);

        // Overall size 3 passes, but frame 1 alone is too small
        p.min_size = 2;
        let objects = label_components(&mut g, &p).unwrap();
        assert!(objects.is_empty());
        assert!(g.channel_data(0).iter().all(|v| *v == 0.0));
    }
}
