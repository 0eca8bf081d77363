// src/path_algorithms.rs - Breadth-first path search inside binary sub-volumes

use std::collections::VecDeque;

use crate::image_utils::SubVolume;
use crate::labeling::Connectivity;
use crate::skeleton::{LatticePoint, SkeletonAnalysis, SkeletonOracle, TreeStats};

/// Euclidean length of a lattice polyline
///
/// # Arguments
/// * `path` - Ordered lattice points
///
/// # Returns
/// Sum of the distances between consecutive points, 0.0 for fewer than two points
pub fn calculate_lattice_path_length(path: &[LatticePoint]) -> f64 {
    if path.len() < 2 {
        return 0.0;
    }

    path.windows(2)
        .map(|w| {
            let dx = (w[1][0] - w[0][0]) as f64;
            let dy = (w[1][1] - w[0][1]) as f64;
            let dz = (w[1][2] - w[0][2]) as f64;
            (dx * dx + dy * dy + dz * dz).sqrt()
        })
        .sum()
}

/// 26-neighbourhood with face neighbours first, then edges, then corners
fn neighbour_steps() -> Vec<[i64; 3]> {
    let mut steps: Vec<[i64; 3]> = Connectivity::FaceDiagonal
        .offsets(false)
        .into_iter()
        .map(|d| [d[0], d[1], d[2]])
        .collect();
    steps.sort_by_key(|d| d.iter().filter(|v| **v != 0).count());
    steps
}

/// Breadth-first search over the foreground of a sub-volume
struct Bfs<'a> {
    volume: &'a SubVolume,
    steps: Vec<[i64; 3]>,
}

impl<'a> Bfs<'a> {
    fn new(volume: &'a SubVolume) -> Self {
        Self {
            volume,
            steps: neighbour_steps(),
        }
    }

    fn index(&self, p: &LatticePoint) -> usize {
        ((p[2] as usize * self.volume.height()) + p[1] as usize) * self.volume.width() + p[0] as usize
    }

    fn point(&self, idx: usize) -> LatticePoint {
        let w = self.volume.width();
        let h = self.volume.height();
        [(idx % w) as i64, ((idx / w) % h) as i64, (idx / (w * h)) as i64]
    }

    fn len(&self) -> usize {
        self.volume.width() * self.volume.height() * self.volume.depth()
    }

    /// Hop distances and predecessors from `start`; unreached voxels keep `None`.
    fn run(&self, start: LatticePoint) -> (Vec<Option<u32>>, Vec<usize>) {
        let mut dist = vec![None; self.len()];
        let mut prev = vec![usize::MAX; self.len()];
        let mut queue = VecDeque::new();

        let start_idx = self.index(&start);
        dist[start_idx] = Some(0u32);
        prev[start_idx] = start_idx;
        queue.push_back(start);

        while let Some(current) = queue.pop_front() {
            let current_idx = self.index(&current);
            let d = dist[current_idx].unwrap_or(0);

            for step in &self.steps {
                let next = [current[0] + step[0], current[1] + step[1], current[2] + step[2]];
                if !self.volume.is_foreground(next[0], next[1], next[2]) {
                    continue;
                }
                let next_idx = self.index(&next);
                if dist[next_idx].is_some() {
                    continue;
                }
                dist[next_idx] = Some(d + 1);
                prev[next_idx] = current_idx;
                queue.push_back(next);
            }
        }

        (dist, prev)
    }

    /// Farthest reached voxel, lowest index on ties
    fn farthest(&self, dist: &[Option<u32>]) -> Option<usize> {
        let mut best: Option<(usize, u32)> = None;
        for (idx, d) in dist.iter().enumerate() {
            if let Some(d) = d {
                if best.map_or(true, |(_, b)| *d > b) {
                    best = Some((idx, *d));
                }
            }
        }
        best.map(|(idx, _)| idx)
    }

    /// Walk predecessors from `end` back to the search origin
    fn reconstruct(&self, prev: &[usize], end: usize) -> Vec<LatticePoint> {
        let mut path = vec![self.point(end)];
        let mut current = end;
        while prev[current] != current {
            current = prev[current];
            path.push(self.point(current));
        }
        path.reverse();
        path
    }
}

/// Default thinning stand-in: geodesic diameter of each foreground tree.
///
/// Every 26-connected foreground component counts as one tree with one
/// branch. The reported path is the longest double-sweep BFS path, starting
/// at the first sweep's far end. No junctions are reported.
#[derive(Debug, Default, Clone, Copy)]
pub struct GeodesicPathOracle;

impl SkeletonOracle for GeodesicPathOracle {
    fn analyze(&self, volume: &SubVolume) -> SkeletonAnalysis {
        let bfs = Bfs::new(volume);
        let mut claimed = vec![false; bfs.len()];
        let mut trees = Vec::new();
        let mut longest: Vec<LatticePoint> = Vec::new();
        let mut longest_length = -1.0;

        for seed in volume.foreground_points() {
            if claimed[bfs.index(&seed)] {
                continue;
            }

            // First sweep: claim the component and find one end
            let (dist, _) = bfs.run(seed);
            for (idx, d) in dist.iter().enumerate() {
                if d.is_some() {
                    claimed[idx] = true;
                }
            }
            let Some(a) = bfs.farthest(&dist) else {
                continue;
            };

            // Second sweep from that end
            let (dist, prev) = bfs.run(bfs.point(a));
            let Some(b) = bfs.farthest(&dist) else {
                continue;
            };
            let path = bfs.reconstruct(&prev, b);

            let length = calculate_lattice_path_length(&path);
            trees.push(TreeStats {
                branch_count: 1,
                average_branch_length: length,
            });
            if length > longest_length {
                longest_length = length;
                longest = path;
            }
        }

        SkeletonAnalysis {
            path_start: longest.first().copied(),
            trees,
            longest_path: longest,
            junctions: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::image_utils::FOREGROUND;
    use assert_approx_eq::assert_approx_eq;

    #[test]
    fn lattice_length_counts_diagonals() {
        let path = [[0, 0, 0], [1, 0, 0], [2, 1, 0], [3, 2, 1]];
        assert_approx_eq!(
            calculate_lattice_path_length(&path),
            1.0 + 2f64.sqrt() + 3f64.sqrt()
        );
        assert_eq!(calculate_lattice_path_length(&path[..1]), 0.0);
    }

    #[test]
    fn straight_bar_gives_end_to_end_path() {
        let mut volume = SubVolume::new(12, 3, 1);
        for x in 1..11 {
            volume.set(x, 1, 0, FOREGROUND);
        }
        let analysis = GeodesicPathOracle.analyze(&volume);
        assert_eq!(analysis.trees.len(), 1);
        assert_eq!(analysis.longest_path.len(), 10);
        assert_eq!(analysis.path_start, Some(analysis.longest_path[0]));
        let ends = [analysis.longest_path[0][0], analysis.longest_path[9][0]];
        assert!(ends.contains(&1) && ends.contains(&10));
        assert_approx_eq!(analysis.trees[0].average_branch_length, 9.0);
    }

    #[test]
    fn l_shape_follows_the_bend() {
        let mut volume = SubVolume::new(8, 8, 1);
        for x in 1..7 {
            volume.set(x, 1, 0, FOREGROUND);
        }
        for y in 1..7 {
            volume.set(1, y, 0, FOREGROUND);
        }
        let analysis = GeodesicPathOracle.analyze(&volume);
        let path = &analysis.longest_path;
        let ends = [path[0], path[path.len() - 1]];
        assert!(ends.contains(&[6, 1, 0]));
        assert!(ends.contains(&[1, 6, 0]));
    }

    #[test]
    fn separate_pieces_are_separate_trees() {
        let mut volume = SubVolume::new(10, 3, 1);
        volume.set(1, 1, 0, FOREGROUND);
        volume.set(2, 1, 0, FOREGROUND);
        volume.set(6, 1, 0, FOREGROUND);
        volume.set(7, 1, 0, FOREGROUND);
        volume.set(8, 1, 0, FOREGROUND);
        let analysis = GeodesicPathOracle.analyze(&volume);
        assert_eq!(analysis.trees.len(), 2);
        assert_eq!(analysis.longest_path.len(), 3);
    }

    #[test]
    fn empty_volume_has_no_tree() {
        let analysis = GeodesicPathOracle.analyze(&SubVolume::new(3, 3, 3));
        assert!(analysis.trees.is_empty());
        assert!(analysis.longest_path.is_empty());
        assert!(analysis.path_start.is_none());
    }
}
