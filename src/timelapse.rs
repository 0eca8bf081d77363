// src/timelapse.rs - Tracked objects across frames

use std::collections::BTreeMap;

use serde::Serialize;

use crate::objects::{ObjectPoint, ReconstructedObject};

/// Time-averaged descriptors over the included frames of an entity
#[derive(Debug, Clone, Default, Serialize)]
pub struct TimeAverages {
    pub included_frames: usize,
    pub volume: Option<f64>,
    pub surface: Option<f64>,
    pub shape_complexity: Option<f64>,
    pub arc_length: Option<f64>,
    pub bending_index: Option<f64>,
}

/// One object followed through time, at most one member per frame
#[derive(Debug, Clone, Serialize)]
pub struct TimelapseEntity {
    pub id: usize,
    /// Members ordered by frame
    pub frames: Vec<ReconstructedObject>,
    pub averages: TimeAverages,
    pub skl_available_in_all_frames: bool,
    pub excluded: bool,
}

/// Split a 4D component into one object per occupied frame, ordered by frame.
/// Every part keeps the component id.
pub fn split_by_frame(component: &ReconstructedObject) -> Vec<ReconstructedObject> {
    let mut per_frame: BTreeMap<usize, Vec<ObjectPoint>> = BTreeMap::new();
    for point in &component.points {
        per_frame.entry(point.coord.t).or_default().push(*point);
    }

    per_frame
        .into_values()
        .map(|points| ReconstructedObject::new(component.id, component.channel, points))
        .collect()
}

fn mean(values: impl Iterator<Item = f64>) -> Option<f64> {
    let (sum, n) = values.fold((0.0, 0usize), |(s, n), v| (s + v, n + 1));
    (n > 0).then(|| sum / n as f64)
}

/// Average the descriptors of the frames that are not excluded
pub fn time_averages(frames: &[ReconstructedObject]) -> TimeAverages {
    let included: Vec<&ReconstructedObject> = frames.iter().filter(|f| !f.excluded).collect();
    let shapes = || included.iter().filter_map(|f| f.shape.as_ref());
    let geometries = || included.iter().filter_map(|f| f.geometry.as_ref());

    TimeAverages {
        included_frames: included.len(),
        volume: mean(shapes().map(|s| s.volume)),
        surface: mean(shapes().map(|s| s.surface)),
        shape_complexity: mean(shapes().map(|s| s.shape_complexity).filter(|v| v.is_finite())),
        arc_length: mean(geometries().map(|g| g.arc_length)),
        bending_index: mean(geometries().filter_map(|g| g.bending_index)),
    }
}

/// Wrap the enriched per-frame parts of one component
pub fn build_entity(id: usize, mut frames: Vec<ReconstructedObject>) -> TimelapseEntity {
    frames.sort_by_key(|f| f.frame());

    let excluded = frames.iter().any(|f| f.excluded);
    let skl_available_in_all_frames = !frames.is_empty() && frames.iter().all(|f| f.skeleton_available());
    let averages = time_averages(&frames);

    TimelapseEntity {
        id,
        frames,
        averages,
        skl_available_in_all_frames,
        excluded,
    }
}
