// src/output.rs - CSV tables and JSON summary of an analysis pass

use std::fs::{self, File};
use std::io::BufWriter;
use std::path::{Path, PathBuf};

use csv::Writer;
use serde::Serialize;

use crate::config::Config;
use crate::errors::Result;
use crate::image_io::save_channel_slices;
use crate::objects::ReconstructedObject;
use crate::pipeline::AnalysisResult;
use crate::threshold::ThresholdTable;
use crate::timelapse::TimelapseEntity;
use crate::voxel_grid::VoxelGrid;

fn fmt(value: f64) -> String {
    format!("{:.6}", value)
}

/// Empty cell for "not measured"
fn fmt_opt(value: Option<f64>) -> String {
    value.map(fmt).unwrap_or_default()
}

fn create_writer(path: &Path) -> Result<Writer<File>> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    Ok(Writer::from_path(path)?)
}

/// Write one row per object (per frame in timelapse mode)
pub fn write_objects_csv<P: AsRef<Path>>(result: &AnalysisResult, path: P) -> Result<()> {
    let mut writer = create_writer(path.as_ref())?;
    let channels: Vec<usize> = result.thresholds.iter().map(|(c, _)| c).collect();

    let mut header: Vec<String> = [
        "ID",
        "Frame",
        "Voxels",
        "Volume",
        "Surface",
        "Shape_Complexity",
        "Sphere_Radius",
        "Centroid_X",
        "Centroid_Y",
        "Centroid_Z",
        "Extent_X",
        "Extent_Y",
        "Extent_Z",
        "Min_Intensity",
        "Max_Intensity",
        "Mean_Intensity",
        "Excluded",
        "Skeleton",
        "Arc_Length",
        "Chord_Length",
        "Bending_Index",
        "Orientation_X",
        "Orientation_Y",
        "Orientation_Z",
        "Mean_Abs_Curvature",
        "Max_Abs_Curvature",
        "Branches",
        "Avg_Branch_Length",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect();
    for c in &channels {
        header.push(format!("C{}_Mean_Intensity", c));
        header.push(format!("C{}_Coloc_Fraction", c));
        header.push(format!("C{}_Coloc_Length", c));
        header.push(format!("C{}_Coloc_Percentage", c));
    }
    writer.write_record(&header)?;

    for object in result.all_objects() {
        writer.write_record(&object_record(object, &channels))?;
    }

    writer.flush()?;
    Ok(())
}

fn object_record(object: &ReconstructedObject, channels: &[usize]) -> Vec<String> {
    let mut record = vec![
        object.id.to_string(),
        object.frame().to_string(),
        object.voxel_count().to_string(),
    ];

    match &object.shape {
        Some(s) => record.extend([
            fmt(s.volume),
            fmt(s.surface),
            fmt(s.shape_complexity),
            fmt(s.sphere_radius),
            fmt(s.centroid.x),
            fmt(s.centroid.y),
            fmt(s.centroid.z),
            fmt(s.extent.x),
            fmt(s.extent.y),
            fmt(s.extent.z),
            fmt(s.min_intensity),
            fmt(s.max_intensity),
            fmt(s.mean_intensity),
        ]),
        None => record.extend(std::iter::repeat(String::new()).take(13)),
    }

    record.push(object.excluded.to_string());
    record.push(format!("{:?}", object.skeleton));

    match &object.geometry {
        Some(g) => record.extend([
            fmt(g.arc_length),
            fmt(g.chord_length),
            fmt_opt(g.bending_index),
            fmt(g.orientation.x),
            fmt(g.orientation.y),
            fmt(g.orientation.z),
            fmt(g.mean_abs_curvature),
            fmt(g.max_abs_curvature),
            g.branch_count.map(|b| b.to_string()).unwrap_or_default(),
            fmt_opt(g.average_branch_length),
        ]),
        None => record.extend(std::iter::repeat(String::new()).take(10)),
    }

    for &channel in channels {
        let coloc = object.colocalization.iter().find(|c| c.channel == channel);
        let profile = object
            .centerline
            .as_ref()
            .and_then(|p| p.profiles.iter().find(|pr| pr.channel == channel));
        record.push(fmt_opt(coloc.map(|c| c.mean_intensity)));
        record.push(fmt_opt(coloc.map(|c| c.colocalized_fraction)));
        record.push(fmt_opt(profile.and_then(|p| p.colocalized_length)));
        record.push(fmt_opt(profile.and_then(|p| p.colocalized_percentage)));
    }

    record
}

/// Write one row per tracked entity with its time averages
pub fn write_entities_csv<P: AsRef<Path>>(entities: &[TimelapseEntity], path: P) -> Result<()> {
    let mut writer = create_writer(path.as_ref())?;

    writer.write_record([
        "ID",
        "Frames",
        "Included_Frames",
        "First_Frame",
        "Last_Frame",
        "Excluded",
        "Skeleton_In_All_Frames",
        "Avg_Volume",
        "Avg_Surface",
        "Avg_Shape_Complexity",
        "Avg_Arc_Length",
        "Avg_Bending_Index",
    ])?;

    for entity in entities {
        let first = entity.frames.first().map(|f| f.frame().to_string()).unwrap_or_default();
        let last = entity.frames.last().map(|f| f.frame().to_string()).unwrap_or_default();
        let a = &entity.averages;
        writer.write_record(&[
            entity.id.to_string(),
            entity.frames.len().to_string(),
            a.included_frames.to_string(),
            first,
            last,
            entity.excluded.to_string(),
            entity.skl_available_in_all_frames.to_string(),
            fmt_opt(a.volume),
            fmt_opt(a.surface),
            fmt_opt(a.shape_complexity),
            fmt_opt(a.arc_length),
            fmt_opt(a.bending_index),
        ])?;
    }

    writer.flush()?;
    Ok(())
}

/// Write every centerline point with its geometry and channel samples
pub fn write_centerlines_csv<P: AsRef<Path>>(result: &AnalysisResult, path: P) -> Result<()> {
    let mut writer = create_writer(path.as_ref())?;

    writer.write_record([
        "ID",
        "Frame",
        "Point_Index",
        "X",
        "Y",
        "Z",
        "Arc_Length",
        "Tangent_X",
        "Tangent_Y",
        "Tangent_Z",
        "Curvature",
        "Channel",
        "Intensity",
        "Normalized_Intensity",
    ])?;

    for object in result.all_objects() {
        let Some(path) = &object.centerline else {
            continue;
        };
        for (i, p) in path.points().iter().enumerate() {
            let tangent = path.tangents.get(i);
            let mut base = vec![
                object.id.to_string(),
                object.frame().to_string(),
                i.to_string(),
                fmt(p.x),
                fmt(p.y),
                fmt(p.z),
                fmt(path.arc_length()[i]),
                fmt_opt(tangent.map(|t| t.x)),
                fmt_opt(tangent.map(|t| t.y)),
                fmt_opt(tangent.map(|t| t.z)),
                fmt_opt(path.curvature.get(i).copied()),
            ];

            if path.profiles.is_empty() {
                base.extend([String::new(), String::new(), String::new()]);
                writer.write_record(&base)?;
                continue;
            }
            for profile in &path.profiles {
                let mut record = base.clone();
                record.push(profile.channel.to_string());
                record.push(fmt(profile.samples[i]));
                record.push(fmt_opt(profile.normalized.as_ref().map(|n| n[i])));
                writer.write_record(&record)?;
            }
        }
    }

    writer.flush()?;
    Ok(())
}

/// Write the arc-length resampled profiles, one row per bin
pub fn write_profiles_csv<P: AsRef<Path>>(result: &AnalysisResult, path: P) -> Result<()> {
    let mut writer = create_writer(path.as_ref())?;

    writer.write_record(["ID", "Frame", "Channel", "Bin", "Position", "Intensity", "Above_Threshold"])?;

    for object in result.all_objects() {
        let Some(path) = &object.centerline else {
            continue;
        };
        for profile in &path.profiles {
            for (bin, value) in profile.resampled.iter().enumerate() {
                writer.write_record(&[
                    object.id.to_string(),
                    object.frame().to_string(),
                    profile.channel.to_string(),
                    bin.to_string(),
                    fmt(bin as f64 * profile.step),
                    fmt(*value),
                    profile.threshold.map(|t| (*value > t).to_string()).unwrap_or_default(),
                ])?;
            }
        }
    }

    writer.flush()?;
    Ok(())
}

/// Compact description of a run
#[derive(Debug, Serialize)]
pub struct RunSummary<'a> {
    pub source: String,
    pub object_count: usize,
    pub excluded_count: usize,
    pub centerline_count: usize,
    pub entity_count: usize,
    pub thresholds: &'a ThresholdTable,
    pub config: &'a Config,
}

impl<'a> RunSummary<'a> {
    pub fn new(source: &str, result: &'a AnalysisResult, config: &'a Config) -> Self {
        Self {
            source: source.to_string(),
            object_count: result.all_objects().count(),
            excluded_count: result.all_objects().filter(|o| o.excluded).count(),
            centerline_count: result.all_objects().filter(|o| o.skeleton_available()).count(),
            entity_count: result.entities.len(),
            thresholds: &result.thresholds,
            config,
        }
    }
}

/// Write the run summary as pretty JSON
pub fn write_summary_json<P: AsRef<Path>>(summary: &RunSummary, path: P) -> Result<()> {
    let path = path.as_ref();
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let writer = BufWriter::new(File::create(path)?);
    serde_json::to_writer_pretty(writer, summary)?;
    Ok(())
}

/// Write all result files for one stack into `output_dir`
///
/// # Returns
/// Paths of the files written
pub fn write_results<P: AsRef<Path>>(
    result: &AnalysisResult,
    config: &Config,
    output_dir: P,
    stem: &str,
) -> Result<Vec<PathBuf>> {
    let output_dir = output_dir.as_ref();
    let mut written = Vec::new();

    let objects_path = output_dir.join(format!("{}_objects.csv", stem));
    write_objects_csv(result, &objects_path)?;
    written.push(objects_path);

    if config.timelapse {
        let entities_path = output_dir.join(format!("{}_entities.csv", stem));
        write_entities_csv(&result.entities, &entities_path)?;
        written.push(entities_path);
    }

    if config.write_profiles {
        let centerlines_path = output_dir.join(format!("{}_centerlines.csv", stem));
        write_centerlines_csv(result, &centerlines_path)?;
        written.push(centerlines_path);

        let profiles_path = output_dir.join(format!("{}_profiles.csv", stem));
        write_profiles_csv(result, &profiles_path)?;
        written.push(profiles_path);
    }

    let summary_path = output_dir.join(format!("{}_summary.json", stem));
    write_summary_json(&RunSummary::new(stem, result, config), &summary_path)?;
    written.push(summary_path);

    Ok(written)
}

/// Write the reconstruction channel, as left by the labeling stage, one
/// slice directory per frame under `<stem>_filtered/`
pub fn write_filtered_stack<P: AsRef<Path>>(
    grid: &VoxelGrid,
    config: &Config,
    output_dir: P,
    stem: &str,
) -> Result<Vec<PathBuf>> {
    let base = output_dir.as_ref().join(format!("{}_filtered", stem));
    let mut written = Vec::with_capacity(grid.frames());

    for t in 0..grid.frames() {
        let frame_dir = if grid.frames() > 1 {
            base.join(format!("t{:03}", t))
        } else {
            base.clone()
        };
        save_channel_slices(grid, config.reconstruction_channel, t, &frame_dir)?;
        written.push(frame_dir);
    }

    Ok(written)
}
