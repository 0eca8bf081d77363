// src/image_io.rs - Z-stack loading from directories of slice images

use std::fs;
use std::path::{Path, PathBuf};

use image::ImageBuffer;

use crate::errors::{CiliaError, Result};
use crate::voxel_grid::{Calibration, VoxelGrid};

const SLICE_EXTENSIONS: [&str; 3] = ["png", "tif", "tiff"];

/// One decoded slice
struct Slice {
    width: u32,
    height: u32,
    values: Vec<f32>,
}

fn is_slice_file(path: &Path) -> bool {
    path.is_file()
        && path
            .extension()
            .and_then(|e| e.to_str())
            .map_or(false, |e| SLICE_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
}

/// Slice images directly inside a directory, sorted by file name
pub fn get_slice_files_in_dir<P: AsRef<Path>>(dir_path: P) -> Result<Vec<PathBuf>> {
    let dir_path = dir_path.as_ref();

    if !dir_path.is_dir() {
        return Err(CiliaError::InvalidPath(dir_path.to_path_buf()));
    }

    let mut files = Vec::new();
    for entry in fs::read_dir(dir_path)? {
        let path = entry?.path();
        if is_slice_file(&path) {
            files.push(path);
        }
    }
    files.sort();

    Ok(files)
}

/// Channel directories of a stack: sorted sub-directories holding slices,
/// or the directory itself when it holds the slices directly.
pub fn get_channel_dirs<P: AsRef<Path>>(stack_dir: P) -> Result<Vec<PathBuf>> {
    let stack_dir = stack_dir.as_ref();
    if !get_slice_files_in_dir(stack_dir)?.is_empty() {
        return Ok(vec![stack_dir.to_path_buf()]);
    }

    let mut dirs = Vec::new();
    for entry in fs::read_dir(stack_dir)? {
        let path = entry?.path();
        if path.is_dir() && !get_slice_files_in_dir(&path)?.is_empty() {
            dirs.push(path);
        }
    }
    dirs.sort();

    if dirs.is_empty() {
        return Err(CiliaError::Config(format!(
            "{} holds no slice images",
            stack_dir.display()
        )));
    }
    Ok(dirs)
}

/// Load one slice as 16-bit grayscale
fn load_slice(path: &Path) -> Result<Slice> {
    let img = image::open(path)?.to_luma16();
    let (width, height) = img.dimensions();
    Ok(Slice {
        width,
        height,
        values: img.into_raw().into_iter().map(f32::from).collect(),
    })
}

/// Load a multi-channel z-stack into a grid.
///
/// Slices are read in file-name order. With `slices_per_frame`, consecutive
/// groups of that many slices form successive frames.
///
/// # Arguments
/// * `stack_dir` - Directory with one sub-directory per channel, or the slices of a single channel
/// * `calibration` - Physical voxel size and frame interval
/// * `slices_per_frame` - Slices per time point, `None` for a single frame
pub fn load_stack<P: AsRef<Path>>(
    stack_dir: P,
    calibration: Calibration,
    slices_per_frame: Option<usize>,
) -> Result<VoxelGrid> {
    let stack_dir = stack_dir.as_ref();
    let channel_dirs = get_channel_dirs(stack_dir)?;

    let mut channels: Vec<Vec<Slice>> = Vec::with_capacity(channel_dirs.len());
    for dir in &channel_dirs {
        let slices = get_slice_files_in_dir(dir)?
            .iter()
            .map(|path| load_slice(path))
            .collect::<Result<Vec<_>>>()?;
        channels.push(slices);
    }

    let first = &channels[0][0];
    let (width, height) = (first.width, first.height);
    let slice_count = channels[0].len();

    for (dir, slices) in channel_dirs.iter().zip(channels.iter()) {
        if slices.len() != slice_count {
            return Err(CiliaError::Grid(format!(
                "{} has {} slices, expected {}",
                dir.display(),
                slices.len(),
                slice_count
            )));
        }
        if slices.iter().any(|s| s.width != width || s.height != height) {
            return Err(CiliaError::Grid(format!(
                "{} holds slices that are not {}x{}",
                dir.display(),
                width,
                height
            )));
        }
    }

    let depth = slices_per_frame.unwrap_or(slice_count);
    if depth == 0 || slice_count % depth != 0 {
        return Err(CiliaError::Grid(format!(
            "{} slices cannot be split into frames of {}",
            slice_count, depth
        )));
    }
    let frames = slice_count / depth;

    let mut grid = VoxelGrid::new(
        width as usize,
        height as usize,
        depth,
        frames,
        channels.len(),
        calibration,
    )?;

    for (c, slices) in channels.iter().enumerate() {
        for (i, slice) in slices.iter().enumerate() {
            let (t, z) = (i / depth, i % depth);
            for (idx, value) in slice.values.iter().enumerate() {
                let x = idx % width as usize;
                let y = idx / width as usize;
                grid.set(x, y, z, t, c, *value);
            }
        }
    }

    log::info!(
        "Loaded {}: {}x{}x{}, {} frames, {} channels",
        stack_dir.display(),
        width,
        height,
        depth,
        frames,
        channels.len()
    );

    Ok(grid)
}

/// Write one channel of one frame back as 16-bit PNG slices
pub fn save_channel_slices<P: AsRef<Path>>(
    grid: &VoxelGrid,
    channel: usize,
    frame: usize,
    out_dir: P,
) -> Result<()> {
    grid.check_channel(channel)?;
    let out_dir = out_dir.as_ref();
    fs::create_dir_all(out_dir)?;

    for z in 0..grid.depth() {
        let img: ImageBuffer<image::Luma<u16>, Vec<u16>> =
            ImageBuffer::from_fn(grid.width() as u32, grid.height() as u32, |x, y| {
                let v = grid.get(x as usize, y as usize, z, frame, channel);
                image::Luma([v.round().clamp(0.0, u16::MAX as f32) as u16])
            });
        img.save(out_dir.join(format!("slice_{:04}.png", z)))?;
    }

    Ok(())
}
