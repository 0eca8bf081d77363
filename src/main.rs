// src/main.rs - Command-line entry point for batch and single-stack runs

use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{bail, Context, Result};
use clap::{Parser, ValueEnum};

use cilia_recon_lib::{
    analyze_volume, load_stack, write_filtered_stack, write_results, Config, Connectivity,
    GeodesicPathOracle, LogSink,
};

/// Command-line arguments
#[derive(Parser, Debug)]
#[clap(author, version, about = "cilia_recon - 3D/4D cilia reconstruction")]
struct Args {
    /// Stack directory (one sub-directory per channel), or a directory of stacks with --batch
    #[clap(short, long)]
    input: Option<String>,

    /// Path to output directory
    #[clap(short, long)]
    output: Option<String>,

    /// Path to configuration file
    #[clap(short, long, default_value = "config.toml")]
    config: String,

    /// Channel holding the segmented objects (overwrites config)
    #[clap(long)]
    channel: Option<usize>,

    /// Landmark channel for base detection (overwrites config)
    #[clap(long)]
    landmark: Option<usize>,

    /// Connectivity (overwrites config)
    #[clap(long)]
    connectivity: Option<ConnectivityArg>,

    /// Treat the stack as a timelapse
    #[clap(long)]
    timelapse: bool,

    /// Process every stack directory inside the input directory
    #[clap(long)]
    batch: bool,

    /// Write the default configuration to the config path and exit
    #[clap(long)]
    write_default_config: bool,

    /// Enable debug logging
    #[clap(short, long)]
    debug: bool,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum ConnectivityArg {
    Face,
    Diagonal,
}

fn process_stack(stack_dir: &Path, config: &Config) -> Result<()> {
    let stem = stack_dir
        .file_name()
        .and_then(|s| s.to_str())
        .unwrap_or("stack")
        .to_string();

    let mut grid = load_stack(stack_dir, config.calibration.clone(), config.slices_per_frame)
        .with_context(|| format!("failed to load stack {}", stack_dir.display()))?;

    let result = analyze_volume(&mut grid, config, &GeodesicPathOracle, &LogSink, None)
        .with_context(|| format!("analysis of {} failed", stack_dir.display()))?;

    let written = write_results(&result, config, &config.output_base_dir, &stem)
        .with_context(|| format!("failed to write results for {}", stem))?;
    for path in written {
        log::info!("Wrote {}", path.display());
    }

    if config.write_filtered_stack {
        let dirs = write_filtered_stack(&grid, config, &config.output_base_dir, &stem)
            .with_context(|| format!("failed to write filtered stack for {}", stem))?;
        for dir in dirs {
            log::info!("Wrote filtered slices to {}", dir.display());
        }
    }

    Ok(())
}

/// Stack directories directly inside a batch directory
fn stack_dirs(batch_dir: &Path) -> Result<Vec<PathBuf>> {
    let mut dirs: Vec<PathBuf> = std::fs::read_dir(batch_dir)
        .with_context(|| format!("cannot read {}", batch_dir.display()))?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| p.is_dir())
        .collect();
    dirs.sort();
    Ok(dirs)
}

fn main() -> Result<()> {
    let args = Args::parse();

    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(if args.debug { "debug" } else { "info" }),
    )
    .init();

    if args.write_default_config {
        Config::default().save_to_file(&args.config)?;
        log::info!("Default configuration written to {}", args.config);
        return Ok(());
    }

    // Load configuration
    let mut config = Config::from_file(&args.config)
        .with_context(|| format!("cannot load configuration {}", args.config))?;

    // Override config with command-line arguments
    if let Some(input) = args.input.clone() {
        config.input_path = input;
    }

    if let Some(output) = args.output.clone() {
        config.output_base_dir = output;
    }

    if let Some(channel) = args.channel {
        config.reconstruction_channel = channel;
    }

    if let Some(landmark) = args.landmark {
        config.landmark_channel = Some(landmark);
    }

    if let Some(connectivity) = args.connectivity {
        config.connectivity = match connectivity {
            ConnectivityArg::Face => Connectivity::FaceOnly,
            ConnectivityArg::Diagonal => Connectivity::FaceDiagonal,
        };
    }

    if args.timelapse {
        config.timelapse = true;
    }

    config.validate()?;
    config.prepare_paths()?;

    let start_time = Instant::now();
    let input_path = PathBuf::from(&config.input_path);

    if !input_path.is_dir() {
        bail!("input {} is not a directory", input_path.display());
    }

    if args.batch {
        let stacks = stack_dirs(&input_path)?;
        log::info!("Found {} stacks", stacks.len());
        for stack in &stacks {
            log::info!("Processing: {}", stack.display());
            if let Err(e) = process_stack(stack, &config) {
                log::error!("{:#}", e);
            }
        }
    } else {
        log::info!("Processing: {}", input_path.display());
        process_stack(&input_path, &config)?;
    }

    log::info!("Processing completed in {:.2} seconds", start_time.elapsed().as_secs_f64());

    Ok(())
}
