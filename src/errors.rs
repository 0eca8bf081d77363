// src/errors.rs - Library error type and result alias

use thiserror::Error;
use std::io;
use std::path::PathBuf;

/// Custom error types for the cilia reconstruction engine
#[derive(Error, Debug)]
pub enum CiliaError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Image decoding error: {0}")]
    Image(#[from] image::ImageError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Failed to load configuration from {path}: {source}")]
    ConfigLoad {
        source: toml::de::Error,
        path: PathBuf,
    },

    #[error("Channel {channel} is out of range (grid has {available} channels)")]
    ChannelOutOfRange { channel: usize, available: usize },

    #[error("Channel {channel} is entirely foreground; input does not look segmented")]
    DegenerateInput { channel: usize },

    #[error("Grid error: {0}")]
    Grid(String),

    #[error("CSV output error: {0}")]
    CsvOutput(#[from] csv::Error),

    #[error("JSON output error: {0}")]
    JsonOutput(#[from] serde_json::Error),

    #[error("Invalid input path: {0}")]
    InvalidPath(PathBuf),

    #[error("Analysis cancelled")]
    Cancelled,
}

/// Type alias for Result with our custom error type
pub type Result<T> = std::result::Result<T, CiliaError>;
