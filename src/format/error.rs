use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while reading or writing FITS/XISF containers
#[derive(Debug, Error)]
pub enum FormatError {
    #[error("Failed to read '{}': {source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to write '{}': {source}", path.display())]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("FITS I/O failed for '{}': {source}", path.display())]
    Fits {
        path: PathBuf,
        source: fitsio::errors::Error,
    },

    #[error("Unsupported file format: '{extension}' (supported: .fits, .fit, .fts, .xisf)")]
    UnsupportedFormat { extension: String },

    #[error("Invalid FITS file: {0}")]
    InvalidFits(String),

    #[error("Invalid XISF file: {0}")]
    InvalidXisf(String),

    #[error("Unsupported XISF sample format: {0}")]
    UnsupportedSampleFormat(String),

    #[error("Unsupported XISF compression codec: {0}")]
    UnsupportedCompression(String),

    #[error("No image data found in {}", .0.display())]
    NoImageData(PathBuf),

    #[error("Expected 2D image, got {0}D data")]
    UnsupportedDimensions(usize),

    #[error("Pixel count mismatch: expected {expected}, got {actual}")]
    PixelCountMismatch { expected: usize, actual: usize },

    #[error("Multi-channel images are not supported. Image shape: {0:?}")]
    MultiChannel(Vec<usize>),
}

pub type Result<T> = std::result::Result<T, FormatError>;
