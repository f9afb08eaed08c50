//! Cosmic-ray detection seam
//!
//! Tools only see [`CosmicRayDetector`]: give it an image, get back a mask and
//! a cleaned image of the same shape. The production implementation drives an
//! external engine process, see [`ExternalDetector`].

pub mod deepcr;
mod external;
pub mod lacosmic;

pub use deepcr::{DeepCrModel, DeepCrParams, Preset};
pub use external::ExternalDetector;
pub use lacosmic::{CleanType, FsMode, LaCosmicParams, PsfModel};

use std::io;

use thiserror::Error;

use crate::format::FormatError;
use crate::image::{Image, Mask};
use crate::types::Dimensions;

#[derive(Debug, Error)]
pub enum DetectError {
    #[error("Invalid parameters: {0}")]
    InvalidParameters(String),

    #[error("Failed to prepare engine workspace: {0}")]
    Workspace(#[source] io::Error),

    #[error("Failed to exchange image with engine: {0}")]
    Exchange(#[from] FormatError),

    #[error("Failed to launch engine '{program}': {source}")]
    Launch { program: String, source: io::Error },

    #[error("Engine '{program}' failed ({status}): {stderr}")]
    EngineFailed {
        program: String,
        status: String,
        stderr: String,
    },

    #[error("Engine returned a {actual} {what} for a {expected} image")]
    ShapeMismatch {
        what: &'static str,
        expected: Dimensions,
        actual: Dimensions,
    },
}

/// Result of one detection run
#[derive(Debug, Clone, PartialEq)]
pub struct Detection {
    pub mask: Mask,
    pub cleaned: Image,
}

impl Detection {
    /// Pair a mask with its cleaned image, both must match `input`
    pub fn new(input: Dimensions, mask: Mask, cleaned: Image) -> Result<Self, DetectError> {
        if mask.dimensions() != input {
            return Err(DetectError::ShapeMismatch {
                what: "mask",
                expected: input,
                actual: mask.dimensions(),
            });
        }
        if cleaned.dimensions() != input {
            return Err(DetectError::ShapeMismatch {
                what: "cleaned image",
                expected: input,
                actual: cleaned.dimensions(),
            });
        }
        Ok(Self { mask, cleaned })
    }
}

pub trait CosmicRayDetector {
    /// Short engine name for logs and error messages
    fn name(&self) -> &str;

    /// Detect and repair cosmic-ray hits in `image`
    fn detect(&self, image: &Image) -> Result<Detection, DetectError>;
}

/// Parameters forwarded to a detection engine
pub trait EngineParams {
    /// Check value ranges before any file is touched
    fn validate(&self) -> Result<(), DetectError>;

    /// `(name, value)` pairs, passed as `--name value`
    fn engine_args(&self) -> Vec<(&'static str, String)>;
}
