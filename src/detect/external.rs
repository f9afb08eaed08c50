//! Detection delegated to an external engine process
//!
//! The image is handed over as a FITS file in a private temporary directory.
//! The engine is invoked as
//!
//! ```text
//! <program> [args..] --input <in.fits> --mask <mask.fits> --cleaned <out.fits> --<param> <value>..
//! ```
//!
//! and must write both outputs with the same shape as the input before
//! exiting with status 0. Non-zero mask samples mark cosmic rays.
//!
//! `engines/crr-lacosmic-engine` (astroscrappy) and `engines/crr-deepcr-engine`
//! (deepCR) implement this protocol and carry the default program names.

use std::path::Path;
use std::process::Command;
use std::time::Instant;

use tracing::{debug, info};

use super::{CosmicRayDetector, DeepCrParams, DetectError, Detection, EngineParams, LaCosmicParams};
use crate::config::EngineConfig;
use crate::format::{Header, fits, reduce_to_2d};
use crate::image::{Image, Mask};
use crate::types::SampleFormat;

/// Lines of engine stderr kept in error messages
const STDERR_TAIL_LINES: usize = 20;

#[derive(Debug, Clone)]
pub struct ExternalDetector {
    name: String,
    engine: EngineConfig,
    params: Vec<(&'static str, String)>,
    exchange_format: SampleFormat,
}

impl ExternalDetector {
    /// Validate `params` and prepare an engine invocation
    pub fn new(
        name: &str,
        engine: EngineConfig,
        params: &dyn EngineParams,
        exchange_format: SampleFormat,
    ) -> Result<Self, DetectError> {
        params.validate()?;
        Ok(Self {
            name: name.to_string(),
            engine,
            params: params.engine_args(),
            exchange_format,
        })
    }

    pub fn lacosmic(engine: EngineConfig, params: &LaCosmicParams) -> Result<Self, DetectError> {
        Self::new("L.A.Cosmic", engine, params, SampleFormat::Float64)
    }

    pub fn deepcr(engine: EngineConfig, params: &DeepCrParams) -> Result<Self, DetectError> {
        Self::new("DeepCR", engine, params, SampleFormat::Float32)
    }

    fn program(&self) -> String {
        self.engine.program.display().to_string()
    }

    fn command(&self, input: &Path, mask: &Path, cleaned: &Path) -> Command {
        let mut cmd = Command::new(&self.engine.program);
        cmd.args(&self.engine.args)
            .arg("--input")
            .arg(input)
            .arg("--mask")
            .arg(mask)
            .arg("--cleaned")
            .arg(cleaned);
        for (name, value) in &self.params {
            cmd.arg(format!("--{name}")).arg(value);
        }
        cmd
    }
}

fn read_plane(path: &Path) -> Result<Image, DetectError> {
    let (raw, _) = fits::read_fits(path)?;
    Ok(reduce_to_2d(raw)?)
}

fn stderr_tail(stderr: &[u8]) -> String {
    let text = String::from_utf8_lossy(stderr);
    let lines: Vec<&str> = text.lines().filter(|l| !l.trim().is_empty()).collect();
    if lines.is_empty() {
        return "no output on stderr".to_string();
    }
    let start = lines.len().saturating_sub(STDERR_TAIL_LINES);
    lines[start..].join("\n")
}

impl CosmicRayDetector for ExternalDetector {
    fn name(&self) -> &str {
        &self.name
    }

    fn detect(&self, image: &Image) -> Result<Detection, DetectError> {
        let workdir = tempfile::Builder::new()
            .prefix("crr-")
            .tempdir()
            .map_err(DetectError::Workspace)?;
        let input = workdir.path().join("input.fits");
        let mask = workdir.path().join("mask.fits");
        let cleaned = workdir.path().join("cleaned.fits");

        fits::write_fits(&input, image, &Header::new(), self.exchange_format)?;

        let mut cmd = self.command(&input, &mask, &cleaned);
        debug!(command = ?cmd, "launching engine");

        let start = Instant::now();
        let output = cmd.output().map_err(|source| DetectError::Launch {
            program: self.program(),
            source,
        })?;

        for line in String::from_utf8_lossy(&output.stdout).lines() {
            debug!(engine = %self.name, "{line}");
        }

        if !output.status.success() {
            return Err(DetectError::EngineFailed {
                program: self.program(),
                status: output.status.to_string(),
                stderr: stderr_tail(&output.stderr),
            });
        }
        info!(
            engine = %self.name,
            elapsed_ms = start.elapsed().as_millis(),
            "engine finished"
        );

        let mask = Mask::from_image(&read_plane(&mask)?);
        let cleaned = read_plane(&cleaned)?;
        Detection::new(image.dimensions(), mask, cleaned)
    }
}
