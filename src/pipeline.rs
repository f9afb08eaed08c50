//! End-to-end flows of the two tools
//!
//! Both run the same stages: validate parameters and paths, load, detect,
//! write. Only the L.A.Cosmic flow rescales normalized input, since its noise
//! model assumes detector counts.

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::cli::{DeepCrArgs, LaCosmicArgs};
use crate::detect::{CosmicRayDetector, DetectError, Detection, EngineParams};
use crate::format::{
    FormatError, Header, ImageFormat, LoadedImage, load_image, save_image, validate_min_size,
};
use crate::image::{Image, ImageStats, classify_and_scale, restore};
use crate::outdir::{OutputDirError, validate_output_dir};
use crate::types::{ScaleParameters, SampleFormat};

/// Smallest accepted width/height for L.A.Cosmic
pub const LACOSMIC_MIN_DIM: usize = 25;

const MASK_COMMENT: &str = "Cosmic ray mask: 1 = cosmic ray, 0 = clean pixel";

#[derive(Debug, Error)]
pub enum ProcessError {
    #[error("Input file not found: {}", .0.display())]
    InputNotFound(PathBuf),

    #[error(transparent)]
    OutputDir(#[from] OutputDirError),

    #[error("Error loading {}: {source}", path.display())]
    Load { path: PathBuf, source: FormatError },

    #[error("{0}")]
    InvalidImage(String),

    #[error("{0}")]
    InvalidParameters(String),

    #[error("{engine} detection failed: {source}")]
    Detection { engine: String, source: DetectError },

    #[error("Error saving {}: {source}", path.display())]
    Save { path: PathBuf, source: FormatError },
}

/// What one run produced
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub input: PathBuf,
    pub cleaned_path: PathBuf,
    pub mask_path: Option<PathBuf>,
    pub cosmic_rays: usize,
    pub total_pixels: usize,
    /// Time spent in detection
    pub elapsed: Duration,
    pub scale: ScaleParameters,
}

impl RunSummary {
    #[must_use]
    pub fn percentage(&self) -> f64 {
        if self.total_pixels == 0 {
            return 0.0;
        }
        self.cosmic_rays as f64 / self.total_pixels as f64 * 100.0
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} cosmic rays ({:.3}% of {} pixels) in {:.2}s",
            self.cosmic_rays,
            self.percentage(),
            self.total_pixels,
            self.elapsed.as_secs_f64()
        )
    }
}

fn file_stem(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "image".to_string())
}

fn check_params(params: &dyn EngineParams) -> Result<(), ProcessError> {
    params.validate().map_err(|e| match e {
        DetectError::InvalidParameters(msg) => ProcessError::InvalidParameters(msg),
        other => ProcessError::InvalidParameters(other.to_string()),
    })
}

fn load(path: &Path) -> Result<LoadedImage, ProcessError> {
    let start = Instant::now();
    info!(stage = "load", input = %path.display(), "starting stage");
    let loaded = load_image(path).map_err(|source| ProcessError::Load {
        path: path.to_path_buf(),
        source,
    })?;

    let stats = ImageStats::compute(&loaded.image);
    info!(
        stage = "load",
        elapsed_ms = start.elapsed().as_millis(),
        format = %loaded.format,
        dimensions = %loaded.image.dimensions(),
        %stats,
        "finished stage"
    );
    Ok(loaded)
}

fn run_detection(
    detector: &dyn CosmicRayDetector,
    image: &Image,
) -> Result<(Detection, Duration), ProcessError> {
    info!(stage = "detect", engine = detector.name(), "starting stage");
    let start = Instant::now();
    let detection = detector
        .detect(image)
        .map_err(|source| ProcessError::Detection {
            engine: detector.name().to_string(),
            source,
        })?;
    let elapsed = start.elapsed();

    info!(
        stage = "detect",
        elapsed_ms = elapsed.as_millis(),
        cosmic_rays = detection.mask.count(),
        percentage = %format!("{:.3}", detection.mask.percentage()),
        "finished stage"
    );
    Ok((detection, elapsed))
}

fn save(
    path: PathBuf,
    image: &Image,
    header: &Header,
    format: ImageFormat,
    sample: SampleFormat,
) -> Result<PathBuf, ProcessError> {
    let written = save_image(&path, image, header, format, sample)
        .map_err(|source| ProcessError::Save { path, source })?;
    info!(stage = "save", path = %written.display(), "wrote image");
    Ok(written)
}

/// L.A.Cosmic flow: normalized input is stretched to ADU for detection and
/// the cleaned result mapped back before writing
pub fn run_lacosmic(
    args: &LaCosmicArgs,
    detector: &dyn CosmicRayDetector,
) -> Result<RunSummary, ProcessError> {
    let params = args.params();
    check_params(&params)?;

    if !args.input.is_file() {
        return Err(ProcessError::InputNotFound(args.input.clone()));
    }
    let outdir = validate_output_dir(&args.outdir)?;

    let loaded = load(&args.input)?;
    validate_min_size(loaded.image.dimensions(), LACOSMIC_MIN_DIM)
        .map_err(|e| ProcessError::InvalidImage(e.to_string()))?;

    let mut header = loaded.header.sanitized();
    let scaled = classify_and_scale(loaded.image);
    let rescaled = !scaled.scale.is_identity();
    if scaled.normalized {
        header.record_rescale(scaled.scale);
    }
    if rescaled {
        warn!(
            factor = scaled.scale.factor(),
            offset = scaled.scale.offset(),
            "image appears normalized (0-1 range), rescaled to 16-bit ADU range"
        );
    }

    let (detection, elapsed) = run_detection(detector, &scaled.image)?;
    let cosmic_rays = detection.mask.count();
    let cleaned = restore(&detection.cleaned, scaled.scale);

    let rescale_note = if rescaled {
        ", auto-rescaled from normalized"
    } else {
        ""
    };
    let mut cleaned_header = header.clone();
    cleaned_header.add_history(&format!(
        "L.A.Cosmic CRR: sigclip={:?}, objlim={:?}, niter={}, {cosmic_rays} CRs removed{rescale_note}",
        params.sigclip, params.objlim, params.niter
    ));

    let stem = file_stem(&args.input);
    let cleaned_path = save(
        outdir.join(format!("{stem}{}.fits", args.suffix)),
        &cleaned,
        &cleaned_header,
        ImageFormat::Fits,
        SampleFormat::Float64,
    )?;

    let mask_path = if args.save_mask {
        let mut mask_header = header;
        mask_header.add_comment(MASK_COMMENT);
        mask_header.add_history(&format!(
            "L.A.Cosmic mask: {cosmic_rays} cosmic rays detected"
        ));
        Some(save(
            outdir.join(format!("{stem}_crm.fits")),
            &detection.mask.to_image(),
            &mask_header,
            ImageFormat::Fits,
            SampleFormat::UInt8,
        )?)
    } else {
        None
    };

    Ok(RunSummary {
        input: args.input.clone(),
        cleaned_path,
        mask_path,
        cosmic_rays,
        total_pixels: detection.mask.total(),
        elapsed,
        scale: scaled.scale,
    })
}

/// DeepCR flow: the image goes to the engine as loaded, output defaults to
/// XISF with FITS as fallback
pub fn run_deepcr(
    args: &DeepCrArgs,
    detector: &dyn CosmicRayDetector,
) -> Result<RunSummary, ProcessError> {
    let params = args.params();
    check_params(&params)?;
    debug!(model = %params.model, threshold = params.threshold, "resolved DeepCR settings");

    if !args.input.is_file() {
        return Err(ProcessError::InputNotFound(args.input.clone()));
    }
    let outdir = validate_output_dir(&args.output_dir)?;

    let loaded = load(&args.input)?;
    if !loaded.image.dimensions().is_valid() {
        return Err(ProcessError::InvalidImage(format!(
            "Image has no pixels ({})",
            loaded.image.dimensions()
        )));
    }

    let (detection, elapsed) = run_detection(detector, &loaded.image)?;
    let cosmic_rays = detection.mask.count();

    let format = args.output_format();
    let ext = format.extension();
    let stem = file_stem(&args.input);
    let tag = format!("{stem}_deepcr_th{:?}", params.threshold);

    let mut cleaned_header = loaded.header.sanitized();
    cleaned_header.add_history(&format!(
        "DeepCR CRR: model={}, threshold={:?}, {cosmic_rays} CRs removed",
        params.model, params.threshold
    ));
    let cleaned_path = save(
        outdir.join(format!("{tag}_cleaned.{ext}")),
        &detection.cleaned,
        &cleaned_header,
        format,
        SampleFormat::Float32,
    )?;

    let mask_path = if args.save_mask {
        let mut mask_header = Header::new();
        mask_header.add_comment(MASK_COMMENT);
        mask_header.add_history(&format!("DeepCR mask: {cosmic_rays} cosmic rays detected"));
        Some(save(
            outdir.join(format!("{tag}_mask.{ext}")),
            &detection.mask.to_image(),
            &mask_header,
            format,
            SampleFormat::UInt8,
        )?)
    } else {
        None
    };

    Ok(RunSummary {
        input: args.input.clone(),
        cleaned_path,
        mask_path,
        cosmic_rays,
        total_pixels: detection.mask.total(),
        elapsed,
        scale: ScaleParameters::IDENTITY,
    })
}
