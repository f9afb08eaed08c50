use clap::builder::BoolishValueParser;
use clap::{ArgAction, Args, Parser, ValueEnum};
use std::path::PathBuf;

use crate::detect::{CleanType, DeepCrParams, FsMode, LaCosmicParams, Preset, PsfModel};
use crate::format::ImageFormat;

/// Options shared by both tools
#[derive(Args, Debug, Clone, Default)]
pub struct CommonArgs {
    /// Engine configuration file (TOML), defaults to $CRR_CONFIG
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Detection engine program, overrides the configured one
    #[arg(long, value_name = "PROGRAM")]
    pub engine: Option<PathBuf>,

    /// Debug logging
    #[arg(short, long)]
    pub verbose: bool,
}

/// Remove cosmic rays from a FITS or XISF image with L.A.Cosmic
#[derive(Parser, Debug, Clone)]
#[command(name = "crr-lacosmic", version, long_about = None)]
pub struct LaCosmicArgs {
    /// Input image (.fits, .fit, .fts, .xisf)
    #[arg(value_name = "INPUT")]
    pub input: PathBuf,

    /// Output directory
    #[arg(long, default_value = ".")]
    pub outdir: PathBuf,

    /// Suffix appended to the output file stem
    #[arg(long, default_value = "_crr")]
    pub suffix: String,

    /// Also write the cosmic-ray mask
    #[arg(long)]
    pub save_mask: bool,

    /// Laplacian-to-noise limit
    #[arg(long, default_value_t = 1.5)]
    pub sigclip: f64,

    /// Fractional detection limit for neighbouring pixels
    #[arg(long, default_value_t = 0.3)]
    pub sigfrac: f64,

    /// Minimum contrast between Laplacian and fine structure
    #[arg(long, default_value_t = 1.5)]
    pub objlim: f64,

    /// Detector gain (e-/ADU)
    #[arg(long, default_value_t = 1.0)]
    pub gain: f64,

    /// Read noise (e-)
    #[arg(long, default_value_t = 9.0)]
    pub readnoise: f64,

    /// Saturation level (ADU)
    #[arg(long, default_value_t = 65535.0)]
    pub satlevel: f64,

    /// Number of iterations
    #[arg(long, default_value_t = 6)]
    pub niter: u32,

    /// Use the separable median filter (True/False)
    #[arg(long, default_value_t = true, value_parser = BoolishValueParser::new(), action = ArgAction::Set)]
    pub sepmed: bool,

    /// Replacement method for flagged pixels
    #[arg(long, value_enum, default_value_t = CleanType::Meanmask)]
    pub cleantype: CleanType,

    /// Fine-structure mode
    #[arg(long, value_enum, default_value_t = FsMode::Median)]
    pub fsmode: FsMode,

    /// PSF model for convolve mode
    #[arg(long, value_enum, default_value_t = PsfModel::Gauss)]
    pub psfmodel: PsfModel,

    /// PSF full width at half maximum (pixels)
    #[arg(long, default_value_t = 2.5)]
    pub psffwhm: f64,

    /// PSF kernel size, odd
    #[arg(long, default_value_t = 7)]
    pub psfsize: u32,

    /// Moffat beta
    #[arg(long, default_value_t = 4.765)]
    pub psfbeta: f64,

    #[command(flatten)]
    pub common: CommonArgs,
}

impl LaCosmicArgs {
    #[must_use]
    pub fn params(&self) -> LaCosmicParams {
        LaCosmicParams {
            sigclip: self.sigclip,
            sigfrac: self.sigfrac,
            objlim: self.objlim,
            gain: self.gain,
            readnoise: self.readnoise,
            satlevel: self.satlevel,
            niter: self.niter,
            sepmed: self.sepmed,
            cleantype: self.cleantype,
            fsmode: self.fsmode,
            psfmodel: self.psfmodel,
            psffwhm: self.psffwhm,
            psfsize: self.psfsize,
            psfbeta: self.psfbeta,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormatArg {
    #[value(name = "XISF")]
    Xisf,
    #[value(name = "FITS")]
    Fits,
}

impl From<OutputFormatArg> for ImageFormat {
    fn from(value: OutputFormatArg) -> Self {
        match value {
            OutputFormatArg::Xisf => ImageFormat::Xisf,
            OutputFormatArg::Fits => ImageFormat::Fits,
        }
    }
}

/// Remove cosmic rays from a FITS or XISF image with DeepCR
#[derive(Parser, Debug, Clone)]
#[command(name = "crr-deepcr", version, long_about = None)]
pub struct DeepCrArgs {
    /// Input image (.fits, .fit, .fts, .xisf)
    #[arg(value_name = "INPUT")]
    pub input: PathBuf,

    /// Output directory
    #[arg(value_name = "OUTPUT_DIR")]
    pub output_dir: PathBuf,

    /// Detection threshold in (0, 1], ignored when a preset is given
    #[arg(value_name = "THRESHOLD", allow_negative_numbers = true)]
    pub threshold: f64,

    /// Named model/threshold combination
    #[arg(long, value_enum)]
    pub preset: Option<Preset>,

    /// Also write the cosmic-ray mask
    #[arg(long)]
    pub save_mask: bool,

    /// Output container
    #[arg(long, value_enum, ignore_case = true, default_value_t = OutputFormatArg::Xisf)]
    pub format: OutputFormatArg,

    #[command(flatten)]
    pub common: CommonArgs,
}

impl DeepCrArgs {
    #[must_use]
    pub fn params(&self) -> DeepCrParams {
        DeepCrParams::resolve(self.preset, self.threshold)
    }

    #[must_use]
    pub fn output_format(&self) -> ImageFormat {
        self.format.into()
    }
}
