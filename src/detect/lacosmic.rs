//! L.A.Cosmic (Laplacian edge detection) engine parameters

use std::fmt;

use clap::ValueEnum;

use super::{DetectError, EngineParams};

/// How flagged pixels are replaced
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum CleanType {
    Median,
    Medmask,
    #[default]
    Meanmask,
    Idw,
}

/// How the fine-structure image is built
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum FsMode {
    #[default]
    Median,
    Convolve,
}

/// PSF model used when `fsmode` is convolve
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum PsfModel {
    #[default]
    Gauss,
    Gaussx,
    Gaussy,
    Moffat,
}

impl CleanType {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Median => "median",
            Self::Medmask => "medmask",
            Self::Meanmask => "meanmask",
            Self::Idw => "idw",
        }
    }
}

impl FsMode {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Median => "median",
            Self::Convolve => "convolve",
        }
    }
}

impl PsfModel {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Gauss => "gauss",
            Self::Gaussx => "gaussx",
            Self::Gaussy => "gaussy",
            Self::Moffat => "moffat",
        }
    }
}

impl fmt::Display for CleanType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Display for FsMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Display for PsfModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LaCosmicParams {
    /// Laplacian-to-noise limit for detection
    pub sigclip: f64,
    /// Fractional detection limit for neighbouring pixels
    pub sigfrac: f64,
    /// Minimum contrast between Laplacian and fine structure
    pub objlim: f64,
    /// Detector gain (e-/ADU)
    pub gain: f64,
    /// Read noise (e-)
    pub readnoise: f64,
    /// Saturation level (ADU)
    pub satlevel: f64,
    pub niter: u32,
    /// Use the separable median filter
    pub sepmed: bool,
    pub cleantype: CleanType,
    pub fsmode: FsMode,
    pub psfmodel: PsfModel,
    pub psffwhm: f64,
    /// Kernel size, odd
    pub psfsize: u32,
    /// Moffat beta
    pub psfbeta: f64,
}

impl Default for LaCosmicParams {
    fn default() -> Self {
        Self {
            sigclip: 1.5,
            sigfrac: 0.3,
            objlim: 1.5,
            gain: 1.0,
            readnoise: 9.0,
            satlevel: 65535.0,
            niter: 6,
            sepmed: true,
            cleantype: CleanType::default(),
            fsmode: FsMode::default(),
            psfmodel: PsfModel::default(),
            psffwhm: 2.5,
            psfsize: 7,
            psfbeta: 4.765,
        }
    }
}

fn positive(name: &str, value: f64) -> Result<(), DetectError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(DetectError::InvalidParameters(format!(
            "{name} must be positive, got {value}"
        )))
    }
}

impl EngineParams for LaCosmicParams {
    fn validate(&self) -> Result<(), DetectError> {
        positive("sigclip", self.sigclip)?;
        positive("sigfrac", self.sigfrac)?;
        positive("objlim", self.objlim)?;
        positive("gain", self.gain)?;
        positive("satlevel", self.satlevel)?;
        positive("psffwhm", self.psffwhm)?;
        positive("psfbeta", self.psfbeta)?;

        if !(self.readnoise.is_finite() && self.readnoise >= 0.0) {
            return Err(DetectError::InvalidParameters(format!(
                "readnoise must not be negative, got {}",
                self.readnoise
            )));
        }
        if self.niter == 0 {
            return Err(DetectError::InvalidParameters(
                "niter must be at least 1".to_string(),
            ));
        }
        if self.psfsize.is_multiple_of(2) {
            return Err(DetectError::InvalidParameters(format!(
                "psfsize must be odd and positive, got {}",
                self.psfsize
            )));
        }
        Ok(())
    }

    fn engine_args(&self) -> Vec<(&'static str, String)> {
        vec![
            ("sigclip", self.sigclip.to_string()),
            ("sigfrac", self.sigfrac.to_string()),
            ("objlim", self.objlim.to_string()),
            ("gain", self.gain.to_string()),
            ("readnoise", self.readnoise.to_string()),
            ("satlevel", self.satlevel.to_string()),
            ("niter", self.niter.to_string()),
            ("sepmed", if self.sepmed { "True" } else { "False" }.to_string()),
            ("cleantype", self.cleantype.to_string()),
            ("fsmode", self.fsmode.to_string()),
            ("psfmodel", self.psfmodel.to_string()),
            ("psffwhm", self.psffwhm.to_string()),
            ("psfsize", self.psfsize.to_string()),
            ("psfbeta", self.psfbeta.to_string()),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn test_defaults_are_valid() {
        assert!(LaCosmicParams::default().validate().is_ok());
    }

    #[test]
    fn test_even_psfsize_rejected() {
        let params = LaCosmicParams {
            psfsize: 6,
            ..LaCosmicParams::default()
        };
        assert_matches!(
            params.validate(),
            Err(DetectError::InvalidParameters(msg)) if msg.contains("psfsize")
        );

        let zero = LaCosmicParams {
            psfsize: 0,
            ..LaCosmicParams::default()
        };
        assert!(zero.validate().is_err());
    }

    #[test]
    fn test_range_checks() {
        let no_iterations = LaCosmicParams {
            niter: 0,
            ..LaCosmicParams::default()
        };
        assert!(no_iterations.validate().is_err());

        let negative_noise = LaCosmicParams {
            readnoise: -1.0,
            ..LaCosmicParams::default()
        };
        assert!(negative_noise.validate().is_err());

        let zero_noise = LaCosmicParams {
            readnoise: 0.0,
            ..LaCosmicParams::default()
        };
        assert!(zero_noise.validate().is_ok());

        let nan_gain = LaCosmicParams {
            gain: f64::NAN,
            ..LaCosmicParams::default()
        };
        assert!(nan_gain.validate().is_err());
    }

    #[test]
    fn test_engine_args() {
        let params = LaCosmicParams {
            sepmed: false,
            cleantype: CleanType::Idw,
            ..LaCosmicParams::default()
        };
        let args = params.engine_args();

        assert_eq!(args.len(), 14);
        assert!(args.contains(&("sigclip", "1.5".to_string())));
        assert!(args.contains(&("niter", "6".to_string())));
        assert!(args.contains(&("sepmed", "False".to_string())));
        assert!(args.contains(&("cleantype", "idw".to_string())));
        assert!(args.contains(&("satlevel", "65535".to_string())));
    }
}
