//! FITS/XISF image loading and saving
//!
//! This module detects the container format from the file extension, decodes
//! the first image with its header keywords, and reduces it to a single 2-D
//! plane ready for processing. FITS goes through cfitsio via `fitsio`; XISF
//! headers are parsed with `roxmltree`.

mod error;
pub mod fits;
mod header;
mod validation;
pub mod xisf;

pub use error::FormatError;
pub use header::{Card, Header, HeaderValue, RESCALE_FACTOR_KEYWORD, RESCALED_KEYWORD};
pub use validation::{reduce_to_2d, validate_min_size};

use std::fmt;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::image::Image;
use crate::types::SampleFormat;

/// Decoded pixel array before dimensionality reduction
///
/// `shape` lists axes slowest first (rows before columns), `pixels` is
/// row-major.
#[derive(Debug, Clone, PartialEq)]
pub struct RawImage {
    pub shape: Vec<usize>,
    pub pixels: Vec<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageFormat {
    Fits,
    Xisf,
}

impl ImageFormat {
    /// Detect the format from the file extension (case-insensitive)
    pub fn from_path(path: &Path) -> Result<Self, FormatError> {
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_lowercase)
            .unwrap_or_default();

        match extension.as_str() {
            "fits" | "fit" | "fts" => Ok(Self::Fits),
            "xisf" => Ok(Self::Xisf),
            _ => Err(FormatError::UnsupportedFormat { extension }),
        }
    }

    #[must_use]
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Fits => "fits",
            Self::Xisf => "xisf",
        }
    }
}

impl fmt::Display for ImageFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Fits => write!(f, "FITS"),
            Self::Xisf => write!(f, "XISF"),
        }
    }
}

/// An image ready for processing together with its source header
#[derive(Debug, Clone)]
pub struct LoadedImage {
    pub image: Image,
    pub header: Header,
    pub format: ImageFormat,
}

/// Load the first image of a FITS or XISF file as a 2-D plane
pub fn load_image(path: &Path) -> Result<LoadedImage, FormatError> {
    let format = ImageFormat::from_path(path)?;
    let (raw, header) = match format {
        ImageFormat::Fits => fits::read_fits(path)?,
        ImageFormat::Xisf => xisf::read_xisf(path)?,
    };

    debug!(
        path = %path.display(),
        %format,
        shape = ?raw.shape,
        cards = header.len(),
        "decoded image"
    );

    let image = reduce_to_2d(raw)?;
    Ok(LoadedImage {
        image,
        header,
        format,
    })
}

/// Write `image` in the requested container, returning the path written
///
/// A failed XISF write falls back to FITS next to the requested path.
pub fn save_image(
    path: &Path,
    image: &Image,
    header: &Header,
    format: ImageFormat,
    sample: SampleFormat,
) -> Result<PathBuf, FormatError> {
    match format {
        ImageFormat::Fits => {
            fits::write_fits(path, image, header, sample)?;
            Ok(path.to_path_buf())
        }
        ImageFormat::Xisf => match xisf::write_xisf(path, image, header, sample) {
            Ok(()) => Ok(path.to_path_buf()),
            Err(e) => {
                let fallback = path.with_extension(ImageFormat::Fits.extension());
                warn!(
                    error = %e,
                    fallback = %fallback.display(),
                    "XISF write failed, falling back to FITS"
                );
                fits::write_fits(&fallback, image, header, sample)?;
                Ok(fallback)
            }
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use tempfile::tempdir;

    #[test]
    fn test_format_from_extension() {
        assert_eq!(ImageFormat::from_path(Path::new("a.FITS")).unwrap(), ImageFormat::Fits);
        assert_eq!(ImageFormat::from_path(Path::new("a.fit")).unwrap(), ImageFormat::Fits);
        assert_eq!(ImageFormat::from_path(Path::new("a.fts")).unwrap(), ImageFormat::Fits);
        assert_eq!(ImageFormat::from_path(Path::new("a.Xisf")).unwrap(), ImageFormat::Xisf);
        assert_matches!(
            ImageFormat::from_path(Path::new("a.png")),
            Err(FormatError::UnsupportedFormat { extension }) if extension == "png"
        );
        assert_matches!(
            ImageFormat::from_path(Path::new("noext")),
            Err(FormatError::UnsupportedFormat { .. })
        );
    }

    #[test]
    fn test_save_and_load_both_formats() {
        let dir = tempdir().unwrap();
        let image = Image::from_rows(&[[0.5, 0.25], [0.125, 1.0]]).unwrap();
        let mut header = Header::new();
        header.set("OBJECT", HeaderValue::Text("M33".into()), None);

        for format in [ImageFormat::Fits, ImageFormat::Xisf] {
            let path = dir.path().join(format!("frame.{}", format.extension()));
            let written = save_image(&path, &image, &header, format, SampleFormat::Float32).unwrap();
            assert_eq!(written, path);

            let loaded = load_image(&written).unwrap();
            assert_eq!(loaded.format, format);
            assert_eq!(loaded.image, image);
            assert_eq!(loaded.header.get_str("OBJECT"), Some("M33"));
        }
    }

    #[test]
    fn test_xisf_failure_falls_back_to_fits() {
        let dir = tempdir().unwrap();
        // A directory in the way makes the XISF write fail
        let blocked = dir.path().join("frame.xisf");
        std::fs::create_dir(&blocked).unwrap();

        let image = Image::from_rows(&[[1.0, 2.0]]).unwrap();
        let written = save_image(
            &blocked,
            &image,
            &Header::new(),
            ImageFormat::Xisf,
            SampleFormat::Float32,
        )
        .unwrap();

        assert_eq!(written, dir.path().join("frame.fits"));
        assert_eq!(load_image(&written).unwrap().image, image);
    }
}
