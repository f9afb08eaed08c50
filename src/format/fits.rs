//! FITS reading and writing through cfitsio
//!
//! Pixel data goes through `fitsio`, which applies BSCALE/BZERO and reads
//! tile-compressed images transparently. Header records are read and written
//! verbatim so that every input card can be carried over to the outputs.

use std::ffi::{CString, c_char, c_int};
use std::path::Path;

use fitsio::FitsFile;
use fitsio::hdu::HduInfo;
use fitsio::images::{ImageDescription, ImageType};
use fitsio::sys;
use tracing::debug;

use super::RawImage;
use super::error::{FormatError, Result};
use super::header::{Card, Header, is_structural};
use crate::image::Image;
use crate::types::SampleFormat;

/// One header record plus the terminating NUL
const RECORD_BUF_LEN: usize = 81;

fn fits_error(path: &Path) -> impl FnOnce(fitsio::errors::Error) -> FormatError + '_ {
    move |source| FormatError::Fits {
        path: path.to_path_buf(),
        source,
    }
}

#[inline]
fn sample_len(image_type: &ImageType) -> usize {
    match image_type {
        ImageType::UnsignedByte | ImageType::Byte => 1,
        ImageType::Short | ImageType::UnsignedShort => 2,
        ImageType::Long | ImageType::UnsignedLong | ImageType::Float => 4,
        ImageType::LongLong | ImageType::Double => 8,
    }
}

#[inline]
fn is_integer(image_type: &ImageType) -> bool {
    !matches!(image_type, ImageType::Float | ImageType::Double)
}

fn element_count(shape: &[usize]) -> Result<usize> {
    shape
        .iter()
        .try_fold(1usize, |acc, &n| acc.checked_mul(n))
        .ok_or_else(|| FormatError::InvalidFits(format!("image dimensions {shape:?} overflow")))
}

/// Read the first image HDU holding data: the primary HDU if it has pixels,
/// otherwise the first image extension
pub fn read_fits(path: &Path) -> Result<(RawImage, Header)> {
    let file_len = std::fs::metadata(path)
        .map_err(|source| FormatError::Read {
            path: path.to_path_buf(),
            source,
        })?
        .len();
    let mut fptr = FitsFile::open(path).map_err(fits_error(path))?;

    let hdu_count = fptr.iter().count();
    for index in 0..hdu_count {
        let hdu = fptr.hdu(index).map_err(fits_error(path))?;
        let HduInfo::ImageInfo { shape, image_type } = &hdu.info else {
            debug!(index, "skipping non-image FITS HDU");
            continue;
        };
        if shape.is_empty() || shape.contains(&0) {
            debug!(index, "skipping FITS HDU without image data");
            continue;
        }
        let shape = shape.clone();
        let sample_len = sample_len(image_type);
        let integer = is_integer(image_type);

        let header = read_header(&mut fptr, path)?;
        let elements = element_count(&shape)?;

        // Compressed tiles are smaller than the image they decode to
        if header.get_bool("ZIMAGE") != Some(true) {
            let data_len = elements
                .checked_mul(sample_len)
                .and_then(|n| u64::try_from(n).ok())
                .ok_or_else(|| FormatError::InvalidFits(format!("image dimensions {shape:?} overflow")))?;
            if data_len > file_len {
                return Err(FormatError::InvalidFits("data unit is truncated".into()));
            }
        }

        let mut pixels: Vec<f64> = hdu.read_image(&mut fptr).map_err(fits_error(path))?;
        if pixels.len() != elements {
            return Err(FormatError::PixelCountMismatch {
                expected: elements,
                actual: pixels.len(),
            });
        }
        if integer {
            mask_blank(&mut pixels, &header);
        }

        return Ok((RawImage { shape, pixels }, header));
    }

    Err(FormatError::NoImageData(path.to_path_buf()))
}

/// BLANK marks undefined integer samples; cfitsio hands them back scaled
fn mask_blank(pixels: &mut [f64], header: &Header) {
    let Some(blank) = header.get_i64("BLANK") else {
        return;
    };
    let bscale = header.get_f64("BSCALE").unwrap_or(1.0);
    let bzero = header.get_f64("BZERO").unwrap_or(0.0);
    let blank = (blank as f64).mul_add(bscale, bzero);

    pixels
        .iter_mut()
        .filter(|v| **v == blank)
        .for_each(|v| *v = f64::NAN);
}

/// Records of the current HDU, in file order
fn read_header(fptr: &mut FitsFile, path: &Path) -> Result<Header> {
    let mut status: c_int = 0;
    let mut count: c_int = 0;
    let mut more: c_int = 0;

    // SAFETY: `fptr` is an open file positioned on the HDU being read, and
    // `buf` has room for a full record and its NUL.
    let raw = unsafe { fptr.as_raw() };
    unsafe { sys::ffghsp(raw, &mut count, &mut more, &mut status) };
    if status != 0 {
        return Err(FormatError::InvalidFits(format!(
            "cfitsio status {status} sizing header of {}",
            path.display()
        )));
    }

    let mut header = Header::new();
    let mut buf: [c_char; RECORD_BUF_LEN] = [0; RECORD_BUF_LEN];
    for index in 1..=count {
        unsafe { sys::ffgrec(raw, index, buf.as_mut_ptr(), &mut status) };
        if status != 0 {
            return Err(FormatError::InvalidFits(format!(
                "cfitsio status {status} reading header record {index}"
            )));
        }
        let record: Vec<u8> = buf.iter().take_while(|&&c| c != 0).map(|&c| c as u8).collect();
        header.push(Card::parse_record(&record));
    }

    Ok(header)
}

fn image_type(format: SampleFormat) -> ImageType {
    match format {
        SampleFormat::UInt8 => ImageType::UnsignedByte,
        SampleFormat::Float32 => ImageType::Float,
        SampleFormat::Float64 => ImageType::Double,
    }
}

/// Write `image` as a single primary HDU, overwriting any existing file
pub fn write_fits(path: &Path, image: &Image, header: &Header, format: SampleFormat) -> Result<()> {
    let dimensions = [image.rows(), image.cols()];
    let description = ImageDescription {
        data_type: image_type(format),
        dimensions: &dimensions,
    };
    let mut fptr = FitsFile::create(path)
        .with_custom_primary(&description)
        .overwrite()
        .open()
        .map_err(fits_error(path))?;
    let hdu = fptr.primary_hdu().map_err(fits_error(path))?;

    write_header(&mut fptr, header);

    match format {
        SampleFormat::UInt8 => {
            let data: Vec<u8> = image.pixels().iter().map(|&v| v.clamp(0.0, 255.0) as u8).collect();
            hdu.write_image(&mut fptr, &data)
        }
        SampleFormat::Float32 => {
            let data: Vec<f32> = image.pixels().iter().map(|&v| v as f32).collect();
            hdu.write_image(&mut fptr, &data)
        }
        SampleFormat::Float64 => hdu.write_image(&mut fptr, image.pixels()),
    }
    .map_err(fits_error(path))
}

/// Append the non-structural cards of `header` to the current HDU
///
/// Cards cfitsio refuses are logged and skipped.
fn write_header(fptr: &mut FitsFile, header: &Header) {
    // SAFETY: `fptr` is an open, writable file positioned on the new primary
    // HDU, and every record passed is NUL terminated.
    let raw = unsafe { fptr.as_raw() };

    // Drop the boilerplate COMMENT cards cfitsio puts in a new primary header
    let mut status: c_int = 0;
    while status == 0 {
        unsafe { sys::ffdkey(raw, c"COMMENT".as_ptr(), &mut status) };
    }

    for card in header.cards().iter().filter(|c| !is_structural(&c.keyword)) {
        let Some(record) = card.to_record().and_then(|r| CString::new(r).ok()) else {
            debug!(keyword = %card.keyword, "skipping header card that cannot be encoded");
            continue;
        };
        let mut status: c_int = 0;
        unsafe { sys::ffprec(raw, record.as_ptr(), &mut status) };
        if status != 0 {
            debug!(keyword = %card.keyword, status, "cfitsio rejected header card");
        }
    }
}
