use anyhow::{Result, bail};

use super::RawImage;
use super::error::FormatError;
use crate::image::Image;
use crate::types::Dimensions;

/// Reduce a decoded array to a single 2-D plane
///
/// A 3-D array is accepted when either its leading or its trailing axis has
/// length 1 (single-plane cubes, channel-last mono images).
pub fn reduce_to_2d(raw: RawImage) -> Result<Image, FormatError> {
    let dims = match raw.shape.as_slice() {
        [rows, cols] => Dimensions::new(*rows, *cols),
        [1, rows, cols] => Dimensions::new(*rows, *cols),
        [rows, cols, 1] => Dimensions::new(*rows, *cols),
        [_, _, _] => return Err(FormatError::MultiChannel(raw.shape.clone())),
        other => return Err(FormatError::UnsupportedDimensions(other.len())),
    };

    if raw.pixels.len() != dims.pixel_count() {
        return Err(FormatError::PixelCountMismatch {
            expected: dims.pixel_count(),
            actual: raw.pixels.len(),
        });
    }

    Image::new(dims, raw.pixels).map_err(|e| FormatError::InvalidFits(e.to_string()))
}

#[inline]
pub fn validate_min_size(dimensions: Dimensions, min_dim: usize) -> Result<()> {
    if dimensions.rows < min_dim || dimensions.cols < min_dim {
        bail!(
            "Image too small ({dimensions}). Minimum size is {min_dim}x{min_dim} pixels."
        );
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn raw(shape: &[usize]) -> RawImage {
        RawImage {
            shape: shape.to_vec(),
            pixels: (0..shape.iter().product::<usize>()).map(|i| i as f64).collect(),
        }
    }

    #[test]
    fn test_two_dimensional_passes() {
        let image = reduce_to_2d(raw(&[3, 4])).unwrap();
        assert_eq!(image.dimensions(), Dimensions::new(3, 4));
    }

    #[test]
    fn test_leading_singleton_axis() {
        let image = reduce_to_2d(raw(&[1, 5, 6])).unwrap();
        assert_eq!(image.dimensions(), Dimensions::new(5, 6));
        assert_eq!(image.get(4, 5), Some(29.0));
    }

    #[test]
    fn test_trailing_singleton_axis() {
        let image = reduce_to_2d(raw(&[5, 6, 1])).unwrap();
        assert_eq!(image.dimensions(), Dimensions::new(5, 6));
    }

    #[test]
    fn test_multi_channel_rejected() {
        assert_matches!(
            reduce_to_2d(raw(&[3, 5, 6])),
            Err(FormatError::MultiChannel(shape)) if shape == vec![3, 5, 6]
        );
    }

    #[test]
    fn test_other_ranks_rejected() {
        assert_matches!(reduce_to_2d(raw(&[7])), Err(FormatError::UnsupportedDimensions(1)));
        assert_matches!(
            reduce_to_2d(raw(&[1, 1, 2, 2])),
            Err(FormatError::UnsupportedDimensions(4))
        );
    }

    #[test]
    fn test_min_size() {
        assert!(validate_min_size(Dimensions::new(25, 25), 25).is_ok());
        let err = validate_min_size(Dimensions::new(24, 100), 25).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Image too small (100x24). Minimum size is 25x25 pixels."
        );
    }
}
