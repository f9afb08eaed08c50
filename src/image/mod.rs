mod normalization;
mod stats;

pub use normalization::{
    ADU_TARGET_RANGE, NORMALIZED_MAX_THRESHOLD, apply, classify, classify_and_scale,
    ScaledImage, compute_scale, find_min_max, restore,
};
pub use stats::ImageStats;

use crate::types::Dimensions;
use anyhow::{Result, bail};

/// A single-plane image of `f64` samples stored row-major
#[derive(Debug, Clone, PartialEq)]
pub struct Image {
    dimensions: Dimensions,
    pixels: Vec<f64>,
}

impl Image {
    /// Wrap row-major samples
    ///
    /// # Errors
    ///
    /// Returns an error if the sample count does not match the dimensions
    pub fn new(dimensions: Dimensions, pixels: Vec<f64>) -> Result<Self> {
        if pixels.len() != dimensions.pixel_count() {
            bail!(
                "Pixel count mismatch: {} samples for {dimensions} image",
                pixels.len()
            );
        }
        Ok(Self { dimensions, pixels })
    }

    /// Build an image from nested rows, mostly useful in tests
    ///
    /// # Errors
    ///
    /// Returns an error if rows have different lengths
    pub fn from_rows<R: AsRef<[f64]>>(rows: &[R]) -> Result<Self> {
        let cols = rows.first().map_or(0, |r| r.as_ref().len());
        let mut pixels = Vec::with_capacity(rows.len() * cols);
        for row in rows {
            let row = row.as_ref();
            if row.len() != cols {
                bail!("Ragged rows: expected {cols} columns, got {}", row.len());
            }
            pixels.extend_from_slice(row);
        }
        Self::new(Dimensions::new(rows.len(), cols), pixels)
    }

    #[must_use]
    pub fn filled(dimensions: Dimensions, value: f64) -> Self {
        Self {
            dimensions,
            pixels: vec![value; dimensions.pixel_count()],
        }
    }

    #[inline]
    #[must_use]
    pub fn dimensions(&self) -> Dimensions {
        self.dimensions
    }

    #[inline]
    #[must_use]
    pub fn rows(&self) -> usize {
        self.dimensions.rows
    }

    #[inline]
    #[must_use]
    pub fn cols(&self) -> usize {
        self.dimensions.cols
    }

    #[inline]
    #[must_use]
    pub fn pixels(&self) -> &[f64] {
        &self.pixels
    }

    #[inline]
    #[must_use]
    pub fn get(&self, row: usize, col: usize) -> Option<f64> {
        (row < self.rows() && col < self.cols()).then(|| self.pixels[row * self.cols() + col])
    }

    /// Apply `f` to every sample, keeping the shape
    #[must_use]
    pub fn map(&self, f: impl Fn(f64) -> f64) -> Self {
        Self {
            dimensions: self.dimensions,
            pixels: self.pixels.iter().map(|&v| f(v)).collect(),
        }
    }
}

/// Boolean cosmic-ray mask, `true` marks an affected pixel
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mask {
    dimensions: Dimensions,
    pixels: Vec<bool>,
}

impl Mask {
    /// Any non-zero, non-NaN sample is flagged
    #[must_use]
    pub fn from_image(image: &Image) -> Self {
        Self {
            dimensions: image.dimensions(),
            pixels: image.pixels().iter().map(|&v| v != 0.0 && !v.is_nan()).collect(),
        }
    }

    #[inline]
    #[must_use]
    pub fn dimensions(&self) -> Dimensions {
        self.dimensions
    }

    #[inline]
    #[must_use]
    pub fn pixels(&self) -> &[bool] {
        &self.pixels
    }

    #[must_use]
    pub fn count(&self) -> usize {
        self.pixels.iter().filter(|&&flagged| flagged).count()
    }

    #[must_use]
    pub fn total(&self) -> usize {
        self.pixels.len()
    }

    /// Percentage of flagged pixels, 0 for an empty mask
    #[must_use]
    pub fn percentage(&self) -> f64 {
        if self.pixels.is_empty() {
            return 0.0;
        }
        self.count() as f64 / self.total() as f64 * 100.0
    }

    /// Encode as an image of 0/1 samples for writing
    #[must_use]
    pub fn to_image(&self) -> Image {
        Image {
            dimensions: self.dimensions,
            pixels: self
                .pixels
                .iter()
                .map(|&flagged| if flagged { 1.0 } else { 0.0 })
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_image_rejects_wrong_length() {
        let result = Image::new(Dimensions::new(2, 2), vec![0.0; 3]);
        assert!(result.is_err());
    }

    #[test]
    fn test_from_rows_row_major() {
        let image = Image::from_rows(&[[1.0, 2.0, 3.0], [4.0, 5.0, 6.0]]).unwrap();
        assert_eq!(image.dimensions(), Dimensions::new(2, 3));
        assert_eq!(image.get(1, 0), Some(4.0));
        assert_eq!(image.get(0, 2), Some(3.0));
        assert_eq!(image.get(2, 0), None);
    }

    #[test]
    fn test_from_rows_ragged() {
        let rows: Vec<Vec<f64>> = vec![vec![1.0, 2.0], vec![3.0]];
        assert!(Image::from_rows(&rows).is_err());
    }

    #[test]
    fn test_mask_counts() {
        let image = Image::from_rows(&[[0.0, 1.0], [f64::NAN, 2.0]]).unwrap();
        let mask = Mask::from_image(&image);
        assert_eq!(mask.pixels(), &[false, true, false, true]);
        assert_eq!(mask.count(), 2);
        assert_eq!(mask.percentage(), 50.0);
        assert_eq!(mask.to_image().pixels(), &[0.0, 1.0, 0.0, 1.0]);
    }
}
