//! Domain-specific value types shared across the crate

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Dimensions {
    pub rows: usize,
    pub cols: usize,
}

impl Dimensions {
    #[must_use]
    pub fn new(rows: usize, cols: usize) -> Self {
        Self { rows, cols }
    }

    #[inline]
    #[must_use]
    pub fn pixel_count(&self) -> usize {
        self.rows * self.cols
    }

    #[inline]
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.rows > 0 && self.cols > 0
    }
}

impl fmt::Display for Dimensions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{cols}x{rows}", cols = self.cols, rows = self.rows)
    }
}

/// Affine rescale applied to an image before detection and undone afterwards
///
/// `factor` is always strictly positive. The identity `(1.0, 0.0)` means no
/// rescale was applied.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScaleParameters {
    factor: f64,
    offset: f64,
}

impl ScaleParameters {
    pub const IDENTITY: Self = Self {
        factor: 1.0,
        offset: 0.0,
    };

    /// Returns `None` unless `factor` is finite and greater than zero
    #[must_use]
    pub fn new(factor: f64, offset: f64) -> Option<Self> {
        (factor.is_finite() && factor > 0.0).then_some(Self { factor, offset })
    }

    #[inline]
    #[must_use]
    pub fn factor(&self) -> f64 {
        self.factor
    }

    #[inline]
    #[must_use]
    pub fn offset(&self) -> f64 {
        self.offset
    }

    #[inline]
    #[must_use]
    pub fn is_identity(&self) -> bool {
        self.factor == 1.0 && self.offset == 0.0
    }

    #[inline(always)]
    #[must_use]
    // Hot path: called for every pixel
    pub fn apply(&self, sample: f64) -> f64 {
        (sample - self.offset) * self.factor
    }

    #[inline(always)]
    #[must_use]
    pub fn restore(&self, sample: f64) -> f64 {
        sample / self.factor + self.offset
    }
}

impl Default for ScaleParameters {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl fmt::Display for ScaleParameters {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "factor={factor}, offset={offset}",
            factor = self.factor,
            offset = self.offset
        )
    }
}

/// On-disk sample encoding for written images
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleFormat {
    UInt8,
    Float32,
    Float64,
}

impl SampleFormat {
    #[must_use]
    pub fn xisf_name(&self) -> &'static str {
        match self {
            Self::UInt8 => "UInt8",
            Self::Float32 => "Float32",
            Self::Float64 => "Float64",
        }
    }

    #[inline]
    #[must_use]
    pub fn bytes_per_sample(&self) -> usize {
        match self {
            Self::UInt8 => 1,
            Self::Float32 => 4,
            Self::Float64 => 8,
        }
    }
}
