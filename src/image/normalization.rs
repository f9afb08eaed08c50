//! Normalized-vs-ADU range detection and the matching rescale/restore pair
//!
//! Detection engines are tuned for 16-bit detector counts (read noise and
//! saturation are given in ADU/electrons). Images exported pre-normalized to
//! [0, 1] are stretched onto [0, 65535] before detection and mapped back
//! afterwards so the written result keeps its original range.

use super::Image;
use crate::types::ScaleParameters;

/// Largest maximum sample still treated as a normalized image (inclusive)
pub const NORMALIZED_MAX_THRESHOLD: f64 = 1.5;

/// Width of the range normalized images are stretched onto
pub const ADU_TARGET_RANGE: f64 = 65535.0;

/// Min and max over finite samples, `(NaN, NaN)` when there are none
#[inline]
#[must_use]
pub fn find_min_max(values: &[f64]) -> (f64, f64) {
    let (min, max) = values
        .iter()
        .filter(|v| v.is_finite())
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(min, max), &val| {
            (min.min(val), max.max(val))
        });

    if min > max {
        (f64::NAN, f64::NAN)
    } else {
        (min, max)
    }
}

/// True when the largest finite sample is at most [`NORMALIZED_MAX_THRESHOLD`]
#[must_use]
pub fn classify(image: &Image) -> bool {
    let (_, data_max) = find_min_max(image.pixels());
    data_max <= NORMALIZED_MAX_THRESHOLD
}

/// Scale that stretches the finite range of `image` onto [0, 65535]
///
/// Constant images (and images without finite samples) get the identity
/// scale since there is no spread to expand.
#[must_use]
pub fn compute_scale(image: &Image) -> ScaleParameters {
    let (data_min, data_max) = find_min_max(image.pixels());
    let spread = data_max - data_min;

    if spread > 0.0 {
        ScaleParameters::new(ADU_TARGET_RANGE / spread, data_min)
            .unwrap_or(ScaleParameters::IDENTITY)
    } else {
        ScaleParameters::IDENTITY
    }
}

#[must_use]
pub fn apply(image: &Image, scale: ScaleParameters) -> Image {
    image.map(|v| scale.apply(v))
}

/// Inverse of [`apply`]. Only meant for image samples, never for masks.
#[must_use]
pub fn restore(image: &Image, scale: ScaleParameters) -> Image {
    image.map(|v| scale.restore(v))
}

/// Outcome of [`classify_and_scale`]
#[derive(Debug, Clone, PartialEq)]
pub struct ScaledImage {
    pub image: Image,
    pub scale: ScaleParameters,
    /// Whether the input was classified as normalized. A constant normalized
    /// image is flagged here but keeps the identity scale.
    pub normalized: bool,
}

/// Rescale `image` if it looks normalized, otherwise pass it through
#[must_use]
pub fn classify_and_scale(image: Image) -> ScaledImage {
    if !classify(&image) {
        return ScaledImage {
            image,
            scale: ScaleParameters::IDENTITY,
            normalized: false,
        };
    }

    let scale = compute_scale(&image);
    let image = if scale.is_identity() {
        image
    } else {
        apply(&image, scale)
    };

    ScaledImage {
        image,
        scale,
        normalized: true,
    }
}
