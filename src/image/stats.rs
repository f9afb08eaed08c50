use super::Image;
use super::normalization::find_min_max;
use std::fmt;

/// Summary statistics over the finite samples of an image
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ImageStats {
    pub min: f64,
    pub max: f64,
    pub median: f64,
    pub finite: usize,
}

impl ImageStats {
    #[must_use]
    pub fn compute(image: &Image) -> Self {
        let (min, max) = find_min_max(image.pixels());
        let mut finite: Vec<f64> = image
            .pixels()
            .iter()
            .copied()
            .filter(|v| v.is_finite())
            .collect();

        Self {
            min,
            max,
            median: median_in_place(&mut finite),
            finite: finite.len(),
        }
    }
}

/// Median with the midpoint convention for even counts
fn median_in_place(values: &mut [f64]) -> f64 {
    let n = values.len();
    if n == 0 {
        return f64::NAN;
    }

    let mid = n / 2;
    let (lower, upper, _) = values.select_nth_unstable_by(mid, f64::total_cmp);
    let upper = *upper;
    if !n.is_multiple_of(2) {
        return upper;
    }

    let below = lower.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    (below + upper) / 2.0
}

impl fmt::Display for ImageStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "range {min:.6} -> {max:.6}, median {median:.6}",
            min = self.min,
            max = self.max,
            median = self.median
        )
    }
}
