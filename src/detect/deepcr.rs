//! DeepCR (convolutional network) engine parameters

use std::fmt;

use clap::ValueEnum;

use super::{DetectError, EngineParams};

/// Pretrained network selection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeepCrModel {
    Wfc3Uvis,
    AcsWfc,
}

impl DeepCrModel {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Wfc3Uvis => "WFC3-UVIS",
            Self::AcsWfc => "ACS-WFC",
        }
    }
}

impl fmt::Display for DeepCrModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Named model/threshold combinations
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Preset {
    /// WFC3-UVIS, threshold 0.1
    Optimal,
    /// WFC3-UVIS, threshold 0.05
    Aggressive,
    /// WFC3-UVIS, threshold 0.2
    Conservative,
    /// ACS-WFC, threshold 0.5
    #[value(name = "acs_default")]
    AcsDefault,
}

impl Preset {
    #[must_use]
    pub fn settings(&self) -> (DeepCrModel, f64) {
        match self {
            Self::Optimal => (DeepCrModel::Wfc3Uvis, 0.1),
            Self::Aggressive => (DeepCrModel::Wfc3Uvis, 0.05),
            Self::Conservative => (DeepCrModel::Wfc3Uvis, 0.2),
            Self::AcsDefault => (DeepCrModel::AcsWfc, 0.5),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DeepCrParams {
    pub model: DeepCrModel,
    /// Probability cut on the network output, in (0, 1]
    pub threshold: f64,
    pub inpaint: bool,
    pub segment: bool,
    pub patch: u32,
    pub n_jobs: u32,
}

impl DeepCrParams {
    /// A preset overrides both model and threshold
    #[must_use]
    pub fn resolve(preset: Option<Preset>, threshold: f64) -> Self {
        let (model, threshold) = match preset {
            Some(preset) => preset.settings(),
            None => (DeepCrModel::Wfc3Uvis, threshold),
        };
        Self {
            model,
            threshold,
            inpaint: true,
            segment: true,
            patch: 512,
            n_jobs: 1,
        }
    }
}

impl EngineParams for DeepCrParams {
    fn validate(&self) -> Result<(), DetectError> {
        if !(self.threshold > 0.0 && self.threshold <= 1.0) {
            return Err(DetectError::InvalidParameters(format!(
                "Threshold must be between 0 and 1 (exclusive of 0), got {}",
                self.threshold
            )));
        }
        if self.patch == 0 || self.n_jobs == 0 {
            return Err(DetectError::InvalidParameters(
                "patch and n_jobs must be positive".to_string(),
            ));
        }
        Ok(())
    }

    fn engine_args(&self) -> Vec<(&'static str, String)> {
        vec![
            ("model", self.model.to_string()),
            ("threshold", self.threshold.to_string()),
            ("inpaint", self.inpaint.to_string()),
            ("segment", self.segment.to_string()),
            ("patch", self.patch.to_string()),
            ("n-jobs", self.n_jobs.to_string()),
            ("device", "CPU".to_string()),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn test_preset_overrides_threshold() {
        let params = DeepCrParams::resolve(Some(Preset::AcsDefault), 0.9);
        assert_eq!(params.model, DeepCrModel::AcsWfc);
        assert_eq!(params.threshold, 0.5);

        let params = DeepCrParams::resolve(Some(Preset::Aggressive), 0.9);
        assert_eq!(params.model, DeepCrModel::Wfc3Uvis);
        assert_eq!(params.threshold, 0.05);
    }

    #[test]
    fn test_no_preset_uses_positional_threshold() {
        let params = DeepCrParams::resolve(None, 0.3);
        assert_eq!(params.model, DeepCrModel::Wfc3Uvis);
        assert_eq!(params.threshold, 0.3);
        assert!(params.inpaint);
        assert_eq!(params.patch, 512);
    }

    #[test]
    fn test_threshold_bounds() {
        assert!(DeepCrParams::resolve(None, 1.0).validate().is_ok());
        assert!(DeepCrParams::resolve(None, 1e-6).validate().is_ok());
        for bad in [0.0, -0.1, 1.01, f64::NAN] {
            assert_matches!(
                DeepCrParams::resolve(None, bad).validate(),
                Err(DetectError::InvalidParameters(_))
            );
        }
    }

    #[test]
    fn test_engine_args() {
        let args = DeepCrParams::resolve(Some(Preset::Optimal), 0.0).engine_args();
        assert!(args.contains(&("model", "WFC3-UVIS".to_string())));
        assert!(args.contains(&("threshold", "0.1".to_string())));
        assert!(args.contains(&("device", "CPU".to_string())));
    }
}
