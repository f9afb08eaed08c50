//! Engine configuration
//!
//! A small TOML file tells each tool which program performs detection:
//!
//! ```toml
//! [lacosmic]
//! program = "python3"
//! args = ["/opt/crr/lacosmic_engine.py"]
//!
//! [deepcr]
//! program = "/opt/crr/deepcr-engine"
//! ```
//!
//! Lookup order is `--config`, then `$CRR_CONFIG`, then built-in defaults.
//! The defaults name the adapters shipped in `engines/`, which need to be on
//! `PATH` together with their Python packages (astroscrappy, deepCR).

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

pub const CONFIG_ENV: &str = "CRR_CONFIG";
pub const DEFAULT_LACOSMIC_ENGINE: &str = "crr-lacosmic-engine";
pub const DEFAULT_DEEPCR_ENGINE: &str = "crr-deepcr-engine";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config '{}': {source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Invalid config '{}': {source}", path.display())]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
}

/// How to launch one detection engine
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EngineConfig {
    pub program: PathBuf,
    /// Leading arguments, placed before the generated ones
    #[serde(default)]
    pub args: Vec<String>,
}

impl EngineConfig {
    #[must_use]
    pub fn program(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default)]
    pub lacosmic: Option<EngineConfig>,
    #[serde(default)]
    pub deepcr: Option<EngineConfig>,
}

impl Config {
    pub fn from_toml_str(text: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(text)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Load `explicit`, else the file named by `$CRR_CONFIG`, else defaults
    pub fn discover(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        let path = explicit
            .map(Path::to_path_buf)
            .or_else(|| env::var_os(CONFIG_ENV).map(PathBuf::from));

        match path {
            Some(path) => {
                debug!(config = %path.display(), "loading engine config");
                Self::load(&path)
            }
            None => Ok(Self::default()),
        }
    }

    /// Engine for the L.A.Cosmic tool, `program` replaces the configured one
    #[must_use]
    pub fn lacosmic_engine(&self, program: Option<&Path>) -> EngineConfig {
        Self::pick(self.lacosmic.as_ref(), program, DEFAULT_LACOSMIC_ENGINE)
    }

    /// Engine for the DeepCR tool, `program` replaces the configured one
    #[must_use]
    pub fn deepcr_engine(&self, program: Option<&Path>) -> EngineConfig {
        Self::pick(self.deepcr.as_ref(), program, DEFAULT_DEEPCR_ENGINE)
    }

    fn pick(configured: Option<&EngineConfig>, program: Option<&Path>, default: &str) -> EngineConfig {
        match (program, configured) {
            (Some(program), _) => EngineConfig::program(program),
            (None, Some(engine)) => engine.clone(),
            (None, None) => EngineConfig::program(default),
        }
    }
}
