//! Output directory validation shared by both tools
//!
//! Results may only be written below the user's home directory, the current
//! working directory or a temporary directory. Paths are resolved before the
//! check so `..` segments and symlinks cannot escape those bases.

use std::env;
use std::io;
use std::path::{Component, Path, PathBuf};

use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum OutputDirError {
    #[error(
        "Output directory must be within home, temp, or current directory (requested: {})",
        requested.display()
    )]
    OutsideAllowedBases { requested: PathBuf },

    #[error("Invalid output directory '{}': {source}", path.display())]
    Resolve { path: PathBuf, source: io::Error },

    #[error("Failed to create output directory '{}': {source}", path.display())]
    Create { path: PathBuf, source: io::Error },
}

/// Directories output is allowed to land in, stored resolved
#[derive(Debug, Clone)]
pub struct AllowedBases {
    bases: Vec<PathBuf>,
}

impl AllowedBases {
    /// Resolve each candidate, dropping the ones that cannot be resolved
    #[must_use]
    pub fn new(candidates: impl IntoIterator<Item = PathBuf>) -> Self {
        let mut bases = Vec::new();
        for candidate in candidates {
            match resolve_lenient(&candidate) {
                Ok(resolved) if !bases.contains(&resolved) => bases.push(resolved),
                Ok(_) => {}
                Err(e) => debug!(base = %candidate.display(), error = %e, "ignoring unresolvable base"),
            }
        }
        Self { bases }
    }

    /// Home, current directory, `/tmp`, `/var/tmp` and `$TMPDIR`
    #[must_use]
    pub fn from_env() -> Self {
        let mut candidates = Vec::new();
        if let Some(home) = env::var_os("HOME").or_else(|| env::var_os("USERPROFILE")) {
            candidates.push(PathBuf::from(home));
        }
        if let Ok(cwd) = env::current_dir() {
            candidates.push(cwd);
        }
        candidates.push(PathBuf::from("/tmp"));
        candidates.push(PathBuf::from("/var/tmp"));
        candidates.push(env::var_os("TMPDIR").map_or_else(|| PathBuf::from("/tmp"), PathBuf::from));
        Self::new(candidates)
    }

    /// `resolved` must already be resolved with [`resolve_lenient`]
    #[must_use]
    pub fn contains(&self, resolved: &Path) -> bool {
        self.bases.iter().any(|base| resolved.starts_with(base))
    }
}

/// Make `path` absolute, following symlinks along the existing prefix and
/// folding `.`/`..` segments. Missing trailing components are kept as given.
pub fn resolve_lenient(path: &Path) -> io::Result<PathBuf> {
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        env::current_dir()?.join(path)
    };

    let mut resolved = PathBuf::new();
    for component in absolute.components() {
        match component {
            Component::Prefix(_) | Component::RootDir => resolved.push(component.as_os_str()),
            Component::CurDir => {}
            Component::ParentDir => {
                resolved.pop();
            }
            Component::Normal(name) => {
                let candidate = resolved.join(name);
                resolved = candidate.canonicalize().unwrap_or(candidate);
            }
        }
    }

    Ok(resolved)
}

/// Validate `dir` against the default bases and create it
pub fn validate_output_dir(dir: &Path) -> Result<PathBuf, OutputDirError> {
    validate_output_dir_within(dir, &AllowedBases::from_env())
}

/// Validate `dir` against `bases` and create it, returning the resolved path
pub fn validate_output_dir_within(dir: &Path, bases: &AllowedBases) -> Result<PathBuf, OutputDirError> {
    let resolved = resolve_lenient(dir).map_err(|source| OutputDirError::Resolve {
        path: dir.to_path_buf(),
        source,
    })?;

    if !bases.contains(&resolved) {
        return Err(OutputDirError::OutsideAllowedBases {
            requested: resolved,
        });
    }

    std::fs::create_dir_all(&resolved).map_err(|source| OutputDirError::Create {
        path: resolved.clone(),
        source,
    })?;

    Ok(resolved)
}
