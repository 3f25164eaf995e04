//! Path helpers for the layered loader.

use crate::ConfigError;
use std::fs;
use std::path::{Path, PathBuf};

/// Canonicalize a path, keeping it as-is when it does not exist yet.
pub(super) fn normalize_path(path: &Path) -> Result<PathBuf, ConfigError> {
    match path.canonicalize() {
        Ok(path) => Ok(path),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(path.to_path_buf()),
        Err(source) => Err(ConfigError::ReadFailed {
            path: path.to_path_buf(),
            source,
        }),
    }
}

/// Read a file, attaching its path to any IO error.
pub(super) fn read_file(path: &Path) -> Result<String, ConfigError> {
    fs::read_to_string(path).map_err(|source| ConfigError::ReadFailed {
        path: path.to_path_buf(),
        source,
    })
}

/// Nearest ancestor of `cwd` holding one of the marker entries.
pub(super) fn find_project_root(cwd: &Path, markers: &[String]) -> Option<PathBuf> {
    cwd.ancestors()
        .find(|ancestor| markers.iter().any(|marker| ancestor.join(marker).exists()))
        .map(Path::to_path_buf)
}
