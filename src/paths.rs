use std::path::{Component, Path, PathBuf};

use crate::dirs::GIT_DIR;
use crate::error::{Error, Result};

/// Normalize a store-relative path into its plain segments.
///
/// Strips `.` segments and redundant separators. An empty input (or one made
/// only of separators) means the store root and yields an empty path.
///
/// # Errors
/// Returns [`Error::InvalidPath`] if the path contains `..`, or is absolute.
pub fn normalize_path(path: &Path) -> Result<PathBuf> {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Normal(seg) => out.push(seg),
            Component::CurDir => {}
            Component::ParentDir => {
                return Err(Error::invalid_path(format!(
                    "path segment '..' is not allowed: {}",
                    path.display(),
                )));
            }
            Component::RootDir | Component::Prefix(_) => {
                return Err(Error::invalid_path(format!(
                    "expected a relative path: {}",
                    path.display(),
                )));
            }
        }
    }

    if out.as_os_str().is_empty() && !is_root_path(path) {
        // Paths with actual content that collapsed away (e.g. ".") are errors.
        return Err(Error::invalid_path("path must not be empty"));
    }

    Ok(out)
}

/// Returns `true` when the path refers to the store root
/// (empty or only separators).
pub fn is_root_path(path: &Path) -> bool {
    let s = path.as_os_str().to_string_lossy();
    s.is_empty() || s.chars().all(std::path::is_separator)
}

/// Resolve a caller-supplied path to an absolute path inside `root`.
///
/// Relative paths are joined onto `root`. Absolute paths are accepted only
/// when they lie under `root`. Neither form may escape the root via `..`.
///
/// Paths inside the repository metadata directory are refused, so file
/// operations cannot damage the checkout that push depends on.
///
/// # Errors
/// Returns [`Error::InvalidPath`] for paths outside the root or inside
/// [`GIT_DIR`].
pub fn resolve(root: &Path, path: impl AsRef<Path>) -> Result<PathBuf> {
    let path = path.as_ref();
    let relative = if path.is_absolute() {
        path.strip_prefix(root).map_err(|_| {
            Error::invalid_path(format!(
                "{} is outside the store directory {}",
                path.display(),
                root.display(),
            ))
        })?
    } else {
        path
    };
    let normalized = normalize_path(relative)?;
    if normalized.as_os_str().is_empty() {
        return Ok(root.to_path_buf());
    }
    if normalized.components().next() == Some(Component::Normal(GIT_DIR.as_ref())) {
        return Err(Error::invalid_path(format!(
            "{} is inside the repository metadata directory",
            path.display(),
        )));
    }
    Ok(root.join(normalized))
}

/// Create every missing parent directory of `path`.
pub fn ensure_parent_dir(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent).map_err(|e| Error::io(parent, e))?;
        }
    }
    Ok(())
}
