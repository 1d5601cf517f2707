//! Blocking directory helpers: forced removal and file search.

use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::glob::glob_match;

/// Name of the repository metadata directory skipped by searches.
pub const GIT_DIR: &str = ".git";

/// How far [`search`] descends below its starting directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SearchOption {
    #[default]
    TopDirectoryOnly,
    AllDirectories,
}

/// Recursively delete `path`, clearing read-only permissions first.
///
/// Checkouts can leave non-writable entries behind (git object files are
/// created read-only), so every entry is made writable before removal.
/// A missing path is not an error.
pub fn force_delete(path: &Path) -> Result<()> {
    let meta = match std::fs::symlink_metadata(path) {
        Ok(m) => m,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(Error::io(path, e)),
    };

    if meta.is_dir() {
        make_writable_recursive(path)?;
        std::fs::remove_dir_all(path).map_err(|e| Error::io(path, e))
    } else {
        make_writable(path, &meta)?;
        std::fs::remove_file(path).map_err(|e| Error::io(path, e))
    }
}

fn make_writable_recursive(dir: &Path) -> Result<()> {
    let read_dir = std::fs::read_dir(dir).map_err(|e| Error::io(dir, e))?;
    for entry in read_dir {
        let entry = entry.map_err(|e| Error::io(dir, e))?;
        let path = entry.path();
        let meta = std::fs::symlink_metadata(&path).map_err(|e| Error::io(&path, e))?;
        if meta.is_dir() {
            make_writable_recursive(&path)?;
        } else if !meta.file_type().is_symlink() {
            make_writable(&path, &meta)?;
        }
    }
    let meta = std::fs::symlink_metadata(dir).map_err(|e| Error::io(dir, e))?;
    make_writable(dir, &meta)
}

fn make_writable(path: &Path, meta: &std::fs::Metadata) -> Result<()> {
    let mut perms = meta.permissions();
    if !perms.readonly() {
        return Ok(());
    }

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        perms.set_mode(perms.mode() | 0o200);
    }
    #[cfg(not(unix))]
    #[allow(clippy::permissions_set_readonly_false)]
    perms.set_readonly(false);

    std::fs::set_permissions(path, perms).map_err(|e| Error::io(path, e))
}

/// List files under `dir` whose names match `pattern`, sorted.
///
/// Returns an empty list when `dir` does not exist. Directories named
/// [`GIT_DIR`] are never entered.
pub fn search(dir: &Path, pattern: &str, option: SearchOption) -> Result<Vec<PathBuf>> {
    let mut results = Vec::new();
    if !dir.is_dir() {
        return Ok(results);
    }
    walk(dir, pattern, option, &mut results)?;
    results.sort();
    Ok(results)
}

fn walk(dir: &Path, pattern: &str, option: SearchOption, results: &mut Vec<PathBuf>) -> Result<()> {
    let read_dir = match std::fs::read_dir(dir) {
        Ok(rd) => rd,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(Error::io(dir, e)),
    };

    for entry in read_dir {
        let entry = entry.map_err(|e| Error::io(dir, e))?;
        let path = entry.path();
        let meta = std::fs::symlink_metadata(&path).map_err(|e| Error::io(&path, e))?;
        let name = entry.file_name();
        let name = name.to_string_lossy();

        if meta.is_dir() {
            if option == SearchOption::AllDirectories && name != GIT_DIR {
                walk(&path, pattern, option, results)?;
            }
        } else if glob_match(pattern, &name) {
            results.push(path);
        }
    }
    Ok(())
}
