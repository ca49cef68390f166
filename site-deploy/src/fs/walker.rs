//! Directory traversal for deploy manifests.
//!
//! Walks a site directory and yields every regular file that should be
//! published, together with its path relative to the root. Dotted paths and
//! macOS archive metadata are never published, with the exception of
//! `.well-known/` which carries domain verification files.

use std::path::{Path, PathBuf};
use tracing::warn;
use walkdir::{DirEntry, WalkDir};

const WELL_KNOWN_PREFIX: &str = ".well-known/";
const MACOS_METADATA_PREFIX: &str = "__MACOS";

/// A regular file discovered during walking
#[derive(Debug, Clone)]
pub struct FileInfo {
    /// Full path to the file
    pub path: PathBuf,

    /// Relative path from the root, `/`-separated
    pub relative_path: String,

    /// File size in bytes
    pub size: u64,
}

/// Check whether a relative, `/`-separated path must be left out of a deploy.
///
/// A path is ignored when it starts with `.`, has any segment starting with
/// `.`, or starts with `__MACOS`. Paths under `.well-known/` are always kept.
pub fn is_ignored(relative_path: &str) -> bool {
    let hidden = relative_path.starts_with('.')
        || relative_path.contains("/.")
        || relative_path.starts_with(MACOS_METADATA_PREFIX);

    hidden && !relative_path.starts_with(WELL_KNOWN_PREFIX)
}

/// Walk a directory tree and collect every publishable regular file.
///
/// Symlinks are not followed and are skipped along with every other
/// non-regular entry. Ignored directories are pruned without descending.
/// Entries whose relative path is not valid UTF-8 cannot be named in a
/// deploy listing and are skipped with a warning.
///
/// # Errors
/// Any traversal or metadata error aborts the walk.
pub fn walk_directory(root: &Path) -> Result<Vec<FileInfo>, walkdir::Error> {
    let mut files = Vec::new();

    let walker = WalkDir::new(root)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| !should_prune(entry, root));

    for entry in walker {
        let entry = entry?;

        if !entry.file_type().is_file() {
            continue;
        }

        let Some(relative_path) = relative_path(entry.path(), root) else {
            warn!("Skipping {}: name is not valid UTF-8", entry.path().display());
            continue;
        };
        if is_ignored(&relative_path) {
            continue;
        }

        let size = entry.metadata()?.len();
        files.push(FileInfo {
            path: entry.path().to_path_buf(),
            relative_path,
            size,
        });
    }

    Ok(files)
}

/// Directories are tested with a trailing `/` so that `.well-known` itself
/// survives while other dotted directories are cut off at the top.
fn should_prune(entry: &DirEntry, root: &Path) -> bool {
    if entry.depth() == 0 || !entry.file_type().is_dir() {
        return false;
    }

    let Some(mut relative) = relative_path(entry.path(), root) else {
        warn!("Skipping {}: name is not valid UTF-8", entry.path().display());
        return true;
    };
    relative.push('/');
    is_ignored(&relative)
}

fn relative_path(path: &Path, root: &Path) -> Option<String> {
    let relative = path.strip_prefix(root).unwrap_or(path);

    let segments = relative
        .components()
        .map(|component| component.as_os_str().to_str())
        .collect::<Option<Vec<_>>>()?;

    Some(segments.join("/"))
}
