// SPDX-License-Identifier: MIT OR Apache-2.0

//! Index location helpers

use std::path::{Path, PathBuf};

use crate::index::store::INDEX_FILE;

/// The name of the index directory
pub const INDEX_DIR: &str = ".exemplar";

/// Result of finding an index root
#[derive(Debug)]
pub struct IndexRoot {
    /// The directory containing the .exemplar folder
    pub root: PathBuf,
    /// The full path to the .exemplar folder
    pub index_path: PathBuf,
    /// Whether this is the current directory or a parent
    pub is_parent: bool,
}

/// Find the nearest .exemplar directory by walking up from the given path.
/// Returns None if no .exemplar directory is found.
pub fn find_index_root(start: impl AsRef<Path>) -> Option<IndexRoot> {
    let mut current = start.as_ref().to_path_buf();

    // Canonicalize to handle relative paths
    if let Ok(canonical) = current.canonicalize() {
        current = canonical;
    }

    let original = current.clone();

    loop {
        let index_path = current.join(INDEX_DIR);
        if index_path.is_dir() {
            return Some(IndexRoot {
                root: current.clone(),
                index_path,
                is_parent: current != original,
            });
        }

        if !current.pop() {
            break;
        }
    }

    None
}

/// Default index database for `start`: inside the nearest existing
/// .exemplar directory, else `start/.exemplar/index.sqlite`.
pub fn default_index_file(start: impl AsRef<Path>) -> PathBuf {
    match find_index_root(&start) {
        Some(root) => root.index_path.join(INDEX_FILE),
        None => start.as_ref().join(INDEX_DIR).join(INDEX_FILE),
    }
}

/// Picks the index file: explicit flag, then configured path, then the default.
pub fn resolve_index_file(
    explicit: Option<&Path>,
    configured: Option<&Path>,
    cwd: impl AsRef<Path>,
) -> PathBuf {
    explicit
        .or(configured)
        .map(Path::to_path_buf)
        .unwrap_or_else(|| default_index_file(cwd))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn find_index_root_in_current_dir() {
        let dir = TempDir::new().unwrap();
        fs::create_dir(dir.path().join(INDEX_DIR)).unwrap();

        let result = find_index_root(dir.path()).unwrap();
        assert_eq!(result.root, dir.path().canonicalize().unwrap());
        assert!(!result.is_parent);
    }

    #[test]
    fn find_index_root_in_parent() {
        let dir = TempDir::new().unwrap();
        fs::create_dir(dir.path().join(INDEX_DIR)).unwrap();

        let subdir = dir.path().join("subdir");
        fs::create_dir(&subdir).unwrap();

        let result = find_index_root(&subdir).unwrap();
        assert_eq!(result.root, dir.path().canonicalize().unwrap());
        assert!(result.is_parent);
        assert_eq!(
            default_index_file(&subdir),
            result.index_path.join(INDEX_FILE)
        );
    }

    #[test]
    fn resolve_prefers_explicit_then_configured() {
        let dir = TempDir::new().unwrap();
        let explicit = Path::new("/tmp/a.sqlite");
        let configured = Path::new("/tmp/b.sqlite");

        assert_eq!(
            resolve_index_file(Some(explicit), Some(configured), dir.path()),
            explicit
        );
        assert_eq!(
            resolve_index_file(None, Some(configured), dir.path()),
            configured
        );
    }
}
