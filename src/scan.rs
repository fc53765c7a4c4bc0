//! Upload directory enumeration.
//!
//! "All files" means every regular file under the root whose own name does
//! not start with `.`, minus the configured exclude globs, sorted by path so
//! repeated runs visit documents in the same order.

use globset::{Glob, GlobSet, GlobSetBuilder};
use std::io;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::config::UploadsConfig;
use crate::error::{IngestError, IngestResult};

pub fn list_files(uploads: &UploadsConfig) -> IngestResult<Vec<PathBuf>> {
    let root = &uploads.root;
    if !root.is_dir() {
        return Err(IngestError::Io(io::Error::new(
            io::ErrorKind::NotFound,
            format!("uploads root does not exist: {}", root.display()),
        )));
    }

    let exclude_set = build_globset(&uploads.exclude_globs)?;

    let mut files = Vec::new();
    for entry in WalkDir::new(root) {
        let entry = entry?;
        if !entry.file_type().is_file() || is_hidden(entry.path()) {
            continue;
        }

        let path = entry.path();
        let relative = path.strip_prefix(root).unwrap_or(path);
        if exclude_set.is_match(relative) {
            continue;
        }

        files.push(path.to_path_buf());
    }

    files.sort();
    Ok(files)
}

/// Resolve request paths against the uploads root, keeping existing files only.
pub fn resolve_paths(root: &Path, requested: &[PathBuf]) -> Vec<PathBuf> {
    requested
        .iter()
        .map(|p| if p.is_absolute() { p.clone() } else { root.join(p) })
        .filter(|p| p.is_file())
        .collect()
}

fn is_hidden(path: &Path) -> bool {
    path.file_name()
        .map(|name| name.to_string_lossy().starts_with('.'))
        .unwrap_or(false)
}

fn build_globset(patterns: &[String]) -> IngestResult<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        let glob = Glob::new(pattern)
            .map_err(|e| IngestError::Config(format!("invalid exclude glob '{}': {}", pattern, e)))?;
        builder.add(glob);
    }
    builder
        .build()
        .map_err(|e| IngestError::Config(format!("invalid exclude globs: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn uploads(root: &Path, exclude_globs: &[&str]) -> UploadsConfig {
        UploadsConfig {
            root: root.to_path_buf(),
            exclude_globs: exclude_globs.iter().map(|s| s.to_string()).collect(),
        }
    }

    fn touch(root: &Path, rel: &str) {
        let path = root.join(rel);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, rel).unwrap();
    }

    #[test]
    fn test_lists_sorted_and_skips_hidden() {
        let tmp = TempDir::new().unwrap();
        touch(tmp.path(), "b.txt");
        touch(tmp.path(), "a.txt");
        touch(tmp.path(), ".hidden");
        touch(tmp.path(), "sub/c.pdf");
        touch(tmp.path(), "sub/.DS_Store");

        let files = list_files(&uploads(tmp.path(), &[])).unwrap();
        let rel: Vec<_> = files
            .iter()
            .map(|p| p.strip_prefix(tmp.path()).unwrap().to_string_lossy().to_string())
            .collect();
        assert_eq!(rel, vec!["a.txt", "b.txt", "sub/c.pdf"]);
    }

    #[test]
    fn test_exclude_globs() {
        let tmp = TempDir::new().unwrap();
        touch(tmp.path(), "keep.txt");
        touch(tmp.path(), "tmp/scratch.txt");
        touch(tmp.path(), "draft.tmp");

        let files = list_files(&uploads(tmp.path(), &["tmp/**", "*.tmp"])).unwrap();
        assert_eq!(files, vec![tmp.path().join("keep.txt")]);
    }

    #[test]
    fn test_missing_root_is_error() {
        let tmp = TempDir::new().unwrap();
        let err = list_files(&uploads(&tmp.path().join("nope"), &[])).unwrap_err();
        assert!(matches!(err, IngestError::Io(_)));
    }

    #[test]
    fn test_invalid_glob_is_config_error() {
        let tmp = TempDir::new().unwrap();
        let err = list_files(&uploads(tmp.path(), &["a[b"])).unwrap_err();
        assert!(matches!(err, IngestError::Config(_)));
    }

    #[test]
    fn test_resolve_paths() {
        let tmp = TempDir::new().unwrap();
        touch(tmp.path(), "doc.txt");
        let absolute = tmp.path().join("doc.txt");

        let resolved = resolve_paths(
            tmp.path(),
            &[
                PathBuf::from("doc.txt"),
                absolute.clone(),
                PathBuf::from("missing.txt"),
                PathBuf::from("."),
            ],
        );
        assert_eq!(resolved, vec![absolute.clone(), absolute]);
    }
}
