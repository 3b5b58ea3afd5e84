//! Recursive discovery of candidate test files.

use crate::error::{HarnessError, HarnessResult};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use walkdir::{DirEntry, WalkDir};

/// A regular file found during discovery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateFile {
    /// Absolute path to the file.
    pub path: PathBuf,

    /// Directory containing the file.
    pub dir: PathBuf,

    /// Final path component.
    pub file_name: String,
}

impl CandidateFile {
    /// Build a candidate from a path. Returns `None` if the path has no file name.
    pub fn from_path(path: impl Into<PathBuf>) -> Option<Self> {
        let path = path.into();
        let file_name = path.file_name()?.to_string_lossy().into_owned();
        let dir = path.parent().map(Path::to_path_buf).unwrap_or_default();
        Some(Self { path, dir, file_name })
    }

    fn from_entry(entry: DirEntry) -> Option<Self> {
        Self::from_path(entry.into_path())
    }
}

/// Walks a root directory and yields every regular file beneath it.
///
/// Order is by file name within each directory, so two walks over an
/// unchanged tree produce the same sequence. Unreadable subdirectories
/// are logged and skipped.
#[derive(Debug, Clone)]
pub struct Discoverer {
    root: PathBuf,
}

impl Discoverer {
    /// Validate the root and create a discoverer.
    ///
    /// Fails with [`HarnessError::Discovery`] if the root does not exist,
    /// is not a directory, or cannot be listed.
    pub fn new(root: impl AsRef<Path>) -> HarnessResult<Self> {
        let root = root.as_ref();
        let discovery_err = |source: io::Error| HarnessError::Discovery {
            path: root.to_path_buf(),
            source,
        };

        let metadata = fs::metadata(root).map_err(discovery_err)?;
        if !metadata.is_dir() {
            return Err(discovery_err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "not a directory",
            )));
        }
        fs::read_dir(root).map_err(discovery_err)?;

        let root = fs::canonicalize(root).map_err(discovery_err)?;
        debug!(root = %root.display(), "Discovery root resolved");

        Ok(Self { root })
    }

    /// Absolute discovery root.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Lazily iterate candidate files. Each call starts a fresh walk.
    pub fn candidates(&self) -> impl Iterator<Item = CandidateFile> + '_ {
        WalkDir::new(&self.root)
            .follow_links(false)
            .sort_by_file_name()
            .into_iter()
            .filter_map(|entry| match entry {
                Ok(entry) => Some(entry),
                Err(err) => {
                    warn!(
                        path = %err.path().map(|p| p.display().to_string()).unwrap_or_default(),
                        error = %err,
                        "Skipping unreadable entry"
                    );
                    None
                }
            })
            .filter(|entry| entry.file_type().is_file())
            .filter_map(CandidateFile::from_entry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn touch(path: &Path) {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, b"").unwrap();
    }

    #[test]
    fn test_missing_root_fails() {
        let dir = tempdir().unwrap();
        let err = Discoverer::new(dir.path().join("nope")).unwrap_err();
        assert!(matches!(err, HarnessError::Discovery { .. }));
    }

    #[test]
    fn test_file_root_fails() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("a.txt");
        touch(&file);
        let err = Discoverer::new(&file).unwrap_err();
        assert!(matches!(err, HarnessError::Discovery { .. }));
    }

    #[test]
    fn test_recursive_walk_yields_regular_files() {
        let dir = tempdir().unwrap();
        touch(&dir.path().join("top.pass.cpp"));
        touch(&dir.path().join("nested/deeper/inner.pass.cpp"));
        touch(&dir.path().join("nested/notes.txt"));
        fs::create_dir_all(dir.path().join("empty")).unwrap();

        let discoverer = Discoverer::new(dir.path()).unwrap();
        let names: Vec<String> = discoverer.candidates().map(|c| c.file_name).collect();

        assert_eq!(names.len(), 3);
        assert!(names.contains(&"top.pass.cpp".to_string()));
        assert!(names.contains(&"inner.pass.cpp".to_string()));
        assert!(names.contains(&"notes.txt".to_string()));
    }

    #[test]
    fn test_walk_is_restartable_and_stable() {
        let dir = tempdir().unwrap();
        for name in ["b.pass.cpp", "a.pass.cpp", "sub/c.pass.cpp", "sub/a.h"] {
            touch(&dir.path().join(name));
        }

        let discoverer = Discoverer::new(dir.path()).unwrap();
        let first: Vec<PathBuf> = discoverer.candidates().map(|c| c.path).collect();
        let second: Vec<PathBuf> = discoverer.candidates().map(|c| c.path).collect();

        assert_eq!(first, second);
        assert_eq!(first.len(), 4);
    }

    #[test]
    fn test_candidate_paths_are_absolute() {
        let dir = tempdir().unwrap();
        touch(&dir.path().join("x.pass.cpp"));

        let discoverer = Discoverer::new(dir.path()).unwrap();
        let candidate = discoverer.candidates().next().unwrap();

        assert!(candidate.path.is_absolute());
        assert_eq!(candidate.dir, discoverer.root());
        assert_eq!(candidate.file_name, "x.pass.cpp");
    }

    #[cfg(unix)]
    #[test]
    fn test_unreadable_subdirectory_is_skipped() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempdir().unwrap();
        touch(&dir.path().join("ok.pass.cpp"));
        let locked = dir.path().join("locked");
        touch(&locked.join("hidden.pass.cpp"));
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o000)).unwrap();

        // Root users can read regardless of mode bits.
        let readable = fs::read_dir(&locked).is_ok();

        let discoverer = Discoverer::new(dir.path()).unwrap();
        let names: Vec<String> = discoverer.candidates().map(|c| c.file_name).collect();

        fs::set_permissions(&locked, fs::Permissions::from_mode(0o755)).unwrap();

        assert!(names.contains(&"ok.pass.cpp".to_string()));
        if !readable {
            assert!(!names.contains(&"hidden.pass.cpp".to_string()));
        }
    }
}
