//! Mock filesystem implementation for testing
//!
//! In-memory double for the FileSystem façade so planner and executor
//! tests can run without touching disk. Every mutating call is recorded,
//! which lets tests assert that resume paths perform zero writes.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use chrono::{TimeZone, Utc};

use super::{FileInfo, FileSystem, FileSystemError, FsResult};
use crate::cancel::CancellationToken;
use crate::media::{FileDateTime, FileRef};

#[derive(Debug, Default)]
struct MockState {
    files: BTreeMap<PathBuf, u64>,
    dirs: BTreeSet<PathBuf>,
    mutations: Vec<String>,
}

/// In-memory FileSystem double
#[derive(Debug, Clone, Default)]
pub struct MockFileSystem {
    state: Arc<RwLock<MockState>>,
}

impl MockFileSystem {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a file with the given size
    pub fn add_file(&self, path: impl Into<PathBuf>, size: u64) {
        let path = path.into();
        let mut state = self.state.write().unwrap();
        if let Some(parent) = path.parent() {
            state.dirs.insert(parent.to_path_buf());
        }
        state.files.insert(path, size);
    }

    /// Seed a directory
    pub fn add_dir(&self, path: impl Into<PathBuf>) {
        self.state.write().unwrap().dirs.insert(path.into());
    }

    /// All mutating calls made so far, in order
    pub fn mutations(&self) -> Vec<String> {
        self.state.read().unwrap().mutations.clone()
    }

    /// Paths of all files currently present
    pub fn file_paths(&self) -> Vec<PathBuf> {
        self.state.read().unwrap().files.keys().cloned().collect()
    }

    fn record(&self, op: String) {
        self.state.write().unwrap().mutations.push(op);
    }

    fn has_children(state: &MockState, dir: &Path) -> bool {
        state.files.keys().any(|p| p.starts_with(dir) && p != dir)
            || state
                .dirs
                .iter()
                .any(|p| p.starts_with(dir) && p != dir)
    }
}

impl FileSystem for MockFileSystem {
    fn directory_exists(&self, path: &Path) -> bool {
        self.state.read().unwrap().dirs.contains(path)
    }

    fn file_exists(&self, path: &Path) -> bool {
        self.state.read().unwrap().files.contains_key(path)
    }

    fn create_directory(&self, path: &Path) -> FsResult<()> {
        self.record(format!("mkdir {}", path.display()));
        let mut state = self.state.write().unwrap();
        let mut current = PathBuf::new();
        for component in path.components() {
            current.push(component);
            state.dirs.insert(current.clone());
        }
        Ok(())
    }

    fn copy_file(&self, src: &Path, dst: &Path, overwrite: bool) -> FsResult<()> {
        self.record(format!("copy {} -> {}", src.display(), dst.display()));
        let mut state = self.state.write().unwrap();
        let size = *state
            .files
            .get(src)
            .ok_or_else(|| FileSystemError::NotFound(src.to_path_buf()))?;
        if !overwrite && state.files.contains_key(dst) {
            return Err(FileSystemError::AlreadyExists(dst.to_path_buf()));
        }
        state.files.insert(dst.to_path_buf(), size);
        Ok(())
    }

    fn move_file(&self, src: &Path, dst: &Path) -> FsResult<()> {
        self.record(format!("move {} -> {}", src.display(), dst.display()));
        let mut state = self.state.write().unwrap();
        let size = state
            .files
            .remove(src)
            .ok_or_else(|| FileSystemError::NotFound(src.to_path_buf()))?;
        state.files.insert(dst.to_path_buf(), size);
        Ok(())
    }

    fn delete_file(&self, path: &Path) -> FsResult<()> {
        self.record(format!("rm {}", path.display()));
        let mut state = self.state.write().unwrap();
        state
            .files
            .remove(path)
            .ok_or_else(|| FileSystemError::NotFound(path.to_path_buf()))?;
        Ok(())
    }

    fn remove_directory(&self, path: &Path) -> FsResult<()> {
        self.record(format!("rmdir {}", path.display()));
        let mut state = self.state.write().unwrap();
        if !state.dirs.contains(path) {
            return Err(FileSystemError::NotFound(path.to_path_buf()));
        }
        if Self::has_children(&state, path) {
            return Err(FileSystemError::DirectoryNotEmpty(path.to_path_buf()));
        }
        state.dirs.remove(path);
        Ok(())
    }

    fn enumerate_files(&self, path: &Path, cancel: &CancellationToken) -> FsResult<Vec<FileRef>> {
        let stamp = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let state = self.state.read().unwrap();

        let mut out = Vec::new();
        for (file_path, size) in state.files.iter() {
            if cancel.is_cancelled() {
                return Err(FileSystemError::Cancelled);
            }
            if !file_path.starts_with(path) {
                continue;
            }
            out.push(FileRef {
                path: file_path.clone(),
                size: *size,
                date_time: FileDateTime {
                    taken: None,
                    created: stamp,
                    modified: stamp,
                },
                location: None,
                camera: None,
                album: None,
                unknown_reason: None,
                sidecars: Vec::new(),
            });
        }
        Ok(out)
    }

    fn get_file_info(&self, path: &Path) -> FsResult<FileInfo> {
        let stamp = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let state = self.state.read().unwrap();
        let size = *state
            .files
            .get(path)
            .ok_or_else(|| FileSystemError::NotFound(path.to_path_buf()))?;
        Ok(FileInfo {
            path: path.to_path_buf(),
            size,
            created: stamp,
            modified: stamp,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seed_and_query() {
        let fs = MockFileSystem::new();
        fs.add_file("/src/a.jpg", 100);

        assert!(fs.file_exists(Path::new("/src/a.jpg")));
        assert!(fs.directory_exists(Path::new("/src")));
        assert!(!fs.file_exists(Path::new("/src/b.jpg")));
    }

    #[test]
    fn test_copy_and_overwrite_semantics() {
        let fs = MockFileSystem::new();
        fs.add_file("/src/a.jpg", 100);
        fs.add_file("/dst/a.jpg", 5);

        let err = fs
            .copy_file(Path::new("/src/a.jpg"), Path::new("/dst/a.jpg"), false)
            .unwrap_err();
        assert!(matches!(err, FileSystemError::AlreadyExists(_)));

        fs.copy_file(Path::new("/src/a.jpg"), Path::new("/dst/a.jpg"), true)
            .unwrap();
        assert_eq!(fs.get_file_info(Path::new("/dst/a.jpg")).unwrap().size, 100);
    }

    #[test]
    fn test_mutation_log() {
        let fs = MockFileSystem::new();
        fs.add_file("/src/a.jpg", 100);
        fs.create_directory(Path::new("/dst")).unwrap();
        fs.copy_file(Path::new("/src/a.jpg"), Path::new("/dst/a.jpg"), false)
            .unwrap();

        let mutations = fs.mutations();
        assert_eq!(mutations.len(), 2);
        assert!(mutations[0].starts_with("mkdir"));
        assert!(mutations[1].starts_with("copy"));
    }

    #[test]
    fn test_remove_directory_semantics() {
        let fs = MockFileSystem::new();
        fs.add_file("/dst/2024/a.jpg", 1);

        let err = fs.remove_directory(Path::new("/dst/2024")).unwrap_err();
        assert!(matches!(err, FileSystemError::DirectoryNotEmpty(_)));

        fs.delete_file(Path::new("/dst/2024/a.jpg")).unwrap();
        fs.remove_directory(Path::new("/dst/2024")).unwrap();
        assert!(!fs.directory_exists(Path::new("/dst/2024")));
    }
}
