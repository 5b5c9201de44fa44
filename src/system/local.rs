//! Local filesystem implementation of the FileSystem façade
//!
//! Wraps `std::fs` with the error mapping the engine expects. Copies
//! preserve the source modification time so date-based layouts stay
//! stable when the destination is re-enumerated later.

use std::fs;
use std::io;
use std::path::Path;

use chrono::{DateTime, Utc};
use filetime::FileTime;
use walkdir::WalkDir;

use super::{FileInfo, FileSystem, FileSystemError, FsResult};
use crate::cancel::CancellationToken;
use crate::media::{FileDateTime, FileRef};

/// Direct local-disk implementation
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalFileSystem;

impl LocalFileSystem {
    pub fn new() -> Self {
        Self
    }
}

fn map_io(err: io::Error, path: &Path) -> FileSystemError {
    match err.kind() {
        io::ErrorKind::NotFound => FileSystemError::NotFound(path.to_path_buf()),
        io::ErrorKind::PermissionDenied => FileSystemError::PermissionDenied(path.to_path_buf()),
        _ => FileSystemError::Io(err),
    }
}

fn system_time_to_utc(time: std::time::SystemTime) -> DateTime<Utc> {
    DateTime::<Utc>::from(time)
}

impl FileSystem for LocalFileSystem {
    fn directory_exists(&self, path: &Path) -> bool {
        path.is_dir()
    }

    fn file_exists(&self, path: &Path) -> bool {
        path.is_file()
    }

    fn create_directory(&self, path: &Path) -> FsResult<()> {
        fs::create_dir_all(path).map_err(|e| map_io(e, path))
    }

    fn copy_file(&self, src: &Path, dst: &Path, overwrite: bool) -> FsResult<()> {
        if !overwrite && dst.exists() {
            return Err(FileSystemError::AlreadyExists(dst.to_path_buf()));
        }

        let metadata = fs::metadata(src).map_err(|e| map_io(e, src))?;
        fs::copy(src, dst).map_err(|e| map_io(e, src))?;

        // Keep the capture-adjacent mtime on the organized copy
        let mtime = FileTime::from_last_modification_time(&metadata);
        if let Err(e) = filetime::set_file_mtime(dst, mtime) {
            tracing::warn!(path = %dst.display(), error = %e, "failed to preserve mtime");
        }

        Ok(())
    }

    fn move_file(&self, src: &Path, dst: &Path) -> FsResult<()> {
        match fs::rename(src, dst) {
            Ok(()) => Ok(()),
            Err(_) => {
                // Rename fails across filesystems; fall back to copy + delete
                self.copy_file(src, dst, true)?;
                fs::remove_file(src).map_err(|e| map_io(e, src))
            }
        }
    }

    fn delete_file(&self, path: &Path) -> FsResult<()> {
        fs::remove_file(path).map_err(|e| map_io(e, path))
    }

    fn remove_directory(&self, path: &Path) -> FsResult<()> {
        fs::remove_dir(path).map_err(|e| match e.kind() {
            io::ErrorKind::DirectoryNotEmpty => {
                FileSystemError::DirectoryNotEmpty(path.to_path_buf())
            }
            _ => map_io(e, path),
        })
    }

    fn enumerate_files(&self, path: &Path, cancel: &CancellationToken) -> FsResult<Vec<FileRef>> {
        if !path.is_dir() {
            return Err(FileSystemError::NotFound(path.to_path_buf()));
        }

        let mut files = Vec::new();
        for entry in WalkDir::new(path)
            .follow_links(false)
            .sort_by_file_name()
        {
            if cancel.is_cancelled() {
                return Err(FileSystemError::Cancelled);
            }

            let entry = match entry {
                Ok(e) => e,
                Err(e) => {
                    tracing::warn!(error = %e, "failed to read entry during enumeration");
                    continue;
                }
            };

            if !entry.file_type().is_file() {
                continue;
            }

            match self.get_file_info(entry.path()) {
                Ok(info) => files.push(FileRef {
                    path: info.path,
                    size: info.size,
                    date_time: FileDateTime {
                        taken: None,
                        created: info.created,
                        modified: info.modified,
                    },
                    location: None,
                    camera: None,
                    album: None,
                    unknown_reason: None,
                    sidecars: Vec::new(),
                }),
                Err(e) => {
                    tracing::warn!(path = %entry.path().display(), error = %e,
                        "failed to stat file during enumeration");
                }
            }
        }

        Ok(files)
    }

    fn get_file_info(&self, path: &Path) -> FsResult<FileInfo> {
        let metadata = fs::metadata(path).map_err(|e| map_io(e, path))?;

        let modified = metadata
            .modified()
            .map(system_time_to_utc)
            .unwrap_or_else(|_| Utc::now());
        let created = metadata
            .created()
            .map(system_time_to_utc)
            .unwrap_or(modified);

        Ok(FileInfo {
            path: path.to_path_buf(),
            size: metadata.len(),
            created,
            modified,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_copy_refuses_existing_without_overwrite() {
        let temp = TempDir::new().unwrap();
        let src = temp.path().join("a.jpg");
        let dst = temp.path().join("b.jpg");
        fs::write(&src, b"source").unwrap();
        fs::write(&dst, b"existing").unwrap();

        let fs_facade = LocalFileSystem::new();
        let err = fs_facade.copy_file(&src, &dst, false).unwrap_err();
        assert!(matches!(err, FileSystemError::AlreadyExists(_)));

        fs_facade.copy_file(&src, &dst, true).unwrap();
        assert_eq!(fs::read(&dst).unwrap(), b"source");
    }

    #[test]
    fn test_move_file() {
        let temp = TempDir::new().unwrap();
        let src = temp.path().join("a.jpg");
        let dst = temp.path().join("sub").join("a.jpg");
        fs::write(&src, b"payload").unwrap();

        let fs_facade = LocalFileSystem::new();
        fs_facade.create_directory(dst.parent().unwrap()).unwrap();
        fs_facade.move_file(&src, &dst).unwrap();

        assert!(!src.exists());
        assert_eq!(fs::read(&dst).unwrap(), b"payload");
    }

    #[test]
    fn test_remove_directory_requires_empty() {
        let temp = TempDir::new().unwrap();
        let dir = temp.path().join("d");
        fs::create_dir(&dir).unwrap();
        fs::write(dir.join("x.txt"), b"x").unwrap();

        let fs_facade = LocalFileSystem::new();
        assert!(fs_facade.remove_directory(&dir).is_err());

        fs::remove_file(dir.join("x.txt")).unwrap();
        fs_facade.remove_directory(&dir).unwrap();
        assert!(!dir.exists());
    }

    #[test]
    fn test_enumerate_files_stable_order() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join("b.jpg"), b"b").unwrap();
        fs::write(temp.path().join("a.jpg"), b"a").unwrap();
        fs::create_dir(temp.path().join("nested")).unwrap();
        fs::write(temp.path().join("nested").join("c.jpg"), b"c").unwrap();

        let fs_facade = LocalFileSystem::new();
        let cancel = CancellationToken::new();
        let files = fs_facade.enumerate_files(temp.path(), &cancel).unwrap();

        let names: Vec<_> = files.iter().map(|f| f.file_name().to_string()).collect();
        assert_eq!(names, vec!["a.jpg", "b.jpg", "c.jpg"]);
    }

    #[test]
    fn test_enumerate_observes_cancellation() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join("a.jpg"), b"a").unwrap();

        let fs_facade = LocalFileSystem::new();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = fs_facade.enumerate_files(temp.path(), &cancel).unwrap_err();
        assert!(matches!(err, FileSystemError::Cancelled));
    }
}
