//! Durable record of the last fully ingested batch.
//!
//! The file holds a single decimal batch index. A missing or empty file means
//! nothing has been committed yet. Commits replace the file atomically, so a
//! reader sees either the old index or the new one.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::CheckpointError;

/// Persistent "last committed batch" marker.
pub trait CheckpointStore: Send {
    /// Last committed batch index, or `None` when nothing has been committed.
    fn load(&self) -> Result<Option<u64>, CheckpointError>;

    /// Durably record `index` as committed. `index` must be strictly greater
    /// than the current value.
    fn commit(&mut self, index: u64) -> Result<(), CheckpointError>;

    /// Forget all progress.
    fn reset(&mut self) -> Result<(), CheckpointError>;
}

/// Checkpoint kept in a small text file.
#[derive(Debug, Clone)]
pub struct FileCheckpoint {
    path: PathBuf,
}

impl FileCheckpoint {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn io_error(&self, source: io::Error) -> CheckpointError {
        CheckpointError::Io {
            path: self.path.clone(),
            source,
        }
    }

    fn parent_dir(&self) -> PathBuf {
        match self.path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        }
    }

    fn write_atomic(&self, content: &str) -> Result<(), CheckpointError> {
        let dir = self.parent_dir();
        fs::create_dir_all(&dir).map_err(|e| self.io_error(e))?;

        let mut tmp = tempfile::NamedTempFile::new_in(&dir).map_err(|e| self.io_error(e))?;
        tmp.write_all(content.as_bytes())
            .map_err(|e| self.io_error(e))?;
        tmp.as_file().sync_all().map_err(|e| self.io_error(e))?;
        tmp.persist(&self.path)
            .map_err(|e| self.io_error(e.error))?;

        sync_dir(&dir).map_err(|e| self.io_error(e))
    }
}

impl CheckpointStore for FileCheckpoint {
    fn load(&self) -> Result<Option<u64>, CheckpointError> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(self.io_error(e)),
        };
        let trimmed = content.trim();
        if trimmed.is_empty() {
            return Ok(None);
        }
        trimmed
            .parse::<u64>()
            .map(Some)
            .map_err(|_| CheckpointError::Corrupt {
                path: self.path.clone(),
                content: trimmed.to_string(),
            })
    }

    fn commit(&mut self, index: u64) -> Result<(), CheckpointError> {
        if let Some(committed) = self.load()?
            && index <= committed
        {
            return Err(CheckpointError::NotMonotonic {
                committed,
                attempted: index,
            });
        }
        self.write_atomic(&format!("{index}\n"))?;
        debug!(index, path = %self.path.display(), "checkpoint committed");
        Ok(())
    }

    fn reset(&mut self) -> Result<(), CheckpointError> {
        match fs::remove_file(&self.path) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(self.io_error(e)),
        }
        debug!(path = %self.path.display(), "checkpoint reset");
        Ok(())
    }
}

#[cfg(unix)]
fn sync_dir(dir: &Path) -> io::Result<()> {
    fs::File::open(dir)?.sync_all()
}

#[cfg(not(unix))]
fn sync_dir(_dir: &Path) -> io::Result<()> {
    Ok(())
}

/// In-memory checkpoint for tests and dry runs.
#[derive(Debug, Default, Clone)]
pub struct MemoryCheckpoint {
    value: Option<u64>,
    commits: Vec<u64>,
}

impl MemoryCheckpoint {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn starting_at(index: u64) -> Self {
        Self {
            value: Some(index),
            commits: Vec::new(),
        }
    }

    /// Every index committed through this instance, in order.
    pub fn commits(&self) -> &[u64] {
        &self.commits
    }
}

impl CheckpointStore for MemoryCheckpoint {
    fn load(&self) -> Result<Option<u64>, CheckpointError> {
        Ok(self.value)
    }

    fn commit(&mut self, index: u64) -> Result<(), CheckpointError> {
        if let Some(committed) = self.value
            && index <= committed
        {
            return Err(CheckpointError::NotMonotonic {
                committed,
                attempted: index,
            });
        }
        self.value = Some(index);
        self.commits.push(index);
        Ok(())
    }

    fn reset(&mut self) -> Result<(), CheckpointError> {
        self.value = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_means_no_progress() {
        let dir = tempfile::tempdir().unwrap();
        let cp = FileCheckpoint::new(dir.path().join("checkpoint.txt"));
        assert_eq!(cp.load().unwrap(), None);
    }

    #[test]
    fn test_commit_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/state/checkpoint.txt");
        let mut cp = FileCheckpoint::new(&path);

        cp.commit(0).unwrap();
        cp.commit(3).unwrap();
        assert_eq!(cp.load().unwrap(), Some(3));
        assert_eq!(fs::read_to_string(&path).unwrap().trim(), "3");

        let reopened = FileCheckpoint::new(&path);
        assert_eq!(reopened.load().unwrap(), Some(3));
    }

    #[test]
    fn test_commit_must_advance() {
        let dir = tempfile::tempdir().unwrap();
        let mut cp = FileCheckpoint::new(dir.path().join("checkpoint.txt"));
        cp.commit(2).unwrap();

        let err = cp.commit(2).unwrap_err();
        assert!(matches!(
            err,
            CheckpointError::NotMonotonic {
                committed: 2,
                attempted: 2
            }
        ));
        assert!(cp.commit(1).is_err());
        assert_eq!(cp.load().unwrap(), Some(2));
    }

    #[test]
    fn test_corrupt_content() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("checkpoint.txt");
        fs::write(&path, "batch seven").unwrap();

        let err = FileCheckpoint::new(&path).load().unwrap_err();
        assert!(matches!(err, CheckpointError::Corrupt { .. }));
    }

    #[test]
    fn test_whitespace_and_empty_content() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("checkpoint.txt");

        fs::write(&path, "").unwrap();
        assert_eq!(FileCheckpoint::new(&path).load().unwrap(), None);

        fs::write(&path, "  12\n").unwrap();
        assert_eq!(FileCheckpoint::new(&path).load().unwrap(), Some(12));
    }

    #[test]
    fn test_reset() {
        let dir = tempfile::tempdir().unwrap();
        let mut cp = FileCheckpoint::new(dir.path().join("checkpoint.txt"));
        cp.reset().unwrap();
        cp.commit(5).unwrap();
        cp.reset().unwrap();
        assert_eq!(cp.load().unwrap(), None);
        cp.commit(0).unwrap();
        assert_eq!(cp.load().unwrap(), Some(0));
    }

    #[test]
    fn test_no_temp_files_left_behind() {
        let dir = tempfile::tempdir().unwrap();
        let mut cp = FileCheckpoint::new(dir.path().join("checkpoint.txt"));
        for i in 0..5 {
            cp.commit(i).unwrap();
        }
        let entries: Vec<_> = fs::read_dir(dir.path()).unwrap().collect();
        assert_eq!(entries.len(), 1);
    }

    #[test]
    fn test_memory_checkpoint() {
        let mut cp = MemoryCheckpoint::starting_at(1);
        assert!(cp.commit(1).is_err());
        cp.commit(2).unwrap();
        assert_eq!(cp.load().unwrap(), Some(2));
        assert_eq!(cp.commits(), &[2]);
    }
}
