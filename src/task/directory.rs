//! Layout of a task's working directory

use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use thiserror::Error;

use super::status::STATUS_FILE;

pub const PREVIEW_FILE: &str = "cards.json";
pub const DECK_FILE: &str = "deck.apkg";
pub const MEDIA_DIR: &str = "media";
pub const WORKER_LOG: &str = "worker.log";
pub const ERROR_LOG: &str = "error.log";
pub const LOCK_FILE: &str = "runner.lock";

#[derive(Error, Debug)]
pub enum AccessError {
    #[error("Invalid media name: {0:?}")]
    InvalidName(String),

    #[error("Media file not found: {0}")]
    NotFound(String),

    #[error("Task not found: {0}")]
    TaskNotFound(PathBuf),
}

/// One task's working directory. All paths are derived from the root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskDirectory {
    root: PathBuf,
}

impl TaskDirectory {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Last component of the root, used as the task id
    pub fn task_id(&self) -> String {
        self.root
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default()
    }

    pub fn exists(&self) -> bool {
        self.root.is_dir()
    }

    pub fn status_path(&self) -> PathBuf {
        self.root.join(STATUS_FILE)
    }

    pub fn preview_path(&self) -> PathBuf {
        self.root.join(PREVIEW_FILE)
    }

    pub fn deck_path(&self) -> PathBuf {
        self.root.join(DECK_FILE)
    }

    pub fn media_dir(&self) -> PathBuf {
        self.root.join(MEDIA_DIR)
    }

    pub fn worker_log_path(&self) -> PathBuf {
        self.root.join(WORKER_LOG)
    }

    pub fn error_log_path(&self) -> PathBuf {
        self.root.join(ERROR_LOG)
    }

    pub fn lock_path(&self) -> PathBuf {
        self.root.join(LOCK_FILE)
    }

    /// Resolve a media file by name.
    ///
    /// The name must be a bare file name; anything that could leave the media
    /// directory is rejected before the filesystem is touched.
    pub fn media_path(&self, name: &str) -> Result<PathBuf, AccessError> {
        if !is_safe_media_name(name) {
            return Err(AccessError::InvalidName(name.to_string()));
        }
        if !self.exists() {
            return Err(AccessError::TaskNotFound(self.root.clone()));
        }

        let path = self.media_dir().join(name);
        if path.is_file() {
            Ok(path)
        } else {
            Err(AccessError::NotFound(name.to_string()))
        }
    }

    /// The finished deck, if the task produced one
    pub fn deck(&self) -> Option<PathBuf> {
        let path = self.deck_path();
        path.is_file().then_some(path)
    }

    /// Take the runner lock. Fails if another runner holds it.
    pub fn lock(&self) -> io::Result<RunnerLock> {
        let path = self.lock_path();
        let mut file: File = OpenOptions::new().write(true).create_new(true).open(&path)?;
        writeln!(file, "{}", std::process::id())?;
        Ok(RunnerLock { path })
    }
}

fn is_safe_media_name(name: &str) -> bool {
    !name.is_empty()
        && name != "."
        && !name.contains("..")
        && !name.contains('/')
        && !name.contains('\\')
        && !name.contains('\0')
}

/// Held while a runner works on a directory; removes the lock file on drop
#[derive(Debug)]
pub struct RunnerLock {
    path: PathBuf,
}

impl Drop for RunnerLock {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_file(&self.path) {
            log::warn!("Failed to remove runner lock {:?}: {}", self.path, e);
        }
    }
}
