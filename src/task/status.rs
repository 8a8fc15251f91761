//! Durable task status (`status.json`)
//!
//! The runner is the only writer. Pollers read the file at any time, so every
//! write goes through a temp file and a rename.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::files::write_json_atomic;

pub const STATUS_FILE: &str = "status.json";

#[derive(Error, Debug)]
pub enum StatusError {
    #[error("Task not found: {0}")]
    TaskNotFound(PathBuf),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid status transition from {from} to {to}")]
    InvalidTransition { from: String, to: String },
}

pub type Result<T> = std::result::Result<T, StatusError>;

/// Lifecycle state of a task
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskStatus {
    Initializing,
    Processing { progress: u8 },
    Completed,
    Error { message: String },
}

impl TaskStatus {
    pub fn processing(progress: u8) -> Self {
        TaskStatus::Processing {
            progress: progress.min(100),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        TaskStatus::Error {
            message: message.into(),
        }
    }

    pub fn state(&self) -> &'static str {
        match self {
            TaskStatus::Initializing => "initializing",
            TaskStatus::Processing { .. } => "processing",
            TaskStatus::Completed => "completed",
            TaskStatus::Error { .. } => "error",
        }
    }

    pub fn progress(&self) -> u8 {
        match self {
            TaskStatus::Processing { progress } => *progress,
            TaskStatus::Completed => 100,
            TaskStatus::Initializing | TaskStatus::Error { .. } => 0,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Error { .. })
    }

    /// Whether a writer currently at `self` may move to `next`
    pub fn can_advance_to(&self, next: &TaskStatus) -> bool {
        match (self, next) {
            (from, _) if from.is_terminal() => false,
            (_, TaskStatus::Initializing) => false,
            (TaskStatus::Processing { progress: from }, TaskStatus::Processing { progress: to }) => {
                to >= from
            }
            _ => true,
        }
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaskStatus::Processing { progress } => write!(f, "processing ({}%)", progress),
            TaskStatus::Error { message } => write!(f, "error: {}", message),
            other => f.write_str(other.state()),
        }
    }
}

/// On-disk form of a status
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusRecord {
    pub state: String,
    /// Only meaningful while processing; terminal records may leave it out
    #[serde(default)]
    pub progress: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl StatusRecord {
    pub fn new(status: &TaskStatus) -> Self {
        let error = match status {
            TaskStatus::Error { message } => Some(message.clone()),
            _ => None,
        };
        Self {
            state: status.state().to_string(),
            progress: status.progress(),
            error,
            updated_at: Some(Utc::now()),
        }
    }

    fn unreadable() -> Self {
        Self {
            state: "processing".to_string(),
            progress: 0,
            error: None,
            updated_at: None,
        }
    }

    /// Interpret the record. Unknown states read as `processing(0)`.
    pub fn status(&self) -> TaskStatus {
        match self.state.as_str() {
            "initializing" => TaskStatus::Initializing,
            "processing" => TaskStatus::processing(self.progress),
            "completed" => TaskStatus::Completed,
            "error" => TaskStatus::error(self.error.clone().unwrap_or_default()),
            _ => TaskStatus::processing(0),
        }
    }

    /// A non-terminal record that has not been touched for `timeout`.
    /// Records without a timestamp are never stale.
    pub fn is_stale(&self, timeout: Duration) -> bool {
        if self.status().is_terminal() {
            return false;
        }
        let Some(updated_at) = self.updated_at else {
            return false;
        };
        match chrono::Duration::from_std(timeout) {
            Ok(timeout) => Utc::now() - updated_at > timeout,
            Err(_) => false,
        }
    }
}

/// Read the status of the task in `task_dir`.
///
/// A missing directory is an error. A directory without a status file is
/// still initializing, and an unreadable or half-written file reads as
/// `processing(0)`.
pub fn read_status_record(task_dir: &Path) -> Result<StatusRecord> {
    if !task_dir.is_dir() {
        return Err(StatusError::TaskNotFound(task_dir.to_path_buf()));
    }

    let path = task_dir.join(STATUS_FILE);
    let content = match fs::read_to_string(&path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Ok(StatusRecord {
                state: "initializing".to_string(),
                progress: 0,
                error: None,
                updated_at: None,
            });
        }
        Err(e) => {
            log::warn!("Failed to read {:?}: {}", path, e);
            return Ok(StatusRecord::unreadable());
        }
    };

    match serde_json::from_str(&content) {
        Ok(record) => Ok(record),
        Err(e) => {
            log::debug!("Status file {:?} not parseable yet: {}", path, e);
            Ok(StatusRecord::unreadable())
        }
    }
}

pub fn read_status(task_dir: &Path) -> Result<TaskStatus> {
    Ok(read_status_record(task_dir)?.status())
}

/// Single writer of a task's status file. Rejects transitions that would
/// move the task backwards or out of a terminal state.
pub struct StatusWriter {
    path: PathBuf,
    current: Option<TaskStatus>,
}

impl StatusWriter {
    pub fn new(task_dir: &Path) -> Self {
        Self {
            path: task_dir.join(STATUS_FILE),
            current: None,
        }
    }

    pub fn current(&self) -> Option<&TaskStatus> {
        self.current.as_ref()
    }

    pub fn write(&mut self, next: TaskStatus) -> Result<()> {
        if let Some(current) = &self.current {
            if !current.can_advance_to(&next) {
                return Err(StatusError::InvalidTransition {
                    from: current.to_string(),
                    to: next.to_string(),
                });
            }
        }

        write_json_atomic(&self.path, &StatusRecord::new(&next))?;
        log::debug!("Status -> {}", next);
        self.current = Some(next);
        Ok(())
    }

    /// Write `processing(progress)`, skipping values that would not move forward
    pub fn progress(&mut self, progress: u8) -> Result<()> {
        if let Some(TaskStatus::Processing { progress: current }) = &self.current {
            if progress <= *current {
                return Ok(());
            }
        }
        self.write(TaskStatus::processing(progress))
    }
}
