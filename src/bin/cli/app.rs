use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};

use deckgen_lib::task::{read_status_record, StatusRecord, TaskDirectory, TaskSupervisor};

/// Shared state for CLI commands
pub struct App {
    pub tasks_root: PathBuf,
    pub supervisor: TaskSupervisor,
}

impl App {
    /// Use `tasks_dir`, or `<data dir>/deckgen/tasks` when not given
    pub fn new(tasks_dir: Option<&Path>, config: Option<&Path>) -> Result<Self> {
        let tasks_root = match tasks_dir {
            Some(dir) => dir.to_path_buf(),
            None => default_tasks_root()?,
        };

        let mut supervisor = TaskSupervisor::new(&tasks_root)
            .context("Failed to locate the deckgen-worker binary")?;
        if let Some(config) = config {
            let config = config
                .canonicalize()
                .with_context(|| format!("Config file not found: {}", config.display()))?;
            supervisor = supervisor.config_file(config);
        }

        Ok(Self {
            tasks_root,
            supervisor,
        })
    }

    /// An existing task by id
    pub fn find_task(&self, task_id: &str) -> Result<TaskDirectory> {
        let task = self.supervisor.task(task_id)?;
        if !task.exists() {
            bail!("Task '{}' not found in {}", task_id, self.tasks_root.display());
        }
        Ok(task)
    }

    pub fn status(&self, task: &TaskDirectory) -> Result<StatusRecord> {
        read_status_record(task.root())
            .with_context(|| format!("Failed to read status of task '{}'", task.task_id()))
    }
}

fn default_tasks_root() -> Result<PathBuf> {
    let data_dir = dirs::data_dir().context("Failed to get data directory")?;
    Ok(data_dir.join("deckgen").join("tasks"))
}
