//! Task supervisor: prepares task directories and launches workers
//!
//! Each task runs in its own worker process. The supervisor only touches a
//! task directory before the worker starts and after it exits; in between the
//! worker owns it and pollers read `status.json`.

use std::ffi::OsString;
use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};

use thiserror::Error;
use uuid::Uuid;

use super::directory::TaskDirectory;
use super::status::{read_status, StatusWriter, TaskStatus};
use crate::cards::WordRecord;
use crate::config::Strategy;
use crate::files::{write_atomic, write_json_atomic};
use crate::input::{INPUT_EXTENSIONS, INPUT_STEM};

pub const WORKER_BIN: &str = "deckgen-worker";

/// Lines of the worker log copied into `error.log`
const LOG_TAIL_LINES: usize = 50;

#[derive(Error, Debug)]
pub enum SupervisorError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Invalid task id: {0:?}")]
    InvalidTaskId(String),

    #[error("Task already exists: {0}")]
    TaskExists(PathBuf),

    #[error("Unsupported input file: {0}")]
    UnsupportedInput(PathBuf),

    #[error("Failed to start worker {program}: {source}")]
    Spawn {
        program: PathBuf,
        #[source]
        source: io::Error,
    },
}

pub type Result<T> = std::result::Result<T, SupervisorError>;

/// Where a task's words come from
#[derive(Debug, Clone)]
pub enum InputSource {
    /// An existing input file, copied into the task keeping its extension
    File(PathBuf),
    /// Records written to the task as `input.json`
    Records(Vec<WordRecord>),
}

#[derive(Debug, Clone)]
pub struct TaskRequest {
    pub task_id: String,
    pub deck_name: String,
    pub language: String,
    pub level: String,
    pub strategy: Strategy,
    pub with_audio: bool,
    pub input: InputSource,
}

impl TaskRequest {
    /// Request with a fresh task id and default deck settings
    pub fn new(input: InputSource) -> Self {
        Self {
            task_id: Uuid::new_v4().to_string(),
            deck_name: "Generated Deck".to_string(),
            language: "english".to_string(),
            level: "B2".to_string(),
            strategy: Strategy::Stub,
            with_audio: false,
            input,
        }
    }
}

/// How a worker process ended, as seen from outside
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkerOutcome {
    /// Exited cleanly and left a deck behind
    Completed { deck: PathBuf },
    /// Exited cleanly without producing a deck
    MissingDeck,
    /// Exited with a failure status (`None` when killed by a signal)
    Failed { exit_code: Option<i32> },
}

impl WorkerOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, WorkerOutcome::Completed { .. })
    }
}

/// Launches task workers under a common root directory
#[derive(Debug, Clone)]
pub struct TaskSupervisor {
    tasks_root: PathBuf,
    worker_program: PathBuf,
    worker_args: Vec<OsString>,
    config_file: Option<PathBuf>,
}

impl TaskSupervisor {
    /// Supervisor using the worker binary installed next to the current executable
    pub fn new(tasks_root: impl Into<PathBuf>) -> io::Result<Self> {
        Ok(Self::with_worker(tasks_root, default_worker_program()?, Vec::new()))
    }

    /// Supervisor running `program` with `args` placed before the task arguments
    pub fn with_worker(
        tasks_root: impl Into<PathBuf>,
        program: impl Into<PathBuf>,
        args: Vec<OsString>,
    ) -> Self {
        Self {
            tasks_root: tasks_root.into(),
            worker_program: program.into(),
            worker_args: args,
            config_file: None,
        }
    }

    /// Pass `--config <path>` to every worker
    pub fn config_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.config_file = Some(path.into());
        self
    }

    pub fn tasks_root(&self) -> &Path {
        &self.tasks_root
    }

    /// Directory of an existing or future task
    pub fn task(&self, task_id: &str) -> Result<TaskDirectory> {
        if !is_valid_task_id(task_id) {
            return Err(SupervisorError::InvalidTaskId(task_id.to_string()));
        }
        Ok(TaskDirectory::new(self.tasks_root.join(task_id)))
    }

    /// Create the task directory, write its input and start the worker.
    /// Returns as soon as the worker process is running.
    pub fn launch(&self, request: &TaskRequest) -> Result<TaskHandle> {
        let task = self.prepare(request)?;
        let child = self.spawn_worker(&task, request)?;

        log::info!(
            "Started worker {} for task {} ({:?})",
            child.id(),
            request.task_id,
            request.strategy
        );
        Ok(TaskHandle { task, child })
    }

    /// Create the directory and write the input file
    pub fn prepare(&self, request: &TaskRequest) -> Result<TaskDirectory> {
        let task = self.task(&request.task_id)?;

        let input_name = input_file_name(&request.input)?;

        fs::create_dir_all(&self.tasks_root)?;
        match fs::create_dir(task.root()) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                return Err(SupervisorError::TaskExists(task.root().to_path_buf()));
            }
            Err(e) => return Err(e.into()),
        }

        let target = task.root().join(input_name);
        match &request.input {
            InputSource::File(path) => write_atomic(&target, &fs::read(path)?)?,
            InputSource::Records(records) => write_json_atomic(&target, records)?,
        }

        log::debug!("Prepared task directory {:?}", task.root());
        Ok(task)
    }

    fn spawn_worker(&self, task: &TaskDirectory, request: &TaskRequest) -> Result<Child> {
        let log = File::create(task.worker_log_path())?;
        let log_err = log.try_clone()?;

        let mut cmd = Command::new(&self.worker_program);
        cmd.args(&self.worker_args)
            .arg("--task-dir")
            .arg(task.root())
            .arg("--deck-name")
            .arg(&request.deck_name)
            .arg("--language")
            .arg(&request.language)
            .arg("--level")
            .arg(&request.level);
        if request.strategy == Strategy::Stub {
            cmd.arg("--mock");
        }
        if request.with_audio {
            cmd.arg("--with-audio");
        }
        if let Some(config) = &self.config_file {
            cmd.arg("--config").arg(config);
        }

        cmd.stdin(Stdio::null())
            .stdout(Stdio::from(log))
            .stderr(Stdio::from(log_err))
            .spawn()
            .map_err(|source| SupervisorError::Spawn {
                program: self.worker_program.clone(),
                source,
            })
    }
}

/// A running worker
#[derive(Debug)]
pub struct TaskHandle {
    task: TaskDirectory,
    child: Child,
}

impl TaskHandle {
    pub fn task(&self) -> &TaskDirectory {
        &self.task
    }

    pub fn pid(&self) -> u32 {
        self.child.id()
    }

    /// Block until the worker exits, then check what it left behind.
    ///
    /// A failed exit or a missing deck is written to `error.log`. A worker
    /// that died without recording a terminal status gets an `error` status.
    pub fn wait(mut self) -> Result<WorkerOutcome> {
        let status = self.child.wait()?;
        let outcome = match (status.success(), self.task.deck()) {
            (true, Some(deck)) => WorkerOutcome::Completed { deck },
            (true, None) => WorkerOutcome::MissingDeck,
            (false, _) => WorkerOutcome::Failed {
                exit_code: status.code(),
            },
        };

        match &outcome {
            WorkerOutcome::Completed { deck } => {
                log::info!("Task {} finished: {:?}", self.task.task_id(), deck);
            }
            WorkerOutcome::MissingDeck => {
                let message = "Worker exited successfully but no deck was produced";
                log::error!("Task {}: {}", self.task.task_id(), message);
                self.post_mortem(message)?;
            }
            WorkerOutcome::Failed { .. } => {
                let message = format!("Worker failed: {}", describe_exit(status));
                log::error!("Task {}: {}", self.task.task_id(), message);
                self.post_mortem(&message)?;
            }
        }

        Ok(outcome)
    }

    fn post_mortem(&self, message: &str) -> Result<()> {
        let log = fs::read_to_string(self.task.worker_log_path()).unwrap_or_default();
        let lines: Vec<&str> = log.lines().collect();
        let tail = &lines[lines.len().saturating_sub(LOG_TAIL_LINES)..];

        let mut report = format!("{}\n", message);
        if !tail.is_empty() {
            report.push_str("\n--- worker log ---\n");
            report.push_str(&tail.join("\n"));
            report.push('\n');
        }
        fs::write(self.task.error_log_path(), report)?;

        match read_status(self.task.root()) {
            Ok(status) if status.is_terminal() => {}
            _ => {
                let mut writer = StatusWriter::new(self.task.root());
                if let Err(e) = writer.write(TaskStatus::error(message)) {
                    log::warn!("Failed to record worker failure: {}", e);
                }
            }
        }
        Ok(())
    }
}

fn describe_exit(status: ExitStatus) -> String {
    match status.code() {
        Some(code) => format!("exit code {}", code),
        None => "terminated by signal".to_string(),
    }
}

/// Name the input gets inside the task directory
fn input_file_name(input: &InputSource) -> Result<String> {
    let extension = match input {
        InputSource::Records(_) => "json".to_string(),
        InputSource::File(path) => {
            let extension = path
                .extension()
                .map(|e| e.to_string_lossy().to_lowercase())
                .filter(|e| INPUT_EXTENSIONS.contains(&e.as_str()))
                .ok_or_else(|| SupervisorError::UnsupportedInput(path.clone()))?;
            if !path.is_file() {
                return Err(io::Error::new(
                    io::ErrorKind::NotFound,
                    format!("input file not found: {}", path.display()),
                )
                .into());
            }
            extension
        }
    };
    Ok(format!("{}.{}", INPUT_STEM, extension))
}

fn is_valid_task_id(task_id: &str) -> bool {
    !task_id.is_empty()
        && task_id.len() <= 128
        && task_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

/// `deckgen-worker` next to the running executable
pub fn default_worker_program() -> io::Result<PathBuf> {
    let exe = std::env::current_exe()?;
    let dir = exe
        .parent()
        .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "executable has no parent directory"))?;
    Ok(dir.join(format!("{}{}", WORKER_BIN, std::env::consts::EXE_SUFFIX)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::input::read_input_file;
    use tempfile::TempDir;

    fn records() -> Vec<WordRecord> {
        vec![
            WordRecord::new("apple", "I ate an apple"),
            WordRecord::new("run", "She runs daily"),
        ]
    }

    /// Supervisor whose "worker" is a shell snippet. `$2` is the task directory.
    #[cfg(unix)]
    fn shell_supervisor(root: &Path, script: &str) -> TaskSupervisor {
        TaskSupervisor::with_worker(
            root,
            "/bin/sh",
            vec!["-c".into(), script.into(), "worker".into()],
        )
    }

    #[test]
    fn test_prepare_writes_records_as_json() {
        let temp = TempDir::new().unwrap();
        let supervisor = TaskSupervisor::with_worker(temp.path(), "unused", Vec::new());
        let request = TaskRequest::new(InputSource::Records(records()));

        let task = supervisor.prepare(&request).unwrap();
        assert_eq!(task.task_id(), request.task_id);
        assert_eq!(read_input_file(&task.root().join("input.json")).unwrap(), records());
    }

    #[test]
    fn test_prepare_copies_input_file() {
        let temp = TempDir::new().unwrap();
        let source = temp.path().join("words.TSV");
        fs::write(&source, "apple\tI ate an apple\n").unwrap();
        let supervisor = TaskSupervisor::with_worker(temp.path().join("tasks"), "unused", Vec::new());

        let task = supervisor
            .prepare(&TaskRequest::new(InputSource::File(source)))
            .unwrap();
        assert!(task.root().join("input.tsv").is_file());
    }

    #[test]
    fn test_prepare_rejects_bad_requests() {
        let temp = TempDir::new().unwrap();
        let supervisor = TaskSupervisor::with_worker(temp.path(), "unused", Vec::new());

        let mut request = TaskRequest::new(InputSource::Records(records()));
        request.task_id = "../escape".to_string();
        assert!(matches!(
            supervisor.prepare(&request),
            Err(SupervisorError::InvalidTaskId(_))
        ));

        let pdf = temp.path().join("words.pdf");
        fs::write(&pdf, "%PDF").unwrap();
        assert!(matches!(
            supervisor.prepare(&TaskRequest::new(InputSource::File(pdf))),
            Err(SupervisorError::UnsupportedInput(_))
        ));

        let request = TaskRequest::new(InputSource::Records(records()));
        supervisor.prepare(&request).unwrap();
        assert!(matches!(
            supervisor.prepare(&request),
            Err(SupervisorError::TaskExists(_))
        ));
    }

    #[cfg(unix)]
    #[test]
    fn test_worker_arguments_and_success() {
        let temp = TempDir::new().unwrap();
        let supervisor = shell_supervisor(temp.path(), r#"echo "$@"; touch "$2/deck.apkg""#);
        let mut request = TaskRequest::new(InputSource::Records(records()));
        request.deck_name = "My Deck".to_string();

        let handle = supervisor.launch(&request).unwrap();
        let task = handle.task().clone();
        let outcome = handle.wait().unwrap();

        assert_eq!(outcome, WorkerOutcome::Completed { deck: task.deck_path() });
        let log = fs::read_to_string(task.worker_log_path()).unwrap();
        assert!(log.contains("--deck-name My Deck"));
        assert!(log.contains("--language english --level B2 --mock"));
        assert!(!task.error_log_path().exists());
    }

    #[cfg(unix)]
    #[test]
    fn test_failed_worker_post_mortem() {
        let temp = TempDir::new().unwrap();
        let supervisor = shell_supervisor(temp.path(), "echo 'worker crashed' >&2; exit 3");
        let request = TaskRequest::new(InputSource::Records(records()));

        let handle = supervisor.launch(&request).unwrap();
        let task = handle.task().clone();
        let outcome = handle.wait().unwrap();

        assert_eq!(outcome, WorkerOutcome::Failed { exit_code: Some(3) });
        let report = fs::read_to_string(task.error_log_path()).unwrap();
        assert!(report.contains("exit code 3"));
        assert!(report.contains("worker crashed"));
        assert!(matches!(read_status(task.root()).unwrap(), TaskStatus::Error { .. }));
    }

    #[cfg(unix)]
    #[test]
    fn test_missing_deck_keeps_terminal_status() {
        let temp = TempDir::new().unwrap();
        let script = r#"printf '{"state":"error","progress":0,"error":"no words"}' > "$2/status.json""#;
        let supervisor = shell_supervisor(temp.path(), script);

        let handle = supervisor
            .launch(&TaskRequest::new(InputSource::Records(records())))
            .unwrap();
        let task = handle.task().clone();
        assert_eq!(handle.wait().unwrap(), WorkerOutcome::MissingDeck);

        assert!(task.error_log_path().is_file());
        assert_eq!(read_status(task.root()).unwrap(), TaskStatus::error("no words"));
    }
}
