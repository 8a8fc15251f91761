//! Task runner: drives one task from raw input to a finished deck
//!
//! Status sequence written to `status.json`:
//! ```text
//! initializing -> processing(0) -> processing(..80) while resolving
//!              -> processing(85) formatted -> processing(90) packaging
//!              -> completed
//! ```
//! `cards.json` is written right after `deck.apkg`, so a failed task leaves
//! neither behind. Any failure ends the sequence with `error` instead,
//! including a failure to record `completed`.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use thiserror::Error;

use super::directory::TaskDirectory;
use super::status::{StatusError, StatusWriter, TaskStatus};
use crate::anki::{build_preview, write_package, write_preview, PackageSummary, PackagingError};
use crate::cards::{format_note, FormattedNote};
use crate::config::{ConfigError, TaskConfig};
use crate::input::{locate_input_file, read_input_file, InputError};
use crate::providers::ProviderError;
use crate::resolver::{resolver_for, ContentResolver, GenerationError};

/// Share of the progress bar spent resolving records
const RESOLVE_PROGRESS: usize = 80;
const FORMATTED_PROGRESS: u8 = 85;
const PACKAGING_PROGRESS: u8 = 90;

#[derive(Error, Debug)]
pub enum TaskError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Input error: {0}")]
    Input(#[from] InputError),

    #[error("Generation error: {0}")]
    Generation(#[from] GenerationError),

    #[error("Provider setup failed: {0}")]
    Provider(#[from] ProviderError),

    #[error("Packaging error: {0}")]
    Packaging(#[from] PackagingError),

    #[error("Status error: {0}")]
    Status(#[from] StatusError),

    #[error("Another runner is already working on {0}")]
    AlreadyRunning(PathBuf),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, TaskError>;

/// Runs a single task in its directory
pub struct TaskRunner<'a> {
    task: &'a TaskDirectory,
    config: &'a TaskConfig,
    resolver: Option<&'a dyn ContentResolver>,
}

impl<'a> TaskRunner<'a> {
    /// Runner using the resolver selected by `config.strategy`
    pub fn new(task: &'a TaskDirectory, config: &'a TaskConfig) -> Self {
        Self {
            task,
            config,
            resolver: None,
        }
    }

    /// Use a specific resolver instead of the configured one
    pub fn with_resolver(mut self, resolver: &'a dyn ContentResolver) -> Self {
        self.resolver = Some(resolver);
        self
    }

    /// Run the task to completion.
    ///
    /// Every failure after the lock is taken is also recorded as `error` in
    /// the status file before being returned.
    pub async fn run(self) -> Result<PackageSummary> {
        if !self.task.exists() {
            return Err(StatusError::TaskNotFound(self.task.root().to_path_buf()).into());
        }

        let _lock = self.task.lock().map_err(|e| {
            if e.kind() == std::io::ErrorKind::AlreadyExists {
                TaskError::AlreadyRunning(self.task.root().to_path_buf())
            } else {
                TaskError::Io(e)
            }
        })?;

        let status = Mutex::new(StatusWriter::new(self.task.root()));
        set_status(&status, TaskStatus::Initializing)?;

        let outcome = self
            .run_stages(&status)
            .await
            .and_then(|summary| set_status(&status, TaskStatus::Completed).map(|_| summary));

        match outcome {
            Ok(summary) => {
                log::info!(
                    "Task {} completed: {} cards in {:?}",
                    self.task.task_id(),
                    summary.note_count,
                    summary.path
                );
                Ok(summary)
            }
            Err(e) => {
                log::error!("Task {} failed: {}", self.task.task_id(), e);
                if let Err(status_err) = set_status(&status, TaskStatus::error(e.to_string())) {
                    log::error!("Failed to record task failure: {}", status_err);
                }
                Err(e)
            }
        }
    }

    async fn run_stages(&self, status: &Mutex<StatusWriter>) -> Result<PackageSummary> {
        self.config.validate()?;
        set_progress(status, 0)?;

        let input = locate_input_file(self.task.root())?;
        let records = read_input_file(&input)?;

        let configured;
        let resolver: &dyn ContentResolver = match self.resolver {
            Some(resolver) => resolver,
            None => {
                configured = resolver_for(self.config, self.task.media_dir())?;
                configured.as_ref()
            }
        };

        let report = |done: usize, total: usize| {
            let progress = (done * RESOLVE_PROGRESS / total.max(1)) as u8;
            if let Err(e) = set_progress(status, progress) {
                log::warn!("Failed to record progress: {}", e);
            }
        };
        let contents = resolver.resolve(&records, self.config, &report).await?;
        if contents.len() != records.len() {
            return Err(GenerationError::CountMismatch {
                expected: records.len(),
                actual: contents.len(),
            }
            .into());
        }

        let notes: Vec<FormattedNote> = contents.iter().map(format_note).collect();
        let media: Vec<PathBuf> = contents
            .iter()
            .flat_map(|c| c.media_references())
            .map(Path::to_path_buf)
            .collect();
        set_progress(status, FORMATTED_PROGRESS)?;
        set_progress(status, PACKAGING_PROGRESS)?;

        let summary = write_package(&self.config.deck_name, &notes, &media, &self.task.deck_path())?;
        // The manifest only appears next to a finished archive
        write_preview(&self.task.preview_path(), &build_preview(&contents))?;
        Ok(summary)
    }
}

fn set_status(status: &Mutex<StatusWriter>, next: TaskStatus) -> Result<()> {
    let mut writer = status.lock().unwrap_or_else(|e| e.into_inner());
    writer.write(next)?;
    Ok(())
}

fn set_progress(status: &Mutex<StatusWriter>, progress: u8) -> Result<()> {
    let mut writer = status.lock().unwrap_or_else(|e| e.into_inner());
    writer.progress(progress)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::anki::read_preview;
    use crate::cards::{ContentRecord, WordRecord};
    use crate::resolver::live::tests::{live_config, FakeProvider};
    use crate::resolver::{LiveResolver, ProgressFn, StubResolver};
    use crate::task::status::read_status;
    use async_trait::async_trait;
    use std::fs;
    use tempfile::TempDir;

    fn task_with_input(temp: &TempDir, file: &str, content: &str) -> TaskDirectory {
        let task = TaskDirectory::new(temp.path().join("task-1"));
        fs::create_dir_all(task.root()).unwrap();
        fs::write(task.root().join(file), content).unwrap();
        task
    }

    #[tokio::test]
    async fn test_single_word_stub_task() {
        let temp = TempDir::new().unwrap();
        let task = task_with_input(&temp, "input.csv", "word,context\napple,I ate an apple\n");
        let config = TaskConfig {
            deck_name: "Test Deck".to_string(),
            ..Default::default()
        };

        let summary = TaskRunner::new(&task, &config).run().await.unwrap();
        assert_eq!(summary.note_count, 1);
        assert_eq!(summary.media_count, 2);

        assert_eq!(read_status(task.root()).unwrap(), TaskStatus::Completed);
        let deck = task.deck().unwrap();
        assert_eq!(summary.path, deck);
        assert!(fs::metadata(&deck).unwrap().len() > 0);
        assert!(!task.lock_path().exists());

        let preview = read_preview(&task.preview_path()).unwrap();
        assert_eq!(preview.len(), 1);
        assert_eq!(preview[0].word, "apple");
        assert!(preview[0].text.contains("I ate an apple"));
        let image = preview[0].image.as_deref().unwrap();
        assert!(task.media_path(image).is_ok());
    }

    #[tokio::test]
    async fn test_missing_input() {
        let temp = TempDir::new().unwrap();
        let task = TaskDirectory::new(temp.path().join("task-1"));
        fs::create_dir_all(task.root()).unwrap();
        let config = TaskConfig::default();

        let err = TaskRunner::new(&task, &config).run().await.unwrap_err();
        assert!(matches!(err, TaskError::Input(InputError::NotFound(_))));

        match read_status(task.root()).unwrap() {
            TaskStatus::Error { message } => assert!(message.contains("Input file not found")),
            other => panic!("unexpected status: {other}"),
        }
        assert!(task.deck().is_none());
    }

    const THREE_WORDS: &str = r#"[
        {"word": "apple", "context": "I ate an apple"},
        {"word": "run", "context": "She runs daily"},
        {"word": "pear", "context": "A ripe pear"}
    ]"#;

    #[tokio::test]
    async fn test_live_credentials_checked_first() {
        let temp = TempDir::new().unwrap();
        let task = task_with_input(&temp, "input.json", THREE_WORDS);
        let config = live_config();
        let provider = FakeProvider::ok();
        let resolver = LiveResolver::new(provider, task.media_dir());

        let err = TaskRunner::new(&task, &config)
            .with_resolver(&resolver)
            .run()
            .await
            .unwrap_err();
        assert!(matches!(err, TaskError::Config(ConfigError::MissingCredential(_))));
        assert!(matches!(read_status(task.root()).unwrap(), TaskStatus::Error { .. }));
        assert!(!task.media_dir().exists());
    }

    #[tokio::test]
    async fn test_live_failure_aborts_without_deck() {
        let temp = TempDir::new().unwrap();
        let task = task_with_input(&temp, "input.json", THREE_WORDS);
        let mut config = live_config();
        config.credentials.openai_key = Some("sk-test".to_string());
        config.credentials.fal_key = Some("fal-test".to_string());
        let resolver = LiveResolver::new(FakeProvider::failing("run", 10), task.media_dir());

        let err = TaskRunner::new(&task, &config)
            .with_resolver(&resolver)
            .run()
            .await
            .unwrap_err();
        assert!(matches!(err, TaskError::Generation(GenerationError::Exhausted { .. })));

        match read_status(task.root()).unwrap() {
            TaskStatus::Error { message } => assert!(message.contains("\"run\"")),
            other => panic!("unexpected status: {other}"),
        }
        assert!(task.deck().is_none());
        assert!(!task.preview_path().exists());
    }

    #[tokio::test]
    async fn test_download_failure_aborts_without_deck() {
        let temp = TempDir::new().unwrap();
        let task = task_with_input(&temp, "input.json", THREE_WORDS);
        let mut config = live_config();
        config.credentials.openai_key = Some("sk-test".to_string());
        config.credentials.fal_key = Some("fal-test".to_string());
        let resolver = LiveResolver::new(FakeProvider::failing_download("run"), task.media_dir());

        let err = TaskRunner::new(&task, &config)
            .with_resolver(&resolver)
            .run()
            .await
            .unwrap_err();
        match &err {
            TaskError::Generation(GenerationError::Exhausted { word, last, .. }) => {
                assert_eq!(word, "run");
                assert!(matches!(**last, GenerationError::Provider { .. }));
            }
            other => panic!("unexpected error: {other}"),
        }

        match read_status(task.root()).unwrap() {
            TaskStatus::Error { message } => assert!(message.contains("\"run\"")),
            other => panic!("unexpected status: {other}"),
        }
        assert!(task.deck().is_none());
        assert!(!task.preview_path().exists());
    }

    /// Stub resolver whose image placeholder is gone by packaging time
    struct LosingMediaResolver {
        inner: StubResolver,
    }

    #[async_trait]
    impl ContentResolver for LosingMediaResolver {
        async fn resolve(
            &self,
            records: &[WordRecord],
            config: &TaskConfig,
            progress: ProgressFn<'_>,
        ) -> crate::resolver::Result<Vec<ContentRecord>> {
            let contents = self.inner.resolve(records, config, progress).await?;
            if let Some(image) = contents.first().and_then(|c| c.image_reference.as_ref()) {
                fs::remove_file(image).unwrap();
            }
            Ok(contents)
        }
    }

    #[tokio::test]
    async fn test_packaging_failure_is_recorded() {
        let temp = TempDir::new().unwrap();
        let task = task_with_input(&temp, "input.txt", "apple\npear\n");
        let config = TaskConfig::default();
        let resolver = LosingMediaResolver {
            inner: StubResolver::new(task.media_dir()),
        };

        let err = TaskRunner::new(&task, &config)
            .with_resolver(&resolver)
            .run()
            .await
            .unwrap_err();
        assert!(matches!(err, TaskError::Packaging(PackagingError::MissingMedia(_))));

        match read_status(task.root()).unwrap() {
            TaskStatus::Error { message } => assert!(message.starts_with("Packaging error")),
            other => panic!("unexpected status: {other}"),
        }
        assert!(task.deck().is_none());
        assert!(!task.preview_path().exists());
        assert!(!task.lock_path().exists());
    }

    #[tokio::test]
    async fn test_second_runner_is_rejected() {
        let temp = TempDir::new().unwrap();
        let task = task_with_input(&temp, "input.txt", "apple\n");
        let config = TaskConfig::default();

        let _held = task.lock().unwrap();
        let err = TaskRunner::new(&task, &config).run().await.unwrap_err();
        assert!(matches!(err, TaskError::AlreadyRunning(_)));
        assert!(!task.status_path().exists());
    }

    /// Stub resolver that records the status a poller would see mid-run
    struct ObservingResolver {
        inner: StubResolver,
        task: TaskDirectory,
        seen: Mutex<Vec<TaskStatus>>,
    }

    #[async_trait]
    impl ContentResolver for ObservingResolver {
        async fn resolve(
            &self,
            records: &[WordRecord],
            config: &TaskConfig,
            progress: ProgressFn<'_>,
        ) -> crate::resolver::Result<Vec<ContentRecord>> {
            let observe = |done: usize, total: usize| {
                progress(done, total);
                let status = read_status(self.task.root()).unwrap();
                self.seen.lock().unwrap().push(status);
            };
            self.inner.resolve(records, config, &observe).await
        }
    }

    #[tokio::test]
    async fn test_progress_is_monotonic() {
        let temp = TempDir::new().unwrap();
        let task = task_with_input(&temp, "input.txt", "one\ntwo\nthree\nfour\n");
        let config = TaskConfig::default();
        let resolver = ObservingResolver {
            inner: StubResolver::new(task.media_dir()),
            task: task.clone(),
            seen: Mutex::new(Vec::new()),
        };

        TaskRunner::new(&task, &config)
            .with_resolver(&resolver)
            .run()
            .await
            .unwrap();

        let seen = resolver.seen.into_inner().unwrap();
        let progress: Vec<u8> = seen.iter().map(TaskStatus::progress).collect();
        assert_eq!(progress, vec![20, 40, 60, 80]);
        assert!(seen.iter().all(|s| s.state() == "processing"));
        assert_eq!(read_status(task.root()).unwrap(), TaskStatus::Completed);
    }

    #[tokio::test]
    async fn test_duplicate_words_make_distinct_cards() {
        let temp = TempDir::new().unwrap();
        let task = task_with_input(&temp, "input.txt", "apple\tone\napple\ttwo\n");
        let config = TaskConfig::default();

        let summary = TaskRunner::new(&task, &config).run().await.unwrap();
        assert_eq!(summary.note_count, 2);
        // Both cards share the stub placeholders
        assert_eq!(summary.media_count, 2);
    }
}
