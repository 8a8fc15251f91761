use std::path::PathBuf;

use anyhow::{Context, Result};

use deckgen_lib::config::Strategy;
use deckgen_lib::task::{InputSource, TaskRequest, WorkerOutcome};

use crate::app::App;
use crate::render::terminal::{paint, Color};
use crate::OutputFormat;

pub struct SubmitOptions {
    pub input: PathBuf,
    pub task_id: Option<String>,
    pub deck_name: Option<String>,
    pub language: Option<String>,
    pub level: Option<String>,
    pub live: bool,
    pub with_audio: bool,
    pub wait: bool,
}

pub fn run(app: &App, opts: SubmitOptions, format: &OutputFormat, use_color: bool) -> Result<()> {
    let input = opts
        .input
        .canonicalize()
        .with_context(|| format!("Input file not found: {}", opts.input.display()))?;

    let mut request = TaskRequest::new(InputSource::File(input));
    if let Some(task_id) = opts.task_id {
        request.task_id = task_id;
    }
    if let Some(deck_name) = opts.deck_name {
        request.deck_name = deck_name;
    }
    if let Some(language) = opts.language {
        request.language = language;
    }
    if let Some(level) = opts.level {
        request.level = level;
    }
    if opts.live {
        request.strategy = Strategy::Live;
    }
    request.with_audio = opts.with_audio;

    let handle = app
        .supervisor
        .launch(&request)
        .context("Failed to start task")?;
    let task = handle.task().clone();
    let pid = handle.pid();

    if !opts.wait {
        match format {
            OutputFormat::Json => {
                let output = serde_json::json!({
                    "taskId": request.task_id,
                    "taskDir": task.root().to_string_lossy(),
                    "pid": pid,
                });
                println!("{}", serde_json::to_string_pretty(&output)?);
            }
            OutputFormat::Plain => {
                println!("{}", request.task_id);
                eprintln!(
                    "{}",
                    paint(
                        &format!("Worker {} started in {}", pid, task.root().display()),
                        Color::DIM,
                        use_color
                    )
                );
            }
        }
        return Ok(());
    }

    let outcome = handle.wait()?;
    match format {
        OutputFormat::Json => {
            let output = serde_json::json!({
                "taskId": request.task_id,
                "taskDir": task.root().to_string_lossy(),
                "success": outcome.is_success(),
                "deck": task.deck().map(|p| p.to_string_lossy().to_string()),
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
        OutputFormat::Plain => match &outcome {
            WorkerOutcome::Completed { deck } => {
                println!("{} {}", paint("completed", Color::GREEN, use_color), deck.display());
            }
            WorkerOutcome::MissingDeck | WorkerOutcome::Failed { .. } => {
                println!(
                    "{} see {}",
                    paint("failed", Color::RED, use_color),
                    task.error_log_path().display()
                );
            }
        },
    }

    if !outcome.is_success() {
        std::process::exit(1);
    }
    Ok(())
}
