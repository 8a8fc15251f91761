//! Task worker: runs one task to completion in its directory.
//!
//! Launched by the supervisor; progress is reported only through the task's
//! `status.json`. Exits nonzero when the task fails.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;

use deckgen_lib::config::{Credentials, Strategy, TaskConfig};
use deckgen_lib::task::{StatusWriter, TaskDirectory, TaskRunner, TaskStatus};

#[derive(Parser)]
#[command(name = "deckgen-worker", about = "Generate a flashcard deck for one task", version)]
struct Args {
    /// Task working directory (must already contain the input file)
    #[arg(long)]
    task_dir: PathBuf,

    #[arg(long)]
    deck_name: Option<String>,

    /// Language the explanations are written in
    #[arg(long)]
    language: Option<String>,

    /// Learner level, e.g. B2
    #[arg(long)]
    level: Option<String>,

    /// OpenAI API key (default: OPENAI_API_KEY)
    #[arg(long)]
    openai_key: Option<String>,

    /// Use placeholder content instead of calling providers
    #[arg(long)]
    mock: bool,

    /// Generate pronunciation audio
    #[arg(long)]
    with_audio: bool,

    /// TOML config file
    #[arg(long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let task = TaskDirectory::new(&args.task_dir);

    let config = match build_config(&args) {
        Ok(config) => config,
        Err(e) => {
            log::error!("{:#}", e);
            record_failure(&task, &format!("{:#}", e));
            return ExitCode::FAILURE;
        }
    };

    log::info!(
        "Task {}: deck \"{}\", {} {}, {:?} strategy",
        task.task_id(),
        config.deck_name,
        config.language,
        config.level,
        config.strategy
    );

    match TaskRunner::new(&task, &config).run().await {
        Ok(summary) => {
            log::info!("Wrote {} cards to {:?}", summary.note_count, summary.path);
            ExitCode::SUCCESS
        }
        Err(e) => {
            // The runner has already recorded the failure in status.json
            log::error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

fn build_config(args: &Args) -> Result<TaskConfig> {
    let mut config = match &args.config {
        Some(path) => TaskConfig::from_file(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => TaskConfig::default(),
    };

    if let Some(deck_name) = &args.deck_name {
        config.deck_name = deck_name.clone();
    }
    if let Some(language) = &args.language {
        config.language = language.clone();
    }
    if let Some(level) = &args.level {
        config.level = level.clone();
    }
    if args.with_audio {
        config.with_audio = true;
    }
    config.strategy = if args.mock {
        Strategy::Stub
    } else {
        Strategy::Live
    };

    let overrides = Credentials {
        openai_key: args.openai_key.clone(),
        ..Default::default()
    };
    config.credentials = overrides
        .or(config.credentials)
        .or(Credentials::from_env());

    Ok(config)
}

/// Best effort: leave an error status for pollers when the runner never started
fn record_failure(task: &TaskDirectory, message: &str) {
    if !task.exists() {
        return;
    }
    let mut writer = StatusWriter::new(task.root());
    if let Err(e) = writer.write(TaskStatus::error(message)) {
        log::warn!("Failed to write status for {:?}: {}", task.root(), e);
    }
}
