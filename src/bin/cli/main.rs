mod app;
mod commands;
mod render;

use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};

use commands::submit::SubmitOptions;

#[derive(Parser)]
#[command(name = "deckgen-cli", about = "Generate flashcard decks from word lists", version)]
struct Cli {
    /// Directory holding task directories (default: <data dir>/deckgen/tasks)
    #[arg(long, global = true)]
    tasks_dir: Option<PathBuf>,

    /// TOML config file passed to workers
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Output format
    #[arg(long, global = true, default_value = "plain")]
    format: OutputFormat,

    /// Disable ANSI colors
    #[arg(long, global = true)]
    no_color: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Clone, Debug, clap::ValueEnum)]
pub enum OutputFormat {
    Plain,
    Json,
}

#[derive(Subcommand)]
enum Command {
    /// Start a task from an input file (.csv, .json, .tsv or .txt)
    Submit {
        input: PathBuf,
        /// Task id (default: random UUID)
        #[arg(long)]
        task_id: Option<String>,
        #[arg(long)]
        deck_name: Option<String>,
        #[arg(long)]
        language: Option<String>,
        #[arg(long)]
        level: Option<String>,
        /// Call the generation providers instead of using placeholders
        #[arg(long)]
        live: bool,
        /// Generate pronunciation audio (live mode)
        #[arg(long)]
        with_audio: bool,
        /// Wait for the worker to finish
        #[arg(long)]
        wait: bool,
    },

    /// Show task status
    Status {
        task_id: String,
        /// Keep polling until the task finishes
        #[arg(long)]
        watch: bool,
        /// Seconds without a status update before a task counts as stale
        #[arg(long, default_value = "300")]
        stale_after: u64,
    },

    /// List the generated cards of a task
    Cards { task_id: String },

    /// Write a media file of a task to stdout or a file
    Media {
        task_id: String,
        /// Media file name as listed by `cards`
        name: String,
        #[arg(long, short)]
        output: Option<PathBuf>,
    },

    /// Print the deck path, or copy the deck with --output
    Deck {
        task_id: String,
        #[arg(long, short)]
        output: Option<PathBuf>,
    },
}

fn main() -> anyhow::Result<()> {
    env_logger::init();

    let cli = Cli::parse();
    let use_color = !cli.no_color && atty_check();
    let app = app::App::new(cli.tasks_dir.as_deref(), cli.config.as_deref())?;

    match cli.command {
        Command::Submit {
            input,
            task_id,
            deck_name,
            language,
            level,
            live,
            with_audio,
            wait,
        } => {
            let opts = SubmitOptions {
                input,
                task_id,
                deck_name,
                language,
                level,
                live,
                with_audio,
                wait,
            };
            commands::submit::run(&app, opts, &cli.format, use_color)?;
        }
        Command::Status {
            task_id,
            watch,
            stale_after,
        } => {
            commands::status::run(
                &app,
                &task_id,
                watch,
                Duration::from_secs(stale_after),
                &cli.format,
                use_color,
            )?;
        }
        Command::Cards { task_id } => {
            commands::cards::run(&app, &task_id, &cli.format, use_color)?;
        }
        Command::Media {
            task_id,
            name,
            output,
        } => {
            commands::media::run(&app, &task_id, &name, output.as_deref())?;
        }
        Command::Deck { task_id, output } => {
            commands::media::run_deck(&app, &task_id, output.as_deref())?;
        }
    }

    Ok(())
}

/// Check if stdout is a terminal (for color support)
fn atty_check() -> bool {
    unsafe { libc_isatty(1) != 0 }
}

extern "C" {
    #[link_name = "isatty"]
    fn libc_isatty(fd: i32) -> i32;
}
