use std::fs;
use std::io::Write;
use std::path::Path;

use anyhow::{Context, Result};

use crate::app::App;

/// Copy a media file to `output`, or to stdout when no output is given
pub fn run(app: &App, task_id: &str, name: &str, output: Option<&Path>) -> Result<()> {
    let task = app.find_task(task_id)?;
    let path = task.media_path(name)?;
    copy_out(&path, output)
}

/// Copy the finished deck to `output`, or print its path
pub fn run_deck(app: &App, task_id: &str, output: Option<&Path>) -> Result<()> {
    let task = app.find_task(task_id)?;
    let Some(deck) = task.deck() else {
        let status = app.status(&task)?.status();
        anyhow::bail!("Task '{}' has no deck ({})", task_id, status);
    };

    match output {
        Some(output) => copy_out(&deck, Some(output)),
        None => {
            println!("{}", deck.display());
            Ok(())
        }
    }
}

fn copy_out(path: &Path, output: Option<&Path>) -> Result<()> {
    match output {
        Some(output) => {
            fs::copy(path, output)
                .with_context(|| format!("Failed to copy {} to {}", path.display(), output.display()))?;
        }
        None => {
            let bytes = fs::read(path)?;
            std::io::stdout().lock().write_all(&bytes)?;
        }
    }
    Ok(())
}
