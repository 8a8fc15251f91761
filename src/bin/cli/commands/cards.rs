use anyhow::{bail, Result};

use deckgen_lib::anki::read_preview;

use crate::app::App;
use crate::render::terminal::{paint, Color};
use crate::OutputFormat;

pub fn run(app: &App, task_id: &str, format: &OutputFormat, use_color: bool) -> Result<()> {
    let task = app.find_task(task_id)?;
    let path = task.preview_path();
    if !path.is_file() {
        let status = app.status(&task)?.status();
        bail!("No cards for task '{}' yet ({})", task_id, status);
    }

    let entries = read_preview(&path)?;

    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&entries)?);
        }
        OutputFormat::Plain => {
            for (i, entry) in entries.iter().enumerate() {
                println!("{:>3}. {}", i + 1, paint(&entry.word, Color::BOLD, use_color));
                for line in entry.text.lines() {
                    println!("     {}", line);
                }
                let media: Vec<&str> = entry
                    .image
                    .iter()
                    .chain(entry.audio.iter())
                    .map(String::as_str)
                    .collect();
                if !media.is_empty() {
                    println!("     {}", paint(&media.join(", "), Color::DIM, use_color));
                }
            }
            println!("\n{} cards", entries.len());
        }
    }

    Ok(())
}
