//! Input file parsing
//!
//! Supported formats, chosen by extension:
//! - `.csv`: `word,context` columns, header row optional
//! - `.json`: array of `{"word": ..., "context": ...}`
//! - `.tsv` / `.txt`: one record per line, `word<TAB>context`

use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::cards::WordRecord;

#[derive(Error, Debug)]
pub enum InputError {
    #[error("Input file not found in {0}")]
    NotFound(PathBuf),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Unsupported input format: {0}")]
    UnsupportedFormat(String),

    #[error("Input file contains no words: {0}")]
    Empty(PathBuf),
}

pub type Result<T> = std::result::Result<T, InputError>;

/// Extensions probed when locating the input file, in order
pub const INPUT_EXTENSIONS: [&str; 4] = ["csv", "json", "tsv", "txt"];

/// File stem of the input file inside a task directory
pub const INPUT_STEM: &str = "input";

/// Find the input file in a task directory
pub fn locate_input_file(task_dir: &Path) -> Result<PathBuf> {
    INPUT_EXTENSIONS
        .iter()
        .map(|ext| task_dir.join(format!("{}.{}", INPUT_STEM, ext)))
        .find(|path| path.is_file())
        .ok_or_else(|| InputError::NotFound(task_dir.to_path_buf()))
}

/// Read word records from a file, dispatching on its extension
pub fn read_input_file(path: &Path) -> Result<Vec<WordRecord>> {
    if !path.is_file() {
        return Err(InputError::NotFound(path.to_path_buf()));
    }

    let extension = path
        .extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .unwrap_or_default();

    let content = fs::read_to_string(path)?;
    let records = match extension.as_str() {
        "csv" => parse_csv(&content)?,
        "json" => parse_json(&content)?,
        "tsv" | "txt" => parse_lines(&content),
        other => return Err(InputError::UnsupportedFormat(other.to_string())),
    };

    if records.is_empty() {
        return Err(InputError::Empty(path.to_path_buf()));
    }

    log::info!("Read {} words from {:?}", records.len(), path);
    Ok(records)
}

/// Parse CSV content. The first row is skipped when it reads `word,...`.
pub fn parse_csv(content: &str) -> Result<Vec<WordRecord>> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(content.as_bytes());

    let mut records = Vec::new();
    for (row_idx, result) in reader.records().enumerate() {
        let row = result?;
        let word = row.get(0).unwrap_or_default();

        if row_idx == 0 && word.eq_ignore_ascii_case("word") {
            continue;
        }

        if let Some(record) = normalize(word, row.get(1).unwrap_or_default()) {
            records.push(record);
        }
    }

    Ok(records)
}

/// Parse a JSON array of word records
pub fn parse_json(content: &str) -> Result<Vec<WordRecord>> {
    let raw: Vec<WordRecord> = serde_json::from_str(content)?;
    Ok(raw
        .into_iter()
        .filter_map(|r| normalize(&r.word, &r.context))
        .collect())
}

/// Parse tab-separated lines. A line without a tab is a bare word.
pub fn parse_lines(content: &str) -> Vec<WordRecord> {
    content
        .lines()
        .filter_map(|line| {
            let (word, context) = line.split_once('\t').unwrap_or((line, ""));
            normalize(word, context)
        })
        .collect()
}

fn normalize(word: &str, context: &str) -> Option<WordRecord> {
    let word = word.trim();
    if word.is_empty() {
        return None;
    }
    Some(WordRecord::new(word, context.trim()))
}
