//! Preview manifest (`cards.json`) for showing cards without importing the deck

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use super::Result;
use crate::cards::{media_basename, ContentRecord};
use crate::files::write_json_atomic;

/// One card in the preview manifest. Media is named by basename and
/// served from the task's media directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreviewEntry {
    pub word: String,
    pub text: String,
    pub image: Option<String>,
    pub audio: Option<String>,
}

/// Build the manifest entries, in card order
pub fn build_preview(contents: &[ContentRecord]) -> Vec<PreviewEntry> {
    contents
        .iter()
        .map(|c| PreviewEntry {
            word: c.word.clone(),
            text: c.explanatory_text.clone(),
            image: c.image_reference.as_deref().and_then(media_basename),
            audio: c.audio_reference.as_deref().and_then(media_basename),
        })
        .collect()
}

/// Write the manifest atomically
pub fn write_preview(path: &Path, entries: &[PreviewEntry]) -> Result<()> {
    write_json_atomic(path, entries)?;
    Ok(())
}

/// Read a manifest written by [`write_preview`]
pub fn read_preview(path: &Path) -> Result<Vec<PreviewEntry>> {
    let content = fs::read_to_string(path)?;
    Ok(serde_json::from_str(&content)?)
}
