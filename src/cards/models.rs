//! Data models for generated cards

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// One input line: the word to learn and the sentence it was seen in
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WordRecord {
    pub word: String,
    #[serde(default)]
    pub context: String,
}

impl WordRecord {
    pub fn new(word: impl Into<String>, context: impl Into<String>) -> Self {
        Self {
            word: word.into(),
            context: context.into(),
        }
    }
}

/// Generated content for a single word
///
/// Media references point at files inside the task directory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentRecord {
    pub word: String,
    pub explanatory_text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_prompt: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_reference: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audio_reference: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dictionary_url: Option<String>,
}

impl ContentRecord {
    /// Media files this record refers to, image first
    pub fn media_references(&self) -> impl Iterator<Item = &Path> {
        self.image_reference
            .iter()
            .chain(self.audio_reference.iter())
            .map(PathBuf::as_path)
    }
}

/// The two faces of a flashcard plus its tags
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormattedNote {
    pub front_html: String,
    pub back_html: String,
    pub tags: BTreeSet<String>,
}

/// File name used to embed a media file in card HTML and in the archive
pub fn media_basename(path: &Path) -> Option<String> {
    path.file_name().map(|n| n.to_string_lossy().into_owned())
}
