//! Card content resolution
//!
//! A resolver turns the task's word records into content records, one per
//! record and in the same order. Two strategies share the interface:
//! - `StubResolver`: deterministic text and shared placeholder media
//! - `LiveResolver`: text, image and audio from a [`GenerationProvider`]
//!
//! Each resolver is bound to one task's media directory.
//!
//! [`GenerationProvider`]: crate::providers::GenerationProvider

pub mod live;
pub mod stub;

use std::path::PathBuf;

use async_trait::async_trait;
use thiserror::Error;

use crate::cards::{ContentRecord, WordRecord};
use crate::config::{Strategy, TaskConfig};
use crate::providers::{HttpProvider, ProviderError};

pub use live::LiveResolver;
pub use stub::StubResolver;

#[derive(Error, Debug)]
pub enum GenerationError {
    #[error("Provider error for \"{word}\": {source}")]
    Provider {
        word: String,
        #[source]
        source: ProviderError,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Placeholder audio error: {0}")]
    PlaceholderAudio(#[from] hound::Error),

    #[error("Generation failed for \"{word}\" after {attempts} attempt(s): {last}")]
    Exhausted {
        word: String,
        attempts: u32,
        last: Box<GenerationError>,
    },

    #[error("Resolver produced {actual} cards for {expected} words")]
    CountMismatch { expected: usize, actual: usize },
}

pub type Result<T> = std::result::Result<T, GenerationError>;

/// Progress callback: `(records done, records total)`
pub type ProgressFn<'a> = &'a (dyn Fn(usize, usize) + Send + Sync);

/// Strategy interface the task runner depends on
#[async_trait]
pub trait ContentResolver: Send + Sync {
    /// Resolve every record, in order. Any failure fails the whole call.
    async fn resolve(
        &self,
        records: &[WordRecord],
        config: &TaskConfig,
        progress: ProgressFn<'_>,
    ) -> Result<Vec<ContentRecord>>;
}

/// Build the resolver selected by the task's strategy
pub fn resolver_for(
    config: &TaskConfig,
    media_dir: PathBuf,
) -> std::result::Result<Box<dyn ContentResolver>, ProviderError> {
    match config.strategy {
        Strategy::Stub => Ok(Box::new(StubResolver::new(media_dir))),
        Strategy::Live => {
            let provider = HttpProvider::new(config.providers.clone(), config.credentials.clone())?;
            Ok(Box::new(LiveResolver::new(provider, media_dir)))
        }
    }
}

/// Filesystem-friendly form of a word
pub fn slugify(word: &str) -> String {
    let mut slug = String::new();
    for c in word.trim().chars().flat_map(char::to_lowercase) {
        if c.is_alphanumeric() {
            slug.push(c);
        } else if !slug.ends_with('-') && !slug.is_empty() {
            slug.push('-');
        }
    }

    let slug: String = slug.trim_end_matches('-').chars().take(40).collect();
    if slug.is_empty() {
        "word".to_string()
    } else {
        slug
    }
}
