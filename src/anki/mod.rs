//! Deck packaging
//!
//! Produces the two outputs of a finished task:
//! - the `.apkg` archive importable by Anki (`package`, `schema`)
//! - the JSON preview manifest (`preview`)

pub mod package;
pub mod preview;
pub mod schema;

use std::path::PathBuf;

use thiserror::Error;

pub use package::{dedup_media, write_package, PackageSummary};
pub use preview::{build_preview, read_preview, write_preview, PreviewEntry};

#[derive(Error, Debug)]
pub enum PackagingError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("ZIP error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Media file not found: {0}")]
    MissingMedia(PathBuf),

    #[error("Media path has no file name: {0}")]
    InvalidMediaPath(PathBuf),

    #[error("Media name {name} used by both {first} and {second}")]
    MediaNameConflict {
        name: String,
        first: PathBuf,
        second: PathBuf,
    },
}

pub type Result<T> = std::result::Result<T, PackagingError>;
