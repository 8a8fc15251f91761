//! Flashcard deck generation
//!
//! Turns a list of words (with the sentence each was seen in) into an Anki
//! deck. A task runs in its own worker process and reports progress through
//! `status.json` in its task directory.

pub mod anki;
pub mod cards;
pub mod config;
pub mod files;
pub mod input;
pub mod providers;
pub mod resolver;
pub mod task;

pub use cards::{ContentRecord, FormattedNote, WordRecord};
pub use config::{Strategy, TaskConfig};
pub use task::{TaskDirectory, TaskRunner, TaskStatus, TaskSupervisor};
