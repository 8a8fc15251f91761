//! Card data and HTML rendering
//!
//! - `models`: word, content and note records that flow through a task
//! - `formatter`: content record → front/back HTML and tags

pub mod formatter;
pub mod models;

pub use formatter::format_note;
pub use models::*;
