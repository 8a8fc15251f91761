//! Renders content records into flashcard faces.
//!
//! Media is referenced by basename only; the packager embeds the actual
//! bytes from the media file list.

use std::collections::BTreeSet;

use super::models::{media_basename, ContentRecord, FormattedNote};

/// Marker tag added to every generated note
pub const GENERATED_TAG: &str = "ai-generated";

/// Format a content record into a note
pub fn format_note(content: &ContentRecord) -> FormattedNote {
    FormattedNote {
        front_html: front_html(content),
        back_html: back_html(content),
        tags: note_tags(&content.word),
    }
}

/// Front face: the word and, if present, its image
pub fn front_html(content: &ContentRecord) -> String {
    let mut html = format!(
        "<div class=\"word\">{}</div>",
        html_escape::encode_text(&content.word)
    );

    if let Some(name) = content.image_reference.as_deref().and_then(media_basename) {
        html.push_str(&format!(
            "<div class=\"image\"><img src=\"{}\"></div>",
            html_escape::encode_double_quoted_attribute(&name)
        ));
    }

    html
}

/// Back face: explanation, dictionary link and audio
pub fn back_html(content: &ContentRecord) -> String {
    let text = html_escape::encode_text(content.explanatory_text.trim()).replace('\n', "<br>");
    let mut html = format!("<div class=\"explanation\">{}</div>", text);

    if let Some(url) = &content.dictionary_url {
        html.push_str(&format!(
            "<div class=\"dictionary\"><a href=\"{}\">Dictionary</a></div>",
            html_escape::encode_double_quoted_attribute(url)
        ));
    }

    if let Some(name) = content.audio_reference.as_deref().and_then(media_basename) {
        html.push_str(&format!("<div class=\"audio\">[sound:{}]</div>", name));
    }

    html
}

/// Tags for a word: the normalized word plus the generated marker
pub fn note_tags(word: &str) -> BTreeSet<String> {
    let normalized = word
        .split_whitespace()
        .collect::<Vec<_>>()
        .join("_")
        .to_lowercase();

    let mut tags = BTreeSet::new();
    if !normalized.is_empty() {
        tags.insert(normalized);
    }
    tags.insert(GENERATED_TAG.to_string());
    tags
}
