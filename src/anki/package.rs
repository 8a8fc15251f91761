//! `.apkg` archive writer
//!
//! Archive layout:
//! ```text
//! collection.anki2   # SQLite collection (see schema.rs)
//! media              # JSON index {"0": "basename.png", ...}
//! 0, 1, ...          # media file bytes
//! ```

use std::collections::{BTreeMap, HashMap, HashSet};
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use rand::Rng;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use super::schema::{write_collection, DeckInfo};
use super::{PackagingError, Result};
use crate::cards::{media_basename, FormattedNote};
use crate::files::tmp_path;

/// What ended up in an archive
#[derive(Debug, Clone)]
pub struct PackageSummary {
    pub deck_id: i64,
    pub note_count: usize,
    pub media_count: usize,
    pub path: PathBuf,
}

/// Fresh deck id in `[2^30, 2^31)`
pub fn new_deck_id() -> i64 {
    rand::thread_rng().gen_range((1_i64 << 30)..(1_i64 << 31))
}

/// Drop repeated paths, keeping first-seen order
pub fn dedup_media<'a, I>(media_files: I) -> Vec<PathBuf>
where
    I: IntoIterator<Item = &'a PathBuf>,
{
    let mut seen = HashSet::new();
    media_files
        .into_iter()
        .filter(|path| seen.insert(*path))
        .cloned()
        .collect()
}

/// Map each media file to the name it gets inside the archive.
///
/// Fails if a file is missing or if two different files share a basename.
fn media_entries(media_files: &[PathBuf]) -> Result<Vec<(String, &Path)>> {
    let mut by_name: HashMap<String, &Path> = HashMap::new();
    let mut entries = Vec::with_capacity(media_files.len());

    for path in media_files {
        if !path.is_file() {
            return Err(PackagingError::MissingMedia(path.clone()));
        }
        let name = media_basename(path).ok_or_else(|| PackagingError::InvalidMediaPath(path.clone()))?;

        if let Some(existing) = by_name.get(&name) {
            return Err(PackagingError::MediaNameConflict {
                name,
                first: existing.to_path_buf(),
                second: path.clone(),
            });
        }
        by_name.insert(name.clone(), path);
        entries.push((name, path.as_path()));
    }

    Ok(entries)
}

/// Write a deck archive to `target`.
///
/// The archive is assembled next to `target` and renamed into place, so
/// `target` only appears once it is complete.
pub fn write_package(
    deck_name: &str,
    notes: &[FormattedNote],
    media_files: &[PathBuf],
    target: &Path,
) -> Result<PackageSummary> {
    let media_files = dedup_media(media_files);
    let entries = media_entries(&media_files)?;

    let deck = DeckInfo {
        id: new_deck_id(),
        name: deck_name.to_string(),
    };

    let collection_path = target.with_extension("anki2.tmp");
    if collection_path.exists() {
        fs::remove_file(&collection_path)?;
    }
    write_collection(&collection_path, &deck, notes)?;
    let collection = fs::read(&collection_path)?;
    fs::remove_file(&collection_path)?;

    let archive_tmp = tmp_path(target);
    let file = File::create(&archive_tmp)?;
    let mut zip = ZipWriter::new(file);
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

    zip.start_file("collection.anki2", options)?;
    zip.write_all(&collection)?;

    let index: BTreeMap<String, &str> = entries
        .iter()
        .enumerate()
        .map(|(i, (name, _))| (i.to_string(), name.as_str()))
        .collect();
    zip.start_file("media", options)?;
    zip.write_all(serde_json::to_string(&index)?.as_bytes())?;

    for (i, (_, path)) in entries.iter().enumerate() {
        zip.start_file(i.to_string(), options)?;
        zip.write_all(&fs::read(path)?)?;
    }

    zip.finish()?;
    fs::rename(&archive_tmp, target)?;

    log::info!(
        "Deck \"{}\" ({} notes, {} media files) written to {:?}",
        deck_name,
        notes.len(),
        entries.len(),
        target
    );

    Ok(PackageSummary {
        deck_id: deck.id,
        note_count: notes.len(),
        media_count: entries.len(),
        path: target.to_path_buf(),
    })
}
