//! Offline strategy: deterministic text, shared placeholder media

use std::fs;
use std::path::{Path, PathBuf};

use async_trait::async_trait;

use super::{ContentResolver, ProgressFn, Result};
use crate::cards::{ContentRecord, WordRecord};
use crate::config::TaskConfig;

pub const PLACEHOLDER_IMAGE: &str = "placeholder.svg";
pub const PLACEHOLDER_AUDIO: &str = "placeholder.wav";

const PLACEHOLDER_SVG: &str = r##"<svg xmlns="http://www.w3.org/2000/svg" width="300" height="300" viewBox="0 0 300 300"><rect width="300" height="300" fill="#496d89"/></svg>
"##;

/// Half a second of 16 kHz mono silence
const PLACEHOLDER_SAMPLE_RATE: u32 = 16_000;
const PLACEHOLDER_SAMPLES: u32 = 8_000;

pub struct StubResolver {
    media_dir: PathBuf,
}

impl StubResolver {
    pub fn new(media_dir: PathBuf) -> Self {
        Self { media_dir }
    }

    /// Write the shared placeholder files if they are not there yet
    pub fn ensure_placeholders(&self) -> Result<(PathBuf, PathBuf)> {
        fs::create_dir_all(&self.media_dir)?;

        let image = self.media_dir.join(PLACEHOLDER_IMAGE);
        if !image.exists() {
            fs::write(&image, PLACEHOLDER_SVG)?;
        }

        let audio = self.media_dir.join(PLACEHOLDER_AUDIO);
        if !audio.exists() {
            write_silence(&audio)?;
        }

        Ok((image, audio))
    }
}

/// Placeholder explanation; a pure function of word and context
pub fn stub_text(record: &WordRecord) -> String {
    format!(
        "Mock explanation for {}. Context: {}",
        record.word, record.context
    )
}

fn write_silence(path: &Path) -> Result<()> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate: PLACEHOLDER_SAMPLE_RATE,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut writer = hound::WavWriter::create(path, spec)?;
    for _ in 0..PLACEHOLDER_SAMPLES {
        writer.write_sample(0i16)?;
    }
    writer.finalize()?;
    Ok(())
}

#[async_trait]
impl ContentResolver for StubResolver {
    async fn resolve(
        &self,
        records: &[WordRecord],
        config: &TaskConfig,
        progress: ProgressFn<'_>,
    ) -> Result<Vec<ContentRecord>> {
        log::info!("Running in stub mode, skipping AI generation");
        let (image, audio) = self.ensure_placeholders()?;

        let total = records.len();
        let mut contents = Vec::with_capacity(total);
        for (index, record) in records.iter().enumerate() {
            contents.push(ContentRecord {
                word: record.word.clone(),
                explanatory_text: stub_text(record),
                image_prompt: Some("Mock prompt".to_string()),
                image_reference: Some(image.clone()),
                audio_reference: Some(audio.clone()),
                dictionary_url: Some(config.dictionary_url(&record.word)),
            });
            progress(index + 1, total);
        }

        Ok(contents)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    fn records() -> Vec<WordRecord> {
        vec![
            WordRecord::new("apple", "I ate an apple"),
            WordRecord::new("run", "She runs daily"),
            WordRecord::new("apple", "I ate an apple"),
        ]
    }

    #[tokio::test]
    async fn test_one_content_per_record_in_order() {
        let temp = TempDir::new().unwrap();
        let resolver = StubResolver::new(temp.path().join("media"));
        let calls = AtomicUsize::new(0);
        let progress = |_done: usize, _total: usize| {
            calls.fetch_add(1, Ordering::SeqCst);
        };

        let input = records();
        let contents = resolver
            .resolve(&input, &TaskConfig::default(), &progress)
            .await
            .unwrap();

        assert_eq!(contents.len(), input.len());
        for (record, content) in input.iter().zip(&contents) {
            assert_eq!(record.word, content.word);
            assert!(content.explanatory_text.contains(&record.context));
        }
        assert_eq!(calls.load(Ordering::SeqCst), input.len());
    }

    #[tokio::test]
    async fn test_text_is_deterministic() {
        let temp = TempDir::new().unwrap();
        let resolver = StubResolver::new(temp.path().join("media"));
        let input = records();
        let noop = |_: usize, _: usize| {};

        let first = resolver.resolve(&input, &TaskConfig::default(), &noop).await.unwrap();
        let second = resolver.resolve(&input, &TaskConfig::default(), &noop).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(first[0].explanatory_text, first[2].explanatory_text);
        assert_eq!(
            first[0].explanatory_text,
            "Mock explanation for apple. Context: I ate an apple"
        );
    }

    #[tokio::test]
    async fn test_placeholders_are_shared_and_exist() {
        let temp = TempDir::new().unwrap();
        let resolver = StubResolver::new(temp.path().join("media"));
        let noop = |_: usize, _: usize| {};

        let contents = resolver
            .resolve(&records(), &TaskConfig::default(), &noop)
            .await
            .unwrap();

        let image = contents[0].image_reference.clone().unwrap();
        let audio = contents[0].audio_reference.clone().unwrap();
        assert!(image.is_file());
        assert!(audio.is_file());
        assert!(contents.iter().all(|c| c.image_reference.as_ref() == Some(&image)));

        let reader = hound::WavReader::open(&audio).unwrap();
        assert_eq!(reader.duration(), PLACEHOLDER_SAMPLES);
    }
}
