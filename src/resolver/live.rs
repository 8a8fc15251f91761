//! Live strategy: text, image and optional audio from external providers
//!
//! Records are processed one at a time. A record is retried up to
//! `max_attempts` times; if it still fails the whole resolution fails and
//! no content is returned for any record.

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;

use super::{slugify, ContentResolver, GenerationError, ProgressFn, Result};
use crate::cards::{ContentRecord, WordRecord};
use crate::config::TaskConfig;
use crate::providers::GenerationProvider;

pub struct LiveResolver<P: GenerationProvider> {
    provider: P,
    media_dir: PathBuf,
}

impl<P: GenerationProvider> LiveResolver<P> {
    pub fn new(provider: P, media_dir: PathBuf) -> Self {
        Self {
            provider,
            media_dir,
        }
    }

    async fn resolve_with_retry(
        &self,
        index: usize,
        record: &WordRecord,
        config: &TaskConfig,
    ) -> Result<ContentRecord> {
        let mut attempt = 1;
        loop {
            match self.resolve_one(index, record, config).await {
                Ok(content) => return Ok(content),
                Err(e) if attempt < config.max_attempts => {
                    log::warn!(
                        "Attempt {}/{} for \"{}\" failed: {}",
                        attempt,
                        config.max_attempts,
                        record.word,
                        e
                    );
                    attempt += 1;
                    tokio::time::sleep(Duration::from_millis(config.retry_backoff_ms)).await;
                }
                Err(e) => {
                    return Err(GenerationError::Exhausted {
                        word: record.word.clone(),
                        attempts: attempt,
                        last: Box::new(e),
                    });
                }
            }
        }
    }

    async fn resolve_one(
        &self,
        index: usize,
        record: &WordRecord,
        config: &TaskConfig,
    ) -> Result<ContentRecord> {
        let provider_error = |source| GenerationError::Provider {
            word: record.word.clone(),
            source,
        };

        let text = self
            .provider
            .generate_text(&record.word, &record.context, &config.language, &config.level)
            .await
            .map_err(provider_error)?;

        let prompt = image_prompt(record);
        let image_url = self
            .provider
            .generate_image(&prompt)
            .await
            .map_err(provider_error)?;
        let stem = media_stem(index, &record.word);
        let image_path = self.fetch_media(record, &image_url, &stem, "png").await?;

        let audio_path = if config.with_audio {
            let audio_url = self
                .provider
                .generate_audio(&record.word)
                .await
                .map_err(provider_error)?;
            Some(self.fetch_media(record, &audio_url, &stem, "mp3").await?)
        } else {
            None
        };

        Ok(ContentRecord {
            word: record.word.clone(),
            explanatory_text: text,
            image_prompt: Some(prompt),
            image_reference: Some(image_path),
            audio_reference: audio_path,
            dictionary_url: Some(config.dictionary_url(&record.word)),
        })
    }

    async fn fetch_media(
        &self,
        record: &WordRecord,
        url: &str,
        stem: &str,
        default_extension: &str,
    ) -> Result<PathBuf> {
        let media = self
            .provider
            .download(url)
            .await
            .map_err(|source| GenerationError::Provider {
                word: record.word.clone(),
                source,
            })?;
        let extension = media.extension.as_deref().unwrap_or(default_extension);
        let path = self.media_dir.join(format!("{}.{}", stem, extension));

        tokio::fs::write(&path, &media.bytes).await?;
        log::debug!("Saved {} bytes to {:?}", media.bytes.len(), path);
        Ok(path)
    }
}

/// File stem for a record's media; the index keeps repeated words apart
pub fn media_stem(index: usize, word: &str) -> String {
    format!("card-{:04}-{}", index + 1, slugify(word))
}

/// Prompt for the card illustration
pub fn image_prompt(record: &WordRecord) -> String {
    let mut prompt = format!("A simple, clear illustration of \"{}\"", record.word);
    if !record.context.is_empty() {
        prompt.push_str(&format!(" as used in: {}", record.context));
    }
    prompt.push_str(". No text in the image.");
    prompt
}

#[async_trait]
impl<P: GenerationProvider> ContentResolver for LiveResolver<P> {
    async fn resolve(
        &self,
        records: &[WordRecord],
        config: &TaskConfig,
        progress: ProgressFn<'_>,
    ) -> Result<Vec<ContentRecord>> {
        tokio::fs::create_dir_all(&self.media_dir).await?;

        let total = records.len();
        let mut contents = Vec::with_capacity(total);
        for (index, record) in records.iter().enumerate() {
            log::info!("Generating card {}/{}: {}", index + 1, total, record.word);
            contents.push(self.resolve_with_retry(index, record, config).await?);
            progress(index + 1, total);
        }

        Ok(contents)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::config::Strategy;
    use crate::providers::{DownloadedMedia, ProviderError};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use tempfile::TempDir;

    /// Provider that fails text generation for one word, a set number of times
    pub(crate) struct FakeProvider {
        pub failing_word: Option<String>,
        pub failures_left: AtomicUsize,
        /// Downloads of any URL containing this word fail with a 404
        pub failing_download: Option<String>,
        pub text_calls: Mutex<Vec<String>>,
    }

    impl FakeProvider {
        pub(crate) fn ok() -> Self {
            Self {
                failing_word: None,
                failures_left: AtomicUsize::new(0),
                failing_download: None,
                text_calls: Mutex::new(Vec::new()),
            }
        }

        pub(crate) fn failing(word: &str, times: usize) -> Self {
            Self {
                failing_word: Some(word.to_string()),
                failures_left: AtomicUsize::new(times),
                failing_download: None,
                text_calls: Mutex::new(Vec::new()),
            }
        }

        pub(crate) fn failing_download(word: &str) -> Self {
            Self {
                failing_download: Some(word.to_string()),
                ..Self::ok()
            }
        }
    }

    #[async_trait]
    impl GenerationProvider for FakeProvider {
        async fn generate_text(
            &self,
            word: &str,
            context: &str,
            language: &str,
            level: &str,
        ) -> crate::providers::Result<String> {
            self.text_calls.lock().unwrap().push(word.to_string());
            if self.failing_word.as_deref() == Some(word)
                && self.failures_left.load(Ordering::SeqCst) > 0
            {
                self.failures_left.fetch_sub(1, Ordering::SeqCst);
                return Err(ProviderError::Status {
                    provider: "fake",
                    status: 500,
                    message: "boom".to_string(),
                });
            }
            Ok(format!("{} ({}, {}): {}", word, language, level, context))
        }

        async fn generate_image(&self, prompt: &str) -> crate::providers::Result<String> {
            Ok(format!("https://images.test/{}.png", urlencoding::encode(prompt)))
        }

        async fn generate_audio(&self, word: &str) -> crate::providers::Result<String> {
            Ok(format!("https://audio.test/{}", word))
        }

        async fn download(&self, url: &str) -> crate::providers::Result<DownloadedMedia> {
            if let Some(word) = &self.failing_download {
                if url.contains(word.as_str()) {
                    return Err(ProviderError::Status {
                        provider: "media host",
                        status: 404,
                        message: format!("{} not found", url),
                    });
                }
            }
            let extension = if url.starts_with("https://audio.test/") {
                Some("mp3".to_string())
            } else {
                None
            };
            Ok(DownloadedMedia {
                bytes: url.as_bytes().to_vec(),
                extension,
            })
        }
    }

    pub(crate) fn live_config() -> TaskConfig {
        TaskConfig {
            strategy: Strategy::Live,
            retry_backoff_ms: 0,
            ..Default::default()
        }
    }

    fn words() -> Vec<WordRecord> {
        vec![
            WordRecord::new("apple", "I ate an apple"),
            WordRecord::new("run", "She runs daily"),
            WordRecord::new("apple", "I ate an apple"),
        ]
    }

    #[tokio::test]
    async fn test_media_names_do_not_collide() {
        let temp = TempDir::new().unwrap();
        let resolver = LiveResolver::new(FakeProvider::ok(), temp.path().join("media"));
        let mut config = live_config();
        config.with_audio = true;
        let noop = |_: usize, _: usize| {};

        let contents = resolver.resolve(&words(), &config, &noop).await.unwrap();
        assert_eq!(contents.len(), 3);

        let images: Vec<_> = contents.iter().map(|c| c.image_reference.clone().unwrap()).collect();
        assert!(images[0].ends_with("card-0001-apple.png"));
        assert!(images[2].ends_with("card-0003-apple.png"));
        assert_ne!(images[0], images[2]);
        assert!(images.iter().all(|p| p.is_file()));

        let audio = contents[1].audio_reference.clone().unwrap();
        assert!(audio.ends_with("card-0002-run.mp3"));
        assert!(contents[0].explanatory_text.starts_with("apple (english, B2)"));
    }

    #[tokio::test]
    async fn test_transient_failure_is_retried() {
        let temp = TempDir::new().unwrap();
        let resolver = LiveResolver::new(FakeProvider::failing("run", 1), temp.path().join("media"));
        let noop = |_: usize, _: usize| {};

        let contents = resolver.resolve(&words(), &live_config(), &noop).await.unwrap();
        assert_eq!(contents.len(), 3);
        assert!(contents[1].audio_reference.is_none());

        let calls = resolver.provider.text_calls.lock().unwrap().clone();
        assert_eq!(calls, vec!["apple", "run", "run", "apple"]);
    }

    #[tokio::test]
    async fn test_persistent_failure_aborts_everything() {
        let temp = TempDir::new().unwrap();
        let resolver = LiveResolver::new(FakeProvider::failing("run", 10), temp.path().join("media"));
        let done = AtomicUsize::new(0);
        let progress = |d: usize, _: usize| {
            done.store(d, Ordering::SeqCst);
        };

        let err = resolver.resolve(&words(), &live_config(), &progress).await.unwrap_err();
        match err {
            GenerationError::Exhausted { word, attempts, .. } => {
                assert_eq!(word, "run");
                assert_eq!(attempts, 2);
            }
            other => panic!("unexpected error: {other}"),
        }

        // The third word is never attempted
        assert_eq!(done.load(Ordering::SeqCst), 1);
        let calls = resolver.provider.text_calls.lock().unwrap().clone();
        assert_eq!(calls, vec!["apple", "run", "run"]);
    }

    #[tokio::test]
    async fn test_failed_download_aborts_everything() {
        let temp = TempDir::new().unwrap();
        let media_dir = temp.path().join("media");
        let resolver = LiveResolver::new(FakeProvider::failing_download("run"), media_dir.clone());
        let noop = |_: usize, _: usize| {};

        let err = resolver.resolve(&words(), &live_config(), &noop).await.unwrap_err();
        match err {
            GenerationError::Exhausted { word, attempts, last } => {
                assert_eq!(word, "run");
                assert_eq!(attempts, 2);
                assert!(matches!(
                    *last,
                    GenerationError::Provider {
                        source: ProviderError::Status { status: 404, .. },
                        ..
                    }
                ));
            }
            other => panic!("unexpected error: {other}"),
        }

        // Text generation succeeded on both attempts; only the image was lost
        let calls = resolver.provider.text_calls.lock().unwrap().clone();
        assert_eq!(calls, vec!["apple", "run", "run"]);
        assert!(media_dir.join("card-0001-apple.png").is_file());
        assert!(!media_dir.join("card-0002-run.png").exists());
    }

    #[test]
    fn test_image_prompt() {
        let prompt = image_prompt(&WordRecord::new("apple", "I ate an apple"));
        assert_eq!(
            prompt,
            "A simple, clear illustration of \"apple\" as used in: I ate an apple. No text in the image."
        );
        let bare = image_prompt(&WordRecord::new("apple", ""));
        assert!(!bare.contains("as used in"));
    }
}
