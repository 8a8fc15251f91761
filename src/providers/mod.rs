//! External generation providers
//!
//! The live strategy talks to three kinds of backend:
//! - text: OpenAI chat completions
//! - image: fal.ai or Replicate
//! - audio: fal.ai text-to-speech
//!
//! Image and audio backends return a URL; the bytes are fetched with
//! [`GenerationProvider::download`].

pub mod fal;
pub mod openai;
pub mod replicate;

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Response};
use thiserror::Error;

use crate::config::{Credentials, ImageBackend, ProviderSettings};

#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{provider} returned {status}: {message}")]
    Status {
        provider: &'static str,
        status: u16,
        message: String,
    },

    #[error("Malformed {provider} response: {detail}")]
    MalformedResponse {
        provider: &'static str,
        detail: String,
    },

    #[error("Missing credential: {0}")]
    MissingCredential(&'static str),

    #[error("{provider} prediction did not finish: {detail}")]
    Unfinished {
        provider: &'static str,
        detail: String,
    },
}

pub type Result<T> = std::result::Result<T, ProviderError>;

/// Bytes fetched from a media URL
#[derive(Debug, Clone)]
pub struct DownloadedMedia {
    pub bytes: Vec<u8>,
    /// Extension derived from the content type or URL, without the dot
    pub extension: Option<String>,
}

/// Contract every generation backend satisfies
#[async_trait]
pub trait GenerationProvider: Send + Sync {
    /// Explanatory text for a word in context
    async fn generate_text(
        &self,
        word: &str,
        context: &str,
        language: &str,
        level: &str,
    ) -> Result<String>;

    /// Generate an image and return its URL
    async fn generate_image(&self, prompt: &str) -> Result<String>;

    /// Generate spoken audio for a word and return its URL
    async fn generate_audio(&self, word: &str) -> Result<String>;

    /// Fetch a generated media file
    async fn download(&self, url: &str) -> Result<DownloadedMedia>;
}

/// Provider backed by the public HTTP APIs
pub struct HttpProvider {
    client: Client,
    settings: ProviderSettings,
    credentials: Credentials,
}

impl HttpProvider {
    pub fn new(settings: ProviderSettings, credentials: Credentials) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(settings.request_timeout_secs))
            .connect_timeout(Duration::from_secs(30))
            .build()?;

        Ok(Self {
            client,
            settings,
            credentials,
        })
    }

    fn fal_key(&self) -> Result<&str> {
        self.credentials
            .fal_key
            .as_deref()
            .ok_or(ProviderError::MissingCredential("FAL_KEY"))
    }
}

#[async_trait]
impl GenerationProvider for HttpProvider {
    async fn generate_text(
        &self,
        word: &str,
        context: &str,
        language: &str,
        level: &str,
    ) -> Result<String> {
        let key = self
            .credentials
            .openai_key
            .as_deref()
            .ok_or(ProviderError::MissingCredential("OPENAI_API_KEY"))?;

        let request = openai::CardTextRequest {
            word,
            context,
            language,
            level,
        };
        openai::generate_card_text(
            &self.client,
            &self.settings.openai_base_url,
            key,
            &self.settings.text_model,
            &request,
        )
        .await
    }

    async fn generate_image(&self, prompt: &str) -> Result<String> {
        match self.settings.image_backend {
            ImageBackend::Fal => {
                fal::generate_image(
                    &self.client,
                    &self.settings.fal_base_url,
                    self.fal_key()?,
                    &self.settings.fal_image_model,
                    prompt,
                )
                .await
            }
            ImageBackend::Replicate => {
                let token = self
                    .credentials
                    .replicate_token
                    .as_deref()
                    .ok_or(ProviderError::MissingCredential("REPLICATE_API_TOKEN"))?;
                replicate::generate_image(
                    &self.client,
                    &self.settings.replicate_base_url,
                    token,
                    &self.settings.replicate_model,
                    prompt,
                    Duration::from_secs(self.settings.request_timeout_secs),
                )
                .await
            }
        }
    }

    async fn generate_audio(&self, word: &str) -> Result<String> {
        fal::generate_audio(
            &self.client,
            &self.settings.fal_base_url,
            self.fal_key()?,
            &self.settings.fal_audio_model,
            word,
        )
        .await
    }

    async fn download(&self, url: &str) -> Result<DownloadedMedia> {
        log::debug!("Downloading media from {}", url);
        let response = check_status("media host", self.client.get(url).send().await?).await?;

        let extension = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .and_then(extension_for_content_type)
            .or_else(|| extension_from_url(url));

        let bytes = response.bytes().await?.to_vec();
        if bytes.is_empty() {
            return Err(ProviderError::MalformedResponse {
                provider: "media host",
                detail: format!("empty body from {}", url),
            });
        }

        Ok(DownloadedMedia { bytes, extension })
    }
}

/// Turn a non-2xx response into a [`ProviderError::Status`]
pub(crate) async fn check_status(provider: &'static str, response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    Err(ProviderError::Status {
        provider,
        status: status.as_u16(),
        message: response.text().await.unwrap_or_default(),
    })
}

/// File extension for common media content types
pub fn extension_for_content_type(content_type: &str) -> Option<String> {
    let mime = content_type.split(';').next()?.trim().to_lowercase();
    let ext = match mime.as_str() {
        "image/png" => "png",
        "image/jpeg" | "image/jpg" => "jpg",
        "image/webp" => "webp",
        "image/gif" => "gif",
        "image/svg+xml" => "svg",
        "audio/mpeg" | "audio/mp3" => "mp3",
        "audio/wav" | "audio/x-wav" | "audio/wave" => "wav",
        "audio/ogg" => "ogg",
        "audio/flac" => "flac",
        _ => return None,
    };
    Some(ext.to_string())
}

/// Extension of the last URL path segment, ignoring query and fragment
pub fn extension_from_url(url: &str) -> Option<String> {
    let path = url.split(['?', '#']).next()?;
    let segment = path.rsplit('/').next()?;
    let (_, ext) = segment.rsplit_once('.')?;

    if ext.is_empty() || ext.len() > 5 || !ext.chars().all(|c| c.is_ascii_alphanumeric()) {
        return None;
    }
    Some(ext.to_lowercase())
}
