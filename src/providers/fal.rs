//! fal.ai image and speech models

use reqwest::Client;
use serde_json::{json, Value};

use super::{check_status, ProviderError, Result};

const PROVIDER: &str = "fal";

async fn run_model(client: &Client, base_url: &str, key: &str, model: &str, arguments: Value) -> Result<Value> {
    let url = format!("{}/{}", base_url.trim_end_matches('/'), model);
    let response = client
        .post(&url)
        .header("Authorization", format!("Key {}", key))
        .json(&arguments)
        .send()
        .await?;

    Ok(check_status(PROVIDER, response).await?.json().await?)
}

/// Generate an image and return its URL
pub async fn generate_image(
    client: &Client,
    base_url: &str,
    key: &str,
    model: &str,
    prompt: &str,
) -> Result<String> {
    log::debug!("FAL image generation prompt [{}]", prompt);
    let result = run_model(
        client,
        base_url,
        key,
        model,
        json!({ "prompt": prompt, "image_size": "square_hd" }),
    )
    .await?;

    let url = parse_image_response(&result)?;
    log::debug!("FAL generated image URL: {}", url);
    Ok(url)
}

/// Generate speech for a word and return the audio URL
pub async fn generate_audio(
    client: &Client,
    base_url: &str,
    key: &str,
    model: &str,
    word: &str,
) -> Result<String> {
    log::debug!("FAL audio generation for word [{}]", word);
    let result = run_model(client, base_url, key, model, json!({ "text": word })).await?;

    let url = parse_audio_response(&result)?;
    log::debug!("FAL generated audio URL: {}", url);
    Ok(url)
}

/// `images[0].url`
pub fn parse_image_response(result: &Value) -> Result<String> {
    result
        .pointer("/images/0/url")
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| ProviderError::MalformedResponse {
            provider: PROVIDER,
            detail: "no images[0].url in result".to_string(),
        })
}

/// Speech models differ in where they put the URL: `audio.url`,
/// `audio_url`, or a bare `url`.
pub fn parse_audio_response(result: &Value) -> Result<String> {
    ["/audio/url", "/audio_url", "/url"]
        .iter()
        .find_map(|pointer| result.pointer(pointer).and_then(Value::as_str))
        .map(str::to_string)
        .ok_or_else(|| {
            log::error!("Unknown FAL audio result format: {}", result);
            ProviderError::MalformedResponse {
                provider: PROVIDER,
                detail: "no audio URL in result".to_string(),
            }
        })
}
