//! Replicate image predictions
//!
//! Predictions are created with `Prefer: wait`; if the model is still
//! running when the server gives up waiting, the prediction is polled until
//! it finishes or the deadline passes.

use std::time::{Duration, Instant};

use reqwest::Client;
use serde_json::{json, Value};

use super::{check_status, ProviderError, Result};

const PROVIDER: &str = "replicate";
const POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Generate an image and return its URL
pub async fn generate_image(
    client: &Client,
    base_url: &str,
    token: &str,
    model: &str,
    prompt: &str,
    deadline: Duration,
) -> Result<String> {
    log::debug!("Replicate image generation prompt [{}]", prompt);
    log::info!("Using Replicate model for image generation: {}", model);

    // Low cost, fast settings
    let input = json!({
        "input": {
            "aspect_ratio": "3:2",
            "go_fast": true,
            "megapixels": "0.25",
            "num_outputs": 1,
            "output_format": "png",
            "output_quality": 100,
            "prompt": prompt,
        }
    });

    let url = format!(
        "{}/models/{}/predictions",
        base_url.trim_end_matches('/'),
        model
    );
    let response = client
        .post(&url)
        .bearer_auth(token)
        .header("Prefer", "wait")
        .json(&input)
        .send()
        .await?;
    let mut prediction: Value = check_status(PROVIDER, response).await?.json().await?;

    let started = Instant::now();
    while is_pending(&prediction) {
        if started.elapsed() > deadline {
            return Err(ProviderError::Unfinished {
                provider: PROVIDER,
                detail: format!("still {} after {:?}", status_of(&prediction), deadline),
            });
        }

        let poll_url = prediction
            .pointer("/urls/get")
            .and_then(Value::as_str)
            .ok_or_else(|| ProviderError::MalformedResponse {
                provider: PROVIDER,
                detail: "pending prediction without urls.get".to_string(),
            })?
            .to_string();

        tokio::time::sleep(POLL_INTERVAL).await;
        let response = client.get(&poll_url).bearer_auth(token).send().await?;
        prediction = check_status(PROVIDER, response).await?.json().await?;
    }

    let image_url = parse_prediction_output(&prediction)?;
    log::debug!("Replicate generated image URL: {}", image_url);
    Ok(image_url)
}

fn status_of(prediction: &Value) -> &str {
    prediction
        .get("status")
        .and_then(Value::as_str)
        .unwrap_or("unknown")
}

fn is_pending(prediction: &Value) -> bool {
    matches!(status_of(prediction), "starting" | "processing")
}

/// First output URL of a finished prediction
pub fn parse_prediction_output(prediction: &Value) -> Result<String> {
    match status_of(prediction) {
        "succeeded" => {}
        status => {
            let error = prediction
                .get("error")
                .and_then(Value::as_str)
                .unwrap_or("no error message");
            return Err(ProviderError::Unfinished {
                provider: PROVIDER,
                detail: format!("{}: {}", status, error),
            });
        }
    }

    let output = prediction.get("output");
    output
        .and_then(|o| o.get(0))
        .or(output)
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| ProviderError::MalformedResponse {
            provider: PROVIDER,
            detail: "prediction has no output URL".to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_output_list_and_string() {
        let list = json!({"status": "succeeded", "output": ["https://replicate.delivery/a.png"]});
        let single = json!({"status": "succeeded", "output": "https://replicate.delivery/b.png"});

        assert_eq!(
            parse_prediction_output(&list).unwrap(),
            "https://replicate.delivery/a.png"
        );
        assert_eq!(
            parse_prediction_output(&single).unwrap(),
            "https://replicate.delivery/b.png"
        );
    }

    #[test]
    fn test_failed_prediction() {
        let failed = json!({"status": "failed", "error": "NSFW content detected", "output": null});
        let err = parse_prediction_output(&failed).unwrap_err();
        assert!(err.to_string().contains("NSFW content detected"));
    }

    #[test]
    fn test_pending_states() {
        assert!(is_pending(&json!({"status": "starting"})));
        assert!(is_pending(&json!({"status": "processing"})));
        assert!(!is_pending(&json!({"status": "succeeded"})));
        assert!(!is_pending(&json!({})));
    }
}
