//! OpenAI chat completions for card text

use reqwest::Client;
use serde::Serialize;
use serde_json::Value;

use super::{check_status, ProviderError, Result};

const PROVIDER: &str = "openai";

/// What the text model is asked to explain
#[derive(Debug, Clone, Copy)]
pub struct CardTextRequest<'a> {
    pub word: &'a str,
    pub context: &'a str,
    pub language: &'a str,
    pub level: &'a str,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: String,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
}

/// System prompt for a learner's language and level
pub fn system_prompt(language: &str, level: &str) -> String {
    format!(
        "You write vocabulary flashcards for learners of {language} at CEFR level {level}. \
         Answer in plain text without markdown."
    )
}

/// User prompt for one word
pub fn user_prompt(request: &CardTextRequest<'_>) -> String {
    let mut prompt = format!("Word: {}\n", request.word);
    if !request.context.is_empty() {
        prompt.push_str(&format!("Context: {}\n", request.context));
    }
    prompt.push_str(&format!(
        "Explain what the word means{} in simple {} suitable for level {}. \
         Then give two short example sentences. Keep it under 80 words.",
        if request.context.is_empty() { "" } else { " in this context" },
        request.language,
        request.level,
    ));
    prompt
}

/// Ask the chat model for a card's explanatory text
pub async fn generate_card_text(
    client: &Client,
    base_url: &str,
    api_key: &str,
    model: &str,
    request: &CardTextRequest<'_>,
) -> Result<String> {
    log::debug!("OpenAI text generation for word [{}]", request.word);

    let body = ChatRequest {
        model,
        messages: vec![
            ChatMessage {
                role: "system",
                content: system_prompt(request.language, request.level),
            },
            ChatMessage {
                role: "user",
                content: user_prompt(request),
            },
        ],
        temperature: 0.7,
    };

    let url = format!("{}/chat/completions", base_url.trim_end_matches('/'));
    let response = client
        .post(&url)
        .bearer_auth(api_key)
        .json(&body)
        .send()
        .await?;

    let json: Value = check_status(PROVIDER, response).await?.json().await?;
    parse_chat_response(&json)
}

/// Extract `choices[0].message.content`
pub fn parse_chat_response(json: &Value) -> Result<String> {
    let content = json
        .pointer("/choices/0/message/content")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| ProviderError::MalformedResponse {
            provider: PROVIDER,
            detail: "no message content in choices[0]".to_string(),
        })?;

    Ok(content.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_chat_response() {
        let json = json!({
            "choices": [{"message": {"role": "assistant", "content": "  An apple is a fruit.  "}}]
        });
        assert_eq!(parse_chat_response(&json).unwrap(), "An apple is a fruit.");
    }

    #[test]
    fn test_parse_chat_response_rejects_empty() {
        assert!(parse_chat_response(&json!({"choices": []})).is_err());
        assert!(parse_chat_response(&json!({"choices": [{"message": {"content": ""}}]})).is_err());
    }

    #[test]
    fn test_user_prompt_mentions_context_only_when_present() {
        let mut request = CardTextRequest {
            word: "apple",
            context: "I ate an apple",
            language: "english",
            level: "B2",
        };
        let prompt = user_prompt(&request);
        assert!(prompt.contains("Context: I ate an apple"));
        assert!(prompt.contains("in this context"));

        request.context = "";
        let prompt = user_prompt(&request);
        assert!(!prompt.contains("Context:"));
        assert!(prompt.contains("level B2"));
    }
}
