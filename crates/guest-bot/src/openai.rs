//! OpenAI-compatible chat-completions client.
//!
//! One request per unmatched question; the prompt is built by the semantic
//! strategy, this client only moves it over the wire. Base URL and model are
//! configurable so a local OpenAI-compatible endpoint works too.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;

use concierge::{CompletionClient, ConciergeError};

use crate::config::OpenAiConfig;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    content: String,
}

pub struct OpenAiClient {
    http: reqwest::Client,
    config: OpenAiConfig,
}

impl OpenAiClient {
    pub fn new(config: OpenAiConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            config,
        }
    }
}

#[async_trait]
impl CompletionClient for OpenAiClient {
    async fn complete(&self, prompt: &str) -> Result<String> {
        let url = format!("{}/chat/completions", self.config.base_url);
        let body = json!({
            "model": self.config.model,
            "messages": [{ "role": "user", "content": prompt }],
        });

        let response = self
            .http
            .post(&url)
            .timeout(REQUEST_TIMEOUT)
            .bearer_auth(&self.config.api_key)
            .json(&body)
            .send()
            .await
            .context("Completion request failed")?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(ConciergeError::MatchService(format!(
                "Completion endpoint returned {status}: {text}"
            ))
            .into());
        }

        let completion: CompletionResponse = response.json().await.map_err(|e| {
            ConciergeError::MatchService(format!("Completion response was not valid JSON: {e}"))
        })?;
        let choice = completion.choices.into_iter().next().ok_or_else(|| {
            ConciergeError::MatchService("Completion response had no choices".into())
        })?;
        Ok(choice.message.content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn completion_response_takes_first_choice() {
        let raw = r#"{
            "choices": [
                {"message": {"role": "assistant", "content": "есть ли wifi"}},
                {"message": {"role": "assistant", "content": "ignored"}}
            ]
        }"#;
        let parsed: CompletionResponse = serde_json::from_str(raw).unwrap();
        assert_eq!(parsed.choices[0].message.content, "есть ли wifi");
    }

    #[test]
    fn empty_choices_parse_but_are_rejected_later() {
        let raw = r#"{"choices": []}"#;
        let parsed: CompletionResponse = serde_json::from_str(raw).unwrap();
        assert!(parsed.choices.is_empty());
    }
}
