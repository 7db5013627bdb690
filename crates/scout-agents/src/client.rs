//! OpenAI-compatible chat-completions client.
//!
//! Implements the core [`ReasoningClient`] seam over plain `reqwest`. Every
//! failure is mapped onto a [`ServiceError`] so the engine can classify it
//! for retry; nothing is retried here.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use coordination::{CompletionRequest, ReasoningClient, ServiceError};

use crate::config::LlmConfig;

#[derive(Debug, Clone)]
pub struct OpenAiCompatClient {
    config: LlmConfig,
    http: reqwest::Client,
}

impl OpenAiCompatClient {
    pub fn new(config: LlmConfig) -> Self {
        Self {
            config,
            http: reqwest::Client::new(),
        }
    }

    pub fn model(&self) -> &str {
        &self.config.model
    }
}

#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f64,
    max_tokens: u32,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

fn build_messages(request: &CompletionRequest) -> Vec<ChatMessage<'_>> {
    let mut messages = Vec::with_capacity(2);
    if !request.system.trim().is_empty() {
        messages.push(ChatMessage {
            role: "system",
            content: &request.system,
        });
    }
    messages.push(ChatMessage {
        role: "user",
        content: &request.prompt,
    });
    messages
}

/// Map a non-success HTTP status onto the service error taxonomy.
pub fn status_error(status: u16, body: String) -> ServiceError {
    if status == 429 {
        ServiceError::RateLimited(body)
    } else {
        ServiceError::Status { status, body }
    }
}

/// Pull the first choice's text out of a response body.
pub fn completion_text(body: &str) -> Result<String, ServiceError> {
    let parsed: ChatCompletionResponse = serde_json::from_str(body)
        .map_err(|e| ServiceError::Transport(format!("malformed completion body: {e}")))?;
    parsed
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.message.content)
        .filter(|text| !text.trim().is_empty())
        .ok_or(ServiceError::EmptyResponse)
}

#[async_trait]
impl ReasoningClient for OpenAiCompatClient {
    async fn complete(
        &self,
        request: &CompletionRequest,
        timeout: Duration,
    ) -> Result<String, ServiceError> {
        let body = ChatCompletionRequest {
            model: &self.config.model,
            messages: build_messages(request),
            temperature: self.config.temperature,
            max_tokens: self.config.max_tokens,
        };

        let mut builder = self
            .http
            .post(self.config.completions_url())
            .timeout(timeout)
            .json(&body);
        if let Some(key) = &self.config.api_key {
            builder = builder.bearer_auth(key);
        }

        let response = builder.send().await.map_err(|e| {
            if e.is_timeout() {
                ServiceError::Timeout(timeout)
            } else {
                ServiceError::Transport(e.to_string())
            }
        })?;

        let status = response.status();
        let text = response.text().await.map_err(|e| {
            if e.is_timeout() {
                ServiceError::Timeout(timeout)
            } else {
                ServiceError::Transport(e.to_string())
            }
        })?;
        if !status.is_success() {
            return Err(status_error(status.as_u16(), text));
        }

        let content = completion_text(&text)?;
        debug!(model = %self.config.model, chars = content.len(), "Completion received");
        Ok(content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            status_error(429, "slow down".into()),
            ServiceError::RateLimited("slow down".into())
        );
        assert!(matches!(
            status_error(500, String::new()),
            ServiceError::Status { status: 500, .. }
        ));
    }

    #[test]
    fn test_completion_text_extracts_first_choice() {
        let body = r#"{"choices":[{"message":{"role":"assistant","content":"hello"}}]}"#;
        assert_eq!(completion_text(body).unwrap(), "hello");
    }

    #[test]
    fn test_completion_text_empty_and_malformed() {
        assert_eq!(
            completion_text(r#"{"choices":[]}"#),
            Err(ServiceError::EmptyResponse)
        );
        assert_eq!(
            completion_text(r#"{"choices":[{"message":{"content":"  "}}]}"#),
            Err(ServiceError::EmptyResponse)
        );
        assert!(matches!(
            completion_text("<html>bad gateway</html>"),
            Err(ServiceError::Transport(_))
        ));
    }

    #[test]
    fn test_system_message_omitted_when_blank() {
        let req = CompletionRequest::new("", "hi");
        let messages = build_messages(&req);
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].role, "user");

        let req = CompletionRequest::new("be brief", "hi");
        assert_eq!(build_messages(&req).len(), 2);
    }
}
